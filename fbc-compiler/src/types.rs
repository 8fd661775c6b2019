//! The type lattice: `BaseType`, packed `TypeAttribute` flags, `TypeDescriptor`
//! and the coercion/promotion rules (§3.2).

use bitflags::bitflags;
use std::fmt;

/// The flat base-type enumeration (§3.2). Each variant carries an intrinsic
/// bit width, signedness, an IR type letter, and a memory-op width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Byte,
    UByte,
    Short,
    UShort,
    Integer,
    UInteger,
    Long,
    ULong,
    Single,
    Double,
    String,
    Unicode,
    UserDefined,
    Pointer,
    ArrayDesc,
    StringDesc,
    LoopIndex,
    Object,
    ClassInstance,
    Void,
    Unknown,
}

impl BaseType {
    /// Intrinsic bit width of a value of this type.
    pub fn bit_width(self) -> u32 {
        use BaseType::*;
        match self {
            Byte | UByte => 8,
            Short | UShort => 16,
            Integer | UInteger | LoopIndex | Single => 32,
            Long | ULong | Double | Pointer | ArrayDesc | StringDesc | String | Unicode
            | UserDefined | Object | ClassInstance => 64,
            Void | Unknown => 0,
        }
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            BaseType::UByte | BaseType::UShort | BaseType::UInteger | BaseType::ULong
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, BaseType::Single | BaseType::Double)
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            BaseType::Byte
                | BaseType::UByte
                | BaseType::Short
                | BaseType::UShort
                | BaseType::Integer
                | BaseType::UInteger
                | BaseType::Long
                | BaseType::ULong
                | BaseType::LoopIndex
        )
    }

    pub fn is_string(self) -> bool {
        matches!(self, BaseType::String | BaseType::Unicode)
    }

    /// The IR's type letter (`w, l, s, d, ub, uh`), used by the type
    /// manager (§4.4 "Type manager") when emitting instructions.
    pub fn ir_letter(self) -> &'static str {
        use BaseType::*;
        match self {
            Byte | Short | Integer | LoopIndex => "w",
            UByte => "ub",
            UShort => "uh",
            UInteger => "w",
            Long | ULong | Pointer | ArrayDesc | StringDesc | String | Unicode | UserDefined
            | Object | ClassInstance => "l",
            Single => "s",
            Double => "d",
            Void | Unknown => "w",
        }
    }

    /// The memory-op width letter (`b, h, w, l, s, d`) used for loads/stores.
    pub fn mem_width(self) -> &'static str {
        use BaseType::*;
        match self {
            Byte | UByte => "b",
            Short | UShort => "h",
            Integer | UInteger | LoopIndex => "w",
            Long | ULong | Pointer | ArrayDesc | StringDesc | String | Unicode | UserDefined
            | Object | ClassInstance => "l",
            Single => "s",
            Double => "d",
            Void | Unknown => "w",
        }
    }

    /// Size in bytes, used for UDT field layout (§4.2 "Class layout").
    pub fn size_bytes(self) -> u32 {
        self.bit_width() / 8
    }
}

bitflags! {
    /// Packed type-attribute flags (§3.2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TypeAttribute: u16 {
        const IS_ARRAY   = 1 << 0;
        const IS_POINTER = 1 << 1;
        const IS_CONST   = 1 << 2;
        const IS_BYREF   = 1 << 3;
        const IS_UNSIGNED = 1 << 4;
        const IS_DYNAMIC = 1 << 5;
        const IS_STATIC  = 1 << 6;
        const IS_HIDDEN  = 1 << 7;
    }
}

/// A fully described type: base type, attributes, and the optional
/// UDT/class/array metadata needed to make it concrete (§3.2).
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub base_type: BaseType,
    pub attributes: TypeAttribute,
    pub udt_name: Option<String>,
    pub udt_id: Option<i32>,
    pub class_name: Option<String>,
    pub object_type_name: Option<String>,
    pub array_dims: Option<Vec<u32>>,
    pub element_type: Option<BaseType>,
    pub is_class_type: bool,
}

impl TypeDescriptor {
    pub fn simple(base_type: BaseType) -> Self {
        TypeDescriptor {
            base_type,
            attributes: TypeAttribute::empty(),
            udt_name: None,
            udt_id: None,
            class_name: None,
            object_type_name: None,
            array_dims: None,
            element_type: None,
            is_class_type: false,
        }
    }

    pub fn udt(name: impl Into<String>, id: i32) -> Self {
        TypeDescriptor {
            base_type: BaseType::UserDefined,
            udt_name: Some(name.into()),
            udt_id: Some(id),
            ..TypeDescriptor::simple(BaseType::UserDefined)
        }
    }

    pub fn class_instance(name: impl Into<String>) -> Self {
        TypeDescriptor {
            base_type: BaseType::ClassInstance,
            class_name: Some(name.into()),
            is_class_type: true,
            ..TypeDescriptor::simple(BaseType::ClassInstance)
        }
    }

    pub fn array_of(element: BaseType, dims: Vec<u32>) -> Self {
        TypeDescriptor {
            base_type: element,
            attributes: TypeAttribute::IS_ARRAY,
            array_dims: Some(dims),
            element_type: Some(element),
            ..TypeDescriptor::simple(element)
        }
    }

    /// Validates the §3.2 invariants linking `base_type` to the required
    /// companion fields. Returns `Err(message)` on the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.base_type == BaseType::UserDefined {
            if self.udt_id.map_or(true, |id| id < 0) {
                return Err("user_defined type requires a non-negative udt_id".into());
            }
            if self.udt_name.as_deref().unwrap_or("").is_empty() {
                return Err("user_defined type requires a non-empty udt_name".into());
            }
        }
        if self.base_type == BaseType::ClassInstance {
            if !self.is_class_type {
                return Err("class_instance requires is_class_type".into());
            }
            if self.class_name.as_deref().unwrap_or("").is_empty() {
                return Err("class_instance requires a non-empty class_name".into());
            }
        }
        if self.base_type == BaseType::Object {
            if let Some(name) = &self.object_type_name {
                if matches!(name.as_str(), "HASHMAP" | "LIST") && self.element_type.is_none() {
                    return Err("typed collection object requires element_type".into());
                }
            }
        }
        Ok(())
    }
}

/// Result of checking whether one type coerces to another (§3.2 "Coercion
/// result").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Identical,
    ImplicitSafe,
    ImplicitLossy,
    ExplicitRequired,
    Incompatible,
}

impl fmt::Display for Coercion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Coercion::Identical => "identical",
            Coercion::ImplicitSafe => "implicit_safe",
            Coercion::ImplicitLossy => "implicit_lossy",
            Coercion::ExplicitRequired => "explicit_required",
            Coercion::Incompatible => "incompatible",
        };
        write!(f, "{}", s)
    }
}

/// Checks coercion of `from -> to` per §3.2's rule table.
///
/// UDT/class identity checks are by name only; subclass compatibility is a
/// separate symbol-table lookup (class hierarchy walk), not decided here.
pub fn check_coercion(from: &TypeDescriptor, to: &TypeDescriptor) -> Coercion {
    if from.base_type == to.base_type
        && from.udt_name == to.udt_name
        && from.class_name == to.class_name
    {
        return Coercion::Identical;
    }

    let (f, t) = (from.base_type, to.base_type);

    if f.is_string() && t.is_string() {
        return Coercion::Identical;
    }
    if f.is_string() != t.is_string() && (f.is_string() || t.is_string()) {
        if f.is_integer() && t.is_string() || f.is_string() && t.is_integer() {
            return Coercion::Incompatible;
        }
        if f.is_float() && t.is_string() || f.is_string() && t.is_float() {
            return Coercion::Incompatible;
        }
    }

    if f == BaseType::UserDefined && t == BaseType::UserDefined {
        return if from.udt_name == to.udt_name {
            Coercion::Identical
        } else {
            Coercion::Incompatible
        };
    }
    if f == BaseType::ClassInstance && t == BaseType::ClassInstance {
        return if from.class_name == to.class_name {
            Coercion::Identical
        } else {
            Coercion::ExplicitRequired
        };
    }

    if f.is_integer() && t.is_integer() {
        return if t.bit_width() >= f.bit_width() {
            Coercion::ImplicitSafe
        } else {
            Coercion::ImplicitLossy
        };
    }

    if f.is_integer() && t == BaseType::Double {
        return Coercion::ImplicitSafe;
    }
    if f.is_integer() && t == BaseType::Single {
        return if f.bit_width() <= 24 {
            Coercion::ImplicitSafe
        } else {
            Coercion::ImplicitLossy
        };
    }
    if f.is_float() && t.is_integer() {
        return Coercion::ImplicitLossy;
    }
    if f == BaseType::Single && t == BaseType::Double {
        return Coercion::ImplicitSafe;
    }
    if f == BaseType::Double && t == BaseType::Single {
        return Coercion::ImplicitLossy;
    }

    Coercion::Incompatible
}

/// Binary-expression type promotion (§3.2 "Promotion").
pub fn promote(a: BaseType, b: BaseType) -> BaseType {
    if a.is_string() || b.is_string() {
        return BaseType::String;
    }
    if a == BaseType::Double || b == BaseType::Double {
        return BaseType::Double;
    }
    if a == BaseType::Single || b == BaseType::Single {
        return BaseType::Single;
    }
    if a == BaseType::Long || b == BaseType::Long {
        return BaseType::Long;
    }
    BaseType::Integer
}

/// Maps a trailing numeric type-suffix character to its `BaseType`, per
/// §4.2 "Type inference" / §9 "Implicit variable declarations": the suffix
/// is the second-priority source of a variable's type, after an explicit
/// `DIM ... AS`.
pub fn suffix_base_type(suffix: char) -> Option<BaseType> {
    match suffix {
        '%' => Some(BaseType::Integer),
        '!' => Some(BaseType::Single),
        '#' => Some(BaseType::Double),
        '&' => Some(BaseType::Long),
        '$' => Some(BaseType::String),
        '@' => Some(BaseType::Double),
        '^' => Some(BaseType::Pointer),
        _ => None,
    }
}

/// Strips a trailing type-suffix character from a raw identifier spelling,
/// returning the base name and the inferred type if a suffix was present.
pub fn split_suffix(name: &str) -> (&str, Option<BaseType>) {
    match name.chars().last() {
        Some(c) => match suffix_base_type(c) {
            Some(bt) => (&name[..name.len() - c.len_utf8()], Some(bt)),
            None => (name, None),
        },
        None => (name, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercion_identical() {
        for bt in [BaseType::Integer, BaseType::Double, BaseType::String] {
            let d = TypeDescriptor::simple(bt);
            assert_eq!(check_coercion(&d, &d), Coercion::Identical);
        }
    }

    #[test]
    fn coercion_int_to_double_is_safe() {
        let i = TypeDescriptor::simple(BaseType::Integer);
        let d = TypeDescriptor::simple(BaseType::Double);
        assert_eq!(check_coercion(&i, &d), Coercion::ImplicitSafe);
    }

    #[test]
    fn coercion_double_to_int_is_lossy() {
        let i = TypeDescriptor::simple(BaseType::Integer);
        let d = TypeDescriptor::simple(BaseType::Double);
        assert_eq!(check_coercion(&d, &i), Coercion::ImplicitLossy);
    }

    #[test]
    fn coercion_string_int_incompatible() {
        let s = TypeDescriptor::simple(BaseType::String);
        let i = TypeDescriptor::simple(BaseType::Integer);
        assert_eq!(check_coercion(&s, &i), Coercion::Incompatible);
        assert_eq!(check_coercion(&i, &s), Coercion::Incompatible);
    }

    #[test]
    fn promotion_rules() {
        assert_eq!(promote(BaseType::Integer, BaseType::String), BaseType::String);
        assert_eq!(promote(BaseType::Integer, BaseType::Double), BaseType::Double);
        assert_eq!(promote(BaseType::Integer, BaseType::Single), BaseType::Single);
        assert_eq!(promote(BaseType::Integer, BaseType::Long), BaseType::Long);
        assert_eq!(promote(BaseType::Integer, BaseType::Integer), BaseType::Integer);
    }

    #[test]
    fn udt_descriptor_requires_name_and_id() {
        let mut d = TypeDescriptor::udt("POINT", 0);
        assert!(d.validate().is_ok());
        d.udt_name = None;
        assert!(d.validate().is_err());
    }
}
