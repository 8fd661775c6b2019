//! The type manager (§4.4 collaborator 2): maps `TypeDescriptor`s to IR
//! type letters, memory-op widths, and parameter-passing widths, and sizes
//! UDTs by summing field sizes.

use crate::symbol_table::SymbolTable;
use crate::types::{BaseType, TypeDescriptor};

pub struct TypeManager;

impl TypeManager {
    pub fn ir_letter(ty: &TypeDescriptor) -> &'static str {
        ty.base_type.ir_letter()
    }

    pub fn mem_width(ty: &TypeDescriptor) -> &'static str {
        ty.base_type.mem_width()
    }

    /// Small integers widen to word for argument passing (§4.4 "Type
    /// manager": "parameter-passing widths (small integers widen to
    /// word)").
    pub fn param_width(ty: &TypeDescriptor) -> &'static str {
        match ty.base_type {
            BaseType::Byte | BaseType::UByte | BaseType::Short | BaseType::UShort => "w",
            other => other.ir_letter(),
        }
    }

    /// UDTs size by summing field sizes (§4.4 "sizes UDTs by summing their
    /// field sizes"); everything else uses its intrinsic width.
    pub fn size_of(ty: &TypeDescriptor, symbols: &SymbolTable) -> u32 {
        if ty.base_type == BaseType::UserDefined {
            if let Some(name) = &ty.udt_name {
                if let Some(udt) = symbols.lookup_udt(name) {
                    return udt
                        .fields
                        .iter()
                        .map(|f| f.ty.base_type.size_bytes().max(1))
                        .sum();
                }
            }
        }
        ty.base_type.size_bytes().max(1)
    }
}
