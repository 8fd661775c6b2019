//! The process-local symbol table (§3.3).
//!
//! Keys are the uppercase transform of the source name; function-scoped
//! variables use the key `"FUNC.NAME"`. Created during pass 1 of semantic
//! analysis, fixed up once (class parent pointers) at the end of pass 1,
//! mutated only to set `is_used` during pass 2, and read-only thereafter —
//! the same "collect, fix up stable references, then read-only" discipline
//! the teacher's `resolver.rs` uses for word/union registries.

use crate::ast::DataLiteral;
use crate::diagnostics::Location;
use crate::types::TypeDescriptor;
use std::collections::HashMap;

pub fn key(name: &str) -> String {
    name.to_ascii_uppercase()
}

pub fn function_key(func: &str, var: &str) -> String {
    format!("{}.{}", key(func), key(var))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Global,
    Function(String),
}

#[derive(Debug, Clone)]
pub struct VariableInfo {
    pub name: String,
    pub ty: TypeDescriptor,
    pub declared: bool,
    pub used: bool,
    pub first_use: Location,
    pub scope: Scope,
    pub is_global: bool,
}

#[derive(Debug, Clone)]
pub struct ArrayInfo {
    pub name: String,
    pub element_ty: TypeDescriptor,
    pub dims: Vec<u32>,
    pub declared_at: Location,
    pub element_count: u64,
    pub as_type_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub ty: TypeDescriptor,
    pub by_ref: bool,
}

#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub param_names: Vec<String>,
    pub params: Vec<ParamInfo>,
    pub return_ty: TypeDescriptor,
    pub defined_at: Location,
    /// Body expression for a single-expression function (§3.3).
    pub inline_body: Option<crate::ast::Expr>,
    pub is_sub: bool,
}

#[derive(Debug, Clone)]
pub struct UdtField {
    pub name: String,
    pub ty: TypeDescriptor,
    pub type_name: String,
    pub builtin: bool,
}

/// SIMD arrangement classification for a UDT (§4.2 "SIMD classification").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdArrangement {
    V2d,
    V4s,
    V2s,
    V8h,
    V4h,
    V16b,
    V8b,
    V4sPad1,
}

#[derive(Debug, Clone)]
pub struct SimdInfo {
    pub lane_count: u32,
    pub lane_bit_width: u32,
    pub is_float: bool,
    pub physical_lanes: u32,
    pub total_bytes: u32,
    pub is_padded: bool,
    pub arrangement: SimdArrangement,
}

#[derive(Debug, Clone)]
pub struct UdtInfo {
    pub name: String,
    pub id: i32,
    pub fields: Vec<UdtField>,
    pub simd: Option<SimdInfo>,
}

#[derive(Debug, Clone)]
pub struct ClassField {
    pub name: String,
    pub ty: TypeDescriptor,
    pub offset: u32,
    pub inherited: bool,
}

#[derive(Debug, Clone)]
pub struct ClassMethod {
    pub name: String,
    pub mangled_name: String,
    pub vtable_slot: u32,
    pub is_override: bool,
    pub origin_class: String,
    pub params: Vec<ParamInfo>,
    pub return_ty: TypeDescriptor,
}

pub const CLASS_HEADER_SIZE: u32 = 16;

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub id: i32,
    pub parent_name: Option<String>,
    /// Resolved during the pass-1 fix-up (§3.3 "Lifecycle", §9 "Class
    /// parent back-references"). `None` until fix-up runs, `Some` even for
    /// classes with no parent is never used — absence of a parent is
    /// `parent_name: None`.
    pub parent_id: Option<i32>,
    pub object_size: u32,
    pub fields: Vec<ClassField>,
    pub methods: Vec<ClassMethod>,
    pub has_constructor: bool,
    pub constructor_mangled: Option<String>,
    pub constructor_params: Vec<ParamInfo>,
    pub has_destructor: bool,
    pub destructor_mangled: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LabelInfo {
    pub name: String,
    pub id: i32,
    pub defined_at: Location,
}

#[derive(Debug, Clone)]
pub enum ConstantValue {
    Integer(i64),
    Double(f64),
    Str(String),
}

#[derive(Debug, Default)]
pub struct DataSegment {
    pub values: Vec<DataLiteral>,
    pub line_restore_points: HashMap<i32, usize>,
    pub label_restore_points: HashMap<String, usize>,
}

/// The symbol table itself. Insertion order on `HashMap` is not guaranteed
/// by `std`, but lookups are keyed by name so this is immaterial to
/// correctness; determinism of *output* (§5) comes from iterating the AST,
/// not the table, when order matters (e.g. emission order).
#[derive(Debug, Default)]
pub struct SymbolTable {
    variables: HashMap<String, VariableInfo>,
    arrays: HashMap<String, ArrayInfo>,
    functions: HashMap<String, FunctionInfo>,
    udts: HashMap<String, UdtInfo>,
    classes: HashMap<String, ClassInfo>,
    labels: HashMap<String, LabelInfo>,
    constants: HashMap<String, ConstantValue>,
    line_numbers: HashMap<i32, usize>,
    pub data: DataSegment,
    next_class_id: i32,
    next_udt_id: i32,
    next_label_id: i32,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    // --- Variables ---

    pub fn declare_variable(&mut self, info: VariableInfo) {
        let k = match &info.scope {
            Scope::Global => key(&info.name),
            Scope::Function(f) => function_key(f, &info.name),
        };
        self.variables.entry(k).or_insert(info);
    }

    pub fn lookup_variable(&self, scope: &Scope, name: &str) -> Option<&VariableInfo> {
        let k = match scope {
            Scope::Global => key(name),
            Scope::Function(f) => function_key(f, name),
        };
        self.variables
            .get(&k)
            .or_else(|| self.variables.get(&key(name)))
    }

    pub fn mark_used(&mut self, scope: &Scope, name: &str, at: Location) {
        let k = match scope {
            Scope::Global => key(name),
            Scope::Function(f) => function_key(f, name),
        };
        let entry = self
            .variables
            .get_mut(&k)
            .or_else(|| self.variables.get_mut(&key(name)));
        if let Some(v) = entry {
            if !v.used {
                v.used = true;
                v.first_use = at;
            }
        }
    }

    pub fn variables(&self) -> impl Iterator<Item = &VariableInfo> {
        self.variables.values()
    }

    // --- Arrays ---

    pub fn declare_array(&mut self, info: ArrayInfo) -> Result<(), String> {
        let k = key(&info.name);
        if self.arrays.contains_key(&k) {
            return Err(format!("array '{}' already declared", info.name));
        }
        self.arrays.insert(k, info);
        Ok(())
    }

    pub fn lookup_array(&self, name: &str) -> Option<&ArrayInfo> {
        self.arrays.get(&key(name))
    }

    // --- Functions / Subs ---

    pub fn declare_function(&mut self, info: FunctionInfo) -> Result<(), String> {
        let k = key(&info.name);
        if self.functions.contains_key(&k) {
            return Err(format!("function '{}' already declared", info.name));
        }
        self.functions.insert(k, info);
        Ok(())
    }

    pub fn lookup_function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.get(&key(name))
    }

    // --- UDTs ---

    pub fn declare_udt(&mut self, name: &str, fields: Vec<UdtField>) -> Result<i32, String> {
        let k = key(name);
        if self.udts.contains_key(&k) {
            return Err(format!("type '{}' already declared", name));
        }
        let id = self.next_udt_id;
        self.next_udt_id += 1;
        let simd = classify_simd(&fields);
        self.udts.insert(
            k,
            UdtInfo {
                name: name.to_string(),
                id,
                fields,
                simd,
            },
        );
        Ok(id)
    }

    pub fn lookup_udt(&self, name: &str) -> Option<&UdtInfo> {
        self.udts.get(&key(name))
    }

    // --- Classes ---

    pub fn declare_class(
        &mut self,
        name: &str,
        parent_name: Option<String>,
    ) -> Result<i32, String> {
        let k = key(name);
        if self.classes.contains_key(&k) {
            return Err(format!("class '{}' already declared", name));
        }
        let id = self.next_class_id;
        self.next_class_id += 1;
        self.classes.insert(
            k,
            ClassInfo {
                name: name.to_string(),
                id,
                parent_name,
                parent_id: None,
                object_size: CLASS_HEADER_SIZE,
                fields: Vec::new(),
                methods: Vec::new(),
                has_constructor: false,
                constructor_mangled: None,
                constructor_params: Vec::new(),
                has_destructor: false,
                destructor_mangled: None,
            },
        );
        Ok(id)
    }

    pub fn lookup_class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(&key(name))
    }

    pub fn lookup_class_mut(&mut self, name: &str) -> Option<&mut ClassInfo> {
        self.classes.get_mut(&key(name))
    }

    pub fn class_names(&self) -> Vec<String> {
        self.classes.values().map(|c| c.name.clone()).collect()
    }

    /// Resolves every class's `parent_id` by uppercased-name lookup, then
    /// re-lays out every class that has a parent so `fields`/`methods`/
    /// `object_size` reflect the real inherited shape. This runs once, after
    /// every class has been registered, precisely because map growth during
    /// insertion can invalidate any pointer/reference taken earlier (§3.3
    /// "Lifecycle"; §9 "Class parent back-references").
    pub fn fixup_class_parents(&mut self) -> Result<(), String> {
        let lookups: Vec<(String, Option<String>)> = self
            .classes
            .values()
            .map(|c| (c.name.clone(), c.parent_name.clone()))
            .collect();

        let mut resolved = HashMap::new();
        for (name, parent_name) in &lookups {
            if let Some(parent_name) = parent_name {
                let parent_id = self
                    .classes
                    .get(&key(parent_name))
                    .ok_or_else(|| format!("class '{}' extends undefined class '{}'", name, parent_name))?
                    .id;
                resolved.insert(key(name), parent_id);
            }
        }

        detect_inheritance_cycles(&lookups)?;

        for (k, parent_id) in resolved {
            if let Some(c) = self.classes.get_mut(&k) {
                c.parent_id = Some(parent_id);
            }
        }

        self.relayout_inherited_classes()
    }

    /// Re-runs `layout_class` for every class with a resolved parent, using
    /// the parent's own already-computed layout, in parent-before-child
    /// order. Pass 1 lays out every class as if it had no parent (the
    /// parent isn't known yet at that point in the AST walk), so a class
    /// with a parent has only its own fields/methods recorded going in here
    /// — exactly what `layout_class` wants as the "own" arguments.
    fn relayout_inherited_classes(&mut self) -> Result<(), String> {
        let mut order = Vec::new();
        let mut visited = std::collections::HashSet::new();
        let keys: Vec<String> = self.classes.keys().cloned().collect();
        for k in &keys {
            visit_parent_first(k, &self.classes, &mut visited, &mut order);
        }

        for k in order {
            let parent_id = match self.classes.get(&k) {
                Some(c) => c.parent_id,
                None => continue,
            };
            let Some(parent_id) = parent_id else {
                continue;
            };
            let parent = self
                .classes
                .values()
                .find(|c| c.id == parent_id)
                .cloned()
                .ok_or_else(|| "internal error: unresolved parent class id".to_string())?;

            let c = self.classes.get(&k).unwrap();
            let class_name = c.name.clone();
            let own_fields: Vec<(String, TypeDescriptor)> = c
                .fields
                .iter()
                .filter(|f| !f.inherited)
                .map(|f| (f.name.clone(), f.ty.clone()))
                .collect();
            let own_methods: Vec<(String, TypeDescriptor, Vec<ParamInfo>, String)> = c
                .methods
                .iter()
                .map(|m| (m.name.clone(), m.return_ty.clone(), m.params.clone(), m.mangled_name.clone()))
                .collect();

            let (fields, methods, object_size) =
                layout_class(Some(&parent), own_fields, own_methods, &class_name);

            let c = self.classes.get_mut(&k).unwrap();
            c.fields = fields;
            c.methods = methods;
            c.object_size = object_size;
        }
        Ok(())
    }

    // --- Labels ---

    pub fn declare_label(&mut self, name: &str, at: Location) -> Result<i32, String> {
        let k = key(name);
        if self.labels.contains_key(&k) {
            return Err(format!("label '{}' already declared", name));
        }
        let id = self.next_label_id;
        self.next_label_id += 1;
        self.labels.insert(
            k,
            LabelInfo {
                name: name.to_string(),
                id,
                defined_at: at,
            },
        );
        Ok(id)
    }

    pub fn lookup_label(&self, name: &str) -> Option<&LabelInfo> {
        self.labels.get(&key(name))
    }

    // --- Constants ---

    pub fn declare_constant(&mut self, name: &str, value: ConstantValue) {
        self.constants.insert(key(name), value);
    }

    pub fn lookup_constant(&self, name: &str) -> Option<&ConstantValue> {
        self.constants.get(&key(name))
    }

    // --- Line numbers ---

    pub fn declare_line(&mut self, line_no: i32, ast_index: usize) -> Result<(), String> {
        if self.line_numbers.contains_key(&line_no) {
            return Err(format!("duplicate line number {}", line_no));
        }
        self.line_numbers.insert(line_no, ast_index);
        Ok(())
    }

    pub fn lookup_line(&self, line_no: i32) -> Option<usize> {
        self.line_numbers.get(&line_no).copied()
    }
}

/// Classifies a UDT for a NEON arrangement (§4.2 "SIMD classification").
/// Qualifies when: 2–16 fields, all built-in and the *same* base type, and
/// total size ≤ 16 bytes.
fn classify_simd(fields: &[UdtField]) -> Option<SimdInfo> {
    if fields.len() < 2 || fields.len() > 16 {
        return None;
    }
    if !fields.iter().all(|f| f.builtin) {
        return None;
    }
    let first_bt = fields[0].ty.base_type;
    if !fields.iter().all(|f| f.ty.base_type == first_bt) {
        return None;
    }
    let lane_bits = first_bt.bit_width();
    if lane_bits == 0 {
        return None;
    }
    let total_bytes: u32 = fields.iter().map(|f| f.ty.base_type.size_bytes()).sum();
    if total_bytes > 16 {
        return None;
    }

    let is_float = first_bt.is_float();
    let lane_count = fields.len() as u32;

    let (physical_lanes, is_padded, arrangement) = match (lane_bits, lane_count, is_float) {
        (64, 2, true) => (2, false, SimdArrangement::V2d),
        (32, 4, true) => (4, false, SimdArrangement::V4s),
        (32, 3, true) => (4, true, SimdArrangement::V4sPad1),
        (32, 2, true) => (2, false, SimdArrangement::V2s),
        (16, 8, false) => (8, false, SimdArrangement::V8h),
        (16, 4, false) => (4, false, SimdArrangement::V4h),
        (8, 16, false) => (16, false, SimdArrangement::V16b),
        (8, 8, false) => (8, false, SimdArrangement::V8b),
        (32, 4, false) => (4, false, SimdArrangement::V4s),
        (32, 3, false) => (4, true, SimdArrangement::V4sPad1),
        _ => return None,
    };

    Some(SimdInfo {
        lane_count,
        lane_bit_width: lane_bits,
        is_float,
        physical_lanes,
        total_bytes,
        is_padded,
        arrangement,
    })
}

/// Post-order-by-parent traversal: pushes `k`'s parent (if any) onto
/// `order` before `k` itself, so a later linear scan of `order` always
/// relays out a parent before its children. Cycles can't occur here since
/// `detect_inheritance_cycles` has already rejected them.
fn visit_parent_first(
    k: &str,
    classes: &HashMap<String, ClassInfo>,
    visited: &mut std::collections::HashSet<String>,
    order: &mut Vec<String>,
) {
    if visited.contains(k) {
        return;
    }
    visited.insert(k.to_string());
    if let Some(c) = classes.get(k) {
        if let Some(parent_name) = &c.parent_name {
            visit_parent_first(&key(parent_name), classes, visited, order);
        }
    }
    order.push(k.to_string());
}

fn detect_inheritance_cycles(classes: &[(String, Option<String>)]) -> Result<(), String> {
    let by_name: HashMap<&str, Option<&str>> = classes
        .iter()
        .map(|(n, p)| (n.as_str(), p.as_deref()))
        .collect();

    for (name, _) in classes {
        let mut seen = vec![name.as_str()];
        let mut current = name.as_str();
        loop {
            match by_name.get(current).copied().flatten() {
                None => break,
                Some(parent) => {
                    if seen.contains(&parent) {
                        return Err(format!("circular inheritance involving '{}'", name));
                    }
                    seen.push(parent);
                    current = parent;
                }
            }
        }
    }
    Ok(())
}

/// Lays out class fields/methods per §4.2 "Class layout": own fields start
/// at the parent's `object_size` (or the 16-byte header if there is no
/// parent), in source order with natural alignment and an 8-byte final pad.
/// Methods inherit parent slots; overrides replace the inherited slot at
/// the same vtable index; new methods append.
pub fn layout_class(
    parent: Option<&ClassInfo>,
    own_fields: Vec<(String, TypeDescriptor)>,
    own_methods: Vec<(String, TypeDescriptor, Vec<ParamInfo>, String)>,
    class_name: &str,
) -> (Vec<ClassField>, Vec<ClassMethod>, u32) {
    let mut fields = Vec::new();
    let mut offset = parent.map_or(CLASS_HEADER_SIZE, |p| p.object_size);
    if let Some(p) = parent {
        fields.extend(p.fields.iter().cloned());
    }
    for (name, ty) in own_fields {
        let size = ty.base_type.size_bytes().max(1);
        let align = size;
        offset = (offset + align - 1) / align * align;
        fields.push(ClassField {
            name,
            ty,
            offset,
            inherited: false,
        });
        offset += size;
    }
    let object_size = ((offset + 7) / 8) * 8;

    let mut methods: Vec<ClassMethod> = parent.map_or(Vec::new(), |p| p.methods.clone());
    for (name, return_ty, params, mangled) in own_methods {
        if let Some(existing) = methods.iter_mut().find(|m| m.name == name) {
            existing.is_override = true;
            existing.origin_class = class_name.to_string();
            existing.mangled_name = mangled;
            existing.params = params;
            existing.return_ty = return_ty;
        } else {
            let slot = methods.len() as u32;
            methods.push(ClassMethod {
                name,
                mangled_name: mangled,
                vtable_slot: slot,
                is_override: false,
                origin_class: class_name.to_string(),
                params,
                return_ty,
            });
        }
    }

    (fields, methods, object_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BaseType;

    fn field(name: &str, bt: BaseType) -> UdtField {
        UdtField {
            name: name.to_string(),
            ty: TypeDescriptor::simple(bt),
            type_name: format!("{:?}", bt),
            builtin: true,
        }
    }

    #[test]
    fn simd_classifies_v4s() {
        let fields = vec![
            field("x", BaseType::Single),
            field("y", BaseType::Single),
            field("z", BaseType::Single),
            field("w", BaseType::Single),
        ];
        let simd = classify_simd(&fields).unwrap();
        assert_eq!(simd.arrangement, SimdArrangement::V4s);
        assert!(!simd.is_padded);
    }

    #[test]
    fn simd_pads_3_lane_single() {
        let fields = vec![
            field("x", BaseType::Single),
            field("y", BaseType::Single),
            field("z", BaseType::Single),
        ];
        let simd = classify_simd(&fields).unwrap();
        assert_eq!(simd.arrangement, SimdArrangement::V4sPad1);
        assert!(simd.is_padded);
    }

    #[test]
    fn simd_rejects_mixed_types() {
        let fields = vec![field("x", BaseType::Single), field("y", BaseType::Integer)];
        assert!(classify_simd(&fields).is_none());
    }

    #[test]
    fn class_parent_fixup_resolves_by_name() {
        let mut table = SymbolTable::new();
        table.declare_class("Animal", None).unwrap();
        table
            .declare_class("Dog", Some("Animal".to_string()))
            .unwrap();
        table.fixup_class_parents().unwrap();
        let animal_id = table.lookup_class("Animal").unwrap().id;
        let dog = table.lookup_class("Dog").unwrap();
        assert_eq!(dog.parent_id, Some(animal_id));
    }

    #[test]
    fn class_cycle_is_rejected() {
        let mut table = SymbolTable::new();
        table.declare_class("A", Some("B".to_string())).unwrap();
        table.declare_class("B", Some("A".to_string())).unwrap();
        assert!(table.fixup_class_parents().is_err());
    }

    #[test]
    fn method_override_keeps_vtable_slot() {
        let animal_methods = vec![(
            "Speak".to_string(),
            TypeDescriptor::simple(BaseType::Void),
            vec![],
            "Animal__Speak".to_string(),
        )];
        let (_, methods, _) = layout_class(None, vec![], animal_methods, "Animal");
        let animal = ClassInfo {
            name: "Animal".into(),
            id: 0,
            parent_name: None,
            parent_id: None,
            object_size: CLASS_HEADER_SIZE,
            fields: vec![],
            methods,
            has_constructor: false,
            constructor_mangled: None,
            constructor_params: vec![],
            has_destructor: false,
            destructor_mangled: None,
        };
        let dog_methods = vec![(
            "Speak".to_string(),
            TypeDescriptor::simple(BaseType::Void),
            vec![],
            "Dog__Speak".to_string(),
        )];
        let (_, dog_methods, _) = layout_class(Some(&animal), vec![], dog_methods, "Dog");
        let speak = dog_methods.iter().find(|m| m.name == "Speak").unwrap();
        assert!(speak.is_override);
        assert_eq!(speak.vtable_slot, 0);
    }
}
