//! The runtime library declarer (§4.4 collaborator 4) and its ABI symbol
//! names (§6 "JIT boundary": "the generated code's external-symbol
//! convention uses a leading underscore"). `call_void`/`call_returning` are
//! the two helpers every statement/expression lowering function goes
//! through to reach the runtime, so every external call is declared
//! exactly once and counted for §8's E2 assertion.

use super::builder::IrBuilder;

pub mod symbols {
    pub const PRINT_INT: &str = "_basic_print_int";
    pub const PRINT_DOUBLE: &str = "_basic_print_double";
    pub const PRINT_STRING: &str = "_basic_print_string";
    pub const PRINT_NEWLINE: &str = "_basic_print_newline";
    pub const STRING_CONCAT: &str = "_string_concat";
    pub const MATH_POWER: &str = "_math_power";
    pub const ARRAY_ELEMENT_ADDR: &str = "_array_element_addr";
    pub const OBJECT_ALLOC: &str = "_object_alloc";
    pub const SAMM_INIT: &str = "_samm_init";
    pub const SAMM_SHUTDOWN: &str = "_samm_shutdown";
    pub const DATA_READ_NEXT: &str = "_data_read_next";
    pub const DATA_RESTORE: &str = "_data_restore";
    pub const HASHMAP_GET: &str = "_hashmap_get";
    pub const HASHMAP_SET: &str = "_hashmap_set";
    pub const LIST_GET: &str = "_list_get";
    pub const LIST_APPEND: &str = "_list_append";
    /// GOSUB/RETURN are modeled as a runtime-held stack of resume ids rather
    /// than a computed branch, since the textual IR has no syntax for one.
    pub const GOSUB_PUSH: &str = "_gosub_push";
    pub const GOSUB_POP: &str = "_gosub_pop";
    pub const ITER_HAS_NEXT: &str = "_iter_has_next";
    pub const ITER_NEXT: &str = "_iter_next";
}

/// Emits `call $name(args)` and declares the symbol's ABI comment the first
/// time it is referenced.
pub fn call_void(b: &mut IrBuilder, symbol: &str, args: &[String]) {
    b.declare_runtime(symbol, format!("# extern void {}(...)", symbol));
    b.note_external_call();
    b.emit(format!("call ${}({})", symbol, args.join(", ")));
}

/// Like [`call_void`] but binds the call's result to `dest` of IR type
/// `ty_letter` (§6 "`<dest> =<type> call $name(args)`").
pub fn call_returning(b: &mut IrBuilder, dest: &str, ty_letter: &str, symbol: &str, args: &[String]) {
    b.declare_runtime(symbol, format!("# extern {} {}(...)", ty_letter, symbol));
    b.note_external_call();
    b.emit(format!(
        "{} ={} call ${}({})",
        dest,
        ty_letter,
        symbol,
        args.join(", ")
    ));
}
