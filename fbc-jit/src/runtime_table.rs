//! The runtime jump table (§4.7): a declarative array pairing each external
//! symbol name with the address of a directly-linked runtime function,
//! built lazily on first use since the addresses aren't compile-time
//! constants. Reads after initialization are thread-safe (§5).

use std::collections::HashMap;
use std::ffi::{c_char, CStr};
use std::sync::OnceLock;

/// Names mirror `fbc::ir::runtime_decls::symbols` one-for-one; duplicated
/// here rather than imported so this crate doesn't depend back on the
/// compiler crate that depends on it.
mod names {
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
    pub const GOSUB_PUSH: &str = "_gosub_push";
    pub const GOSUB_POP: &str = "_gosub_pop";
    pub const ITER_HAS_NEXT: &str = "_iter_has_next";
    pub const ITER_NEXT: &str = "_iter_next";
}

thread_local! {
    static GOSUB_STACK: std::cell::RefCell<Vec<i64>> = std::cell::RefCell::new(Vec::new());
    static DATA_CURSOR: std::cell::RefCell<usize> = std::cell::RefCell::new(0);
}

extern "C" fn basic_print_int(v: i64) {
    print!("{}", v);
}

extern "C" fn basic_print_double(v: f64) {
    print!("{}", v);
}

extern "C" fn basic_print_string(ptr: *const c_char) {
    if ptr.is_null() {
        return;
    }
    let s = unsafe { CStr::from_ptr(ptr) };
    print!("{}", s.to_string_lossy());
}

extern "C" fn basic_print_newline() {
    println!();
}

extern "C" fn string_concat(a: *const c_char, b: *const c_char) -> *const c_char {
    let sa = if a.is_null() { "".into() } else { unsafe { CStr::from_ptr(a) }.to_string_lossy() };
    let sb = if b.is_null() { "".into() } else { unsafe { CStr::from_ptr(b) }.to_string_lossy() };
    let joined = format!("{}{}\0", sa, sb);
    let leaked: &'static str = Box::leak(joined.into_boxed_str());
    leaked.as_ptr() as *const c_char
}

extern "C" fn math_power(base: f64, exp: f64) -> f64 {
    base.powf(exp)
}

extern "C" fn array_element_addr(desc_ptr: *mut u8, index: i64, element_width: i64) -> *mut u8 {
    unsafe { desc_ptr.offset((index * element_width) as isize) }
}

extern "C" fn object_alloc(size: i64) -> *mut u8 {
    let layout = std::alloc::Layout::from_size_align(size.max(1) as usize, 8).unwrap();
    unsafe { std::alloc::alloc_zeroed(layout) }
}

extern "C" fn samm_init() {}

extern "C" fn samm_shutdown() {}

extern "C" fn data_read_next() -> i64 {
    DATA_CURSOR.with(|c| {
        let mut c = c.borrow_mut();
        let v = *c as i64;
        *c += 1;
        v
    })
}

extern "C" fn data_restore(point: i64) {
    DATA_CURSOR.with(|c| *c.borrow_mut() = point.max(0) as usize);
}

extern "C" fn hashmap_get(_map: *mut u8, _key: *const c_char) -> i64 {
    0
}

extern "C" fn hashmap_set(_map: *mut u8, _key: *const c_char, _value: i64) {}

extern "C" fn list_get(_list: *mut u8, _index: i64) -> i64 {
    0
}

extern "C" fn list_append(_list: *mut u8, _value: i64) {}

extern "C" fn gosub_push(id: i64) {
    GOSUB_STACK.with(|s| s.borrow_mut().push(id));
}

extern "C" fn gosub_pop() -> i64 {
    GOSUB_STACK.with(|s| s.borrow_mut().pop().unwrap_or(-1))
}

extern "C" fn iter_has_next(_iter: *mut u8) -> i64 {
    0
}

extern "C" fn iter_next(_iter: *mut u8) -> i64 {
    0
}

/// Looks up `symbol`'s address in the lazily-built table, falling back to
/// `None` on a miss so the linker can allocate a trap stub instead (§4.7).
pub fn lookup(symbol: &str) -> Option<u64> {
    table().get(symbol).copied()
}

fn table() -> &'static HashMap<&'static str, u64> {
    static TABLE: OnceLock<HashMap<&'static str, u64>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut m: HashMap<&'static str, u64> = HashMap::new();
        m.insert(names::PRINT_INT, basic_print_int as usize as u64);
        m.insert(names::PRINT_DOUBLE, basic_print_double as usize as u64);
        m.insert(names::PRINT_STRING, basic_print_string as usize as u64);
        m.insert(names::PRINT_NEWLINE, basic_print_newline as usize as u64);
        m.insert(names::STRING_CONCAT, string_concat as usize as u64);
        m.insert(names::MATH_POWER, math_power as usize as u64);
        m.insert(names::ARRAY_ELEMENT_ADDR, array_element_addr as usize as u64);
        m.insert(names::OBJECT_ALLOC, object_alloc as usize as u64);
        m.insert(names::SAMM_INIT, samm_init as usize as u64);
        m.insert(names::SAMM_SHUTDOWN, samm_shutdown as usize as u64);
        m.insert(names::DATA_READ_NEXT, data_read_next as usize as u64);
        m.insert(names::DATA_RESTORE, data_restore as usize as u64);
        m.insert(names::HASHMAP_GET, hashmap_get as usize as u64);
        m.insert(names::HASHMAP_SET, hashmap_set as usize as u64);
        m.insert(names::LIST_GET, list_get as usize as u64);
        m.insert(names::LIST_APPEND, list_append as usize as u64);
        m.insert(names::GOSUB_PUSH, gosub_push as usize as u64);
        m.insert(names::GOSUB_POP, gosub_pop as usize as u64);
        m.insert(names::ITER_HAS_NEXT, iter_has_next as usize as u64);
        m.insert(names::ITER_NEXT, iter_next as usize as u64);
        m
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_symbols_resolve() {
        assert!(lookup(names::PRINT_INT).is_some());
        assert!(lookup(names::GOSUB_PUSH).is_some());
    }

    #[test]
    fn unknown_symbol_misses() {
        assert!(lookup("_not_a_real_symbol").is_none());
    }

    #[test]
    fn gosub_stack_is_lifo() {
        gosub_push(1);
        gosub_push(2);
        assert_eq!(gosub_pop(), 2);
        assert_eq!(gosub_pop(), 1);
    }
}
