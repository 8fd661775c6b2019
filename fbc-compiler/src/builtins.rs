//! The set of BASIC built-in function/statement names the semantic
//! analyzer treats as always defined, mirroring the teacher's
//! `builtins.rs` registry of names the type checker never flags as
//! undefined.

const BUILTINS: &[&str] = &[
    "ABS", "SGN", "SQR", "SIN", "COS", "TAN", "ATN", "EXP", "LOG", "INT", "FIX", "RND",
    "LEN", "LEFT$", "RIGHT$", "MID$", "INSTR", "UCASE$", "LCASE$", "STR$", "VAL", "CHR$",
    "ASC", "SPACE$", "STRING$", "TRIM$", "NOW", "TIMER",
];

pub fn is_builtin(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    BUILTINS.contains(&upper.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_builtins_case_insensitively() {
        assert!(is_builtin("len"));
        assert!(is_builtin("LEN"));
        assert!(!is_builtin("MyCustomFunc"));
    }
}
