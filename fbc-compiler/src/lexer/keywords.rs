//! The process-lifetime keyword map (§4.1, §5 "Scheduling model").
//!
//! Built lazily on first use and read-only afterwards. `OnceLock` gives us
//! the "tolerate racing first-use, then read-only" behavior the spec asks
//! for without hand-rolling the mutex ourselves.

use super::token::TokenKind;
use std::collections::HashMap;
use std::sync::OnceLock;

static KEYWORD_MAP: OnceLock<HashMap<&'static str, TokenKind>> = OnceLock::new();

/// Case-insensitive keyword lookup. Callers pass an already-uppercased
/// spelling; see [`lookup`] for the convenience wrapper.
fn table() -> &'static HashMap<&'static str, TokenKind> {
    KEYWORD_MAP.get_or_init(|| {
        use TokenKind::*;
        HashMap::from([
            ("LET", KwLet),
            ("DIM", KwDim),
            ("GLOBAL", KwGlobal),
            ("CONST", KwConst),
            ("IF", KwIf),
            ("THEN", KwThen),
            ("ELSE", KwElse),
            ("ELSEIF", KwElseIf),
            ("FOR", KwFor),
            ("TO", KwTo),
            ("STEP", KwStep),
            ("NEXT", KwNext),
            ("EACH", KwForEach),
            ("IN", KwIn),
            ("WHILE", KwWhile),
            ("WEND", KwWend),
            ("DO", KwDo),
            ("LOOP", KwLoop),
            ("UNTIL", KwUntil),
            ("REPEAT", KwRepeat),
            ("SELECT", KwSelect),
            ("CASE", KwCase),
            ("GOTO", KwGoto),
            ("GOSUB", KwGosub),
            ("RETURN", KwReturn),
            ("ON", KwOn),
            ("FUNCTION", KwFunction),
            ("SUB", KwSub),
            ("TYPE", KwType),
            ("CLASS", KwClass),
            ("EXTENDS", KwExtends),
            ("METHOD", KwMethod),
            ("CONSTRUCTOR", KwConstructor),
            ("DESTRUCTOR", KwDestructor),
            ("NEW", KwNew),
            ("CREATE", KwCreate),
            ("AS", KwAs),
            ("BYREF", KwByRef),
            ("BYVAL", KwByVal),
            ("PRINT", KwPrint),
            ("INPUT", KwInput),
            ("DATA", KwData),
            ("READ", KwRead),
            ("RESTORE", KwRestore),
            ("INC", KwInc),
            ("DEC", KwDec),
            ("SWAP", KwSwap),
            ("EXIT", KwExit),
            ("END", KwEnd),
            ("TRY", KwTry),
            ("CATCH", KwCatch),
            ("FINALLY", KwFinally),
            ("MATCH", KwMatch),
            ("WORKER", KwWorker),
            ("AND", KwAnd),
            ("OR", KwOr),
            ("NOT", KwNot),
            ("XOR", KwXor),
            ("MOD", KwMod),
            ("REM", KwRem),
            ("TRUE", KwTrue),
            ("FALSE", KwFalse),
            ("IIF", KwIif),
        ])
    })
}

/// Looks up an identifier's spelling (case-insensitively) in the keyword
/// table. Returns `None` for anything not a reserved word.
pub fn lookup(spelling: &str) -> Option<TokenKind> {
    let upper = spelling.to_ascii_uppercase();
    table().get(upper.as_str()).copied()
}

/// Words that follow `END` and collapse into a single compound token
/// (§4.1 "Compound END"). `CLASS`, `METHOD`, `CONSTRUCTOR`, `DESTRUCTOR`
/// are deliberately excluded: the parser needs the two-token form to
/// disambiguate a bare `END` (program terminator) inside a class body.
pub fn end_compound(word: &str) -> Option<TokenKind> {
    use TokenKind::*;
    match word.to_ascii_uppercase().as_str() {
        "SUB" => Some(KwEndSub),
        "FUNCTION" => Some(KwEndFunction),
        "TYPE" => Some(KwEndType),
        "IF" => Some(KwEndIf),
        "CASE" => Some(KwEndCase),
        "SELECT" => Some(KwEndSelect),
        "MATCH" => Some(KwEndMatch),
        "WORKER" => Some(KwEndWorker),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_lookup_is_case_insensitive() {
        assert_eq!(lookup("if"), lookup("IF"));
        assert_eq!(lookup("If"), Some(TokenKind::KwIf));
    }

    #[test]
    fn unknown_word_is_not_a_keyword() {
        assert_eq!(lookup("FROBNICATE"), None);
    }

    #[test]
    fn end_compound_excludes_class_family() {
        assert!(end_compound("SUB").is_some());
        assert!(end_compound("CLASS").is_none());
        assert!(end_compound("METHOD").is_none());
    }
}
