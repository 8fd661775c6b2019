//! Token tags. Tokens never own source bytes (§3.1): a `Token<'src>` borrows
//! its lexeme from the source buffer, so its lifetime is tied to it.

use crate::diagnostics::Location;

/// The discriminated token tag. The full dialect has on the order of 250
/// keywords; this enumerates the structural/operator/literal tags plus a
/// representative keyword set large enough to exercise every lexer rule in
/// §4.1 (type-suffix disambiguation, compound `END`, `REM`/`'` comments,
/// `?` as `PRINT` shorthand) without claiming to be the full dialect table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals / identifiers
    Identifier,
    NumberLiteral,
    StringLiteral,
    TypeSuffix(TypeSuffix),

    // Structural
    EndOfLine,
    EndOfFile,

    // Keywords (representative subset of ~250; see `keywords::KEYWORDS`)
    KwLet,
    KwDim,
    KwGlobal,
    KwConst,
    KwIf,
    KwThen,
    KwElse,
    KwElseIf,
    KwEndIf,
    KwFor,
    KwTo,
    KwStep,
    KwNext,
    KwForEach,
    KwIn,
    KwWhile,
    KwWend,
    KwDo,
    KwLoop,
    KwUntil,
    KwRepeat,
    KwSelect,
    KwCase,
    KwCaseElse,
    KwEndCase,
    KwEndSelect,
    KwGoto,
    KwGosub,
    KwReturn,
    KwOn,
    KwLabel,
    KwFunction,
    KwEndFunction,
    KwSub,
    KwEndSub,
    KwType,
    KwEndType,
    KwClass,
    KwEndClass,
    KwExtends,
    KwMethod,
    KwEndMethod,
    KwConstructor,
    KwEndConstructor,
    KwDestructor,
    KwEndDestructor,
    KwNew,
    KwCreate,
    KwAs,
    KwByRef,
    KwByVal,
    KwPrint,
    KwInput,
    KwData,
    KwRead,
    KwRestore,
    KwInc,
    KwDec,
    KwSwap,
    KwExit,
    KwEnd,
    KwTry,
    KwCatch,
    KwFinally,
    KwEndTry,
    KwMatch,
    KwEndMatch,
    KwWorker,
    KwEndWorker,
    KwAnd,
    KwOr,
    KwNot,
    KwXor,
    KwMod,
    KwRem,
    KwTrue,
    KwFalse,
    KwIif,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    BackSlash, // integer divide
    Caret,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Ampersand,

    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Question, // shorthand for PRINT

    // Sentinels
    Unknown,
    UnterminatedString,
}

/// The six numeric type-suffix characters (§3.1, §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSuffix {
    Percent,  // %  integer
    Bang,     // !  single
    Hash,     // #  double
    At,       // @  currency/decimal-ish; kept distinct per dialect
    Amp,      // &  long
    Caret,    // ^  pointer/unsigned, dialect defined
    Dollar,   // $  string
}

impl TypeSuffix {
    pub fn from_char(c: char) -> Option<TypeSuffix> {
        match c {
            '%' => Some(TypeSuffix::Percent),
            '!' => Some(TypeSuffix::Bang),
            '#' => Some(TypeSuffix::Hash),
            '@' => Some(TypeSuffix::At),
            '&' => Some(TypeSuffix::Amp),
            '^' => Some(TypeSuffix::Caret),
            '$' => Some(TypeSuffix::Dollar),
            _ => None,
        }
    }
}

/// A single token. The lexeme is a borrowed slice of the source buffer;
/// numbers carry a pre-parsed `f64`; strings carry a non-ASCII flag.
#[derive(Debug, Clone, Copy)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub lexeme: &'src str,
    pub number: Option<f64>,
    pub non_ascii: bool,
    pub location: Location,
}

impl<'src> Token<'src> {
    pub fn new(kind: TokenKind, lexeme: &'src str, location: Location) -> Self {
        Token {
            kind,
            lexeme,
            number: None,
            non_ascii: false,
            location,
        }
    }

    pub fn is_keyword(&self) -> bool {
        !matches!(
            self.kind,
            TokenKind::Identifier
                | TokenKind::NumberLiteral
                | TokenKind::StringLiteral
                | TokenKind::TypeSuffix(_)
                | TokenKind::EndOfLine
                | TokenKind::EndOfFile
                | TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Slash
                | TokenKind::BackSlash
                | TokenKind::Caret
                | TokenKind::Equal
                | TokenKind::NotEqual
                | TokenKind::Less
                | TokenKind::LessEqual
                | TokenKind::Greater
                | TokenKind::GreaterEqual
                | TokenKind::Ampersand
                | TokenKind::LParen
                | TokenKind::RParen
                | TokenKind::LBracket
                | TokenKind::RBracket
                | TokenKind::Comma
                | TokenKind::Colon
                | TokenKind::Semicolon
                | TokenKind::Dot
                | TokenKind::Question
                | TokenKind::Unknown
                | TokenKind::UnterminatedString
        )
    }
}
