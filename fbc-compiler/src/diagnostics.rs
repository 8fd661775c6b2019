//! Diagnostic accumulation shared by the lexer and semantic analyzer.
//!
//! Both stages accumulate rather than abort (see §7 of the spec): a caller
//! checks [`Diagnostics::has_errors`] before moving to the next pipeline
//! stage. This mirrors the teacher's `LintDiagnostic`/`Severity` pair in
//! `lint.rs`, generalized to the closed error taxonomy this compiler needs.

use std::fmt;

/// A `(line, column)` location in source coordinates, both 1-indexed for
/// user-facing display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Location { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Lexical error kinds (§7 "Lexical").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    UnexpectedCharacter,
    UnterminatedString,
    InvalidNumber,
}

/// Semantic error kinds, covering references/duplicates/control-flow/types
/// (§7 "Semantic — *").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaErrorKind {
    UndefinedLine,
    UndefinedLabel,
    UndefinedVariable,
    UndefinedArray,
    UndefinedFunction,
    UndefinedType,
    UndefinedClass,
    UndefinedField,
    DuplicateLabel,
    DuplicateLineNumber,
    DuplicateType,
    DuplicateField,
    DuplicateClass,
    FunctionRedeclared,
    ArrayRedeclared,
    NextWithoutFor,
    WendWithoutWhile,
    UntilWithoutRepeat,
    LoopWithoutDo,
    ForWithoutNext,
    WhileWithoutWend,
    DoWithoutLoop,
    RepeatWithoutUntil,
    ReturnWithoutGosub,
    ControlFlowMismatch,
    TypeMismatch,
    TypeError,
    InvalidTypeField,
    CircularTypeDependency,
    ArgumentCountMismatch,
    WrongDimensionCount,
    InvalidArrayIndex,
    CircularInheritance,
    ClassError,
}

/// The union of every diagnostic kind the front end can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lex(LexErrorKind),
    Sema(SemaErrorKind),
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Lex(k) => write!(f, "{:?}", k),
            DiagnosticKind::Sema(k) => write!(f, "{:?}", k),
        }
    }
}

/// One accumulated error: `(kind, message, location)` per §6 "Diagnostics".
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub location: Location,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.location, self.kind, self.message)
    }
}

/// A warning: `(message, location)` per §6.
#[derive(Debug, Clone)]
pub struct Warning {
    pub message: String,
    pub location: Location,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: warning: {}", self.location, self.message)
    }
}

/// Accumulates errors and warnings across a pipeline stage without aborting.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    errors: Vec<Diagnostic>,
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn error(&mut self, kind: DiagnosticKind, message: impl Into<String>, loc: Location) {
        self.errors.push(Diagnostic {
            kind,
            message: message.into(),
            location: loc,
        });
    }

    pub fn warn(&mut self, message: impl Into<String>, loc: Location) {
        self.warnings.push(Warning {
            message: message.into(),
            location: loc,
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn append(&mut self, other: Diagnostics) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Prints every diagnostic with `location: kind: message` (§7
    /// "User-visible behavior") and returns whether any were errors.
    pub fn report(&self) -> bool {
        for w in &self.warnings {
            eprintln!("{}", w);
        }
        for e in &self.errors {
            eprintln!("{}", e);
        }
        self.has_errors()
    }
}
