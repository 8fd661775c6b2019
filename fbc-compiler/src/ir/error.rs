//! IR emission error type (§7: "CFG builder and emitter treat truly
//! malformed inputs as fatal and propagate upward"), hand-rolled the way
//! the teacher's `codegen::error::CodeGenError` is: no `thiserror`, just a
//! `Display`/`Error` pair.

#[derive(Debug)]
pub enum EmitError {
    /// A reference the translator cannot resolve — in practice this should
    /// never happen for a program that already passed semantic analysis;
    /// it exists for embedders that call the translator directly.
    UnknownSymbol(String),
}

impl std::fmt::Display for EmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmitError::UnknownSymbol(name) => write!(f, "IR emission: unresolved symbol '{}'", name),
        }
    }
}

impl std::error::Error for EmitError {}
