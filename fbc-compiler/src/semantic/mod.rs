//! The two-pass semantic analyzer (§4.2).
//!
//! Pass 1 collects declarations (and never fails fast: unresolvable things
//! become diagnostics, not panics). Pass 2 validates control flow, marks
//! variable uses, and checks references against what pass 1 collected. The
//! analyzer never rewrites the AST (§4.2): every inferred fact lives in the
//! [`SymbolTable`] or in [`Diagnostics`], keyed by name/location.

mod pass1;
mod pass2;

use crate::ast::Program;
use crate::diagnostics::Diagnostics;
use crate::symbol_table::SymbolTable;

pub struct AnalysisResult {
    pub symbols: SymbolTable,
    pub diagnostics: Diagnostics,
}

pub fn analyze(program: &Program) -> AnalysisResult {
    let mut symbols = SymbolTable::new();
    let mut diagnostics = Diagnostics::new();

    pass1::collect(program, &mut symbols, &mut diagnostics);

    if let Err(e) = symbols.fixup_class_parents() {
        diagnostics.error(
            crate::diagnostics::DiagnosticKind::Sema(
                crate::diagnostics::SemaErrorKind::CircularInheritance,
            ),
            e,
            crate::diagnostics::Location::new(0, 0),
        );
    }

    pass2::validate(program, &mut symbols, &mut diagnostics);

    AnalysisResult {
        symbols,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn empty_program_has_no_errors() {
        let program = parse("").unwrap();
        let result = analyze(&program);
        assert!(!result.diagnostics.has_errors());
    }

    #[test]
    fn implicit_variable_gets_double_default() {
        let program = parse("LET X = 1\n").unwrap();
        let result = analyze(&program);
        assert!(!result.diagnostics.has_errors());
        let v = result
            .symbols
            .lookup_variable(&crate::symbol_table::Scope::Global, "X")
            .expect("X should be implicitly declared");
        assert_eq!(v.ty.base_type, crate::types::BaseType::Double);
    }

    #[test]
    fn for_index_is_forced_integer() {
        let program = parse("FOR I = 1 TO 10\nNEXT I\n").unwrap();
        let result = analyze(&program);
        assert!(!result.diagnostics.has_errors());
        let v = result
            .symbols
            .lookup_variable(&crate::symbol_table::Scope::Global, "I")
            .unwrap();
        assert_eq!(v.ty.base_type, crate::types::BaseType::Integer);
    }

    #[test]
    fn undefined_label_is_reported() {
        let program = parse("GOTO NOWHERE\n").unwrap();
        let result = analyze(&program);
        assert!(result.diagnostics.has_errors());
    }

    #[test]
    fn mismatched_next_is_reported() {
        let program = parse("NEXT I\n").unwrap();
        let result = analyze(&program);
        assert!(result.diagnostics.has_errors());
    }
}
