//! FasterBASIC front end: lexer, parser, semantic analyzer, CFG builder and
//! IR emitter (§1). The JIT backend lives in the separate `fbc-jit` crate
//! and is reached through [`compile_and_run`] when the `jit` feature is on.

pub mod ast;
pub mod builtins;
pub mod cfg;
pub mod config;
pub mod diagnostics;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod semantic;
pub mod symbol_table;
pub mod types;

use diagnostics::Diagnostics;

/// Everything produced by running source through every in-scope pipeline
/// stage up to and including IR emission (§1 diagram: Lexer → Parser →
/// Semantic Analyzer → CFG Builder → IR Emitter).
pub struct CompileResult {
    pub symbols: symbol_table::SymbolTable,
    pub cfgs: Vec<cfg::FunctionCfg>,
    pub ir: ir::IrModule,
    pub diagnostics: Diagnostics,
}

/// Runs the full front end over `source`, stopping at the first stage that
/// has errors (§7: diagnostics accumulate within a stage, but a stage with
/// errors does not hand its output to the next one).
pub fn compile(source: &str, config: &config::CompilerConfig) -> Result<CompileResult, Diagnostics> {
    let stream = lexer::tokenize(source);
    let mut diagnostics = stream.diagnostics;
    if diagnostics.has_errors() {
        return Err(diagnostics);
    }

    let program = parser::parse(source).map_err(|e| {
        let mut d = Diagnostics::new();
        d.error(
            diagnostics::DiagnosticKind::Lex(diagnostics::LexErrorKind::UnexpectedCharacter),
            e,
            diagnostics::Location::new(0, 0),
        );
        d
    })?;

    let analysis = semantic::analyze(&program);
    let mut symbols = analysis.symbols;
    diagnostics.append(analysis.diagnostics);
    if diagnostics.has_errors() {
        return Err(diagnostics);
    }

    let cfgs = cfg::build(&program);

    let ir = ir::emit(&program, &mut symbols, config);

    Ok(CompileResult {
        symbols,
        cfgs,
        ir,
        diagnostics,
    })
}

#[cfg(feature = "jit")]
pub fn compile_and_run(source: &str, config: &config::CompilerConfig) -> Result<i64, String> {
    let result = compile(source, config).map_err(|d| {
        let mut msg = String::new();
        for e in d.errors() {
            msg.push_str(&format!("{}\n", e));
        }
        msg
    })?;
    fbc_jit::run_module(result.ir.text()).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_hello_world_end_to_end() {
        let cfg = config::CompilerConfig::default();
        let result = compile("PRINT \"Hello, world!\"\n", &cfg).expect("should compile");
        assert!(!result.diagnostics.has_errors());
        assert_eq!(result.cfgs.len(), 1);
    }

    #[test]
    fn undefined_label_fails_before_cfg() {
        let cfg = config::CompilerConfig::default();
        let err = compile("GOTO NOWHERE\n", &cfg).unwrap_err();
        assert!(err.has_errors());
    }
}
