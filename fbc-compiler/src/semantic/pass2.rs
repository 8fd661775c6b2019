//! Pass 2 — validation (§4.2).
//!
//! Tracks loop contexts on four stacks (`for, while, repeat, do`), marks
//! variable uses, and validates `GOTO`/`GOSUB`/`CREATE` references against
//! what pass 1 collected.

use crate::ast::{Expr, ExprKind, JumpTarget, LValue, Program, Stmt, StmtKind};
use crate::diagnostics::{DiagnosticKind, Diagnostics, SemaErrorKind};
use crate::symbol_table::{Scope, SymbolTable};

#[derive(Default)]
struct LoopStacks {
    for_stack: Vec<()>,
    while_stack: Vec<()>,
    repeat_stack: Vec<()>,
    do_stack: Vec<()>,
}

struct Ctx {
    scope: Scope,
    loops: LoopStacks,
}

pub fn validate(program: &Program, symbols: &mut SymbolTable, diags: &mut Diagnostics) {
    let mut ctx = Ctx {
        scope: Scope::Global,
        loops: LoopStacks::default(),
    };
    validate_stmts(&program.statements, symbols, diags, &mut ctx);

    if !ctx.loops.for_stack.is_empty() {
        diags.error(
            DiagnosticKind::Sema(SemaErrorKind::ForWithoutNext),
            "unclosed FOR at end of program",
            crate::diagnostics::Location::new(0, 0),
        );
    }
    if !ctx.loops.while_stack.is_empty() {
        diags.error(
            DiagnosticKind::Sema(SemaErrorKind::WhileWithoutWend),
            "unclosed WHILE at end of program",
            crate::diagnostics::Location::new(0, 0),
        );
    }
    if !ctx.loops.repeat_stack.is_empty() {
        diags.error(
            DiagnosticKind::Sema(SemaErrorKind::RepeatWithoutUntil),
            "unclosed REPEAT at end of program",
            crate::diagnostics::Location::new(0, 0),
        );
    }
    if !ctx.loops.do_stack.is_empty() {
        diags.error(
            DiagnosticKind::Sema(SemaErrorKind::DoWithoutLoop),
            "unclosed DO at end of program",
            crate::diagnostics::Location::new(0, 0),
        );
    }
}

fn validate_stmts(stmts: &[Stmt], symbols: &mut SymbolTable, diags: &mut Diagnostics, ctx: &mut Ctx) {
    for stmt in stmts {
        validate_stmt(stmt, symbols, diags, ctx);
    }
}

fn validate_stmt(stmt: &Stmt, symbols: &mut SymbolTable, diags: &mut Diagnostics, ctx: &mut Ctx) {
    match &stmt.kind {
        StmtKind::Let { target, value } => {
            use_lvalue(target, symbols, diags, ctx, stmt.location);
            use_expr(value, symbols, diags, ctx);
        }
        StmtKind::Print { items } => {
            for e in items {
                use_expr(e, symbols, diags, ctx);
            }
        }
        StmtKind::Call { args, .. } => {
            for e in args {
                use_expr(e, symbols, diags, ctx);
            }
        }
        StmtKind::ExprStmt(e) => use_expr(e, symbols, diags, ctx),
        StmtKind::Inc { target } | StmtKind::Dec { target } => {
            use_lvalue(target, symbols, diags, ctx, stmt.location);
        }
        StmtKind::Swap { a, b } => {
            use_lvalue(a, symbols, diags, ctx, stmt.location);
            use_lvalue(b, symbols, diags, ctx, stmt.location);
        }
        StmtKind::Read { targets } => {
            for t in targets {
                use_lvalue(t, symbols, diags, ctx, stmt.location);
            }
        }
        StmtKind::If { cond, then_branch, elseifs, else_branch } => {
            use_expr(cond, symbols, diags, ctx);
            validate_stmts(then_branch, symbols, diags, ctx);
            for (c, body) in elseifs {
                use_expr(c, symbols, diags, ctx);
                validate_stmts(body, symbols, diags, ctx);
            }
            if let Some(body) = else_branch {
                validate_stmts(body, symbols, diags, ctx);
            }
        }
        StmtKind::For { var, start, end, step, body } => {
            use_expr(start, symbols, diags, ctx);
            use_expr(end, symbols, diags, ctx);
            if let Some(s) = step {
                use_expr(s, symbols, diags, ctx);
            }
            symbols.mark_used(&ctx.scope, var, stmt.location);
            ctx.loops.for_stack.push(());
            validate_stmts(body, symbols, diags, ctx);
            ctx.loops.for_stack.pop();
        }
        StmtKind::ForEach { collection, body, .. } => {
            use_expr(collection, symbols, diags, ctx);
            ctx.loops.for_stack.push(());
            validate_stmts(body, symbols, diags, ctx);
            ctx.loops.for_stack.pop();
        }
        StmtKind::While { cond, body } => {
            use_expr(cond, symbols, diags, ctx);
            ctx.loops.while_stack.push(());
            validate_stmts(body, symbols, diags, ctx);
            ctx.loops.while_stack.pop();
        }
        StmtKind::DoLoop { condition, body } => {
            if let Some(cond) = condition {
                let e = match cond {
                    crate::ast::DoCondition::PreWhile(e)
                    | crate::ast::DoCondition::PreUntil(e)
                    | crate::ast::DoCondition::PostWhile(e)
                    | crate::ast::DoCondition::PostUntil(e) => e,
                };
                use_expr(e, symbols, diags, ctx);
            }
            ctx.loops.do_stack.push(());
            validate_stmts(body, symbols, diags, ctx);
            ctx.loops.do_stack.pop();
        }
        StmtKind::Repeat { body, until } => {
            ctx.loops.repeat_stack.push(());
            validate_stmts(body, symbols, diags, ctx);
            ctx.loops.repeat_stack.pop();
            use_expr(until, symbols, diags, ctx);
        }
        StmtKind::SelectCase { selector, cases, otherwise } => {
            use_expr(selector, symbols, diags, ctx);
            for (matches, body) in cases {
                for m in matches {
                    use_expr(m, symbols, diags, ctx);
                }
                validate_stmts(body, symbols, diags, ctx);
            }
            if let Some(body) = otherwise {
                validate_stmts(body, symbols, diags, ctx);
            }
        }
        StmtKind::TryCatch { try_body, catches, finally } => {
            validate_stmts(try_body, symbols, diags, ctx);
            for (_, body) in catches {
                validate_stmts(body, symbols, diags, ctx);
            }
            if let Some(body) = finally {
                validate_stmts(body, symbols, diags, ctx);
            }
        }
        StmtKind::Goto { target } | StmtKind::Gosub { target } => {
            validate_jump_target(target, symbols, diags, stmt.location);
        }
        StmtKind::OnGoto { selector, targets, .. } => {
            use_expr(selector, symbols, diags, ctx);
            for t in targets {
                validate_jump_target(t, symbols, diags, stmt.location);
            }
        }
        StmtKind::Return => {
            // §9 leaves GOSUB/RETURN nesting semantics to the implementer;
            // we do not require a matching GOSUB context here (a CFG-level
            // concern, §4.3), only that RETURN appears somewhere sensible.
        }
        StmtKind::Exit { kind } => {
            let ok = match kind {
                crate::ast::ExitKind::For => !ctx.loops.for_stack.is_empty(),
                crate::ast::ExitKind::Do => !ctx.loops.do_stack.is_empty(),
                crate::ast::ExitKind::While => !ctx.loops.while_stack.is_empty(),
                crate::ast::ExitKind::Repeat => !ctx.loops.repeat_stack.is_empty(),
            };
            if !ok {
                diags.error(
                    DiagnosticKind::Sema(SemaErrorKind::ControlFlowMismatch),
                    "EXIT used outside a matching loop",
                    stmt.location,
                );
            }
        }
        StmtKind::FunctionDef { name, body, .. } | StmtKind::SubDef { name, body, .. } => {
            let outer = std::mem::replace(&mut ctx.scope, Scope::Function(name.clone()));
            validate_stmts(body, symbols, diags, ctx);
            ctx.scope = outer;
        }
        StmtKind::ClassDef { name, methods, constructor, destructor, .. } => {
            let outer = std::mem::replace(&mut ctx.scope, Scope::Function(name.clone()));
            for m in methods {
                validate_stmts(&m.body, symbols, diags, ctx);
            }
            if let Some(c) = constructor {
                validate_stmts(&c.body, symbols, diags, ctx);
            }
            if let Some(d) = destructor {
                validate_stmts(&d.body, symbols, diags, ctx);
            }
            ctx.scope = outer;
        }
        StmtKind::Orphan { keyword } => {
            let kind = match keyword.as_str() {
                "NEXT" => SemaErrorKind::NextWithoutFor,
                "WEND" => SemaErrorKind::WendWithoutWhile,
                "LOOP" => SemaErrorKind::LoopWithoutDo,
                "UNTIL" => SemaErrorKind::UntilWithoutRepeat,
                _ => SemaErrorKind::ControlFlowMismatch,
            };
            diags.error(
                DiagnosticKind::Sema(kind),
                format!("{} without matching opener", keyword),
                stmt.location,
            );
        }
        _ => {}
    }
}

fn validate_jump_target(
    target: &JumpTarget,
    symbols: &SymbolTable,
    diags: &mut Diagnostics,
    loc: crate::diagnostics::Location,
) {
    match target {
        JumpTarget::Label(name) => {
            if symbols.lookup_label(name).is_none() {
                diags.error(
                    DiagnosticKind::Sema(SemaErrorKind::UndefinedLabel),
                    format!("undefined label '{}'", name),
                    loc,
                );
            }
        }
        JumpTarget::Line(n) => {
            if symbols.lookup_line(*n).is_none() {
                diags.error(
                    DiagnosticKind::Sema(SemaErrorKind::UndefinedLine),
                    format!("undefined line {}", n),
                    loc,
                );
            }
        }
    }
}

fn use_lvalue(
    lvalue: &LValue,
    symbols: &mut SymbolTable,
    diags: &mut Diagnostics,
    ctx: &Ctx,
    loc: crate::diagnostics::Location,
) {
    match lvalue {
        LValue::Variable(name) => symbols.mark_used(&ctx.scope, name, loc),
        LValue::ArrayElement { name, indices } => {
            symbols.mark_used(&ctx.scope, name, loc);
            for i in indices {
                use_expr(i, symbols, diags, ctx);
            }
        }
        LValue::Field { base, .. } => use_lvalue(base, symbols, diags, ctx, loc),
    }
}

fn use_expr(expr: &Expr, symbols: &mut SymbolTable, diags: &mut Diagnostics, ctx: &Ctx) {
    match &expr.kind {
        ExprKind::Variable(name) => symbols.mark_used(&ctx.scope, name, expr.location),
        ExprKind::ArrayAccess { name, indices } => {
            symbols.mark_used(&ctx.scope, name, expr.location);
            if symbols.lookup_array(name).is_none() {
                diags.error(
                    DiagnosticKind::Sema(SemaErrorKind::UndefinedArray),
                    format!("undefined array '{}'", name),
                    expr.location,
                );
            }
            for i in indices {
                use_expr(i, symbols, diags, ctx);
            }
        }
        ExprKind::FieldAccess { base, .. } => use_expr(base, symbols, diags, ctx),
        ExprKind::Binary { lhs, rhs, .. } => {
            use_expr(lhs, symbols, diags, ctx);
            use_expr(rhs, symbols, diags, ctx);
        }
        ExprKind::Unary { operand, .. } => use_expr(operand, symbols, diags, ctx),
        ExprKind::Call { name, args } => {
            // The parser cannot tell a function call from an array index
            // apart (`F(1)` is either, depending on what `F` was declared
            // as), so it always produces `Call`; resolve the ambiguity
            // here against whichever registry actually has the name.
            if symbols.lookup_array(name).is_some() {
                symbols.mark_used(&ctx.scope, name, expr.location);
            } else if symbols.lookup_function(name).is_none() && !crate::builtins::is_builtin(name) {
                diags.error(
                    DiagnosticKind::Sema(SemaErrorKind::UndefinedFunction),
                    format!("undefined function '{}'", name),
                    expr.location,
                );
            }
            for a in args {
                use_expr(a, symbols, diags, ctx);
            }
        }
        ExprKind::Iif { cond, then_value, else_value } => {
            use_expr(cond, symbols, diags, ctx);
            use_expr(then_value, symbols, diags, ctx);
            use_expr(else_value, symbols, diags, ctx);
        }
        ExprKind::New { class_name, args } => {
            if symbols.lookup_class(class_name).is_none() {
                diags.error(
                    DiagnosticKind::Sema(SemaErrorKind::UndefinedClass),
                    format!("undefined class '{}'", class_name),
                    expr.location,
                );
            }
            for a in args {
                use_expr(a, symbols, diags, ctx);
            }
        }
        ExprKind::Create { type_name, args } => {
            if symbols.lookup_udt(type_name).is_none() {
                diags.error(
                    DiagnosticKind::Sema(SemaErrorKind::UndefinedType),
                    format!("CREATE references undefined type '{}'", type_name),
                    expr.location,
                );
            }
            for (_, a) in args {
                use_expr(a, symbols, diags, ctx);
            }
        }
        ExprKind::MethodCall { base, args, .. } => {
            use_expr(base, symbols, diags, ctx);
            for a in args {
                use_expr(a, symbols, diags, ctx);
            }
        }
        ExprKind::NumberLiteral(_) | ExprKind::StringLiteral(_) | ExprKind::BoolLiteral(_) => {}
    }
}
