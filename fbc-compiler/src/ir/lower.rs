//! The AST → IR translator (§4.4 collaborator 5): the bulk of emission.
//! Expression lowering returns a [`Value`] holding the temporary that
//! carries the result; statement lowering drives the builder's label/
//! terminator discipline to match the CFG shapes built in [`crate::cfg`].

use super::builder::IrBuilder;
use super::mangle::*;
use super::runtime_decls::{call_returning, call_void, symbols};
use super::type_manager::TypeManager;
use crate::ast::*;
use crate::config::CompilerConfig;
use crate::symbol_table::{ConstantValue, Scope, SymbolTable};
use crate::types::{promote, BaseType, TypeDescriptor};

struct Value {
    reg: String,
    ty: BaseType,
}

impl Value {
    fn new(reg: String, ty: BaseType) -> Self {
        Value { reg, ty }
    }
}

/// Resolution-time context threaded through statement/expression lowering:
/// the current scope key, the four loop-exit label stacks `EXIT` consults
/// (mirrors pass 2's `LoopStacks` and the CFG builder's `*_exits` stacks),
/// and the GOSUB/RETURN bookkeeping (§9 open question, resolved here: a
/// runtime-held return-address *id*, dispatched through one cascading
/// comparison block rather than a computed branch — see `DESIGN.md`).
struct Ctx {
    scope: Scope,
    for_exits: Vec<String>,
    while_exits: Vec<String>,
    do_exits: Vec<String>,
    repeat_exits: Vec<String>,
    gosub_sites: Vec<(i64, String)>,
    next_gosub_id: i64,
}

impl Ctx {
    fn top() -> Self {
        Ctx {
            scope: Scope::Global,
            for_exits: Vec::new(),
            while_exits: Vec::new(),
            do_exits: Vec::new(),
            repeat_exits: Vec::new(),
            gosub_sites: Vec::new(),
            next_gosub_id: 0,
        }
    }
}

pub fn lower_program(b: &mut IrBuilder, program: &Program, symbols: &mut SymbolTable, _config: &CompilerConfig) {
    emit_data_segment(b, symbols);

    let mut top_level = Vec::new();
    let mut defs = Vec::new();
    for stmt in &program.statements {
        match &stmt.kind {
            StmtKind::FunctionDef { .. } | StmtKind::SubDef { .. } | StmtKind::ClassDef { .. } => {
                defs.push(stmt.clone());
            }
            StmtKind::TypeDef { .. } => {}
            _ => top_level.push(stmt.clone()),
        }
    }

    b.begin_function("export function w $main()");
    call_void(b, symbols::SAMM_INIT, &[]);
    let mut ctx = Ctx::top();
    lower_stmts(b, &top_level, symbols, &mut ctx);
    if !b.is_terminated() {
        b.emit_terminator("jmp @program_exit");
    }
    emit_gosub_dispatch(b, &ctx);
    b.emit_label("program_exit");
    call_void(b, symbols::SAMM_SHUTDOWN, &[]);
    b.emit_terminator("ret 0");
    b.end_function();

    for stmt in &defs {
        lower_def(b, stmt, symbols);
    }
}

fn emit_data_segment(b: &mut IrBuilder, symbols: &SymbolTable) {
    if symbols.data.values.is_empty() {
        return;
    }
    let mut parts = Vec::new();
    for v in &symbols.data.values {
        match v {
            DataLiteral::Integer(n) => parts.push(format!("l {}", n)),
            DataLiteral::Double(n) => parts.push(format!("d {}", n)),
            DataLiteral::Str(s) => {
                let label = b.intern_string(s);
                parts.push(format!("l ${}", label));
            }
        }
    }
    b.declare_global(format!("data $data_segment = {{ {} }}", parts.join(", ")));
}

fn lower_def(b: &mut IrBuilder, stmt: &Stmt, symbols: &mut SymbolTable) {
    match &stmt.kind {
        StmtKind::FunctionDef { name, params, body, inline_expr, .. } => {
            let mangled = function_symbol(name);
            let info = symbols.lookup_function(name).cloned();
            let ret_letter = info
                .as_ref()
                .map(|f| TypeManager::ir_letter(&f.return_ty))
                .unwrap_or("d");
            let header = format!(
                "export function {} ${}({})",
                ret_letter,
                mangled,
                param_list(params)
            );
            b.begin_function(header);
            let mut ctx = Ctx::top();
            ctx.scope = Scope::Function(name.clone());
            if let Some(expr) = inline_expr {
                let v = lower_expr(b, expr, symbols, &mut ctx);
                b.emit_terminator(format!("ret {}", v.reg));
            } else {
                lower_stmts(b, body, symbols, &mut ctx);
                if !b.is_terminated() {
                    b.emit_terminator("ret 0");
                }
            }
            b.end_function();
        }
        StmtKind::SubDef { name, params, body } => {
            let mangled = sub_symbol(name);
            let header = format!("export function ${}({})", mangled, param_list(params));
            b.begin_function(header);
            let mut ctx = Ctx::top();
            ctx.scope = Scope::Function(name.clone());
            lower_stmts(b, body, symbols, &mut ctx);
            if !b.is_terminated() {
                b.emit_terminator("ret");
            }
            b.end_function();
        }
        StmtKind::ClassDef { name, methods, constructor, destructor, .. } => {
            let class = symbols.lookup_class(name).cloned();
            if let Some(class) = &class {
                let slots: Vec<String> = class
                    .methods
                    .iter()
                    .map(|m| format!("l ${}", m.mangled_name))
                    .collect();
                b.declare_global(format!(
                    "data ${} = {{ {} }}",
                    vtable_symbol(name),
                    slots.join(", ")
                ));
            }
            for m in methods {
                lower_method(b, name, m, symbols);
            }
            if let Some(c) = constructor {
                lower_method_named(b, &class_constructor_symbol(name), c, symbols, name);
            }
            if let Some(d) = destructor {
                lower_method_named(b, &class_destructor_symbol(name), d, symbols, name);
            }
        }
        _ => {}
    }
}

fn lower_method(b: &mut IrBuilder, class: &str, m: &MethodDef, symbols: &mut SymbolTable) {
    lower_method_named(b, &class_method_symbol(class, &m.name), m, symbols, class)
}

fn lower_method_named(b: &mut IrBuilder, mangled: &str, m: &MethodDef, symbols: &mut SymbolTable, class: &str) {
    let header = format!("export function ${}(l %this, {})", mangled, param_list(&m.params));
    b.begin_function(header);
    let mut ctx = Ctx::top();
    ctx.scope = Scope::Function(format!("{}.{}", class, m.name));
    lower_stmts(b, &m.body, symbols, &mut ctx);
    if !b.is_terminated() {
        b.emit_terminator("ret");
    }
    b.end_function();
}

fn param_list(params: &[Param]) -> String {
    params
        .iter()
        .map(|p| format!("d %{}", p.name.to_ascii_lowercase()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn emit_gosub_dispatch(b: &mut IrBuilder, ctx: &Ctx) {
    if ctx.gosub_sites.is_empty() {
        return;
    }
    b.emit_label("gosub_dispatch");
    let id_reg = b.new_temp();
    call_returning(b, &id_reg, "w", symbols::GOSUB_POP, &[]);
    for (id, label) in &ctx.gosub_sites {
        let cmp = b.new_temp();
        b.emit(format!("{} =w ceqw {}, {}", cmp, id_reg, id));
        let next = b.new_label("gosub_test");
        b.emit_terminator(format!("jnz {}, @{}, @{}", cmp, label, next));
        b.emit_label(&next);
    }
    b.emit_terminator("jmp @program_exit");
}

fn lower_stmts(b: &mut IrBuilder, stmts: &[Stmt], symbols: &mut SymbolTable, ctx: &mut Ctx) {
    for stmt in stmts {
        if let Some(n) = stmt.line_number {
            b.emit_label(&format!("line_{}", n));
        }
        lower_stmt(b, stmt, symbols, ctx);
    }
}

fn lower_stmt(b: &mut IrBuilder, stmt: &Stmt, symbols: &mut SymbolTable, ctx: &mut Ctx) {
    match &stmt.kind {
        StmtKind::Let { target, value } => {
            let v = lower_expr(b, value, symbols, ctx);
            store_lvalue(b, target, &v, symbols, ctx);
        }
        StmtKind::Print { items } => {
            for item in items {
                let v = lower_expr(b, item, symbols, ctx);
                let symbol = match v.ty {
                    BaseType::String | BaseType::Unicode => symbols::PRINT_STRING,
                    BaseType::Single | BaseType::Double => symbols::PRINT_DOUBLE,
                    _ => symbols::PRINT_INT,
                };
                call_void(b, symbol, &[v.reg]);
            }
            call_void(b, symbols::PRINT_NEWLINE, &[]);
        }
        StmtKind::Dim { name, dims, .. } => {
            let v = symbols.lookup_variable(&ctx.scope, name).cloned();
            let ty = v.map(|v| v.ty).unwrap_or(TypeDescriptor::simple(BaseType::Double));
            if dims.is_empty() {
                b.declare_global(format!(
                    "data ${} = {{ {} 0 }}",
                    var_symbol(name),
                    TypeManager::mem_width(&ty)
                ));
            } else {
                b.declare_array_desc(format!("data ${} = {{ l 0, l 0 }}", array_desc_symbol(name)));
            }
        }
        StmtKind::Global { name, .. } => {
            let ty = symbols
                .lookup_variable(&Scope::Global, name)
                .map(|v| v.ty.clone())
                .unwrap_or(TypeDescriptor::simple(BaseType::Double));
            b.declare_global(format!(
                "data ${} = {{ {} 0 }}",
                var_symbol(name),
                TypeManager::mem_width(&ty)
            ));
        }
        StmtKind::Const { .. } => {}
        StmtKind::If { cond, then_branch, elseifs, else_branch } => {
            lower_if_chain(b, cond, then_branch, elseifs, else_branch, 0, symbols, ctx)
        }
        StmtKind::For { var, start, end, step, body } => lower_for(b, var, start, end, step, body, symbols, ctx),
        StmtKind::ForEach { var, collection, body } => lower_foreach(b, var, collection, body, symbols, ctx),
        StmtKind::While { cond, body } => lower_while(b, cond, body, symbols, ctx),
        StmtKind::DoLoop { condition, body } => lower_do(b, condition, body, symbols, ctx),
        StmtKind::Repeat { body, until } => lower_repeat(b, body, until, symbols, ctx),
        StmtKind::SelectCase { selector, cases, otherwise } => {
            lower_select_case(b, selector, cases, otherwise, symbols, ctx)
        }
        StmtKind::TryCatch { try_body, catches, finally } => {
            b.emit(format!("# try ({} catch clause(s))", catches.len()));
            lower_stmts(b, try_body, symbols, ctx);
            for (name, body) in catches {
                b.emit(format!("# catch {}", name.as_deref().unwrap_or("*")));
                lower_stmts(b, body, symbols, ctx);
            }
            if let Some(body) = finally {
                b.emit("# finally".to_string());
                lower_stmts(b, body, symbols, ctx);
            }
        }
        StmtKind::Goto { target } => {
            let label = resolve_target_label(target);
            b.emit_terminator(format!("jmp @{}", label));
        }
        StmtKind::Gosub { target } => lower_gosub(b, target, ctx),
        StmtKind::OnGoto { selector, targets, is_gosub } => lower_on_goto(b, selector, targets, *is_gosub, symbols, ctx),
        StmtKind::Return => {
            b.emit_terminator("jmp @gosub_dispatch");
        }
        StmtKind::Exit { kind } => {
            let target = match kind {
                ExitKind::For => ctx.for_exits.last(),
                ExitKind::Do => ctx.do_exits.last(),
                ExitKind::While => ctx.while_exits.last(),
                ExitKind::Repeat => ctx.repeat_exits.last(),
            };
            if let Some(label) = target {
                b.emit_terminator(format!("jmp @{}", label));
            }
        }
        StmtKind::End => {
            b.emit_terminator("jmp @program_exit");
        }
        StmtKind::Label { name } => {
            b.emit_label(&format!("user_{}", name.to_ascii_uppercase()));
        }
        StmtKind::FunctionDef { .. } | StmtKind::SubDef { .. } | StmtKind::ClassDef { .. } | StmtKind::TypeDef { .. } => {
            // Collected separately and lowered out-of-line by `lower_def`.
        }
        StmtKind::Data { .. } => {}
        StmtKind::Read { targets } => {
            for target in targets {
                let reg = b.new_temp();
                call_returning(b, &reg, "d", symbols::DATA_READ_NEXT, &[]);
                let v = Value::new(reg, BaseType::Double);
                store_lvalue(b, target, &v, symbols, ctx);
            }
        }
        StmtKind::Restore { target } => {
            let arg = match target {
                Some(JumpTarget::Line(n)) => n.to_string(),
                Some(JumpTarget::Label(name)) => {
                    format!("${}", format!("user_{}", name.to_ascii_uppercase()))
                }
                None => "0".to_string(),
            };
            call_void(b, symbols::DATA_RESTORE, &[arg]);
        }
        StmtKind::Inc { target } => lower_incdec(b, target, "add", symbols, ctx),
        StmtKind::Dec { target } => lower_incdec(b, target, "sub", symbols, ctx),
        StmtKind::Swap { a, b: b_target } => {
            let va = load_lvalue(b, a, symbols, ctx);
            let vb = load_lvalue(b, b_target, symbols, ctx);
            store_lvalue(b, a, &vb, symbols, ctx);
            store_lvalue(b, b_target, &va, symbols, ctx);
        }
        StmtKind::Call { name, args } => {
            let arg_vals: Vec<String> = args.iter().map(|a| lower_expr(b, a, symbols, ctx).reg).collect();
            if symbols.lookup_function(name).is_some() {
                call_void(b, &function_symbol(name), &arg_vals);
            } else {
                call_void(b, &sub_symbol(name), &arg_vals);
            }
        }
        StmtKind::ExprStmt(expr) => {
            lower_expr(b, expr, symbols, ctx);
        }
        StmtKind::Orphan { .. } => {}
    }
}

fn lower_incdec(b: &mut IrBuilder, target: &LValue, op: &str, symbols: &mut SymbolTable, ctx: &mut Ctx) {
    let v = load_lvalue(b, target, symbols, ctx);
    let r = b.new_temp();
    b.emit(format!("{} ={} {} {}, 1", r, TypeManager::ir_letter(&ty_of(v.ty)), op, v.reg));
    store_lvalue(b, target, &Value::new(r, v.ty), symbols, ctx);
}

fn ty_of(bt: BaseType) -> TypeDescriptor {
    TypeDescriptor::simple(bt)
}

fn lower_gosub(b: &mut IrBuilder, target: &JumpTarget, ctx: &mut Ctx) {
    let resume_label = b.new_label("gosub_resume");
    let id = ctx.next_gosub_id;
    ctx.next_gosub_id += 1;
    ctx.gosub_sites.push((id, resume_label.clone()));
    call_void(b, symbols::GOSUB_PUSH, &[id.to_string()]);
    let label = resolve_target_label(target);
    b.emit_terminator(format!("jmp @{}", label));
    b.emit_label(&resume_label);
}

fn lower_on_goto(
    b: &mut IrBuilder,
    selector: &Expr,
    targets: &[JumpTarget],
    is_gosub: bool,
    symbols: &mut SymbolTable,
    ctx: &mut Ctx,
) {
    let sel = lower_expr(b, selector, symbols, ctx);
    let after = b.new_label("on_goto_after");
    for (i, target) in targets.iter().enumerate() {
        let cmp = b.new_temp();
        b.emit(format!("{} =w ceqw {}, {}", cmp, sel.reg, i + 1));
        let branch = b.new_label("on_goto_case");
        let next = b.new_label("on_goto_next");
        b.emit_terminator(format!("jnz {}, @{}, @{}", cmp, branch, next));
        b.emit_label(&branch);
        if is_gosub {
            lower_gosub(b, target, ctx);
        } else {
            let label = resolve_target_label(target);
            b.emit_terminator(format!("jmp @{}", label));
        }
        if !b.is_terminated() {
            b.emit_terminator(format!("jmp @{}", after));
        }
        b.emit_label(&next);
    }
    b.emit_terminator(format!("jmp @{}", after));
    b.emit_label(&after);
}

fn resolve_target_label(target: &JumpTarget) -> String {
    match target {
        JumpTarget::Label(name) => format!("user_{}", name.to_ascii_uppercase()),
        JumpTarget::Line(n) => format!("line_{}", n),
    }
}

fn lower_if_chain(
    b: &mut IrBuilder,
    cond: &Expr,
    then_branch: &[Stmt],
    elseifs: &[(Expr, Vec<Stmt>)],
    else_branch: &Option<Vec<Stmt>>,
    idx: usize,
    symbols: &mut SymbolTable,
    ctx: &mut Ctx,
) {
    let join = b.new_label("if_join");
    lower_if_chain_inner(b, cond, then_branch, elseifs, else_branch, idx, &join, symbols, ctx);
    b.emit_label(&join);
}

fn lower_if_chain_inner(
    b: &mut IrBuilder,
    cond: &Expr,
    then_branch: &[Stmt],
    elseifs: &[(Expr, Vec<Stmt>)],
    else_branch: &Option<Vec<Stmt>>,
    idx: usize,
    join: &str,
    symbols: &mut SymbolTable,
    ctx: &mut Ctx,
) {
    let cond_val = lower_expr(b, cond, symbols, ctx);
    let then_label = b.new_label("if_then");
    let else_label = b.new_label("if_else");
    b.emit_terminator(format!("jnz {}, @{}, @{}", cond_val.reg, then_label, else_label));

    b.emit_label(&then_label);
    lower_stmts(b, then_branch, symbols, ctx);
    if !b.is_terminated() {
        b.emit_terminator(format!("jmp @{}", join));
    }

    b.emit_label(&else_label);
    if let Some((next_cond, next_body)) = elseifs.get(idx) {
        lower_if_chain_inner(b, next_cond, next_body, elseifs, else_branch, idx + 1, join, symbols, ctx);
    } else {
        if let Some(body) = else_branch {
            lower_stmts(b, body, symbols, ctx);
        }
        if !b.is_terminated() {
            b.emit_terminator(format!("jmp @{}", join));
        }
    }
}

fn lower_for(
    b: &mut IrBuilder,
    var: &str,
    start: &Expr,
    end: &Expr,
    step: &Option<Expr>,
    body: &[Stmt],
    symbols: &mut SymbolTable,
    ctx: &mut Ctx,
) {
    let start_val = lower_expr(b, start, symbols, ctx);
    store_lvalue(b, &LValue::Variable(var.to_string()), &start_val, symbols, ctx);

    let header = b.new_label("for_header");
    let body_label = b.new_label("for_body");
    let incr = b.new_label("for_incr");
    let exit = b.new_label("for_exit");

    b.emit_terminator(format!("jmp @{}", header));
    b.emit_label(&header);
    let cur = load_lvalue(b, &LValue::Variable(var.to_string()), symbols, ctx);
    let end_val = lower_expr(b, end, symbols, ctx);
    let cmp = b.new_temp();
    b.emit(format!("{} =w clew {}, {}", cmp, cur.reg, end_val.reg));
    b.emit_terminator(format!("jnz {}, @{}, @{}", cmp, body_label, exit));

    b.emit_label(&body_label);
    ctx.for_exits.push(exit.clone());
    lower_stmts(b, body, symbols, ctx);
    ctx.for_exits.pop();
    if !b.is_terminated() {
        b.emit_terminator(format!("jmp @{}", incr));
    }

    b.emit_label(&incr);
    let cur2 = load_lvalue(b, &LValue::Variable(var.to_string()), symbols, ctx);
    let step_val = match step {
        Some(e) => lower_expr(b, e, symbols, ctx).reg,
        None => "1".to_string(),
    };
    let next = b.new_temp();
    b.emit(format!("{} =d add {}, {}", next, cur2.reg, step_val));
    store_lvalue(b, &LValue::Variable(var.to_string()), &Value::new(next, BaseType::Integer), symbols, ctx);
    b.emit_terminator(format!("jmp @{}", header));

    b.emit_label(&exit);
}

fn lower_foreach(b: &mut IrBuilder, var: &str, collection: &Expr, body: &[Stmt], symbols: &mut SymbolTable, ctx: &mut Ctx) {
    let coll = lower_expr(b, collection, symbols, ctx);
    let header = b.new_label("foreach_header");
    let body_label = b.new_label("foreach_body");
    let exit = b.new_label("foreach_exit");

    b.emit_terminator(format!("jmp @{}", header));
    b.emit_label(&header);
    let has_next = b.new_temp();
    call_returning(b, &has_next, "w", symbols::ITER_HAS_NEXT, &[coll.reg.clone()]);
    b.emit_terminator(format!("jnz {}, @{}, @{}", has_next, body_label, exit));

    b.emit_label(&body_label);
    let item = b.new_temp();
    call_returning(b, &item, "d", symbols::ITER_NEXT, &[coll.reg.clone()]);
    store_lvalue(b, &LValue::Variable(var.to_string()), &Value::new(item, BaseType::Double), symbols, ctx);
    ctx.for_exits.push(exit.clone());
    lower_stmts(b, body, symbols, ctx);
    ctx.for_exits.pop();
    if !b.is_terminated() {
        b.emit_terminator(format!("jmp @{}", header));
    }

    b.emit_label(&exit);
}

fn lower_while(b: &mut IrBuilder, cond: &Expr, body: &[Stmt], symbols: &mut SymbolTable, ctx: &mut Ctx) {
    let header = b.new_label("while_header");
    let body_label = b.new_label("while_body");
    let exit = b.new_label("while_exit");

    b.emit_terminator(format!("jmp @{}", header));
    b.emit_label(&header);
    let cond_val = lower_expr(b, cond, symbols, ctx);
    b.emit_terminator(format!("jnz {}, @{}, @{}", cond_val.reg, body_label, exit));

    b.emit_label(&body_label);
    ctx.while_exits.push(exit.clone());
    lower_stmts(b, body, symbols, ctx);
    ctx.while_exits.pop();
    if !b.is_terminated() {
        b.emit_terminator(format!("jmp @{}", header));
    }

    b.emit_label(&exit);
}

fn lower_do(b: &mut IrBuilder, condition: &Option<DoCondition>, body: &[Stmt], symbols: &mut SymbolTable, ctx: &mut Ctx) {
    let header = b.new_label("do_header");
    let exit = b.new_label("do_exit");
    b.emit_terminator(format!("jmp @{}", header));

    match condition {
        Some(DoCondition::PreWhile(cond)) | Some(DoCondition::PreUntil(cond)) => {
            b.emit_label(&header);
            let cond_val = lower_expr(b, cond, symbols, ctx);
            let body_label = b.new_label("do_body");
            let (t, f) = if matches!(condition, Some(DoCondition::PreUntil(_))) {
                (exit.clone(), body_label.clone())
            } else {
                (body_label.clone(), exit.clone())
            };
            b.emit_terminator(format!("jnz {}, @{}, @{}", cond_val.reg, t, f));
            b.emit_label(&body_label);
            ctx.do_exits.push(exit.clone());
            lower_stmts(b, body, symbols, ctx);
            ctx.do_exits.pop();
            if !b.is_terminated() {
                b.emit_terminator(format!("jmp @{}", header));
            }
        }
        None => {
            b.emit_label(&header);
            ctx.do_exits.push(exit.clone());
            lower_stmts(b, body, symbols, ctx);
            ctx.do_exits.pop();
            if !b.is_terminated() {
                b.emit_terminator(format!("jmp @{}", header));
            }
        }
        Some(DoCondition::PostWhile(cond)) | Some(DoCondition::PostUntil(cond)) => {
            b.emit_label(&header);
            ctx.do_exits.push(exit.clone());
            lower_stmts(b, body, symbols, ctx);
            ctx.do_exits.pop();
            let cond_val = lower_expr(b, cond, symbols, ctx);
            let (t, f) = if matches!(condition, Some(DoCondition::PostUntil(_))) {
                (exit.clone(), header.clone())
            } else {
                (header.clone(), exit.clone())
            };
            b.emit_terminator(format!("jnz {}, @{}, @{}", cond_val.reg, t, f));
        }
    }

    b.emit_label(&exit);
}

fn lower_repeat(b: &mut IrBuilder, body: &[Stmt], until: &Expr, symbols: &mut SymbolTable, ctx: &mut Ctx) {
    let header = b.new_label("repeat_header");
    let exit = b.new_label("repeat_exit");
    b.emit_terminator(format!("jmp @{}", header));
    b.emit_label(&header);
    ctx.repeat_exits.push(exit.clone());
    lower_stmts(b, body, symbols, ctx);
    ctx.repeat_exits.pop();
    let cond_val = lower_expr(b, until, symbols, ctx);
    b.emit_terminator(format!("jnz {}, @{}, @{}", cond_val.reg, exit, header));
    b.emit_label(&exit);
}

fn lower_select_case(
    b: &mut IrBuilder,
    selector: &Expr,
    cases: &[(Vec<Expr>, Vec<Stmt>)],
    otherwise: &Option<Vec<Stmt>>,
    symbols: &mut SymbolTable,
    ctx: &mut Ctx,
) {
    let sel = lower_expr(b, selector, symbols, ctx);
    let join = b.new_label("case_join");
    for (matches, body) in cases {
        let body_label = b.new_label("case_body");
        let next_test = b.new_label("case_test");
        let mut any = "0".to_string();
        for m in matches {
            let mv = lower_expr(b, m, symbols, ctx);
            let eq = b.new_temp();
            b.emit(format!("{} =w ceqd {}, {}", eq, sel.reg, mv.reg));
            let combined = b.new_temp();
            b.emit(format!("{} =w or {}, {}", combined, any, eq));
            any = combined;
        }
        b.emit_terminator(format!("jnz {}, @{}, @{}", any, body_label, next_test));
        b.emit_label(&body_label);
        lower_stmts(b, body, symbols, ctx);
        if !b.is_terminated() {
            b.emit_terminator(format!("jmp @{}", join));
        }
        b.emit_label(&next_test);
    }
    if let Some(body) = otherwise {
        lower_stmts(b, body, symbols, ctx);
    }
    if !b.is_terminated() {
        b.emit_terminator(format!("jmp @{}", join));
    }
    b.emit_label(&join);
}

fn load_lvalue(b: &mut IrBuilder, lvalue: &LValue, symbols: &mut SymbolTable, ctx: &mut Ctx) -> Value {
    match lvalue {
        LValue::Variable(name) => load_variable(b, name, symbols, ctx),
        LValue::ArrayElement { name, indices } => {
            let addr = array_element_addr(b, name, indices, symbols, ctx);
            let ty = symbols
                .lookup_array(name)
                .map(|a| a.element_ty.clone())
                .unwrap_or(TypeDescriptor::simple(BaseType::Double));
            let t = b.new_temp();
            b.emit(format!("{} ={} load{} {}", t, TypeManager::ir_letter(&ty), TypeManager::mem_width(&ty), addr));
            Value::new(t, ty.base_type)
        }
        LValue::Field { base, field } => {
            let addr = field_addr(b, base, field, symbols, ctx);
            let t = b.new_temp();
            b.emit(format!("{} =d loadd {}", t, addr));
            Value::new(t, BaseType::Double)
        }
    }
}

fn store_lvalue(b: &mut IrBuilder, lvalue: &LValue, value: &Value, symbols: &mut SymbolTable, ctx: &mut Ctx) {
    match lvalue {
        LValue::Variable(name) => {
            let symbol = var_symbol(name);
            let ty = symbols
                .lookup_variable(&ctx.scope, name)
                .map(|v| v.ty.clone())
                .unwrap_or(TypeDescriptor::simple(value.ty));
            symbols.mark_used(&ctx.scope, name, crate::diagnostics::Location::new(0, 0));
            b.emit(format!("store{} {}, ${}", TypeManager::mem_width(&ty), value.reg, symbol));
        }
        LValue::ArrayElement { name, indices } => {
            let addr = array_element_addr(b, name, indices, symbols, ctx);
            let ty = symbols
                .lookup_array(name)
                .map(|a| a.element_ty.clone())
                .unwrap_or(TypeDescriptor::simple(value.ty));
            b.emit(format!("store{} {}, {}", TypeManager::mem_width(&ty), value.reg, addr));
        }
        LValue::Field { base, field } => {
            let addr = field_addr(b, base, field, symbols, ctx);
            b.emit(format!("stored {}, {}", value.reg, addr));
        }
    }
}

fn load_variable(b: &mut IrBuilder, name: &str, symbols: &mut SymbolTable, ctx: &mut Ctx) -> Value {
    if let Some(c) = symbols.lookup_constant(name) {
        return match c.clone() {
            ConstantValue::Integer(n) => {
                let t = b.new_temp();
                b.emit(format!("{} =w copy {}", t, n));
                Value::new(t, BaseType::Integer)
            }
            ConstantValue::Double(n) => {
                let t = b.new_temp();
                b.emit(format!("{} =d copy {}", t, n));
                Value::new(t, BaseType::Double)
            }
            ConstantValue::Str(s) => {
                let label = b.intern_string(&s);
                let t = b.new_temp();
                b.emit(format!("{} =l copy ${}", t, label));
                Value::new(t, BaseType::String)
            }
        };
    }

    let ty = symbols
        .lookup_variable(&ctx.scope, name)
        .map(|v| v.ty.clone())
        .unwrap_or(TypeDescriptor::simple(BaseType::Double));
    symbols.mark_used(&ctx.scope, name, crate::diagnostics::Location::new(0, 0));
    let symbol = var_symbol(name);
    let t = b.new_temp();
    b.emit(format!(
        "{} ={} load{} ${}",
        t,
        TypeManager::ir_letter(&ty),
        TypeManager::mem_width(&ty),
        symbol
    ));
    Value::new(t, ty.base_type)
}

fn array_element_addr(b: &mut IrBuilder, name: &str, indices: &[Expr], symbols: &mut SymbolTable, ctx: &mut Ctx) -> String {
    let desc = array_desc_symbol(name);
    let idx_vals: Vec<String> = indices.iter().map(|e| lower_expr(b, e, symbols, ctx).reg).collect();
    let t = b.new_temp();
    let mut args = vec![format!("${}", desc)];
    args.extend(idx_vals);
    call_returning(b, &t, "l", symbols::ARRAY_ELEMENT_ADDR, &args);
    t
}

fn field_addr(b: &mut IrBuilder, base: &LValue, field: &str, symbols: &mut SymbolTable, ctx: &mut Ctx) -> String {
    let base_val = load_lvalue(b, base, symbols, ctx);
    let offset = field_offset(base, field, symbols);
    let t = b.new_temp();
    b.emit(format!("{} =l add {}, {}", t, base_val.reg, offset));
    t
}

fn field_offset(base: &LValue, field: &str, symbols: &SymbolTable) -> u32 {
    let base_name = match base {
        LValue::Variable(n) => Some(n.clone()),
        _ => None,
    };
    if let Some(base_name) = base_name {
        if let Some(var) = symbols.lookup_variable(&Scope::Global, &base_name) {
            if let Some(class_name) = &var.ty.class_name {
                if let Some(class) = symbols.lookup_class(class_name) {
                    if let Some(f) = class.fields.iter().find(|f| f.name == field) {
                        return f.offset;
                    }
                }
            }
            if let Some(udt_name) = &var.ty.udt_name {
                if let Some(udt) = symbols.lookup_udt(udt_name) {
                    let mut offset = 0u32;
                    for f in &udt.fields {
                        if f.name == field {
                            return offset;
                        }
                        offset += f.ty.base_type.size_bytes().max(1);
                    }
                }
            }
        }
    }
    0
}

fn lower_expr(b: &mut IrBuilder, expr: &Expr, symbols: &mut SymbolTable, ctx: &mut Ctx) -> Value {
    match &expr.kind {
        ExprKind::NumberLiteral(n) => {
            let t = b.new_temp();
            b.emit(format!("{} =d copy {}", t, n));
            Value::new(t, BaseType::Double)
        }
        ExprKind::StringLiteral(s) => {
            let label = b.intern_string(s);
            let t = b.new_temp();
            b.emit(format!("{} =l copy ${}", t, label));
            Value::new(t, BaseType::String)
        }
        ExprKind::BoolLiteral(v) => {
            let t = b.new_temp();
            b.emit(format!("{} =w copy {}", t, if *v { 1 } else { 0 }));
            Value::new(t, BaseType::Integer)
        }
        ExprKind::Variable(name) => load_variable(b, name, symbols, ctx),
        ExprKind::ArrayAccess { name, indices } => {
            load_lvalue(b, &LValue::ArrayElement { name: name.clone(), indices: indices.clone() }, symbols, ctx)
        }
        ExprKind::FieldAccess { base, field } => {
            let lvalue = LValue::Field { base: Box::new(expr_to_lvalue(base)), field: field.clone() };
            load_lvalue(b, &lvalue, symbols, ctx)
        }
        ExprKind::Binary { op, lhs, rhs } => lower_binary(b, *op, lhs, rhs, symbols, ctx),
        ExprKind::Unary { op, operand } => lower_unary(b, *op, operand, symbols, ctx),
        ExprKind::Call { name, args } => lower_call_expr(b, name, args, symbols, ctx),
        ExprKind::Iif { cond, then_value, else_value } => lower_iif(b, cond, then_value, else_value, symbols, ctx),
        ExprKind::New { class_name, args } => lower_new(b, class_name, args, symbols, ctx),
        ExprKind::Create { type_name, args } => lower_create(b, type_name, args, symbols, ctx),
        ExprKind::MethodCall { base, method, args } => lower_method_call(b, base, method, args, symbols, ctx),
    }
}

fn expr_to_lvalue(expr: &Expr) -> LValue {
    match &expr.kind {
        ExprKind::Variable(name) => LValue::Variable(name.clone()),
        ExprKind::ArrayAccess { name, indices } => LValue::ArrayElement { name: name.clone(), indices: indices.clone() },
        ExprKind::FieldAccess { base, field } => LValue::Field { base: Box::new(expr_to_lvalue(base)), field: field.clone() },
        _ => LValue::Variable("__tmp".to_string()),
    }
}

fn lower_binary(b: &mut IrBuilder, op: BinOp, lhs: &Expr, rhs: &Expr, symbols: &mut SymbolTable, ctx: &mut Ctx) -> Value {
    let l = lower_expr(b, lhs, symbols, ctx);
    let r = lower_expr(b, rhs, symbols, ctx);
    let result_ty = promote(l.ty, r.ty);

    match op {
        BinOp::Add if result_ty.is_string() => {
            let t = b.new_temp();
            call_returning(b, &t, "l", symbols::STRING_CONCAT, &[l.reg, r.reg]);
            Value::new(t, BaseType::String)
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
            let op_name = match op {
                BinOp::Add => "add",
                BinOp::Sub => "sub",
                BinOp::Mul => "mul",
                _ => "div",
            };
            let t = b.new_temp();
            b.emit(format!("{} =d {} {}, {}", t, op_name, l.reg, r.reg));
            Value::new(t, BaseType::Double)
        }
        BinOp::IntDiv => {
            let li = b.new_temp();
            b.emit(format!("{} =w dtosi {}", li, l.reg));
            let ri = b.new_temp();
            b.emit(format!("{} =w dtosi {}", ri, r.reg));
            let q = b.new_temp();
            b.emit(format!("{} =w div {}, {}", q, li, ri));
            let t = b.new_temp();
            b.emit(format!("{} =d swtof {}", t, q));
            Value::new(t, BaseType::Double)
        }
        BinOp::Mod => {
            let q = b.new_temp();
            b.emit(format!("{} =d div {}, {}", q, l.reg, r.reg));
            let fl = b.new_temp();
            call_returning(b, &fl, "d", "_math_floor", &[q]);
            let scaled = b.new_temp();
            b.emit(format!("{} =d mul {}, {}", scaled, fl, r.reg));
            let t = b.new_temp();
            b.emit(format!("{} =d sub {}, {}", t, l.reg, scaled));
            Value::new(t, BaseType::Double)
        }
        BinOp::Pow => {
            let t = b.new_temp();
            call_returning(b, &t, "d", symbols::MATH_POWER, &[l.reg, r.reg]);
            Value::new(t, BaseType::Double)
        }
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let cmp = match op {
                BinOp::Eq => "ceqd",
                BinOp::Ne => "cned",
                BinOp::Lt => "cltd",
                BinOp::Le => "cled",
                BinOp::Gt => "cgtd",
                _ => "cged",
            };
            let t = b.new_temp();
            b.emit(format!("{} =w {} {}, {}", t, cmp, l.reg, r.reg));
            Value::new(t, BaseType::Integer)
        }
        BinOp::And | BinOp::Or | BinOp::Xor => {
            let op_name = match op {
                BinOp::And => "and",
                BinOp::Or => "or",
                _ => "xor",
            };
            let t = b.new_temp();
            b.emit(format!("{} =w {} {}, {}", t, op_name, l.reg, r.reg));
            Value::new(t, BaseType::Integer)
        }
        _ => unreachable!("handled above"),
    }
}

fn lower_unary(b: &mut IrBuilder, op: UnOp, operand: &Expr, symbols: &mut SymbolTable, ctx: &mut Ctx) -> Value {
    let v = lower_expr(b, operand, symbols, ctx);
    match op {
        UnOp::Neg => {
            let t = b.new_temp();
            b.emit(format!("{} =d neg {}", t, v.reg));
            Value::new(t, v.ty)
        }
        UnOp::Not => {
            let t = b.new_temp();
            b.emit(format!("{} =w ceqw {}, 0", t, v.reg));
            Value::new(t, BaseType::Integer)
        }
    }
}

fn lower_iif(b: &mut IrBuilder, cond: &Expr, then_value: &Expr, else_value: &Expr, symbols: &mut SymbolTable, ctx: &mut Ctx) -> Value {
    let cond_val = lower_expr(b, cond, symbols, ctx);
    let then_label = b.new_label("iif_then");
    let else_label = b.new_label("iif_else");
    let join = b.new_label("iif_join");
    b.emit_terminator(format!("jnz {}, @{}, @{}", cond_val.reg, then_label, else_label));

    b.emit_label(&then_label);
    let then_val = lower_expr(b, then_value, symbols, ctx);
    b.emit_terminator(format!("jmp @{}", join));

    b.emit_label(&else_label);
    let else_val = lower_expr(b, else_value, symbols, ctx);
    b.emit_terminator(format!("jmp @{}", join));

    b.emit_label(&join);
    let result_ty = promote(then_val.ty, else_val.ty);
    let t = b.new_temp();
    b.emit(format!(
        "{} ={} phi @{} {}, @{} {}",
        t,
        TypeManager::ir_letter(&TypeDescriptor::simple(result_ty)),
        then_label,
        then_val.reg,
        else_label,
        else_val.reg
    ));
    Value::new(t, result_ty)
}

fn lower_call_expr(b: &mut IrBuilder, name: &str, args: &[Expr], symbols: &mut SymbolTable, ctx: &mut Ctx) -> Value {
    if symbols.lookup_array(name).is_some() {
        let lvalue = LValue::ArrayElement { name: name.to_string(), indices: args.to_vec() };
        return load_lvalue(b, &lvalue, symbols, ctx);
    }

    let arg_vals: Vec<String> = args.iter().map(|a| lower_expr(b, a, symbols, ctx).reg).collect();

    if let Some(func) = symbols.lookup_function(name).cloned() {
        let t = b.new_temp();
        let letter = TypeManager::ir_letter(&func.return_ty);
        call_returning(b, &t, letter, &function_symbol(name), &arg_vals);
        return Value::new(t, func.return_ty.base_type);
    }

    let symbol = format!("_basic_{}", name.to_ascii_lowercase().trim_end_matches('$'));
    let t = b.new_temp();
    call_returning(b, &t, "d", &symbol, &arg_vals);
    Value::new(t, BaseType::Double)
}

fn lower_new(b: &mut IrBuilder, class_name: &str, args: &[Expr], symbols: &mut SymbolTable, ctx: &mut Ctx) -> Value {
    let size = symbols
        .lookup_class(class_name)
        .map(|c| c.object_size)
        .unwrap_or(crate::symbol_table::CLASS_HEADER_SIZE);
    let arg_vals: Vec<String> = args.iter().map(|a| lower_expr(b, a, symbols, ctx).reg).collect();
    let t = b.new_temp();
    let mut call_args = vec![size.to_string(), format!("${}", vtable_symbol(class_name))];
    call_args.extend(arg_vals.iter().cloned());
    call_returning(b, &t, "l", symbols::OBJECT_ALLOC, &call_args);
    if let Some(ctor) = symbols.lookup_class(class_name).and_then(|c| c.constructor_mangled.clone()) {
        let mut ctor_args = vec![t.clone()];
        ctor_args.extend(arg_vals);
        call_void(b, &ctor, &ctor_args);
    }
    Value::new(t, BaseType::ClassInstance)
}

fn lower_create(b: &mut IrBuilder, type_name: &str, args: &[(String, Expr)], symbols: &mut SymbolTable, ctx: &mut Ctx) -> Value {
    let size = symbols
        .lookup_udt(type_name)
        .map(|u| u.fields.iter().map(|f| f.ty.base_type.size_bytes().max(1)).sum::<u32>())
        .unwrap_or(8);
    let base = b.new_temp();
    b.emit(format!("{} =l alloc16 {}", base, size));

    let fields = symbols.lookup_udt(type_name).map(|u| u.fields.clone()).unwrap_or_default();
    for (field_name, value_expr) in args {
        let v = lower_expr(b, value_expr, symbols, ctx);
        let mut offset = 0u32;
        for f in &fields {
            if &f.name == field_name {
                break;
            }
            offset += f.ty.base_type.size_bytes().max(1);
        }
        let addr = b.new_temp();
        b.emit(format!("{} =l add {}, {}", addr, base, offset));
        b.emit(format!("stored {}, {}", v.reg, addr));
    }
    Value::new(base, BaseType::UserDefined)
}

fn lower_method_call(b: &mut IrBuilder, base: &Expr, method: &str, args: &[Expr], symbols: &mut SymbolTable, ctx: &mut Ctx) -> Value {
    let base_val = lower_expr(b, base, symbols, ctx);
    let class_name = base_class_name(base, symbols);
    let mangled = class_name
        .as_deref()
        .and_then(|c| symbols.lookup_class(c))
        .and_then(|c| c.methods.iter().find(|m| m.name == method))
        .map(|m| m.mangled_name.clone())
        .unwrap_or_else(|| class_method_symbol(class_name.as_deref().unwrap_or("Object"), method));

    let mut call_args = vec![base_val.reg];
    call_args.extend(args.iter().map(|a| lower_expr(b, a, symbols, ctx).reg));
    let t = b.new_temp();
    call_returning(b, &t, "d", &mangled, &call_args);
    Value::new(t, BaseType::Double)
}

fn base_class_name(expr: &Expr, symbols: &SymbolTable) -> Option<String> {
    if let ExprKind::Variable(name) = &expr.kind {
        return symbols
            .lookup_variable(&Scope::Global, name)
            .and_then(|v| v.ty.class_name.clone());
    }
    None
}
