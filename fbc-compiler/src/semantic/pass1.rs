//! Pass 1 — declaration collection (§4.2).

use crate::ast::{Expr, ExprKind, LValue, Program, Stmt, StmtKind};
use crate::diagnostics::{DiagnosticKind, Diagnostics, SemaErrorKind};
use crate::symbol_table::{
    layout_class, ArrayInfo, ClassField, ClassMethod, FunctionInfo, ParamInfo, Scope,
    SymbolTable, UdtField, VariableInfo,
};
use crate::types::{split_suffix, suffix_base_type, BaseType, TypeDescriptor};

pub fn collect(program: &Program, symbols: &mut SymbolTable, diags: &mut Diagnostics) {
    let mut ctx = Ctx {
        scope: Scope::Global,
    };
    collect_stmts(&program.statements, symbols, diags, &mut ctx);
}

struct Ctx {
    scope: Scope,
}

fn collect_stmts(stmts: &[Stmt], symbols: &mut SymbolTable, diags: &mut Diagnostics, ctx: &mut Ctx) {
    for stmt in stmts {
        collect_stmt(stmt, symbols, diags, ctx);
    }
}

fn collect_stmt(stmt: &Stmt, symbols: &mut SymbolTable, diags: &mut Diagnostics, ctx: &mut Ctx) {
    if let Some(line_no) = stmt.line_number {
        if let Err(e) = symbols.declare_line(line_no, 0) {
            diags.error(
                DiagnosticKind::Sema(SemaErrorKind::DuplicateLineNumber),
                e,
                stmt.location,
            );
        }
    }

    match &stmt.kind {
        StmtKind::Dim { name, as_type, dims } => {
            if dims.is_empty() {
                declare_scalar(name, as_type.as_deref(), symbols, ctx, stmt.location, true);
            } else {
                let (base, suffix_ty) = split_suffix(name);
                let elem_ty = as_type
                    .as_deref()
                    .and_then(named_base_type)
                    .or(suffix_ty)
                    .unwrap_or(BaseType::Double);
                let info = ArrayInfo {
                    name: base.to_string(),
                    element_ty: TypeDescriptor::simple(elem_ty),
                    dims: vec![0; dims.len()],
                    declared_at: stmt.location,
                    element_count: 0,
                    as_type_name: as_type.clone(),
                };
                if let Err(e) = symbols.declare_array(info) {
                    diags.error(
                        DiagnosticKind::Sema(SemaErrorKind::ArrayRedeclared),
                        e,
                        stmt.location,
                    );
                }
            }
        }
        StmtKind::Global { name, as_type } => {
            declare_scalar(name, as_type.as_deref(), symbols, ctx, stmt.location, true);
        }
        StmtKind::Const { name, value } => {
            if let Some(cv) = eval_const(value) {
                symbols.declare_constant(name, cv);
            }
        }
        StmtKind::Let { target, .. } => {
            implicit_declare_lvalue(target, symbols, ctx, stmt.location);
        }
        StmtKind::Read { targets } => {
            for t in targets {
                implicit_declare_lvalue(t, symbols, ctx, stmt.location);
            }
        }
        StmtKind::Inc { target } | StmtKind::Dec { target } => {
            implicit_declare_lvalue(target, symbols, ctx, stmt.location);
        }
        StmtKind::Swap { a, b } => {
            implicit_declare_lvalue(a, symbols, ctx, stmt.location);
            implicit_declare_lvalue(b, symbols, ctx, stmt.location);
        }
        StmtKind::Data { values } => {
            for v in values {
                symbols.data.values.push(v.clone());
            }
        }
        StmtKind::Label { name } => {
            if let Err(e) = symbols.declare_label(name, stmt.location) {
                diags.error(
                    DiagnosticKind::Sema(SemaErrorKind::DuplicateLabel),
                    e,
                    stmt.location,
                );
            }
        }
        StmtKind::For { var, body, .. } => {
            // FOR index variables are always forced to integer (§4.2).
            declare_forced(var, BaseType::Integer, symbols, ctx, stmt.location);
            collect_stmts(body, symbols, diags, ctx);
        }
        StmtKind::ForEach { var, collection, body } => {
            let elem_ty = foreach_element_type(collection, symbols);
            declare_forced(var, elem_ty, symbols, ctx, stmt.location);
            collect_stmts(body, symbols, diags, ctx);
        }
        StmtKind::If { then_branch, elseifs, else_branch, .. } => {
            collect_stmts(then_branch, symbols, diags, ctx);
            for (_, body) in elseifs {
                collect_stmts(body, symbols, diags, ctx);
            }
            if let Some(body) = else_branch {
                collect_stmts(body, symbols, diags, ctx);
            }
        }
        StmtKind::While { body, .. } => collect_stmts(body, symbols, diags, ctx),
        StmtKind::DoLoop { body, .. } => collect_stmts(body, symbols, diags, ctx),
        StmtKind::Repeat { body, .. } => collect_stmts(body, symbols, diags, ctx),
        StmtKind::SelectCase { cases, otherwise, .. } => {
            for (_, body) in cases {
                collect_stmts(body, symbols, diags, ctx);
            }
            if let Some(body) = otherwise {
                collect_stmts(body, symbols, diags, ctx);
            }
        }
        StmtKind::TryCatch { try_body, catches, finally } => {
            collect_stmts(try_body, symbols, diags, ctx);
            for (_, body) in catches {
                collect_stmts(body, symbols, diags, ctx);
            }
            if let Some(body) = finally {
                collect_stmts(body, symbols, diags, ctx);
            }
        }
        StmtKind::FunctionDef { name, params, return_type, body, inline_expr } => {
            let param_infos: Vec<ParamInfo> = params
                .iter()
                .map(|p| ParamInfo {
                    ty: TypeDescriptor::simple(param_type(p)),
                    by_ref: p.by_ref,
                })
                .collect();
            let return_ty = return_type
                .as_deref()
                .and_then(named_base_type)
                .unwrap_or_else(|| split_suffix(name).1.unwrap_or(BaseType::Double));
            let info = FunctionInfo {
                name: name.clone(),
                param_names: params.iter().map(|p| p.name.clone()).collect(),
                params: param_infos,
                return_ty: TypeDescriptor::simple(return_ty),
                defined_at: stmt.location,
                inline_body: inline_expr.clone(),
                is_sub: false,
            };
            if let Err(e) = symbols.declare_function(info) {
                diags.error(
                    DiagnosticKind::Sema(SemaErrorKind::FunctionRedeclared),
                    e,
                    stmt.location,
                );
            }
            let outer = std::mem::replace(&mut ctx.scope, Scope::Function(name.clone()));
            for p in params {
                declare_scalar(&p.name, p.as_type.as_deref(), symbols, ctx, stmt.location, false);
            }
            collect_stmts(body, symbols, diags, ctx);
            ctx.scope = outer;
        }
        StmtKind::SubDef { name, params, body } => {
            let param_infos: Vec<ParamInfo> = params
                .iter()
                .map(|p| ParamInfo {
                    ty: TypeDescriptor::simple(param_type(p)),
                    by_ref: p.by_ref,
                })
                .collect();
            let info = FunctionInfo {
                name: name.clone(),
                param_names: params.iter().map(|p| p.name.clone()).collect(),
                params: param_infos,
                return_ty: TypeDescriptor::simple(BaseType::Void),
                defined_at: stmt.location,
                inline_body: None,
                is_sub: true,
            };
            if let Err(e) = symbols.declare_function(info) {
                diags.error(
                    DiagnosticKind::Sema(SemaErrorKind::FunctionRedeclared),
                    e,
                    stmt.location,
                );
            }
            let outer = std::mem::replace(&mut ctx.scope, Scope::Function(name.clone()));
            for p in params {
                declare_scalar(&p.name, p.as_type.as_deref(), symbols, ctx, stmt.location, false);
            }
            collect_stmts(body, symbols, diags, ctx);
            ctx.scope = outer;
        }
        StmtKind::TypeDef { name, fields } => {
            let udt_fields: Vec<UdtField> = fields
                .iter()
                .map(|f| {
                    let bt = named_base_type(&f.as_type).unwrap_or(BaseType::UserDefined);
                    UdtField {
                        name: f.name.clone(),
                        ty: TypeDescriptor::simple(bt),
                        type_name: f.as_type.clone(),
                        builtin: named_base_type(&f.as_type).is_some(),
                    }
                })
                .collect();
            if let Err(e) = symbols.declare_udt(name, udt_fields) {
                diags.error(
                    DiagnosticKind::Sema(SemaErrorKind::DuplicateType),
                    e,
                    stmt.location,
                );
            }
        }
        StmtKind::ClassDef {
            name,
            parent,
            fields,
            methods,
            constructor,
            destructor,
        } => {
            if let Err(e) = symbols.declare_class(name, parent.clone()) {
                diags.error(
                    DiagnosticKind::Sema(SemaErrorKind::DuplicateClass),
                    e,
                    stmt.location,
                );
                return;
            }
            let own_fields: Vec<(String, TypeDescriptor)> = fields
                .iter()
                .map(|f| {
                    let bt = named_base_type(&f.as_type).unwrap_or(BaseType::UserDefined);
                    (f.name.clone(), TypeDescriptor::simple(bt))
                })
                .collect();
            let own_methods: Vec<(String, TypeDescriptor, Vec<ParamInfo>, String)> = methods
                .iter()
                .map(|m| {
                    let return_ty = m
                        .return_type
                        .as_deref()
                        .and_then(named_base_type)
                        .unwrap_or(BaseType::Void);
                    let params = m
                        .params
                        .iter()
                        .map(|p| ParamInfo {
                            ty: TypeDescriptor::simple(param_type(p)),
                            by_ref: p.by_ref,
                        })
                        .collect();
                    (
                        m.name.clone(),
                        TypeDescriptor::simple(return_ty),
                        params,
                        format!("{}__{}", name, m.name),
                    )
                })
                .collect();

            // Parent isn't resolved yet (fix-up runs after this whole pass),
            // so lay out fields assuming no parent for now; `fixup_class_parents`
            // re-lays out every class with a resolved parent afterward. Storing
            // the *own* shape here is enough for duplicate-field detection and
            // is exactly what that re-layout pass expects to find.
            let (class_fields, class_methods, object_size) =
                layout_class(None, own_fields, own_methods, name);

            let mut seen = std::collections::HashSet::new();
            for f in &class_fields {
                if !seen.insert(f.name.clone()) {
                    diags.error(
                        DiagnosticKind::Sema(SemaErrorKind::DuplicateField),
                        format!("duplicate field '{}' in class '{}'", f.name, name),
                        stmt.location,
                    );
                }
            }

            if let Some(c) = symbols.lookup_class_mut(name) {
                c.fields = class_fields;
                c.methods = class_methods;
                c.object_size = object_size;
                if let Some(ctor) = constructor {
                    c.has_constructor = true;
                    c.constructor_mangled = Some(format!("{}__CONSTRUCTOR", name));
                    c.constructor_params = ctor
                        .params
                        .iter()
                        .map(|p| ParamInfo {
                            ty: TypeDescriptor::simple(param_type(p)),
                            by_ref: p.by_ref,
                        })
                        .collect();
                }
                if destructor.is_some() {
                    c.has_destructor = true;
                    c.destructor_mangled = Some(format!("{}__DESTRUCTOR", name));
                }
            }

            let outer = std::mem::replace(&mut ctx.scope, Scope::Function(name.clone()));
            for m in methods {
                collect_stmts(&m.body, symbols, diags, ctx);
            }
            if let Some(ctor) = constructor {
                collect_stmts(&ctor.body, symbols, diags, ctx);
            }
            if let Some(dtor) = destructor {
                collect_stmts(&dtor.body, symbols, diags, ctx);
            }
            ctx.scope = outer;
        }
        _ => {}
    }
}

fn declare_scalar(
    raw_name: &str,
    as_type: Option<&str>,
    symbols: &mut SymbolTable,
    ctx: &Ctx,
    loc: crate::diagnostics::Location,
    is_global_decl: bool,
) {
    let (base, suffix_ty) = split_suffix(raw_name);
    let ty = as_type
        .and_then(named_base_type)
        .or(suffix_ty)
        .unwrap_or(BaseType::Double);
    let is_global = matches!(ctx.scope, Scope::Global) || is_global_decl;
    symbols.declare_variable(VariableInfo {
        name: base.to_string(),
        ty: TypeDescriptor::simple(ty),
        declared: true,
        used: false,
        first_use: loc,
        scope: ctx.scope.clone(),
        is_global,
    });
}

fn declare_forced(
    raw_name: &str,
    ty: BaseType,
    symbols: &mut SymbolTable,
    ctx: &Ctx,
    loc: crate::diagnostics::Location,
) {
    let (base, _) = split_suffix(raw_name);
    symbols.declare_variable(VariableInfo {
        name: base.to_string(),
        ty: TypeDescriptor::simple(ty),
        declared: true,
        used: false,
        first_use: loc,
        scope: ctx.scope.clone(),
        is_global: matches!(ctx.scope, Scope::Global),
    });
}

fn implicit_declare_lvalue(
    lvalue: &LValue,
    symbols: &mut SymbolTable,
    ctx: &Ctx,
    loc: crate::diagnostics::Location,
) {
    // `declare_variable` is itself idempotent (register-if-absent, §9
    // "Implicit variable declarations"), so calling it again for a name
    // already DIM'd earlier is a harmless no-op.
    if let LValue::Variable(name) = lvalue {
        declare_scalar(name, None, symbols, ctx, loc, false);
    }
}

/// Maps an `AS <name>` type annotation to a `BaseType`, when it names a
/// built-in. Returns `None` for UDT/class names (handled by the caller via
/// symbol-table lookup instead).
fn named_base_type(name: &str) -> Option<BaseType> {
    match name.to_ascii_uppercase().as_str() {
        "BYTE" => Some(BaseType::Byte),
        "UBYTE" => Some(BaseType::UByte),
        "SHORT" => Some(BaseType::Short),
        "USHORT" => Some(BaseType::UShort),
        "INTEGER" | "INT" => Some(BaseType::Integer),
        "UINTEGER" | "UINT" => Some(BaseType::UInteger),
        "LONG" => Some(BaseType::Long),
        "ULONG" => Some(BaseType::ULong),
        "SINGLE" => Some(BaseType::Single),
        "DOUBLE" => Some(BaseType::Double),
        "STRING" => Some(BaseType::String),
        "UNICODE" => Some(BaseType::Unicode),
        "POINTER" => Some(BaseType::Pointer),
        _ => None,
    }
}

fn param_type(p: &crate::ast::Param) -> BaseType {
    p.as_type
        .as_deref()
        .and_then(named_base_type)
        .or_else(|| split_suffix(&p.name).1)
        .unwrap_or(BaseType::Double)
}

/// `FOR EACH` variable typing (§4.2, §9): key over a hashmap → string;
/// typed array → element base type; otherwise double.
fn foreach_element_type(collection: &Expr, symbols: &SymbolTable) -> BaseType {
    if let ExprKind::Variable(name) = &collection.kind {
        if let Some(arr) = symbols.lookup_array(name) {
            return arr.element_ty.base_type;
        }
        let upper = name.to_ascii_uppercase();
        if upper.contains("HASHMAP") {
            return BaseType::String;
        }
    }
    BaseType::Double
}

fn eval_const(expr: &Expr) -> Option<crate::symbol_table::ConstantValue> {
    use crate::symbol_table::ConstantValue;
    match &expr.kind {
        ExprKind::NumberLiteral(n) => {
            if n.fract() == 0.0 {
                Some(ConstantValue::Integer(*n as i64))
            } else {
                Some(ConstantValue::Double(*n))
            }
        }
        ExprKind::StringLiteral(s) => Some(ConstantValue::Str(s.clone())),
        _ => None,
    }
}
