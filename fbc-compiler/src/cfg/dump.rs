//! Text and DOT renderings of a [`FunctionCfg`], gated behind
//! `codegen.emit_cfg_dot` / used by the `fbc --dump-cfg` CLI flag.

use super::{EdgeKind, FunctionCfg, Terminator};
use std::fmt::Write as _;

pub fn to_text(cfg: &FunctionCfg) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "function {} (entry bb{})", cfg.name, cfg.entry);
    for block in &cfg.blocks {
        let _ = writeln!(out, "bb{}:", block.id);
        for stmt in &block.stmts {
            let _ = writeln!(out, "    {}", describe_stmt(&stmt.kind));
        }
        let _ = writeln!(out, "    {}", describe_terminator(&block.terminator));
    }
    out
}

pub fn to_dot(cfg: &FunctionCfg) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph \"{}\" {{", cfg.name);
    for block in &cfg.blocks {
        let _ = writeln!(
            out,
            "  bb{} [label=\"bb{}\\n{} stmt(s)\"];",
            block.id,
            block.id,
            block.stmts.len()
        );
    }
    for edge in &cfg.edges {
        let style = match edge.kind {
            EdgeKind::True => " [label=\"true\"]",
            EdgeKind::False => " [label=\"false\"]",
            EdgeKind::Switch => " [label=\"case\"]",
            EdgeKind::Call => " [label=\"call\"]",
            EdgeKind::Return => " [style=dashed]",
            EdgeKind::Exception => " [style=dotted,label=\"catch\"]",
            EdgeKind::Fallthrough | EdgeKind::Jump => "",
        };
        let _ = writeln!(out, "  bb{} -> bb{}{};", edge.from, edge.to, style);
    }
    let _ = writeln!(out, "}}");
    out
}

fn describe_stmt(kind: &crate::ast::StmtKind) -> String {
    format!("{:?}", kind)
}

fn describe_terminator(term: &Terminator) -> String {
    match term {
        Terminator::Fallthrough(to) => format!("goto bb{}", to),
        Terminator::Branch { then_block, else_block, .. } => {
            format!("branch then=bb{} else=bb{}", then_block, else_block)
        }
        Terminator::Switch { targets, default, .. } => {
            format!("switch {:?} default=bb{}", targets, default)
        }
        Terminator::Jump(to) => format!("jump bb{}", to),
        Terminator::Call { target, return_to } => {
            format!("call bb{} return_to=bb{}", target, return_to)
        }
        Terminator::Return => "return".to_string(),
        Terminator::End => "end".to_string(),
        Terminator::Exit => "exit".to_string(),
    }
}
