//! Phase A: frame sizing.
//!
//! Builds each function's ordered slot list: parameters in declaration
//! order, a return slot for non-void functions, locals in source order,
//! then the compiler temporaries the IL generator's spill discipline needs.
//! Module-scope variables get one pseudo-frame per module, pinned to the
//! `both` thread context so it can never coalesce with anything.

use crate::ast::{Ast, NodeKind};
use crate::callgraph::{CallGraph, ThreadContext};
use crate::cfg::AccessMap;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::frame::{Frame, FrameSlot, SlotKind, SlotLocation, ZpDirective};
use crate::funcs::FuncRegistry;
use crate::platform::CompilerConfig;
use crate::symtab::{SymbolKind, SymbolTable};
use crate::typecheck::{Analysis, Intrinsic};
use blend_types::{NodeId, StorageClass, SymbolId, Type};

/// Build every frame, function frames first, module pseudo-frames after.
/// `None` when any frame overflows the configured maximum.
#[allow(clippy::too_many_arguments)]
pub(super) fn build_frames(
    ast: &Ast,
    table: &SymbolTable,
    funcs: &FuncRegistry,
    analysis: &Analysis,
    access: &AccessMap,
    graph: &CallGraph,
    config: &CompilerConfig,
    diags: &mut Diagnostics,
) -> Option<Vec<Frame>> {
    let mut frames = Vec::with_capacity(funcs.len() + table.modules().len());
    let mut overflowed = false;

    for (func_id, info) in funcs.iter() {
        let mut slots = Vec::new();
        for &param in &info.params {
            slots.push(slot_for_symbol(table, access, param, SlotKind::Parameter));
        }
        if info.ret != Type::Void {
            slots.push(synthetic_slot("return", SlotKind::Return, info.ret.clone()));
        }
        for symbol in collect_locals(ast, table, info.body) {
            slots.push(slot_for_symbol(table, access, symbol, SlotKind::Local));
        }
        for index in 0..stmt_demand(ast, table, analysis, info.body) {
            slots.push(synthetic_slot(
                &format!("$t{index}"),
                SlotKind::Temporary,
                Type::Word,
            ));
        }

        let raw_size: u32 = slots.iter().map(|s| s.size as u32).sum();
        if raw_size > config.max_frame_size as u32 {
            diags.push(
                Diagnostic::new(
                    DiagnosticCode::FrameOverflow,
                    format!(
                        "frame of `{}` needs {raw_size} bytes; the limit is {}",
                        info.qualified, config.max_frame_size
                    ),
                )
                .with_span(info.span),
            );
            overflowed = true;
        } else if raw_size >= config.large_frame_warning as u32 {
            diags.push(
                Diagnostic::new(
                    DiagnosticCode::LargeFrame,
                    format!("frame of `{}` occupies {raw_size} bytes", info.qualified),
                )
                .with_span(info.span),
            );
        }

        frames.push(Frame {
            func: info.qualified.clone(),
            slots,
            raw_size: raw_size.min(u16::MAX as u32) as u16,
            region_size: 0,
            zp_bytes: 0,
            base: None,
            group: usize::MAX,
            context: graph.node(func_id).context,
        });
    }

    for (module, scope) in table.modules() {
        let mut slots = Vec::new();
        for &entry in &table.scope(*scope).entries {
            let symbol = table.symbol(entry);
            let module_var = symbol.kind == SymbolKind::Variable
                && symbol.storage != StorageClass::Map;
            if module_var {
                slots.push(slot_for_symbol(table, access, entry, SlotKind::Local));
            }
        }
        let raw_size: u32 = slots.iter().map(|s| s.size as u32).sum();
        if raw_size > config.max_frame_size as u32 {
            diags.push(Diagnostic::new(
                DiagnosticCode::FrameOverflow,
                format!(
                    "module `{module}` declares {raw_size} bytes of variables; the limit is {}",
                    config.max_frame_size
                ),
            ));
            overflowed = true;
        }
        frames.push(Frame {
            func: module.clone(),
            slots,
            raw_size: raw_size.min(u16::MAX as u32) as u16,
            region_size: 0,
            zp_bytes: 0,
            base: None,
            group: usize::MAX,
            // Module storage is visible to every line of control.
            context: ThreadContext::MAIN | ThreadContext::ISR,
        });
    }

    if overflowed {
        None
    } else {
        Some(frames)
    }
}

fn slot_for_symbol(
    table: &SymbolTable,
    access: &AccessMap,
    symbol: SymbolId,
    kind: SlotKind,
) -> FrameSlot {
    let data = table.symbol(symbol);
    let info = access.get(symbol);
    FrameSlot {
        name: data.name.clone(),
        kind,
        size: data.ty.size().max(1),
        ty: data.ty.clone(),
        symbol: Some(symbol),
        storage: data.storage,
        directive: ZpDirective::None,
        location: SlotLocation::Unassigned,
        address: None,
        offset: 0,
        reads: info.reads,
        writes: info.writes,
        max_loop_depth: info.max_loop_depth,
        addr_like: info.addr_like,
        zp_score: 0,
    }
}

fn synthetic_slot(name: &str, kind: SlotKind, ty: Type) -> FrameSlot {
    FrameSlot {
        name: name.to_owned(),
        kind,
        size: ty.size(),
        ty,
        symbol: None,
        storage: StorageClass::Auto,
        directive: ZpDirective::None,
        location: SlotLocation::Unassigned,
        address: None,
        offset: 0,
        reads: 0,
        writes: 0,
        max_loop_depth: 0,
        addr_like: false,
        zp_score: 0,
    }
}

/// Local variable symbols of a body, in source order: declarations plus
/// implicitly declared `for` variables.
fn collect_locals(ast: &Ast, table: &SymbolTable, body: NodeId) -> Vec<SymbolId> {
    let mut out = Vec::new();
    let mut stack = vec![body];
    while let Some(node) = stack.pop() {
        match ast.kind(node) {
            NodeKind::VarDecl { storage, .. } if *storage != StorageClass::Map => {
                if let Some(symbol) = table.symbol_of_decl(node) {
                    out.push(symbol);
                }
            }
            NodeKind::For { .. } => {
                if let Some(symbol) = table.symbol_of_decl(node) {
                    out.push(symbol);
                }
            }
            _ => {}
        }
        let mut children = Vec::new();
        ast.children(node, &mut children);
        for child in children.into_iter().rev() {
            stack.push(child);
        }
    }
    out
}

// ── Spill-temporary demand ───────────────────────────────────────────────
//
// The IL generator evaluates the right operand of a spilled binary
// operation into `$t[base]` and the left operand with `base + 1`; `match`
// stashes its subject one level down for the duration of its arms. The
// demand computed here is exactly the number of temporaries that
// discipline touches, so the generator can never run out.

/// Whether an operand can feed an ALU instruction directly, as an
/// immediate or a plain variable address.
pub(crate) fn trivial_operand(
    ast: &Ast,
    table: &SymbolTable,
    analysis: &Analysis,
    expr: NodeId,
) -> bool {
    if analysis.consts.get(expr).is_some() {
        return true;
    }
    match ast.kind(expr) {
        NodeKind::Ident { .. } => match analysis.bindings.get(expr) {
            Some(&binding) => {
                let symbol = table.symbol(table.resolve_alias(binding));
                matches!(
                    symbol.kind,
                    SymbolKind::Variable | SymbolKind::Parameter | SymbolKind::MapVariable
                ) && !matches!(symbol.ty, Type::Array(..))
            }
            None => false,
        },
        _ => false,
    }
}

/// Spill slots needed to evaluate `expr`.
pub(crate) fn expr_demand(
    ast: &Ast,
    table: &SymbolTable,
    analysis: &Analysis,
    expr: NodeId,
) -> u16 {
    let d = |e| expr_demand(ast, table, analysis, e);
    let trivial = |e| trivial_operand(ast, table, analysis, e);
    match ast.kind(expr) {
        NodeKind::Unary { op, operand } => match op {
            crate::ast::UnaryOp::Neg => d(*operand).max(1),
            _ => d(*operand),
        },
        NodeKind::Binary { op, lhs, rhs } => {
            if op.is_logical() {
                d(*lhs).max(d(*rhs))
            } else if trivial(*rhs) {
                d(*lhs)
            } else {
                d(*rhs).max(1 + d(*lhs))
            }
        }
        NodeKind::Assign { op, target, value } => match ast.kind(*target) {
            NodeKind::Index { index, .. } => {
                if op.is_none() && analysis.consts.get(*index).is_some() {
                    // Constant index: the element address is a literal and
                    // the store goes straight through.
                    d(*value)
                } else {
                    let base = d(*value).max(1 + d(*index));
                    if op.is_some() {
                        base.max(2)
                    } else {
                        base
                    }
                }
            }
            _ => {
                if op.is_some() && !trivial(*value) {
                    d(*value).max(1)
                } else {
                    d(*value)
                }
            }
        },
        NodeKind::Call { callee, args } => {
            let intrinsic = match ast.kind(*callee) {
                NodeKind::Ident { name } => Intrinsic::from_name(name),
                _ => None,
            };
            match intrinsic {
                Some(Intrinsic::Poke | Intrinsic::Pokew) if args.len() == 2 => {
                    if analysis.consts.get(args[0]).is_some() {
                        // Literal target address: the value needs no stash.
                        d(args[1])
                    } else if trivial(args[1]) {
                        d(args[0])
                    } else {
                        d(args[1]).max(1 + d(args[0]))
                    }
                }
                Some(Intrinsic::Len | Intrinsic::Sizeof) => 0,
                _ => args.iter().map(|&a| d(a)).max().unwrap_or(0),
            }
        }
        NodeKind::Index { index, .. } => d(*index),
        NodeKind::ArrayLit { elems } => elems.iter().map(|&e| d(e)).max().unwrap_or(0),
        _ => 0,
    }
}

/// Spill slots needed anywhere in `stmt`.
pub(crate) fn stmt_demand(
    ast: &Ast,
    table: &SymbolTable,
    analysis: &Analysis,
    stmt: NodeId,
) -> u16 {
    let d = |e| expr_demand(ast, table, analysis, e);
    let s = |e| stmt_demand(ast, table, analysis, e);
    match ast.kind(stmt) {
        NodeKind::Block { stmts } => stmts.iter().map(|&x| s(x)).max().unwrap_or(0),
        NodeKind::VarDecl { init: Some(init), .. } => d(*init),
        NodeKind::ExprStmt { expr } => d(*expr),
        NodeKind::Return { value: Some(value) } => d(*value),
        NodeKind::If {
            cond,
            then_block,
            else_block,
        } => d(*cond)
            .max(s(*then_block))
            .max(else_block.map(|e| s(e)).unwrap_or(0)),
        NodeKind::While { cond, body } => d(*cond).max(s(*body)),
        NodeKind::DoWhile { body, cond } => d(*cond).max(s(*body)),
        NodeKind::For {
            from, to, body, ..
        } => {
            // A non-trivial bound is re-evaluated and stashed every
            // iteration.
            let bound = if trivial_operand(ast, table, analysis, *to) {
                0
            } else {
                d(*to).max(1)
            };
            d(*from).max(bound).max(s(*body))
        }
        NodeKind::Match {
            subject,
            cases,
            default,
        } => {
            let arms = cases
                .iter()
                .map(|c| s(c.body))
                .chain(default.map(|b| s(b)))
                .max()
                .unwrap_or(0);
            d(*subject).max(1 + arms).max(1)
        }
        _ => 0,
    }
}
