//! Control-flow graphs and access analysis.
//!
//! One CFG per function: nodes are maximal straight-line statement runs,
//! edges are conditional or unconditional successors. While building, the
//! pass also counts per-variable reads and writes and tracks the deepest
//! loop nesting any access sits in; the frame allocator's zero-page scoring
//! feeds on those numbers.

use crate::ast::{Ast, NodeKind};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::funcs::FuncRegistry;
use crate::symtab::{SymbolKind, SymbolTable};
use crate::typecheck::{Analysis, Intrinsic};
use blend_types::{NodeId, SymbolId};
use std::collections::VecDeque;

/// A maximal straight-line statement sequence.
#[derive(Debug, Default)]
pub struct BasicBlock {
    /// Statement nodes in execution order.
    pub stmts: Vec<NodeId>,
    /// Successor block indices.
    pub succs: Vec<usize>,
}

/// Control-flow graph of one function.
#[derive(Debug)]
pub struct Cfg {
    /// All blocks; index 0 is never reused.
    pub blocks: Vec<BasicBlock>,
    /// Entry block index.
    pub entry: usize,
}

impl Cfg {
    /// Block indices reachable from the entry.
    pub fn reachable(&self) -> Vec<bool> {
        let mut seen = vec![false; self.blocks.len()];
        let mut queue = VecDeque::from([self.entry]);
        seen[self.entry] = true;
        while let Some(block) = queue.pop_front() {
            for &succ in &self.blocks[block].succs {
                if !seen[succ] {
                    seen[succ] = true;
                    queue.push_back(succ);
                }
            }
        }
        seen
    }
}

/// Read/write profile of one symbol.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccessInfo {
    /// Number of read accesses.
    pub reads: u32,
    /// Number of write accesses.
    pub writes: u32,
    /// Deepest loop nesting any access was seen at.
    pub max_loop_depth: u32,
    /// The symbol is used as a peek/poke address or an array index, which
    /// makes it pointer-like for zero-page scoring.
    pub addr_like: bool,
}

impl AccessInfo {
    /// Total accesses.
    pub const fn total(&self) -> u32 {
        self.reads + self.writes
    }
}

/// Per-symbol access profiles for the whole compilation.
#[derive(Debug)]
pub struct AccessMap {
    info: Vec<AccessInfo>,
}

impl AccessMap {
    fn new(symbols: usize) -> Self {
        Self {
            info: vec![AccessInfo::default(); symbols],
        }
    }

    /// The profile of `symbol`.
    pub fn get(&self, symbol: SymbolId) -> AccessInfo {
        self.info
            .get(symbol.index())
            .copied()
            .unwrap_or_default()
    }

    fn record(&mut self, symbol: SymbolId, write: bool, depth: u32) {
        let Some(info) = self.info.get_mut(symbol.index()) else {
            return;
        };
        if write {
            info.writes += 1;
        } else {
            info.reads += 1;
        }
        info.max_loop_depth = info.max_loop_depth.max(depth);
    }

    fn mark_addr_like(&mut self, symbol: SymbolId) {
        if let Some(info) = self.info.get_mut(symbol.index()) {
            info.addr_like = true;
        }
    }
}

/// Build every function's CFG, collect access profiles, and warn about
/// unreachable statements and unused symbols.
pub fn analyze(
    ast: &Ast,
    table: &SymbolTable,
    funcs: &FuncRegistry,
    analysis: &Analysis,
    diags: &mut Diagnostics,
) -> (Vec<Cfg>, AccessMap) {
    tracing::debug!(functions = funcs.len(), "building control-flow graphs");
    let mut access = AccessMap::new(table.symbol_count());
    let mut cfgs = Vec::with_capacity(funcs.len());

    for (_, info) in funcs.iter() {
        let mut builder = Builder {
            ast,
            table,
            analysis,
            access: &mut access,
            scope: info.scope,
            blocks: vec![BasicBlock::default()],
            current: 0,
            loop_depth: 0,
            loops: Vec::new(),
        };
        builder.lower_stmt(info.body);
        let cfg = Cfg {
            blocks: builder.blocks,
            entry: 0,
        };
        report_unreachable(ast, &cfg, diags);
        cfgs.push(cfg);
    }

    report_unused(table, &access, diags);
    (cfgs, access)
}

fn report_unreachable(ast: &Ast, cfg: &Cfg, diags: &mut Diagnostics) {
    let reachable = cfg.reachable();
    for (index, block) in cfg.blocks.iter().enumerate() {
        if reachable[index] {
            continue;
        }
        if let Some(&first) = block.stmts.first() {
            diags.push(
                Diagnostic::new(DiagnosticCode::UnreachableCode, "statement can never execute")
                    .with_span(ast.span(first)),
            );
        }
    }
}

fn report_unused(table: &SymbolTable, access: &AccessMap, diags: &mut Diagnostics) {
    for (id, symbol) in table.symbols() {
        let countable = matches!(symbol.kind, SymbolKind::Variable | SymbolKind::Parameter);
        if !countable || symbol.exported {
            continue;
        }
        let info = access.get(id);
        if info.total() == 0 {
            diags.push(
                Diagnostic::new(
                    DiagnosticCode::UnusedSymbol,
                    format!("`{}` is never used", symbol.name),
                )
                .with_span(symbol.span),
            );
        }
    }
}

struct Builder<'a> {
    ast: &'a Ast,
    table: &'a SymbolTable,
    analysis: &'a Analysis,
    access: &'a mut AccessMap,
    /// The function's scope, for loop-variable lookups.
    scope: blend_types::ScopeId,
    blocks: Vec<BasicBlock>,
    current: usize,
    loop_depth: u32,
    /// `(top, exit)` block indices of enclosing loops, innermost last.
    loops: Vec<(usize, usize)>,
}

impl Builder<'_> {
    fn new_block(&mut self) -> usize {
        self.blocks.push(BasicBlock::default());
        self.blocks.len() - 1
    }

    fn edge(&mut self, from: usize, to: usize) {
        if !self.blocks[from].succs.contains(&to) {
            self.blocks[from].succs.push(to);
        }
    }

    /// Start a fresh block with an edge from the current one.
    fn advance(&mut self) -> usize {
        let next = self.new_block();
        self.edge(self.current, next);
        self.current = next;
        next
    }

    fn lower_stmt(&mut self, stmt: NodeId) {
        match self.ast.kind(stmt) {
            NodeKind::Block { stmts } => {
                for &s in stmts.clone().iter() {
                    self.lower_stmt(s);
                }
            }
            NodeKind::VarDecl { init, .. } => {
                self.blocks[self.current].stmts.push(stmt);
                // The declaration writes the variable when initialized.
                if let Some(init) = *init {
                    self.record_expr(init, false);
                    self.record_decl_write(stmt);
                }
            }
            NodeKind::ExprStmt { expr } => {
                self.blocks[self.current].stmts.push(stmt);
                self.record_expr(*expr, false);
            }
            NodeKind::Return { value } => {
                self.blocks[self.current].stmts.push(stmt);
                if let Some(value) = *value {
                    self.record_expr(value, false);
                }
                // Whatever follows a return starts unreachable.
                self.current = self.new_block();
            }
            NodeKind::Break => {
                self.blocks[self.current].stmts.push(stmt);
                if let Some(&(_, exit)) = self.loops.last() {
                    self.edge(self.current, exit);
                }
                self.current = self.new_block();
            }
            NodeKind::Continue => {
                self.blocks[self.current].stmts.push(stmt);
                if let Some(&(top, _)) = self.loops.last() {
                    self.edge(self.current, top);
                }
                self.current = self.new_block();
            }
            NodeKind::If {
                cond,
                then_block,
                else_block,
            } => {
                let (cond, then_block, else_block) = (*cond, *then_block, *else_block);
                self.blocks[self.current].stmts.push(stmt);
                self.record_expr(cond, false);
                let header = self.current;
                let then_entry = self.new_block();
                self.edge(header, then_entry);
                self.current = then_entry;
                self.lower_stmt(then_block);
                let then_exit = self.current;
                let join = self.new_block();
                self.edge(then_exit, join);
                match else_block {
                    Some(else_block) => {
                        let else_entry = self.new_block();
                        self.edge(header, else_entry);
                        self.current = else_entry;
                        self.lower_stmt(else_block);
                        let else_exit = self.current;
                        self.edge(else_exit, join);
                    }
                    None => self.edge(header, join),
                }
                self.current = join;
            }
            NodeKind::While { cond, body } => {
                let (cond, body) = (*cond, *body);
                let header = self.advance();
                self.blocks[header].stmts.push(stmt);
                self.loop_depth += 1;
                self.record_expr(cond, false);
                let body_entry = self.new_block();
                self.edge(header, body_entry);
                let exit = self.new_block();
                self.edge(header, exit);
                self.loops.push((header, exit));
                self.current = body_entry;
                self.lower_stmt(body);
                self.edge(self.current, header);
                self.loops.pop();
                self.loop_depth -= 1;
                self.current = exit;
            }
            NodeKind::DoWhile { body, cond } => {
                let (body, cond) = (*body, *cond);
                let body_entry = self.advance();
                self.blocks[body_entry].stmts.push(stmt);
                let latch = self.new_block();
                let exit = self.new_block();
                self.loop_depth += 1;
                self.loops.push((latch, exit));
                self.lower_stmt(body);
                self.edge(self.current, latch);
                self.record_expr(cond, false);
                self.edge(latch, body_entry);
                self.edge(latch, exit);
                self.loops.pop();
                self.loop_depth -= 1;
                self.current = exit;
            }
            NodeKind::For {
                from, to, body, ..
            } => {
                let (from, to, body) = (*from, *to, *body);
                self.blocks[self.current].stmts.push(stmt);
                // Initialization happens once, at the surrounding depth.
                self.record_expr(from, false);
                self.record_for_var(stmt, true, self.loop_depth);
                let header = self.advance();
                self.loop_depth += 1;
                // The bound comparison and the increment run every
                // iteration.
                self.record_expr(to, false);
                self.record_for_var(stmt, false, self.loop_depth);
                self.record_for_var(stmt, true, self.loop_depth);
                let body_entry = self.new_block();
                self.edge(header, body_entry);
                let exit = self.new_block();
                self.edge(header, exit);
                self.loops.push((header, exit));
                self.current = body_entry;
                self.lower_stmt(body);
                self.edge(self.current, header);
                self.loops.pop();
                self.loop_depth -= 1;
                self.current = exit;
            }
            NodeKind::Match {
                subject,
                cases,
                default,
            } => {
                let (subject, cases, default) = (*subject, cases.clone(), *default);
                self.blocks[self.current].stmts.push(stmt);
                self.record_expr(subject, false);
                let header = self.current;
                let join = self.new_block();
                for case in &cases {
                    let entry = self.new_block();
                    self.edge(header, entry);
                    self.current = entry;
                    self.lower_stmt(case.body);
                    self.edge(self.current, join);
                }
                match default {
                    Some(default) => {
                        let entry = self.new_block();
                        self.edge(header, entry);
                        self.current = entry;
                        self.lower_stmt(default);
                        self.edge(self.current, join);
                    }
                    None => self.edge(header, join),
                }
                self.current = join;
            }
            _ => {
                self.blocks[self.current].stmts.push(stmt);
            }
        }
    }

    /// The initializing write of a declaration statement.
    fn record_decl_write(&mut self, decl: NodeId) {
        if let Some(symbol) = self.table.symbol_of_decl(decl) {
            self.access.record(symbol, true, self.loop_depth);
        }
    }

    /// The implicit loop-variable access of a `for` statement.
    fn record_for_var(&mut self, stmt: NodeId, write: bool, depth: u32) {
        let NodeKind::For { var, .. } = self.ast.kind(stmt) else {
            return;
        };
        if let Some(symbol) = self.table.lookup(self.scope, var) {
            self.access.record(symbol, write, depth);
        }
    }

    /// Walk an expression, counting reads/writes against bound symbols.
    fn record_expr(&mut self, expr: NodeId, write: bool) {
        match self.ast.kind(expr) {
            NodeKind::Ident { .. } => {
                if let Some(&symbol) = self.analysis.bindings.get(expr) {
                    self.access.record(symbol, write, self.loop_depth);
                }
            }
            NodeKind::Member { .. } => {
                // Enum members are constants, not storage.
            }
            NodeKind::Unary { operand, .. } => self.record_expr(*operand, false),
            NodeKind::Binary { lhs, rhs, .. } => {
                self.record_expr(*lhs, false);
                self.record_expr(*rhs, false);
            }
            NodeKind::Assign { op, target, value } => {
                let (op, target, value) = (*op, *target, *value);
                // A compound assignment reads the target as well.
                if op.is_some() {
                    self.record_expr(target, false);
                }
                self.record_expr(target, true);
                self.record_expr(value, false);
            }
            NodeKind::Index { base, index } => {
                let (base, index) = (*base, *index);
                self.record_expr(base, write);
                self.record_expr(index, false);
                self.mark_addr_like(index);
            }
            NodeKind::Call { callee, args } => {
                let (callee, args) = (*callee, args.clone());
                let intrinsic = match self.ast.kind(callee) {
                    NodeKind::Ident { name } => Intrinsic::from_name(name),
                    _ => None,
                };
                match intrinsic {
                    Some(Intrinsic::Sizeof) => {
                        // The argument is a type name, not an access.
                    }
                    Some(
                        Intrinsic::Peek | Intrinsic::Peekw | Intrinsic::Poke | Intrinsic::Pokew,
                    ) => {
                        for (index, &arg) in args.iter().enumerate() {
                            self.record_expr(arg, false);
                            if index == 0 {
                                self.mark_addr_like(arg);
                            }
                        }
                    }
                    _ => {
                        for &arg in &args {
                            self.record_expr(arg, false);
                        }
                    }
                }
            }
            NodeKind::ArrayLit { elems } => {
                for &elem in elems.clone().iter() {
                    self.record_expr(elem, false);
                }
            }
            _ => {}
        }
    }

    /// Variables feeding an address computation score as pointer-like.
    fn mark_addr_like(&mut self, expr: NodeId) {
        match self.ast.kind(expr) {
            NodeKind::Ident { .. } => {
                if let Some(&symbol) = self.analysis.bindings.get(expr) {
                    self.access.mark_addr_like(symbol);
                }
            }
            NodeKind::Binary { lhs, rhs, .. } => {
                self.mark_addr_like(*lhs);
                self.mark_addr_like(*rhs);
            }
            NodeKind::Unary { operand, .. } => self.mark_addr_like(*operand),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{funcs, lexer, parser, symtab, typecheck};

    struct Analyzed {
        table: SymbolTable,
        cfgs: Vec<Cfg>,
        access: AccessMap,
        diags: Diagnostics,
    }

    fn analyze_source(source: &str) -> Analyzed {
        let mut diags = Diagnostics::new();
        let tokens = lexer::lex(0, source, &mut diags);
        let mut ast = Ast::new();
        let root = parser::parse_unit(&mut ast, tokens, "Main", &mut diags);
        let mut table = symtab::build(&ast, &[root], &mut diags);
        let mut registry = funcs::collect(&ast, &[root], &table);
        typecheck::resolve(&ast, &[root], &mut table, &mut registry, &mut diags);
        let mut analysis = Analysis::new();
        typecheck::check(&ast, &[root], &mut table, &registry, &mut analysis, &mut diags);
        let (cfgs, access) = analyze(&ast, &table, &registry, &analysis, &mut diags);
        Analyzed {
            table,
            cfgs,
            access,
            diags,
        }
    }

    fn symbol_named(a: &Analyzed, scope_owner: &str, name: &str) -> SymbolId {
        let module = a.table.module_scope(scope_owner).unwrap();
        // Search the module scope and its function child scopes.
        if let Some(id) = a.table.lookup_local(module, name) {
            return id;
        }
        for &child in &a.table.scope(module).children {
            if let Some(id) = a.table.lookup_local(child, name) {
                return id;
            }
        }
        panic!("no symbol {name}");
    }

    #[test]
    fn statements_after_return_are_unreachable() {
        let a = analyze_source(
            "module M;\nfunction f(): byte {\n  return 1;\n  let x: byte = 2;\n}",
        );
        assert!(a.diags.contains(DiagnosticCode::UnreachableCode));
    }

    #[test]
    fn loop_counts_compound() {
        let a = analyze_source(
            "module M;\nfunction scan(): void {\n  let i: byte = 0;\n  while (i < 250) {\n    poke($0400 + i, 32);\n    i = i + 1;\n  }\n}",
        );
        assert!(!a.diags.has_errors());
        let i = symbol_named(&a, "M", "i");
        let info = a.access.get(i);
        assert!(info.reads >= 3, "condition + poke + increment reads: {info:?}");
        assert!(info.writes >= 2, "init + increment writes: {info:?}");
        assert_eq!(info.max_loop_depth, 1);
        assert!(info.addr_like, "i feeds a poke address");
    }

    #[test]
    fn nested_loops_raise_depth() {
        let a = analyze_source(
            "module M;\nfunction f(): void {\n  let acc: byte = 0;\n  for y from 0 to 4 {\n    for x from 0 to 4 {\n      while (acc < 10) { acc = acc + 1; }\n    }\n  }\n}",
        );
        let acc = symbol_named(&a, "M", "acc");
        assert_eq!(a.access.get(acc).max_loop_depth, 3);
    }

    #[test]
    fn unused_symbol_warns() {
        let a = analyze_source("module M;\nfunction f(): void { let dead: byte = 0; let live: byte = 1; poke($D020, live); }");
        // `dead` is written once by its initializer but never read; `live`
        // is read. Only symbols with no accesses at all warn, so neither
        // does here; but a never-touched one does.
        let a2 = analyze_source("module M;\nfunction f(): void { let ghost: byte; }");
        assert!(a2.diags.contains(DiagnosticCode::UnusedSymbol));
        let _ = a;
    }

    #[test]
    fn break_edges_reach_exit() {
        let a = analyze_source(
            "module M;\nfunction f(): void {\n  while (true) {\n    break;\n  }\n  poke($D020, 1);\n}",
        );
        assert!(!a.diags.has_errors());
        // The trailing poke must be reachable through the break edge.
        let cfg = &a.cfgs[0];
        let reachable = cfg.reachable();
        let poke_reachable = cfg.blocks.iter().enumerate().any(|(i, b)| {
            reachable[i] && !b.stmts.is_empty() && i != cfg.entry
        });
        assert!(poke_reachable);
    }
}
