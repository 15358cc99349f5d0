//! Inter-procedural call graph.
//!
//! Direct call edges feed four analyses: three-color DFS recursion
//! detection (any cycle is fatal; the allocator depends on its absence),
//! BFS thread-context propagation from the entry points, a transitive
//! caller closure consumed by the frame coalescer, and call depth with a
//! configurable warning threshold.

use crate::ast::{Ast, NodeKind};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::funcs::FuncRegistry;
use crate::symtab::SymbolTable;
use crate::typecheck::Analysis;
use blend_types::FuncId;
use std::collections::{BTreeSet, VecDeque};

bitflags::bitflags! {
    /// Which line of control a function can execute on.
    ///
    /// The lattice is the power set: empty means unreachable from any entry
    /// point, and `MAIN | ISR` ("both") blocks frame coalescing entirely.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ThreadContext: u8 {
        /// Reachable from `main`.
        const MAIN = 0b01;
        /// Reachable from an interrupt handler (`callback`).
        const ISR = 0b10;
    }
}

impl Default for ThreadContext {
    fn default() -> Self {
        ThreadContext::empty()
    }
}

impl ThreadContext {
    /// Merge contexts along a call edge: differing contexts become both.
    pub fn merge(self, other: ThreadContext) -> ThreadContext {
        self | other
    }

    /// Whether the context permits coalescing at all.
    pub fn coalescable(self) -> bool {
        self == ThreadContext::MAIN || self == ThreadContext::ISR
    }
}

/// Per-function call graph node.
#[derive(Debug, Default)]
pub struct CallNode {
    /// Direct callees, first-call order, deduplicated.
    pub callees: Vec<FuncId>,
    /// Direct callers, first-call order, deduplicated.
    pub callers: Vec<FuncId>,
    /// Every function that can be live on the stack below this one.
    pub transitive_callers: BTreeSet<FuncId>,
    /// Propagated thread context; empty when unreachable.
    pub context: ThreadContext,
    /// BFS distance from the nearest entry point.
    pub depth: Option<u32>,
    /// Member of a call cycle.
    pub recursive: bool,
}

/// The whole compilation's call graph.
#[derive(Debug, Default)]
pub struct CallGraph {
    nodes: Vec<CallNode>,
}

impl CallGraph {
    /// The node of `id`.
    pub fn node(&self, id: FuncId) -> &CallNode {
        &self.nodes[id.index()]
    }

    /// Whether any function sits on a call cycle.
    pub fn has_recursion(&self) -> bool {
        self.nodes.iter().any(|n| n.recursive)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Build the call graph and run its analyses.
pub fn build(
    ast: &Ast,
    table: &SymbolTable,
    funcs: &FuncRegistry,
    analysis: &Analysis,
    depth_warning: u32,
    diags: &mut Diagnostics,
) -> CallGraph {
    let mut graph = CallGraph {
        nodes: (0..funcs.len()).map(|_| CallNode::default()).collect(),
    };

    collect_edges(ast, table, funcs, analysis, &mut graph);
    detect_recursion(funcs, &mut graph, diags);
    propagate_contexts(funcs, &mut graph);
    close_transitive_callers(&mut graph);
    compute_depths(funcs, &mut graph, depth_warning, diags);

    tracing::debug!(
        functions = graph.len(),
        recursive = graph.has_recursion(),
        "call graph complete"
    );
    graph
}

fn collect_edges(
    ast: &Ast,
    table: &SymbolTable,
    funcs: &FuncRegistry,
    analysis: &Analysis,
    graph: &mut CallGraph,
) {
    for (caller, info) in funcs.iter() {
        let mut stack = vec![info.body];
        while let Some(node) = stack.pop() {
            if let NodeKind::Call { callee, .. } = ast.kind(node) {
                if let Some(&symbol) = analysis.bindings.get(*callee) {
                    if let Some(target) = funcs.by_decl(table.symbol(symbol).decl) {
                        add_edge(graph, caller, target);
                    }
                }
            }
            let mut children = Vec::new();
            ast.children(node, &mut children);
            // Reversed push keeps source order on the explicit stack; edge
            // order is observable through coalesce-group determinism.
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }
    }
}

fn add_edge(graph: &mut CallGraph, caller: FuncId, callee: FuncId) {
    let callees = &mut graph.nodes[caller.index()].callees;
    if !callees.contains(&callee) {
        callees.push(callee);
    }
    let callers = &mut graph.nodes[callee.index()].callers;
    if !callers.contains(&caller) {
        callers.push(caller);
    }
}

/// Three-color DFS. White nodes are unvisited, gray nodes sit on the
/// current stack, black nodes are finished; meeting a gray successor means
/// the parent chain from it to the top is a cycle.
fn detect_recursion(funcs: &FuncRegistry, graph: &mut CallGraph, diags: &mut Diagnostics) {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut colors = vec![Color::White; graph.len()];
    let mut chain: Vec<FuncId> = Vec::new();

    fn dfs(
        node: FuncId,
        funcs: &FuncRegistry,
        graph: &mut CallGraph,
        colors: &mut [Color],
        chain: &mut Vec<FuncId>,
        diags: &mut Diagnostics,
    ) {
        colors[node.index()] = Color::Gray;
        chain.push(node);
        let callees = graph.nodes[node.index()].callees.clone();
        for callee in callees {
            match colors[callee.index()] {
                Color::White => dfs(callee, funcs, graph, colors, chain, diags),
                Color::Gray => report_cycle(node, callee, funcs, graph, chain, diags),
                Color::Black => {}
            }
        }
        chain.pop();
        colors[node.index()] = Color::Black;
    }

    for id in (0..graph.len()).map(FuncId::from_usize) {
        if colors[id.index()] == Color::White {
            dfs(id, funcs, graph, &mut colors, &mut chain, diags);
        }
    }
}

fn report_cycle(
    from: FuncId,
    back_to: FuncId,
    funcs: &FuncRegistry,
    graph: &mut CallGraph,
    chain: &[FuncId],
    diags: &mut Diagnostics,
) {
    let cycle_start = chain
        .iter()
        .position(|&f| f == back_to)
        .unwrap_or(chain.len() - 1);
    let cycle: Vec<FuncId> = chain[cycle_start..].to_vec();
    for &member in &cycle {
        graph.nodes[member.index()].recursive = true;
    }
    let span = funcs.get(from).span;
    if cycle.len() == 1 {
        diags.push(
            Diagnostic::new(
                DiagnosticCode::RecursionDetected,
                format!("`{}` calls itself; recursion is not supported", funcs.get(back_to).qualified),
            )
            .with_span(span),
        );
    } else {
        let path = cycle
            .iter()
            .chain(core::iter::once(&back_to))
            .map(|&f| funcs.get(f).name.clone())
            .collect::<Vec<_>>()
            .join(" → ");
        diags.push(
            Diagnostic::new(
                DiagnosticCode::MutualRecursionDetected,
                format!("call cycle {path}; recursion is not supported"),
            )
            .with_span(span),
        );
    }
}

/// BFS from every entry point, merging contexts along edges and
/// re-enqueueing nodes whose context changed.
fn propagate_contexts(funcs: &FuncRegistry, graph: &mut CallGraph) {
    let mut queue = VecDeque::new();
    for entry in funcs.entry_points() {
        let seed = if funcs.get(entry).is_callback {
            ThreadContext::ISR
        } else {
            ThreadContext::MAIN
        };
        let node = &mut graph.nodes[entry.index()];
        let merged = node.context.merge(seed);
        if merged != node.context {
            node.context = merged;
            queue.push_back(entry);
        }
    }
    while let Some(id) = queue.pop_front() {
        let context = graph.nodes[id.index()].context;
        let callees = graph.nodes[id.index()].callees.clone();
        for callee in callees {
            let node = &mut graph.nodes[callee.index()];
            let merged = node.context.merge(context);
            if merged != node.context {
                node.context = merged;
                queue.push_back(callee);
            }
        }
    }
}

/// Iterated worklist: a callee's transitive callers are its direct callers
/// plus everything transitively calling them.
fn close_transitive_callers(graph: &mut CallGraph) {
    let mut changed = true;
    while changed {
        changed = false;
        for id in 0..graph.len() {
            let callers = graph.nodes[id].callers.clone();
            let mut additions: BTreeSet<FuncId> = BTreeSet::new();
            for caller in callers {
                additions.insert(caller);
                additions.extend(graph.nodes[caller.index()].transitive_callers.iter().copied());
            }
            let target = &mut graph.nodes[id].transitive_callers;
            let before = target.len();
            target.extend(additions);
            if target.len() != before {
                changed = true;
            }
        }
    }
}

fn compute_depths(
    funcs: &FuncRegistry,
    graph: &mut CallGraph,
    depth_warning: u32,
    diags: &mut Diagnostics,
) {
    let mut queue = VecDeque::new();
    for entry in funcs.entry_points() {
        if graph.nodes[entry.index()].depth.is_none() {
            graph.nodes[entry.index()].depth = Some(0);
            queue.push_back(entry);
        }
    }
    while let Some(id) = queue.pop_front() {
        let depth = graph.nodes[id.index()].depth.unwrap_or(0);
        let callees = graph.nodes[id.index()].callees.clone();
        for callee in callees {
            if graph.nodes[callee.index()].depth.is_none() {
                graph.nodes[callee.index()].depth = Some(depth + 1);
                queue.push_back(callee);
            }
        }
    }
    for (id, info) in funcs.iter() {
        if let Some(depth) = graph.node(id).depth {
            if depth > depth_warning {
                diags.push(
                    Diagnostic::new(
                        DiagnosticCode::DeepCallStack,
                        format!(
                            "`{}` sits {depth} calls deep (threshold {depth_warning})",
                            info.qualified
                        ),
                    )
                    .with_span(info.span),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{funcs as funcs_mod, lexer, parser, symtab, typecheck};

    struct Built {
        registry: funcs_mod::FuncRegistry,
        graph: CallGraph,
        diags: Diagnostics,
    }

    fn build_from(source: &str) -> Built {
        let mut diags = Diagnostics::new();
        let tokens = lexer::lex(0, source, &mut diags);
        let mut ast = Ast::new();
        let root = parser::parse_unit(&mut ast, tokens, "Main", &mut diags);
        let mut table = symtab::build(&ast, &[root], &mut diags);
        let mut registry = funcs_mod::collect(&ast, &[root], &table);
        typecheck::resolve(&ast, &[root], &mut table, &mut registry, &mut diags);
        let mut analysis = Analysis::new();
        typecheck::check(&ast, &[root], &mut table, &registry, &mut analysis, &mut diags);
        let graph = build(&ast, &table, &registry, &analysis, 16, &mut diags);
        Built {
            registry,
            graph,
            diags,
        }
    }

    fn id_of(b: &Built, qualified: &str) -> FuncId {
        b.registry.by_qualified(qualified).unwrap()
    }

    #[test]
    fn direct_recursion_is_fatal() {
        let b = build_from("module M;\nfunction f(): void { f(); }");
        assert!(b.diags.contains(DiagnosticCode::RecursionDetected));
        assert!(b.graph.has_recursion());
    }

    #[test]
    fn mutual_recursion_names_the_cycle() {
        let b = build_from(
            "module M;\nfunction a(): void { b(); }\nfunction b(): void { a(); }",
        );
        assert!(b.diags.contains(DiagnosticCode::MutualRecursionDetected));
        let message = b
            .diags
            .items()
            .iter()
            .find(|d| d.code == DiagnosticCode::MutualRecursionDetected)
            .unwrap()
            .message
            .clone();
        assert!(message.contains("a → b → a"), "cycle path in: {message}");
        assert!(b.graph.node(id_of(&b, "M.a")).recursive);
        assert!(b.graph.node(id_of(&b, "M.b")).recursive);
    }

    #[test]
    fn straight_line_graph_is_clean() {
        let b = build_from(
            "module M;\nfunction leaf(): void { }\nfunction mid(): void { leaf(); }\nfunction main(): void { mid(); }",
        );
        assert!(!b.graph.has_recursion());
        let leaf = id_of(&b, "M.leaf");
        let mid = id_of(&b, "M.mid");
        let main = id_of(&b, "M.main");
        assert_eq!(b.graph.node(main).callees, vec![mid]);
        assert!(b.graph.node(leaf).transitive_callers.contains(&main));
        assert!(b.graph.node(leaf).transitive_callers.contains(&mid));
        assert_eq!(b.graph.node(leaf).depth, Some(2));
        assert_eq!(b.graph.node(main).depth, Some(0));
    }

    #[test]
    fn contexts_merge_to_both() {
        let b = build_from(
            "module M;\nfunction helper(): void { }\nfunction main(): void { helper(); }\ncallback function irq(): void { helper(); }",
        );
        let helper = id_of(&b, "M.helper");
        let main = id_of(&b, "M.main");
        let irq = id_of(&b, "M.irq");
        assert_eq!(b.graph.node(main).context, ThreadContext::MAIN);
        assert_eq!(b.graph.node(irq).context, ThreadContext::ISR);
        assert_eq!(
            b.graph.node(helper).context,
            ThreadContext::MAIN | ThreadContext::ISR
        );
        assert!(!b.graph.node(helper).context.coalescable());
    }

    #[test]
    fn deep_call_stack_warns() {
        // main -> f1 -> f2 -> ... -> f18: depth exceeds the threshold 16.
        let mut source = String::from("module M;\n");
        source.push_str("function f18(): void { }\n");
        for i in (1..18).rev() {
            source.push_str(&format!("function f{i}(): void {{ f{}(); }}\n", i + 1));
        }
        source.push_str("function main(): void { f1(); }\n");
        let b = build_from(&source);
        assert!(b.diags.contains(DiagnosticCode::DeepCallStack));
    }
}
