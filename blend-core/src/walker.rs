//! Generic AST traversal.
//!
//! Every analysis pass is a [`Visitor`] driven by [`walk`]: enter hooks fire
//! in pre-order, exit hooks in post-order, siblings in source order. The
//! walker performs no semantic work itself; it only centralizes traversal
//! so visitors match on node kinds and nothing else.

use crate::ast::Ast;
use blend_types::NodeId;

/// Traversal state handed to visitor hooks.
pub struct Walk<'ast> {
    /// The arena being walked.
    pub ast: &'ast Ast,
    path: Vec<NodeId>,
    skip: bool,
    stop: bool,
}

impl<'ast> Walk<'ast> {
    fn new(ast: &'ast Ast) -> Self {
        Self {
            ast,
            path: Vec::new(),
            skip: false,
            stop: false,
        }
    }

    /// The current node's parent, if it has one.
    pub fn parent(&self) -> Option<NodeId> {
        self.path.last().copied()
    }

    /// The `k`-th ancestor: `ancestor(0)` is the parent.
    pub fn ancestor(&self, k: usize) -> Option<NodeId> {
        self.path.iter().rev().nth(k).copied()
    }

    /// Ancestry from the root down to (excluding) the current node.
    pub fn path(&self) -> &[NodeId] {
        &self.path
    }

    /// Suppress child visits for the current node only.
    pub fn skip_children(&mut self) {
        self.skip = true;
    }

    /// Abort the entire traversal after the current hook returns.
    pub fn stop(&mut self) {
        self.stop = true;
    }
}

/// An AST visitor. Both hooks default to doing nothing.
pub trait Visitor {
    /// Called before a node's children, in pre-order.
    fn enter(&mut self, walk: &mut Walk<'_>, id: NodeId) {
        let _ = (walk, id);
    }

    /// Called after a node's children, in post-order.
    fn exit(&mut self, walk: &mut Walk<'_>, id: NodeId) {
        let _ = (walk, id);
    }
}

/// Drive `visitor` over the subtree rooted at `root`.
pub fn walk(ast: &Ast, root: NodeId, visitor: &mut impl Visitor) {
    let mut state = Walk::new(ast);
    visit(&mut state, visitor, root);
}

fn visit(walk: &mut Walk<'_>, visitor: &mut impl Visitor, id: NodeId) -> bool {
    visitor.enter(walk, id);
    if walk.stop {
        return false;
    }
    let skip = core::mem::take(&mut walk.skip);
    if !skip {
        let mut children = Vec::new();
        walk.ast.children(id, &mut children);
        walk.path.push(id);
        for child in children {
            if !visit(walk, visitor, child) {
                walk.path.pop();
                return false;
            }
        }
        walk.path.pop();
    }
    visitor.exit(walk, id);
    !walk.stop
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;
    use crate::diagnostics::Diagnostics;
    use crate::{lexer, parser};

    fn small_ast() -> (Ast, NodeId) {
        let mut diags = Diagnostics::new();
        let tokens = lexer::lex(
            0,
            "module M;\nfunction f(): byte { let x: byte = 1; return x + 2; }",
            &mut diags,
        );
        let mut ast = Ast::new();
        let root = parser::parse_unit(&mut ast, tokens, "Main", &mut diags);
        assert!(!diags.has_errors());
        (ast, root)
    }

    #[derive(Default)]
    struct Recorder {
        enters: Vec<NodeId>,
        exits: Vec<NodeId>,
        parents_seen: Vec<Option<NodeId>>,
    }

    impl Visitor for Recorder {
        fn enter(&mut self, walk: &mut Walk<'_>, id: NodeId) {
            self.enters.push(id);
            self.parents_seen.push(walk.parent());
        }

        fn exit(&mut self, _walk: &mut Walk<'_>, id: NodeId) {
            self.exits.push(id);
        }
    }

    #[test]
    fn enter_is_preorder_exit_is_postorder() {
        let (ast, root) = small_ast();
        let mut rec = Recorder::default();
        walk(&ast, root, &mut rec);
        assert_eq!(rec.enters.len(), rec.exits.len());
        assert_eq!(rec.enters[0], root, "root entered first");
        assert_eq!(*rec.exits.last().unwrap(), root, "root exited last");
        // The root has no parent; every other node does.
        assert_eq!(rec.parents_seen[0], None);
        assert!(rec.parents_seen[1..].iter().all(Option::is_some));
    }

    #[test]
    fn skip_suppresses_children_once() {
        let (ast, root) = small_ast();

        struct SkipFunctions {
            entered: usize,
        }
        impl Visitor for SkipFunctions {
            fn enter(&mut self, walk: &mut Walk<'_>, id: NodeId) {
                self.entered += 1;
                if matches!(walk.ast.kind(id), NodeKind::Function { .. }) {
                    walk.skip_children();
                }
            }
        }

        let mut v = SkipFunctions { entered: 0 };
        walk(&ast, root, &mut v);
        // Only the unit and the function are entered.
        assert_eq!(v.entered, 2);
    }

    #[test]
    fn stop_aborts_everything() {
        let (ast, root) = small_ast();

        #[derive(Default)]
        struct StopAtFirstStmt {
            entered: usize,
            exited: usize,
        }
        impl Visitor for StopAtFirstStmt {
            fn enter(&mut self, walk: &mut Walk<'_>, id: NodeId) {
                self.entered += 1;
                if matches!(walk.ast.kind(id), NodeKind::VarDecl { .. }) {
                    walk.stop();
                }
            }
            fn exit(&mut self, _walk: &mut Walk<'_>, _id: NodeId) {
                self.exited += 1;
            }
        }

        let mut v = StopAtFirstStmt::default();
        walk(&ast, root, &mut v);
        assert_eq!(v.exited, 0, "no exit hook runs after stop()");
        assert!(v.entered > 0);
    }

    #[test]
    fn ancestor_indexes_from_parent() {
        let (ast, root) = small_ast();

        struct CheckAncestry;
        impl Visitor for CheckAncestry {
            fn enter(&mut self, walk: &mut Walk<'_>, id: NodeId) {
                if matches!(walk.ast.kind(id), NodeKind::Return { .. }) {
                    // return -> block -> function -> unit
                    let parent = walk.parent().unwrap();
                    assert!(matches!(walk.ast.kind(parent), NodeKind::Block { .. }));
                    let grand = walk.ancestor(1).unwrap();
                    assert!(matches!(walk.ast.kind(grand), NodeKind::Function { .. }));
                }
            }
        }

        walk(&ast, root, &mut CheckAncestry);
        let _ = root;
    }
}
