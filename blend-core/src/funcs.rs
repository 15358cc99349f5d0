//! Function registry.
//!
//! One entry per function declaration across all units, in unit order. The
//! registry is the shared index used by the call graph, the frame allocator
//! and the IL generator; fully qualified names (`Module.function`) key the
//! FrameMap.

use crate::ast::{Ast, NodeKind};
use crate::symtab::{ScopeKind, SymbolTable};
use blend_types::{FuncId, NodeId, ScopeId, Span, SymbolId, Type};
use std::collections::HashMap;

/// One function's registry entry.
#[derive(Debug)]
pub struct FuncInfo {
    /// Bare declared name.
    pub name: String,
    /// Declaring module.
    pub module: String,
    /// `Module.function`, the FrameMap key.
    pub qualified: String,
    /// Declaring AST node.
    pub decl: NodeId,
    /// Body block node.
    pub body: NodeId,
    /// The function's scope.
    pub scope: ScopeId,
    /// The function's symbol in its module scope.
    pub symbol: SymbolId,
    /// Parameter symbols in declaration order.
    pub params: Vec<SymbolId>,
    /// Return type; `Type::Void` when omitted. Filled by the type resolver.
    pub ret: Type,
    /// Declared as a `callback` (interrupt handler entry point).
    pub is_callback: bool,
    /// Exported from its module.
    pub is_export: bool,
    /// Declaration location.
    pub span: Span,
}

/// All functions of a compilation.
#[derive(Debug, Default)]
pub struct FuncRegistry {
    funcs: Vec<FuncInfo>,
    by_qualified: HashMap<String, FuncId>,
    by_decl: HashMap<NodeId, FuncId>,
}

impl FuncRegistry {
    /// The function behind `id`.
    pub fn get(&self, id: FuncId) -> &FuncInfo {
        &self.funcs[id.index()]
    }

    /// Mutable access for the type resolver.
    pub fn get_mut(&mut self, id: FuncId) -> &mut FuncInfo {
        &mut self.funcs[id.index()]
    }

    /// Look a function up by its qualified name.
    pub fn by_qualified(&self, qualified: &str) -> Option<FuncId> {
        self.by_qualified.get(qualified).copied()
    }

    /// Look a function up by its declaring node.
    pub fn by_decl(&self, decl: NodeId) -> Option<FuncId> {
        self.by_decl.get(&decl).copied()
    }

    /// All functions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (FuncId, &FuncInfo)> {
        self.funcs
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId::from_usize(i), f))
    }

    /// Number of functions.
    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    /// Entry points: `main` plus every callback.
    pub fn entry_points(&self) -> Vec<FuncId> {
        self.iter()
            .filter(|(_, f)| f.name == "main" || f.is_callback)
            .map(|(id, _)| id)
            .collect()
    }
}

/// Collect every function declared by the given unit roots.
pub fn collect(ast: &Ast, roots: &[NodeId], table: &SymbolTable) -> FuncRegistry {
    let mut registry = FuncRegistry::default();
    for &root in roots {
        let NodeKind::Unit { name: module, items, .. } = ast.kind(root) else {
            continue;
        };
        let Some(module_scope) = table.module_scope(module) else {
            continue;
        };
        for &item in items {
            let NodeKind::Function {
                name,
                is_export,
                is_callback,
                params,
                body,
                ..
            } = ast.kind(item)
            else {
                continue;
            };
            let Some(symbol) = table.lookup_local(module_scope, name) else {
                continue;
            };
            // The function's scope is the child of the module scope that
            // the declaration node owns.
            let scope = table
                .scope(module_scope)
                .children
                .iter()
                .copied()
                .find(|&s| {
                    table.scope(s).kind == ScopeKind::Function && table.scope(s).owner == item
                });
            let Some(scope) = scope else {
                continue;
            };
            let param_symbols = params
                .iter()
                .filter_map(|&p| {
                    let NodeKind::Param { name, .. } = ast.kind(p) else {
                        return None;
                    };
                    table.lookup_local(scope, name)
                })
                .collect();
            let id = FuncId::from_usize(registry.funcs.len());
            let qualified = format!("{module}.{name}");
            registry.by_qualified.insert(qualified.clone(), id);
            registry.by_decl.insert(item, id);
            registry.funcs.push(FuncInfo {
                name: name.clone(),
                module: module.clone(),
                qualified,
                decl: item,
                body: *body,
                scope,
                symbol,
                params: param_symbols,
                ret: Type::Void,
                is_callback: *is_callback,
                is_export: *is_export,
                span: ast.span(item),
            });
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::{lexer, parser, symtab};

    #[test]
    fn collects_in_declaration_order_with_entry_points() {
        let source = "module Game;\nfunction helper(): void { }\ncallback function irq(): void { }\nfunction main(): void { }";
        let mut diags = Diagnostics::new();
        let tokens = lexer::lex(0, source, &mut diags);
        let mut ast = crate::ast::Ast::new();
        let root = parser::parse_unit(&mut ast, tokens, "Main", &mut diags);
        let table = symtab::build(&ast, &[root], &mut diags);
        let registry = collect(&ast, &[root], &table);

        let names: Vec<_> = registry.iter().map(|(_, f)| f.qualified.clone()).collect();
        assert_eq!(names, vec!["Game.helper", "Game.irq", "Game.main"]);
        assert_eq!(registry.entry_points().len(), 2);
        assert_eq!(registry.get(registry.by_qualified("Game.helper").unwrap()).params.len(), 0);
    }
}
