//! Module graph checks.
//!
//! Imports are resolved by module name, not file path, so the graph is
//! built from `module` declarations and `import … from` clauses. Cycles are
//! detected with a topological three-color walk before semantic analysis;
//! a cycle is fatal.

use crate::ast::{Ast, NodeKind};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use blend_types::NodeId;
use std::collections::HashMap;

/// Detect import cycles among the parsed units.
pub fn check_cycles(ast: &Ast, roots: &[NodeId], diags: &mut Diagnostics) {
    // Module name -> imported module names, merged across same-named units.
    let mut edges: HashMap<String, Vec<String>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for &root in roots {
        let NodeKind::Unit { name, items, .. } = ast.kind(root) else {
            continue;
        };
        if !edges.contains_key(name) {
            order.push(name.clone());
        }
        let deps = edges.entry(name.clone()).or_default();
        for &item in items {
            if let NodeKind::Import { module, .. } = ast.kind(item) {
                if !deps.contains(module) {
                    deps.push(module.clone());
                }
            }
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }
    let mut colors: HashMap<&str, Color> =
        order.iter().map(|m| (m.as_str(), Color::White)).collect();

    fn dfs<'a>(
        module: &'a str,
        edges: &'a HashMap<String, Vec<String>>,
        colors: &mut HashMap<&'a str, Color>,
        chain: &mut Vec<&'a str>,
        diags: &mut Diagnostics,
    ) {
        colors.insert(module, Color::Gray);
        chain.push(module);
        if let Some(deps) = edges.get(module) {
            for dep in deps {
                match colors.get(dep.as_str()).copied() {
                    // Imports of unknown modules are reported by import
                    // resolution, not here.
                    None => {}
                    Some(Color::White) => dfs(dep, edges, colors, chain, diags),
                    Some(Color::Gray) => {
                        let start = chain
                            .iter()
                            .position(|&m| m == dep.as_str())
                            .unwrap_or(chain.len() - 1);
                        let path = chain[start..]
                            .iter()
                            .chain(core::iter::once(&dep.as_str()))
                            .copied()
                            .collect::<Vec<_>>()
                            .join(" → ");
                        diags.push(Diagnostic::new(
                            DiagnosticCode::ImportCycle,
                            format!("modules import each other: {path}"),
                        ));
                    }
                    Some(Color::Black) => {}
                }
            }
        }
        chain.pop();
        colors.insert(module, Color::Black);
    }

    let mut chain = Vec::new();
    for module in &order {
        if colors.get(module.as_str()).copied() == Some(Color::White) {
            dfs(module, &edges, &mut colors, &mut chain, diags);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, parser};

    fn check(sources: &[&str]) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let mut ast = Ast::new();
        let roots: Vec<NodeId> = sources
            .iter()
            .enumerate()
            .map(|(i, src)| {
                let tokens = lexer::lex(i as u16, src, &mut diags);
                parser::parse_unit(&mut ast, tokens, "Main", &mut diags)
            })
            .collect();
        check_cycles(&ast, &roots, &mut diags);
        diags
    }

    #[test]
    fn acyclic_imports_pass() {
        let diags = check(&[
            "module A;\nimport {f} from B;\nexport function g(): void { }",
            "module B;\nexport function f(): void { }",
        ]);
        assert!(!diags.contains(DiagnosticCode::ImportCycle));
    }

    #[test]
    fn two_module_cycle_is_fatal() {
        let diags = check(&[
            "module A;\nimport {f} from B;\nexport function g(): void { }",
            "module B;\nimport {g} from A;\nexport function f(): void { }",
        ]);
        assert!(diags.contains(DiagnosticCode::ImportCycle));
        let message = &diags
            .items()
            .iter()
            .find(|d| d.code == DiagnosticCode::ImportCycle)
            .unwrap()
            .message;
        assert!(message.contains("A → B → A") || message.contains("B → A → B"));
    }

    #[test]
    fn self_import_is_a_cycle() {
        let diags = check(&["module A;\nimport {x} from A;"]);
        assert!(diags.contains(DiagnosticCode::ImportCycle));
    }
}
