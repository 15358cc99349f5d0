//! Symbol table, scope tree, and the pass that builds them.
//!
//! Blend is function-scoped: `if`/`while`/`for`/`match` bodies do not open
//! scopes, so the tree only ever contains module scopes with function
//! scopes beneath them. Symbols and scopes live in arenas and refer to each
//! other by id.

use crate::ast::{Ast, NodeKind};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::walker::{walk, Visitor, Walk};
use blend_types::{NodeId, ScopeId, Span, StorageClass, SymbolId, Type};
use std::collections::HashMap;

/// Scope kind; the tree has no other levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// One per source unit.
    Module,
    /// One per function declaration.
    Function,
}

/// A lexical scope.
#[derive(Debug)]
pub struct Scope {
    /// Module or function.
    pub kind: ScopeKind,
    /// Enclosing scope; `None` for module scopes.
    pub parent: Option<ScopeId>,
    /// Child scopes in declaration order.
    pub children: Vec<ScopeId>,
    /// Symbols in declaration order.
    pub entries: Vec<SymbolId>,
    /// Declaring AST node (unit or function).
    pub owner: NodeId,
    by_name: HashMap<String, SymbolId>,
}

/// What a symbol names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// A `let`/`const` variable.
    Variable,
    /// A function parameter.
    Parameter,
    /// A function.
    Function,
    /// An `@map` variable at a fixed hardware address.
    MapVariable,
    /// A name bound by an `import`.
    Imported,
    /// A `type` alias.
    TypeAlias,
    /// An `enum` declaration.
    Enum,
    /// One member of an enum.
    EnumMember,
}

/// A declared name.
#[derive(Debug)]
pub struct Symbol {
    /// Declared (or import-bound) name.
    pub name: String,
    /// What it names.
    pub kind: SymbolKind,
    /// Declaring AST node.
    pub decl: NodeId,
    /// Resolved type; `Type::Error` until the type resolver runs.
    pub ty: Type,
    /// Storage class annotation.
    pub storage: StorageClass,
    /// Whether the symbol is exported from its module.
    pub exported: bool,
    /// Whether writes are rejected (`const` and `@data`).
    pub constant: bool,
    /// Owning scope.
    pub scope: ScopeId,
    /// Declaration location.
    pub span: Span,
    /// Resolved literal address of an `@map` variable.
    pub map_addr: Option<u16>,
    /// Value of an enum member.
    pub enum_value: Option<u16>,
    /// Source module of an imported symbol.
    pub import_from: Option<String>,
    /// Exported name in the source module (differs from `name` under `as`).
    pub import_source: Option<String>,
    /// Resolution target of an imported symbol.
    pub target: Option<SymbolId>,
}

impl Symbol {
    fn new(name: String, kind: SymbolKind, decl: NodeId, scope: ScopeId, span: Span) -> Self {
        Self {
            name,
            kind,
            decl,
            ty: Type::Error,
            storage: StorageClass::Auto,
            exported: false,
            constant: false,
            scope,
            span,
            map_addr: None,
            enum_value: None,
            import_from: None,
            import_source: None,
            target: None,
        }
    }
}

/// Arena of scopes and symbols with name lookup.
#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
    modules: Vec<(String, ScopeId)>,
    by_decl: HashMap<NodeId, SymbolId>,
}

impl SymbolTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope under `parent`.
    pub fn create_scope(&mut self, kind: ScopeKind, parent: Option<ScopeId>, owner: NodeId) -> ScopeId {
        let id = ScopeId::from_usize(self.scopes.len());
        self.scopes.push(Scope {
            kind,
            parent,
            children: Vec::new(),
            entries: Vec::new(),
            owner,
            by_name: HashMap::new(),
        });
        if let Some(parent) = parent {
            self.scopes[parent.index()].children.push(id);
        }
        id
    }

    /// Register a module scope under its dotted name.
    pub fn register_module(&mut self, name: &str, scope: ScopeId) {
        self.modules.push((name.to_owned(), scope));
    }

    /// The scope of the first unit declaring module `name`.
    pub fn module_scope(&self, name: &str) -> Option<ScopeId> {
        self.modules
            .iter()
            .find(|(module, _)| module == name)
            .map(|(_, scope)| *scope)
    }

    /// All registered modules, in unit order.
    pub fn modules(&self) -> &[(String, ScopeId)] {
        &self.modules
    }

    /// Insert `symbol`; fails with the existing id on a duplicate name in
    /// the same scope.
    pub fn declare(&mut self, symbol: Symbol) -> Result<SymbolId, SymbolId> {
        let scope = symbol.scope;
        if let Some(&existing) = self.scopes[scope.index()].by_name.get(&symbol.name) {
            return Err(existing);
        }
        let id = SymbolId::from_usize(self.symbols.len());
        let scope_data = &mut self.scopes[scope.index()];
        scope_data.by_name.insert(symbol.name.clone(), id);
        scope_data.entries.push(id);
        self.by_decl.entry(symbol.decl).or_insert(id);
        self.symbols.push(symbol);
        Ok(id)
    }

    /// The first symbol declared by AST node `decl`, if any.
    pub fn symbol_of_decl(&self, decl: NodeId) -> Option<SymbolId> {
        self.by_decl.get(&decl).copied()
    }

    /// Look `name` up in `scope` and its parent chain.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            let scope = &self.scopes[id.index()];
            if let Some(&symbol) = scope.by_name.get(name) {
                return Some(symbol);
            }
            cursor = scope.parent;
        }
        None
    }

    /// Look `name` up in `scope` only.
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.scopes[scope.index()].by_name.get(name).copied()
    }

    /// The scope behind `id`.
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    /// The symbol behind `id`.
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    /// Mutable access for the resolver passes.
    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    /// Follow an imported symbol to its resolution target.
    pub fn resolve_alias(&self, id: SymbolId) -> SymbolId {
        match self.symbol(id).target {
            Some(target) => target,
            None => id,
        }
    }

    /// All symbols, in declaration order.
    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId::from_usize(i), s))
    }

    /// Number of symbols declared.
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }
}

/// Build the symbol table for every unit root, in unit order.
pub fn build(ast: &Ast, roots: &[NodeId], diags: &mut Diagnostics) -> SymbolTable {
    let mut table = SymbolTable::new();
    for &root in roots {
        let mut builder = Builder {
            table: &mut table,
            diags: &mut *diags,
            scope_stack: Vec::new(),
        };
        walk(ast, root, &mut builder);
    }
    table
}

struct Builder<'a> {
    table: &'a mut SymbolTable,
    diags: &'a mut Diagnostics,
    scope_stack: Vec<ScopeId>,
}

impl Builder<'_> {
    fn current_scope(&self) -> ScopeId {
        *self.scope_stack.last().expect("builder entered a unit first")
    }

    fn declare(&mut self, symbol: Symbol) -> Option<SymbolId> {
        let name = symbol.name.clone();
        let span = symbol.span;
        match self.table.declare(symbol) {
            Ok(id) => Some(id),
            Err(existing) => {
                let first = self.table.symbol(existing).span;
                self.diags.push(
                    Diagnostic::new(
                        DiagnosticCode::DuplicateDeclaration,
                        format!("`{name}` is already declared in this scope"),
                    )
                    .with_span(span)
                    .with_related(first, "first declaration is here"),
                );
                None
            }
        }
    }
}

impl Visitor for Builder<'_> {
    fn enter(&mut self, walk: &mut Walk<'_>, id: NodeId) {
        let span = walk.ast.span(id);
        match walk.ast.kind(id) {
            NodeKind::Unit { name, .. } => {
                let scope = self.table.create_scope(ScopeKind::Module, None, id);
                self.table.register_module(name, scope);
                self.scope_stack.push(scope);
            }
            NodeKind::Import { names, module } => {
                for item in names {
                    let mut symbol = Symbol::new(
                        item.local_name().to_owned(),
                        SymbolKind::Imported,
                        id,
                        self.current_scope(),
                        span,
                    );
                    symbol.import_from = Some(module.clone());
                    symbol.import_source = Some(item.name.clone());
                    self.declare(symbol);
                }
                walk.skip_children();
            }
            NodeKind::Function {
                name,
                is_export,
                is_callback,
                params,
                ..
            } => {
                let module_scope = self.current_scope();
                let mut symbol =
                    Symbol::new(name.clone(), SymbolKind::Function, id, module_scope, span);
                symbol.exported = *is_export;
                if name == "main" && !is_export && !is_callback {
                    symbol.exported = true;
                    self.diags.push(
                        Diagnostic::new(
                            DiagnosticCode::ImplicitMainExport,
                            "`main` is exported automatically",
                        )
                        .with_span(span)
                        .with_suggestion("write `export function main` to make it explicit"),
                    );
                }
                self.declare(symbol);

                let scope = self
                    .table
                    .create_scope(ScopeKind::Function, Some(module_scope), id);
                self.scope_stack.push(scope);
                // Parameters are declared before the body is entered.
                for &param in params {
                    let NodeKind::Param { name, .. } = walk.ast.kind(param) else {
                        continue;
                    };
                    self.declare(Symbol::new(
                        name.clone(),
                        SymbolKind::Parameter,
                        param,
                        scope,
                        walk.ast.span(param),
                    ));
                }
            }
            NodeKind::VarDecl {
                name,
                constant,
                is_export,
                storage,
                ..
            } => {
                let scope = self.current_scope();
                let at_module = self.table.scope(scope).kind == ScopeKind::Module;
                if *storage == StorageClass::Map && !at_module {
                    self.diags.emit(
                        DiagnosticCode::InvalidStorageClass,
                        "`@map` declarations are only legal at module scope",
                        span,
                    );
                }
                let kind = if *storage == StorageClass::Map && at_module {
                    SymbolKind::MapVariable
                } else {
                    SymbolKind::Variable
                };
                let mut symbol = Symbol::new(name.clone(), kind, id, scope, span);
                symbol.storage = *storage;
                symbol.exported = *is_export;
                symbol.constant = *constant || *storage == StorageClass::Data;
                self.declare(symbol);
            }
            NodeKind::TypeAlias { name, .. } => {
                let symbol = Symbol::new(
                    name.clone(),
                    SymbolKind::TypeAlias,
                    id,
                    self.current_scope(),
                    span,
                );
                self.declare(symbol);
            }
            NodeKind::EnumDecl { name, repr, members } => {
                let scope = self.current_scope();
                let mut symbol = Symbol::new(name.clone(), SymbolKind::Enum, id, scope, span);
                symbol.ty = Type::Enum {
                    name: name.clone(),
                    repr: *repr,
                };
                self.declare(symbol);
                // Members are declared under their qualified name so that
                // `Color.Red` resolves with a plain lookup.
                for (member, _) in members {
                    let mut ms = Symbol::new(
                        format!("{name}.{member}"),
                        SymbolKind::EnumMember,
                        id,
                        scope,
                        span,
                    );
                    ms.ty = Type::Enum {
                        name: name.clone(),
                        repr: *repr,
                    };
                    ms.constant = true;
                    self.declare(ms);
                }
                walk.skip_children();
            }
            NodeKind::For { var, .. } => {
                // The loop variable is implicitly a function-scoped local.
                let scope = self.current_scope();
                if self.table.lookup(scope, var).is_none() {
                    let symbol = Symbol::new(var.clone(), SymbolKind::Variable, id, scope, span);
                    self.declare(symbol);
                }
            }
            _ => {}
        }
    }

    fn exit(&mut self, walk: &mut Walk<'_>, id: NodeId) {
        match walk.ast.kind(id) {
            NodeKind::Unit { .. } | NodeKind::Function { .. } => {
                self.scope_stack.pop();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, parser};

    fn build_from(source: &str) -> (Ast, SymbolTable, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = lexer::lex(0, source, &mut diags);
        let mut ast = Ast::new();
        let root = parser::parse_unit(&mut ast, tokens, "Main", &mut diags);
        let table = build(&ast, &[root], &mut diags);
        (ast, table, diags)
    }

    #[test]
    fn functions_get_scopes_with_parameters() {
        let (_, table, diags) = build_from(
            "module M;\nlet g: byte = 0;\nfunction f(a: byte, b: word): void { let x: byte = 1; }",
        );
        assert!(!diags.has_errors());
        let module = table.module_scope("M").unwrap();
        assert!(table.lookup_local(module, "g").is_some());
        let f = table.lookup_local(module, "f").unwrap();
        assert_eq!(table.symbol(f).kind, SymbolKind::Function);

        let func_scope = table.scope(module).children[0];
        assert_eq!(table.scope(func_scope).kind, ScopeKind::Function);
        let names: Vec<_> = table
            .scope(func_scope)
            .entries
            .iter()
            .map(|&s| table.symbol(s).name.clone())
            .collect();
        assert_eq!(names, vec!["a", "b", "x"]);
    }

    #[test]
    fn duplicate_declaration_is_reported_per_scope() {
        let (_, _, diags) =
            build_from("module M;\nfunction f(): void { let x: byte = 1; let x: byte = 2; }");
        assert!(diags.contains(DiagnosticCode::DuplicateDeclaration));
    }

    #[test]
    fn shadowing_across_scopes_is_permitted() {
        let (_, _, diags) =
            build_from("module M;\nlet x: byte = 0;\nfunction f(): void { let x: byte = 1; }");
        assert!(!diags.has_errors());
    }

    #[test]
    fn map_inside_function_is_invalid() {
        let (_, _, diags) =
            build_from("module M;\nfunction f(): void { @map B at $D020: byte; }");
        assert!(diags.contains(DiagnosticCode::InvalidStorageClass));
    }

    #[test]
    fn bare_main_is_auto_exported() {
        let (_, table, diags) = build_from("module M;\nfunction main(): void { }");
        assert!(diags.contains(DiagnosticCode::ImplicitMainExport));
        let module = table.module_scope("M").unwrap();
        let main = table.lookup_local(module, "main").unwrap();
        assert!(table.symbol(main).exported);
    }

    #[test]
    fn enum_members_resolve_by_qualified_name() {
        let (_, table, diags) = build_from("module M;\nenum Color { Red, Green }");
        assert!(!diags.has_errors());
        let module = table.module_scope("M").unwrap();
        assert!(table.lookup_local(module, "Color.Red").is_some());
        assert!(table.lookup_local(module, "Color.Green").is_some());
    }

    #[test]
    fn imports_bind_alias_names() {
        let (_, table, diags) = build_from("module M;\nimport {put, get as fetch} from IO;");
        assert!(!diags.has_errors());
        let module = table.module_scope("M").unwrap();
        assert!(table.lookup_local(module, "put").is_some());
        assert!(table.lookup_local(module, "fetch").is_some());
        assert!(table.lookup_local(module, "get").is_none());
        let fetch = table.lookup_local(module, "fetch").unwrap();
        assert_eq!(table.symbol(fetch).import_source.as_deref(), Some("get"));
    }
}
