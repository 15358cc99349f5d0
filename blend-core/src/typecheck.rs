//! Type resolution and type checking.
//!
//! Resolution binds every type annotation, enum member, signature and `@map`
//! address to concrete descriptors. Checking then computes a type for every
//! expression, validates statements, and records its findings in side
//! tables. Failures poison the affected node with `Type::Error` so
//! downstream passes see one diagnostic instead of a cascade.

use crate::ast::{Ast, BinOp, NodeKind, SideTable, UnaryOp};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::funcs::FuncRegistry;
use crate::symtab::{SymbolKind, SymbolTable};
use blend_types::{NodeId, ScopeId, StorageClass, SymbolId, Type, Width};

/// Function-like constructs handled by the compiler itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    /// `peek(addr): byte`
    Peek,
    /// `peekw(addr): word`
    Peekw,
    /// `poke(addr, value): void`
    Poke,
    /// `pokew(addr, value): void`
    Pokew,
    /// `hi(w): byte`
    Hi,
    /// `lo(w): byte`
    Lo,
    /// `len(array): word`, compile-time constant.
    Len,
    /// `sizeof(T): word`, compile-time constant.
    Sizeof,
}

impl Intrinsic {
    /// The intrinsic named `name`, if any. Intrinsic names are reserved and
    /// cannot be shadowed.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "peek" => Self::Peek,
            "peekw" => Self::Peekw,
            "poke" => Self::Poke,
            "pokew" => Self::Pokew,
            "hi" => Self::Hi,
            "lo" => Self::Lo,
            "len" => Self::Len,
            "sizeof" => Self::Sizeof,
            _ => return None,
        })
    }

    /// Number of arguments the intrinsic takes.
    pub const fn arity(self) -> usize {
        match self {
            Self::Poke | Self::Pokew => 2,
            _ => 1,
        }
    }
}

/// Side tables produced by this module and read by every later pass.
#[derive(Debug, Default)]
pub struct Analysis {
    /// Type of every expression node.
    pub types: SideTable<Type>,
    /// Symbol bound to every identifier / member / callee node.
    pub bindings: SideTable<SymbolId>,
    /// Compile-time constant value of foldable expression nodes.
    pub consts: SideTable<u32>,
}

impl Analysis {
    /// Empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded type of `id`, defaulting to the poison type.
    pub fn type_of(&self, id: NodeId) -> Type {
        self.types.get(id).cloned().unwrap_or(Type::Error)
    }
}

// ── Type resolution ──────────────────────────────────────────────────────

/// Resolve type annotations, enum members, `@map` addresses, imports and
/// function signatures.
pub fn resolve(
    ast: &Ast,
    roots: &[NodeId],
    table: &mut SymbolTable,
    funcs: &mut FuncRegistry,
    diags: &mut Diagnostics,
) {
    tracing::debug!(units = roots.len(), "resolving types");
    let mut resolver = Resolver {
        ast,
        diags: &mut *diags,
    };

    for &root in roots {
        let NodeKind::Unit { name: module, items, .. } = ast.kind(root) else {
            continue;
        };
        let Some(scope) = table.module_scope(module) else {
            continue;
        };
        for &item in items {
            resolver.resolve_item(table, funcs, scope, item);
        }
    }

    resolve_imports(table, diags);
}

struct Resolver<'a> {
    ast: &'a Ast,
    diags: &'a mut Diagnostics,
}

impl Resolver<'_> {
    fn resolve_item(
        &mut self,
        table: &mut SymbolTable,
        funcs: &mut FuncRegistry,
        scope: ScopeId,
        item: NodeId,
    ) {
        match self.ast.kind(item) {
            NodeKind::EnumDecl { name, repr, members } => {
                let mut next = 0u32;
                for (member, value) in members {
                    if let Some(value_node) = value {
                        match eval_const(self.ast, table, scope, *value_node) {
                            Some(v) => next = v,
                            None => self.diags.emit(
                                DiagnosticCode::TypeMismatch,
                                format!("enum member `{member}` needs a constant value"),
                                self.ast.span(*value_node),
                            ),
                        }
                    }
                    let limit = match repr {
                        Width::Byte => u8::MAX as u32,
                        Width::Word => u16::MAX as u32,
                    };
                    if next > limit {
                        self.diags.emit(
                            DiagnosticCode::TypeMismatch,
                            format!("enum member `{name}.{member}` value {next} exceeds {repr}"),
                            self.ast.span(item),
                        );
                    }
                    if let Some(id) = table.lookup_local(scope, &format!("{name}.{member}")) {
                        table.symbol_mut(id).enum_value = Some(next as u16);
                    }
                    next = next.saturating_add(1);
                }
            }
            NodeKind::TypeAlias { name, ty } => {
                let resolved = self.resolve_type(table, scope, *ty);
                if let Some(id) = table.lookup_local(scope, name) {
                    table.symbol_mut(id).ty = resolved;
                }
            }
            NodeKind::VarDecl {
                name, ty, map, storage, ..
            } => {
                let declared = ty.map(|t| self.resolve_type(table, scope, t));
                if let Some(id) = table.lookup_local(scope, name) {
                    if let Some(declared) = declared.clone() {
                        table.symbol_mut(id).ty = declared;
                    }
                    if let Some(map) = map {
                        self.resolve_map_address(table, scope, id, *map, item);
                    }
                    let _ = storage;
                }
            }
            NodeKind::Function { name, params, ret, .. } => {
                let Some(func_id) = funcs.by_decl(item) else {
                    return;
                };
                let func_scope = funcs.get(func_id).scope;
                for &param in params {
                    let NodeKind::Param { name, ty } = self.ast.kind(param) else {
                        continue;
                    };
                    let resolved = self.resolve_type(table, scope, *ty);
                    if matches!(resolved, Type::Array(..)) {
                        self.diags.emit(
                            DiagnosticCode::TypeMismatch,
                            format!("parameter `{name}` cannot have an array type; arrays are not passed by value"),
                            self.ast.span(param),
                        );
                    }
                    if let Some(id) = table.lookup_local(func_scope, name) {
                        table.symbol_mut(id).ty = resolved;
                    }
                }
                let ret_ty = match ret {
                    Some(ty) => {
                        let resolved = self.resolve_type(table, scope, *ty);
                        if matches!(resolved, Type::Array(..)) {
                            self.diags.emit(
                                DiagnosticCode::TypeMismatch,
                                format!("`{name}` cannot return an array by value"),
                                self.ast.span(*ty),
                            );
                        }
                        resolved
                    }
                    None => Type::Void,
                };
                funcs.get_mut(func_id).ret = ret_ty.clone();
                if let Some(id) = table.lookup_local(scope, name) {
                    table.symbol_mut(id).ty = ret_ty;
                }
            }
            _ => {}
        }
    }

    fn resolve_map_address(
        &mut self,
        table: &mut SymbolTable,
        scope: ScopeId,
        symbol: SymbolId,
        map: crate::ast::MapRange,
        decl: NodeId,
    ) {
        let span = self.ast.span(decl);
        let Some(lo) = eval_const(self.ast, table, scope, map.lo) else {
            self.diags.emit(
                DiagnosticCode::AddressOutOfRange,
                "`@map` address must be a compile-time constant",
                span,
            );
            return;
        };
        if lo > u16::MAX as u32 {
            self.diags.emit(
                DiagnosticCode::AddressOutOfRange,
                format!("`@map` address ${lo:X} lies outside the 64 KB address space"),
                span,
            );
            return;
        }
        if let Some(hi_node) = map.hi {
            let Some(hi) = eval_const(self.ast, table, scope, hi_node) else {
                self.diags.emit(
                    DiagnosticCode::AddressOutOfRange,
                    "`@map` range end must be a compile-time constant",
                    span,
                );
                return;
            };
            let size = table.symbol(symbol).ty.size() as u32;
            if hi > u16::MAX as u32 || hi < lo || hi - lo + 1 < size {
                self.diags.emit(
                    DiagnosticCode::AddressOutOfRange,
                    format!(
                        "`@map` range ${lo:X}..${hi:X} does not hold {} bytes",
                        size
                    ),
                    span,
                );
                return;
            }
        }
        table.symbol_mut(symbol).map_addr = Some(lo as u16);
    }

    fn resolve_type(&mut self, table: &SymbolTable, scope: ScopeId, node: NodeId) -> Type {
        resolve_type_expr(self.ast, table, scope, node, self.diags)
    }
}

/// Bind a type annotation node to a concrete type descriptor.
pub fn resolve_type_expr(
    ast: &Ast,
    table: &SymbolTable,
    scope: ScopeId,
    node: NodeId,
    diags: &mut Diagnostics,
) -> Type {
    match ast.kind(node) {
        NodeKind::TypeName { name } => match name.as_str() {
            "void" => Type::Void,
            "bool" => Type::Bool,
            "byte" => Type::Byte,
            "word" => Type::Word,
            _ => match table.lookup(scope, name) {
                Some(id) => {
                    let symbol = table.symbol(id);
                    match symbol.kind {
                        SymbolKind::TypeAlias | SymbolKind::Enum => symbol.ty.clone(),
                        _ => {
                            diags.emit(
                                DiagnosticCode::TypeMismatch,
                                format!("`{name}` is not a type"),
                                ast.span(node),
                            );
                            Type::Error
                        }
                    }
                }
                None => {
                    diags.emit(
                        DiagnosticCode::UnknownSymbol,
                        format!("unknown type `{name}`"),
                        ast.span(node),
                    );
                    Type::Error
                }
            },
        },
        NodeKind::TypeArray { elem, len } => {
            let elem_ty = resolve_type_expr(ast, table, scope, *elem, diags);
            match eval_const(ast, table, scope, *len) {
                Some(n) if (1..=u16::MAX as u32).contains(&n) => {
                    Type::Array(Box::new(elem_ty), n as u16)
                }
                _ => {
                    diags.emit(
                        DiagnosticCode::TypeMismatch,
                        "array length must be a constant in 1..=65535",
                        ast.span(*len),
                    );
                    Type::Error
                }
            }
        }
        _ => Type::Error,
    }
}

/// Bind every imported symbol to its exporting declaration.
fn resolve_imports(table: &mut SymbolTable, diags: &mut Diagnostics) {
    let imports: Vec<SymbolId> = table
        .symbols()
        .filter(|(_, s)| s.kind == SymbolKind::Imported)
        .map(|(id, _)| id)
        .collect();
    for id in imports {
        let (from, source, span) = {
            let s = table.symbol(id);
            (
                s.import_from.clone().unwrap_or_default(),
                s.import_source.clone().unwrap_or_default(),
                s.span,
            )
        };
        let Some(module_scope) = table.module_scope(&from) else {
            diags.emit(
                DiagnosticCode::UnknownSymbol,
                format!("unknown module `{from}`"),
                span,
            );
            continue;
        };
        match table.lookup_local(module_scope, &source) {
            Some(target) if table.symbol(target).exported => {
                let ty = table.symbol(target).ty.clone();
                let constant = table.symbol(target).constant;
                let symbol = table.symbol_mut(id);
                symbol.target = Some(target);
                symbol.ty = ty;
                symbol.constant = constant;
            }
            Some(target) => {
                let decl_span = table.symbol(target).span;
                diags.push(
                    Diagnostic::new(
                        DiagnosticCode::UnknownSymbol,
                        format!("`{source}` exists in `{from}` but is not exported"),
                    )
                    .with_span(span)
                    .with_related(decl_span, "declared here without `export`"),
                );
            }
            None => diags.emit(
                DiagnosticCode::UnknownSymbol,
                format!("module `{from}` has no export named `{source}`"),
                span,
            ),
        }
    }
}

// ── Constant evaluation ──────────────────────────────────────────────────

/// Evaluate a compile-time constant expression.
///
/// Handles literals, enum members, `const` variables with constant
/// initializers, unary `+`/`-`/`~` and binary arithmetic; 16-bit wrapping
/// semantics throughout.
pub fn eval_const(ast: &Ast, table: &SymbolTable, scope: ScopeId, node: NodeId) -> Option<u32> {
    eval_const_inner(ast, table, scope, node, 0)
}

fn eval_const_inner(
    ast: &Ast,
    table: &SymbolTable,
    scope: ScopeId,
    node: NodeId,
    depth: usize,
) -> Option<u32> {
    if depth > 16 {
        return None;
    }
    match ast.kind(node) {
        NodeKind::NumLit { value } => Some(*value),
        NodeKind::BoolLit { value } => Some(*value as u32),
        NodeKind::Member { base, member } => {
            let id = table.lookup(scope, &format!("{base}.{member}"))?;
            table.symbol(id).enum_value.map(u32::from)
        }
        NodeKind::Ident { name } => {
            let id = table.lookup(scope, name)?;
            let symbol = table.symbol(table.resolve_alias(id));
            if !symbol.constant {
                return None;
            }
            let NodeKind::VarDecl { init: Some(init), .. } = ast.kind(symbol.decl) else {
                return None;
            };
            eval_const_inner(ast, table, symbol.scope, *init, depth + 1)
        }
        NodeKind::Unary { op, operand } => {
            let v = eval_const_inner(ast, table, scope, *operand, depth + 1)?;
            Some(match op {
                UnaryOp::Pos => v,
                UnaryOp::Neg => (v as u16).wrapping_neg() as u32,
                UnaryOp::BitNot => !(v as u16) as u32,
                UnaryOp::Not => (v == 0) as u32,
            })
        }
        NodeKind::Binary { op, lhs, rhs } => {
            let l = eval_const_inner(ast, table, scope, *lhs, depth + 1)? as u16;
            let r = eval_const_inner(ast, table, scope, *rhs, depth + 1)? as u16;
            Some(match op {
                BinOp::Add => l.wrapping_add(r) as u32,
                BinOp::Sub => l.wrapping_sub(r) as u32,
                BinOp::Mul => l.wrapping_mul(r) as u32,
                BinOp::Div => l.checked_div(r)? as u32,
                BinOp::Mod => l.checked_rem(r)? as u32,
                BinOp::BitAnd => (l & r) as u32,
                BinOp::BitOr => (l | r) as u32,
                BinOp::BitXor => (l ^ r) as u32,
                BinOp::Shl => (l << (r & 15)) as u32,
                BinOp::Shr => (l >> (r & 15)) as u32,
                BinOp::Eq => (l == r) as u32,
                BinOp::Ne => (l != r) as u32,
                BinOp::Lt => (l < r) as u32,
                BinOp::Le => (l <= r) as u32,
                BinOp::Gt => (l > r) as u32,
                BinOp::Ge => (l >= r) as u32,
                BinOp::LogicalAnd => ((l != 0) && (r != 0)) as u32,
                BinOp::LogicalOr => ((l != 0) || (r != 0)) as u32,
            })
        }
        _ => None,
    }
}

// ── Type checking ────────────────────────────────────────────────────────

/// Type-check every function body and module-level initializer.
pub fn check(
    ast: &Ast,
    roots: &[NodeId],
    table: &mut SymbolTable,
    funcs: &FuncRegistry,
    analysis: &mut Analysis,
    diags: &mut Diagnostics,
) {
    tracing::debug!(functions = funcs.len(), "type checking");

    // Module-level initializers must be compile-time constants.
    for &root in roots {
        let NodeKind::Unit { name: module, items, .. } = ast.kind(root) else {
            continue;
        };
        let Some(scope) = table.module_scope(module) else {
            continue;
        };
        for &item in items {
            let NodeKind::VarDecl { name, init: Some(init), .. } = ast.kind(item) else {
                continue;
            };
            let foldable = matches!(
                ast.kind(*init),
                NodeKind::StrLit { .. } | NodeKind::ArrayLit { .. }
            ) || eval_const(ast, table, scope, *init).is_some();
            if !foldable {
                diags.emit(
                    DiagnosticCode::TypeMismatch,
                    format!("module-level `{name}` needs a compile-time constant initializer"),
                    ast.span(*init),
                );
            }
            // Infer unannotated module variables from the literal.
            if let Some(id) = table.lookup_local(scope, name) {
                if table.symbol(id).ty.is_error() {
                    let ty = literal_type(ast, *init);
                    table.symbol_mut(id).ty = ty;
                }
            }
        }
    }

    for (_, info) in funcs.iter() {
        let mut checker = Checker {
            ast,
            table: &mut *table,
            funcs,
            analysis: &mut *analysis,
            diags: &mut *diags,
            scope: info.scope,
            ret: info.ret.clone(),
            loop_depth: 0,
        };
        checker.declare_locals(info.body);
        checker.check_stmt(info.body);
        if info.ret != Type::Void && !always_returns(ast, info.body) {
            diags.push(
                Diagnostic::new(
                    DiagnosticCode::ReturnMissing,
                    format!(
                        "`{}` returns {} but may fall off the end",
                        info.qualified, info.ret
                    ),
                )
                .with_span(info.span),
            );
        }
    }
}

/// The type of a literal initializer, for inference.
fn literal_type(ast: &Ast, node: NodeId) -> Type {
    match ast.kind(node) {
        NodeKind::NumLit { value } => {
            if *value <= u8::MAX as u32 {
                Type::Byte
            } else {
                Type::Word
            }
        }
        NodeKind::BoolLit { .. } => Type::Bool,
        NodeKind::StrLit { value } => Type::Array(Box::new(Type::Byte), value.len().max(1) as u16),
        NodeKind::ArrayLit { elems } => match elems.first() {
            Some(&first) => Type::Array(Box::new(literal_type(ast, first)), elems.len() as u16),
            None => Type::Error,
        },
        NodeKind::Unary { operand, .. } => literal_type(ast, *operand),
        _ => Type::Error,
    }
}

/// Whether control cannot fall through `stmt`.
fn always_returns(ast: &Ast, stmt: NodeId) -> bool {
    match ast.kind(stmt) {
        NodeKind::Return { .. } => true,
        NodeKind::Block { stmts } => stmts.iter().any(|&s| always_returns(ast, s)),
        NodeKind::If {
            then_block,
            else_block: Some(else_block),
            ..
        } => always_returns(ast, *then_block) && always_returns(ast, *else_block),
        NodeKind::Match {
            cases,
            default: Some(default),
            ..
        } => {
            cases.iter().all(|c| always_returns(ast, c.body)) && always_returns(ast, *default)
        }
        // A do-while body runs at least once.
        NodeKind::DoWhile { body, .. } => always_returns(ast, *body),
        _ => false,
    }
}

struct Checker<'a> {
    ast: &'a Ast,
    table: &'a mut SymbolTable,
    funcs: &'a FuncRegistry,
    analysis: &'a mut Analysis,
    diags: &'a mut Diagnostics,
    scope: ScopeId,
    ret: Type,
    loop_depth: u32,
}

impl Checker<'_> {
    /// Pre-pass: give every local declaration a type, resolving annotations
    /// and inferring unannotated ones from their initializers, so later
    /// uses anywhere in the function see it.
    fn declare_locals(&mut self, stmt: NodeId) {
        match self.ast.kind(stmt) {
            NodeKind::VarDecl { ty: Some(ty), .. } => {
                if let Some(id) = self.table.symbol_of_decl(stmt) {
                    if self.table.symbol(id).ty.is_error() {
                        let resolved =
                            resolve_type_expr(self.ast, self.table, self.scope, *ty, self.diags);
                        self.table.symbol_mut(id).ty = resolved;
                    }
                }
            }
            NodeKind::VarDecl { name, ty: None, init: Some(init), .. } => {
                if let Some(id) = self.table.symbol_of_decl(stmt) {
                    if self.table.symbol(id).ty.is_error() {
                        let inferred = self.type_of(*init);
                        if inferred == Type::Void {
                            self.diags.emit(
                                DiagnosticCode::TypeMismatch,
                                format!("cannot infer a type for `{name}` from a void initializer"),
                                self.ast.span(stmt),
                            );
                        } else {
                            self.table.symbol_mut(id).ty = inferred;
                        }
                    }
                }
            }
            NodeKind::For { var, from, to, .. } => {
                if let Some(id) = self.table.lookup(self.scope, var) {
                    if self.table.symbol(id).ty.is_error() {
                        let ty = self.type_of(*from).unify_numeric(&self.type_of(*to));
                        self.table.symbol_mut(id).ty = if ty.is_error() { Type::Byte } else { ty };
                    }
                }
            }
            _ => {}
        }
        let mut children = Vec::new();
        self.ast.children(stmt, &mut children);
        for child in children {
            // Expressions are handled by type_of during the main pass.
            if matches!(
                self.ast.kind(child),
                NodeKind::Block { .. }
                    | NodeKind::If { .. }
                    | NodeKind::While { .. }
                    | NodeKind::DoWhile { .. }
                    | NodeKind::For { .. }
                    | NodeKind::Match { .. }
                    | NodeKind::VarDecl { .. }
            ) {
                self.declare_locals(child);
            }
        }
    }

    fn expect_bool(&mut self, cond: NodeId, what: &str) {
        let ty = self.type_of(cond);
        if !matches!(ty, Type::Bool | Type::Error) {
            self.diags.emit(
                DiagnosticCode::TypeMismatch,
                format!("{what} must be `bool`, found `{ty}`"),
                self.ast.span(cond),
            );
        }
    }

    fn check_stmt(&mut self, stmt: NodeId) {
        match self.ast.kind(stmt).clone() {
            NodeKind::Block { stmts } => {
                for s in stmts {
                    self.check_stmt(s);
                }
            }
            NodeKind::VarDecl { name, ty, init, storage, .. } => {
                if storage == StorageClass::Map {
                    // Already rejected at function scope by the symbol pass.
                    return;
                }
                let Some(id) = self.table.symbol_of_decl(stmt) else {
                    return;
                };
                let declared = self.table.symbol(id).ty.clone();
                if let Some(init) = init {
                    let init_ty = self.type_of(init);
                    if ty.is_some() && !init_ty.assignable_to(&declared) {
                        self.diags.emit(
                            DiagnosticCode::TypeMismatch,
                            format!("cannot initialize `{name}: {declared}` from `{init_ty}`"),
                            self.ast.span(init),
                        );
                    }
                }
            }
            NodeKind::If { cond, then_block, else_block } => {
                self.expect_bool(cond, "an `if` condition");
                self.check_stmt(then_block);
                if let Some(else_block) = else_block {
                    self.check_stmt(else_block);
                }
            }
            NodeKind::While { cond, body } => {
                self.expect_bool(cond, "a `while` condition");
                self.loop_depth += 1;
                self.check_stmt(body);
                self.loop_depth -= 1;
            }
            NodeKind::DoWhile { body, cond } => {
                self.loop_depth += 1;
                self.check_stmt(body);
                self.loop_depth -= 1;
                self.expect_bool(cond, "a `do-while` condition");
            }
            NodeKind::For { var, from, to, step, body } => {
                let from_ty = self.type_of(from);
                let to_ty = self.type_of(to);
                for (ty, node) in [(&from_ty, from), (&to_ty, to)] {
                    if !ty.is_numeric() {
                        self.diags.emit(
                            DiagnosticCode::TypeMismatch,
                            format!("`for` bound must be numeric, found `{ty}`"),
                            self.ast.span(node),
                        );
                    }
                }
                if let Some(step) = step {
                    if for_step_value(self.ast, step).is_none() {
                        self.diags.emit(
                            DiagnosticCode::TypeMismatch,
                            "`step` must be an integer literal",
                            self.ast.span(step),
                        );
                    } else {
                        let _ = self.type_of(step);
                    }
                }
                let _ = var;
                self.loop_depth += 1;
                self.check_stmt(body);
                self.loop_depth -= 1;
            }
            NodeKind::Match { subject, cases, default } => {
                let subject_ty = self.type_of(subject);
                if !subject_ty.is_numeric() && !matches!(subject_ty, Type::Bool) {
                    self.diags.emit(
                        DiagnosticCode::TypeMismatch,
                        format!("cannot match on `{subject_ty}`"),
                        self.ast.span(subject),
                    );
                }
                for case in &cases {
                    let case_ty = self.type_of(case.value);
                    if !case_ty.assignable_to(&subject_ty) && !subject_ty.assignable_to(&case_ty) {
                        self.diags.emit(
                            DiagnosticCode::TypeMismatch,
                            format!("case of type `{case_ty}` cannot match `{subject_ty}`"),
                            self.ast.span(case.value),
                        );
                    }
                    match eval_const(self.ast, self.table, self.scope, case.value) {
                        Some(v) => self.analysis.consts.insert(case.value, v),
                        None => self.diags.emit(
                            DiagnosticCode::TypeMismatch,
                            "case value must be a compile-time constant",
                            self.ast.span(case.value),
                        ),
                    }
                    self.check_stmt(case.body);
                }
                if let Some(default) = default {
                    self.check_stmt(default);
                }
            }
            NodeKind::Return { value } => {
                let value_ty = match value {
                    Some(value) => self.type_of(value),
                    None => Type::Void,
                };
                let matches_decl = match (&value_ty, &self.ret) {
                    (Type::Void, Type::Void) => true,
                    (Type::Void, _) | (_, Type::Void) => false,
                    (v, r) => v.assignable_to(r),
                };
                if !matches_decl {
                    self.diags.emit(
                        DiagnosticCode::ReturnTypeMismatch,
                        format!("expected `{}`, found `{value_ty}`", self.ret),
                        self.ast.span(stmt),
                    );
                }
            }
            NodeKind::Break => {
                if self.loop_depth == 0 {
                    self.diags.emit(
                        DiagnosticCode::BreakOutsideLoop,
                        "`break` outside of a loop",
                        self.ast.span(stmt),
                    );
                }
            }
            NodeKind::Continue => {
                if self.loop_depth == 0 {
                    self.diags.emit(
                        DiagnosticCode::ContinueOutsideLoop,
                        "`continue` outside of a loop",
                        self.ast.span(stmt),
                    );
                }
            }
            NodeKind::ExprStmt { expr } => {
                let _ = self.type_of(expr);
            }
            _ => {}
        }
    }

    /// Compute, record and return the type of an expression node.
    fn type_of(&mut self, expr: NodeId) -> Type {
        let ty = self.compute_type(expr);
        self.analysis.types.insert(expr, ty.clone());
        ty
    }

    fn compute_type(&mut self, expr: NodeId) -> Type {
        let span = self.ast.span(expr);
        match self.ast.kind(expr).clone() {
            NodeKind::NumLit { value } => {
                self.analysis.consts.insert(expr, value);
                if value <= u8::MAX as u32 {
                    Type::Byte
                } else if value <= u16::MAX as u32 {
                    Type::Word
                } else {
                    self.diags.emit(
                        DiagnosticCode::TypeMismatch,
                        format!("literal {value} does not fit in a word"),
                        span,
                    );
                    Type::Error
                }
            }
            NodeKind::BoolLit { value } => {
                self.analysis.consts.insert(expr, value as u32);
                Type::Bool
            }
            NodeKind::StrLit { value } => {
                Type::Array(Box::new(Type::Byte), value.len().max(1) as u16)
            }
            NodeKind::ArrayLit { elems } => {
                let Some(&first) = elems.first() else {
                    self.diags.emit(
                        DiagnosticCode::TypeMismatch,
                        "array literal cannot be empty",
                        span,
                    );
                    return Type::Error;
                };
                let elem_ty = self.type_of(first);
                for &elem in &elems[1..] {
                    let ty = self.type_of(elem);
                    if !ty.assignable_to(&elem_ty) {
                        self.diags.emit(
                            DiagnosticCode::TypeMismatch,
                            format!("array element of type `{ty}` in an array of `{elem_ty}`"),
                            self.ast.span(elem),
                        );
                    }
                }
                Type::Array(Box::new(elem_ty), elems.len() as u16)
            }
            NodeKind::Ident { name } => {
                let Some(id) = self.table.lookup(self.scope, &name) else {
                    self.diags.push(
                        Diagnostic::new(
                            DiagnosticCode::UnknownSymbol,
                            format!("unknown name `{name}`"),
                        )
                        .with_span(span),
                    );
                    return Type::Error;
                };
                self.analysis.bindings.insert(expr, id);
                let symbol = self.table.symbol(self.table.resolve_alias(id));
                if matches!(
                    symbol.kind,
                    SymbolKind::Function | SymbolKind::TypeAlias | SymbolKind::Enum
                ) {
                    self.diags.emit(
                        DiagnosticCode::TypeMismatch,
                        format!("`{name}` is not a value"),
                        span,
                    );
                    return Type::Error;
                }
                // A `const` with a constant initializer folds to an
                // immediate at every use site.
                if symbol.constant && symbol.kind == SymbolKind::Variable {
                    if let Some(v) = eval_const(self.ast, self.table, self.scope, expr) {
                        self.analysis.consts.insert(expr, v);
                    }
                }
                symbol.ty.clone()
            }
            NodeKind::Member { base, member } => {
                let qualified = format!("{base}.{member}");
                let Some(id) = self.table.lookup(self.scope, &qualified) else {
                    self.diags.emit(
                        DiagnosticCode::UnknownSymbol,
                        format!("unknown enum member `{qualified}`"),
                        span,
                    );
                    return Type::Error;
                };
                self.analysis.bindings.insert(expr, id);
                if let Some(v) = self.table.symbol(id).enum_value {
                    self.analysis.consts.insert(expr, v as u32);
                }
                self.table.symbol(id).ty.clone()
            }
            NodeKind::Unary { op, operand } => {
                let ty = self.type_of(operand);
                match op {
                    UnaryOp::Not => {
                        if !matches!(ty, Type::Bool | Type::Error) {
                            self.diags.emit(
                                DiagnosticCode::TypeMismatch,
                                format!("`!` needs `bool`, found `{ty}`"),
                                span,
                            );
                        }
                        Type::Bool
                    }
                    UnaryOp::Neg | UnaryOp::Pos | UnaryOp::BitNot => {
                        if !ty.is_numeric() {
                            self.diags.emit(
                                DiagnosticCode::TypeMismatch,
                                format!("unary operator needs a numeric operand, found `{ty}`"),
                                span,
                            );
                            return Type::Error;
                        }
                        ty
                    }
                }
            }
            NodeKind::Binary { op, lhs, rhs } => {
                let lhs_ty = self.type_of(lhs);
                let rhs_ty = self.type_of(rhs);
                if op.is_logical() {
                    for (ty, node) in [(&lhs_ty, lhs), (&rhs_ty, rhs)] {
                        if !matches!(ty, Type::Bool | Type::Error) {
                            self.diags.emit(
                                DiagnosticCode::TypeMismatch,
                                format!("logical operator needs `bool`, found `{ty}`"),
                                self.ast.span(node),
                            );
                        }
                    }
                    return Type::Bool;
                }
                if op.is_comparison() {
                    let comparable = (lhs_ty.is_numeric() && rhs_ty.is_numeric())
                        || (lhs_ty == Type::Bool && rhs_ty == Type::Bool)
                        || lhs_ty.is_error()
                        || rhs_ty.is_error();
                    if !comparable {
                        self.diags.emit(
                            DiagnosticCode::TypeMismatch,
                            format!("cannot compare `{lhs_ty}` with `{rhs_ty}`"),
                            span,
                        );
                    }
                    return Type::Bool;
                }
                for (ty, node) in [(&lhs_ty, lhs), (&rhs_ty, rhs)] {
                    if !ty.is_numeric() {
                        self.diags.emit(
                            DiagnosticCode::TypeMismatch,
                            format!("arithmetic needs numeric operands, found `{ty}`"),
                            self.ast.span(node),
                        );
                        return Type::Error;
                    }
                }
                lhs_ty.unify_numeric(&rhs_ty)
            }
            NodeKind::Assign { op, target, value } => {
                self.check_assign_target(target);
                let target_ty = self.type_of(target);
                let value_ty = self.type_of(value);
                if matches!(target_ty, Type::Array(..)) {
                    self.diags.emit(
                        DiagnosticCode::TypeMismatch,
                        "arrays cannot be assigned as a whole",
                        span,
                    );
                    return Type::Error;
                }
                if let Some(op) = op {
                    if !op.is_logical() && !value_ty.is_numeric() && !value_ty.is_error() {
                        self.diags.emit(
                            DiagnosticCode::TypeMismatch,
                            format!("compound assignment needs a numeric value, found `{value_ty}`"),
                            self.ast.span(value),
                        );
                    }
                }
                if !value_ty.assignable_to(&target_ty) {
                    self.diags.emit(
                        DiagnosticCode::TypeMismatch,
                        format!("cannot assign `{value_ty}` to `{target_ty}`"),
                        span,
                    );
                }
                target_ty
            }
            NodeKind::Call { callee, args } => self.check_call(expr, callee, &args, span),
            NodeKind::Index { base, index } => {
                let base_ty = self.type_of(base);
                let index_ty = self.type_of(index);
                if !index_ty.is_numeric() {
                    self.diags.emit(
                        DiagnosticCode::TypeMismatch,
                        format!("array index must be numeric, found `{index_ty}`"),
                        self.ast.span(index),
                    );
                }
                match base_ty {
                    Type::Array(elem, _) => *elem,
                    Type::Error => Type::Error,
                    other => {
                        self.diags.emit(
                            DiagnosticCode::TypeMismatch,
                            format!("cannot index into `{other}`"),
                            self.ast.span(base),
                        );
                        Type::Error
                    }
                }
            }
            _ => Type::Error,
        }
    }

    /// Reject writes to `const`/`@data` targets and non-lvalue expressions.
    fn check_assign_target(&mut self, target: NodeId) {
        match self.ast.kind(target) {
            NodeKind::Ident { name } => {
                if let Some(id) = self.table.lookup(self.scope, name) {
                    let symbol = self.table.symbol(self.table.resolve_alias(id));
                    if symbol.constant {
                        let what = if symbol.storage == StorageClass::Data {
                            "`@data` variable"
                        } else {
                            "`const`"
                        };
                        self.diags.push(
                            Diagnostic::new(
                                DiagnosticCode::ImmutableWrite,
                                format!("cannot assign to {what} `{name}`"),
                            )
                            .with_span(self.ast.span(target))
                            .with_related(symbol.span, "declared here"),
                        );
                    }
                }
            }
            NodeKind::Index { base, .. } => self.check_assign_target(*base),
            _ => self.diags.emit(
                DiagnosticCode::TypeMismatch,
                "assignment target must be a variable or array element",
                self.ast.span(target),
            ),
        }
    }

    fn check_call(
        &mut self,
        expr: NodeId,
        callee: NodeId,
        args: &[NodeId],
        span: blend_types::Span,
    ) -> Type {
        let NodeKind::Ident { name } = self.ast.kind(callee).clone() else {
            self.diags.emit(
                DiagnosticCode::TypeMismatch,
                "callee must be a function name",
                self.ast.span(callee),
            );
            return Type::Error;
        };

        if let Some(intrinsic) = Intrinsic::from_name(&name) {
            return self.check_intrinsic(expr, intrinsic, args, span);
        }

        let Some(id) = self.table.lookup(self.scope, &name) else {
            self.diags.emit(
                DiagnosticCode::UnknownSymbol,
                format!("unknown function `{name}`"),
                span,
            );
            return Type::Error;
        };
        let resolved = self.table.resolve_alias(id);
        if self.table.symbol(resolved).kind != SymbolKind::Function {
            self.diags.emit(
                DiagnosticCode::TypeMismatch,
                format!("`{name}` is not a function"),
                span,
            );
            return Type::Error;
        }
        self.analysis.bindings.insert(callee, resolved);

        let Some(func_id) = self.funcs.by_decl(self.table.symbol(resolved).decl) else {
            return Type::Error;
        };
        let info = self.funcs.get(func_id);
        let params = info.params.clone();
        let ret = info.ret.clone();
        let qualified = info.qualified.clone();
        if args.len() != params.len() {
            self.diags.emit(
                DiagnosticCode::ArityMismatch,
                format!(
                    "`{qualified}` takes {} argument(s), {} supplied",
                    params.len(),
                    args.len()
                ),
                span,
            );
        }
        for (&arg, &param) in args.iter().zip(&params) {
            let arg_ty = self.type_of(arg);
            let param_ty = self.table.symbol(param).ty.clone();
            if !arg_ty.assignable_to(&param_ty) {
                let param_name = self.table.symbol(param).name.clone();
                self.diags.emit(
                    DiagnosticCode::TypeMismatch,
                    format!(
                        "argument `{param_name}` of `{qualified}` expects `{param_ty}`, found `{arg_ty}`"
                    ),
                    self.ast.span(arg),
                );
            }
        }
        // Extra arguments still get typed for downstream diagnostics.
        for &arg in args.iter().skip(params.len()) {
            let _ = self.type_of(arg);
        }
        ret
    }

    fn check_intrinsic(
        &mut self,
        expr: NodeId,
        intrinsic: Intrinsic,
        args: &[NodeId],
        span: blend_types::Span,
    ) -> Type {
        if args.len() != intrinsic.arity() {
            self.diags.emit(
                DiagnosticCode::ArityMismatch,
                format!(
                    "intrinsic takes {} argument(s), {} supplied",
                    intrinsic.arity(),
                    args.len()
                ),
                span,
            );
            for &arg in args {
                let _ = self.type_of(arg);
            }
            return Type::Error;
        }
        match intrinsic {
            Intrinsic::Peek | Intrinsic::Peekw => {
                self.expect_address(args[0]);
                if intrinsic == Intrinsic::Peek {
                    Type::Byte
                } else {
                    Type::Word
                }
            }
            Intrinsic::Poke | Intrinsic::Pokew => {
                self.expect_address(args[0]);
                let value_ty = self.type_of(args[1]);
                let expected = if intrinsic == Intrinsic::Poke {
                    Type::Byte
                } else {
                    Type::Word
                };
                if !value_ty.assignable_to(&expected) {
                    self.diags.emit(
                        DiagnosticCode::TypeMismatch,
                        format!("poke value must be `{expected}`, found `{value_ty}`"),
                        self.ast.span(args[1]),
                    );
                }
                Type::Void
            }
            Intrinsic::Hi | Intrinsic::Lo => {
                let ty = self.type_of(args[0]);
                if !ty.is_numeric() {
                    self.diags.emit(
                        DiagnosticCode::TypeMismatch,
                        format!("`hi`/`lo` need a numeric operand, found `{ty}`"),
                        self.ast.span(args[0]),
                    );
                }
                Type::Byte
            }
            Intrinsic::Len => {
                let ty = self.type_of(args[0]);
                match ty {
                    Type::Array(_, len) => {
                        self.analysis.consts.insert(expr, len as u32);
                        Type::Word
                    }
                    Type::Error => Type::Error,
                    other => {
                        self.diags.emit(
                            DiagnosticCode::TypeMismatch,
                            format!("`len` needs an array, found `{other}`"),
                            self.ast.span(args[0]),
                        );
                        Type::Error
                    }
                }
            }
            Intrinsic::Sizeof => {
                // The argument is a type name in expression position.
                let ty = match self.ast.kind(args[0]) {
                    NodeKind::Ident { name } => match name.as_str() {
                        "bool" => Type::Bool,
                        "byte" => Type::Byte,
                        "word" => Type::Word,
                        _ => match self.table.lookup(self.scope, name) {
                            Some(id)
                                if matches!(
                                    self.table.symbol(id).kind,
                                    SymbolKind::TypeAlias | SymbolKind::Enum
                                ) =>
                            {
                                self.table.symbol(id).ty.clone()
                            }
                            Some(id) => self.table.symbol(id).ty.clone(),
                            None => {
                                self.diags.emit(
                                    DiagnosticCode::UnknownSymbol,
                                    format!("unknown type `{name}` in `sizeof`"),
                                    self.ast.span(args[0]),
                                );
                                Type::Error
                            }
                        },
                    },
                    _ => {
                        self.diags.emit(
                            DiagnosticCode::TypeMismatch,
                            "`sizeof` needs a type or variable name",
                            self.ast.span(args[0]),
                        );
                        Type::Error
                    }
                };
                if !ty.is_error() {
                    self.analysis.consts.insert(expr, ty.size() as u32);
                }
                Type::Word
            }
        }
    }

    /// Peek/poke addresses are `word`-compatible expressions.
    fn expect_address(&mut self, arg: NodeId) {
        let ty = self.type_of(arg);
        if !ty.assignable_to(&Type::Word) {
            self.diags.emit(
                DiagnosticCode::TypeMismatch,
                format!("address must be a `word`, found `{ty}`"),
                self.ast.span(arg),
            );
        }
    }
}

/// The signed step of a `for` loop: the literal's magnitude and direction.
pub fn for_step_value(ast: &Ast, step: NodeId) -> Option<(u16, bool)> {
    match ast.kind(step) {
        NodeKind::NumLit { value } if *value <= u16::MAX as u32 => Some((*value as u16, false)),
        NodeKind::Unary { op: UnaryOp::Neg, operand } => match ast.kind(*operand) {
            NodeKind::NumLit { value } if *value <= u16::MAX as u32 => {
                Some((*value as u16, true))
            }
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{funcs, lexer, parser, symtab};

    struct Checked {
        diags: Diagnostics,
    }

    fn check_source(source: &str) -> Checked {
        let mut diags = Diagnostics::new();
        let tokens = lexer::lex(0, source, &mut diags);
        let mut ast = Ast::new();
        let root = parser::parse_unit(&mut ast, tokens, "Main", &mut diags);
        let mut table = symtab::build(&ast, &[root], &mut diags);
        let mut registry = funcs::collect(&ast, &[root], &table);
        resolve(&ast, &[root], &mut table, &mut registry, &mut diags);
        let mut analysis = Analysis::new();
        check(&ast, &[root], &mut table, &registry, &mut analysis, &mut diags);
        Checked { diags }
    }

    fn assert_clean(source: &str) {
        let checked = check_source(source);
        assert!(
            !checked.diags.has_errors(),
            "unexpected errors: {:?}",
            checked
                .diags
                .items()
                .iter()
                .filter(|d| d.severity == crate::diagnostics::Severity::Error)
                .collect::<Vec<_>>()
        );
    }

    fn assert_code(source: &str, code: DiagnosticCode) {
        let checked = check_source(source);
        assert!(
            checked.diags.contains(code),
            "expected {code}, got {:?}",
            checked.diags.items()
        );
    }

    #[test]
    fn widening_and_arithmetic() {
        assert_clean(
            "module M;\nfunction f(): word {\n  let b: byte = 10;\n  let w: word = b;\n  return w + b;\n}",
        );
    }

    #[test]
    fn narrowing_is_rejected() {
        assert_code(
            "module M;\nfunction f(): void {\n  let w: word = 300;\n  let b: byte = w;\n}",
            DiagnosticCode::TypeMismatch,
        );
    }

    #[test]
    fn bool_byte_conversion_is_explicit() {
        assert_code(
            "module M;\nfunction f(): void {\n  let b: byte = true;\n}",
            DiagnosticCode::TypeMismatch,
        );
    }

    #[test]
    fn condition_must_be_bool() {
        assert_code(
            "module M;\nfunction f(): void {\n  let x: byte = 1;\n  if (x) { }\n}",
            DiagnosticCode::TypeMismatch,
        );
        assert_clean(
            "module M;\nfunction f(): void {\n  let x: byte = 1;\n  if (x > 0) { }\n}",
        );
    }

    #[test]
    fn arity_and_argument_types() {
        assert_code(
            "module M;\nfunction g(a: byte): void { }\nfunction f(): void { g(); }",
            DiagnosticCode::ArityMismatch,
        );
        assert_code(
            "module M;\nfunction g(a: byte): void { }\nfunction f(): void { let w: word = 300; g(w); }",
            DiagnosticCode::TypeMismatch,
        );
        assert_clean("module M;\nfunction g(a: word): void { }\nfunction f(): void { g(5); }");
    }

    #[test]
    fn return_checking() {
        assert_code(
            "module M;\nfunction f(): byte { return true; }",
            DiagnosticCode::ReturnTypeMismatch,
        );
        assert_code(
            "module M;\nfunction f(): byte { let x: byte = 1; }",
            DiagnosticCode::ReturnMissing,
        );
        assert_clean(
            "module M;\nfunction f(a: bool): byte { if (a) { return 1; } else { return 2; } }",
        );
    }

    #[test]
    fn const_writes_are_rejected() {
        assert_code(
            "module M;\nfunction f(): void { const c: byte = 1; c = 2; }",
            DiagnosticCode::ImmutableWrite,
        );
        assert_code(
            "module M;\n@data const t: byte = 3;\nfunction f(): void { t = 2; }",
            DiagnosticCode::ImmutableWrite,
        );
    }

    #[test]
    fn break_outside_loop() {
        assert_code(
            "module M;\nfunction f(): void { break; }",
            DiagnosticCode::BreakOutsideLoop,
        );
        assert_clean("module M;\nfunction f(): void { while (true) { break; } }");
    }

    #[test]
    fn intrinsics_have_fixed_signatures() {
        assert_clean(
            "module M;\nfunction f(): void {\n  let x: byte = peek($D020);\n  poke($D020, x);\n  let w: word = peekw($C000);\n  let h: byte = hi(w);\n}",
        );
        assert_code(
            "module M;\nfunction f(): void { poke($D020); }",
            DiagnosticCode::ArityMismatch,
        );
    }

    #[test]
    fn len_and_sizeof_fold() {
        assert_clean(
            "module M;\nlet buf: byte[16] = [0];\nfunction f(): word { return len(buf) + sizeof(word); }",
        );
    }

    #[test]
    fn enum_members_type_and_fold() {
        assert_clean(
            "module M;\nenum Color { Red, Green, Blue }\nfunction f(): void {\n  let c: Color = Color.Green;\n  match (c) { case Color.Red: poke($D020, 0); default: { } }\n}",
        );
    }

    #[test]
    fn map_address_range_checked() {
        assert_code(
            "module M;\n@map B at $10000: byte;",
            DiagnosticCode::AddressOutOfRange,
        );
        assert_code(
            "module M;\n@map S from $0400 to $0401: byte[16];",
            DiagnosticCode::AddressOutOfRange,
        );
        assert_clean("module M;\n@map S from $0400 to $07E7: byte[1000];");
    }

    #[test]
    fn unknown_symbol_is_reported_once_per_use() {
        let checked = check_source("module M;\nfunction f(): void { ghost = 1; }");
        assert!(checked.diags.contains(DiagnosticCode::UnknownSymbol));
    }

    #[test]
    fn array_indexing_types() {
        assert_clean(
            "module M;\nlet buf: byte[8] = [1, 2, 3, 4, 5, 6, 7, 8];\nfunction f(i: byte): byte { return buf[i]; }",
        );
        assert_code(
            "module M;\nfunction f(x: byte): byte { return x[0]; }",
            DiagnosticCode::TypeMismatch,
        );
    }
}
