//! Recursive-descent parser producing the arena AST.
//!
//! Declarations and statements are parsed by dedicated methods; expressions
//! use Pratt precedence climbing. Parse errors become `SyntaxError`
//! diagnostics and the parser resynchronizes at the next `;` or block
//! delimiter so several independent errors surface per run.

use crate::ast::{Ast, BinOp, ImportItem, MapRange, MatchCase, NodeKind, UnaryOp};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::token::{Token, TokenKind};
use blend_types::{NodeId, Span, StorageClass, Width};

/// Parse one unit's tokens into the shared arena, returning the unit root.
///
/// `default_module` names units that carry no `module` declaration; doing so
/// emits an `ImplicitModule` warning.
pub fn parse_unit(
    ast: &mut Ast,
    tokens: Vec<Token>,
    default_module: &str,
    diags: &mut Diagnostics,
) -> NodeId {
    Parser {
        ast,
        tokens,
        pos: 0,
        diags,
    }
    .unit(default_module)
}

struct Parser<'a> {
    ast: &'a mut Ast,
    tokens: Vec<Token>,
    pos: usize,
    diags: &'a mut Diagnostics,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span
    }

    fn prev_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)].span
    }

    fn bump(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos.min(self.tokens.len() - 1)].kind.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> bool {
        if self.eat(kind) {
            true
        } else {
            self.error(format!("expected {what}, found {}", self.peek()));
            false
        }
    }

    fn error(&mut self, message: String) {
        self.diags.emit(DiagnosticCode::SyntaxError, message, self.span());
    }

    /// Skip ahead to the next statement boundary.
    fn synchronize(&mut self) {
        loop {
            match self.peek() {
                TokenKind::Semi => {
                    self.bump();
                    return;
                }
                TokenKind::RBrace | TokenKind::Eof => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn ident(&mut self, what: &str) -> Option<String> {
        match self.peek() {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.bump();
                Some(name)
            }
            _ => {
                self.error(format!("expected {what}, found {}", self.peek()));
                None
            }
        }
    }

    /// Dotted module path `M.N.P`.
    fn module_path(&mut self) -> Option<String> {
        let mut path = self.ident("a module name")?;
        while self.eat(&TokenKind::Dot) {
            path.push('.');
            path.push_str(&self.ident("a module path segment")?);
        }
        Some(path)
    }

    // ── Declarations ─────────────────────────────────────────────────────

    fn unit(mut self, default_module: &str) -> NodeId {
        let unit_span = self.span();
        let (name, explicit_module) = if self.eat(&TokenKind::Module) {
            let name = self.module_path().unwrap_or_else(|| default_module.to_owned());
            self.expect(&TokenKind::Semi, "`;` after module declaration");
            (name, true)
        } else {
            self.diags.push(
                Diagnostic::new(
                    DiagnosticCode::ImplicitModule,
                    format!("unit has no `module` declaration; defaulting to `{default_module}`"),
                )
                .with_span(unit_span)
                .with_suggestion(format!("add `module {default_module};` at the top")),
            );
            (default_module.to_owned(), false)
        };

        let mut items = Vec::new();
        while !self.at(&TokenKind::Eof) {
            match self.item() {
                Some(item) => items.push(item),
                None => {
                    self.synchronize();
                    // A stray `}` at top level would stall recovery.
                    if self.at(&TokenKind::RBrace) {
                        self.bump();
                    }
                }
            }
        }
        let span = unit_span.to(self.prev_span());
        self.ast.push(
            NodeKind::Unit {
                name,
                explicit_module,
                items,
            },
            span,
        )
    }

    fn item(&mut self) -> Option<NodeId> {
        let start = self.span();
        match self.peek().clone() {
            TokenKind::Import => self.import(start),
            TokenKind::Export => {
                self.bump();
                match self.peek() {
                    TokenKind::Function => self.function(start, true, false),
                    TokenKind::Callback => {
                        self.bump();
                        self.function(start, true, true)
                    }
                    TokenKind::Let | TokenKind::Const | TokenKind::Annotation(_) => {
                        self.var_decl(start, true)
                    }
                    _ => {
                        self.error(format!(
                            "expected a declaration after `export`, found {}",
                            self.peek()
                        ));
                        None
                    }
                }
            }
            TokenKind::Callback => {
                self.bump();
                self.function(start, false, true)
            }
            TokenKind::Function => self.function(start, false, false),
            TokenKind::Type => self.type_alias(start),
            TokenKind::Enum => self.enum_decl(start),
            TokenKind::Let | TokenKind::Const | TokenKind::Annotation(_) => {
                self.var_decl(start, false)
            }
            other => {
                self.error(format!("expected a declaration, found {other}"));
                None
            }
        }
    }

    fn import(&mut self, start: Span) -> Option<NodeId> {
        self.bump();
        self.expect(&TokenKind::LBrace, "`{` after `import`");
        let mut names = Vec::new();
        loop {
            let name = self.ident("an imported name")?;
            let alias = if self.eat(&TokenKind::As) {
                Some(self.ident("an import alias")?)
            } else {
                None
            };
            names.push(ImportItem { name, alias });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "`}` after import list");
        self.expect(&TokenKind::From, "`from` in import");
        let module = self.module_path()?;
        self.expect(&TokenKind::Semi, "`;` after import");
        let span = start.to(self.prev_span());
        Some(self.ast.push(NodeKind::Import { names, module }, span))
    }

    fn function(&mut self, start: Span, is_export: bool, is_callback: bool) -> Option<NodeId> {
        self.expect(&TokenKind::Function, "`function`");
        let name = self.ident("a function name")?;
        self.expect(&TokenKind::LParen, "`(` after function name");
        let mut params = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                let p_start = self.span();
                let p_name = self.ident("a parameter name")?;
                self.expect(&TokenKind::Colon, "`:` after parameter name");
                let ty = self.type_expr()?;
                let span = p_start.to(self.prev_span());
                params.push(self.ast.push(NodeKind::Param { name: p_name, ty }, span));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "`)` after parameters");
        let ret = if self.eat(&TokenKind::Colon) {
            let ty = self.type_expr()?;
            // `: void` is spelled out but means the same as no annotation.
            match self.ast.kind(ty) {
                NodeKind::TypeName { name } if name == "void" => None,
                _ => Some(ty),
            }
        } else {
            None
        };
        let body = self.block()?;
        let span = start.to(self.prev_span());
        Some(self.ast.push(
            NodeKind::Function {
                name,
                is_export,
                is_callback,
                params,
                ret,
                body,
            },
            span,
        ))
    }

    fn type_alias(&mut self, start: Span) -> Option<NodeId> {
        self.bump();
        let name = self.ident("a type alias name")?;
        self.expect(&TokenKind::Assign, "`=` in type alias");
        let ty = self.type_expr()?;
        self.expect(&TokenKind::Semi, "`;` after type alias");
        let span = start.to(self.prev_span());
        Some(self.ast.push(NodeKind::TypeAlias { name, ty }, span))
    }

    fn enum_decl(&mut self, start: Span) -> Option<NodeId> {
        self.bump();
        let name = self.ident("an enum name")?;
        let repr = if self.eat(&TokenKind::Colon) {
            match self.ident("an enum representation")?.as_str() {
                "word" => Width::Word,
                "byte" => Width::Byte,
                other => {
                    self.error(format!("enum representation must be `byte` or `word`, found `{other}`"));
                    Width::Byte
                }
            }
        } else {
            Width::Byte
        };
        self.expect(&TokenKind::LBrace, "`{` after enum name");
        let mut members = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            let member = self.ident("an enum member")?;
            let value = if self.eat(&TokenKind::Assign) {
                Some(self.expression()?)
            } else {
                None
            };
            members.push((member, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "`}` after enum members");
        let span = start.to(self.prev_span());
        Some(self.ast.push(NodeKind::EnumDecl { name, repr, members }, span))
    }

    /// `let` / `const` / annotated variable declarations, including `@map`.
    fn var_decl(&mut self, start: Span, is_export: bool) -> Option<NodeId> {
        let storage = match self.peek().clone() {
            TokenKind::Annotation(name) => {
                self.bump();
                match name.as_str() {
                    "zp" => StorageClass::Zp,
                    "ram" => StorageClass::Ram,
                    "data" => StorageClass::Data,
                    "map" => StorageClass::Map,
                    other => {
                        self.error(format!("unknown storage class `@{other}`"));
                        StorageClass::Auto
                    }
                }
            }
            _ => StorageClass::Auto,
        };

        if storage == StorageClass::Map {
            return self.map_decl(start, is_export);
        }

        let constant = match self.bump() {
            TokenKind::Let => false,
            TokenKind::Const => true,
            other => {
                self.error(format!("expected `let` or `const`, found {other}"));
                return None;
            }
        };
        let name = self.ident("a variable name")?;
        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.type_expr()?)
        } else {
            None
        };
        let init = if self.eat(&TokenKind::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect(&TokenKind::Semi, "`;` after variable declaration");
        let span = start.to(self.prev_span());
        Some(self.ast.push(
            NodeKind::VarDecl {
                name,
                constant,
                is_export,
                storage,
                ty,
                init,
                map: None,
            },
            span,
        ))
    }

    /// `@map NAME at <addr>: T;` or `@map NAME from <lo> to <hi>: T[N];`
    fn map_decl(&mut self, start: Span, is_export: bool) -> Option<NodeId> {
        let name = self.ident("a map variable name")?;
        let map = if self.eat(&TokenKind::At) {
            MapRange {
                lo: self.expression()?,
                hi: None,
            }
        } else if self.eat(&TokenKind::From) {
            let lo = self.expression()?;
            self.expect(&TokenKind::To, "`to` in map range");
            let hi = self.expression()?;
            MapRange { lo, hi: Some(hi) }
        } else {
            self.error(format!("expected `at` or `from` in @map, found {}", self.peek()));
            return None;
        };
        self.expect(&TokenKind::Colon, "`:` before map type");
        let ty = self.type_expr()?;
        self.expect(&TokenKind::Semi, "`;` after map declaration");
        let span = start.to(self.prev_span());
        Some(self.ast.push(
            NodeKind::VarDecl {
                name,
                constant: false,
                is_export,
                storage: StorageClass::Map,
                ty: Some(ty),
                init: None,
                map: Some(map),
            },
            span,
        ))
    }

    fn type_expr(&mut self) -> Option<NodeId> {
        let start = self.span();
        let name = self.ident("a type name")?;
        let mut ty = self
            .ast
            .push(NodeKind::TypeName { name }, start.to(self.prev_span()));
        while self.eat(&TokenKind::LBracket) {
            let len = self.expression()?;
            self.expect(&TokenKind::RBracket, "`]` after array length");
            let span = start.to(self.prev_span());
            ty = self.ast.push(NodeKind::TypeArray { elem: ty, len }, span);
        }
        Some(ty)
    }

    // ── Statements ───────────────────────────────────────────────────────

    fn block(&mut self) -> Option<NodeId> {
        let start = self.span();
        if !self.expect(&TokenKind::LBrace, "`{`") {
            return None;
        }
        let mut stmts = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            match self.statement() {
                Some(stmt) => stmts.push(stmt),
                None => self.synchronize(),
            }
        }
        self.expect(&TokenKind::RBrace, "`}` to close block");
        let span = start.to(self.prev_span());
        Some(self.ast.push(NodeKind::Block { stmts }, span))
    }

    fn statement(&mut self) -> Option<NodeId> {
        let start = self.span();
        match self.peek().clone() {
            TokenKind::LBrace => self.block(),
            TokenKind::Let | TokenKind::Const | TokenKind::Annotation(_) => {
                self.var_decl(start, false)
            }
            TokenKind::If => self.if_stmt(start),
            TokenKind::While => {
                self.bump();
                self.expect(&TokenKind::LParen, "`(` after `while`");
                let cond = self.expression()?;
                self.expect(&TokenKind::RParen, "`)` after condition");
                let body = self.block()?;
                let span = start.to(self.prev_span());
                Some(self.ast.push(NodeKind::While { cond, body }, span))
            }
            TokenKind::Do => {
                self.bump();
                let body = self.block()?;
                self.expect(&TokenKind::While, "`while` after do-block");
                self.expect(&TokenKind::LParen, "`(` after `while`");
                let cond = self.expression()?;
                self.expect(&TokenKind::RParen, "`)` after condition");
                self.expect(&TokenKind::Semi, "`;` after do-while");
                let span = start.to(self.prev_span());
                Some(self.ast.push(NodeKind::DoWhile { body, cond }, span))
            }
            TokenKind::For => self.for_stmt(start),
            TokenKind::Match => self.match_stmt(start),
            TokenKind::Return => {
                self.bump();
                let value = if self.at(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect(&TokenKind::Semi, "`;` after return");
                let span = start.to(self.prev_span());
                Some(self.ast.push(NodeKind::Return { value }, span))
            }
            TokenKind::Break => {
                self.bump();
                self.expect(&TokenKind::Semi, "`;` after `break`");
                Some(self.ast.push(NodeKind::Break, start))
            }
            TokenKind::Continue => {
                self.bump();
                self.expect(&TokenKind::Semi, "`;` after `continue`");
                Some(self.ast.push(NodeKind::Continue, start))
            }
            _ => {
                let expr = self.expression()?;
                self.expect(&TokenKind::Semi, "`;` after expression");
                let span = start.to(self.prev_span());
                Some(self.ast.push(NodeKind::ExprStmt { expr }, span))
            }
        }
    }

    fn if_stmt(&mut self, start: Span) -> Option<NodeId> {
        self.bump();
        self.expect(&TokenKind::LParen, "`(` after `if`");
        let cond = self.expression()?;
        self.expect(&TokenKind::RParen, "`)` after condition");
        let then_block = self.block()?;
        let else_block = if self.eat(&TokenKind::Else) {
            if self.at(&TokenKind::If) {
                let nested = self.span();
                Some(self.if_stmt(nested)?)
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        let span = start.to(self.prev_span());
        Some(self.ast.push(
            NodeKind::If {
                cond,
                then_block,
                else_block,
            },
            span,
        ))
    }

    fn for_stmt(&mut self, start: Span) -> Option<NodeId> {
        self.bump();
        let var = self.ident("a loop variable")?;
        self.expect(&TokenKind::From, "`from` in for loop");
        let from = self.expression()?;
        self.expect(&TokenKind::To, "`to` in for loop");
        let to = self.expression()?;
        let step = if self.eat(&TokenKind::Step) {
            Some(self.expression()?)
        } else {
            None
        };
        let body = self.block()?;
        let span = start.to(self.prev_span());
        Some(self.ast.push(
            NodeKind::For {
                var,
                from,
                to,
                step,
                body,
            },
            span,
        ))
    }

    fn match_stmt(&mut self, start: Span) -> Option<NodeId> {
        self.bump();
        self.expect(&TokenKind::LParen, "`(` after `match`");
        let subject = self.expression()?;
        self.expect(&TokenKind::RParen, "`)` after match subject");
        self.expect(&TokenKind::LBrace, "`{` to open match body");
        let mut cases = Vec::new();
        let mut default = None;
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            if self.eat(&TokenKind::Case) {
                let value = self.expression()?;
                self.expect(&TokenKind::Colon, "`:` after case value");
                let body = self.case_body()?;
                cases.push(MatchCase { value, body });
            } else if self.eat(&TokenKind::Default) {
                self.expect(&TokenKind::Colon, "`:` after `default`");
                let body = self.case_body()?;
                if default.replace(body).is_some() {
                    self.error("duplicate `default` arm".to_owned());
                }
            } else {
                self.error(format!("expected `case` or `default`, found {}", self.peek()));
                self.synchronize();
            }
        }
        self.expect(&TokenKind::RBrace, "`}` to close match");
        let span = start.to(self.prev_span());
        Some(self.ast.push(
            NodeKind::Match {
                subject,
                cases,
                default,
            },
            span,
        ))
    }

    /// A case arm: a braced block, or bare statements up to the next arm.
    fn case_body(&mut self) -> Option<NodeId> {
        if self.at(&TokenKind::LBrace) {
            return self.block();
        }
        let start = self.span();
        let mut stmts = Vec::new();
        while !matches!(
            self.peek(),
            TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
        ) {
            match self.statement() {
                Some(stmt) => stmts.push(stmt),
                None => self.synchronize(),
            }
        }
        let span = start.to(self.prev_span());
        Some(self.ast.push(NodeKind::Block { stmts }, span))
    }

    // ── Expressions (Pratt) ──────────────────────────────────────────────

    fn expression(&mut self) -> Option<NodeId> {
        self.assignment()
    }

    fn assignment(&mut self) -> Option<NodeId> {
        let start = self.span();
        let target = self.binary_expr(0)?;
        let op = match self.peek() {
            TokenKind::Assign => None,
            TokenKind::PlusEq => Some(BinOp::Add),
            TokenKind::MinusEq => Some(BinOp::Sub),
            TokenKind::StarEq => Some(BinOp::Mul),
            TokenKind::SlashEq => Some(BinOp::Div),
            TokenKind::PercentEq => Some(BinOp::Mod),
            TokenKind::AmpEq => Some(BinOp::BitAnd),
            TokenKind::PipeEq => Some(BinOp::BitOr),
            TokenKind::CaretEq => Some(BinOp::BitXor),
            TokenKind::ShlEq => Some(BinOp::Shl),
            TokenKind::ShrEq => Some(BinOp::Shr),
            _ => return Some(target),
        };
        self.bump();
        let value = self.assignment()?;
        let span = start.to(self.prev_span());
        Some(self.ast.push(NodeKind::Assign { op, target, value }, span))
    }

    /// Binding power of an infix operator, `None` when `kind` is not one.
    fn infix_power(kind: &TokenKind) -> Option<(u8, BinOp)> {
        use TokenKind::*;
        Some(match kind {
            OrOr => (1, BinOp::LogicalOr),
            AndAnd => (2, BinOp::LogicalAnd),
            Pipe => (3, BinOp::BitOr),
            Caret => (4, BinOp::BitXor),
            Amp => (5, BinOp::BitAnd),
            EqEq => (6, BinOp::Eq),
            Ne => (6, BinOp::Ne),
            Lt => (7, BinOp::Lt),
            Le => (7, BinOp::Le),
            Gt => (7, BinOp::Gt),
            Ge => (7, BinOp::Ge),
            Shl => (8, BinOp::Shl),
            Shr => (8, BinOp::Shr),
            Plus => (9, BinOp::Add),
            Minus => (9, BinOp::Sub),
            Star => (10, BinOp::Mul),
            Slash => (10, BinOp::Div),
            Percent => (10, BinOp::Mod),
            _ => return None,
        })
    }

    fn binary_expr(&mut self, min_power: u8) -> Option<NodeId> {
        let start = self.span();
        let mut lhs = self.unary_expr()?;
        while let Some((power, op)) = Self::infix_power(self.peek()) {
            if power < min_power {
                break;
            }
            self.bump();
            let rhs = self.binary_expr(power + 1)?;
            let span = start.to(self.prev_span());
            lhs = self.ast.push(NodeKind::Binary { op, lhs, rhs }, span);
        }
        Some(lhs)
    }

    fn unary_expr(&mut self) -> Option<NodeId> {
        let start = self.span();
        let op = match self.peek() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Pos),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Bang => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.unary_expr()?;
            let span = start.to(self.prev_span());
            return Some(self.ast.push(NodeKind::Unary { op, operand }, span));
        }
        self.postfix_expr()
    }

    fn postfix_expr(&mut self) -> Option<NodeId> {
        let start = self.span();
        let mut expr = self.primary_expr()?;
        loop {
            if self.eat(&TokenKind::LParen) {
                let mut args = Vec::new();
                if !self.at(&TokenKind::RParen) {
                    loop {
                        args.push(self.expression()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RParen, "`)` after arguments");
                let span = start.to(self.prev_span());
                expr = self.ast.push(NodeKind::Call { callee: expr, args }, span);
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.expression()?;
                self.expect(&TokenKind::RBracket, "`]` after index");
                let span = start.to(self.prev_span());
                expr = self.ast.push(NodeKind::Index { base: expr, index }, span);
            } else if self.at(&TokenKind::Dot) {
                // Only enum member access; the base must be a bare name.
                let base = match self.ast.kind(expr) {
                    NodeKind::Ident { name } => name.clone(),
                    _ => {
                        self.error("`.` is only valid after an enum name".to_owned());
                        return Some(expr);
                    }
                };
                self.bump();
                let member = self.ident("an enum member name")?;
                let span = start.to(self.prev_span());
                expr = self.ast.push(NodeKind::Member { base, member }, span);
            } else {
                return Some(expr);
            }
        }
    }

    fn primary_expr(&mut self) -> Option<NodeId> {
        let start = self.span();
        match self.bump() {
            TokenKind::Int(value) => Some(self.ast.push(NodeKind::NumLit { value }, start)),
            TokenKind::True => Some(self.ast.push(NodeKind::BoolLit { value: true }, start)),
            TokenKind::False => Some(self.ast.push(NodeKind::BoolLit { value: false }, start)),
            TokenKind::Str(value) => Some(self.ast.push(NodeKind::StrLit { value }, start)),
            TokenKind::Ident(name) => Some(self.ast.push(NodeKind::Ident { name }, start)),
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(&TokenKind::RParen, "`)`");
                Some(inner)
            }
            TokenKind::LBracket => {
                let mut elems = Vec::new();
                if !self.at(&TokenKind::RBracket) {
                    loop {
                        elems.push(self.expression()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBracket, "`]` after array literal");
                let span = start.to(self.prev_span());
                Some(self.ast.push(NodeKind::ArrayLit { elems }, span))
            }
            other => {
                self.error(format!("expected an expression, found {other}"));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;

    fn parse(source: &str) -> (Ast, NodeId, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = lexer::lex(0, source, &mut diags);
        let mut ast = Ast::new();
        let root = parse_unit(&mut ast, tokens, "Main", &mut diags);
        (ast, root, diags)
    }

    fn parse_clean(source: &str) -> (Ast, NodeId) {
        let (ast, root, diags) = parse(source);
        assert!(!diags.has_errors(), "parse errors: {:?}", diags.items());
        (ast, root)
    }

    #[test]
    fn module_header_and_function() {
        let (ast, root) = parse_clean("module Game.Main;\nfunction add(a: byte, b: byte): byte { return a + b; }");
        let NodeKind::Unit { name, explicit_module, items } = ast.kind(root) else {
            panic!("not a unit");
        };
        assert_eq!(name, "Game.Main");
        assert!(*explicit_module);
        assert_eq!(items.len(), 1);
        let NodeKind::Function { name, params, ret, .. } = ast.kind(items[0]) else {
            panic!("not a function");
        };
        assert_eq!(name, "add");
        assert_eq!(params.len(), 2);
        assert!(ret.is_some());
    }

    #[test]
    fn missing_module_header_warns() {
        let (_, _, diags) = parse("function main(): void { }");
        assert!(diags.contains(DiagnosticCode::ImplicitModule));
        assert!(!diags.has_errors());
    }

    #[test]
    fn precedence_shapes_the_tree() {
        let (ast, root) = parse_clean("module M;\nfunction f(): byte { return 1 + 2 * 3; }");
        // Find the return's Binary node: it must be Add(1, Mul(2, 3)).
        let mut found = false;
        for i in 0..ast.len() {
            if let NodeKind::Binary { op: BinOp::Add, rhs, .. } =
                ast.kind(blend_types::NodeId::from_usize(i))
            {
                assert!(matches!(
                    ast.kind(*rhs),
                    NodeKind::Binary { op: BinOp::Mul, .. }
                ));
                found = true;
            }
        }
        assert!(found, "no Add node parsed");
        let _ = root;
    }

    #[test]
    fn map_declarations_both_forms() {
        let (ast, root) = parse_clean(
            "module M;\n@map BORDER at $D020: byte;\n@map SCREEN from $0400 to $07E7: byte[1000];",
        );
        let NodeKind::Unit { items, .. } = ast.kind(root) else {
            panic!()
        };
        let NodeKind::VarDecl { storage, map, .. } = ast.kind(items[0]) else {
            panic!()
        };
        assert_eq!(*storage, blend_types::StorageClass::Map);
        assert!(map.unwrap().hi.is_none());
        let NodeKind::VarDecl { map, .. } = ast.kind(items[1]) else {
            panic!()
        };
        assert!(map.unwrap().hi.is_some());
    }

    #[test]
    fn for_match_and_compound_assignment() {
        let (ast, _) = parse_clean(
            "module M;\nfunction f(): void {\n  for i from 0 to 9 step 2 { }\n  match (1) { case 1: break; default: { } }\n  let x: byte = 0;\n  x += 3;\n}",
        );
        let mut saw_for = false;
        let mut saw_match = false;
        let mut saw_compound = false;
        for i in 0..ast.len() {
            match ast.kind(blend_types::NodeId::from_usize(i)) {
                NodeKind::For { step, .. } => {
                    saw_for = true;
                    assert!(step.is_some());
                }
                NodeKind::Match { cases, default, .. } => {
                    saw_match = true;
                    assert_eq!(cases.len(), 1);
                    assert!(default.is_some());
                }
                NodeKind::Assign { op: Some(BinOp::Add), .. } => saw_compound = true,
                _ => {}
            }
        }
        assert!(saw_for && saw_match && saw_compound);
    }

    #[test]
    fn recovery_reports_multiple_errors() {
        let (_, _, diags) = parse("module M;\nlet = ;\nlet y: byte = 1;\nlet = ;");
        let syntax_errors = diags
            .items()
            .iter()
            .filter(|d| d.code == DiagnosticCode::SyntaxError)
            .count();
        assert!(syntax_errors >= 2, "expected at least two syntax errors");
    }

    #[test]
    fn enum_with_repr_and_values() {
        let (ast, root) = parse_clean("module M;\nenum Sprite: word { A, B = 4, C }");
        let NodeKind::Unit { items, .. } = ast.kind(root) else {
            panic!()
        };
        let NodeKind::EnumDecl { repr, members, .. } = ast.kind(items[0]) else {
            panic!()
        };
        assert_eq!(*repr, Width::Word);
        assert_eq!(members.len(), 3);
        assert!(members[1].1.is_some());
    }
}
