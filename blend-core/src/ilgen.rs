//! IL generation.
//!
//! A post-type-check walk keyed by the FrameMap: every variable reference
//! becomes an absolute address, calls become argument stores plus `CALL`,
//! and control flow becomes labels and branches. The generator opens no
//! frames and invents no variables; spill temporaries were created in
//! Phase A by the same demand computation this module's evaluation
//! discipline follows, so `$t[base]` always exists.

use crate::alloc::trivial_operand;
use crate::ast::{Ast, BinOp, NodeKind, UnaryOp};
use crate::frame::{Frame, FrameMap};
use crate::funcs::FuncRegistry;
use crate::symtab::{ScopeKind, SymbolKind, SymbolTable};
use crate::typecheck::{for_step_value, Analysis, Intrinsic};
use blend_asm::{op, Addr, Instruction, Label, Opcode, Operand};
use blend_types::{FuncId, NodeId, ScopeId, SymbolId, Type, Width};

/// One lowered function.
#[derive(Debug)]
pub struct IlFunction {
    /// Fully qualified name.
    pub name: String,
    /// Registry id; `CALL` operands refer to these.
    pub id: FuncId,
    /// The function's frame, for code-generator consumption.
    pub frame: Frame,
    /// Ordered instruction list.
    pub body: Vec<Instruction>,
}

/// The lowered program, in function declaration order.
#[derive(Debug, Default)]
pub struct IlProgram {
    /// All functions.
    pub functions: Vec<IlFunction>,
}

impl IlProgram {
    /// Find a function by qualified name.
    pub fn function(&self, name: &str) -> Option<&IlFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// Lower every function.
pub fn generate(
    ast: &Ast,
    table: &SymbolTable,
    funcs: &FuncRegistry,
    analysis: &Analysis,
    map: &FrameMap,
) -> IlProgram {
    tracing::debug!(functions = funcs.len(), "generating IL");
    let mut program = IlProgram::default();
    for (id, info) in funcs.iter() {
        let mut gen = Gen {
            ast,
            table,
            funcs,
            analysis,
            map,
            frame: map.frame_of(id),
            scope: info.scope,
            out: Vec::new(),
            labels: 0,
            loops: Vec::new(),
        };
        gen.stmt(info.body, 0);
        // Every path ends in RETURN; add the implicit one for void falls.
        if gen.out.last().map(|i| i.opcode()) != Some(Opcode::Return) {
            gen.out.push(op::ret());
        }
        program.functions.push(IlFunction {
            name: info.qualified.clone(),
            id,
            frame: map.frame_of(id).clone(),
            body: gen.out,
        });
    }
    program
}

struct Gen<'a> {
    ast: &'a Ast,
    table: &'a SymbolTable,
    funcs: &'a FuncRegistry,
    analysis: &'a Analysis,
    map: &'a FrameMap,
    frame: &'a Frame,
    scope: ScopeId,
    out: Vec<Instruction>,
    labels: u32,
    /// `(continue target, break target)`, innermost last.
    loops: Vec<(Label, Label)>,
}

impl Gen<'_> {
    fn emit(&mut self, inst: Instruction) {
        self.out.push(inst);
    }

    fn fresh(&mut self) -> Label {
        let label = Label::new(self.labels);
        self.labels += 1;
        label
    }

    fn width_of(&self, expr: NodeId) -> Width {
        self.analysis.type_of(expr).width()
    }

    /// Address of the `$t<index>` spill slot.
    fn temp(&self, index: u16) -> Addr {
        self.frame
            .slot(&format!("$t{index}"))
            .map(|s| s.addr())
            .unwrap_or_else(|| {
                tracing::error!(func = %self.frame.func, index, "spill temporary missing");
                Addr::new(0)
            })
    }

    /// Absolute address and width of a storage symbol.
    fn storage(&self, symbol: SymbolId) -> Option<(Addr, Width)> {
        let resolved = self.table.resolve_alias(symbol);
        let data = self.table.symbol(resolved);
        let width = data.ty.width();
        if data.kind == SymbolKind::MapVariable {
            return data.map_addr.map(|a| (Addr::new(a), width));
        }
        let scope = self.table.scope(data.scope);
        let frame = match scope.kind {
            ScopeKind::Function => {
                if data.scope == self.scope {
                    Some(self.frame)
                } else {
                    // A symbol from another function's scope cannot be
                    // referenced; the checker already rejected it.
                    None
                }
            }
            ScopeKind::Module => {
                let module = self
                    .table
                    .modules()
                    .iter()
                    .find(|(_, id)| *id == data.scope)
                    .map(|(name, _)| name.clone())?;
                self.map.frame(&module)
            }
        }?;
        frame.slot_of_symbol(resolved).map(|s| (s.addr(), width))
    }

    /// The direct operand form of a trivial expression.
    fn operand(&self, expr: NodeId) -> Option<(Operand, Width)> {
        if let Some(&value) = self.analysis.consts.get(expr) {
            return Some((Operand::Imm(value as u16), self.width_of(expr)));
        }
        match self.ast.kind(expr) {
            NodeKind::Ident { .. } => {
                let &symbol = self.analysis.bindings.get(expr)?;
                let (addr, width) = self.storage(symbol)?;
                Some((Operand::Addr(addr), width))
            }
            _ => None,
        }
    }

    fn is_trivial(&self, expr: NodeId) -> bool {
        trivial_operand(self.ast, self.table, self.analysis, expr)
    }

    // ── Statements ───────────────────────────────────────────────────

    fn stmt(&mut self, stmt: NodeId, base: u16) {
        match self.ast.kind(stmt) {
            NodeKind::Block { stmts } => {
                for &s in stmts {
                    self.stmt(s, base);
                }
            }
            NodeKind::VarDecl { init, .. } => {
                let Some(init) = *init else { return };
                let Some(symbol) = self.table.symbol_of_decl(stmt) else {
                    return;
                };
                match self.ast.kind(init) {
                    NodeKind::ArrayLit { elems } => {
                        self.array_init(symbol, &elems.clone(), base)
                    }
                    NodeKind::StrLit { value } => {
                        let bytes: Vec<u16> =
                            value.bytes().map(u16::from).collect();
                        self.byte_init(symbol, &bytes);
                    }
                    _ => {
                        self.eval(init, base);
                        if let Some((addr, width)) = self.storage(symbol) {
                            self.emit(op::store(width, addr, Operand::Acc));
                        }
                    }
                }
            }
            NodeKind::ExprStmt { expr } => self.expr_stmt(*expr, base),
            NodeKind::Return { value } => {
                if let Some(value) = *value {
                    self.eval(value, base);
                    if let Some(slot) = self.frame.return_slot() {
                        let (addr, width) = (slot.addr(), slot.ty.width());
                        self.emit(op::store(width, addr, Operand::Acc));
                    }
                }
                self.emit(op::ret());
            }
            NodeKind::Break => {
                if let Some(&(_, brk)) = self.loops.last() {
                    self.emit(op::jump(brk));
                }
            }
            NodeKind::Continue => {
                if let Some(&(cont, _)) = self.loops.last() {
                    self.emit(op::jump(cont));
                }
            }
            NodeKind::If {
                cond,
                then_block,
                else_block,
            } => {
                let (cond, then_block, else_block) = (*cond, *then_block, *else_block);
                self.eval(cond, base);
                let l_end = self.fresh();
                match else_block {
                    Some(else_block) => {
                        let l_else = self.fresh();
                        self.emit(op::brz(l_else));
                        self.stmt(then_block, base);
                        self.emit(op::jump(l_end));
                        self.emit(op::label(l_else));
                        self.stmt(else_block, base);
                    }
                    None => {
                        self.emit(op::brz(l_end));
                        self.stmt(then_block, base);
                    }
                }
                self.emit(op::label(l_end));
            }
            NodeKind::While { cond, body } => {
                let (cond, body) = (*cond, *body);
                let l_top = self.fresh();
                let l_end = self.fresh();
                self.emit(op::label(l_top));
                self.eval(cond, base);
                self.emit(op::brz(l_end));
                self.loops.push((l_top, l_end));
                self.stmt(body, base);
                self.loops.pop();
                self.emit(op::jump(l_top));
                self.emit(op::label(l_end));
            }
            NodeKind::DoWhile { body, cond } => {
                let (body, cond) = (*body, *cond);
                let l_top = self.fresh();
                let l_cont = self.fresh();
                let l_end = self.fresh();
                self.emit(op::label(l_top));
                self.loops.push((l_cont, l_end));
                self.stmt(body, base);
                self.loops.pop();
                self.emit(op::label(l_cont));
                self.eval(cond, base);
                self.emit(op::brnz(l_top));
                self.emit(op::label(l_end));
            }
            NodeKind::For {
                from,
                to,
                step,
                body,
                ..
            } => self.for_loop(stmt, *from, *to, *step, *body, base),
            NodeKind::Match {
                subject,
                cases,
                default,
            } => {
                let (subject, cases, default) = (*subject, cases.clone(), *default);
                let width = self.width_of(subject);
                self.eval(subject, base);
                let stash = self.temp(base);
                self.emit(op::store(width, stash, Operand::Acc));
                let l_end = self.fresh();
                for case in &cases {
                    let l_next = self.fresh();
                    let value = self
                        .analysis
                        .consts
                        .get(case.value)
                        .copied()
                        .unwrap_or_default() as u16;
                    self.emit(op::load(width, Operand::Addr(stash)));
                    self.emit(op::cmp(Opcode::CmpEq, width, Operand::Imm(value)));
                    self.emit(op::brz(l_next));
                    self.stmt(case.body, base + 1);
                    self.emit(op::jump(l_end));
                    self.emit(op::label(l_next));
                }
                if let Some(default) = default {
                    self.stmt(default, base + 1);
                }
                self.emit(op::label(l_end));
            }
            _ => {}
        }
    }

    fn for_loop(
        &mut self,
        stmt: NodeId,
        from: NodeId,
        to: NodeId,
        step: Option<NodeId>,
        body: NodeId,
        base: u16,
    ) {
        let NodeKind::For { var, .. } = self.ast.kind(stmt) else {
            return;
        };
        let Some(symbol) = self.table.lookup(self.scope, var) else {
            return;
        };
        let Some((var_addr, width)) = self.storage(symbol) else {
            return;
        };
        let (magnitude, negative) = step
            .and_then(|s| for_step_value(self.ast, s))
            .unwrap_or((1, false));

        self.eval(from, base);
        self.emit(op::store(width, var_addr, Operand::Acc));

        let l_top = self.fresh();
        let l_incr = self.fresh();
        let l_end = self.fresh();
        self.emit(op::label(l_top));

        // Bound check: keep looping while var <= to (or >= for a negative
        // step). Bounds are inclusive.
        let cmp = if negative { Opcode::CmpGe } else { Opcode::CmpLe };
        if let Some((operand, _)) = self.operand(to) {
            self.emit(op::load(width, Operand::Addr(var_addr)));
            self.emit(op::cmp(cmp, width, operand));
        } else {
            self.eval(to, base);
            let stash = self.temp(base);
            self.emit(op::store(width, stash, Operand::Acc));
            self.emit(op::load(width, Operand::Addr(var_addr)));
            self.emit(op::cmp(cmp, width, Operand::Addr(stash)));
        }
        self.emit(op::brz(l_end));

        self.loops.push((l_incr, l_end));
        self.stmt(body, base);
        self.loops.pop();

        self.emit(op::label(l_incr));
        self.emit(op::load(width, Operand::Addr(var_addr)));
        let step_op = if negative { Opcode::Sub } else { Opcode::Add };
        self.emit(op::alu(step_op, width, Operand::Imm(magnitude)));
        self.emit(op::store(width, var_addr, Operand::Acc));
        self.emit(op::jump(l_top));
        self.emit(op::label(l_end));
    }

    /// An expression in statement position: calls skip the result load.
    fn expr_stmt(&mut self, expr: NodeId, base: u16) {
        match self.ast.kind(expr) {
            NodeKind::Call { .. } => {
                self.call(expr, base, false);
            }
            _ => self.eval(expr, base),
        }
    }

    /// Element-wise lowering of an array literal initializer.
    fn array_init(&mut self, symbol: SymbolId, elems: &[NodeId], base: u16) {
        let Some((addr, _)) = self.storage(symbol) else {
            return;
        };
        let elem_width = match self.table.symbol(symbol).ty.clone() {
            Type::Array(elem, _) => elem.width(),
            _ => Width::Byte,
        };
        let stride = elem_width.bytes();
        for (index, &elem) in elems.iter().enumerate() {
            let slot = Addr::new(addr.raw() + index as u16 * stride);
            match self.analysis.consts.get(elem) {
                Some(&value) => {
                    self.emit(op::store(elem_width, slot, Operand::Imm(value as u16)))
                }
                None => {
                    self.eval(elem, base);
                    self.emit(op::store(elem_width, slot, Operand::Acc));
                }
            }
        }
    }

    /// Byte-wise lowering of a string literal initializer.
    fn byte_init(&mut self, symbol: SymbolId, bytes: &[u16]) {
        let Some((addr, _)) = self.storage(symbol) else {
            return;
        };
        for (index, &byte) in bytes.iter().enumerate() {
            let slot = Addr::new(addr.raw() + index as u16);
            self.emit(op::store(Width::Byte, slot, Operand::Imm(byte)));
        }
    }

    // ── Expressions ──────────────────────────────────────────────────

    /// Evaluate `expr` into the accumulator using spill slots from
    /// `$t[base]` upward.
    fn eval(&mut self, expr: NodeId, base: u16) {
        if let Some(&value) = self.analysis.consts.get(expr) {
            self.emit(op::load_imm(self.width_of(expr), value as u16));
            return;
        }
        match self.ast.kind(expr) {
            NodeKind::Ident { .. } => {
                if let Some((operand, width)) = self.operand(expr) {
                    self.emit(op::load(width, operand));
                }
            }
            NodeKind::Unary { op: un_op, operand } => {
                let (un_op, operand) = (*un_op, *operand);
                let width = self.width_of(expr);
                match un_op {
                    UnaryOp::Pos => self.eval(operand, base),
                    UnaryOp::BitNot => {
                        self.eval(operand, base);
                        self.emit(op::not(width));
                    }
                    UnaryOp::Not => {
                        self.eval(operand, base);
                        self.emit(op::cmp(Opcode::CmpEq, Width::Byte, Operand::Imm(0)));
                    }
                    UnaryOp::Neg => {
                        self.eval(operand, base);
                        let stash = self.temp(base);
                        self.emit(op::store(width, stash, Operand::Acc));
                        self.emit(op::load_imm(width, 0));
                        self.emit(op::alu(Opcode::Sub, width, Operand::Addr(stash)));
                    }
                }
            }
            NodeKind::Binary { op: bin_op, lhs, rhs } => {
                let (bin_op, lhs, rhs) = (*bin_op, *lhs, *rhs);
                self.binary(bin_op, lhs, rhs, base);
            }
            NodeKind::Assign { op: as_op, target, value } => {
                let (as_op, target, value) = (*as_op, *target, *value);
                self.assign(as_op, target, value, base);
            }
            NodeKind::Call { .. } => {
                self.call(expr, base, true);
            }
            NodeKind::Index { base: array, index } => {
                let (array, index) = (*array, *index);
                let width = self.width_of(expr);
                if let Some(addr) = self.static_element_addr(array, index) {
                    self.emit(op::load(width, Operand::Addr(addr)));
                } else {
                    self.element_addr(array, index, base);
                    self.emit(op::peek(width, Operand::Acc));
                }
            }
            _ => {}
        }
    }

    fn binary(&mut self, bin_op: BinOp, lhs: NodeId, rhs: NodeId, base: u16) {
        if bin_op.is_logical() {
            let l_end = self.fresh();
            self.eval(lhs, base);
            match bin_op {
                BinOp::LogicalAnd => self.emit(op::brz(l_end)),
                _ => self.emit(op::brnz(l_end)),
            }
            self.eval(rhs, base);
            self.emit(op::label(l_end));
            return;
        }

        let width = self
            .analysis
            .type_of(lhs)
            .unify_numeric(&self.analysis.type_of(rhs))
            .width();
        let opcode = match bin_op {
            BinOp::Add => Opcode::Add,
            BinOp::Sub => Opcode::Sub,
            BinOp::Mul => Opcode::Mul,
            BinOp::Div => Opcode::Div,
            BinOp::Mod => Opcode::Mod,
            BinOp::BitAnd => Opcode::And,
            BinOp::BitOr => Opcode::Or,
            BinOp::BitXor => Opcode::Xor,
            BinOp::Shl => Opcode::Shl,
            BinOp::Shr => Opcode::Shr,
            BinOp::Eq => Opcode::CmpEq,
            BinOp::Ne => Opcode::CmpNe,
            BinOp::Lt => Opcode::CmpLt,
            BinOp::Le => Opcode::CmpLe,
            BinOp::Gt => Opcode::CmpGt,
            BinOp::Ge => Opcode::CmpGe,
            BinOp::LogicalAnd | BinOp::LogicalOr => return,
        };
        if let Some((operand, _)) = self.operand(rhs) {
            self.eval(lhs, base);
            self.emit(op::alu(opcode, width, operand));
        } else {
            // Spill the right operand, then bring the left into the
            // accumulator for the address form.
            self.eval(rhs, base);
            let stash = self.temp(base);
            self.emit(op::store(width, stash, Operand::Acc));
            self.eval(lhs, base + 1);
            self.emit(op::alu(opcode, width, Operand::Addr(stash)));
        }
    }

    fn assign(&mut self, as_op: Option<BinOp>, target: NodeId, value: NodeId, base: u16) {
        match self.ast.kind(target) {
            NodeKind::Ident { .. } => {
                let Some(&symbol) = self.analysis.bindings.get(target) else {
                    return;
                };
                let Some((addr, width)) = self.storage(symbol) else {
                    return;
                };
                match as_op {
                    None => self.eval(value, base),
                    Some(bin_op) => {
                        // x op= e evaluates as x op e with x trivially
                        // addressable.
                        if let Some((operand, _)) = self.operand(value) {
                            self.emit(op::load(width, Operand::Addr(addr)));
                            self.emit(op::alu(alu_opcode(bin_op), width, operand));
                        } else {
                            self.eval(value, base);
                            let stash = self.temp(base);
                            self.emit(op::store(width, stash, Operand::Acc));
                            self.emit(op::load(width, Operand::Addr(addr)));
                            self.emit(op::alu(alu_opcode(bin_op), width, Operand::Addr(stash)));
                        }
                    }
                }
                self.emit(op::store(width, addr, Operand::Acc));
            }
            NodeKind::Index { base: array, index } => {
                let (array, index) = (*array, *index);
                let width = self.width_of(target);
                if let (None, Some(addr)) = (as_op, self.static_element_addr(array, index)) {
                    self.eval(value, base);
                    self.emit(op::store(width, addr, Operand::Acc));
                    return;
                }
                match as_op {
                    None => {
                        self.eval(value, base);
                        let stash = self.temp(base);
                        self.emit(op::store(width, stash, Operand::Acc));
                        self.element_addr(array, index, base + 1);
                        self.emit(op::poke(width, Operand::Acc, Operand::Addr(stash)));
                    }
                    Some(bin_op) => {
                        // arr[i] op= e: value and element address both
                        // stashed, element read back through the
                        // accumulator, combined, written back.
                        self.eval(value, base);
                        let value_stash = self.temp(base);
                        self.emit(op::store(width, value_stash, Operand::Acc));
                        self.element_addr(array, index, base + 1);
                        let addr_stash = self.temp(base + 1);
                        self.emit(op::store(Width::Word, addr_stash, Operand::Acc));
                        self.emit(op::peek(width, Operand::Acc));
                        self.emit(op::alu(alu_opcode(bin_op), width, Operand::Addr(value_stash)));
                        self.emit(op::store(width, value_stash, Operand::Acc));
                        self.emit(op::load(Width::Word, Operand::Addr(addr_stash)));
                        self.emit(op::poke(width, Operand::Acc, Operand::Addr(value_stash)));
                    }
                }
            }
            _ => {}
        }
    }

    /// Lower a call; `want_value` loads the return slot afterwards.
    fn call(&mut self, expr: NodeId, base: u16, want_value: bool) {
        let NodeKind::Call { callee, args } = self.ast.kind(expr) else {
            return;
        };
        let (callee, args) = (*callee, args.clone());

        if let NodeKind::Ident { name } = self.ast.kind(callee) {
            if let Some(intrinsic) = Intrinsic::from_name(name) {
                self.intrinsic(intrinsic, &args, base);
                return;
            }
        }

        let Some(&symbol) = self.analysis.bindings.get(callee) else {
            return;
        };
        let Some(func_id) = self.funcs.by_decl(self.table.symbol(symbol).decl) else {
            return;
        };
        let callee_frame = self.map.frame_of(func_id);
        let params: Vec<(Addr, Width)> = callee_frame
            .param_slots()
            .map(|slot| (slot.addr(), slot.ty.width()))
            .collect();

        for (&arg, &(addr, width)) in args.iter().zip(&params) {
            match self.operand(arg) {
                Some((Operand::Imm(value), _)) => {
                    self.emit(op::store(width, addr, Operand::Imm(value)));
                }
                _ => {
                    self.eval(arg, base);
                    self.emit(op::store(width, addr, Operand::Acc));
                }
            }
        }
        self.emit(op::call(func_id));
        if want_value {
            if let Some(slot) = callee_frame.return_slot() {
                self.emit(op::load(slot.ty.width(), Operand::Addr(slot.addr())));
            }
        }
    }

    fn intrinsic(&mut self, intrinsic: Intrinsic, args: &[NodeId], base: u16) {
        match intrinsic {
            Intrinsic::Peek | Intrinsic::Peekw => {
                let width = match intrinsic {
                    Intrinsic::Peek => Width::Byte,
                    _ => Width::Word,
                };
                let Some(&addr) = args.first() else { return };
                match self.analysis.consts.get(addr) {
                    Some(&value) => self.emit(op::peek(width, Operand::Imm(value as u16))),
                    None => {
                        self.eval(addr, base);
                        self.emit(op::peek(width, Operand::Acc));
                    }
                }
            }
            Intrinsic::Poke | Intrinsic::Pokew => {
                let width = match intrinsic {
                    Intrinsic::Poke => Width::Byte,
                    _ => Width::Word,
                };
                let (Some(&addr), Some(&value)) = (args.first(), args.get(1)) else {
                    return;
                };
                match self.analysis.consts.get(addr).copied() {
                    Some(target) => {
                        // The address is a literal; evaluate the value and
                        // write straight through.
                        self.eval(value, base);
                        self.emit(op::poke(width, Operand::Imm(target as u16), Operand::Acc));
                    }
                    None => {
                        if self.is_trivial(value) {
                            let operand = self.operand(value).map(|(o, _)| o);
                            self.eval(addr, base);
                            self.emit(op::poke(
                                width,
                                Operand::Acc,
                                operand.unwrap_or(Operand::Acc),
                            ));
                        } else {
                            self.eval(value, base);
                            let stash = self.temp(base);
                            self.emit(op::store(width, stash, Operand::Acc));
                            self.eval(addr, base + 1);
                            self.emit(op::poke(width, Operand::Acc, Operand::Addr(stash)));
                        }
                    }
                }
            }
            Intrinsic::Hi | Intrinsic::Lo => {
                let Some(&arg) = args.first() else { return };
                self.eval(arg, base);
                match intrinsic {
                    Intrinsic::Hi => self.emit(op::hi()),
                    _ => self.emit(op::lo()),
                }
            }
            Intrinsic::Len | Intrinsic::Sizeof => {
                // Compile-time constants; the const-fold path in eval()
                // already produced a LOAD immediate when the value is used.
            }
        }
    }

    /// The literal element address of `array[index]` when the index is a
    /// compile-time constant.
    fn static_element_addr(&self, array: NodeId, index: NodeId) -> Option<Addr> {
        let &index_value = self.analysis.consts.get(index)?;
        let &symbol = self.analysis.bindings.get(array)?;
        let (addr, _) = self.storage(symbol)?;
        let stride = match &self.table.symbol(self.table.resolve_alias(symbol)).ty {
            Type::Array(elem, _) => elem.size(),
            _ => 1,
        };
        Some(Addr::new(addr.raw() + index_value as u16 * stride))
    }

    /// Compute the element address of `array[index]` into the accumulator.
    fn element_addr(&mut self, array: NodeId, index: NodeId, base: u16) {
        let Some(&symbol) = self.analysis.bindings.get(array) else {
            return;
        };
        let Some((addr, _)) = self.storage(symbol) else {
            return;
        };
        let stride = match &self.table.symbol(self.table.resolve_alias(symbol)).ty {
            Type::Array(elem, _) => elem.size(),
            _ => 1,
        };
        self.eval(index, base);
        if stride == 2 {
            self.emit(op::alu(Opcode::Shl, Width::Word, Operand::Imm(1)));
        } else if stride > 2 {
            self.emit(op::alu(Opcode::Mul, Width::Word, Operand::Imm(stride)));
        }
        self.emit(op::alu(Opcode::Add, Width::Word, Operand::Imm(addr.raw())));
    }
}

const fn alu_opcode(bin_op: BinOp) -> Opcode {
    match bin_op {
        BinOp::Add => Opcode::Add,
        BinOp::Sub => Opcode::Sub,
        BinOp::Mul => Opcode::Mul,
        BinOp::Div => Opcode::Div,
        BinOp::Mod => Opcode::Mod,
        BinOp::BitAnd => Opcode::And,
        BinOp::BitOr => Opcode::Or,
        BinOp::BitXor => Opcode::Xor,
        BinOp::Shl => Opcode::Shl,
        BinOp::Shr => Opcode::Shr,
        // Compound assignment never carries these.
        _ => Opcode::Add,
    }
}
