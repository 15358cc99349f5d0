//! Shorthand constructors for each instruction shape, mirroring the
//! mnemonics the IL generator emits.

use crate::{Addr, Instruction, Label, Opcode, Operand};
use blend_types::{FuncId, Width};

/// Load the operand into the accumulator.
pub const fn load(width: Width, src: Operand) -> Instruction {
    Instruction::new(Opcode::Load, width, src)
}

/// Load an immediate into the accumulator.
pub const fn load_imm(width: Width, value: u16) -> Instruction {
    Instruction::new(Opcode::Load, width, Operand::Imm(value))
}

/// Store a value to an absolute address.
pub const fn store(width: Width, dst: Addr, src: Operand) -> Instruction {
    Instruction::with_source(Opcode::Store, width, Operand::Addr(dst), src)
}

/// Arithmetic / bitwise instruction on the accumulator and one operand.
pub const fn alu(opcode: Opcode, width: Width, rhs: Operand) -> Instruction {
    Instruction::new(opcode, width, rhs)
}

/// Shift the accumulator left.
pub const fn shl(width: Width, count: u16) -> Instruction {
    Instruction::new(Opcode::Shl, width, Operand::Imm(count))
}

/// Shift the accumulator right.
pub const fn shr(width: Width, count: u16) -> Instruction {
    Instruction::new(Opcode::Shr, width, Operand::Imm(count))
}

/// Bitwise complement of the accumulator.
pub const fn not(width: Width) -> Instruction {
    Instruction::new(Opcode::Not, width, Operand::Acc)
}

/// Comparison producing a bool in the accumulator.
pub const fn cmp(opcode: Opcode, width: Width, rhs: Operand) -> Instruction {
    Instruction::new(opcode, width, rhs)
}

/// Unconditional jump.
pub const fn jump(target: Label) -> Instruction {
    Instruction::new(Opcode::Jump, Width::Byte, Operand::Label(target))
}

/// Branch if the accumulator is zero.
pub const fn brz(target: Label) -> Instruction {
    Instruction::new(Opcode::BranchZero, Width::Byte, Operand::Label(target))
}

/// Branch if the accumulator is non-zero.
pub const fn brnz(target: Label) -> Instruction {
    Instruction::new(Opcode::BranchNonZero, Width::Byte, Operand::Label(target))
}

/// Call a function.
pub const fn call(func: FuncId) -> Instruction {
    Instruction::new(Opcode::Call, Width::Byte, Operand::Func(func))
}

/// Return to the caller.
pub const fn ret() -> Instruction {
    Instruction::new(Opcode::Return, Width::Byte, Operand::Acc)
}

/// Read target memory into the accumulator.
pub const fn peek(width: Width, addr: Operand) -> Instruction {
    Instruction::new(Opcode::Peek, width, addr)
}

/// Write a value to target memory.
pub const fn poke(width: Width, addr: Operand, value: Operand) -> Instruction {
    Instruction::with_source(Opcode::Poke, width, addr, value)
}

/// High byte of the accumulator word.
pub const fn hi() -> Instruction {
    Instruction::new(Opcode::Hi, Width::Word, Operand::Acc)
}

/// Low byte of the accumulator word.
pub const fn lo() -> Instruction {
    Instruction::new(Opcode::Lo, Width::Word, Operand::Acc)
}

/// Local label position marker.
pub const fn label(l: Label) -> Instruction {
    Instruction::new(Opcode::Label, Width::Byte, Operand::Label(l))
}
