//! IL instruction representation.

use crate::{Opcode, Operand};
use blend_types::Width;
use core::fmt;

/// One IL instruction: an opcode, the operand width of the value it moves
/// or computes, and up to two operands.
///
/// The second operand is only meaningful for [`Opcode::Store`] and
/// [`Opcode::Poke`] (the value source); everywhere else it is `Acc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    opcode: Opcode,
    width: Width,
    a: Operand,
    b: Operand,
}

impl Instruction {
    /// Construct an instruction with a single operand.
    pub const fn new(opcode: Opcode, width: Width, a: Operand) -> Self {
        Self {
            opcode,
            width,
            a,
            b: Operand::Acc,
        }
    }

    /// Construct an instruction with two operands.
    pub const fn with_source(opcode: Opcode, width: Width, a: Operand, b: Operand) -> Self {
        Self { opcode, width, a, b }
    }

    /// Opcode.
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Operand width.
    pub const fn width(&self) -> Width {
        self.width
    }

    /// Primary operand.
    pub const fn a(&self) -> Operand {
        self.a
    }

    /// Secondary operand (value source of `STORE` / `POKE`).
    pub const fn b(&self) -> Operand {
        self.b
    }

    /// All meaningful operands, secondary last.
    pub fn operands(&self) -> impl Iterator<Item = Operand> {
        let b = self.b;
        core::iter::once(self.a).chain((!b.is_acc()).then_some(b))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode {
            Opcode::Label => write!(f, "{}:", self.a),
            Opcode::Not | Opcode::Hi | Opcode::Lo | Opcode::Return if self.a.is_acc() => {
                write!(f, "{}.{}", self.opcode, self.width)
            }
            _ if self.b.is_acc() => write!(f, "{}.{} {}", self.opcode, self.width, self.a),
            _ => write!(f, "{}.{} {}, {}", self.opcode, self.width, self.a, self.b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{op, Addr, Label};
    use rstest::rstest;

    #[rstest]
    #[case(op::load(Width::Byte, Operand::Addr(Addr::new(0x02))), "LOAD.byte $0002")]
    #[case(op::store(Width::Byte, Addr::new(0x0200), Operand::Imm(5)), "STORE.byte $0200, #5")]
    #[case(op::label(Label::new(2)), "L2:")]
    #[case(op::ret(), "RET.byte")]
    #[case(op::poke(Width::Byte, Operand::Imm(0xD020), Operand::Acc), "POKE.byte #53280")]
    fn display_reads_like_assembly(#[case] inst: Instruction, #[case] text: &str) {
        assert_eq!(inst.to_string(), text);
    }

    #[test]
    fn operands_skip_implicit_accumulator() {
        let st = op::store(Width::Word, Addr::new(0x0200), Operand::Imm(7));
        assert_eq!(st.operands().count(), 2);
        let ld = op::load(Width::Word, Operand::Imm(7));
        assert_eq!(ld.operands().count(), 1);
    }
}
