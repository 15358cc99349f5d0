//! Intermediate language of the Blend65 compiler.
//!
//! The IL is a linear, accumulator-centric instruction sequence produced per
//! function by the IL generator and consumed by the code generator. Every
//! storage operand is an absolute 16-bit address resolved by the static
//! frame allocator; the IL is in-memory only and has no on-disk encoding.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod instruction;
mod opcode;
mod operand;

pub mod op;

pub use instruction::Instruction;
pub use opcode::Opcode;
pub use operand::{Addr, Label, Operand};

pub use blend_types::Width;
