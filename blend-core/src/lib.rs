//! Blend65 compiler middle-end.
//!
//! The pipeline turns Blend65 source text into a [`FrameMap`] (a fixed
//! compile-time address for every variable, no runtime stack) and a linear
//! IL per function. The distinctive pass is the static frame allocator:
//! because recursion is prohibited, the call graph proves which functions
//! can never be live together, their frames coalesce onto shared base
//! addresses, and the hottest variables win the 6502 zero page.
//!
//! [`FrameMap`]: frame::FrameMap

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod alloc;
pub mod ast;
pub mod callgraph;
pub mod cfg;
pub mod diagnostics;
pub mod driver;
pub mod frame;
pub mod funcs;
pub mod ilgen;
pub mod lexer;
pub mod modules;
pub mod parser;
pub mod platform;
pub mod symtab;
pub mod token;
pub mod typecheck;
pub mod walker;

pub mod prelude {
    //! Everything a driver embedding the middle-end needs.
    #[doc(no_inline)]
    pub use blend_asm::{op, Addr, Instruction, Label, Opcode, Operand};
    #[doc(no_inline)]
    pub use blend_types::{
        FuncId, NodeId, ScopeId, Span, StorageClass, SymbolId, Type, Width, Word,
    };

    pub use crate::callgraph::{CallGraph, ThreadContext};
    pub use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics, Severity};
    pub use crate::driver::{compile, Artifacts, CompileError, Compilation, Compiler, SourceUnit};
    pub use crate::frame::{
        AllocStats, CoalesceGroup, Frame, FrameMap, FrameSlot, SlotKind, SlotLocation,
        ZpDirective,
    };
    pub use crate::ilgen::{IlFunction, IlProgram};
    pub use crate::platform::{CompilerConfig, PlatformConfig, Target};
    pub use crate::symtab::{Scope, ScopeKind, Symbol, SymbolKind, SymbolTable};
    pub use crate::typecheck::Intrinsic;
}
