//! Atomic types shared across the Blend65 compiler pipeline.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod span;
mod types;

pub use span::{Span, UnitId};
pub use types::{EnumRepr, StorageClass, Type, Width};

/// Machine word of the target; the 6502 is an 8-bit CPU with 16-bit
/// addressing, so every address and `word` value fits in `u16`.
pub type Word = u16;

/// Raw byte value type.
pub type Byte = u8;

/// Pointer size on the 6502, in bytes.
pub const PTR_SIZE: u16 = 2;

macro_rules! index_type {
    ($i:ident, $repr:ty, $doc:literal) => {
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[doc = $doc]
        pub struct $i($repr);

        impl $i {
            /// Construct from a raw index.
            pub const fn new(raw: $repr) -> Self {
                Self(raw)
            }

            /// Construct from a `usize` index.
            ///
            /// Saturates instead of wrapping; arenas never grow anywhere near
            /// the representation limit for realistic 6502 programs.
            pub fn from_usize(raw: usize) -> Self {
                Self(raw.min(<$repr>::MAX as usize) as $repr)
            }

            /// The raw index value.
            pub const fn raw(self) -> $repr {
                self.0
            }

            /// The index as `usize`, for arena addressing.
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<$i> for usize {
            fn from(id: $i) -> usize {
                id.index()
            }
        }
    };
}

index_type!(NodeId, u32, "Index of an AST node in the program arena.");
index_type!(ScopeId, u32, "Index of a scope in the scope tree.");
index_type!(SymbolId, u32, "Index of a symbol in the symbol arena.");
index_type!(FuncId, u32, "Index of a function in the function registry.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_types_round_trip() {
        let id = NodeId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(id.index(), 42usize);
        assert_eq!(NodeId::from_usize(42), id);
    }

    #[test]
    fn from_usize_saturates() {
        let id = NodeId::from_usize(usize::MAX);
        assert_eq!(id.raw(), u32::MAX);
    }
}
