//! Frames, slots, coalesce groups and the FrameMap.
//!
//! A frame is the complete storage of one function (parameters, return
//! slot, locals and compiler temporaries) at fixed compile-time addresses.
//! The allocator produces one [`FrameMap`] per compilation; the IL
//! generator and the code generator treat it as immutable.

use crate::callgraph::ThreadContext;
use blend_asm::Addr;
use blend_types::{FuncId, StorageClass, SymbolId, Type};
use std::collections::HashMap;

/// What a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SlotKind {
    /// A declared parameter.
    Parameter,
    /// The function's return value.
    Return,
    /// A declared local variable.
    Local,
    /// A compiler-generated spill temporary.
    Temporary,
}

/// Zero-page directive derived from the slot's storage class.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ZpDirective {
    /// `@zp`: zero page or a fatal diagnostic.
    Required,
    /// No annotation; the scoring decides.
    #[default]
    None,
    /// `@ram` / `@data`: never zero page.
    Forbidden,
}

/// Where a slot ended up.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SlotLocation {
    /// Not yet placed.
    #[default]
    Unassigned,
    /// In the zero page.
    ZeroPage,
    /// In the coalesced frame region.
    FrameRegion,
}

/// One storage slot of a frame.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameSlot {
    /// Slot name (variable name, `return`, or `$t<n>`).
    pub name: String,
    /// What the slot holds.
    pub kind: SlotKind,
    /// Value type.
    pub ty: Type,
    /// Size in bytes.
    pub size: u16,
    /// Declaring symbol, absent for return and temporary slots.
    pub symbol: Option<SymbolId>,
    /// Storage class of the declaring variable, `Auto` otherwise.
    pub storage: StorageClass,
    /// User zero-page directive.
    pub directive: ZpDirective,
    /// Final placement.
    pub location: SlotLocation,
    /// Absolute address once placed.
    pub address: Option<Addr>,
    /// Offset from the frame base, frame-region slots only.
    pub offset: u16,
    /// Read accesses observed by the access analyzer.
    pub reads: u32,
    /// Write accesses observed by the access analyzer.
    pub writes: u32,
    /// Deepest loop nesting any access sits in.
    pub max_loop_depth: u32,
    /// Used as a peek/poke address or array index; pointer-like.
    pub addr_like: bool,
    /// Computed zero-page priority score.
    pub zp_score: u64,
}

impl FrameSlot {
    /// The slot's absolute address; meaningful only after allocation.
    pub fn addr(&self) -> Addr {
        self.address.unwrap_or_default()
    }

    /// Total accesses.
    pub const fn access_total(&self) -> u32 {
        self.reads + self.writes
    }
}

/// The complete storage of one function.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    /// Fully qualified function name.
    pub func: String,
    /// Ordered slots: parameters, return, locals, temporaries.
    pub slots: Vec<FrameSlot>,
    /// Sum of all slot sizes before zero-page placement.
    pub raw_size: u16,
    /// Frame-region bytes after zero-page winners left.
    pub region_size: u16,
    /// Zero-page bytes consumed by this frame's slots.
    pub zp_bytes: u16,
    /// Base address in the frame region.
    pub base: Option<Addr>,
    /// Index of the coalesce group the frame joined.
    pub group: usize,
    /// Thread context of the function.
    pub context: ThreadContext,
}

impl Frame {
    /// Find a slot by name.
    pub fn slot(&self, name: &str) -> Option<&FrameSlot> {
        self.slots.iter().find(|s| s.name == name)
    }

    /// The return slot, when the function is non-void.
    pub fn return_slot(&self) -> Option<&FrameSlot> {
        self.slots.iter().find(|s| s.kind == SlotKind::Return)
    }

    /// Parameter slots in declaration order.
    pub fn param_slots(&self) -> impl Iterator<Item = &FrameSlot> {
        self.slots.iter().filter(|s| s.kind == SlotKind::Parameter)
    }

    /// The slot declared by `symbol`.
    pub fn slot_of_symbol(&self, symbol: SymbolId) -> Option<&FrameSlot> {
        self.slots.iter().find(|s| s.symbol == Some(symbol))
    }
}

/// Functions whose frames share one base address.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoalesceGroup {
    /// Member functions.
    pub members: Vec<FuncId>,
    /// Bytes reserved: the maximum member frame size.
    pub size: u16,
    /// Shared base address.
    pub base: Option<Addr>,
    /// Shared thread context.
    pub context: ThreadContext,
}

/// Allocation statistics reported alongside the FrameMap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AllocStats {
    /// Sum of raw frame sizes.
    pub raw_bytes: u32,
    /// Frame-region bytes actually reserved after coalescing.
    pub coalesced_bytes: u32,
    /// Zero-page bytes handed out.
    pub zp_used: u16,
    /// Zero-page bytes that were available.
    pub zp_available: u16,
    /// `@zp` directives honored.
    pub zp_required_honored: u32,
    /// Un-annotated slots promoted to zero page by score.
    pub zp_auto: u32,
    /// Slots that wanted zero page but fell back to the frame region.
    pub zp_fallback: u32,
}

impl AllocStats {
    /// Bytes saved by frame coalescing.
    pub fn bytes_saved(&self) -> u32 {
        self.raw_bytes.saturating_sub(self.coalesced_bytes)
    }
}

/// The allocation result: every variable's address, fully resolved.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameMap {
    frames: Vec<Frame>,
    by_name: HashMap<String, usize>,
    /// Coalesce groups, in creation order.
    pub groups: Vec<CoalesceGroup>,
    /// Platform configuration the allocation ran against.
    pub platform: crate::platform::PlatformConfig,
    /// Allocation statistics.
    pub stats: AllocStats,
}

impl FrameMap {
    /// Assemble a map from allocator output. Frame order follows function
    /// declaration order; `frames[i]` belongs to `FuncId(i)` except for
    /// trailing module pseudo-frames.
    pub fn new(
        frames: Vec<Frame>,
        groups: Vec<CoalesceGroup>,
        platform: crate::platform::PlatformConfig,
        stats: AllocStats,
    ) -> Self {
        let by_name = frames
            .iter()
            .enumerate()
            .map(|(i, f)| (f.func.clone(), i))
            .collect();
        Self {
            frames,
            by_name,
            groups,
            platform,
            stats,
        }
    }

    /// The frame of a fully qualified function name.
    pub fn frame(&self, qualified: &str) -> Option<&Frame> {
        self.by_name.get(qualified).map(|&i| &self.frames[i])
    }

    /// The frame of `func`; valid for every registered function id.
    pub fn frame_of(&self, func: FuncId) -> &Frame {
        &self.frames[func.index()]
    }

    /// All frames in declaration order (module pseudo-frames last).
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_ordering_is_monotone() {
        assert!(ZpDirective::Required < ZpDirective::None);
        assert!(ZpDirective::None < ZpDirective::Forbidden);
    }

    #[test]
    fn stats_savings_never_underflow() {
        let stats = AllocStats {
            raw_bytes: 4,
            coalesced_bytes: 10,
            ..AllocStats::default()
        };
        assert_eq!(stats.bytes_saved(), 0);
    }
}
