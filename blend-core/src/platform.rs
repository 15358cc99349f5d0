//! Target platform memory configuration.
//!
//! The allocator never hard-codes addresses; everything it places lands
//! inside the intervals configured here. Presets exist for the Commodore 64
//! and the Commander X16; `custom` builds anything else.

use core::ops::Range;

/* C64 MEMORY MAP */

/// First byte of the default C64 frame region (above the hardware stack).
pub const C64_FRAME_START: u16 = 0x0200;

/// One past the last byte of the default C64 frame region.
pub const C64_FRAME_END: u16 = 0x0400;

/// First allocatable C64 zero-page byte ($00/$01 are the CPU port).
pub const C64_ZP_START: u16 = 0x02;

/// One past the last allocatable C64 zero-page byte.
pub const C64_ZP_END: u16 = 0x90;

/// Code-generator scratch bytes, never handed to user slots.
pub const C64_ZP_SCRATCH: Range<u16> = 0xFB..0x100;

/* X16 MEMORY MAP */

/// First byte of the default X16 frame region.
pub const X16_FRAME_START: u16 = 0x0400;

/// One past the last byte of the default X16 frame region.
pub const X16_FRAME_END: u16 = 0x0800;

/// First allocatable X16 zero-page byte ($00/$01 bank registers,
/// $02..$21 kernal/BASIC API registers).
pub const X16_ZP_START: u16 = 0x22;

/// One past the last allocatable X16 zero-page byte.
pub const X16_ZP_END: u16 = 0x80;

/// The hardware stack on every 6502.
pub const HW_STACK: Range<u16> = 0x0100..0x0200;

/// Compilation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Target {
    /// Commodore 64.
    C64,
    /// Commander X16.
    X16,
    /// User-supplied memory map.
    Custom,
}

/// Memory layout the static frame allocator works against.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlatformConfig {
    /// Which machine this layout describes.
    pub target: Target,
    /// Frame region interval, half open.
    pub frame_region: Range<u16>,
    /// Allocatable zero-page interval, half open.
    pub zp_range: Range<u16>,
    /// Individually reserved zero-page addresses inside `zp_range`.
    pub zp_reserved: Vec<u16>,
    /// Zero-page scratch interval kept for the code generator.
    pub zp_scratch: Range<u16>,
    /// Hardware stack interval; never allocated.
    pub hw_stack: Range<u16>,
    /// Align word-sized frame slots to even addresses.
    pub align_words: bool,
}

impl PlatformConfig {
    /// The recommended Commodore 64 layout.
    pub fn c64() -> Self {
        Self {
            target: Target::C64,
            frame_region: C64_FRAME_START..C64_FRAME_END,
            zp_range: C64_ZP_START..C64_ZP_END,
            zp_reserved: Vec::new(),
            zp_scratch: C64_ZP_SCRATCH,
            hw_stack: HW_STACK,
            align_words: false,
        }
    }

    /// The recommended Commander X16 layout.
    pub fn x16() -> Self {
        Self {
            target: Target::X16,
            frame_region: X16_FRAME_START..X16_FRAME_END,
            zp_range: X16_ZP_START..X16_ZP_END,
            zp_reserved: Vec::new(),
            zp_scratch: 0x00..0x00,
            hw_stack: HW_STACK,
            align_words: false,
        }
    }

    /// A custom layout.
    pub fn custom(frame_region: Range<u16>, zp_range: Range<u16>) -> Self {
        Self {
            target: Target::Custom,
            frame_region,
            zp_range,
            zp_reserved: Vec::new(),
            zp_scratch: 0x00..0x00,
            hw_stack: HW_STACK,
            align_words: false,
        }
    }

    /// Zero-page addresses available for allocation, ascending.
    pub fn zp_pool(&self) -> Vec<u16> {
        self.zp_range
            .clone()
            .filter(|addr| !self.zp_reserved.contains(addr) && !self.zp_scratch.contains(addr))
            .collect()
    }

    /// Total frame-region capacity in bytes.
    pub fn frame_capacity(&self) -> u16 {
        self.frame_region.end - self.frame_region.start
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::c64()
    }
}

/// Knobs of the whole middle-end.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Target memory layout.
    pub platform: PlatformConfig,
    /// Maximum raw frame size before `FrameOverflow` (bytes).
    pub max_frame_size: u16,
    /// Call depth beyond which `DeepCallStack` warns.
    pub call_depth_warning: u32,
    /// Base of the zero-page loop bonus (`base^depth - 1`).
    pub loop_bonus_base: u32,
    /// Module name assumed for units without a `module` declaration.
    pub default_module: String,
    /// Frames at or above this many bytes draw a `LargeFrame` warning.
    pub large_frame_warning: u16,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            platform: PlatformConfig::default(),
            max_frame_size: 256,
            call_depth_warning: 16,
            loop_bonus_base: 2,
            default_module: "Main".to_owned(),
            large_frame_warning: 128,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c64_pool_excludes_reserved_and_scratch() {
        let mut config = PlatformConfig::c64();
        config.zp_reserved = vec![0x10, 0x11];
        let pool = config.zp_pool();
        assert!(pool.contains(&0x02));
        assert!(!pool.contains(&0x00));
        assert!(!pool.contains(&0x10));
        assert!(!pool.contains(&0xFB));
        assert_eq!(config.frame_capacity(), 0x200);
    }

    #[test]
    fn presets_are_well_formed() {
        for config in [PlatformConfig::c64(), PlatformConfig::x16()] {
            assert!(config.frame_region.start < config.frame_region.end);
            assert!(config.zp_range.end <= 0x100);
            assert!(!config.zp_pool().is_empty());
        }
    }
}
