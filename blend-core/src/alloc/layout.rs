//! Phases E and F; address assignment.
//!
//! Phase E walks the frame region in ascending order handing each group a
//! base address, largest group first. Phase F sorts every non-forbidden
//! slot into a request list (`@zp` first, then by descending score) and
//! serves it first-fit from the zero-page pool; whatever stays behind is
//! packed contiguously at its group base.

use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::frame::{AllocStats, CoalesceGroup, Frame, SlotLocation, ZpDirective};
use crate::platform::CompilerConfig;
use blend_asm::Addr;
use itertools::Itertools;

/// Phase E. Returns `None` when the region overflows.
pub(super) fn assign_region_bases(
    frames: &mut [Frame],
    groups: &mut [CoalesceGroup],
    config: &CompilerConfig,
    diags: &mut Diagnostics,
) -> Option<()> {
    let region = config.platform.frame_region.clone();
    let order: Vec<usize> = (0..groups.len())
        .sorted_by(|&a, &b| {
            groups[b]
                .size
                .cmp(&groups[a].size)
                .then_with(|| a.cmp(&b))
        })
        .collect();

    let mut cursor = u32::from(region.start);
    for index in order {
        if config.platform.align_words {
            cursor += cursor & 1;
        }
        let size = groups[index].size;
        if cursor + u32::from(size) > u32::from(region.end) {
            diags.push(Diagnostic::new(
                DiagnosticCode::FrameOverflow,
                format!(
                    "frame region ${:04X}..${:04X} exhausted; {size} more bytes needed",
                    region.start, region.end
                ),
            ));
            return None;
        }
        groups[index].base = Some(Addr::new(cursor as u16));
        cursor += u32::from(size);
    }

    for frame in frames.iter_mut() {
        frame.base = groups[frame.group].base;
    }
    Some(())
}

/// Phase F plus final packing. Returns the allocation statistics, or
/// `None` when an `@zp` directive could not be honored.
pub(super) fn allocate_zero_page(
    frames: &mut [Frame],
    groups: &[CoalesceGroup],
    config: &CompilerConfig,
    diags: &mut Diagnostics,
) -> Option<AllocStats> {
    let mut pool = ZpPool::new(config.platform.zp_pool());
    let mut stats = AllocStats {
        zp_available: pool.remaining(),
        ..AllocStats::default()
    };

    // Request list: every non-forbidden slot, `@zp` ahead of the rest,
    // then descending score, ties by (function, slot) for determinism.
    let requests: Vec<(usize, usize)> = frames
        .iter()
        .enumerate()
        .flat_map(|(f, frame)| {
            frame
                .slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.directive != ZpDirective::Forbidden)
                .map(move |(s, _)| (f, s))
        })
        .sorted_by(|&(fa, sa), &(fb, sb)| {
            let a = &frames[fa].slots[sa];
            let b = &frames[fb].slots[sb];
            a.directive
                .cmp(&b.directive)
                .then_with(|| b.zp_score.cmp(&a.zp_score))
                .then_with(|| frames[fa].func.cmp(&frames[fb].func))
                .then_with(|| a.name.cmp(&b.name))
        })
        .collect();

    let mut failed = false;
    for (f, s) in requests {
        let size = frames[f].slots[s].size;
        match pool.take(size) {
            Some(addr) => {
                let slot = &mut frames[f].slots[s];
                slot.location = SlotLocation::ZeroPage;
                slot.address = Some(Addr::new(addr));
                stats.zp_used += size;
                match slot.directive {
                    ZpDirective::Required => stats.zp_required_honored += 1,
                    _ => stats.zp_auto += 1,
                }
            }
            None => {
                let slot = &frames[f].slots[s];
                if slot.directive == ZpDirective::Required {
                    diags.push(Diagnostic::new(
                        DiagnosticCode::ZpRequiredFailed,
                        format!(
                            "`{}.{}` is `@zp` but {size} contiguous zero-page bytes are not available",
                            frames[f].func, slot.name
                        ),
                    ));
                    failed = true;
                } else {
                    stats.zp_fallback += 1;
                    if slot.max_loop_depth > 0 {
                        diags.push(Diagnostic::new(
                            DiagnosticCode::ZpPreferredFallback,
                            format!(
                                "hot variable `{}.{}` settled for the frame region; zero page is full",
                                frames[f].func, slot.name
                            ),
                        ));
                    }
                }
            }
        }
    }
    if failed {
        return None;
    }

    // Pack the slots that stayed behind contiguously at each frame base.
    for frame in frames.iter_mut() {
        let base = frame.base.map(|b| b.raw()).unwrap_or_default();
        let mut offset = 0u16;
        let mut zp_bytes = 0u16;
        for slot in &mut frame.slots {
            match slot.location {
                SlotLocation::ZeroPage => zp_bytes += slot.size,
                _ => {
                    slot.location = SlotLocation::FrameRegion;
                    slot.offset = offset;
                    slot.address = Some(Addr::new(base + offset));
                    offset += slot.size;
                }
            }
        }
        frame.region_size = offset;
        frame.zp_bytes = zp_bytes;
        stats.raw_bytes += u32::from(frame.raw_size);
    }
    stats.coalesced_bytes = groups.iter().map(|g| u32::from(g.size)).sum();

    Some(stats)
}

/// First-fit contiguous allocator over the zero-page free list.
struct ZpPool {
    free: Vec<u16>,
}

impl ZpPool {
    fn new(free: Vec<u16>) -> Self {
        Self { free }
    }

    fn remaining(&self) -> u16 {
        self.free.len() as u16
    }

    /// Take the first run of `size` consecutive addresses.
    fn take(&mut self, size: u16) -> Option<u16> {
        if size == 0 || (size as usize) > self.free.len() {
            return None;
        }
        let window = size as usize;
        let start = (0..=self.free.len() - window).find(|&i| {
            let first = self.free[i];
            (1..window).all(|k| self.free[i + k] == first + k as u16)
        })?;
        let addr = self.free[start];
        self.free.drain(start..start + window);
        Some(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_is_first_fit_and_contiguous() {
        // A hole at 0x05 splits the range.
        let mut pool = ZpPool::new(vec![0x02, 0x03, 0x04, 0x06, 0x07]);
        assert_eq!(pool.take(2), Some(0x02));
        assert_eq!(pool.take(2), Some(0x06));
        // Only 0x04 is left; a pair no longer fits.
        assert_eq!(pool.take(2), None);
        assert_eq!(pool.take(1), Some(0x04));
        assert_eq!(pool.remaining(), 0);
    }
}
