//! The static frame allocator.
//!
//! Runs only when the call graph is recursion-free. Six phases, in order:
//!
//! 1. **Size**: build each function's ordered slot list (parameters,
//!    return, locals, temporaries) and reject oversized frames.
//! 2. **Directives**: turn storage classes into zero-page directives.
//! 3. **Score**: compute an integer zero-page priority per slot.
//! 4. **Coalesce**: greedily group frames that can never be live at the
//!    same time, largest first.
//! 5. **Region**: assign every group a base address in the platform's
//!    frame region.
//! 6. **Zero page**: hand the zero-page pool to the highest-priority
//!    slots, then pack the remaining slots contiguously at their group
//!    base.
//!
//! Any `FrameOverflow` or `ZpRequiredFailed` discards all partial output;
//! the pipeline never sees a half-allocated FrameMap.

mod coalesce;
mod layout;
mod score;
mod size;

pub(crate) use size::trivial_operand;

use crate::ast::Ast;
use crate::callgraph::CallGraph;
use crate::cfg::AccessMap;
use crate::diagnostics::Diagnostics;
use crate::frame::{FrameMap, SlotLocation, ZpDirective};
use crate::funcs::FuncRegistry;
use crate::platform::CompilerConfig;
use crate::symtab::SymbolTable;
use crate::typecheck::Analysis;

/// Run the allocator. Returns `None` when a fatal diagnostic was emitted;
/// partial results are discarded.
pub fn allocate(
    ast: &Ast,
    table: &SymbolTable,
    funcs: &FuncRegistry,
    analysis: &Analysis,
    access: &AccessMap,
    graph: &CallGraph,
    config: &CompilerConfig,
    diags: &mut Diagnostics,
) -> Option<FrameMap> {
    if graph.has_recursion() {
        // The driver gates on this; guard anyway.
        return None;
    }

    // Phase A.
    let mut frames = size::build_frames(ast, table, funcs, analysis, access, graph, config, diags)?;

    // Phases B and C.
    score::apply_directives_and_scores(&mut frames, config, diags);

    // Phase D.
    let mut groups = coalesce::build_groups(&mut frames, funcs, graph);

    // Phase E.
    layout::assign_region_bases(&mut frames, &mut groups, config, diags)?;

    // Phase F and final packing.
    let stats = layout::allocate_zero_page(&mut frames, &groups, config, diags)?;

    let map = FrameMap::new(frames, groups, config.platform.clone(), stats);
    if let Err(violation) = verify(&map) {
        tracing::warn!(%violation, "frame map failed self-check");
    }
    tracing::debug!(
        frames = map.frames().len(),
        saved = map.stats.bytes_saved(),
        zp_used = map.stats.zp_used,
        "frame allocation complete"
    );
    Some(map)
}

/// Check the allocator's own output invariants.
///
/// Every slot is placed at a nonzero address; frame-region offsets are
/// contiguous from 0 and resolve to `base + offset`; groups are at least as
/// large as their largest member; `@zp` slots are in zero page; no two
/// slots collide unless they sit in different frames of one coalesce group.
pub fn verify(map: &FrameMap) -> Result<(), String> {
    for frame in map.frames() {
        let base = frame
            .base
            .ok_or_else(|| format!("frame {} has no base", frame.func))?;
        let mut offset = 0u16;
        for slot in &frame.slots {
            let addr = slot
                .address
                .ok_or_else(|| format!("slot {}.{} unplaced", frame.func, slot.name))?;
            if addr.raw() == 0 {
                return Err(format!("slot {}.{} at address zero", frame.func, slot.name));
            }
            match slot.location {
                SlotLocation::FrameRegion => {
                    if slot.offset != offset {
                        return Err(format!(
                            "slot {}.{} offset {} expected {offset}",
                            frame.func, slot.name, slot.offset
                        ));
                    }
                    if addr.raw() != base.raw() + slot.offset {
                        return Err(format!(
                            "slot {}.{} address {} is not base+offset",
                            frame.func,
                            slot.name,
                            addr.raw()
                        ));
                    }
                    offset += slot.size;
                }
                SlotLocation::ZeroPage => {
                    if slot.directive == ZpDirective::Forbidden {
                        return Err(format!(
                            "forbidden slot {}.{} in zero page",
                            frame.func, slot.name
                        ));
                    }
                }
                SlotLocation::Unassigned => {
                    return Err(format!("slot {}.{} unassigned", frame.func, slot.name));
                }
            }
            if slot.directive == ZpDirective::Required
                && slot.location != SlotLocation::ZeroPage
            {
                return Err(format!(
                    "required slot {}.{} missed zero page",
                    frame.func, slot.name
                ));
            }
        }
        if offset != frame.region_size {
            return Err(format!(
                "frame {} region size {} but packed {offset}",
                frame.func, frame.region_size
            ));
        }
    }

    for group in &map.groups {
        let largest = group
            .members
            .iter()
            .map(|&m| map.frame_of(m).raw_size)
            .max()
            .unwrap_or(0);
        if group.size < largest {
            return Err(format!(
                "group of {} bytes smaller than member of {largest}",
                group.size
            ));
        }
    }

    // Pairwise overlap: only frames of the same group may collide, and
    // only in the frame region.
    let mut placed: Vec<(u16, u16, usize, &str)> = Vec::new();
    for frame in map.frames() {
        for slot in &frame.slots {
            let Some(addr) = slot.address else { continue };
            if slot.size == 0 {
                continue;
            }
            let lo = addr.raw();
            let hi = lo + slot.size - 1;
            for &(other_lo, other_hi, other_group, other_func) in &placed {
                let overlap = lo <= other_hi && other_lo <= hi;
                if !overlap {
                    continue;
                }
                let same_group = frame.group == other_group;
                let different_frame = frame.func != other_func;
                if !(same_group && different_frame) {
                    return Err(format!(
                        "slot {}.{} overlaps another slot at ${lo:04X}",
                        frame.func, slot.name
                    ));
                }
            }
            placed.push((lo, hi, frame.group, frame.func.as_str()));
        }
    }
    Ok(())
}
