//! Phase D: coalesce groups.
//!
//! Greedy first-fit over functions sorted by raw frame size, largest
//! first. Two frames may share a base only when neither function can be on
//! the call stack while the other runs: same single thread context, and no
//! transitive caller relationship in either direction. Exact packing is
//! NP-hard; first-fit with the qualified-name tie-break is deterministic
//! and close enough in practice.

use crate::callgraph::CallGraph;
use crate::frame::{CoalesceGroup, Frame};
use crate::funcs::FuncRegistry;
use blend_types::FuncId;
use itertools::Itertools;

/// Group every frame. Frame `group` indices are filled in; module
/// pseudo-frames (ids past the registry) always end up alone because their
/// context is `both`.
pub(super) fn build_groups(
    frames: &mut [Frame],
    funcs: &FuncRegistry,
    graph: &CallGraph,
) -> Vec<CoalesceGroup> {
    let order: Vec<FuncId> = (0..frames.len())
        .map(FuncId::from_usize)
        .sorted_by(|&a, &b| {
            frames[b.index()]
                .raw_size
                .cmp(&frames[a.index()].raw_size)
                .then_with(|| frames[a.index()].func.cmp(&frames[b.index()].func))
        })
        .collect();

    let mut groups: Vec<CoalesceGroup> = Vec::new();

    for id in order {
        let frame = &frames[id.index()];
        // Recursive functions never reach the allocator; guard regardless.
        if id.index() < funcs.len() && graph.node(id).recursive {
            continue;
        }
        let joined = groups.iter_mut().enumerate().find(|(_, group)| {
            frame.context.coalescable()
                && group.context == frame.context
                && group
                    .members
                    .iter()
                    .all(|&member| compatible(id, member, funcs, graph))
        });
        let raw_size = frame.raw_size;
        let context = frame.context;
        match joined {
            Some((index, group)) => {
                group.members.push(id);
                group.size = group.size.max(raw_size);
                frames[id.index()].group = index;
            }
            None => {
                frames[id.index()].group = groups.len();
                groups.push(CoalesceGroup {
                    members: vec![id],
                    size: raw_size,
                    base: None,
                    context,
                });
            }
        }
    }

    groups
}

/// Whether `a` and `b` can never be live simultaneously: neither appears
/// in the other's transitive caller set.
fn compatible(a: FuncId, b: FuncId, funcs: &FuncRegistry, graph: &CallGraph) -> bool {
    // Module pseudo-frames have no call graph node; their `both` context
    // already keeps them out of every group.
    if a.index() >= funcs.len() || b.index() >= funcs.len() {
        return false;
    }
    !graph.node(a).transitive_callers.contains(&b)
        && !graph.node(b).transitive_callers.contains(&a)
}
