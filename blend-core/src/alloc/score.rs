//! Phases B and C; directives and zero-page priority scores.
//!
//! The score is a plain integer so that ordering is total and runs are
//! bit-reproducible. Directives do not contribute a numeric bonus; the
//! request sort puts `Required` ahead of everything and `Forbidden` slots
//! never enter the request list, which realizes the same
//! `required > none > forbidden` monotonicity.

use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::frame::{Frame, FrameSlot, ZpDirective};
use crate::platform::CompilerConfig;
use blend_types::{StorageClass, Type};

/// Weight of a pointer-like word (used as a peek/poke address or index).
const WEIGHT_POINTER: u64 = 64;
/// Weight of single-byte scalars.
const WEIGHT_BYTE: u64 = 32;
/// Weight of a plain word.
const WEIGHT_WORD: u64 = 24;
/// Weight of arrays small enough to sit in zero page comfortably.
const WEIGHT_SMALL_ARRAY: u64 = 12;
/// Weight of anything larger.
const WEIGHT_LARGE_ARRAY: u64 = 2;
/// Reads count double, writes triple, capped here.
const ACCESS_CAP: u64 = 96;
/// Loop nesting beyond this depth stops compounding the bonus.
const LOOP_DEPTH_CAP: u32 = 8;
/// `@zp` arrays at or above this size draw a warning.
const LARGE_ZP_ARRAY: u16 = 16;

/// Fill in every slot's directive and score.
pub(super) fn apply_directives_and_scores(
    frames: &mut [Frame],
    config: &CompilerConfig,
    diags: &mut Diagnostics,
) {
    for frame in frames.iter_mut() {
        for slot in &mut frame.slots {
            slot.directive = directive_of(slot);
            if slot.directive == ZpDirective::Required
                && matches!(slot.ty, Type::Array(..))
                && slot.size >= LARGE_ZP_ARRAY
            {
                diags.push(Diagnostic::new(
                    DiagnosticCode::LargeArrayInZp,
                    format!(
                        "`{}.{}` pins {} bytes of array into zero page",
                        frame.func, slot.name, slot.size
                    ),
                ));
            }
            slot.zp_score = score(slot, config.loop_bonus_base);
        }
    }
}

fn directive_of(slot: &FrameSlot) -> ZpDirective {
    // Storage classes live on the declaring variable; return and temporary
    // slots have none.
    match slot.storage {
        StorageClass::Zp => ZpDirective::Required,
        StorageClass::Ram | StorageClass::Data => ZpDirective::Forbidden,
        _ => ZpDirective::None,
    }
}

/// `score = (typeWeight + accessBonus) · base^depth`, which equals
/// `type + access + (type + access) · (base^depth − 1)`.
fn score(slot: &FrameSlot, loop_base: u32) -> u64 {
    let type_weight = match &slot.ty {
        Type::Word if slot.addr_like => WEIGHT_POINTER,
        Type::Byte | Type::Bool => WEIGHT_BYTE,
        Type::Word => WEIGHT_WORD,
        Type::Enum { repr, .. } => match repr.bytes() {
            1 => WEIGHT_BYTE,
            _ => WEIGHT_WORD,
        },
        Type::Array(..) if slot.size <= 4 => WEIGHT_SMALL_ARRAY,
        Type::Array(..) => WEIGHT_LARGE_ARRAY,
        _ => WEIGHT_BYTE,
    };
    let access_bonus = (2 * slot.reads as u64 + 3 * slot.writes as u64).min(ACCESS_CAP);
    let depth = slot.max_loop_depth.min(LOOP_DEPTH_CAP);
    let multiplier = (loop_base.max(1) as u64).pow(depth);
    (type_weight + access_bonus) * multiplier
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SlotKind;
    use blend_types::StorageClass;

    fn slot(ty: Type, reads: u32, writes: u32, depth: u32, addr_like: bool) -> FrameSlot {
        FrameSlot {
            name: "s".to_owned(),
            kind: SlotKind::Local,
            size: ty.size(),
            ty,
            symbol: None,
            storage: StorageClass::Auto,
            directive: ZpDirective::None,
            location: Default::default(),
            address: None,
            offset: 0,
            reads,
            writes,
            max_loop_depth: depth,
            addr_like,
            zp_score: 0,
        }
    }

    #[test]
    fn loop_depth_doubles_the_score() {
        let cold = score(&slot(Type::Byte, 2, 1, 0, false), 2);
        let warm = score(&slot(Type::Byte, 2, 1, 1, false), 2);
        let hot = score(&slot(Type::Byte, 2, 1, 3, false), 2);
        assert_eq!(warm, cold * 2);
        assert_eq!(hot, cold * 8);
    }

    #[test]
    fn pointer_like_words_outscore_plain_words() {
        let plain = score(&slot(Type::Word, 4, 1, 0, false), 2);
        let pointer = score(&slot(Type::Word, 4, 1, 0, true), 2);
        assert!(pointer > plain);
    }

    #[test]
    fn large_arrays_score_near_zero() {
        let array = Type::Array(Box::new(Type::Byte), 200);
        let scalar = score(&slot(Type::Byte, 1, 1, 0, false), 2);
        let bulk = score(&slot(array, 1, 1, 0, false), 2);
        assert!(bulk < scalar);
    }

    #[test]
    fn access_bonus_is_capped() {
        let busy = score(&slot(Type::Byte, 1000, 1000, 0, false), 2);
        assert_eq!(busy, WEIGHT_BYTE + ACCESS_CAP);
    }
}
