//! Source locations.

use core::fmt;

/// Index of a source unit within a compilation.
pub type UnitId = u16;

/// A half-open byte range in one source unit, with the line and column of
/// its start for human-readable output.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    /// Source unit the span belongs to.
    pub unit: UnitId,
    /// Byte offset of the first character.
    pub lo: u32,
    /// Byte offset one past the last character.
    pub hi: u32,
    /// 1-based line of `lo`.
    pub line: u32,
    /// 1-based column of `lo`.
    pub column: u32,
}

impl Span {
    /// Construct a span.
    pub const fn new(unit: UnitId, lo: u32, hi: u32, line: u32, column: u32) -> Self {
        Self {
            unit,
            lo,
            hi,
            line,
            column,
        }
    }

    /// A span covering both `self` and `other`.
    ///
    /// Both spans must belong to the same unit; the earlier start wins the
    /// line/column fields.
    pub fn to(self, other: Span) -> Span {
        let (first, _) = if self.lo <= other.lo {
            (self, other)
        } else {
            (other, self)
        };
        Span {
            unit: self.unit,
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
            line: first.line,
            column: first.column,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_keeps_earlier_position() {
        let a = Span::new(0, 10, 14, 2, 3);
        let b = Span::new(0, 20, 25, 3, 1);
        let j = a.to(b);
        assert_eq!((j.lo, j.hi), (10, 25));
        assert_eq!((j.line, j.column), (2, 3));
        assert_eq!(j, b.to(a).to(a));
    }
}
