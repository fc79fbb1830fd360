//! Result options for query evaluation
//!
//! A small bitset controlling what a query emits and how the emission set is
//! post-processed. `NODUPS` and `SORT` both fold in the internal
//! path-required bit, since neither can be honoured without generating
//! normalized paths during the walk.

use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Options for handling duplicate paths and ordering of results.
///
/// Combine with `|`: `ResultOptions::SORT | ResultOptions::NODUPS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResultOptions(u8);

const PATH_BIT: u8 = 1;
const NODUPS_BIT: u8 = 2;
const SORT_BIT: u8 = 4;

impl ResultOptions {
    /// Emit matched values in document order. The default.
    pub const VALUE: ResultOptions = ResultOptions(0);

    /// Emit normalized path strings instead of values.
    pub const PATH: ResultOptions = ResultOptions(PATH_BIT);

    /// Drop emissions whose normalized path was already emitted.
    pub const NODUPS: ResultOptions = ResultOptions(PATH_BIT | NODUPS_BIT);

    /// Sort emissions by normalized path.
    pub const SORT: ResultOptions = ResultOptions(PATH_BIT | SORT_BIT);

    /// True if every bit of `other` is set in `self`.
    #[inline]
    #[must_use]
    pub fn contains(self, other: ResultOptions) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when the walk has to materialize path nodes.
    #[inline]
    pub(crate) fn path_required(self) -> bool {
        self.0 & PATH_BIT != 0
    }

    #[inline]
    pub(crate) fn nodups(self) -> bool {
        self.0 & NODUPS_BIT != 0
    }

    #[inline]
    pub(crate) fn sort(self) -> bool {
        self.0 & SORT_BIT != 0
    }

    /// Returns these options with the path-required bit forced on.
    #[inline]
    #[must_use]
    pub(crate) fn with_path(self) -> ResultOptions {
        ResultOptions(self.0 | PATH_BIT)
    }
}

impl BitOr for ResultOptions {
    type Output = ResultOptions;

    fn bitor(self, rhs: ResultOptions) -> ResultOptions {
        ResultOptions(self.0 | rhs.0)
    }
}

impl BitOrAssign for ResultOptions {
    fn bitor_assign(&mut self, rhs: ResultOptions) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ResultOptions {
    type Output = ResultOptions;

    fn bitand(self, rhs: ResultOptions) -> ResultOptions {
        ResultOptions(self.0 & rhs.0)
    }
}

#[cfg(test)]
mod options_tests {
    use super::*;

    #[test]
    fn test_nodups_implies_path() {
        assert!(ResultOptions::NODUPS.path_required());
        assert!(ResultOptions::SORT.path_required());
        assert!(!ResultOptions::VALUE.path_required());
    }

    #[test]
    fn test_combination() {
        let opts = ResultOptions::SORT | ResultOptions::NODUPS;
        assert!(opts.sort());
        assert!(opts.nodups());
        assert!(opts.contains(ResultOptions::PATH));
    }
}
