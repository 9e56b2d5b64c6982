use crate::Dir;

/// The rank differences of a node to its left and right children, `(r(x) - r(left), r(x) -
/// r(right))`, with missing children counted as rank -1.
///
/// Only the pairs that can be observed while the tree is being rebalanced have a variant. A
/// pair outside this set means the rank bookkeeping is broken.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum RankDiffs {
    // Transient after an insertion promoted a child to the rank of its parent.
    D0_1,
    D1_0,
    D0_2,
    D2_0,

    // Legal.
    D1_1,
    D1_2,
    D2_1,
    D2_2,

    // Transient after a deletion or a demotion left a 3-child.
    D1_3,
    D3_1,
    D2_3,
    D3_2,
}

impl RankDiffs {
    pub(crate) fn new(left: i8, right: i8) -> Option<RankDiffs> {
        let diffs = match (left, right) {
            (0, 1) => RankDiffs::D0_1,
            (1, 0) => RankDiffs::D1_0,
            (0, 2) => RankDiffs::D0_2,
            (2, 0) => RankDiffs::D2_0,
            (1, 1) => RankDiffs::D1_1,
            (1, 2) => RankDiffs::D1_2,
            (2, 1) => RankDiffs::D2_1,
            (2, 2) => RankDiffs::D2_2,
            (1, 3) => RankDiffs::D1_3,
            (3, 1) => RankDiffs::D3_1,
            (2, 3) => RankDiffs::D2_3,
            (3, 2) => RankDiffs::D3_2,
            _ => return None,
        };

        Some(diffs)
    }

    /// Returns the rank difference on the `dir` side.
    pub(crate) fn get(self, dir: Dir) -> i8 {
        let (left, right) = self.pair();

        match dir {
            Dir::Left => left,
            Dir::Right => right,
        }
    }

    pub(crate) fn pair(self) -> (i8, i8) {
        match self {
            RankDiffs::D0_1 => (0, 1),
            RankDiffs::D1_0 => (1, 0),
            RankDiffs::D0_2 => (0, 2),
            RankDiffs::D2_0 => (2, 0),
            RankDiffs::D1_1 => (1, 1),
            RankDiffs::D1_2 => (1, 2),
            RankDiffs::D2_1 => (2, 1),
            RankDiffs::D2_2 => (2, 2),
            RankDiffs::D1_3 => (1, 3),
            RankDiffs::D3_1 => (3, 1),
            RankDiffs::D2_3 => (2, 3),
            RankDiffs::D3_2 => (3, 2),
        }
    }

    /// Returns `true` if both differences are 1 or 2.
    pub(crate) fn is_legal(self) -> bool {
        matches!(
            self,
            RankDiffs::D1_1 | RankDiffs::D1_2 | RankDiffs::D2_1 | RankDiffs::D2_2
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_round_trip() {
        for left in -1..=4 {
            for right in -1..=4 {
                if let Some(diffs) = RankDiffs::new(left, right) {
                    assert_eq!(diffs.pair(), (left, right));
                    assert_eq!(diffs.get(Dir::Left), left);
                    assert_eq!(diffs.get(Dir::Right), right);
                }
            }
        }
    }

    #[test]
    fn unreachable_pairs_are_rejected() {
        assert_eq!(RankDiffs::new(0, 0), None);
        assert_eq!(RankDiffs::new(3, 3), None);
        assert_eq!(RankDiffs::new(0, 3), None);
        assert_eq!(RankDiffs::new(4, 1), None);
        assert_eq!(RankDiffs::new(-1, 1), None);
    }

    #[test]
    fn legality() {
        assert!(RankDiffs::D1_1.is_legal());
        assert!(RankDiffs::D2_2.is_legal());
        assert!(!RankDiffs::D0_1.is_legal());
        assert!(!RankDiffs::D3_2.is_legal());
    }
}
