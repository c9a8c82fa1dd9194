//! The deterministic tie-break key used in every merge/destroy decision.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Connectivity weight of a body or of a clump's root body.
///
/// This is the sole tie-breaker for every structural conflict: when two
/// aggregates claim the same joint, the lower-weight side is torn down and
/// re-derived, so churn is biased toward keeping large anchored structures
/// stable.
///
/// Ordering is total and lexicographic: an anchored structure always outranks
/// a free one; among equals the larger weighted size wins. Two weights that
/// compare equal are a genuine tie - identity ordering (stable, never-reused
/// ids) breaks ties where a decision is still required.
///
/// # Example
///
/// ```
/// use cluster_types::Weight;
///
/// let a = Weight::of_body(true, 10.0, 2);
/// let b = Weight::of_body(false, 100.0, 9);
/// assert!(a > b); // anchored dominates size
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Weight {
    /// Whether the structure is anchored (fixed in world space).
    pub anchored: bool,
    /// Planar footprint size times incident joint count, floored.
    pub weighted_size: i64,
}

impl Weight {
    /// The zero weight: free, no size. Used for motors whose endpoints
    /// already share a clump.
    pub const ZERO: Self = Self {
        anchored: false,
        weighted_size: 0,
    };

    /// Compute a body's weight from its anchored flag, planar footprint
    /// size, and incident joint count.
    ///
    /// The footprint is floored before multiplication so that sub-unit
    /// geometry changes do not perturb the ordering.
    #[must_use]
    pub fn of_body(anchored: bool, planar_footprint: f64, joint_count: usize) -> Self {
        debug_assert!(planar_footprint.is_finite());
        debug_assert!(planar_footprint >= 0.0);
        #[allow(clippy::cast_possible_truncation)]
        let floored = planar_footprint.floor() as i64;
        #[allow(clippy::cast_possible_wrap)]
        let joints = joint_count as i64;
        Self {
            anchored,
            weighted_size: floored * joints,
        }
    }

    /// The greater of two weights.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        if self < other {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for Weight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Weight({}, {})",
            if self.anchored { "anchored" } else { "free" },
            self.weighted_size
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_anchored_dominates_size() {
        let small_anchored = Weight::of_body(true, 1.0, 1);
        let huge_free = Weight::of_body(false, 1000.0, 10);
        assert!(small_anchored > huge_free);
    }

    #[test]
    fn test_size_orders_within_class() {
        let a = Weight::of_body(false, 10.0, 2);
        let b = Weight::of_body(false, 5.0, 2);
        assert!(a > b);

        let c = Weight::of_body(true, 10.0, 2);
        let d = Weight::of_body(true, 5.0, 2);
        assert!(c > d);
    }

    #[test]
    fn test_joint_count_scales_size() {
        let one = Weight::of_body(false, 10.0, 1);
        let three = Weight::of_body(false, 10.0, 3);
        assert!(three > one);
        assert_eq!(three.weighted_size, 30);
    }

    #[test]
    fn test_footprint_is_floored() {
        let a = Weight::of_body(false, 10.2, 1);
        let b = Weight::of_body(false, 10.9, 1);
        assert_eq!(a, b);
        assert_eq!(a.weighted_size, 10);
    }

    #[test]
    fn test_equal_weights_tie() {
        let a = Weight::of_body(false, 8.0, 2);
        let b = Weight::of_body(false, 8.0, 2);
        assert_eq!(a.cmp(&b), std::cmp::Ordering::Equal);
    }

    #[test]
    fn test_max() {
        let a = Weight::of_body(false, 8.0, 2);
        let b = Weight::of_body(true, 1.0, 1);
        assert_eq!(a.max(b), b);
        assert_eq!(b.max(a), b);
    }

    #[test]
    fn test_zero_is_minimal_free_weight() {
        assert!(Weight::ZERO <= Weight::of_body(false, 1.0, 1));
        assert!(Weight::ZERO < Weight::of_body(true, 0.0, 0));
    }
}
