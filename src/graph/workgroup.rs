//! Workgroup sizing.
//!
//! Picks a local size for a global dispatch size. Linear work (buffers) gets
//! a 64-wide row and volumetric work a 4×4×4 cube. Planar work (depth 1)
//! gets a flat group, wider when the plane is short. Each axis is then clamped to `[1, global]` and the group is
//! shrunk, largest axis first, until it fits the invocation limit.

use crate::config::DEFAULT_MAX_WORKGROUP_INVOCATIONS;
use crate::graph::tensor::UVec3;

/// [`adaptive_work_group_size_with_limit`] with the default invocation cap.
#[must_use]
pub fn adaptive_work_group_size(global: UVec3) -> UVec3 {
    adaptive_work_group_size_with_limit(global, DEFAULT_MAX_WORKGROUP_INVOCATIONS)
}

/// Local size for `global`, using at most `max_invocations` per group.
///
/// Always `1 <= local[i]`, and `local[i] <= global[i]` whenever
/// `global[i] >= 1`. A zero-sized axis gets 1.
#[must_use]
pub fn adaptive_work_group_size_with_limit(global: UVec3, max_invocations: u32) -> UVec3 {
    let preferred: UVec3 = if global[1] == 1 && global[2] == 1 {
        [64, 1, 1]
    } else if global[2] > 1 {
        [4, 4, 4]
    } else if global[1] < 8 {
        [16, 4, 1]
    } else {
        [8, 8, 1]
    };

    let mut local = [0, 1, 2].map(|i| preferred[i].min(global[i]).max(1));

    let limit = u64::from(max_invocations.max(1));
    while local.iter().map(|&l| u64::from(l)).product::<u64>() > limit {
        let largest = (0..3).fold(0, |best, i| if local[i] > local[best] { i } else { best });
        local[largest] = (local[largest] / 2).max(1);
    }
    local
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn volumetric_prefers_cube() {
        assert_eq!(adaptive_work_group_size([32, 32, 8]), [4, 4, 4]);
    }

    #[test]
    fn linear_fills_the_group() {
        assert_eq!(adaptive_work_group_size([4096, 1, 1]), [64, 1, 1]);
        assert_eq!(adaptive_work_group_size([10, 1, 1]), [10, 1, 1]);
        assert_eq!(adaptive_work_group_size_with_limit([4096, 1, 1], 16), [16, 1, 1]);
    }

    #[test]
    fn planar_shapes() {
        assert_eq!(adaptive_work_group_size([64, 4, 1]), [16, 4, 1]);
        assert_eq!(adaptive_work_group_size([64, 64, 1]), [8, 8, 1]);
    }

    #[test]
    fn small_axes_degrade() {
        assert_eq!(adaptive_work_group_size([3, 2, 1]), [3, 2, 1]);
        assert_eq!(adaptive_work_group_size([1, 1, 1]), [1, 1, 1]);
        assert_eq!(adaptive_work_group_size([2, 0, 5]), [2, 1, 4]);
    }

    #[test]
    fn invocation_limit_shrinks_largest_axis() {
        assert_eq!(adaptive_work_group_size_with_limit([64, 64, 1], 16), [4, 4, 1]);
        assert_eq!(adaptive_work_group_size_with_limit([64, 64, 64], 8), [2, 2, 2]);
    }

    proptest! {
        #[test]
        fn local_within_bounds(
            x in 1u32..4096,
            y in 1u32..4096,
            z in 1u32..256,
            limit in 1u32..1024,
        ) {
            let local = adaptive_work_group_size_with_limit([x, y, z], limit);
            let global = [x, y, z];
            for i in 0..3 {
                prop_assert!(local[i] >= 1);
                prop_assert!(local[i] <= global[i]);
            }
            prop_assert!(local.iter().product::<u32>() <= limit);
        }

        #[test]
        fn deterministic(x in 0u32..512, y in 0u32..512, z in 0u32..64) {
            prop_assert_eq!(
                adaptive_work_group_size([x, y, z]),
                adaptive_work_group_size([x, y, z])
            );
        }
    }
}
