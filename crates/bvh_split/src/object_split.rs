//! Per-axis sorted-sweep SAH split finder (spec §4.D). No primitive is
//! duplicated: the active range is simply re-ordered and cut by count.

use bvh_bounds::{Aabb, Axis};
use bvh_refs::{BuildRange, PrimitiveRef, ReferencePool};
use bvh_sah::SahCostModel;

/// The cheapest object split found across the three axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectSplitCandidate {
    pub axis: Axis,
    pub num_left: usize,
    pub left_bounds: Aabb,
    pub right_bounds: Aabb,
    pub sah_cost: f32,
}

fn center_key(r: &PrimitiveRef, axis: Axis) -> f32 {
    r.bounds.min[axis] + r.bounds.max[axis]
}

fn sort_key(r: &PrimitiveRef, axis: Axis) -> (f32, u32, i32) {
    let (object_id, primitive_id) = r.tie_break_key();
    (center_key(r, axis), object_id, primitive_id)
}

/// Evaluates object-split candidates on `refs` for every axis and returns
/// the cheapest. `refs` is a snapshot, not mutated — applying the winning
/// candidate to the pool is a separate step ([`apply_object_split`]) since
/// most axes evaluated here are never applied.
pub fn find_object_split(refs: &[PrimitiveRef], model: &SahCostModel) -> Option<ObjectSplitCandidate> {
    let n = refs.len();
    if n < 2 {
        return None;
    }

    let mut best: Option<ObjectSplitCandidate> = None;

    for axis in Axis::ALL {
        let mut sorted: Vec<PrimitiveRef> = refs.to_vec();
        sorted.sort_by(|a, b| {
            sort_key(a, axis)
                .partial_cmp(&sort_key(b, axis))
                .expect("bounds must not contain NaN")
        });

        // prefix[i] = bounds of sorted[0..i]; suffix[i] = bounds of sorted[i..n].
        let mut prefix = vec![Aabb::empty(); n + 1];
        for i in 0..n {
            prefix[i + 1] = prefix[i];
            prefix[i + 1].grow_box(sorted[i].bounds);
        }
        let mut suffix = vec![Aabb::empty(); n + 1];
        for i in (0..n).rev() {
            suffix[i] = suffix[i + 1];
            suffix[i].grow_box(sorted[i].bounds);
        }

        let parent_area = prefix[n].safe_area();

        for i in 1..n {
            let left_bounds = prefix[i];
            let right_bounds = suffix[i];
            let sah_cost = model.split_cost(parent_area, left_bounds.safe_area(), i, right_bounds.safe_area(), n - i);

            let is_better = match &best {
                None => true,
                Some(current) => sah_cost < current.sah_cost,
            };
            if is_better {
                best = Some(ObjectSplitCandidate {
                    axis,
                    num_left: i,
                    left_bounds,
                    right_bounds,
                    sah_cost,
                });
            }
        }
    }

    best
}

/// Re-sorts the pool's active range by `candidate.axis` and cuts it into
/// two disjoint sub-ranges at `candidate.num_left`. No reference is
/// duplicated (testable property 1).
pub fn apply_object_split(pool: &mut ReferencePool, range: BuildRange, candidate: &ObjectSplitCandidate) -> (BuildRange, BuildRange) {
    let axis = candidate.axis;
    let slice = pool.range_slice_mut(range);
    slice.sort_by(|a, b| {
        sort_key(a, axis)
            .partial_cmp(&sort_key(b, axis))
            .expect("bounds must not contain NaN")
    });

    let left = BuildRange::new(range.start, candidate.num_left, candidate.left_bounds);
    let right = BuildRange::new(range.start + candidate.num_left, range.count - candidate.num_left, candidate.right_bounds);
    (left, right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bvh_bounds::Vec3;

    fn make_ref(object_id: u32, x_lo: f32, x_hi: f32) -> PrimitiveRef {
        PrimitiveRef {
            object_id,
            primitive_id: object_id as i32,
            segment_id: bvh_refs::NO_SEGMENT,
            bounds: Aabb {
                min: Vec3::new(x_lo, 0.0, 0.0),
                max: Vec3::new(x_hi, 1.0, 1.0),
            },
            time_from: 0.0,
            time_to: 1.0,
            visibility: 1,
        }
    }

    #[test]
    fn splits_two_disjoint_clusters_along_their_separating_axis() {
        let model = SahCostModel::default();
        let refs = vec![make_ref(0, 0.0, 1.0), make_ref(1, 2.0, 3.0)];
        let split = find_object_split(&refs, &model).expect("should find a split");

        assert_eq!(split.axis, Axis::X);
        assert_eq!(split.num_left, 1);
    }

    #[test]
    fn single_reference_has_no_split() {
        let model = SahCostModel::default();
        let refs = vec![make_ref(0, 0.0, 1.0)];
        assert!(find_object_split(&refs, &model).is_none());
    }

    #[test]
    fn applying_a_split_conserves_reference_count_and_leaves_pool_len_unchanged() {
        let model = SahCostModel::default();
        let mut pool = ReferencePool::new();
        pool.push(make_ref(0, 0.0, 1.0));
        pool.push(make_ref(1, 2.0, 3.0));
        let range = BuildRange::new(0, 2, Aabb::empty());

        let refs = pool.range_slice(range).to_vec();
        let split = find_object_split(&refs, &model).unwrap();
        let (left, right) = apply_object_split(&mut pool, range, &split);

        assert_eq!(left.count + right.count, range.count);
        assert_eq!(pool.len(), 2);
        assert_eq!(left.start, range.start);
        assert_eq!(right.start, left.end());
    }

    #[test]
    fn sort_is_deterministic_for_colliding_center_keys() {
        let model = SahCostModel::default();
        let refs = vec![make_ref(5, 0.0, 2.0), make_ref(1, 0.0, 2.0), make_ref(3, 0.0, 2.0)];
        let split_a = find_object_split(&refs, &model);
        let split_b = find_object_split(&refs, &model);
        assert_eq!(split_a, split_b);
    }
}
