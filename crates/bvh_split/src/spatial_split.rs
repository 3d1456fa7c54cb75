//! Binned SAH spatial-split finder with edge-clipping (spec §4.E).

use crate::clip::{clip_bounds, GeometrySource};
use bvh_bounds::{Aabb, Axis};
use bvh_refs::{BuildRange, PrimitiveRef, ReferencePool};
use bvh_sah::SahCostModel;

pub const NUM_SPATIAL_BINS: usize = 32;

/// `root.bounds.area() * spatial_split_alpha` (spec §4.E) — below this
/// overlap area between an object split's two children, spatial splitting
/// is not attempted.
pub fn spatial_min_overlap(root_area: f32, spatial_split_alpha: f32) -> f32 {
    root_area * spatial_split_alpha
}

pub fn overlap_area(left_bounds: Aabb, right_bounds: Aabb) -> f32 {
    left_bounds.intersected(right_bounds).safe_area()
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bin {
    bounds: Aabb,
    enter: usize,
    exit: usize,
}

impl Bin {
    fn empty() -> Self {
        Bin {
            bounds: Aabb::empty(),
            enter: 0,
            exit: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialSplitCandidate {
    pub axis: Axis,
    pub plane_position: f32,
    pub sah_cost: f32,
    pub left_bounds: Aabb,
    pub right_bounds: Aabb,
    pub n_left: usize,
    pub n_right: usize,
}

fn bin_index(coord: f32, lo: f32, bin_size: f32, num_bins: usize) -> usize {
    if bin_size <= 0.0 {
        return 0;
    }
    let raw = ((coord - lo) / bin_size) as isize;
    raw.clamp(0, num_bins as isize - 1) as usize
}

/// Bins `refs` on every axis and returns the cheapest binned-SAH plane.
/// Reference whose bounds span multiple bins are walked bin-by-bin,
/// clipping at each boundary (spec §4.E step 2) so per-bin bounds never
/// overestimate occupancy.
pub fn find_spatial_split<G: GeometrySource>(
    refs: &[PrimitiveRef],
    geometry: &G,
    parent_bounds: Aabb,
    model: &SahCostModel,
    num_bins: usize,
) -> Option<SpatialSplitCandidate> {
    if refs.is_empty() || num_bins < 2 {
        return None;
    }

    let parent_area = parent_bounds.safe_area();
    let mut best: Option<SpatialSplitCandidate> = None;

    for axis in Axis::ALL {
        let lo = parent_bounds.min[axis];
        let hi = parent_bounds.max[axis];
        let extent = hi - lo;
        if !(extent > 0.0) {
            continue;
        }
        let bin_size = extent / num_bins as f32;
        let mut bins = vec![Bin::empty(); num_bins];

        for r in refs {
            let first_bin = bin_index(r.bounds.min[axis], lo, bin_size, num_bins);
            let last_bin = bin_index(r.bounds.max[axis], lo, bin_size, num_bins);
            bins[first_bin].enter += 1;
            bins[last_bin].exit += 1;

            if first_bin == last_bin {
                bins[first_bin].bounds.grow_box(r.bounds);
                continue;
            }

            let geom = geometry.geometry(r);
            let mut remaining = r.bounds;
            for b in first_bin..last_bin {
                let boundary = lo + (b + 1) as f32 * bin_size;
                let (left_part, right_part) = clip_bounds(&geom, remaining, axis, boundary);
                bins[b].bounds.grow_box(left_part);
                remaining = right_part;
            }
            bins[last_bin].bounds.grow_box(remaining);
        }

        let mut prefix = vec![Aabb::empty(); num_bins + 1];
        for i in 0..num_bins {
            prefix[i + 1] = prefix[i];
            prefix[i + 1].grow_box(bins[i].bounds);
        }
        let mut suffix = vec![Aabb::empty(); num_bins + 1];
        for i in (0..num_bins).rev() {
            suffix[i] = suffix[i + 1];
            suffix[i].grow_box(bins[i].bounds);
        }

        let total_enter: usize = bins.iter().map(|b| b.enter).sum();
        let mut n_left = 0usize;
        let mut n_right = total_enter;

        for i in 1..num_bins {
            n_left += bins[i - 1].enter;
            n_right -= bins[i - 1].exit;

            let left_bounds = prefix[i];
            let right_bounds = suffix[i];
            let sah_cost = model.split_cost(parent_area, left_bounds.safe_area(), n_left, right_bounds.safe_area(), n_right);

            let is_better = match &best {
                None => true,
                Some(current) => sah_cost < current.sah_cost,
            };
            if is_better {
                best = Some(SpatialSplitCandidate {
                    axis,
                    plane_position: lo + i as f32 * bin_size,
                    sah_cost,
                    left_bounds,
                    right_bounds,
                    n_left,
                    n_right,
                });
            }
        }
    }

    best
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum StraddlerDecision {
    UnsplitLeft,
    UnsplitRight,
    Duplicate,
}

/// Evaluates the three options for one straddling reference (spec §4.E.2)
/// against the running left/right state and picks the minimum-SAH option.
/// This is exactly what testable property 4 checks.
#[allow(clippy::too_many_arguments)]
fn decide_straddler(
    reference_bounds: Aabb,
    clipped_left: Aabb,
    clipped_right: Aabb,
    axis_plane_parent_area: f32,
    left_bounds: Aabb,
    right_bounds: Aabb,
    n_left: usize,
    n_right: usize,
    model: &SahCostModel,
) -> StraddlerDecision {
    let unsplit_left_bounds = {
        let mut b = left_bounds;
        b.grow_box(reference_bounds);
        b
    };
    let unsplit_right_bounds = {
        let mut b = right_bounds;
        b.grow_box(reference_bounds);
        b
    };
    let dup_left_bounds = {
        let mut b = left_bounds;
        b.grow_box(clipped_left);
        b
    };
    let dup_right_bounds = {
        let mut b = right_bounds;
        b.grow_box(clipped_right);
        b
    };

    let cost_unsplit_left = model.split_cost(
        axis_plane_parent_area,
        unsplit_left_bounds.safe_area(),
        n_left + 1,
        right_bounds.safe_area(),
        n_right,
    );
    let cost_unsplit_right = model.split_cost(
        axis_plane_parent_area,
        left_bounds.safe_area(),
        n_left,
        unsplit_right_bounds.safe_area(),
        n_right + 1,
    );
    let cost_duplicate = model.split_cost(
        axis_plane_parent_area,
        dup_left_bounds.safe_area(),
        n_left + 1,
        dup_right_bounds.safe_area(),
        n_right + 1,
    );

    if cost_unsplit_left <= cost_unsplit_right && cost_unsplit_left <= cost_duplicate {
        StraddlerDecision::UnsplitLeft
    } else if cost_unsplit_right <= cost_duplicate {
        StraddlerDecision::UnsplitRight
    } else {
        StraddlerDecision::Duplicate
    }
}

/// Three-way partitions the pool's active range at `candidate`'s plane,
/// resolving each straddler by the minimum-SAH option, and rewrites the
/// range (growing it by however many references were duplicated) so it
/// remains the pool's suffix throughout (spec §4.E.2, tested property 5).
pub fn apply_spatial_split<G: GeometrySource>(
    pool: &mut ReferencePool,
    range: &mut BuildRange,
    candidate: &SpatialSplitCandidate,
    geometry: &G,
    model: &SahCostModel,
) -> (BuildRange, BuildRange) {
    let axis = candidate.axis;
    let plane = candidate.plane_position;
    let parent_area = range.bounds.safe_area();

    let snapshot: Vec<PrimitiveRef> = pool.range_slice(*range).to_vec();
    let original_count = snapshot.len();

    let mut left_bounds = Aabb::empty();
    let mut right_bounds = Aabb::empty();
    let mut left_items: Vec<PrimitiveRef> = Vec::with_capacity(original_count);
    let mut right_items: Vec<PrimitiveRef> = Vec::with_capacity(original_count);

    for r in snapshot {
        let is_left = r.bounds.max[axis] <= plane;
        let is_right = r.bounds.min[axis] >= plane;

        if is_left && !is_right {
            left_bounds.grow_box(r.bounds);
            left_items.push(r);
            continue;
        }
        if is_right && !is_left {
            right_bounds.grow_box(r.bounds);
            right_items.push(r);
            continue;
        }

        let geom = geometry.geometry(&r);
        let (clipped_left, clipped_right) = clip_bounds(&geom, r.bounds, axis, plane);
        let decision = decide_straddler(
            r.bounds,
            clipped_left,
            clipped_right,
            parent_area,
            left_bounds,
            right_bounds,
            left_items.len(),
            right_items.len(),
            model,
        );

        match decision {
            StraddlerDecision::UnsplitLeft => {
                left_bounds.grow_box(r.bounds);
                left_items.push(r);
            }
            StraddlerDecision::UnsplitRight => {
                right_bounds.grow_box(r.bounds);
                right_items.push(r);
            }
            StraddlerDecision::Duplicate => {
                let mut lref = r;
                lref.bounds = clipped_left;
                let mut rref = r;
                rref.bounds = clipped_right;
                left_bounds.grow_box(clipped_left);
                right_bounds.grow_box(clipped_right);
                left_items.push(lref);
                right_items.push(rref);
            }
        }
    }

    let n_left = left_items.len();
    let n_right = right_items.len();
    let new_count = n_left + n_right;
    let num_duplicates = new_count - original_count;

    for _ in 0..num_duplicates {
        let placeholder = *right_items.last().or(left_items.last()).expect("duplicate implies a non-empty side");
        pool.duplicate_onto_tail(range, placeholder);
    }

    let slice = pool.range_slice_mut(*range);
    for (slot, item) in slice.iter_mut().zip(left_items.iter().chain(right_items.iter())) {
        *slot = *item;
    }

    let left = BuildRange::new(range.start, n_left, left_bounds);
    let right = BuildRange::new(range.start + n_left, n_right, right_bounds);
    let mut combined_bounds = left_bounds;
    combined_bounds.grow_box(right_bounds);
    *range = BuildRange::new(range.start, new_count, combined_bounds);

    (left, right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::PrimitiveGeometry;
    use bvh_bounds::Vec3;
    use bvh_refs::NO_SEGMENT;

    struct TriangleSoup(Vec<[Vec3; 3]>);

    impl GeometrySource for TriangleSoup {
        fn geometry(&self, reference: &PrimitiveRef) -> PrimitiveGeometry {
            PrimitiveGeometry::Triangle(self.0[reference.primitive_id as usize])
        }
    }

    fn tri_ref(primitive_id: i32, verts: [Vec3; 3]) -> (PrimitiveRef, [Vec3; 3]) {
        let mut bounds = Aabb::empty();
        for v in verts {
            bounds.grow_point(v);
        }
        (
            PrimitiveRef {
                object_id: 0,
                primitive_id,
                segment_id: NO_SEGMENT,
                bounds,
                time_from: 0.0,
                time_to: 1.0,
                visibility: 1,
            },
            verts,
        )
    }

    #[test]
    fn overlapping_triangles_in_same_box_find_a_splitting_plane() {
        let model = SahCostModel::default();
        let (r0, v0) = tri_ref(0, [Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)]);
        let (r1, v1) = tri_ref(1, [Vec3::new(1.0, 1.0, 0.0), Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 0.0, 0.0)]);
        let geometry = TriangleSoup(vec![v0, v1]);
        let refs = vec![r0, r1];
        let parent_bounds = Aabb {
            min: Vec3::new(0.0, 0.0, 0.0),
            max: Vec3::new(1.0, 1.0, 0.0),
        };

        let split = find_spatial_split(&refs, &geometry, parent_bounds, &model, 8).expect("should find a bin split");
        assert!(split.plane_position >= parent_bounds.min[split.axis]);
        assert!(split.plane_position <= parent_bounds.max[split.axis]);
    }

    #[test]
    fn applying_a_spatial_split_can_grow_the_pool_via_duplication() {
        let model = SahCostModel::default();
        let (r0, v0) = tri_ref(0, [Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0)]);
        let geometry = TriangleSoup(vec![v0]);

        let mut pool = ReferencePool::new();
        pool.push(r0);
        let mut range = BuildRange::new(0, 1, r0.bounds);

        let candidate = SpatialSplitCandidate {
            axis: Axis::X,
            plane_position: 1.0,
            sah_cost: 0.0,
            left_bounds: Aabb::empty(),
            right_bounds: Aabb::empty(),
            n_left: 0,
            n_right: 0,
        };

        let before_len = pool.len();
        let (left, right) = apply_spatial_split(&mut pool, &mut range, &candidate, &geometry, &model);

        assert!(pool.len() >= before_len);
        assert!(pool.is_suffix(&range));
        assert!(left.count + right.count >= 1);
    }

    #[test]
    fn spatial_min_overlap_scales_with_alpha() {
        assert_eq!(spatial_min_overlap(100.0, 0.1), 10.0);
    }
}
