//! Split finders: object-split (§4.D), spatial-split with edge-clipping
//! (§4.E), and the unaligned-frame heuristic for hair/curves (§4.F).
//!
//! Each finder only evaluates candidates; applying the winning one to the
//! reference pool is a separate function so the parallel build driver can
//! compare all three kinds of split before committing to one.

pub mod clip;
pub mod object_split;
pub mod spatial_split;
pub mod unaligned;

pub use clip::{clip_bounds, clip_reference, GeometrySource, PrimitiveGeometry};
pub use object_split::{apply_object_split, find_object_split, ObjectSplitCandidate};
pub use spatial_split::{apply_spatial_split, find_spatial_split, overlap_area, spatial_min_overlap, SpatialSplitCandidate, NUM_SPATIAL_BINS};
pub use unaligned::{apply_unaligned_split, fit_oriented_frame, try_unaligned_split, UnalignedSplitCandidate};

#[cfg(test)]
mod bin_clipping_fuzz {
    use super::*;
    use bvh_bounds::{Aabb, Axis, Vec3};
    use proptest::prelude::*;

    /// Testable property 3: clipping a triangle at any plane never produces
    /// a side whose bounds exceed the original, pre-clip bounds on any
    /// axis, regardless of how degenerate the triangle is.
    fn clipped_sides_stay_within_original(verts: [Vec3; 3], axis: Axis, plane: f32) -> bool {
        let mut original = Aabb::empty();
        for v in verts {
            original.grow_point(v);
        }
        let geometry = PrimitiveGeometry::Triangle(verts);
        let (left, right) = clip_bounds(&geometry, original, axis, plane);

        [left, right].into_iter().all(|side| {
            !side.valid()
                || (side.min.x >= original.min.x - 1e-4
                    && side.max.x <= original.max.x + 1e-4
                    && side.min.y >= original.min.y - 1e-4
                    && side.max.y <= original.max.y + 1e-4
                    && side.min.z >= original.min.z - 1e-4
                    && side.max.z <= original.max.z + 1e-4)
        })
    }

    proptest! {
        #[test]
        fn clip_never_overestimates_bounds(
            x0 in -10.0f32..10.0, y0 in -10.0f32..10.0, z0 in -10.0f32..10.0,
            x1 in -10.0f32..10.0, y1 in -10.0f32..10.0, z1 in -10.0f32..10.0,
            x2 in -10.0f32..10.0, y2 in -10.0f32..10.0, z2 in -10.0f32..10.0,
            plane in -10.0f32..10.0,
            axis_index in 0usize..3,
        ) {
            let verts = [Vec3::new(x0, y0, z0), Vec3::new(x1, y1, z1), Vec3::new(x2, y2, z2)];
            let axis = Axis::ALL[axis_index];
            prop_assert!(clipped_sides_stay_within_original(verts, axis, plane));
        }

        #[test]
        fn clip_preserves_union_coverage_of_the_splitting_axis(
            x0 in -10.0f32..10.0, y0 in -10.0f32..10.0, z0 in -10.0f32..10.0,
            x1 in -10.0f32..10.0, y1 in -10.0f32..10.0, z1 in -10.0f32..10.0,
            x2 in -10.0f32..10.0, y2 in -10.0f32..10.0, z2 in -10.0f32..10.0,
            axis_index in 0usize..3,
        ) {
            let verts = [Vec3::new(x0, y0, z0), Vec3::new(x1, y1, z1), Vec3::new(x2, y2, z2)];
            let axis = Axis::ALL[axis_index];
            let mut original = Aabb::empty();
            for v in verts {
                original.grow_point(v);
            }
            // Split exactly at the midpoint of the triangle's extent on this axis.
            let plane = (original.min[axis] + original.max[axis]) * 0.5;
            let geometry = PrimitiveGeometry::Triangle(verts);
            let (left, right) = clip_bounds(&geometry, original, axis, plane);

            let mut reunited = left;
            if right.valid() {
                reunited.grow_box(right);
            }
            // The union of both clipped sides must still cover the original
            // extent on the splitting axis (no primitive mass lost at the seam).
            prop_assert!(reunited.min[axis] <= original.min[axis] + 1e-3);
            prop_assert!(reunited.max[axis] >= original.max[axis] - 1e-3);
        }
    }
}
