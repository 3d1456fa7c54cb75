//! Exact edge-clipping of a primitive's bounds against a splitting plane
//! (spec §4.E.1). This is the seam to scene geometry: the pool only knows
//! bounds, but clipping needs the actual vertices, so callers hand us a
//! [`GeometrySource`] rather than us reaching into a scene type.

use bvh_bounds::{Aabb, Axis, Vec3};
use bvh_refs::PrimitiveRef;

/// The vertex data needed to clip one reference. Curve width is ignored —
/// an acknowledged approximation (spec §4.E.1), not a bug.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimitiveGeometry {
    Triangle([Vec3; 3]),
    CurveSegment([Vec3; 2]),
}

/// Supplies the geometry backing a reference. Implemented by the scene
/// adapter; the split finder and clipper only depend on this trait.
pub trait GeometrySource {
    fn geometry(&self, reference: &PrimitiveRef) -> PrimitiveGeometry;
}

/// Splits `current_bounds` at `axis = plane` into a left and right AABB,
/// using `geometry`'s exact vertices to avoid the over-estimation a naive
/// bounds-only split would produce.
pub fn clip_bounds(geometry: &PrimitiveGeometry, current_bounds: Aabb, axis: Axis, plane: f32) -> (Aabb, Aabb) {
    match geometry {
        PrimitiveGeometry::Triangle(verts) => clip_triangle(verts, axis, plane, current_bounds),
        PrimitiveGeometry::CurveSegment(points) => clip_segment(points, axis, plane, current_bounds),
    }
}

/// Clips a whole reference, returning `(left, right)` copies with only
/// `bounds` differing from the original (spec §4.E.1, last paragraph).
pub fn clip_reference(reference: &PrimitiveRef, geometry: &PrimitiveGeometry, axis: Axis, plane: f32) -> (PrimitiveRef, PrimitiveRef) {
    let (left_bounds, right_bounds) = clip_bounds(geometry, reference.bounds, axis, plane);
    let mut left = *reference;
    left.bounds = left_bounds;
    let mut right = *reference;
    right.bounds = right_bounds;
    (left, right)
}

fn clip_triangle(verts: &[Vec3; 3], axis: Axis, plane: f32, original_bounds: Aabb) -> (Aabb, Aabb) {
    let mut left = Aabb::empty();
    let mut right = Aabb::empty();
    for i in 0..3 {
        let a = verts[i];
        let b = verts[(i + 1) % 3];
        classify_vertex(a, axis, plane, &mut left, &mut right);
        add_crossing(a, b, axis, plane, &mut left, &mut right);
    }
    finish_clip(left, right, axis, plane, original_bounds)
}

fn clip_segment(points: &[Vec3; 2], axis: Axis, plane: f32, original_bounds: Aabb) -> (Aabb, Aabb) {
    let mut left = Aabb::empty();
    let mut right = Aabb::empty();
    for &v in points {
        classify_vertex(v, axis, plane, &mut left, &mut right);
    }
    add_crossing(points[0], points[1], axis, plane, &mut left, &mut right);
    finish_clip(left, right, axis, plane, original_bounds)
}

/// A vertex exactly on the plane belongs to both sides (`<=` / `>=`), which
/// is what lets a single shared vertex keep both clipped bounds valid.
fn classify_vertex(v: Vec3, axis: Axis, plane: f32, left: &mut Aabb, right: &mut Aabb) {
    if v[axis] <= plane {
        left.grow_point(v);
    }
    if v[axis] >= plane {
        right.grow_point(v);
    }
}

fn add_crossing(a: Vec3, b: Vec3, axis: Axis, plane: f32, left: &mut Aabb, right: &mut Aabb) {
    let sa = a[axis] - plane;
    let sb = b[axis] - plane;
    if (sa < 0.0 && sb > 0.0) || (sa > 0.0 && sb < 0.0) {
        let t = sa / (sa - sb);
        let p = a.lerp(b, t);
        left.grow_point(p);
        right.grow_point(p);
    }
}

fn finish_clip(mut left: Aabb, mut right: Aabb, axis: Axis, plane: f32, original_bounds: Aabb) -> (Aabb, Aabb) {
    left.intersect(original_bounds);
    right.intersect(original_bounds);
    if left.valid() {
        left.max[axis] = left.max[axis].min(plane);
    }
    if right.valid() {
        right.min[axis] = right.min[axis].max(plane);
    }
    (left, right)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn box_from(min: Vec3, max: Vec3) -> Aabb {
        Aabb { min, max }
    }

    #[test]
    fn clipping_unit_triangle_at_midplane_splits_bounds_on_axis() {
        let verts = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
        ];
        let original = box_from(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 0.0));
        let (left, right) = clip_triangle(&verts, Axis::X, 1.0, original);

        assert!(left.valid());
        assert!(right.valid());
        assert!(left.max.x <= 1.0);
        assert!(right.min.x >= 1.0);
    }

    #[test]
    fn clipped_sides_stay_within_original_bounds() {
        let verts = [
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(3.0, -1.0, 0.0),
            Vec3::new(-1.0, 3.0, 0.0),
        ];
        let original = box_from(Vec3::new(-1.0, -1.0, 0.0), Vec3::new(3.0, 3.0, 0.0));
        let (left, right) = clip_triangle(&verts, Axis::Y, 0.5, original);

        for side in [left, right] {
            if side.valid() {
                assert!(side.min.x >= original.min.x && side.max.x <= original.max.x);
                assert!(side.min.y >= original.min.y && side.max.y <= original.max.y);
            }
        }
    }

    #[test]
    fn clipping_a_curve_segment_splits_its_two_endpoints() {
        let points = [Vec3::new(0.0, 0.0, 0.0), Vec3::new(4.0, 0.0, 0.0)];
        let original = box_from(points[0], points[1]);
        let (left, right) = clip_segment(&points, Axis::X, 2.0, original);

        assert_eq!(left.min.x, 0.0);
        assert_eq!(left.max.x, 2.0);
        assert_eq!(right.min.x, 2.0);
        assert_eq!(right.max.x, 4.0);
    }

    #[test]
    fn plane_outside_bounds_produces_one_empty_side() {
        let verts = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let original = box_from(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 0.0));
        let (left, right) = clip_triangle(&verts, Axis::X, 5.0, original);

        assert!(left.valid());
        assert!(!right.valid());
    }
}
