//! Unaligned (oriented-frame) split heuristic for hair/curve-dominated
//! ranges (spec §4.F). A directional fit of the reference centers gives an
//! alternative frame; an object-split SAH evaluated in that frame replaces
//! the aligned candidate only when it wins by more than a configured
//! margin.

use bvh_bounds::{Aabb, OrientedFrame, Vec3};
use bvh_refs::{BuildRange, PrimitiveRef, ReferencePool};
use bvh_sah::SahCostModel;

use crate::object_split::{find_object_split, ObjectSplitCandidate};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnalignedSplitCandidate {
    pub frame: OrientedFrame,
    /// The axis/count/bounds/cost of the winning split, expressed in the
    /// frame's local coordinates (not world space).
    pub local_split: ObjectSplitCandidate,
}

/// Fits an oriented frame to `refs`' centers via the dominant eigenvector
/// of their covariance (power iteration — no dependency on a linear-algebra
/// crate is warranted for a 3x3 matrix), completed to an orthonormal basis.
pub fn fit_oriented_frame(refs: &[PrimitiveRef]) -> OrientedFrame {
    let origin = centroid(refs);
    let covariance = covariance_matrix(refs, origin);
    let axis_x = dominant_eigenvector(covariance);
    let (axis_y, axis_z) = orthonormal_basis(axis_x);
    OrientedFrame { origin, axis_x, axis_y, axis_z }
}

fn centroid(refs: &[PrimitiveRef]) -> Vec3 {
    let mut sum = Vec3::ZERO;
    for r in refs {
        sum = sum + r.bounds.center();
    }
    sum * (1.0 / refs.len().max(1) as f32)
}

fn covariance_matrix(refs: &[PrimitiveRef], origin: Vec3) -> [[f32; 3]; 3] {
    let mut m = [[0.0f32; 3]; 3];
    for r in refs {
        let d = r.bounds.center() - origin;
        let comp = [d.x, d.y, d.z];
        for i in 0..3 {
            for j in 0..3 {
                m[i][j] += comp[i] * comp[j];
            }
        }
    }
    m
}

fn apply_matrix(m: &[[f32; 3]; 3], v: Vec3) -> Vec3 {
    Vec3::new(
        m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
        m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
        m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
    )
}

fn dominant_eigenvector(m: [[f32; 3]; 3]) -> Vec3 {
    let mut v = Vec3::new(1.0, 0.0, 0.0);
    for _ in 0..16 {
        let next = apply_matrix(&m, v);
        v = normalize(next).unwrap_or(v);
    }
    v
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(a.y * b.z - a.z * b.y, a.z * b.x - a.x * b.z, a.x * b.y - a.y * b.x)
}

fn normalize(v: Vec3) -> Option<Vec3> {
    let len = (v.x * v.x + v.y * v.y + v.z * v.z).sqrt();
    if len > 1e-8 {
        Some(v * (1.0 / len))
    } else {
        None
    }
}

fn orthonormal_basis(axis_x: Vec3) -> (Vec3, Vec3) {
    let seed = if axis_x.x.abs() < 0.9 { Vec3::new(1.0, 0.0, 0.0) } else { Vec3::new(0.0, 1.0, 0.0) };
    let axis_y = normalize(cross(axis_x, seed)).unwrap_or(Vec3::new(0.0, 1.0, 0.0));
    let axis_z = cross(axis_x, axis_y);
    (axis_y, axis_z)
}

/// The AABB of `bounds`' 8 corners, projected into `frame`'s local space.
fn local_bounds(frame: &OrientedFrame, bounds: Aabb) -> Aabb {
    let mut result = Aabb::empty();
    for &xi in &[bounds.min.x, bounds.max.x] {
        for &yi in &[bounds.min.y, bounds.max.y] {
            for &zi in &[bounds.min.z, bounds.max.z] {
                result.grow_point(frame.to_local(Vec3::new(xi, yi, zi)));
            }
        }
    }
    result
}

/// Evaluates an unaligned split and returns it only if its SAH cost beats
/// `aligned_cost` by at least `gain_threshold` (a fraction, e.g. `0.05` for
/// a 5% improvement requirement).
pub fn try_unaligned_split(refs: &[PrimitiveRef], aligned_cost: f32, model: &SahCostModel, gain_threshold: f32) -> Option<UnalignedSplitCandidate> {
    if refs.len() < 2 {
        return None;
    }

    let frame = fit_oriented_frame(refs);
    let local_refs: Vec<PrimitiveRef> = refs
        .iter()
        .map(|r| {
            let mut local = *r;
            local.bounds = local_bounds(&frame, r.bounds);
            local
        })
        .collect();

    let local_split = find_object_split(&local_refs, model)?;
    if local_split.sah_cost <= aligned_cost * (1.0 - gain_threshold) {
        Some(UnalignedSplitCandidate { frame, local_split })
    } else {
        None
    }
}

/// Re-sorts the pool's active range by the candidate's local-frame split
/// axis and cuts it at `local_split.num_left`, recomputing each side's
/// *world-space* bounds (the local-frame bounds recorded on the candidate
/// are only valid for cost comparison, not for the node itself).
pub fn apply_unaligned_split(pool: &mut ReferencePool, range: BuildRange, candidate: &UnalignedSplitCandidate) -> (BuildRange, BuildRange) {
    let frame = candidate.frame;
    let axis = candidate.local_split.axis;
    let slice = pool.range_slice_mut(range);
    slice.sort_by(|a, b| {
        let ka = local_sort_key(&frame, axis, a.bounds);
        let kb = local_sort_key(&frame, axis, b.bounds);
        ka.partial_cmp(&kb)
            .expect("bounds must not contain NaN")
            .then_with(|| a.tie_break_key().cmp(&b.tie_break_key()))
    });

    let num_left = candidate.local_split.num_left;
    let (left_slice, right_slice) = slice.split_at(num_left);
    let mut left_bounds = Aabb::empty();
    for r in left_slice {
        left_bounds.grow_box(r.bounds);
    }
    let mut right_bounds = Aabb::empty();
    for r in right_slice {
        right_bounds.grow_box(r.bounds);
    }

    let left = BuildRange::new(range.start, num_left, left_bounds);
    let right = BuildRange::new(range.start + num_left, range.count - num_left, right_bounds);
    (left, right)
}

fn local_sort_key(frame: &OrientedFrame, axis: bvh_bounds::Axis, bounds: Aabb) -> f32 {
    let local = local_bounds(frame, bounds);
    local.min[axis] + local.max[axis]
}
