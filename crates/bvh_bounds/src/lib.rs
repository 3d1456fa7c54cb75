//! Axis-aligned bounding box algebra and the small vector/matrix types it needs.
//!
//! This crate has no dependencies on the rest of the workspace: it is the
//! leaf of the dependency graph that every split finder, build node, and
//! reference type is built on top of.

use std::ops::{Add, Index, IndexMut, Mul, Sub};

/// A 3-component floating point vector, used for positions and extents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::splat(0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub const fn splat(v: f32) -> Self {
        Self { x: v, y: v, z: v }
    }

    pub fn min(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    pub fn max(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    pub fn lerp(self, other: Vec3, t: f32) -> Vec3 {
        self + (other - self) * t
    }

    /// Component access by axis index (0 = x, 1 = y, 2 = z).
    pub fn axis(self, axis: Axis) -> f32 {
        self[axis]
    }
}

impl Index<Axis> for Vec3 {
    type Output = f32;

    fn index(&self, axis: Axis) -> &f32 {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }
}

impl IndexMut<Axis> for Vec3 {
    fn index_mut(&mut self, axis: Axis) -> &mut f32 {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// One of the three principal axes, used to index `Vec3` and to tag split
/// candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub const fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// A 4x4 row-major transform, used only to bound an object whose transform
/// has not been baked into its geometry (see `Aabb::transformed`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4 {
    pub rows: [[f32; 4]; 4],
}

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4 {
        rows: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Transforms a point (implicit w = 1), including perspective divide.
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let r = &self.rows;
        let x = r[0][0] * p.x + r[0][1] * p.y + r[0][2] * p.z + r[0][3];
        let y = r[1][0] * p.x + r[1][1] * p.y + r[1][2] * p.z + r[1][3];
        let z = r[2][0] * p.x + r[2][1] * p.y + r[2][2] * p.z + r[2][3];
        let w = r[3][0] * p.x + r[3][1] * p.y + r[3][2] * p.z + r[3][3];
        if w != 0.0 && w != 1.0 {
            Vec3::new(x / w, y / w, z / w)
        } else {
            Vec3::new(x, y, z)
        }
    }
}

/// An axis-aligned bounding box. An "empty" box has `min = +inf`, `max =
/// -inf` on every axis, so that `grow` converges correctly without a special
/// case for the first point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    pub const fn empty() -> Self {
        Aabb {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn from_point(p: Vec3) -> Self {
        Aabb { min: p, max: p }
    }

    pub fn grow_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn grow_box(&mut self, other: Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Curve variant: grows by `other` expanded by a scalar radius on every
    /// axis, used when bounding curve segments which have width.
    pub fn grow_box_with_radius(&mut self, other: Aabb, radius: f32) {
        let pad = Vec3::splat(radius);
        self.grow_box(Aabb {
            min: other.min - pad,
            max: other.max + pad,
        });
    }

    pub fn intersect(&mut self, other: Aabb) {
        self.min = self.min.max(other.min);
        self.max = self.max.min(other.max);
    }

    pub fn intersected(mut self, other: Aabb) -> Aabb {
        self.intersect(other);
        self
    }

    pub fn valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Surface-area proxy used by the SAH. Does not clamp negative extents;
    /// use `safe_area` after an `intersect` where disjoint boxes are
    /// possible.
    pub fn area(&self) -> f32 {
        let d = self.size();
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Returns 0 when any extent is negative (i.e. the box is the result of
    /// intersecting two disjoint boxes), instead of the in general negative
    /// value `area()` would return. Builders always use this variant so
    /// that a spurious negative never poisons SAH comparisons.
    pub fn safe_area(&self) -> f32 {
        let d = self.size();
        if d.x < 0.0 || d.y < 0.0 || d.z < 0.0 {
            0.0
        } else {
            2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
        }
    }

    /// The AABB of the 8 transformed corners of this box.
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let mut result = Aabb::empty();
        for &xi in &[self.min.x, self.max.x] {
            for &yi in &[self.min.y, self.max.y] {
                for &zi in &[self.min.z, self.max.z] {
                    result.grow_point(matrix.transform_point(Vec3::new(xi, yi, zi)));
                }
            }
        }
        result
    }
}

/// A rigid orthonormal frame (origin + 3 basis axes) used by unaligned BVH
/// nodes to evaluate a split in a rotated coordinate system, and by
/// traversal to transform a ray into that system once per node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedFrame {
    pub origin: Vec3,
    pub axis_x: Vec3,
    pub axis_y: Vec3,
    pub axis_z: Vec3,
}

impl OrientedFrame {
    /// Projects a world-space point into this frame's local coordinates.
    pub fn to_local(&self, p: Vec3) -> Vec3 {
        let d = p - self.origin;
        Vec3::new(dot(d, self.axis_x), dot(d, self.axis_y), dot(d, self.axis_z))
    }
}

fn dot(a: Vec3, b: Vec3) -> f32 {
    a.x * b.x + a.y * b.y + a.z * b.z
}
