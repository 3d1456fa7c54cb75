//! The Surface-Area-Heuristic cost model used to compare leaf, object-split,
//! and spatial-split candidates during BVH construction.

/// Per-primitive and per-node cost weights, and the leaf-size bounds the
/// builder must respect while comparing candidates against `leaf_cost`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SahCostModel {
    /// Cost charged per primitive test inside a leaf.
    pub triangle_cost: f32,
    /// Cost charged per child traversed from an inner node.
    pub node_cost: f32,
}

impl Default for SahCostModel {
    fn default() -> Self {
        // Matches Cycles' historical bvh_params defaults.
        Self {
            triangle_cost: 1.0,
            node_cost: 1.0,
        }
    }
}

impl SahCostModel {
    pub const fn new(triangle_cost: f32, node_cost: f32) -> Self {
        Self {
            triangle_cost,
            node_cost,
        }
    }

    /// Cost of a leaf holding `count` primitives: linear in `count`.
    pub fn leaf_cost(&self, count: usize) -> f32 {
        self.triangle_cost * count as f32
    }

    /// Cost of an inner node with `children` children (almost always 2).
    pub fn inner_cost(&self, children: usize) -> f32 {
        self.node_cost * children as f32
    }

    /// `inner_cost(2) + (area_left/area) * leaf_cost(n_left) +
    /// (area_right/area) * leaf_cost(n_right)`, the quantity both the
    /// object-split and spatial-split finders minimize. `area` is the
    /// parent's safe area; when it is zero (degenerate/empty parent) the
    /// ratio terms are dropped to avoid dividing by zero, matching the
    /// behavior of an empty scene producing a trivial leaf.
    pub fn split_cost(&self, parent_area: f32, left_area: f32, n_left: usize, right_area: f32, n_right: usize) -> f32 {
        let inner = self.inner_cost(2);
        if parent_area <= 0.0 {
            return inner;
        }
        inner + (left_area / parent_area) * self.leaf_cost(n_left) + (right_area / parent_area) * self.leaf_cost(n_right)
    }
}
