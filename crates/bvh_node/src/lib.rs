//! Build node model: the inner/leaf node tree produced by the BVH builder,
//! its bottom-up rollups, and the visitor-style queries used by tests and by
//! post-build tree rotation.

use bvh_bounds::{Aabb, OrientedFrame};
use bvh_sah::SahCostModel;

/// A leaf node: a contiguous `[lo, hi)` slice into the build's output
/// `prim_index`/`prim_object` arrays, plus the rolled-up bounds, visibility,
/// and motion time range of everything it references.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeafNode {
    pub bounds: Aabb,
    pub visibility_mask: u32,
    pub time_from: f32,
    pub time_to: f32,
    pub prim_start: u32,
    pub prim_end: u32,
}

impl LeafNode {
    pub fn prim_count(&self) -> usize {
        (self.prim_end - self.prim_start) as usize
    }
}

/// An inner node: rolled-up bounds/visibility/time over both children, plus
/// whether this split (or one beneath it) used an unaligned frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InnerNode {
    pub bounds: Aabb,
    pub visibility_mask: u32,
    pub time_from: f32,
    pub time_to: f32,
    pub is_unaligned: bool,
    pub frame: Option<OrientedFrame>,
    pub left: Box<Node>,
    pub right: Box<Node>,
}

/// A build node: either a leaf or an inner node with two owned children.
/// Sole ownership (parent owns children, root owned by the build's caller)
/// replaces the source's raw child pointers with a plain recursive `enum`,
/// per the redesign note in spec.md §9.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(LeafNode),
    Inner(InnerNode),
}

impl Node {
    pub fn bounds(&self) -> Aabb {
        match self {
            Node::Leaf(l) => l.bounds,
            Node::Inner(i) => i.bounds,
        }
    }

    pub fn visibility_mask(&self) -> u32 {
        match self {
            Node::Leaf(l) => l.visibility_mask,
            Node::Inner(i) => i.visibility_mask,
        }
    }

    pub fn time_range(&self) -> (f32, f32) {
        match self {
            Node::Leaf(l) => (l.time_from, l.time_to),
            Node::Inner(i) => (i.time_from, i.time_to),
        }
    }

    pub fn is_unaligned(&self) -> bool {
        match self {
            Node::Leaf(_) => false,
            Node::Inner(i) => i.is_unaligned,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Builds an inner node from two children, rolling up bounds
    /// (union, invariant 3), visibility (OR, invariant 4), and time bounds
    /// (min/max). `is_unaligned` flags whether *this* split's frame is
    /// unaligned; the stored flag additionally propagates true if either
    /// child subtree is unaligned, per spec.md §4.G.
    pub fn new_inner(left: Node, right: Node, is_unaligned: bool, frame: Option<OrientedFrame>) -> Node {
        let mut bounds = left.bounds();
        bounds.grow_box(right.bounds());
        let visibility_mask = left.visibility_mask() | right.visibility_mask();
        let (lf, lt) = left.time_range();
        let (rf, rt) = right.time_range();
        let time_from = lf.min(rf);
        let time_to = lt.max(rt);
        let propagated_unaligned = is_unaligned || left.is_unaligned() || right.is_unaligned();
        Node::Inner(InnerNode {
            bounds,
            visibility_mask,
            time_from,
            time_to,
            is_unaligned: propagated_unaligned,
            frame,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// Depth of the deepest leaf beneath (and including) this node; a bare
    /// leaf has depth 1.
    pub fn depth(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::Inner(i) => 1 + i.left.depth().max(i.right.depth()),
        }
    }

    pub fn count_nodes(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::Inner(i) => 1 + i.left.count_nodes() + i.right.count_nodes(),
        }
    }

    pub fn count_leaves(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::Inner(i) => i.left.count_leaves() + i.right.count_leaves(),
        }
    }

    pub fn count_aligned_inner(&self) -> usize {
        match self {
            Node::Leaf(_) => 0,
            Node::Inner(i) => {
                let self_count = if i.is_unaligned { 0 } else { 1 };
                self_count + i.left.count_aligned_inner() + i.right.count_aligned_inner()
            }
        }
    }

    /// Visits every node in the subtree, pre-order.
    pub fn visit(&self, visitor: &mut impl FnMut(&Node)) {
        visitor(self);
        if let Node::Inner(i) = self {
            i.left.visit(visitor);
            i.right.visit(visitor);
        }
    }

    /// Checks invariant 6: every inner node's `visibility_mask` equals the
    /// OR, and its time range the min/max, of its subtree's leaves.
    pub fn rollup_is_consistent(&self) -> bool {
        match self {
            Node::Leaf(_) => true,
            Node::Inner(i) => {
                let expected_visibility = i.left.visibility_mask() | i.right.visibility_mask();
                let (lf, lt) = i.left.time_range();
                let (rf, rt) = i.right.time_range();
                i.visibility_mask == expected_visibility
                    && i.time_from == lf.min(rf)
                    && i.time_to == lt.max(rt)
                    && i.left.rollup_is_consistent()
                    && i.right.rollup_is_consistent()
            }
        }
    }

    /// Estimated traversal cost of this subtree, used to score tree
    /// rotations: accumulates `leaf_cost`/`inner_cost` at each node,
    /// weighted by the ratio of that node's safe area to its immediate
    /// parent's safe area (the probability of traversal reaching it,
    /// conditioned on reaching the parent).
    pub fn subtree_sah_cost(&self, model: &SahCostModel) -> f32 {
        self.sah_cost_weighted(model, 1.0)
    }

    fn sah_cost_weighted(&self, model: &SahCostModel, weight: f32) -> f32 {
        match self {
            Node::Leaf(l) => weight * model.leaf_cost(l.prim_count()),
            Node::Inner(i) => {
                let area = i.bounds.safe_area();
                let left_ratio = safe_ratio(i.left.bounds().safe_area(), area);
                let right_ratio = safe_ratio(i.right.bounds().safe_area(), area);
                weight * model.inner_cost(2)
                    + i.left.sah_cost_weighted(model, weight * left_ratio)
                    + i.right.sah_cost_weighted(model, weight * right_ratio)
            }
        }
    }
}

fn safe_ratio(numerator: f32, denominator: f32) -> f32 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Assembles a left-deep binary chain of single-primitive leaves so that a
/// single traversal step dispatches exactly one whole-object reference
/// (spec.md §4.G's "object-leaf chain"). Mirrors
/// `BVHBuild::create_object_leaf_nodes` from the reference implementation:
/// split the slice at its midpoint and recurse on each half.
pub fn build_object_leaf_chain(leaves: &[LeafNode]) -> Option<Node> {
    match leaves.len() {
        0 => None,
        1 => Some(Node::Leaf(leaves[0])),
        n => {
            let mid = n / 2;
            let left = build_object_leaf_chain(&leaves[..mid])?;
            let right = build_object_leaf_chain(&leaves[mid..])?;
            Some(Node::new_inner(left, right, false, None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bvh_bounds::Vec3;

    fn leaf(bounds: Aabb, visibility: u32, lo: u32, hi: u32) -> Node {
        Node::Leaf(LeafNode {
            bounds,
            visibility_mask: visibility,
            time_from: 0.0,
            time_to: 1.0,
            prim_start: lo,
            prim_end: hi,
        })
    }

    fn box_at(lo: f32, hi: f32) -> Aabb {
        Aabb {
            min: Vec3::splat(lo),
            max: Vec3::splat(hi),
        }
    }

    #[test]
    fn new_inner_rolls_up_bounds_visibility_and_time() {
        let left = leaf(box_at(0.0, 1.0), 0b01, 0, 1);
        let right = leaf(box_at(2.0, 3.0), 0b10, 1, 2);
        let inner = Node::new_inner(left, right, false, None);

        assert_eq!(inner.bounds(), Aabb { min: Vec3::splat(0.0), max: Vec3::splat(3.0) });
        assert_eq!(inner.visibility_mask(), 0b11);
        assert!(inner.rollup_is_consistent());
    }

    #[test]
    fn is_unaligned_propagates_from_either_child() {
        let left = leaf(box_at(0.0, 1.0), 1, 0, 1);
        let right = leaf(box_at(1.0, 2.0), 1, 1, 2);
        let unaligned_child = Node::new_inner(left.clone(), right.clone(), true, None);
        let parent = Node::new_inner(unaligned_child, leaf(box_at(3.0, 4.0), 1, 2, 3), false, None);
        assert!(parent.is_unaligned());
    }

    #[test]
    fn depth_and_counts_match_tree_shape() {
        let a = leaf(box_at(0.0, 1.0), 1, 0, 1);
        let b = leaf(box_at(1.0, 2.0), 1, 1, 2);
        let c = leaf(box_at(2.0, 3.0), 1, 2, 3);
        let ab = Node::new_inner(a, b, false, None);
        let root = Node::new_inner(ab, c, false, None);

        assert_eq!(root.depth(), 3);
        assert_eq!(root.count_nodes(), 5);
        assert_eq!(root.count_leaves(), 3);
        assert_eq!(root.count_aligned_inner(), 2);
    }

    #[test]
    fn object_leaf_chain_is_left_deep_and_disjoint() {
        let leaves: Vec<LeafNode> = (0..5)
            .map(|i| LeafNode {
                bounds: box_at(i as f32, i as f32 + 1.0),
                visibility_mask: 1,
                time_from: 0.0,
                time_to: 1.0,
                prim_start: i,
                prim_end: i + 1,
            })
            .collect();

        let chain = build_object_leaf_chain(&leaves).expect("non-empty chain");
        assert_eq!(chain.count_leaves(), 5);
        assert!(chain.rollup_is_consistent());
    }

    #[test]
    fn object_leaf_chain_of_empty_slice_is_none() {
        assert!(build_object_leaf_chain(&[]).is_none());
    }

    #[test]
    fn subtree_sah_cost_matches_manual_computation_for_balanced_pair() {
        let model = SahCostModel::default();
        let left = leaf(box_at(0.0, 1.0), 1, 0, 1);
        let right = leaf(box_at(0.0, 1.0), 1, 1, 2);
        let root = Node::new_inner(left, right, false, None);

        // Both children share the parent's exact bounds here, so each ratio is 1.0.
        let expected = model.inner_cost(2) + model.leaf_cost(1) + model.leaf_cost(1);
        assert!((root.subtree_sah_cost(&model) - expected).abs() < 1e-6);
    }
}
