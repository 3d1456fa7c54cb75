//! Post-build tree rotation (spec §4.H step 5): a bounded local-search pass
//! that tries swapping a node's child with one of its nephews (a grandchild
//! reached through the *other* child) and commits the swap if it lowers
//! that node's subtree SAH cost. Each trial only ever looks at a node, its
//! two children, and up to two grandchildren, which is what keeps this
//! depth-limited regardless of tree size.

use bvh_node::Node;
use bvh_sah::SahCostModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Swap {
    RightWithLeftLeft,
    RightWithLeftRight,
    LeftWithRightLeft,
    LeftWithRightRight,
}

/// Runs up to `iterations` bottom-up passes over the tree. A pass that
/// commits no swap stops the loop early.
pub fn optimize(root: &mut Node, model: &SahCostModel, iterations: usize, gain_threshold: f32) {
    for _ in 0..iterations {
        if !rotate_pass(root, model, gain_threshold) {
            break;
        }
    }
}

fn rotate_pass(node: &mut Node, model: &SahCostModel, gain_threshold: f32) -> bool {
    let Node::Inner(inner) = node else {
        return false;
    };

    let mut changed = rotate_pass(&mut inner.left, model, gain_threshold);
    changed |= rotate_pass(&mut inner.right, model, gain_threshold);
    changed |= try_best_swap(node, model, gain_threshold);
    changed
}

fn candidate_swaps(node: &Node) -> Vec<Swap> {
    let Node::Inner(inner) = node else {
        return Vec::new();
    };
    let mut swaps = Vec::new();
    if matches!(inner.left.as_ref(), Node::Inner(_)) {
        swaps.push(Swap::RightWithLeftLeft);
        swaps.push(Swap::RightWithLeftRight);
    }
    if matches!(inner.right.as_ref(), Node::Inner(_)) {
        swaps.push(Swap::LeftWithRightLeft);
        swaps.push(Swap::LeftWithRightRight);
    }
    swaps
}

/// Recomputes an inner node's rolled-up bounds/visibility/time/unaligned
/// flag from its current children, without touching its split frame.
fn refresh_rollup(node: &mut Node) {
    if let Node::Inner(inner) = node {
        let mut bounds = inner.left.bounds();
        bounds.grow_box(inner.right.bounds());
        inner.bounds = bounds;
        inner.visibility_mask = inner.left.visibility_mask() | inner.right.visibility_mask();
        let (lf, lt) = inner.left.time_range();
        let (rf, rt) = inner.right.time_range();
        inner.time_from = lf.min(rf);
        inner.time_to = lt.max(rt);
        inner.is_unaligned = inner.is_unaligned || inner.left.is_unaligned() || inner.right.is_unaligned();
    }
}

/// `swap` is its own inverse: applying it twice restores the original
/// tree, which is what lets `cost_after_swap` probe a candidate without
/// committing it.
fn apply_swap(node: &mut Node, swap: Swap) {
    if let Node::Inner(inner) = node {
        match swap {
            Swap::RightWithLeftLeft => {
                if let Node::Inner(left_inner) = inner.left.as_mut() {
                    std::mem::swap(&mut inner.right, &mut left_inner.left);
                }
            }
            Swap::RightWithLeftRight => {
                if let Node::Inner(left_inner) = inner.left.as_mut() {
                    std::mem::swap(&mut inner.right, &mut left_inner.right);
                }
            }
            Swap::LeftWithRightLeft => {
                if let Node::Inner(right_inner) = inner.right.as_mut() {
                    std::mem::swap(&mut inner.left, &mut right_inner.left);
                }
            }
            Swap::LeftWithRightRight => {
                if let Node::Inner(right_inner) = inner.right.as_mut() {
                    std::mem::swap(&mut inner.left, &mut right_inner.right);
                }
            }
        }
        refresh_rollup(&mut inner.left);
        refresh_rollup(&mut inner.right);
    }
    refresh_rollup(node);
}

fn cost_after_swap(node: &mut Node, swap: Swap, model: &SahCostModel) -> f32 {
    apply_swap(node, swap);
    let cost = node.subtree_sah_cost(model);
    apply_swap(node, swap);
    cost
}

fn try_best_swap(node: &mut Node, model: &SahCostModel, gain_threshold: f32) -> bool {
    let baseline = node.subtree_sah_cost(model);
    let mut best_gain = 0.0f32;
    let mut best_swap = None;

    for swap in candidate_swaps(node) {
        let gain = baseline - cost_after_swap(node, swap, model);
        if gain > best_gain {
            best_gain = gain;
            best_swap = Some(swap);
        }
    }

    match best_swap {
        Some(swap) if best_gain > baseline * gain_threshold => {
            apply_swap(node, swap);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bvh_bounds::{Aabb, Vec3};
    use bvh_node::LeafNode;

    fn leaf(lo: f32, hi: f32, prim_start: u32) -> Node {
        Node::Leaf(LeafNode {
            bounds: Aabb {
                min: Vec3::splat(lo),
                max: Vec3::splat(hi),
            },
            visibility_mask: 1,
            time_from: 0.0,
            time_to: 1.0,
            prim_start,
            prim_end: prim_start + 1,
        })
    }

    #[test]
    fn optimize_preserves_rollup_consistency_and_never_increases_cost() {
        // A lopsided tree where swapping grandchildren can tighten bounds:
        // ((A, B), C) with A and C spatially adjacent and B far away.
        let a = leaf(0.0, 1.0, 0);
        let b = leaf(100.0, 101.0, 1);
        let c = leaf(1.0, 2.0, 2);
        let ab = Node::new_inner(a, b, false, None);
        let mut root = Node::new_inner(ab, c, false, None);

        let model = SahCostModel::default();
        let before = root.subtree_sah_cost(&model);
        optimize(&mut root, &model, 3, 0.0);
        let after = root.subtree_sah_cost(&model);

        assert!(root.rollup_is_consistent());
        assert!(after <= before + 1e-6);
    }

    #[test]
    fn zero_iterations_leaves_tree_untouched() {
        let a = leaf(0.0, 1.0, 0);
        let b = leaf(1.0, 2.0, 1);
        let mut root = Node::new_inner(a, b, false, None);
        let model = SahCostModel::default();
        let before = root.clone();

        optimize(&mut root, &model, 0, 0.0);
        assert_eq!(root, before);
    }

    #[test]
    fn a_bare_leaf_is_a_no_op() {
        let mut leaf_node = leaf(0.0, 1.0, 0);
        let model = SahCostModel::default();
        optimize(&mut leaf_node, &model, 5, 0.0);
        assert_eq!(leaf_node, leaf(0.0, 1.0, 0));
    }
}
