//! The parallel build driver (spec §4.H): decides leaf vs. object/spatial/
//! unaligned split at each node and recurses.
//!
//! Concurrency model: the reference pool's suffix invariant (see
//! `bvh_refs`) means only the range currently occupying the pool's tail may
//! grow it (a spatial split's duplication) or shrink it (a leaf's opportunistic
//! pop). `apply_object_split` and `apply_unaligned_split` always hand back a
//! `right` range that still ends at the pool's tail and a `left` range that
//! does not. So every recursive step keeps `right` on the calling thread and
//! offers `left` to a spawned thread; if `left` later attempts a spatial
//! split while `right`'s subtree hasn't yet shrunk the pool back down to
//! `left`'s end, that thread just spins until it has (`apply_spatial_split_serialized`).
//! Position in the pool forms a strict order with no cycles, so this cannot
//! deadlock. Thread count is bounded by a channel-backed token budget
//! (`SpawnBudget`) rather than a persistent task queue, which sidesteps
//! queue-termination bookkeeping entirely.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};

use bvh_bounds::{Aabb, OrientedFrame};
use bvh_node::{build_object_leaf_chain, LeafNode, Node};
use bvh_refs::{BuildRange, PrimitiveRef, ReferencePool};
use bvh_sah::SahCostModel;
use bvh_split::{
    apply_object_split, apply_spatial_split, apply_unaligned_split, find_object_split, find_spatial_split, overlap_area, GeometrySource,
    ObjectSplitCandidate, SpatialSplitCandidate, UnalignedSplitCandidate,
};
use render_progress::Progress;

use crate::classify::{classify, PrimKind};
use crate::params::BuildParams;

/// The build's output primitive arrays, in emission order. Kept as separate
/// parallel arrays (rather than one `Vec<Record>`) because this is the shape
/// a device packer uploads verbatim.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OutputArrays {
    pub prim_type: Vec<PrimKind>,
    pub prim_index: Vec<i32>,
    pub prim_object: Vec<u32>,
    pub prim_segment: Vec<u32>,
    pub prim_time: Vec<(f32, f32)>,
}

impl OutputArrays {
    fn len(&self) -> usize {
        self.prim_type.len()
    }

    fn push(&mut self, r: &PrimitiveRef) {
        self.prim_type.push(classify(r));
        self.prim_index.push(r.primitive_id);
        self.prim_object.push(r.object_id);
        self.prim_segment.push(r.segment_id);
        self.prim_time.push((r.time_from, r.time_to));
    }
}

#[derive(Debug)]
pub struct BuildOutput {
    /// `None` only when the build was cancelled (or the scene was empty).
    pub root: Option<Node>,
    pub output: OutputArrays,
}

struct SpawnBudget {
    sender: Sender<()>,
    receiver: Receiver<()>,
}

impl SpawnBudget {
    fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        for _ in 0..capacity {
            sender.send(()).expect("channel holds at least `capacity` slots");
        }
        Self { sender, receiver }
    }

    fn try_acquire(&self) -> Option<SpawnToken<'_>> {
        self.receiver.try_recv().ok().map(|()| SpawnToken { budget: self })
    }
}

struct SpawnToken<'a> {
    budget: &'a SpawnBudget,
}

impl Drop for SpawnToken<'_> {
    fn drop(&mut self) {
        let _ = self.budget.sender.send(());
    }
}

struct SharedBuild {
    pool: Mutex<ReferencePool>,
    output: Mutex<OutputArrays>,
    spatial_gate: Mutex<()>,
    budget: SpawnBudget,
    emitted: AtomicU64,
    duplicates: AtomicU64,
    last_report: Mutex<Instant>,
}

struct BuildContext<'a, G> {
    params: &'a BuildParams,
    model: &'a SahCostModel,
    geometry: &'a G,
    progress: &'a Progress,
    spatial_min_overlap: f32,
    total_primitives: usize,
}

enum SplitChoice {
    Leaf,
    Object(ObjectSplitCandidate),
    Spatial(SpatialSplitCandidate),
    Unaligned(UnalignedSplitCandidate),
}

/// Picks the cheapest of the candidates that were actually evaluated,
/// preferring the object split on a tie against the leaf cost (spec §4.H
/// step 4).
fn decide_split(leaf_cost: f32, can_leaf: bool, object: Option<ObjectSplitCandidate>, spatial: Option<SpatialSplitCandidate>, unaligned: Option<UnalignedSplitCandidate>) -> SplitChoice {
    let mut best_cost = if can_leaf { leaf_cost } else { f32::INFINITY };
    let mut best = SplitChoice::Leaf;

    if let Some(candidate) = object {
        if candidate.sah_cost <= best_cost {
            best_cost = candidate.sah_cost;
            best = SplitChoice::Object(candidate);
        }
    }
    if let Some(candidate) = spatial {
        if candidate.sah_cost < best_cost {
            best_cost = candidate.sah_cost;
            best = SplitChoice::Spatial(candidate);
        }
    }
    if let Some(candidate) = unaligned {
        if candidate.local_split.sah_cost < best_cost {
            best = SplitChoice::Unaligned(candidate);
        }
    }
    best
}

/// Emits a leaf (spec §4.G). Object references never share a leaf record
/// with triangle/curve references: they're split into their own
/// single-primitive leaves and assembled into a dedicated object-leaf
/// chain, so a single traversal step dispatches exactly one object. When a
/// range holds both kinds, the result is an inner node whose children are
/// the ordinary leaf and the object-leaf chain.
fn emit_leaf(shared: &SharedBuild, range: BuildRange, refs: &[PrimitiveRef]) -> Node {
    let (object_refs, primitive_refs): (Vec<&PrimitiveRef>, Vec<&PrimitiveRef>) =
        refs.iter().partition(|r| classify(r) == PrimKind::Object);

    let mut output = shared.output.lock().unwrap();

    let primitive_leaf = if primitive_refs.is_empty() {
        None
    } else {
        let visibility_mask = primitive_refs.iter().fold(0u32, |acc, r| acc | r.visibility);
        let (time_from, time_to) = primitive_refs
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), r| (lo.min(r.time_from), hi.max(r.time_to)));
        let mut bounds = Aabb::empty();
        for r in &primitive_refs {
            bounds.grow_box(r.bounds);
        }
        let start = output.len() as u32;
        for r in &primitive_refs {
            output.push(r);
        }
        Some(LeafNode {
            bounds,
            visibility_mask,
            time_from,
            time_to,
            prim_start: start,
            prim_end: output.len() as u32,
        })
    };

    let object_leaves: Vec<LeafNode> = object_refs
        .iter()
        .map(|r| {
            let start = output.len() as u32;
            output.push(r);
            LeafNode {
                bounds: r.bounds,
                visibility_mask: r.visibility,
                time_from: r.time_from,
                time_to: r.time_to,
                prim_start: start,
                prim_end: start + 1,
            }
        })
        .collect();
    drop(output);

    // Opportunistic compaction: if this range still happens to be the
    // pool's tail, shrink it now. Not required for correctness (the data
    // needed for this leaf was already copied above), just housekeeping.
    {
        let mut pool = shared.pool.lock().unwrap();
        if pool.is_suffix(&range) {
            let mut shrinking = range;
            while pool.pop_tail(&mut shrinking).is_some() {}
        }
    }

    shared.emitted.fetch_add(refs.len() as u64, Ordering::Relaxed);

    match (primitive_leaf, build_object_leaf_chain(&object_leaves)) {
        (Some(leaf), Some(chain)) => Node::new_inner(Node::Leaf(leaf), chain, false, None),
        (Some(leaf), None) => Node::Leaf(leaf),
        (None, Some(chain)) => chain,
        (None, None) => Node::Leaf(LeafNode {
            bounds: range.bounds,
            visibility_mask: 0,
            time_from: f32::INFINITY,
            time_to: f32::NEG_INFINITY,
            prim_start: 0,
            prim_end: 0,
        }),
    }
}

/// Applies a spatial split under the spatial gate, retrying with
/// `thread::yield_now` if `range` isn't currently the pool's tail (it will
/// become the tail once whatever subtree is still growing/shrinking to its
/// right finishes — see the
/// module doc comment for why this can't deadlock).
fn apply_spatial_split_serialized<G: GeometrySource>(shared: &SharedBuild, ctx: &BuildContext<G>, range: BuildRange, candidate: &SpatialSplitCandidate) -> (BuildRange, BuildRange) {
    let _gate = shared.spatial_gate.lock().unwrap();
    loop {
        let mut pool = shared.pool.lock().unwrap();
        if pool.is_suffix(&range) {
            let before = pool.len();
            let mut range_mut = range;
            let (left, right) = apply_spatial_split(&mut pool, &mut range_mut, candidate, ctx.geometry, ctx.model);
            let grown = pool.len() - before;
            drop(pool);
            shared.duplicates.fetch_add(grown as u64, Ordering::Relaxed);
            return (left, right);
        }
        drop(pool);
        thread::yield_now();
    }
}

fn maybe_report_progress<G>(shared: &SharedBuild, ctx: &BuildContext<G>) {
    let now = Instant::now();
    let Ok(mut last) = shared.last_report.try_lock() else {
        return;
    };
    if now.duration_since(*last) < Duration::from_millis(250) {
        return;
    }
    *last = now;
    drop(last);

    let emitted = shared.emitted.load(Ordering::Relaxed);
    let duplicates = shared.duplicates.load(Ordering::Relaxed);
    let ratio = if ctx.total_primitives > 0 {
        duplicates as f64 / ctx.total_primitives as f64
    } else {
        0.0
    };
    ctx.progress.set_status("Building BVH", format!("{emitted} primitives emitted, {:.1}% duplicates", ratio * 100.0));
}

#[allow(clippy::too_many_arguments)]
fn recurse_children<'scope, 'env, G>(
    shared: &'env SharedBuild,
    ctx: &'env BuildContext<'env, G>,
    scope: &'scope thread::Scope<'scope, 'env>,
    left: BuildRange,
    right: BuildRange,
    depth: usize,
    spatial_depth_remaining: usize,
    is_unaligned: bool,
    frame: Option<OrientedFrame>,
) -> Option<Node>
where
    G: GeometrySource + Sync,
{
    // Small ranges are never queued (spec §4.H step 3): spawning a thread
    // for them would cost more than just building them inline.
    let spawn_left = left.count > ctx.params.thread_task_size;
    let token = if spawn_left { shared.budget.try_acquire() } else { None };

    let spawned = token.map(|token| {
        scope.spawn(move || {
            let _token = token;
            build_node(shared, ctx, scope, left, depth + 1, spatial_depth_remaining)
        })
    });

    let right_node = build_node(shared, ctx, scope, right, depth + 1, spatial_depth_remaining);

    let left_node = match spawned {
        Some(handle) => handle.join().expect("left subtree build thread panicked"),
        None => build_node(shared, ctx, scope, left, depth + 1, spatial_depth_remaining),
    };

    match (left_node, right_node) {
        (Some(l), Some(r)) => Some(Node::new_inner(l, r, is_unaligned, frame)),
        _ => None,
    }
}

fn build_node<'scope, 'env, G>(
    shared: &'env SharedBuild,
    ctx: &'env BuildContext<'env, G>,
    scope: &'scope thread::Scope<'scope, 'env>,
    range: BuildRange,
    depth: usize,
    spatial_depth_remaining: usize,
) -> Option<Node>
where
    G: GeometrySource + Sync,
{
    if ctx.progress.get_cancel() {
        return None;
    }
    maybe_report_progress(shared, ctx);

    let refs_snapshot: Vec<PrimitiveRef> = {
        let pool = shared.pool.lock().unwrap();
        pool.range_slice(range).to_vec()
    };
    let n = refs_snapshot.len();

    if n <= 1 || depth >= ctx.params.max_depth {
        return Some(emit_leaf(shared, range, &refs_snapshot));
    }

    let leaf_cost = ctx.model.leaf_cost(n);
    let can_leaf = n <= ctx.params.max_leaf_size;

    let object = find_object_split(&refs_snapshot, ctx.model);

    let spatial = if ctx.params.use_spatial_split && !ctx.params.top_level && spatial_depth_remaining > 0 {
        object.as_ref().and_then(|candidate| {
            let overlap = overlap_area(candidate.left_bounds, candidate.right_bounds);
            if overlap > ctx.spatial_min_overlap {
                find_spatial_split(&refs_snapshot, ctx.geometry, range.bounds, ctx.model, ctx.params.num_spatial_bins)
            } else {
                None
            }
        })
    } else {
        None
    };

    let unaligned = if ctx.params.use_bvh_unaligned_nodes {
        let aligned_cost = object.as_ref().map(|c| c.sah_cost).unwrap_or(f32::INFINITY);
        bvh_split::try_unaligned_split(&refs_snapshot, aligned_cost, ctx.model, ctx.params.unaligned_gain_threshold)
    } else {
        None
    };

    if ctx.progress.get_cancel() {
        return None;
    }

    match decide_split(leaf_cost, can_leaf, object, spatial, unaligned) {
        SplitChoice::Leaf => Some(emit_leaf(shared, range, &refs_snapshot)),
        SplitChoice::Object(candidate) => {
            let (left, right) = {
                let mut pool = shared.pool.lock().unwrap();
                apply_object_split(&mut pool, range, &candidate)
            };
            recurse_children(shared, ctx, scope, left, right, depth, spatial_depth_remaining, false, None)
        }
        SplitChoice::Spatial(candidate) => {
            let (left, right) = apply_spatial_split_serialized(shared, ctx, range, &candidate);
            recurse_children(shared, ctx, scope, left, right, depth, spatial_depth_remaining.saturating_sub(1), false, None)
        }
        SplitChoice::Unaligned(candidate) => {
            let frame = candidate.frame;
            let (left, right) = {
                let mut pool = shared.pool.lock().unwrap();
                apply_unaligned_split(&mut pool, range, &candidate)
            };
            recurse_children(shared, ctx, scope, left, right, depth, spatial_depth_remaining, true, Some(frame))
        }
    }
}

/// Builds a BVH over `pool`'s current contents (spec §4.H). `pool` is
/// expected to already hold the scene's primitive references (component A's
/// responsibility, out of this crate's scope); this is where recursion,
/// splitting, leaf emission, progress, and cancellation happen.
pub fn build<G>(mut pool: ReferencePool, params: &BuildParams, model: &SahCostModel, geometry: &G, progress: &Progress) -> BuildOutput
where
    G: GeometrySource + Sync,
{
    let total = pool.len();
    if total == 0 {
        // spec §8 Scenario A: an empty scene still yields a root, one leaf
        // node with empty bounds and no primitives, rather than `None`.
        // `None` is reserved for a build that was actually cancelled.
        progress.set_status("Building BVH", "empty scene");
        return BuildOutput {
            root: Some(Node::Leaf(LeafNode {
                bounds: Aabb::empty(),
                visibility_mask: 0,
                time_from: f32::INFINITY,
                time_to: f32::NEG_INFINITY,
                prim_start: 0,
                prim_end: 0,
            })),
            output: OutputArrays::default(),
        };
    }

    let mut root_bounds = Aabb::empty();
    for r in pool.as_slice() {
        root_bounds.grow_box(r.bounds);
    }

    let spatial_min_overlap = if params.use_spatial_split && !params.top_level {
        bvh_split::spatial_min_overlap(root_bounds.safe_area(), params.spatial_split_alpha)
    } else {
        f32::INFINITY
    };

    let num_threads = if params.num_threads == 0 {
        thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    } else {
        params.num_threads.max(1)
    };

    let shared = SharedBuild {
        pool: Mutex::new(std::mem::take(&mut pool)),
        output: Mutex::new(OutputArrays::default()),
        spatial_gate: Mutex::new(()),
        budget: SpawnBudget::new(num_threads.saturating_sub(1)),
        emitted: AtomicU64::new(0),
        duplicates: AtomicU64::new(0),
        last_report: Mutex::new(Instant::now()),
    };
    let ctx = BuildContext {
        params,
        model,
        geometry,
        progress,
        spatial_min_overlap,
        total_primitives: total,
    };

    let range = BuildRange::new(0, total, root_bounds);
    let mut root = thread::scope(|scope| build_node(&shared, &ctx, scope, range, 0, params.max_spatial_depth));

    if let Some(node) = root.as_mut() {
        if params.rotation_iterations > 0 {
            crate::rotate::optimize(node, model, params.rotation_iterations, params.rotation_gain_threshold);
        }
    }

    progress.set_status("Building BVH", if root.is_some() { "done" } else { "cancelled" });

    BuildOutput {
        root,
        output: shared.output.into_inner().unwrap(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bvh_bounds::Vec3;
    use bvh_refs::NO_SEGMENT;
    use bvh_split::PrimitiveGeometry;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct NoGeometry;
    impl GeometrySource for NoGeometry {
        fn geometry(&self, _reference: &PrimitiveRef) -> PrimitiveGeometry {
            panic!("spatial splitting disabled in these tests should never ask for geometry")
        }
    }

    fn tri_ref(id: u32, x: f32) -> PrimitiveRef {
        PrimitiveRef {
            object_id: id,
            primitive_id: id as i32,
            segment_id: NO_SEGMENT,
            bounds: Aabb {
                min: Vec3::new(x, 0.0, 0.0),
                max: Vec3::new(x + 0.5, 1.0, 1.0),
            },
            time_from: 0.0,
            time_to: 1.0,
            visibility: 1,
        }
    }

    fn no_spatial_params() -> BuildParams {
        BuildParams {
            use_spatial_split: false,
            num_threads: 1,
            ..BuildParams::default()
        }
    }

    #[test]
    fn empty_pool_still_produces_a_single_empty_leaf() {
        let pool = ReferencePool::new();
        let params = no_spatial_params();
        let model = SahCostModel::default();
        let progress = Progress::new();
        let result = build(pool, &params, &model, &NoGeometry, &progress);
        let root = result.root.expect("empty scene still yields a root leaf");
        assert!(root.is_leaf());
        assert_eq!(root.count_leaves(), 1);
        assert_eq!(root.bounds(), Aabb::empty());
        assert_eq!(result.output.len(), 0);
    }

    fn object_ref(object_id: u32, x: f32) -> PrimitiveRef {
        PrimitiveRef {
            object_id,
            primitive_id: bvh_refs::OBJECT_REFERENCE,
            segment_id: NO_SEGMENT,
            bounds: Aabb {
                min: Vec3::new(x, 0.0, 0.0),
                max: Vec3::new(x + 0.5, 1.0, 1.0),
            },
            time_from: 0.0,
            time_to: 1.0,
            visibility: 1,
        }
    }

    #[test]
    fn mixed_leaf_splits_object_refs_into_their_own_chain() {
        let mut pool = ReferencePool::new();
        pool.push(tri_ref(0, 0.0));
        pool.push(tri_ref(1, 1.0));
        pool.push(object_ref(2, 2.0));
        pool.push(object_ref(3, 3.0));
        let params = BuildParams {
            max_leaf_size: 8,
            max_depth: 0,
            ..no_spatial_params()
        };
        let model = SahCostModel::default();
        let progress = Progress::new();

        let result = build(pool, &params, &model, &NoGeometry, &progress);
        let root = result.root.expect("should build");

        assert!(!root.is_leaf(), "object and triangle refs must not share one leaf");
        assert_eq!(root.count_leaves(), 3, "one triangle leaf plus a 2-entry object-leaf chain");
        assert_eq!(result.output.len(), 4);
        assert!(root.rollup_is_consistent());
    }

    #[test]
    fn leaf_of_only_object_refs_builds_a_bare_chain() {
        let mut pool = ReferencePool::new();
        pool.push(object_ref(0, 0.0));
        pool.push(object_ref(1, 1.0));
        pool.push(object_ref(2, 2.0));
        let params = BuildParams {
            max_leaf_size: 8,
            max_depth: 0,
            ..no_spatial_params()
        };
        let model = SahCostModel::default();
        let progress = Progress::new();

        let result = build(pool, &params, &model, &NoGeometry, &progress);
        let root = result.root.expect("should build");

        assert_eq!(root.count_leaves(), 3);
        assert!(result.output.prim_type.iter().all(|kind| *kind == PrimKind::Object));
    }

    #[test]
    fn building_without_spatial_splits_conserves_every_reference() {
        let mut pool = ReferencePool::new();
        for i in 0..37 {
            pool.push(tri_ref(i, i as f32 * 2.0));
        }
        let params = BuildParams {
            max_leaf_size: 4,
            ..no_spatial_params()
        };
        let model = SahCostModel::default();
        let progress = Progress::new();

        let result = build(pool, &params, &model, &NoGeometry, &progress);
        let root = result.root.expect("non-empty scene must produce a root");

        assert_eq!(result.output.len(), 37);
        assert_eq!(result.output.prim_index.len(), 37);
        assert!(root.count_leaves() >= 1);
        assert!(root.rollup_is_consistent());
        assert!(result.output.prim_type.iter().all(|kind| *kind == PrimKind::Triangle));
    }

    #[test]
    fn a_single_reference_builds_a_lone_leaf() {
        let mut pool = ReferencePool::new();
        pool.push(tri_ref(0, 0.0));
        let params = no_spatial_params();
        let model = SahCostModel::default();
        let progress = Progress::new();

        let result = build(pool, &params, &model, &NoGeometry, &progress);
        let root = result.root.expect("should build");
        assert!(root.is_leaf());
        assert_eq!(result.output.len(), 1);
    }

    #[test]
    fn cancelling_before_build_starts_yields_no_root() {
        let mut pool = ReferencePool::new();
        for i in 0..8 {
            pool.push(tri_ref(i, i as f32));
        }
        let params = no_spatial_params();
        let model = SahCostModel::default();
        let progress = Progress::new();
        progress.set_cancel("test cancel");

        let result = build(pool, &params, &model, &NoGeometry, &progress);
        assert!(result.root.is_none());
    }

    #[test]
    fn parallel_build_with_multiple_threads_still_conserves_references() {
        let mut pool = ReferencePool::new();
        for i in 0..200 {
            pool.push(tri_ref(i, i as f32));
        }
        let params = BuildParams {
            max_leaf_size: 2,
            thread_task_size: 8,
            num_threads: 4,
            ..no_spatial_params()
        };
        let model = SahCostModel::default();
        let progress = Progress::new();

        let result = build(pool, &params, &model, &NoGeometry, &progress);
        let root = result.root.expect("should build");
        assert_eq!(result.output.len(), 200);
        assert!(root.rollup_is_consistent());
    }

    struct TriangleGeometry {
        triangles: Vec<[Vec3; 3]>,
    }

    impl GeometrySource for TriangleGeometry {
        fn geometry(&self, reference: &PrimitiveRef) -> PrimitiveGeometry {
            PrimitiveGeometry::Triangle(self.triangles[reference.primitive_id as usize])
        }
    }

    /// Scenario C (spec.md §8): two disjoint triangles, forced to split by
    /// `max_leaf_size: 1`, run end-to-end through `build()` against a real
    /// `GeometrySource` rather than `NoGeometry`. Spatial splitting stays off
    /// here, so `geometry()` is never actually called on this path — the
    /// point is that `build()` can run against a working geometry source at
    /// all, not just one that panics the moment it's touched.
    #[test]
    fn scenario_c_two_disjoint_triangles_split_on_x() {
        let geometry = TriangleGeometry {
            triangles: vec![
                [Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.5, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
                [Vec3::new(2.0, 0.0, 0.0), Vec3::new(2.5, 0.0, 0.0), Vec3::new(2.0, 1.0, 0.0)],
            ],
        };
        let mut pool = ReferencePool::new();
        pool.push(tri_ref(0, 0.0));
        pool.push(tri_ref(1, 2.0));
        let params = BuildParams {
            max_leaf_size: 1,
            ..no_spatial_params()
        };
        let model = SahCostModel::default();
        let progress = Progress::new();

        let result = build(pool, &params, &model, &geometry, &progress);
        let root = result.root.expect("should build");

        assert!(!root.is_leaf(), "max_leaf_size: 1 forces two disjoint triangles apart");
        assert_eq!(root.count_leaves(), 2);
        assert_eq!(result.output.len(), 2, "an object split duplicates nothing for disjoint refs");
        assert!(root.rollup_is_consistent());
    }

    /// Scenario G (spec.md §8): cancelling mid-build, not before `build()` is
    /// ever called (see `cancelling_before_build_starts_yields_no_root`
    /// above). Uses the cancel-probe hook rather than a sleep/timing race: the
    /// probe counts its own invocations and only fires once it has been
    /// polled enough times that the build driver must already be deep inside
    /// recursion, so the outcome doesn't depend on wall-clock scheduling.
    #[test]
    fn cancelling_mid_build_drops_partial_work() {
        let total = 2000u32;
        let mut pool = ReferencePool::new();
        for i in 0..total {
            pool.push(tri_ref(i, i as f32));
        }
        let params = BuildParams {
            max_leaf_size: 1,
            num_threads: 1,
            ..no_spatial_params()
        };
        let model = SahCostModel::default();
        let progress = Progress::new();

        let probe_calls = Arc::new(AtomicUsize::new(0));
        let probe_calls_in_callback = Arc::clone(&probe_calls);
        progress.set_cancel_callback(move || probe_calls_in_callback.fetch_add(1, Ordering::Relaxed) >= 50);

        let result = build(pool, &params, &model, &NoGeometry, &progress);

        assert!(result.root.is_none(), "a cancel probe firing mid-build must drop the partial tree");
        assert!(result.output.len() < total as usize, "a cancelled build must not have emitted every reference");
        assert!(probe_calls.load(Ordering::Relaxed) >= 50);
    }
}
