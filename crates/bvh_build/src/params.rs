//! Build parameters (spec §4.H input).

/// How children are packed per inner node in the device-specific packer
/// this crate hands its tree off to. The builder itself only ever produces
/// binary nodes; `bvh_layout` is carried through untouched for that
/// external stage to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BvhLayout {
    Bvh2,
    Bvh4,
    Bvh8,
}

/// Whether the tree is rebuilt from scratch per frame or refit in place.
/// The builder in this crate only implements the `Static` (rebuild) path;
/// `Dynamic` is recorded for the caller to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BvhType {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildParams {
    /// Top-level (two-level BVH) builds see only object references and
    /// never attempt spatial splits (object refs are not clippable).
    pub top_level: bool,
    pub bvh_layout: BvhLayout,
    pub use_spatial_split: bool,
    pub use_bvh_unaligned_nodes: bool,
    pub num_motion_curve_steps: u32,
    pub num_motion_triangle_steps: u32,
    pub bvh_type: BvhType,
    pub curve_subdivisions: u32,
    pub min_leaf_size: usize,
    pub max_leaf_size: usize,
    /// Fraction of the root's surface area used to derive
    /// `spatial_min_overlap` (spec §4.E).
    pub spatial_split_alpha: f32,
    pub max_depth: usize,
    pub max_spatial_depth: usize,
    /// Ranges at or below this count are built inline, without going
    /// through the task queue (spec §4.H step 3).
    pub thread_task_size: usize,
    pub unaligned_gain_threshold: f32,
    pub num_spatial_bins: usize,
    /// 0 disables the post-build tree-rotation pass.
    pub rotation_iterations: usize,
    pub rotation_gain_threshold: f32,
    /// 0 means "use the number of available CPU cores at build time".
    pub num_threads: usize,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            top_level: false,
            bvh_layout: BvhLayout::Bvh2,
            use_spatial_split: true,
            use_bvh_unaligned_nodes: false,
            num_motion_curve_steps: 0,
            num_motion_triangle_steps: 0,
            bvh_type: BvhType::Static,
            curve_subdivisions: 3,
            min_leaf_size: 1,
            max_leaf_size: 8,
            spatial_split_alpha: 1e-5,
            max_depth: 64,
            max_spatial_depth: 48,
            thread_task_size: 4096,
            unaligned_gain_threshold: 0.05,
            num_spatial_bins: bvh_split::NUM_SPATIAL_BINS,
            rotation_iterations: 3,
            rotation_gain_threshold: 0.01,
            num_threads: 0,
        }
    }
}
