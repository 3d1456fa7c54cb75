//! The parallel BVH build driver (spec §4.H): ties the split finders in
//! `bvh_split` and the node model in `bvh_node` together into a single
//! `build()` entry point, plus post-build tree rotation.

mod classify;
mod driver;
mod params;
mod rotate;

pub use classify::{classify, PrimKind};
pub use driver::{build, BuildOutput, OutputArrays};
pub use params::{BuildParams, BvhLayout, BvhType};
