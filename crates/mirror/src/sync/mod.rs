//! Incremental sync engine
//!
//! Per bucket: resolve the local watermark, pull newer remote data, parse,
//! batch-write locally. The controller sequences reachability-check ->
//! sync -> wait and contains failures at the cycle boundary.

mod bucket;
mod controller;
mod watermark;

pub use bucket::sync_bucket;
pub use controller::{CycleController, CycleOutcome};
pub use watermark::{Watermark, resolve};
