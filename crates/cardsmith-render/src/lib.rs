//! Cardsmith Render Library
//!
//! Flattens card sides into preview rasters with a CPU rasterizer and
//! schedules thumbnail regeneration.

mod compositor;
mod scheduler;

pub use compositor::{
    PreviewCompositor, PreviewImage, RenderError, RenderResult, TextBrush, probe_dimensions,
};
pub use scheduler::PreviewScheduler;
