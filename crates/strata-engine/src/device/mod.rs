//! GPU device management.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue without a surface
//! - creating offscreen targets and per-frame encoders

mod gpu;
mod init;

pub use gpu::{Gpu, OffscreenTarget};
pub use init::GpuInit;
