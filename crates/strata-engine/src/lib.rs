//! Strata engine crate.
//!
//! This crate owns the GPU runtime pieces and shared primitives used by the
//! vector tile layer: device bring-up, the render backend contract, deferred
//! resource release, coordinates, and colors.

pub mod coords;
pub mod device;
pub mod logging;
pub mod paint;
pub mod render;
