//! GPU fluid backend.
//!
//! Fields live in wgpu storage buffers and every stage is a WGSL compute
//! kernel from `shaders/fluid/`, dispatched in 8x8 workgroups.

pub mod buffers;
pub mod gpu_simulator;

pub use buffers::{validate_layout, FluidBuffers};
pub use gpu_simulator::{request_headless_device, GpuFluidBackend};
