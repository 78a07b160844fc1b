//! Error types shared by the simulation, its backends and the demo host.

use crate::simulation::fluid_config::ConfigError;

/// Errors that stop a fluid simulation instance from starting or continuing.
///
/// Every variant is fatal for the instance that produced it: the host is
/// expected to disable the effect rather than keep stepping invalid buffers.
#[derive(Debug, thiserror::Error)]
pub enum FluidError {
    #[error("Invalid fluid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot allocate {field} grid ({width}x{height}): {reason}")]
    Allocation {
        field: &'static str,
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("No compatible GPU adapter: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),

    #[error("Failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("Readback of the {0} field failed")]
    Readback(&'static str),

    #[error("Simulation grids are not allocated")]
    NotAllocated,
}

impl FluidError {
    pub(crate) fn allocation(
        field: &'static str,
        width: u32,
        height: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self::Allocation {
            field,
            width,
            height,
            reason: reason.into(),
        }
    }
}
