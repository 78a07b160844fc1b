pub mod cpu_fluid;
pub mod double_buffer;
pub mod effect;
pub mod fluid_config;
pub mod fluid_simulation;
pub mod grid;
pub mod kernels;
pub mod pipeline;
pub mod splat;

pub use cpu_fluid::CpuFluidBackend;
pub use double_buffer::DoubleBuffer;
pub use effect::{FluidSimulation, FrameStats};
pub use fluid_config::{ConfigError, ConfigOverrides, Profile, SimulationConfig};
pub use fluid_simulation::GpuFluidBackend;
pub use grid::{FieldId, Grid, GridLayout};
pub use pipeline::{run_frame, FluidBackend, Stage, Viewport, FRAME_STAGES};
pub use splat::{Splat, SplatQueue};
