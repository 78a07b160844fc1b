//! # Fluid Backdrop: Interactive Screen-Space Fluid Effect
//!
//! A real-time 2D fluid simulation (Stam-style stable fluids) driven by
//! pointer motion. Coloured dye is injected where the pointer moves, carried
//! by a velocity field, kept swirling by vorticity confinement and slowly
//! dissipated. The result is composited over a solid background colour.
//!
//! ## Architecture Overview
//!
//! The codebase is organized into three subsystems:
//!
//! ### 1. Simulation Engine ([`simulation`])
//!
//! Grid state and the per-frame kernel pipeline:
//! - [`simulation::SimulationConfig`] - Tunables built from a [`simulation::Profile`] plus RON overrides
//! - [`simulation::FluidBackend`] - The kernel surface every backend implements
//! - [`simulation::run_frame`] - Ordered stage driver (splat, curl, vorticity, projection, advection)
//! - [`simulation::CpuFluidBackend`] - Rayon reference backend, usable without a GPU
//! - [`simulation::GpuFluidBackend`] - WGSL compute backend over ping-pong storage buffers
//! - [`simulation::FluidSimulation`] - Lifecycle facade (allocate, step, resize, reset, dispose)
//!
//! **Key Design**: Every kernel formula exists once on the CPU and once in WGSL;
//! GPU tests compare the two on small grids.
//!
//! ### 2. Input ([`input`])
//!
//! - [`input::PointerInput`] - Turns mouse and touch motion into splats on a shared queue
//!
//! ### 3. Rendering ([`rendering`])
//!
//! - [`rendering::DensityCompositor`] - Seam between the simulation and a presentation target
//! - [`rendering::DensityOverlayRenderer`] - Full-screen triangle reading the dye buffer
//!
//! ## Data Flow
//!
//! ```text
//! WindowEvent ──▶ PointerInput ──▶ SplatQueue
//!                                      │ drained (LIFO) once per frame
//!                                      ▼
//!                         FluidSimulation::step()
//!                                      │ run_frame() over the backend
//!                                      ▼
//!                 density field ──▶ DensityCompositor ──▶ surface
//! ```
//!
//! ## Application Entry Point
//!
//! - [`app::run`] - winit event loop hosting the effect in a window

pub mod app;
pub mod error;
pub mod input;
pub mod rendering;
pub mod simulation;

pub use error::FluidError;
