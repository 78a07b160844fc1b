//! The fixed per-frame stage sequence and the backend interface it drives.
//!
//! The frame is a data structure ([`FRAME_STAGES`]) rather than an inlined
//! procedure. [`run_frame`] walks it in order and turns each stage into one or
//! more typed kernel calls on a [`FluidBackend`]. Stages never overlap: every
//! call consumes the buffer the previous call just wrote.

use crate::error::FluidError;

use super::fluid_config::SimulationConfig;
use super::grid::{FieldId, GridLayout};
use super::kernels::{AdvectParams, ScaleParams, SplatParams, VorticityParams, MAX_VELOCITY};
use super::splat::Splat;

/// One step of the per-frame solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Splats,
    Curl,
    Vorticity,
    Divergence,
    PressureWarmStart,
    PressureSolve,
    GradientSubtract,
    AdvectVelocity,
    AdvectDensity,
    Output,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Splats => "splats",
            Stage::Curl => "curl",
            Stage::Vorticity => "vorticity",
            Stage::Divergence => "divergence",
            Stage::PressureWarmStart => "pressure_warm_start",
            Stage::PressureSolve => "pressure_solve",
            Stage::GradientSubtract => "gradient_subtract",
            Stage::AdvectVelocity => "advect_velocity",
            Stage::AdvectDensity => "advect_density",
            Stage::Output => "output",
        }
    }
}

/// Stage order of one frame. Each stage depends on the output of the previous one.
pub const FRAME_STAGES: [Stage; 10] = [
    Stage::Splats,
    Stage::Curl,
    Stage::Vorticity,
    Stage::Divergence,
    Stage::PressureWarmStart,
    Stage::PressureSolve,
    Stage::GradientSubtract,
    Stage::AdvectVelocity,
    Stage::AdvectDensity,
    Stage::Output,
];

/// Host surface size in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width / height, or 1.0 for a degenerate (minimized) surface.
    pub fn aspect(&self) -> f32 {
        if self.width == 0 || self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Cheap per-frame field statistics a backend can report without a GPU stall.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FieldSummary {
    /// Sum of RGB magnitudes over the density grid
    pub total_density: f32,
    /// Largest velocity magnitude on the simulation grid
    pub peak_velocity: f32,
}

/// Storage and kernels for one simulation instance.
///
/// Every kernel method is a full-grid pass. Methods that write a double
/// buffered field write its write slot and swap before returning, so the next
/// call always reads the fresh result.
pub trait FluidBackend {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// Allocate every grid for `layout`, zero-initialized. Replaces any
    /// previous allocation.
    fn allocate(&mut self, layout: GridLayout) -> Result<(), FluidError>;

    /// Release every grid. Safe to call more than once.
    fn release(&mut self);

    /// Whether grids are currently allocated.
    fn is_allocated(&self) -> bool;

    /// Zero every field without reallocating.
    fn clear(&mut self);

    /// Called before the first stage of a frame.
    fn begin_frame(&mut self) {}

    /// Add a Gaussian impulse to the velocity field.
    fn splat_velocity(&mut self, params: &SplatParams);

    /// Add a Gaussian impulse to the density field.
    fn splat_density(&mut self, params: &SplatParams);

    /// Recompute the curl grid from velocity.
    fn curl(&mut self);

    /// Add the vorticity confinement force to velocity.
    fn vorticity(&mut self, params: &VorticityParams);

    /// Recompute the divergence grid from velocity.
    fn divergence(&mut self);

    /// Multiply the pressure field by a constant.
    fn scale_pressure(&mut self, params: &ScaleParams);

    /// One Jacobi relaxation step of the pressure field.
    fn jacobi(&mut self);

    /// Subtract the pressure gradient from velocity.
    fn subtract_gradient(&mut self);

    /// Semi-Lagrangian self-advection of velocity.
    fn advect_velocity(&mut self, params: &AdvectParams);

    /// Semi-Lagrangian advection of density through velocity.
    fn advect_density(&mut self, params: &AdvectParams);

    /// Finish the frame. The density read slot is the visual output afterwards.
    fn end_frame(&mut self) -> Result<(), FluidError>;

    /// Bytes held by every allocated grid.
    fn memory_usage_bytes(&self) -> u64;

    /// Field statistics for the last completed frame, if the backend can
    /// produce them cheaply.
    fn summary(&self) -> Option<FieldSummary> {
        None
    }
}

/// Run [`FRAME_STAGES`] once. `splats` must already be in application order.
///
/// Returns the number of splats applied.
pub fn run_frame<B: FluidBackend + ?Sized>(
    backend: &mut B,
    config: &SimulationConfig,
    viewport: Viewport,
    splats: &[Splat],
) -> Result<usize, FluidError> {
    if !backend.is_allocated() {
        return Err(FluidError::NotAllocated);
    }

    let layout = config.layout();
    let (sim_width, sim_height) = layout.dims(FieldId::Velocity);
    let (dye_width, dye_height) = layout.dims(FieldId::Density);
    let aspect = viewport.aspect();

    backend.begin_frame();

    for stage in FRAME_STAGES {
        log::trace!("{}: stage {}", backend.name(), stage.label());
        match stage {
            Stage::Splats => {
                for splat in splats {
                    backend.splat_velocity(&SplatParams::velocity(
                        splat, sim_width, sim_height, aspect,
                    ));
                    backend.splat_density(&SplatParams::density(
                        splat,
                        dye_width,
                        dye_height,
                        aspect,
                        config.fluid_color,
                        config.intensity,
                    ));
                }
            }
            Stage::Curl => backend.curl(),
            Stage::Vorticity => backend.vorticity(&VorticityParams {
                width: sim_width,
                height: sim_height,
                curl_strength: config.curl,
                limit: MAX_VELOCITY,
            }),
            Stage::Divergence => backend.divergence(),
            Stage::PressureWarmStart => backend.scale_pressure(&ScaleParams {
                width: sim_width,
                height: sim_height,
                factor: config.pressure,
                _pad0: 0.0,
            }),
            Stage::PressureSolve => {
                for _ in 0..config.swirl {
                    backend.jacobi();
                }
            }
            Stage::GradientSubtract => backend.subtract_gradient(),
            Stage::AdvectVelocity => backend.advect_velocity(&AdvectParams {
                width: sim_width,
                height: sim_height,
                sim_width,
                sim_height,
                dissipation: config.velocity_dissipation,
                limit: MAX_VELOCITY,
                _pad0: 0.0,
                _pad1: 0.0,
            }),
            Stage::AdvectDensity => backend.advect_density(&AdvectParams {
                width: dye_width,
                height: dye_height,
                sim_width,
                sim_height,
                dissipation: config.density_dissipation,
                limit: 0.0,
                _pad0: 0.0,
                _pad1: 0.0,
            }),
            Stage::Output => backend.end_frame()?,
        }
    }

    Ok(splats.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    /// Records the kernel calls it receives.
    #[derive(Default)]
    struct RecordingBackend {
        allocated: bool,
        calls: Vec<&'static str>,
        splat_points: Vec<[f32; 2]>,
        density_params: Vec<SplatParams>,
        advect_params: Vec<AdvectParams>,
    }

    impl FluidBackend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }
        fn allocate(&mut self, _layout: GridLayout) -> Result<(), FluidError> {
            self.allocated = true;
            Ok(())
        }
        fn release(&mut self) {
            self.allocated = false;
        }
        fn is_allocated(&self) -> bool {
            self.allocated
        }
        fn clear(&mut self) {}
        fn begin_frame(&mut self) {
            self.calls.push("begin");
        }
        fn splat_velocity(&mut self, params: &SplatParams) {
            self.calls.push("splat_velocity");
            self.splat_points.push(params.point);
        }
        fn splat_density(&mut self, params: &SplatParams) {
            self.calls.push("splat_density");
            self.density_params.push(*params);
        }
        fn curl(&mut self) {
            self.calls.push("curl");
        }
        fn vorticity(&mut self, _params: &VorticityParams) {
            self.calls.push("vorticity");
        }
        fn divergence(&mut self) {
            self.calls.push("divergence");
        }
        fn scale_pressure(&mut self, _params: &ScaleParams) {
            self.calls.push("scale_pressure");
        }
        fn jacobi(&mut self) {
            self.calls.push("jacobi");
        }
        fn subtract_gradient(&mut self) {
            self.calls.push("subtract_gradient");
        }
        fn advect_velocity(&mut self, params: &AdvectParams) {
            self.calls.push("advect_velocity");
            self.advect_params.push(*params);
        }
        fn advect_density(&mut self, params: &AdvectParams) {
            self.calls.push("advect_density");
            self.advect_params.push(*params);
        }
        fn end_frame(&mut self) -> Result<(), FluidError> {
            self.calls.push("end");
            Ok(())
        }
        fn memory_usage_bytes(&self) -> u64 {
            0
        }
    }

    fn splat_at(x: f32) -> Splat {
        Splat {
            position: Vec2::new(x, 0.5),
            velocity: Vec2::new(1.0, 0.0),
            radius: 0.14,
        }
    }

    fn allocated_backend() -> RecordingBackend {
        let mut backend = RecordingBackend::default();
        backend
            .allocate(SimulationConfig::default().layout())
            .unwrap();
        backend
    }

    #[test]
    fn test_stage_order_is_fixed() {
        assert_eq!(FRAME_STAGES[0], Stage::Splats);
        assert_eq!(FRAME_STAGES[9], Stage::Output);
        let position = |s: Stage| FRAME_STAGES.iter().position(|&x| x == s).unwrap();
        assert!(position(Stage::Curl) < position(Stage::Vorticity));
        assert!(position(Stage::Divergence) < position(Stage::PressureSolve));
        assert!(position(Stage::PressureWarmStart) < position(Stage::PressureSolve));
        assert!(position(Stage::GradientSubtract) < position(Stage::AdvectVelocity));
        assert!(position(Stage::AdvectVelocity) < position(Stage::AdvectDensity));
    }

    #[test]
    fn test_frame_issues_kernels_in_order() {
        let mut backend = allocated_backend();
        let config = SimulationConfig {
            swirl: 3,
            ..SimulationConfig::default()
        };

        let applied = run_frame(&mut backend, &config, Viewport::new(800, 600), &[splat_at(0.5)]).unwrap();
        assert_eq!(applied, 1);
        assert_eq!(
            backend.calls,
            vec![
                "begin",
                "splat_velocity",
                "splat_density",
                "curl",
                "vorticity",
                "divergence",
                "scale_pressure",
                "jacobi",
                "jacobi",
                "jacobi",
                "subtract_gradient",
                "advect_velocity",
                "advect_density",
                "end",
            ]
        );
    }

    #[test]
    fn test_jacobi_runs_swirl_times() {
        for swirl in [1, 7, 20] {
            let mut backend = allocated_backend();
            let config = SimulationConfig {
                swirl,
                ..SimulationConfig::default()
            };
            run_frame(&mut backend, &config, Viewport::new(100, 100), &[]).unwrap();
            let count = backend.calls.iter().filter(|&&c| c == "jacobi").count();
            assert_eq!(count, swirl as usize);
        }
    }

    #[test]
    fn test_splats_applied_in_given_order_before_other_stages() {
        let mut backend = allocated_backend();
        let splats = [splat_at(0.3), splat_at(0.2), splat_at(0.1)];
        run_frame(&mut backend, &SimulationConfig::default(), Viewport::new(100, 100), &splats).unwrap();

        let xs: Vec<f32> = backend.splat_points.iter().map(|p| p[0]).collect();
        assert_eq!(xs, vec![0.3, 0.2, 0.1]);

        let last_splat = backend.calls.iter().rposition(|c| c.starts_with("splat")).unwrap();
        let curl = backend.calls.iter().position(|&c| c == "curl").unwrap();
        assert!(last_splat < curl);
    }

    #[test]
    fn test_frame_parameters_come_from_config() {
        let mut backend = allocated_backend();
        let config = SimulationConfig::default();
        run_frame(&mut backend, &config, Viewport::new(400, 200), &[splat_at(0.5)]).unwrap();

        let density = backend.density_params[0];
        assert_eq!(density.aspect, 2.0);
        assert_eq!((density.width, density.height), (config.dye_res, config.dye_res));

        let velocity_advect = backend.advect_params[0];
        let density_advect = backend.advect_params[1];
        assert_eq!(velocity_advect.dissipation, config.velocity_dissipation);
        assert_eq!(density_advect.dissipation, config.density_dissipation);
        assert_eq!(density_advect.sim_width, config.sim_res);
        assert_eq!(density_advect.width, config.dye_res);
    }

    #[test]
    fn test_unallocated_backend_is_rejected() {
        let mut backend = RecordingBackend::default();
        let result = run_frame(&mut backend, &SimulationConfig::default(), Viewport::new(1, 1), &[]);
        assert!(matches!(result, Err(FluidError::NotAllocated)));
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn test_degenerate_viewport_aspect() {
        assert_eq!(Viewport::new(0, 600).aspect(), 1.0);
        assert_eq!(Viewport::new(800, 0).aspect(), 1.0);
        assert_eq!(Viewport::new(300, 150).aspect(), 2.0);
    }
}
