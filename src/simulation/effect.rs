//! Lifecycle facade: owns a backend, its config and the splat queue.

use crate::error::FluidError;

use super::fluid_config::{ConfigOverrides, Profile, SimulationConfig};
use super::pipeline::{run_frame, FieldSummary, FluidBackend, Viewport};
use super::splat::SplatQueue;

/// Outcome of one `step()`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameStats {
    /// Number of frames simulated so far, this one included
    pub frame_index: u64,
    pub splats_applied: usize,
    /// Splats drained without being applied (paused or disposed)
    pub splats_discarded: usize,
    /// Field statistics, if the backend reports them
    pub summary: Option<FieldSummary>,
}

/// One running instance of the fluid effect.
///
/// Grids are allocated in the constructor and released by `dispose()` or on
/// drop. A disposed simulation keeps accepting `step()` calls as no-ops.
pub struct FluidSimulation<B: FluidBackend> {
    backend: B,
    config: SimulationConfig,
    profile: Profile,
    overrides: ConfigOverrides,
    viewport: Viewport,
    splats: SplatQueue,
    frame_index: u64,
    /// Whether stepping is suspended
    pub paused: bool,
}

impl<B: FluidBackend> FluidSimulation<B> {
    /// Build a validated config from `profile` + `overrides` and allocate every grid.
    pub fn new(
        mut backend: B,
        profile: Profile,
        overrides: ConfigOverrides,
        viewport: Viewport,
    ) -> Result<Self, FluidError> {
        let config = SimulationConfig::from_profile(profile, &overrides)?;
        backend.allocate(config.layout())?;
        log::info!(
            "Fluid simulation started on {} backend ({:?} profile, {}x{} viewport)",
            backend.name(),
            profile,
            viewport.width,
            viewport.height
        );

        Ok(Self {
            backend,
            config,
            profile,
            overrides,
            viewport,
            splats: SplatQueue::new(),
            frame_index: 0,
            paused: false,
        })
    }

    /// Like [`FluidSimulation::new`], picking the profile from the viewport width.
    pub fn for_viewport(
        backend: B,
        viewport: Viewport,
        overrides: ConfigOverrides,
    ) -> Result<Self, FluidError> {
        let profile = Profile::for_viewport_width(viewport.width);
        Self::new(backend, profile, overrides, viewport)
    }

    /// Run one frame: drain the splat queue (LIFO) and execute every stage.
    pub fn step(&mut self) -> Result<FrameStats, FluidError> {
        let splats = self.splats.drain_lifo();

        if self.paused || !self.backend.is_allocated() {
            if !splats.is_empty() {
                log::trace!("Discarding {} splats while idle", splats.len());
            }
            return Ok(FrameStats {
                frame_index: self.frame_index,
                splats_applied: 0,
                splats_discarded: splats.len(),
                summary: None,
            });
        }

        let applied = run_frame(&mut self.backend, &self.config, self.viewport, &splats)?;
        self.frame_index += 1;

        Ok(FrameStats {
            frame_index: self.frame_index,
            splats_applied: applied,
            splats_discarded: 0,
            summary: self.backend.summary(),
        })
    }

    /// Track a new surface size. Grid resolutions are fixed; only the aspect
    /// ratio used by splats changes.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = Viewport::new(width, height);
        log::debug!("Fluid viewport resized to {}x{}", width, height);
    }

    /// Switch profile: rebuild the config and reallocate every grid zeroed.
    pub fn set_profile(&mut self, profile: Profile) -> Result<(), FluidError> {
        let config = SimulationConfig::from_profile(profile, &self.overrides)?;
        self.backend.allocate(config.layout())?;
        log::info!(
            "Switched fluid profile to {:?} (sim {}, dye {})",
            profile,
            config.sim_res,
            config.dye_res
        );
        self.config = config;
        self.profile = profile;
        Ok(())
    }

    /// Zero every field and drop pending splats.
    pub fn reset(&mut self) {
        self.splats.clear();
        self.backend.clear();
        log::info!("Fluid simulation reset");
    }

    /// Release every grid. Later `step()` calls do nothing.
    pub fn dispose(&mut self) {
        self.splats.clear();
        self.backend.release();
    }

    pub fn is_disposed(&self) -> bool {
        !self.backend.is_allocated()
    }

    /// Producer handle for the input side.
    pub fn splat_queue(&self) -> SplatQueue {
        self.splats.clone()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn memory_usage_bytes(&self) -> u64 {
        self.backend.memory_usage_bytes()
    }
}

impl<B: FluidBackend> Drop for FluidSimulation<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::cpu_fluid::CpuFluidBackend;
    use crate::simulation::grid::FieldId;
    use crate::simulation::splat::Splat;
    use glam::Vec2;

    fn simulation(profile: Profile) -> FluidSimulation<CpuFluidBackend> {
        FluidSimulation::new(
            CpuFluidBackend::new(),
            profile,
            ConfigOverrides::default(),
            Viewport::new(1024, 768),
        )
        .unwrap()
    }

    fn splat(x: f32) -> Splat {
        Splat {
            position: Vec2::new(x, 0.5),
            velocity: Vec2::new(4.0, 1.0),
            radius: 0.14,
        }
    }

    #[test]
    fn test_step_drains_queue() {
        let mut sim = simulation(Profile::Reduced);
        let queue = sim.splat_queue();
        queue.push(splat(0.3));
        queue.push(splat(0.7));

        let stats = sim.step().unwrap();
        assert_eq!(stats.frame_index, 1);
        assert_eq!(stats.splats_applied, 2);
        assert!(queue.is_empty());
        assert!(stats.summary.unwrap().total_density > 0.0);

        let stats = sim.step().unwrap();
        assert_eq!(stats.frame_index, 2);
        assert_eq!(stats.splats_applied, 0);
    }

    #[test]
    fn test_paused_step_discards_splats() {
        let mut sim = simulation(Profile::Reduced);
        sim.paused = true;
        sim.splat_queue().push(splat(0.5));

        let stats = sim.step().unwrap();
        assert_eq!(stats.splats_applied, 0);
        assert_eq!(stats.splats_discarded, 1);
        assert_eq!(sim.frame_index(), 0);
        assert!(sim.backend().field(FieldId::Density).unwrap().is_zero());

        sim.paused = false;
        let stats = sim.step().unwrap();
        assert_eq!(stats.splats_applied, 0);
        assert!(sim.backend().field(FieldId::Density).unwrap().is_zero());
    }

    #[test]
    fn test_profile_switch_reallocates_zeroed() {
        let mut sim = simulation(Profile::Standard);
        sim.splat_queue().push(splat(0.5));
        sim.step().unwrap();
        assert!(!sim.backend().field(FieldId::Velocity).unwrap().is_zero());

        sim.set_profile(Profile::Reduced).unwrap();
        assert_eq!(sim.profile(), Profile::Reduced);
        assert_eq!(sim.config().sim_res, 16);
        assert_eq!(sim.config().dye_res, 64);

        for field in FieldId::ALL {
            let grid = sim.backend().field(field).unwrap();
            let expected = if field == FieldId::Density { 64 } else { 16 };
            assert_eq!((grid.width(), grid.height()), (expected, expected), "{}", field.label());
            assert!(grid.is_zero(), "{}", field.label());
        }
    }

    #[test]
    fn test_profile_toggle_round_trip() {
        let mut sim = simulation(Profile::Standard);
        sim.set_profile(sim.profile().toggled()).unwrap();
        sim.set_profile(sim.profile().toggled()).unwrap();

        assert_eq!(sim.profile(), Profile::Standard);
        assert_eq!(sim.config(), &Profile::Standard.defaults());
        assert_eq!(sim.backend().layout(), Some(Profile::Standard.defaults().layout()));
    }

    #[test]
    fn test_profile_switch_keeps_overrides() {
        let overrides = ConfigOverrides {
            swirl: Some(12),
            ..Default::default()
        };
        let mut sim = FluidSimulation::new(
            CpuFluidBackend::new(),
            Profile::Standard,
            overrides,
            Viewport::new(1024, 768),
        )
        .unwrap();

        sim.set_profile(Profile::Reduced).unwrap();
        assert_eq!(sim.config().swirl, 12);
        assert_eq!(sim.config().sim_res, 16);
    }

    #[test]
    fn test_resize_only_changes_aspect() {
        let mut sim = simulation(Profile::Reduced);
        let memory = sim.memory_usage_bytes();

        sim.resize(300, 900);
        assert_eq!(sim.viewport(), Viewport::new(300, 900));
        assert_eq!(sim.config().sim_res, 16);
        assert_eq!(sim.memory_usage_bytes(), memory);
        assert_eq!(sim.profile(), Profile::Reduced);
    }

    #[test]
    fn test_reset_zeroes_fields() {
        let mut sim = simulation(Profile::Reduced);
        sim.splat_queue().push(splat(0.5));
        sim.step().unwrap();
        sim.splat_queue().push(splat(0.2));

        sim.reset();
        assert!(sim.splat_queue().is_empty());
        for field in FieldId::ALL {
            assert!(sim.backend().field(field).unwrap().is_zero());
        }
    }

    #[test]
    fn test_dispose_releases_and_step_is_noop() {
        let mut sim = simulation(Profile::Reduced);
        sim.dispose();
        assert!(sim.is_disposed());
        assert_eq!(sim.memory_usage_bytes(), 0);

        sim.splat_queue().push(splat(0.5));
        let stats = sim.step().unwrap();
        assert_eq!(stats.splats_applied, 0);
        assert_eq!(stats.splats_discarded, 1);

        sim.dispose();
    }

    #[test]
    fn test_profile_from_viewport_width() {
        let narrow = FluidSimulation::for_viewport(
            CpuFluidBackend::new(),
            Viewport::new(500, 900),
            ConfigOverrides::default(),
        )
        .unwrap();
        assert_eq!(narrow.profile(), Profile::Reduced);

        let wide = FluidSimulation::for_viewport(
            CpuFluidBackend::new(),
            Viewport::new(1920, 1080),
            ConfigOverrides::default(),
        )
        .unwrap();
        assert_eq!(wide.profile(), Profile::Standard);
        assert_eq!(wide.config().sim_res, 50);
    }

    #[test]
    fn test_invalid_config_never_allocates() {
        let overrides = ConfigOverrides {
            density_dissipation: Some(1.5),
            ..Default::default()
        };
        let result = FluidSimulation::new(
            CpuFluidBackend::new(),
            Profile::Standard,
            overrides,
            Viewport::new(800, 600),
        );
        assert!(matches!(result, Err(FluidError::Config(_))));
    }
}
