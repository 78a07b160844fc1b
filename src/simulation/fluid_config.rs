//! Simulation tunables: profiles, validated config and RON overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::grid::GridLayout;

/// Viewports narrower than this (in physical pixels) get the reduced profile.
pub const REDUCED_PROFILE_MAX_WIDTH: u32 = 768;

/// Largest grid edge accepted for either resolution.
pub const MAX_GRID_RESOLUTION: u32 = 4096;

/// Upper bound on Jacobi iterations per frame.
pub const MAX_PRESSURE_ITERATIONS: u32 = 256;

/// Built-in performance profiles.
///
/// The profile is picked once from the viewport width when the simulation is
/// created and only changes when the host explicitly switches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Profile {
    #[default]
    Standard,
    Reduced,
}

impl Profile {
    /// Select a profile from the host viewport width.
    pub fn for_viewport_width(width: u32) -> Self {
        if width < REDUCED_PROFILE_MAX_WIDTH {
            Profile::Reduced
        } else {
            Profile::Standard
        }
    }

    /// Default configuration values for this profile.
    pub fn defaults(self) -> SimulationConfig {
        match self {
            Profile::Standard => SimulationConfig::default(),
            Profile::Reduced => SimulationConfig {
                radius: 0.1,
                density_dissipation: 0.94,
                dye_res: 64,
                sim_res: 16,
                ..SimulationConfig::default()
            },
        }
    }

    /// The other profile.
    pub fn toggled(self) -> Self {
        match self {
            Profile::Standard => Profile::Reduced,
            Profile::Reduced => Profile::Standard,
        }
    }
}

/// Tunable constants for one simulation instance.
///
/// Treated as read-only once a simulation has been built from it; switching
/// profiles builds a fresh config and reallocates every grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Edge length of the velocity, pressure, curl and divergence grids
    pub sim_res: u32,

    /// Edge length of the density (dye) grid
    pub dye_res: u32,

    /// Amount of dye injected per splat (scales `fluid_color`)
    pub intensity: f32,

    /// Pointer delta to velocity multiplier
    pub force: f32,

    /// Splat radius in screen units; the Gaussian falloff uses `radius / 100`
    pub radius: f32,

    /// Vorticity confinement strength
    pub curl: f32,

    /// Jacobi iterations per frame
    pub swirl: u32,

    /// Pressure warm-start factor applied before the Jacobi solve
    pub pressure: f32,

    /// Per-tick velocity decay, in (0, 1]
    pub velocity_dissipation: f32,

    /// Per-tick dye decay, in (0, 1]
    pub density_dissipation: f32,

    /// Linear RGBA dye colour
    pub fluid_color: [f32; 4],

    /// Linear RGBA colour the compositor blends the dye against
    pub background_color: [f32; 4],
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sim_res: 50,
            dye_res: 256,
            intensity: 5.0,
            force: 1.0,
            radius: 0.14,
            curl: 1.0,
            swirl: 3,
            pressure: 0.0,
            velocity_dissipation: 0.93,
            density_dissipation: 0.965,
            fluid_color: [0.96, 0.31, 0.1, 1.0],
            background_color: [0.02, 0.02, 0.03, 1.0],
        }
    }
}

impl SimulationConfig {
    /// Build a validated config from a profile plus field overrides.
    pub fn from_profile(profile: Profile, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let config = overrides.apply(profile.defaults());
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would let the solver grow without bound or
    /// allocate degenerate grids.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_resolution("sim_res", self.sim_res)?;
        check_resolution("dye_res", self.dye_res)?;

        if self.swirl == 0 || self.swirl > MAX_PRESSURE_ITERATIONS {
            return Err(ConfigError::OutOfRange {
                field: "swirl",
                value: self.swirl as f64,
                expected: "1..=256",
            });
        }

        check_unit_interval("velocity_dissipation", self.velocity_dissipation, false)?;
        check_unit_interval("density_dissipation", self.density_dissipation, false)?;
        check_unit_interval("pressure", self.pressure, true)?;

        check_non_negative("intensity", self.intensity)?;
        check_non_negative("force", self.force)?;
        check_positive("radius", self.radius)?;
        check_non_negative("curl", self.curl)?;

        for (field, color) in [
            ("fluid_color", self.fluid_color),
            ("background_color", self.background_color),
        ] {
            if let Some(bad) = color.iter().find(|c| !c.is_finite()) {
                return Err(ConfigError::OutOfRange {
                    field,
                    value: *bad as f64,
                    expected: "finite components",
                });
            }
        }

        Ok(())
    }

    /// Texel spacing of the simulation grids.
    pub fn sim_texel_size(&self) -> f32 {
        1.0 / self.sim_res as f32
    }

    /// Grid resolutions this config allocates.
    pub fn layout(&self) -> GridLayout {
        GridLayout {
            sim_res: self.sim_res,
            dye_res: self.dye_res,
        }
    }
}

fn check_resolution(field: &'static str, value: u32) -> Result<(), ConfigError> {
    if value == 0 || value > MAX_GRID_RESOLUTION {
        return Err(ConfigError::OutOfRange {
            field,
            value: value as f64,
            expected: "1..=4096",
        });
    }
    Ok(())
}

fn check_unit_interval(field: &'static str, value: f32, allow_zero: bool) -> Result<(), ConfigError> {
    let lower_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
    if !(lower_ok && value <= 1.0) {
        return Err(ConfigError::OutOfRange {
            field,
            value: value as f64,
            expected: if allow_zero { "[0, 1]" } else { "(0, 1]" },
        });
    }
    Ok(())
}

fn check_non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(ConfigError::OutOfRange {
            field,
            value: value as f64,
            expected: "finite and >= 0",
        });
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::OutOfRange {
            field,
            value: value as f64,
            expected: "finite and > 0",
        });
    }
    Ok(())
}

/// Per-field overrides layered on top of a profile.
///
/// Only the fields present are serialized, so an overrides file stays as
/// small as the set of values it actually changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sim_res: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dye_res: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curl: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swirl: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity_dissipation: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub density_dissipation: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fluid_color: Option<[f32; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<[f32; 4]>,
}

impl ConfigOverrides {
    /// Apply the present fields to `base`.
    pub fn apply(&self, base: SimulationConfig) -> SimulationConfig {
        SimulationConfig {
            sim_res: self.sim_res.unwrap_or(base.sim_res),
            dye_res: self.dye_res.unwrap_or(base.dye_res),
            intensity: self.intensity.unwrap_or(base.intensity),
            force: self.force.unwrap_or(base.force),
            radius: self.radius.unwrap_or(base.radius),
            curl: self.curl.unwrap_or(base.curl),
            swirl: self.swirl.unwrap_or(base.swirl),
            pressure: self.pressure.unwrap_or(base.pressure),
            velocity_dissipation: self.velocity_dissipation.unwrap_or(base.velocity_dissipation),
            density_dissipation: self.density_dissipation.unwrap_or(base.density_dissipation),
            fluid_color: self.fluid_color.unwrap_or(base.fluid_color),
            background_color: self.background_color.unwrap_or(base.background_color),
        }
    }

    /// Parse overrides from RON text.
    pub fn from_ron_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(contents)?)
    }

    /// Load overrides from a RON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load overrides from `path`, falling back to no overrides if the file is
    /// missing or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            log::info!("No fluid overrides at {:?}, using profile defaults", path);
            return Self::default();
        }

        match Self::load(path) {
            Ok(overrides) => {
                log::info!("Loaded fluid overrides from {:?}", path);
                overrides
            }
            Err(e) => {
                log::warn!("Failed to load fluid overrides: {}. Using profile defaults.", e);
                Self::default()
            }
        }
    }

    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }
}

/// Error type for configuration building and loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("RON serialize error: {0}")]
    Serialize(#[from] ron::Error),
}
