//! Per-texel numerical kernels and their typed parameter blocks.
//!
//! Each parameter struct is laid out to match the uniform block of the WGSL
//! kernel with the same name in `shaders/fluid/`, so the GPU backend uploads
//! them with `bytemuck::cast_slice` and the CPU backend calls the Rust
//! functions below with the very same values.
//!
//! Conventions shared by both backends:
//! - `L`, `R`, `B`, `T` are the left, right, bottom and top neighbours.
//! - Neighbour reads clamp to the edge, except divergence which treats the
//!   outside of the grid as a free-slip wall (negated centre component).
//! - Scalar fields live in the `.x` component.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec4};

use super::grid::{Grid, Texel};
use super::splat::Splat;

/// Velocity components are clamped to this magnitude (texels per tick).
pub const MAX_VELOCITY: f32 = 1000.0;

/// Keeps the normalized vorticity gradient finite where `|curl|` is flat.
pub const VORTICITY_EPSILON: f32 = 1e-4;

/// Parameters for kernels that only need the grid extent.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct GridParams {
    pub width: u32,
    pub height: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

impl GridParams {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            _pad0: 0,
            _pad1: 0,
        }
    }
}

/// Gaussian injection into the velocity or density field (48 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct SplatParams {
    pub width: u32,
    pub height: u32,
    /// Viewport width / height, applied to the x offset
    pub aspect: f32,
    /// Gaussian denominator: `exp(-|p|^2 / falloff)`
    pub falloff: f32,
    pub point: [f32; 2],
    /// Per-component clamp on the result, 0 disables clamping
    pub limit: f32,
    pub _pad0: f32,
    pub color: [f32; 4],
}

impl SplatParams {
    /// Velocity impulse: the pointer velocity becomes the splat colour.
    pub fn velocity(splat: &Splat, width: u32, height: u32, aspect: f32) -> Self {
        Self {
            width,
            height,
            aspect,
            falloff: splat.radius / 100.0,
            point: splat.position.to_array(),
            limit: MAX_VELOCITY,
            _pad0: 0.0,
            color: [splat.velocity.x, splat.velocity.y, 0.0, 0.0],
        }
    }

    /// Dye injection: the configured fluid colour scaled by `intensity`.
    pub fn density(
        splat: &Splat,
        width: u32,
        height: u32,
        aspect: f32,
        fluid_color: [f32; 4],
        intensity: f32,
    ) -> Self {
        let color = Vec4::from_array(fluid_color) * intensity;
        Self {
            width,
            height,
            aspect,
            falloff: splat.radius / 100.0,
            point: splat.position.to_array(),
            limit: 0.0,
            _pad0: 0.0,
            color: color.to_array(),
        }
    }
}

/// Vorticity confinement strength.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct VorticityParams {
    pub width: u32,
    pub height: u32,
    pub curl_strength: f32,
    pub limit: f32,
}

/// Uniform scale of a whole field (pressure warm-start).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ScaleParams {
    pub width: u32,
    pub height: u32,
    pub factor: f32,
    pub _pad0: f32,
}

/// Semi-Lagrangian advection of a target field through the velocity field.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct AdvectParams {
    /// Extent of the advected (and written) field
    pub width: u32,
    pub height: u32,
    /// Extent of the velocity field used for the back-trace
    pub sim_width: u32,
    pub sim_height: u32,
    pub dissipation: f32,
    pub limit: f32,
    pub _pad0: f32,
    pub _pad1: f32,
}

/// Replace non-finite components with 0 and clamp to `±limit` when `limit > 0`.
#[inline]
pub fn sanitize(value: Vec4, limit: f32) -> Vec4 {
    let finite = Vec4::select(value.is_finite_mask(), value, Vec4::ZERO);
    if limit > 0.0 {
        finite.clamp(Vec4::splat(-limit), Vec4::splat(limit))
    } else {
        finite
    }
}

/// Base texel plus a Gaussian bump of `params.color` centred on `params.point`.
#[inline]
pub fn splat_texel(base: Texel, uv: Vec2, params: &SplatParams) -> Texel {
    let mut p = uv - Vec2::from_array(params.point);
    p.x *= params.aspect;
    let weight = (-p.dot(p) / params.falloff).exp();
    let value = Vec4::from_array(base) + Vec4::from_array(params.color) * weight;
    sanitize(value, params.limit).to_array()
}

/// Scalar vorticity of the velocity field.
#[inline]
pub fn curl_texel(velocity: &Grid, x: u32, y: u32) -> Texel {
    let (xi, yi) = (x as i32, y as i32);
    let l = velocity.clamped(xi - 1, yi)[1];
    let r = velocity.clamped(xi + 1, yi)[1];
    let t = velocity.clamped(xi, yi + 1)[0];
    let b = velocity.clamped(xi, yi - 1)[0];
    let vorticity = 0.5 * (r - l - t + b);
    [vorticity, 0.0, 0.0, 0.0]
}

/// Velocity plus the vorticity confinement force.
#[inline]
pub fn vorticity_texel(
    velocity: &Grid,
    curl: &Grid,
    x: u32,
    y: u32,
    params: &VorticityParams,
) -> Texel {
    let (xi, yi) = (x as i32, y as i32);
    let l = curl.clamped(xi - 1, yi)[0];
    let r = curl.clamped(xi + 1, yi)[0];
    let t = curl.clamped(xi, yi + 1)[0];
    let b = curl.clamped(xi, yi - 1)[0];
    let c = curl.get(x, y)[0];

    let mut force = 0.5 * Vec2::new(t.abs() - b.abs(), r.abs() - l.abs());
    force /= force.length() + VORTICITY_EPSILON;
    force *= params.curl_strength * c;
    force.y = -force.y;

    let mut v = Vec4::from_array(velocity.get(x, y));
    v.x += force.x;
    v.y += force.y;
    sanitize(v, params.limit).to_array()
}

/// Central-difference divergence with free-slip walls.
#[inline]
pub fn divergence_texel(velocity: &Grid, x: u32, y: u32) -> Texel {
    let c = velocity.get(x, y);
    let l = if x == 0 { -c[0] } else { velocity.get(x - 1, y)[0] };
    let r = if x + 1 >= velocity.width() { -c[0] } else { velocity.get(x + 1, y)[0] };
    let b = if y == 0 { -c[1] } else { velocity.get(x, y - 1)[1] };
    let t = if y + 1 >= velocity.height() { -c[1] } else { velocity.get(x, y + 1)[1] };
    let div = 0.5 * (r - l + t - b);
    [div, 0.0, 0.0, 0.0]
}

#[inline]
pub fn scale_texel(value: Texel, params: &ScaleParams) -> Texel {
    sanitize(Vec4::from_array(value) * params.factor, 0.0).to_array()
}

/// One Jacobi relaxation step of `laplacian(p) = div`.
#[inline]
pub fn jacobi_texel(pressure: &Grid, divergence: &Grid, x: u32, y: u32) -> Texel {
    let (xi, yi) = (x as i32, y as i32);
    let l = pressure.clamped(xi - 1, yi)[0];
    let r = pressure.clamped(xi + 1, yi)[0];
    let b = pressure.clamped(xi, yi - 1)[0];
    let t = pressure.clamped(xi, yi + 1)[0];
    let div = divergence.get(x, y)[0];
    let p = (l + r + b + t - div) * 0.25;
    [if p.is_finite() { p } else { 0.0 }, 0.0, 0.0, 0.0]
}

/// Velocity minus the pressure gradient.
#[inline]
pub fn gradient_subtract_texel(velocity: &Grid, pressure: &Grid, x: u32, y: u32) -> Texel {
    let (xi, yi) = (x as i32, y as i32);
    let l = pressure.clamped(xi - 1, yi)[0];
    let r = pressure.clamped(xi + 1, yi)[0];
    let b = pressure.clamped(xi, yi - 1)[0];
    let t = pressure.clamped(xi, yi + 1)[0];

    let mut v = Vec4::from_array(velocity.get(x, y));
    v.x -= 0.5 * (r - l);
    v.y -= 0.5 * (t - b);
    sanitize(v, MAX_VELOCITY).to_array()
}

/// Back-trace `uv` one tick through `velocity` and sample `source` there.
#[inline]
pub fn advect_texel(velocity: &Grid, source: &Grid, uv: Vec2, params: &AdvectParams) -> Texel {
    let sim_texel = Vec2::new(
        1.0 / params.sim_width as f32,
        1.0 / params.sim_height as f32,
    );
    let v = velocity.sample_bilinear(uv).truncate().truncate();
    let coord = uv - v * sim_texel;
    let value = source.sample_bilinear(coord) * params.dissipation;
    sanitize(value, params.limit).to_array()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::grid::FieldId;

    fn grid_from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> Texel) -> Grid {
        let mut grid = Grid::zeroed(FieldId::Velocity, width, height).unwrap();
        for y in 0..height {
            for x in 0..width {
                grid.set(x, y, f(x, y));
            }
        }
        grid
    }

    #[test]
    fn test_param_block_sizes_match_wgsl() {
        assert_eq!(std::mem::size_of::<GridParams>(), 16);
        assert_eq!(std::mem::size_of::<SplatParams>(), 48);
        assert_eq!(std::mem::size_of::<VorticityParams>(), 16);
        assert_eq!(std::mem::size_of::<ScaleParams>(), 16);
        assert_eq!(std::mem::size_of::<AdvectParams>(), 32);
    }

    #[test]
    fn test_sanitize() {
        let v = sanitize(Vec4::new(f32::NAN, f32::INFINITY, -5000.0, 3.0), MAX_VELOCITY);
        assert_eq!(v, Vec4::new(0.0, 0.0, -MAX_VELOCITY, 3.0));

        let unclamped = sanitize(Vec4::new(5000.0, 0.0, 0.0, 0.0), 0.0);
        assert_eq!(unclamped.x, 5000.0);
    }

    #[test]
    fn test_splat_is_gaussian() {
        let splat = Splat {
            position: Vec2::new(0.5, 0.5),
            velocity: Vec2::new(10.0, -4.0),
            radius: 0.14,
        };
        let params = SplatParams::velocity(&splat, 50, 50, 1.0);
        assert!((params.falloff - 0.0014).abs() < 1e-7);

        let peak = splat_texel([0.0; 4], Vec2::new(0.5, 0.5), &params);
        assert_eq!(peak, [10.0, -4.0, 0.0, 0.0]);

        let offset = 0.02;
        let expected = (-(offset * offset) / 0.0014f32).exp();
        let side = splat_texel([1.0, 1.0, 0.0, 0.0], Vec2::new(0.5 + offset, 0.5), &params);
        assert!((side[0] - (1.0 + 10.0 * expected)).abs() < 1e-5);
        assert!((side[1] - (1.0 - 4.0 * expected)).abs() < 1e-5);
    }

    #[test]
    fn test_splat_aspect_stretches_x_distance() {
        let splat = Splat {
            position: Vec2::new(0.5, 0.5),
            velocity: Vec2::new(1.0, 0.0),
            radius: 0.14,
        };
        let square = SplatParams::velocity(&splat, 16, 16, 1.0);
        let wide = SplatParams::velocity(&splat, 16, 16, 2.0);
        let uv = Vec2::new(0.55, 0.5);

        assert!(splat_texel([0.0; 4], uv, &wide)[0] < splat_texel([0.0; 4], uv, &square)[0]);
    }

    #[test]
    fn test_density_splat_uses_fluid_color_and_intensity() {
        let splat = Splat {
            position: Vec2::new(0.25, 0.75),
            velocity: Vec2::new(100.0, 100.0),
            radius: 0.14,
        };
        let params = SplatParams::density(&splat, 64, 64, 1.0, [0.5, 0.25, 0.0, 1.0], 4.0);
        let peak = splat_texel([0.0; 4], Vec2::new(0.25, 0.75), &params);
        assert_eq!(peak, [2.0, 1.0, 0.0, 4.0]);
    }

    #[test]
    fn test_curl_of_rigid_rotation_is_uniform() {
        // v = (-(y - c), x - c) has curl 2 everywhere
        let c = 4.5;
        let velocity = grid_from_fn(10, 10, |x, y| [-(y as f32 - c), x as f32 - c, 0.0, 0.0]);
        let curl = curl_texel(&velocity, 5, 5);
        assert!((curl[0] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_divergence_of_expansion_and_uniform_flow() {
        // v = (x, y) expands at rate 2
        let expanding = grid_from_fn(8, 8, |x, y| [x as f32, y as f32, 0.0, 0.0]);
        assert!((divergence_texel(&expanding, 3, 4)[0] - 2.0).abs() < 1e-5);

        let uniform = grid_from_fn(8, 8, |_, _| [3.0, -1.0, 0.0, 0.0]);
        assert!(divergence_texel(&uniform, 4, 4)[0].abs() < 1e-6);

        // Flow into the right wall is divergent there
        assert!(divergence_texel(&uniform, 7, 4)[0] < 0.0);
    }

    #[test]
    fn test_vorticity_without_curl_leaves_velocity() {
        let velocity = grid_from_fn(6, 6, |_, _| [1.0, 2.0, 0.0, 0.0]);
        let curl = Grid::zeroed(FieldId::Curl, 6, 6).unwrap();
        let params = VorticityParams {
            width: 6,
            height: 6,
            curl_strength: 1.0,
            limit: MAX_VELOCITY,
        };
        assert_eq!(vorticity_texel(&velocity, &curl, 2, 3, &params), [1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_vorticity_pushes_along_isolines() {
        // |curl| grows with y: gradient points +y, force = c * (N.y, -N.x) points +x
        let velocity = Grid::zeroed(FieldId::Velocity, 6, 6).unwrap();
        let curl = grid_from_fn(6, 6, |_, y| [y as f32, 0.0, 0.0, 0.0]);
        let params = VorticityParams {
            width: 6,
            height: 6,
            curl_strength: 2.0,
            limit: MAX_VELOCITY,
        };
        let v = vorticity_texel(&velocity, &curl, 3, 3, &params);
        assert!(v[0] > 0.0);
        assert!(v[1].abs() < 1e-6);
        assert!((v[0] - 2.0 * 3.0).abs() < 1e-2);
    }

    #[test]
    fn test_jacobi_step() {
        let pressure = grid_from_fn(3, 3, |x, y| [(x + y) as f32, 0.0, 0.0, 0.0]);
        let divergence = grid_from_fn(3, 3, |_, _| [2.0, 0.0, 0.0, 0.0]);
        // neighbours of (1, 1): 1 + 3 + 1 + 3 = 8
        let p = jacobi_texel(&pressure, &divergence, 1, 1);
        assert!((p[0] - (8.0 - 2.0) * 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_gradient_subtract_removes_linear_pressure_slope() {
        let velocity = grid_from_fn(5, 5, |_, _| [1.0, 1.0, 0.0, 0.0]);
        let pressure = grid_from_fn(5, 5, |x, _| [x as f32, 0.0, 0.0, 0.0]);
        let v = gradient_subtract_texel(&velocity, &pressure, 2, 2);
        assert!((v[0] - 0.0).abs() < 1e-6);
        assert!((v[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_advection_with_still_fluid_only_dissipates() {
        let velocity = Grid::zeroed(FieldId::Velocity, 8, 8).unwrap();
        let source = grid_from_fn(8, 8, |x, y| [x as f32, y as f32, 1.0, 1.0]);
        let params = AdvectParams {
            width: 8,
            height: 8,
            sim_width: 8,
            sim_height: 8,
            dissipation: 0.5,
            limit: 0.0,
            _pad0: 0.0,
            _pad1: 0.0,
        };
        let out = advect_texel(&velocity, &source, source.uv(3, 6), &params);
        assert_eq!(out, [1.5, 3.0, 0.5, 0.5]);
    }

    #[test]
    fn test_advection_traces_backwards_one_texel() {
        let velocity = grid_from_fn(8, 8, |_, _| [1.0, 0.0, 0.0, 0.0]);
        let source = grid_from_fn(8, 8, |x, _| [x as f32, 0.0, 0.0, 0.0]);
        let params = AdvectParams {
            width: 8,
            height: 8,
            sim_width: 8,
            sim_height: 8,
            dissipation: 1.0,
            limit: 0.0,
            _pad0: 0.0,
            _pad1: 0.0,
        };
        // Flow to +x by one texel per tick: texel 4 now holds what texel 3 held
        let out = advect_texel(&velocity, &source, source.uv(4, 2), &params);
        assert!((out[0] - 3.0).abs() < 1e-5);
    }
}
