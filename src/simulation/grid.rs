//! CPU-resident 2D grids of four-component float texels.
//!
//! Row 0 is the bottom of the domain (v = 0), matching the normalized pointer
//! coordinates produced by the input translator. Texel `(x, y)` sits at
//! `uv = ((x + 0.5) / width, (y + 0.5) / height)`.

use glam::{Vec2, Vec4};

use crate::error::FluidError;

/// One RGBA32F texel. Scalar fields (pressure, curl, divergence) use `.x`.
pub type Texel = [f32; 4];

/// Identifies one physical field of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    Velocity,
    Density,
    Pressure,
    Curl,
    Divergence,
}

impl FieldId {
    pub const ALL: [FieldId; 5] = [
        FieldId::Velocity,
        FieldId::Density,
        FieldId::Pressure,
        FieldId::Curl,
        FieldId::Divergence,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FieldId::Velocity => "velocity",
            FieldId::Density => "density",
            FieldId::Pressure => "pressure",
            FieldId::Curl => "curl",
            FieldId::Divergence => "divergence",
        }
    }

    /// Whether this field is ping-ponged (fed back into itself each frame).
    pub fn is_double_buffered(self) -> bool {
        matches!(self, FieldId::Velocity | FieldId::Density | FieldId::Pressure)
    }
}

/// Resolutions of the two grid families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub sim_res: u32,
    pub dye_res: u32,
}

impl GridLayout {
    /// Edge lengths `(width, height)` of the given field.
    pub fn dims(&self, field: FieldId) -> (u32, u32) {
        match field {
            FieldId::Density => (self.dye_res, self.dye_res),
            _ => (self.sim_res, self.sim_res),
        }
    }

    /// Bytes needed to hold every field, counting both slots of the double buffers.
    pub fn memory_usage_bytes(&self) -> u64 {
        FieldId::ALL
            .iter()
            .map(|&field| {
                let (w, h) = self.dims(field);
                let slots = if field.is_double_buffered() { 2 } else { 1 };
                w as u64 * h as u64 * std::mem::size_of::<Texel>() as u64 * slots
            })
            .sum()
    }
}

/// A fixed-size grid of texels.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    width: u32,
    height: u32,
    texels: Vec<Texel>,
}

impl Grid {
    /// Allocate a zero-initialized grid.
    ///
    /// Allocation failure is reported instead of aborting so the host can
    /// disable the effect.
    pub fn zeroed(field: FieldId, width: u32, height: u32) -> Result<Self, FluidError> {
        if width == 0 || height == 0 {
            return Err(FluidError::allocation(field.label(), width, height, "empty grid"));
        }

        let len = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| FluidError::allocation(field.label(), width, height, "size overflow"))?;

        let mut texels = Vec::new();
        texels
            .try_reserve_exact(len)
            .map_err(|e| FluidError::allocation(field.label(), width, height, e.to_string()))?;
        texels.resize(len, [0.0; 4]);

        Ok(Self {
            width,
            height,
            texels,
        })
    }

    /// Wrap texels read back from elsewhere (row-major, row 0 at the bottom).
    pub fn from_texels(
        field: FieldId,
        width: u32,
        height: u32,
        texels: Vec<Texel>,
    ) -> Result<Self, FluidError> {
        if texels.len() != width as usize * height as usize {
            return Err(FluidError::allocation(
                field.label(),
                width,
                height,
                format!("expected {} texels, got {}", width as usize * height as usize, texels.len()),
            ));
        }
        Ok(Self {
            width,
            height,
            texels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texels(&self) -> &[Texel] {
        &self.texels
    }

    pub fn texels_mut(&mut self) -> &mut [Texel] {
        &mut self.texels
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Texel at integer coordinates.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Texel {
        self.texels[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: Texel) {
        let index = self.index(x, y);
        self.texels[index] = value;
    }

    /// Texel at signed coordinates with clamp-to-edge addressing.
    #[inline]
    pub fn clamped(&self, x: i32, y: i32) -> Texel {
        let cx = x.clamp(0, self.width as i32 - 1) as u32;
        let cy = y.clamp(0, self.height as i32 - 1) as u32;
        self.get(cx, cy)
    }

    /// Normalized coordinate of a texel centre.
    #[inline]
    pub fn uv(&self, x: u32, y: u32) -> Vec2 {
        Vec2::new(
            (x as f32 + 0.5) / self.width as f32,
            (y as f32 + 0.5) / self.height as f32,
        )
    }

    /// Bilinear sample at a normalized coordinate (clamp-to-edge).
    pub fn sample_bilinear(&self, uv: Vec2) -> Vec4 {
        let st = uv * Vec2::new(self.width as f32, self.height as f32) - Vec2::splat(0.5);
        let base = st.floor();
        let frac = st - base;
        let x0 = base.x as i32;
        let y0 = base.y as i32;

        let a = Vec4::from_array(self.clamped(x0, y0));
        let b = Vec4::from_array(self.clamped(x0 + 1, y0));
        let c = Vec4::from_array(self.clamped(x0, y0 + 1));
        let d = Vec4::from_array(self.clamped(x0 + 1, y0 + 1));

        a.lerp(b, frac.x).lerp(c.lerp(d, frac.x), frac.y)
    }

    /// Reset every texel to zero.
    pub fn clear(&mut self) {
        self.texels.fill([0.0; 4]);
    }

    /// Sum of the RGB magnitudes over all texels.
    pub fn total_magnitude(&self) -> f32 {
        self.texels
            .iter()
            .map(|t| Vec4::from_array(*t).truncate().length())
            .sum()
    }

    /// Largest `(x, y)` magnitude over all texels.
    pub fn peak_xy_magnitude(&self) -> f32 {
        self.texels
            .iter()
            .map(|t| Vec2::new(t[0], t[1]).length())
            .fold(0.0, f32::max)
    }

    /// Integer coordinates of the texel with the largest `(x, y)` magnitude.
    pub fn argmax_xy_magnitude(&self) -> (u32, u32) {
        let mut best = (0usize, f32::MIN);
        for (i, t) in self.texels.iter().enumerate() {
            let m = Vec2::new(t[0], t[1]).length();
            if m > best.1 {
                best = (i, m);
            }
        }
        let w = self.width as usize;
        ((best.0 % w) as u32, (best.0 / w) as u32)
    }

    /// True if no texel component is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.texels.iter().flatten().all(|c| c.is_finite())
    }

    /// True if every component of every texel is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.texels.iter().flatten().all(|&c| c == 0.0)
    }
}
