//! Reference backend: every kernel runs on the CPU, one rayon task per row.

use rayon::prelude::*;

use crate::error::FluidError;

use super::double_buffer::DoubleBuffer;
use super::grid::{FieldId, Grid, GridLayout, Texel};
use super::kernels::{
    advect_texel, curl_texel, divergence_texel, gradient_subtract_texel, jacobi_texel,
    scale_texel, splat_texel, vorticity_texel, AdvectParams, ScaleParams, SplatParams,
    VorticityParams,
};
use super::pipeline::{FieldSummary, FluidBackend};

/// Evaluate `kernel` at every texel of `dst`, rows in parallel.
fn fill<F>(dst: &mut Grid, kernel: F)
where
    F: Fn(u32, u32) -> Texel + Sync + Send,
{
    let width = dst.width() as usize;
    dst.texels_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, texel) in row.iter_mut().enumerate() {
                *texel = kernel(x as u32, y as u32);
            }
        });
}

/// Read-then-write pass over a double buffer, followed by a swap.
fn feedback<F>(buffer: &mut DoubleBuffer<Grid>, kernel: F)
where
    F: Fn(&Grid, u32, u32) -> Texel + Sync + Send,
{
    {
        let (read, write) = buffer.read_write();
        fill(write, |x, y| kernel(read, x, y));
    }
    buffer.swap();
}

/// All grids of one allocation.
#[derive(Debug)]
struct CpuFields {
    layout: GridLayout,
    velocity: DoubleBuffer<Grid>,
    density: DoubleBuffer<Grid>,
    pressure: DoubleBuffer<Grid>,
    curl: Grid,
    divergence: Grid,
}

impl CpuFields {
    fn new(layout: GridLayout) -> Result<Self, FluidError> {
        let double = |field: FieldId| {
            let (w, h) = layout.dims(field);
            DoubleBuffer::try_from_fn(|_| Grid::zeroed(field, w, h))
        };
        let single = |field: FieldId| {
            let (w, h) = layout.dims(field);
            Grid::zeroed(field, w, h)
        };

        Ok(Self {
            layout,
            velocity: double(FieldId::Velocity)?,
            density: double(FieldId::Density)?,
            pressure: double(FieldId::Pressure)?,
            curl: single(FieldId::Curl)?,
            divergence: single(FieldId::Divergence)?,
        })
    }
}

/// CPU implementation of [`FluidBackend`].
#[derive(Debug, Default)]
pub struct CpuFluidBackend {
    fields: Option<CpuFields>,
    last_summary: Option<FieldSummary>,
}

impl CpuFluidBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a field (the read slot for double-buffered fields).
    pub fn field(&self, field: FieldId) -> Option<&Grid> {
        let fields = self.fields.as_ref()?;
        Some(match field {
            FieldId::Velocity => fields.velocity.read(),
            FieldId::Density => fields.density.read(),
            FieldId::Pressure => fields.pressure.read(),
            FieldId::Curl => &fields.curl,
            FieldId::Divergence => &fields.divergence,
        })
    }

    /// Mutable access to the current state of a field, for seeding and diagnostics.
    pub fn field_mut(&mut self, field: FieldId) -> Option<&mut Grid> {
        let fields = self.fields.as_mut()?;
        Some(match field {
            FieldId::Velocity => fields.velocity.read_mut(),
            FieldId::Density => fields.density.read_mut(),
            FieldId::Pressure => fields.pressure.read_mut(),
            FieldId::Curl => &mut fields.curl,
            FieldId::Divergence => &mut fields.divergence,
        })
    }

    /// Layout of the current allocation.
    pub fn layout(&self) -> Option<GridLayout> {
        self.fields.as_ref().map(|f| f.layout)
    }
}

impl FluidBackend for CpuFluidBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn allocate(&mut self, layout: GridLayout) -> Result<(), FluidError> {
        // Old grids go first; never hold two allocations at once
        self.fields = None;
        self.last_summary = None;
        self.fields = Some(CpuFields::new(layout)?);
        log::info!(
            "Allocated CPU fluid grids: sim {}x{}, dye {}x{} ({:.2} MB)",
            layout.sim_res,
            layout.sim_res,
            layout.dye_res,
            layout.dye_res,
            layout.memory_usage_bytes() as f64 / (1024.0 * 1024.0)
        );
        Ok(())
    }

    fn release(&mut self) {
        if self.fields.take().is_some() {
            log::info!("Released CPU fluid grids");
        }
        self.last_summary = None;
    }

    fn is_allocated(&self) -> bool {
        self.fields.is_some()
    }

    fn clear(&mut self) {
        let Some(fields) = self.fields.as_mut() else {
            return;
        };
        for buffer in [&mut fields.velocity, &mut fields.density, &mut fields.pressure] {
            buffer.slots_mut().iter_mut().for_each(Grid::clear);
        }
        fields.curl.clear();
        fields.divergence.clear();
        self.last_summary = None;
    }

    fn splat_velocity(&mut self, params: &SplatParams) {
        let Some(fields) = self.fields.as_mut() else {
            return;
        };
        feedback(&mut fields.velocity, |read, x, y| {
            splat_texel(read.get(x, y), read.uv(x, y), params)
        });
    }

    fn splat_density(&mut self, params: &SplatParams) {
        let Some(fields) = self.fields.as_mut() else {
            return;
        };
        feedback(&mut fields.density, |read, x, y| {
            splat_texel(read.get(x, y), read.uv(x, y), params)
        });
    }

    fn curl(&mut self) {
        let Some(fields) = self.fields.as_mut() else {
            return;
        };
        let velocity = fields.velocity.read();
        fill(&mut fields.curl, |x, y| curl_texel(velocity, x, y));
    }

    fn vorticity(&mut self, params: &VorticityParams) {
        let Some(fields) = self.fields.as_mut() else {
            return;
        };
        let curl = &fields.curl;
        feedback(&mut fields.velocity, |velocity, x, y| {
            vorticity_texel(velocity, curl, x, y, params)
        });
    }

    fn divergence(&mut self) {
        let Some(fields) = self.fields.as_mut() else {
            return;
        };
        let velocity = fields.velocity.read();
        fill(&mut fields.divergence, |x, y| divergence_texel(velocity, x, y));
    }

    fn scale_pressure(&mut self, params: &ScaleParams) {
        let Some(fields) = self.fields.as_mut() else {
            return;
        };
        feedback(&mut fields.pressure, |pressure, x, y| {
            scale_texel(pressure.get(x, y), params)
        });
    }

    fn jacobi(&mut self) {
        let Some(fields) = self.fields.as_mut() else {
            return;
        };
        let divergence = &fields.divergence;
        feedback(&mut fields.pressure, |pressure, x, y| {
            jacobi_texel(pressure, divergence, x, y)
        });
    }

    fn subtract_gradient(&mut self) {
        let Some(fields) = self.fields.as_mut() else {
            return;
        };
        let pressure = fields.pressure.read();
        feedback(&mut fields.velocity, |velocity, x, y| {
            gradient_subtract_texel(velocity, pressure, x, y)
        });
    }

    fn advect_velocity(&mut self, params: &AdvectParams) {
        let Some(fields) = self.fields.as_mut() else {
            return;
        };
        feedback(&mut fields.velocity, |velocity, x, y| {
            advect_texel(velocity, velocity, velocity.uv(x, y), params)
        });
    }

    fn advect_density(&mut self, params: &AdvectParams) {
        let Some(fields) = self.fields.as_mut() else {
            return;
        };
        let velocity = fields.velocity.read();
        feedback(&mut fields.density, |density, x, y| {
            advect_texel(velocity, density, density.uv(x, y), params)
        });
    }

    fn end_frame(&mut self) -> Result<(), FluidError> {
        let Some(fields) = self.fields.as_ref() else {
            return Err(FluidError::NotAllocated);
        };

        for field in [FieldId::Velocity, FieldId::Density, FieldId::Pressure] {
            if let Some(grid) = self.field(field) {
                if !grid.is_finite() {
                    log::warn!("Non-finite values in {} after frame", field.label());
                }
            }
        }

        self.last_summary = Some(FieldSummary {
            total_density: fields.density.read().total_magnitude(),
            peak_velocity: fields.velocity.read().peak_xy_magnitude(),
        });
        Ok(())
    }

    fn memory_usage_bytes(&self) -> u64 {
        self.fields
            .as_ref()
            .map_or(0, |fields| fields.layout.memory_usage_bytes())
    }

    fn summary(&self) -> Option<FieldSummary> {
        self.last_summary
    }
}
