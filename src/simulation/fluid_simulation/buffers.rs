//! GPU storage for the fluid fields.
//!
//! Every field is a storage buffer of `vec4<f32>` texels, row-major with row 0
//! at the bottom. Velocity, density and pressure are index-rotated pairs; curl
//! and divergence are single buffers rewritten every frame.

use crate::error::FluidError;
use crate::simulation::double_buffer::DoubleBuffer;
use crate::simulation::grid::{FieldId, GridLayout, Texel};

/// Bytes per texel (`vec4<f32>`).
pub const TEXEL_BYTES: u64 = std::mem::size_of::<Texel>() as u64;

/// Size in bytes of one buffer of `field` for `layout`.
pub fn field_size_bytes(layout: GridLayout, field: FieldId) -> u64 {
    let (w, h) = layout.dims(field);
    w as u64 * h as u64 * TEXEL_BYTES
}

/// Check a layout against device limits before anything is created.
pub fn validate_layout(limits: &wgpu::Limits, layout: GridLayout) -> Result<(), FluidError> {
    for field in FieldId::ALL {
        let (w, h) = layout.dims(field);
        if w == 0 || h == 0 {
            return Err(FluidError::allocation(field.label(), w, h, "empty grid"));
        }

        let size = field_size_bytes(layout, field);
        if size > limits.max_storage_buffer_binding_size as u64 {
            return Err(FluidError::allocation(
                field.label(),
                w,
                h,
                format!(
                    "{} bytes exceeds max_storage_buffer_binding_size ({})",
                    size, limits.max_storage_buffer_binding_size
                ),
            ));
        }
        if size > limits.max_buffer_size {
            return Err(FluidError::allocation(
                field.label(),
                w,
                h,
                format!("{} bytes exceeds max_buffer_size ({})", size, limits.max_buffer_size),
            ));
        }
    }
    Ok(())
}

/// All field buffers of one allocation.
pub struct FluidBuffers {
    layout: GridLayout,
    pub velocity: DoubleBuffer<wgpu::Buffer>,
    pub density: DoubleBuffer<wgpu::Buffer>,
    pub pressure: DoubleBuffer<wgpu::Buffer>,
    pub curl: wgpu::Buffer,
    pub divergence: wgpu::Buffer,
    memory_usage: u64,
}

impl FluidBuffers {
    /// Create zero-initialized buffers for `layout`.
    pub fn new(device: &wgpu::Device, layout: GridLayout) -> Result<Self, FluidError> {
        validate_layout(&device.limits(), layout)?;

        let double = |field: FieldId| {
            let size = field_size_bytes(layout, field);
            DoubleBuffer::new(
                Self::create_storage_buffer(device, size, &format!("Fluid {} A", field.label())),
                Self::create_storage_buffer(device, size, &format!("Fluid {} B", field.label())),
            )
        };
        let single = |field: FieldId| {
            let size = field_size_bytes(layout, field);
            Self::create_storage_buffer(device, size, &format!("Fluid {}", field.label()))
        };

        Ok(Self {
            layout,
            velocity: double(FieldId::Velocity),
            density: double(FieldId::Density),
            pressure: double(FieldId::Pressure),
            curl: single(FieldId::Curl),
            divergence: single(FieldId::Divergence),
            memory_usage: layout.memory_usage_bytes(),
        })
    }

    /// Create a storage buffer with specified size
    fn create_storage_buffer(device: &wgpu::Device, size: u64, label: &str) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    pub fn layout(&self) -> GridLayout {
        self.layout
    }

    /// Current state of a field (the read slot for double-buffered fields).
    pub fn current(&self, field: FieldId) -> &wgpu::Buffer {
        match field {
            FieldId::Velocity => self.velocity.read(),
            FieldId::Density => self.density.read(),
            FieldId::Pressure => self.pressure.read(),
            FieldId::Curl => &self.curl,
            FieldId::Divergence => &self.divergence,
        }
    }

    /// Record a zero fill of every buffer, both slots included.
    pub fn clear(&self, encoder: &mut wgpu::CommandEncoder) {
        for pair in [&self.velocity, &self.density, &self.pressure] {
            for buffer in pair.slots() {
                encoder.clear_buffer(buffer, 0, None);
            }
        }
        encoder.clear_buffer(&self.curl, 0, None);
        encoder.clear_buffer(&self.divergence, 0, None);
    }

    /// Get total memory usage in bytes
    pub fn memory_usage(&self) -> u64 {
        self.memory_usage
    }

    /// Get total memory usage in megabytes
    pub fn memory_usage_mb(&self) -> f32 {
        self.memory_usage as f32 / (1024.0 * 1024.0)
    }

    /// Destroy every buffer now instead of waiting for the last handle to drop.
    pub fn destroy(&self) {
        for pair in [&self.velocity, &self.density, &self.pressure] {
            for buffer in pair.slots() {
                buffer.destroy();
            }
        }
        self.curl.destroy();
        self.divergence.destroy();
    }
}
