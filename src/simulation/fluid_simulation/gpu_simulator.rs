//! GPU backend: one WGSL compute kernel per stage, storage-buffer fields.
//!
//! All kernels share one bind group layout:
//! - binding 0: uniform parameter block of the stage
//! - binding 1: `src`, the field being read (read-only storage)
//! - binding 2: `aux`, a second input (read-only storage, `src` again if unused)
//! - binding 3: `dst`, the field being written
//!
//! Passes of one frame are recorded into a single command encoder and
//! submitted by `end_frame`. Each pass gets its own uniform buffer: a
//! `queue.write_buffer` lands before the whole encoder executes.

use wgpu::util::DeviceExt;

use crate::error::FluidError;
use crate::simulation::grid::{FieldId, Grid, GridLayout, Texel};
use crate::simulation::kernels::{
    AdvectParams, GridParams, ScaleParams, SplatParams, VorticityParams,
};
use crate::simulation::pipeline::FluidBackend;

use super::buffers::{field_size_bytes, FluidBuffers};

/// Compute workgroup edge (8x8 threads).
const WORKGROUP_SIZE: u32 = 8;

macro_rules! fluid_shader {
    ($name:literal) => {
        concat!(
            include_str!("../../../shaders/fluid/common.wgsl"),
            "\n",
            include_str!(concat!("../../../shaders/fluid/", $name, ".wgsl"))
        )
    };
}

/// Compute kernels, one pipeline each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kernel {
    Splat,
    Curl,
    Vorticity,
    Divergence,
    Scale,
    Jacobi,
    GradientSubtract,
    Advect,
}

impl Kernel {
    const ALL: [Kernel; 8] = [
        Kernel::Splat,
        Kernel::Curl,
        Kernel::Vorticity,
        Kernel::Divergence,
        Kernel::Scale,
        Kernel::Jacobi,
        Kernel::GradientSubtract,
        Kernel::Advect,
    ];

    fn label(self) -> &'static str {
        match self {
            Kernel::Splat => "Fluid Splat",
            Kernel::Curl => "Fluid Curl",
            Kernel::Vorticity => "Fluid Vorticity",
            Kernel::Divergence => "Fluid Divergence",
            Kernel::Scale => "Fluid Scale",
            Kernel::Jacobi => "Fluid Jacobi",
            Kernel::GradientSubtract => "Fluid Gradient Subtract",
            Kernel::Advect => "Fluid Advect",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Kernel::Splat => fluid_shader!("splat"),
            Kernel::Curl => fluid_shader!("curl"),
            Kernel::Vorticity => fluid_shader!("vorticity"),
            Kernel::Divergence => fluid_shader!("divergence"),
            Kernel::Scale => fluid_shader!("scale"),
            Kernel::Jacobi => fluid_shader!("jacobi"),
            Kernel::GradientSubtract => fluid_shader!("gradient_subtract"),
            Kernel::Advect => fluid_shader!("advect"),
        }
    }
}

/// Shared bind group layout plus one pipeline per kernel.
struct FluidKernels {
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: Vec<wgpu::ComputePipeline>,
}

impl FluidKernels {
    fn new(device: &wgpu::Device) -> Self {
        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Fluid Kernel Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage(1, true),
                storage(2, true),
                storage(3, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Fluid Kernel Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipelines = Kernel::ALL
            .iter()
            .map(|kernel| {
                let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(kernel.label()),
                    source: wgpu::ShaderSource::Wgsl(kernel.source().into()),
                });
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(kernel.label()),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: Some("main"),
                    compilation_options: Default::default(),
                    cache: None,
                })
            })
            .collect();

        Self {
            bind_group_layout,
            pipelines,
        }
    }

    fn pipeline(&self, kernel: Kernel) -> &wgpu::ComputePipeline {
        &self.pipelines[kernel as usize]
    }

    /// Record one full-grid pass over a `width` x `height` output.
    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        kernel: Kernel,
        params: &[u8],
        src: &wgpu::Buffer,
        aux: &wgpu::Buffer,
        dst: &wgpu::Buffer,
        (width, height): (u32, u32),
    ) {
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Fluid Kernel Params"),
            contents: params,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.label()),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: src.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: aux.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: dst.as_entire_binding(),
                },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kernel.label()),
            timestamp_writes: None,
        });
        pass.set_pipeline(self.pipeline(kernel));
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(
            width.div_ceil(WORKGROUP_SIZE),
            height.div_ceil(WORKGROUP_SIZE),
            1,
        );
    }
}

/// Request a device without a surface, for offscreen use and tests.
pub fn request_headless_device() -> Result<(wgpu::Device, wgpu::Queue), FluidError> {
    let instance = wgpu::Instance::default();
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))?;
    log::info!("Headless fluid adapter: {}", adapter.get_info().name);

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("Fluid Device"),
        ..Default::default()
    }))?;
    Ok((device, queue))
}

/// wgpu implementation of [`FluidBackend`].
pub struct GpuFluidBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    kernels: FluidKernels,
    buffers: Option<FluidBuffers>,
    encoder: Option<wgpu::CommandEncoder>,
}

fn frame_encoder<'a>(
    device: &wgpu::Device,
    slot: &'a mut Option<wgpu::CommandEncoder>,
) -> &'a mut wgpu::CommandEncoder {
    slot.get_or_insert_with(|| {
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Fluid Frame Encoder"),
        })
    })
}

impl GpuFluidBackend {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self {
            device: device.clone(),
            queue: queue.clone(),
            kernels: FluidKernels::new(device),
            buffers: None,
            encoder: None,
        }
    }

    /// The density buffer holding the last completed frame, for compositing.
    pub fn density_buffer(&self) -> Option<&wgpu::Buffer> {
        self.buffers.as_ref().map(|b| b.current(FieldId::Density))
    }

    /// Layout of the current allocation.
    pub fn layout(&self) -> Option<GridLayout> {
        self.buffers.as_ref().map(|b| b.layout())
    }

    fn submit_pending(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    /// Copy a field back to the CPU. Blocks until the GPU is idle.
    pub fn read_field(&mut self, field: FieldId) -> Result<Grid, FluidError> {
        self.submit_pending();
        let buffers = self.buffers.as_ref().ok_or(FluidError::NotAllocated)?;
        let layout = buffers.layout();
        let (width, height) = layout.dims(field);
        let size = field_size_bytes(layout, field);

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Fluid Readback Staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Fluid Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(buffers.current(field), 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| {
                log::error!("Device poll failed during {} readback: {}", field.label(), e);
                FluidError::Readback(field.label())
            })?;

        match rx.recv() {
            Ok(Ok(())) => {}
            _ => return Err(FluidError::Readback(field.label())),
        }

        let texels: Vec<Texel> = {
            let data = buffer_slice.get_mapped_range();
            bytemuck::cast_slice(&data).to_vec()
        };
        staging.unmap();

        Grid::from_texels(field, width, height, texels)
    }

    fn sim_dims(buffers: &FluidBuffers) -> (u32, u32) {
        buffers.layout().dims(FieldId::Velocity)
    }
}

impl FluidBackend for GpuFluidBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn allocate(&mut self, layout: GridLayout) -> Result<(), FluidError> {
        self.release();
        let buffers = FluidBuffers::new(&self.device, layout)?;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Fluid Allocate Encoder"),
        });
        buffers.clear(&mut encoder);
        self.queue.submit(std::iter::once(encoder.finish()));

        log::info!(
            "Allocated GPU fluid buffers: sim {}x{}, dye {}x{} ({:.2} MB)",
            layout.sim_res,
            layout.sim_res,
            layout.dye_res,
            layout.dye_res,
            buffers.memory_usage_mb()
        );
        self.buffers = Some(buffers);
        Ok(())
    }

    fn release(&mut self) {
        // Recorded passes reference the buffers; drop them unsubmitted
        self.encoder = None;
        if let Some(buffers) = self.buffers.take() {
            buffers.destroy();
            log::info!("Released GPU fluid buffers");
        }
    }

    fn is_allocated(&self) -> bool {
        self.buffers.is_some()
    }

    fn clear(&mut self) {
        self.submit_pending();
        let Some(buffers) = self.buffers.as_ref() else {
            return;
        };
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Fluid Clear Encoder"),
        });
        buffers.clear(&mut encoder);
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn splat_velocity(&mut self, params: &SplatParams) {
        let Some(buffers) = self.buffers.as_mut() else {
            return;
        };
        let encoder = frame_encoder(&self.device, &mut self.encoder);
        let dims = (params.width, params.height);
        let (read, write) = buffers.velocity.read_write();
        self.kernels.dispatch(
            &self.device,
            encoder,
            Kernel::Splat,
            bytemuck::bytes_of(params),
            read,
            read,
            write,
            dims,
        );
        buffers.velocity.swap();
    }

    fn splat_density(&mut self, params: &SplatParams) {
        let Some(buffers) = self.buffers.as_mut() else {
            return;
        };
        let encoder = frame_encoder(&self.device, &mut self.encoder);
        let dims = (params.width, params.height);
        let (read, write) = buffers.density.read_write();
        self.kernels.dispatch(
            &self.device,
            encoder,
            Kernel::Splat,
            bytemuck::bytes_of(params),
            read,
            read,
            write,
            dims,
        );
        buffers.density.swap();
    }

    fn curl(&mut self) {
        let Some(buffers) = self.buffers.as_ref() else {
            return;
        };
        let encoder = frame_encoder(&self.device, &mut self.encoder);
        let dims = Self::sim_dims(buffers);
        let params = GridParams::new(dims.0, dims.1);
        let velocity = buffers.velocity.read();
        self.kernels.dispatch(
            &self.device,
            encoder,
            Kernel::Curl,
            bytemuck::bytes_of(&params),
            velocity,
            velocity,
            &buffers.curl,
            dims,
        );
    }

    fn vorticity(&mut self, params: &VorticityParams) {
        let Some(buffers) = self.buffers.as_mut() else {
            return;
        };
        let encoder = frame_encoder(&self.device, &mut self.encoder);
        let dims = (params.width, params.height);
        let (read, write) = buffers.velocity.read_write();
        self.kernels.dispatch(
            &self.device,
            encoder,
            Kernel::Vorticity,
            bytemuck::bytes_of(params),
            read,
            &buffers.curl,
            write,
            dims,
        );
        buffers.velocity.swap();
    }

    fn divergence(&mut self) {
        let Some(buffers) = self.buffers.as_ref() else {
            return;
        };
        let encoder = frame_encoder(&self.device, &mut self.encoder);
        let dims = Self::sim_dims(buffers);
        let params = GridParams::new(dims.0, dims.1);
        let velocity = buffers.velocity.read();
        self.kernels.dispatch(
            &self.device,
            encoder,
            Kernel::Divergence,
            bytemuck::bytes_of(&params),
            velocity,
            velocity,
            &buffers.divergence,
            dims,
        );
    }

    fn scale_pressure(&mut self, params: &ScaleParams) {
        let Some(buffers) = self.buffers.as_mut() else {
            return;
        };
        let encoder = frame_encoder(&self.device, &mut self.encoder);
        let dims = (params.width, params.height);
        let (read, write) = buffers.pressure.read_write();
        self.kernels.dispatch(
            &self.device,
            encoder,
            Kernel::Scale,
            bytemuck::bytes_of(params),
            read,
            read,
            write,
            dims,
        );
        buffers.pressure.swap();
    }

    fn jacobi(&mut self) {
        let Some(buffers) = self.buffers.as_mut() else {
            return;
        };
        let encoder = frame_encoder(&self.device, &mut self.encoder);
        let dims = Self::sim_dims(buffers);
        let params = GridParams::new(dims.0, dims.1);
        let (read, write) = buffers.pressure.read_write();
        self.kernels.dispatch(
            &self.device,
            encoder,
            Kernel::Jacobi,
            bytemuck::bytes_of(&params),
            read,
            &buffers.divergence,
            write,
            dims,
        );
        buffers.pressure.swap();
    }

    fn subtract_gradient(&mut self) {
        let Some(buffers) = self.buffers.as_mut() else {
            return;
        };
        let encoder = frame_encoder(&self.device, &mut self.encoder);
        let dims = Self::sim_dims(buffers);
        let params = GridParams::new(dims.0, dims.1);
        let pressure = buffers.pressure.read();
        let (read, write) = buffers.velocity.read_write();
        self.kernels.dispatch(
            &self.device,
            encoder,
            Kernel::GradientSubtract,
            bytemuck::bytes_of(&params),
            read,
            pressure,
            write,
            dims,
        );
        buffers.velocity.swap();
    }

    fn advect_velocity(&mut self, params: &AdvectParams) {
        let Some(buffers) = self.buffers.as_mut() else {
            return;
        };
        let encoder = frame_encoder(&self.device, &mut self.encoder);
        let dims = (params.width, params.height);
        let (read, write) = buffers.velocity.read_write();
        self.kernels.dispatch(
            &self.device,
            encoder,
            Kernel::Advect,
            bytemuck::bytes_of(params),
            read,
            read,
            write,
            dims,
        );
        buffers.velocity.swap();
    }

    fn advect_density(&mut self, params: &AdvectParams) {
        let Some(buffers) = self.buffers.as_mut() else {
            return;
        };
        let encoder = frame_encoder(&self.device, &mut self.encoder);
        let dims = (params.width, params.height);
        let velocity = buffers.velocity.read();
        let (read, write) = buffers.density.read_write();
        self.kernels.dispatch(
            &self.device,
            encoder,
            Kernel::Advect,
            bytemuck::bytes_of(params),
            velocity,
            read,
            write,
            dims,
        );
        buffers.density.swap();
    }

    fn end_frame(&mut self) -> Result<(), FluidError> {
        if self.buffers.is_none() {
            return Err(FluidError::NotAllocated);
        }
        self.submit_pending();
        Ok(())
    }

    fn memory_usage_bytes(&self) -> u64 {
        self.buffers.as_ref().map_or(0, FluidBuffers::memory_usage)
    }
}

impl Drop for GpuFluidBackend {
    fn drop(&mut self) {
        self.release();
    }
}
