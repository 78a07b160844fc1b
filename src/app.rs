//! Demo host: a window whose whole surface is the fluid effect.
//!
//! Keys: `Esc` quits, `P` pauses, `R` resets, `Tab` toggles the profile.

use std::path::Path;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::error::FluidError;
use crate::input::PointerInput;
use crate::rendering::{DensityCompositor, DensityOverlayRenderer, DensitySource};
use crate::simulation::{
    ConfigOverrides, FluidSimulation, GpuFluidBackend, SimulationConfig, Viewport,
};

/// Overrides file read from the working directory at startup.
pub const OVERRIDES_FILE: &str = "fluid_backdrop.ron";

/// Failures while bringing up the window and GPU.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error("Failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error(transparent)]
    Fluid(#[from] FluidError),
    #[error("Surface reports no supported formats")]
    NoSurfaceFormat,
}

pub struct App {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    simulation: Option<FluidSimulation<GpuFluidBackend>>,
    pointer: PointerInput,
    compositor: DensityOverlayRenderer,
    background: [f32; 4],
    frame_count: u32,
    fps_timer: std::time::Instant,
}

impl App {
    fn create(event_loop: &ActiveEventLoop) -> Result<Self, HostError> {
        let window_attributes = Window::default_attributes()
            .with_title("Fluid Backdrop")
            .with_inner_size(winit::dpi::PhysicalSize::new(1280, 720));
        let window = Arc::new(event_loop.create_window(window_attributes)?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(FluidError::from)?;
        log::info!("Using adapter: {}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Fluid Backdrop Device"),
            ..Default::default()
        }))
        .map_err(FluidError::from)?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(HostError::NoSurfaceFormat)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let overrides = ConfigOverrides::load_or_default(Path::new(OVERRIDES_FILE));
        let fallback_background = overrides
            .background_color
            .unwrap_or(SimulationConfig::default().background_color);

        let viewport = Viewport::new(size.width, size.height);
        let simulation = match FluidSimulation::for_viewport(
            GpuFluidBackend::new(&device, &queue),
            viewport,
            overrides,
        ) {
            Ok(simulation) => Some(simulation),
            Err(e) => {
                log::error!("Fluid effect disabled: {}", e);
                None
            }
        };

        let mut pointer = PointerInput::new(0.0, 0.0);
        let background = match &simulation {
            Some(simulation) => {
                let config = simulation.config();
                pointer.set_params(config.force, config.radius);
                pointer.attach(simulation.splat_queue(), viewport);
                config.background_color
            }
            None => fallback_background,
        };

        let compositor = DensityOverlayRenderer::new(&device, surface_format);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            simulation,
            pointer,
            compositor,
            background,
            frame_count: 0,
            fps_timer: std::time::Instant::now(),
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Drop the effect after a fatal error; the host keeps drawing the background.
    fn disable_effect(&mut self, error: &FluidError) {
        log::error!("Fluid effect disabled: {}", error);
        self.pointer.detach();
        self.simulation = None;
    }

    fn toggle_profile(&mut self) {
        let Some(simulation) = self.simulation.as_mut() else {
            return;
        };
        let profile = simulation.profile().toggled();
        match simulation.set_profile(profile) {
            Ok(()) => {
                let config = simulation.config();
                self.pointer.set_params(config.force, config.radius);
                self.background = config.background_color;
            }
            Err(e) => self.disable_effect(&e),
        }
    }

    fn handle_key(&mut self, event: &KeyEvent) -> bool {
        if event.state != ElementState::Pressed || event.repeat {
            return true;
        }
        let PhysicalKey::Code(keycode) = event.physical_key else {
            return true;
        };

        match keycode {
            KeyCode::Escape => return false,
            KeyCode::KeyP => {
                if let Some(simulation) = self.simulation.as_mut() {
                    simulation.paused = !simulation.paused;
                    log::info!("Fluid {}", if simulation.paused { "paused" } else { "resumed" });
                }
            }
            KeyCode::KeyR => {
                if let Some(simulation) = self.simulation.as_mut() {
                    simulation.reset();
                }
            }
            KeyCode::Tab => self.toggle_profile(),
            _ => {}
        }
        true
    }

    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        if self.pointer.handle_window_event(event) {
            return true;
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested");
                return false;
            }
            WindowEvent::Resized(physical_size) => {
                self.config.width = physical_size.width.max(1);
                self.config.height = physical_size.height.max(1);
                self.surface.configure(&self.device, &self.config);

                let viewport = Viewport::new(physical_size.width, physical_size.height);
                self.pointer.set_viewport(viewport);
                if let Some(simulation) = self.simulation.as_mut() {
                    simulation.resize(viewport.width, viewport.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                return self.handle_key(event);
            }
            WindowEvent::RedrawRequested => {
                self.render();
            }
            _ => {}
        }
        true
    }

    fn render(&mut self) {
        if let Some(simulation) = self.simulation.as_mut() {
            match simulation.step() {
                Ok(stats) => log::trace!("Fluid frame: {:?}", stats),
                Err(e) => self.disable_effect(&e),
            }
        }

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return;
            }
            Err(e) => {
                log::warn!("Skipping frame: {}", e);
                return;
            }
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Composite Encoder"),
        });

        let density = self.simulation.as_ref().and_then(|simulation| {
            let dye_res = simulation.config().dye_res;
            simulation
                .backend()
                .density_buffer()
                .map(|buffer| DensitySource {
                    buffer,
                    width: dye_res,
                    height: dye_res,
                })
        });
        self.compositor
            .composite(&self.device, &mut encoder, &view, density, self.background);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        self.frame_count += 1;
        if self.fps_timer.elapsed().as_secs_f32() >= 1.0 {
            log::info!("FPS: {}", self.frame_count);
            self.frame_count = 0;
            self.fps_timer = std::time::Instant::now();
        }
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

struct AppState {
    app: Option<App>,
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.app.is_some() {
            return;
        }

        match App::create(event_loop) {
            Ok(app) => self.app = Some(app),
            Err(e) => {
                log::error!("Failed to start: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(app) = &mut self.app else { return };

        if window_id != app.window().id() {
            return;
        }

        if !app.handle_event(&event) {
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(app) = &self.app {
            app.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut app) = self.app.take() {
            app.pointer.detach();
            if let Some(simulation) = app.simulation.as_mut() {
                simulation.dispose();
            }
        }
    }
}

pub fn run() -> Result<(), winit::error::EventLoopError> {
    env_logger::init();

    let event_loop = EventLoop::new()?;
    let mut state = AppState { app: None };

    event_loop.run_app(&mut state)
}
