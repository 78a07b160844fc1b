//! Pointer input translator.
//!
//! Mouse and touch motion are equivalent sources. The first sample after
//! `attach()` only records a position; every later sample becomes one splat
//! whose velocity is the pixel delta scaled by `force`.

use glam::Vec2;
use winit::dpi::PhysicalPosition;
use winit::event::{Touch, TouchPhase, WindowEvent};

use crate::simulation::pipeline::Viewport;
use crate::simulation::splat::{Splat, SplatQueue};

/// Turns device-space motion into normalized splats.
#[derive(Debug, Clone)]
pub struct PointerInput {
    queue: Option<SplatQueue>,
    viewport: Viewport,
    force: f32,
    radius: f32,
    last_position: Option<PhysicalPosition<f64>>,
}

impl PointerInput {
    pub fn new(force: f32, radius: f32) -> Self {
        Self {
            queue: None,
            viewport: Viewport::new(0, 0),
            force,
            radius,
            last_position: None,
        }
    }

    /// Start feeding `queue`. Motion history starts empty.
    pub fn attach(&mut self, queue: SplatQueue, viewport: Viewport) {
        self.queue = Some(queue);
        self.viewport = viewport;
        self.last_position = None;
    }

    /// Stop feeding the queue and forget motion history.
    pub fn detach(&mut self) {
        self.queue = None;
        self.last_position = None;
    }

    pub fn is_attached(&self) -> bool {
        self.queue.is_some()
    }

    /// Whether a previous sample exists to compute velocity from.
    pub fn has_moved(&self) -> bool {
        self.last_position.is_some()
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Update splat strength and size, e.g. after a profile switch.
    pub fn set_params(&mut self, force: f32, radius: f32) {
        self.force = force;
        self.radius = radius;
    }

    /// Handle one motion sample in physical pixels (origin top-left).
    ///
    /// Returns the splat that was queued, if any.
    pub fn handle_move(&mut self, x: f64, y: f64) -> Option<Splat> {
        let queue = self.queue.as_ref()?;
        let position = PhysicalPosition::new(x, y);

        let last = self.last_position.replace(position)?;

        if self.viewport.width == 0 || self.viewport.height == 0 {
            return None;
        }

        let delta = Vec2::new((x - last.x) as f32, (y - last.y) as f32);
        let splat = Splat {
            position: Vec2::new(
                (x / self.viewport.width as f64) as f32,
                1.0 - (y / self.viewport.height as f64) as f32,
            ),
            velocity: Vec2::new(delta.x * self.force, -delta.y * self.force),
            radius: self.radius,
        };
        queue.push(splat);
        Some(splat)
    }

    /// Feed a window event. Returns true if it was a motion event.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                self.handle_move(position.x, position.y);
                true
            }
            WindowEvent::Touch(Touch {
                phase: TouchPhase::Moved,
                location,
                ..
            }) => {
                self.handle_move(location.x, location.y);
                true
            }
            _ => false,
        }
    }
}
