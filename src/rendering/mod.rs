//! Compositing the density field into the visible frame.

pub mod density_overlay;

pub use density_overlay::DensityOverlayRenderer;

/// A density field ready to be sampled by a compositor.
#[derive(Clone, Copy)]
pub struct DensitySource<'a> {
    /// Storage buffer of `vec4<f32>` texels, row 0 at the bottom
    pub buffer: &'a wgpu::Buffer,
    pub width: u32,
    pub height: u32,
}

/// Blends a density field over a background into a render target.
pub trait DensityCompositor {
    /// Record the composite into `encoder`.
    ///
    /// With no density (effect disabled or disposed) only the background is drawn.
    fn composite(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        density: Option<DensitySource<'_>>,
        background: [f32; 4],
    );
}
