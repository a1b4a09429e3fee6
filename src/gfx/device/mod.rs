//! Backend-agnostic GPU device and immediate-mode command context.
//!
//! Resources are referred to through small `Copy` handles. A backend hands
//! them out from `GraphicsDevice` and resolves them again when the
//! `GraphicsContext` records commands. Two backends live here: `wgpu_backend`
//! for real windows and `recording` for headless runs and tests.

pub mod recording;
mod slots;
pub mod wgpu_backend;

use crate::error::Result;
use crate::gfx::shader::ParameterLayout;

pub use recording::RecordingDevice;
pub use wgpu_backend::WgpuDevice;

macro_rules! handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub(crate) u32);

            impl $name {
                pub fn id(self) -> u32 {
                    self.0
                }
            }
        )*
    };
}

handle!(
    BufferHandle,
    TextureHandle,
    /// Color target. `RenderTargetView::BACK_BUFFER` is the swapchain image.
    RenderTargetView,
    /// Depth write view of a depth texture.
    DepthStencilView,
    /// Read view of a texture (2D or cube).
    ShaderResourceView,
    SamplerState,
    RasterizerState,
    DepthStencilState,
    ShaderHandle,
);

impl RenderTargetView {
    pub const BACK_BUFFER: RenderTargetView = RenderTargetView(0);
}

/// Programmable stages a parameter block can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

impl ShaderStage {
    pub fn index(self) -> usize {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Pixel => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    /// Uniform data rewritten with `write_buffer_discard`.
    Constant,
}

#[derive(Debug, Clone)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub usage: BufferUsage,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub array_layers: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
    /// Six layers that may be viewed as a cube.
    pub cube_compatible: bool,
}

impl<'a> TextureDesc<'a> {
    pub fn new_2d(label: &'a str, width: u32, height: u32, format: wgpu::TextureFormat, usage: wgpu::TextureUsages) -> Self {
        Self {
            label,
            width,
            height,
            array_layers: 1,
            format,
            usage,
            cube_compatible: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewDimension {
    D2,
    Cube,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDesc {
    pub label: &'static str,
    pub address_mode: wgpu::AddressMode,
    pub filter: wgpu::FilterMode,
    /// Turns the sampler into a comparison sampler.
    pub compare: Option<wgpu::CompareFunction>,
    /// Used with `AddressMode::ClampToBorder`.
    pub border_color: Option<wgpu::SamplerBorderColor>,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            label: "sampler",
            address_mode: wgpu::AddressMode::Repeat,
            filter: wgpu::FilterMode::Linear,
            compare: None,
            border_color: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerDesc {
    pub cull_mode: Option<wgpu::Face>,
    pub front_face: wgpu::FrontFace,
    /// Constant depth bias in depth-buffer units.
    pub depth_bias: i32,
    pub slope_scaled_depth_bias: f32,
    pub depth_bias_clamp: f32,
}

impl Default for RasterizerDesc {
    /// Back-face culling with clockwise front faces, no bias.
    fn default() -> Self {
        Self {
            cull_mode: Some(wgpu::Face::Back),
            front_face: wgpu::FrontFace::Cw,
            depth_bias: 0,
            slope_scaled_depth_bias: 0.0,
            depth_bias_clamp: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilDesc {
    pub depth_write: bool,
    pub depth_compare: wgpu::CompareFunction,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_write: true,
            depth_compare: wgpu::CompareFunction::Less,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShaderDesc<'a> {
    pub label: &'a str,
    pub stage: ShaderStage,
    /// WGSL source.
    pub source: &'a str,
    pub entry_point: &'a str,
    /// Parameters and resources the shader declares.
    pub layout: &'a ParameterLayout,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Resource creation.
pub trait GraphicsDevice {
    /// Creates a buffer, optionally filled with `contents`.
    fn create_buffer(&mut self, desc: &BufferDesc, contents: Option<&[u8]>) -> Result<BufferHandle>;

    /// Creates a texture. `layers` is empty or holds one tightly packed
    /// image per array layer.
    fn create_texture(&mut self, desc: &TextureDesc, layers: &[&[u8]]) -> Result<TextureHandle>;

    fn create_render_target_view(&mut self, texture: TextureHandle) -> Result<RenderTargetView>;

    fn create_depth_stencil_view(&mut self, texture: TextureHandle) -> Result<DepthStencilView>;

    fn create_shader_resource_view(
        &mut self,
        texture: TextureHandle,
        dimension: ViewDimension,
    ) -> Result<ShaderResourceView>;

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerState>;

    fn create_rasterizer_state(&mut self, desc: &RasterizerDesc) -> Result<RasterizerState>;

    fn create_depth_stencil_state(&mut self, desc: &DepthStencilDesc) -> Result<DepthStencilState>;

    fn create_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderHandle>;

    /// Frees a texture together with every view created from it, unbinding
    /// any of those views that are still bound. Handles of released resources
    /// may be handed out again.
    fn release_texture(&mut self, texture: TextureHandle) -> Result<()>;

    /// Size of the presentable surface in pixels.
    fn surface_size(&self) -> (u32, u32);

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<()>;
}

/// Immediate-mode command stream.
///
/// Bindings persist until changed, like a D3D11 immediate context. `None`
/// unbinds, or restores the default state for rasterizer and depth state.
pub trait GraphicsContext {
    fn clear_render_target(&mut self, view: RenderTargetView, color: [f32; 4]);

    fn clear_depth(&mut self, view: DepthStencilView, depth: f32);

    fn set_render_targets(&mut self, color: Option<RenderTargetView>, depth: Option<DepthStencilView>);

    fn set_viewport(&mut self, viewport: Viewport);

    fn set_rasterizer_state(&mut self, state: Option<RasterizerState>);

    fn set_depth_stencil_state(&mut self, state: Option<DepthStencilState>);

    fn set_shader(&mut self, stage: ShaderStage, shader: Option<ShaderHandle>);

    fn set_constant_buffer(&mut self, stage: ShaderStage, slot: u32, buffer: Option<BufferHandle>);

    fn set_shader_resource(&mut self, stage: ShaderStage, slot: u32, view: Option<ShaderResourceView>);

    fn set_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: Option<SamplerState>);

    /// Unbinds every shader resource view on `stage`.
    fn unbind_shader_resources(&mut self, stage: ShaderStage);

    /// Replaces the whole buffer contents. Earlier draws keep the data they saw.
    fn write_buffer_discard(&mut self, buffer: BufferHandle, data: &[u8]) -> Result<()>;

    fn set_vertex_buffer(&mut self, buffer: BufferHandle, stride: u32);

    fn set_index_buffer(&mut self, buffer: BufferHandle);

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) -> Result<()>;

    /// Copies the whole of a single-layer `source` into layer `slice` of `destination`.
    fn copy_texture_to_slice(&mut self, source: TextureHandle, destination: TextureHandle, slice: u32) -> Result<()>;

    /// Shows the back buffer. Render targets are unbound afterwards.
    fn present(&mut self, vsync: bool) -> Result<()>;

    /// Drops everything recorded since the last present without showing it.
    /// Render targets are unbound afterwards, as after `present`.
    fn discard_frame(&mut self);
}

/// Bytes per pixel for the formats the renderer uploads from the CPU.
pub fn bytes_per_pixel(format: wgpu::TextureFormat) -> Option<u32> {
    use wgpu::TextureFormat as F;
    match format {
        F::Rgba8Unorm | F::Rgba8UnormSrgb | F::Bgra8Unorm | F::Bgra8UnormSrgb => Some(4),
        F::R32Float | F::Depth32Float => Some(4),
        F::Rgba16Float => Some(8),
        F::Rgba32Float => Some(16),
        _ => None,
    }
}
