//! Headless device that records every command.
//!
//! Textures and buffers live in CPU memory, so uploads, copies and cube
//! sampling can be inspected. The command log makes submission order
//! observable, and bind-time hazard checks flag a depth texture that is bound
//! for writing while one of its read views is bound to a shader stage.

use cgmath::Vector3;

use super::slots::Slots;
use super::{
    bytes_per_pixel, BufferDesc, BufferHandle, BufferUsage, DepthStencilDesc, DepthStencilState,
    DepthStencilView, GraphicsContext, GraphicsDevice, RasterizerDesc, RasterizerState,
    RenderTargetView, SamplerDesc, SamplerState, ShaderDesc, ShaderHandle, ShaderResourceView,
    ShaderStage, TextureDesc, TextureHandle, ViewDimension, Viewport,
};
use crate::error::{RenderError, Result};

/// Highest shader resource slot tracked per stage.
const MAX_RESOURCE_SLOTS: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ClearRenderTarget {
        view: RenderTargetView,
        color: [f32; 4],
    },
    ClearDepth {
        view: DepthStencilView,
        depth: f32,
    },
    SetRenderTargets {
        color: Option<RenderTargetView>,
        depth: Option<DepthStencilView>,
    },
    SetViewport(Viewport),
    SetRasterizerState(Option<RasterizerState>),
    SetDepthStencilState(Option<DepthStencilState>),
    SetShader {
        stage: ShaderStage,
        shader: Option<ShaderHandle>,
    },
    SetConstantBuffer {
        stage: ShaderStage,
        slot: u32,
        buffer: Option<BufferHandle>,
    },
    SetShaderResource {
        stage: ShaderStage,
        slot: u32,
        view: Option<ShaderResourceView>,
    },
    SetSampler {
        stage: ShaderStage,
        slot: u32,
        sampler: Option<SamplerState>,
    },
    UnbindShaderResources {
        stage: ShaderStage,
    },
    WriteBuffer {
        buffer: BufferHandle,
        len: usize,
    },
    SetVertexBuffer {
        buffer: BufferHandle,
        stride: u32,
    },
    SetIndexBuffer {
        buffer: BufferHandle,
    },
    /// Draw call with the state it was issued under.
    DrawIndexed {
        index_count: u32,
        first_index: u32,
        base_vertex: i32,
        color_target: Option<RenderTargetView>,
        depth_target: Option<DepthStencilView>,
        vertex_shader: Option<ShaderHandle>,
        pixel_shader: Option<ShaderHandle>,
        rasterizer: Option<RasterizerState>,
        depth_state: Option<DepthStencilState>,
    },
    CopyTextureToSlice {
        source: TextureHandle,
        destination: TextureHandle,
        slice: u32,
    },
    Present {
        vsync: bool,
    },
    DiscardFrame,
}

/// A texture bound for depth writes while also bound for reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Hazard {
    pub texture: TextureHandle,
    /// Index into the command log of the binding that caused it.
    pub command_index: usize,
}

#[derive(Debug)]
struct BufferRecord {
    usage: BufferUsage,
    data: Vec<u8>,
}

#[derive(Debug)]
struct TextureRecord {
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    cube_compatible: bool,
    layers: Vec<Vec<u8>>,
}

#[derive(Debug)]
struct ShaderRecord {
    label: String,
    stage: ShaderStage,
}

#[derive(Debug, Default)]
struct BoundState {
    color: Option<RenderTargetView>,
    depth: Option<DepthStencilView>,
    shaders: [Option<ShaderHandle>; 2],
    resources: [[Option<ShaderResourceView>; MAX_RESOURCE_SLOTS]; 2],
    vertex_buffer: Option<BufferHandle>,
    index_buffer: Option<BufferHandle>,
    rasterizer: Option<RasterizerState>,
    depth_state: Option<DepthStencilState>,
}

#[derive(Debug)]
pub struct RecordingDevice {
    width: u32,
    height: u32,
    buffers: Vec<BufferRecord>,
    textures: Slots<TextureRecord>,
    /// Index 0 is the back buffer, which has no texture.
    render_target_views: Slots<Option<TextureHandle>>,
    depth_stencil_views: Slots<TextureHandle>,
    shader_resource_views: Slots<(TextureHandle, ViewDimension)>,
    samplers: Vec<SamplerDesc>,
    rasterizers: Vec<RasterizerDesc>,
    depth_states: Vec<DepthStencilDesc>,
    shaders: Vec<ShaderRecord>,
    bound: BoundState,
    commands: Vec<Command>,
    hazards: Vec<Hazard>,
    frames_presented: u64,
    frames_discarded: u64,
}

impl RecordingDevice {
    pub fn new(width: u32, height: u32) -> Self {
        let mut render_target_views = Slots::new();
        render_target_views.insert(None);
        Self {
            width,
            height,
            buffers: Vec::new(),
            textures: Slots::new(),
            render_target_views,
            depth_stencil_views: Slots::new(),
            shader_resource_views: Slots::new(),
            samplers: Vec::new(),
            rasterizers: Vec::new(),
            depth_states: Vec::new(),
            shaders: Vec::new(),
            bound: BoundState::default(),
            commands: Vec::new(),
            hazards: Vec::new(),
            frames_presented: 0,
            frames_discarded: 0,
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_log(&mut self) {
        self.commands.clear();
    }

    pub fn hazards(&self) -> &[Hazard] {
        &self.hazards
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn frames_discarded(&self) -> u64 {
        self.frames_discarded
    }

    /// Number of textures created and not yet released.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn is_resident(&self, texture: TextureHandle) -> bool {
        self.textures.contains(texture.0)
    }

    /// Currently bound color and depth targets.
    pub fn bound_targets(&self) -> (Option<RenderTargetView>, Option<DepthStencilView>) {
        (self.bound.color, self.bound.depth)
    }

    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(buffer.0 as usize).map(|b| b.data.as_slice())
    }

    pub fn texture_layer(&self, texture: TextureHandle, layer: u32) -> Option<&[u8]> {
        self.textures
            .get(texture.0)?
            .layers
            .get(layer as usize)
            .map(Vec::as_slice)
    }

    pub fn shader_resource_view_texture(&self, view: ShaderResourceView) -> Option<TextureHandle> {
        self.shader_resource_views.get(view.0).map(|(t, _)| *t)
    }

    pub fn depth_stencil_view_texture(&self, view: DepthStencilView) -> Option<TextureHandle> {
        self.depth_stencil_views.get(view.0).copied()
    }

    pub fn rasterizer_desc(&self, state: RasterizerState) -> Option<&RasterizerDesc> {
        self.rasterizers.get(state.0 as usize)
    }

    pub fn depth_stencil_desc(&self, state: DepthStencilState) -> Option<&DepthStencilDesc> {
        self.depth_states.get(state.0 as usize)
    }

    pub fn sampler_desc(&self, sampler: SamplerState) -> Option<&SamplerDesc> {
        self.samplers.get(sampler.0 as usize)
    }

    pub fn shader_label(&self, shader: ShaderHandle) -> Option<&str> {
        self.shaders.get(shader.0 as usize).map(|s| s.label.as_str())
    }

    /// Point-samples a cube view along `direction`, returning the texel bytes.
    ///
    /// Face selection follows the usual major-axis rule with faces stored
    /// in the order +X, -X, +Y, -Y, +Z, -Z.
    pub fn sample_cube(&self, view: ShaderResourceView, direction: Vector3<f32>) -> Option<Vec<u8>> {
        let (texture, dimension) = *self.shader_resource_views.get(view.0)?;
        if dimension != ViewDimension::Cube {
            return None;
        }
        let record = self.textures.get(texture.0)?;
        let (face, s, t) = cube_face_coords(direction)?;

        let x = ((s * record.width as f32) as u32).min(record.width - 1);
        let y = ((t * record.height as f32) as u32).min(record.height - 1);
        let bpp = bytes_per_pixel(record.format)? as usize;
        let start = ((y * record.width + x) as usize) * bpp;
        record.layers.get(face)?.get(start..start + bpp).map(<[u8]>::to_vec)
    }

    fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    fn texture(&self, texture: TextureHandle) -> Result<&TextureRecord> {
        self.textures.get(texture.0).ok_or(RenderError::InvalidHandle {
            kind: "texture",
            id: texture.0,
        })
    }

    fn check_depth_hazard(&mut self) {
        let Some(depth) = self.bound.depth else {
            return;
        };
        let Some(&target) = self.depth_stencil_views.get(depth.0) else {
            return;
        };
        let reading = self
            .bound
            .resources
            .iter()
            .flatten()
            .flatten()
            .any(|view| self.shader_resource_views.get(view.0).map(|(t, _)| *t) == Some(target));

        if reading {
            log::warn!("texture {} is bound as depth target and shader resource", target.0);
            self.hazards.push(Hazard {
                texture: target,
                command_index: self.commands.len().saturating_sub(1),
            });
        }
    }
}

/// Face index and [0, 1] face coordinates for a cube lookup direction.
fn cube_face_coords(direction: Vector3<f32>) -> Option<(usize, f32, f32)> {
    let (x, y, z) = (direction.x, direction.y, direction.z);
    let (ax, ay, az) = (x.abs(), y.abs(), z.abs());

    let (face, sc, tc, ma) = if ax >= ay && ax >= az {
        if x >= 0.0 {
            (0, -z, -y, ax)
        } else {
            (1, z, -y, ax)
        }
    } else if ay >= az {
        if y >= 0.0 {
            (2, x, z, ay)
        } else {
            (3, x, -z, ay)
        }
    } else if z >= 0.0 {
        (4, x, -y, az)
    } else {
        (5, -x, -y, az)
    };

    if ma == 0.0 {
        return None;
    }
    Some((face, (sc / ma + 1.0) * 0.5, (tc / ma + 1.0) * 0.5))
}

impl GraphicsDevice for RecordingDevice {
    fn create_buffer(&mut self, desc: &BufferDesc, contents: Option<&[u8]>) -> Result<BufferHandle> {
        let mut data = vec![0; desc.size as usize];
        if let Some(contents) = contents {
            if contents.len() > data.len() {
                return Err(RenderError::BufferOverflow {
                    size: desc.size,
                    len: contents.len() as u64,
                });
            }
            data[..contents.len()].copy_from_slice(contents);
        }
        self.buffers.push(BufferRecord {
            usage: desc.usage,
            data,
        });
        Ok(BufferHandle(self.buffers.len() as u32 - 1))
    }

    fn create_texture(&mut self, desc: &TextureDesc, layers: &[&[u8]]) -> Result<TextureHandle> {
        if desc.width == 0 || desc.height == 0 || desc.array_layers == 0 {
            return Err(RenderError::invalid("texture", format!("'{}' has a zero extent", desc.label)));
        }
        if desc.cube_compatible && desc.array_layers != 6 {
            return Err(RenderError::invalid("texture", "cube textures need exactly 6 layers"));
        }
        if !layers.is_empty() && layers.len() != desc.array_layers as usize {
            return Err(RenderError::invalid(
                "texture",
                format!("{} layers of data for {} array layers", layers.len(), desc.array_layers),
            ));
        }

        let layer_size = bytes_per_pixel(desc.format).unwrap_or(4) as usize * (desc.width * desc.height) as usize;
        let mut storage = vec![vec![0u8; layer_size]; desc.array_layers as usize];
        for (dst, src) in storage.iter_mut().zip(layers) {
            let len = src.len().min(layer_size);
            dst[..len].copy_from_slice(&src[..len]);
        }

        Ok(TextureHandle(self.textures.insert(TextureRecord {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            cube_compatible: desc.cube_compatible,
            layers: storage,
        })))
    }

    fn create_render_target_view(&mut self, texture: TextureHandle) -> Result<RenderTargetView> {
        self.texture(texture)?;
        Ok(RenderTargetView(self.render_target_views.insert(Some(texture))))
    }

    fn create_depth_stencil_view(&mut self, texture: TextureHandle) -> Result<DepthStencilView> {
        let format = self.texture(texture)?.format;
        if !format.is_depth_stencil_format() {
            return Err(RenderError::invalid("depth stencil view", format!("{format:?} is not a depth format")));
        }
        Ok(DepthStencilView(self.depth_stencil_views.insert(texture)))
    }

    fn create_shader_resource_view(
        &mut self,
        texture: TextureHandle,
        dimension: ViewDimension,
    ) -> Result<ShaderResourceView> {
        if dimension == ViewDimension::Cube && !self.texture(texture)?.cube_compatible {
            return Err(RenderError::invalid("shader resource view", "texture is not cube compatible"));
        }
        self.texture(texture)?;
        Ok(ShaderResourceView(self.shader_resource_views.insert((texture, dimension))))
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerState> {
        self.samplers.push(desc.clone());
        Ok(SamplerState(self.samplers.len() as u32 - 1))
    }

    fn create_rasterizer_state(&mut self, desc: &RasterizerDesc) -> Result<RasterizerState> {
        self.rasterizers.push(*desc);
        Ok(RasterizerState(self.rasterizers.len() as u32 - 1))
    }

    fn create_depth_stencil_state(&mut self, desc: &DepthStencilDesc) -> Result<DepthStencilState> {
        self.depth_states.push(*desc);
        Ok(DepthStencilState(self.depth_states.len() as u32 - 1))
    }

    fn create_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderHandle> {
        if desc.layout.resources().iter().any(|r| r.slot as usize >= MAX_RESOURCE_SLOTS) {
            return Err(RenderError::invalid("shader", format!("'{}' uses a slot above {}", desc.label, MAX_RESOURCE_SLOTS - 1)));
        }
        self.shaders.push(ShaderRecord {
            label: desc.label.to_owned(),
            stage: desc.stage,
        });
        Ok(ShaderHandle(self.shaders.len() as u32 - 1))
    }

    fn release_texture(&mut self, texture: TextureHandle) -> Result<()> {
        self.textures.remove(texture.0).ok_or(RenderError::InvalidHandle {
            kind: "texture",
            id: texture.0,
        })?;

        let colors = self.render_target_views.remove_where(|t| *t == Some(texture));
        if self.bound.color.is_some_and(|view| colors.contains(&view.0)) {
            self.bound.color = None;
        }
        let depths = self.depth_stencil_views.remove_where(|t| *t == texture);
        if self.bound.depth.is_some_and(|view| depths.contains(&view.0)) {
            self.bound.depth = None;
        }
        let reads = self.shader_resource_views.remove_where(|(t, _)| *t == texture);
        for bound in self.bound.resources.iter_mut().flatten() {
            if bound.is_some_and(|view| reads.contains(&view.0)) {
                *bound = None;
            }
        }
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<()> {
        self.width = width.max(1);
        self.height = height.max(1);
        Ok(())
    }
}

impl GraphicsContext for RecordingDevice {
    fn clear_render_target(&mut self, view: RenderTargetView, color: [f32; 4]) {
        self.push(Command::ClearRenderTarget { view, color });
    }

    fn clear_depth(&mut self, view: DepthStencilView, depth: f32) {
        self.push(Command::ClearDepth { view, depth });
    }

    fn set_render_targets(&mut self, color: Option<RenderTargetView>, depth: Option<DepthStencilView>) {
        self.bound.color = color;
        self.bound.depth = depth;
        self.push(Command::SetRenderTargets { color, depth });
        self.check_depth_hazard();
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.push(Command::SetViewport(viewport));
    }

    fn set_rasterizer_state(&mut self, state: Option<RasterizerState>) {
        self.bound.rasterizer = state;
        self.push(Command::SetRasterizerState(state));
    }

    fn set_depth_stencil_state(&mut self, state: Option<DepthStencilState>) {
        self.bound.depth_state = state;
        self.push(Command::SetDepthStencilState(state));
    }

    fn set_shader(&mut self, stage: ShaderStage, shader: Option<ShaderHandle>) {
        if let Some(record) = shader.and_then(|s| self.shaders.get(s.0 as usize)) {
            if record.stage != stage {
                log::warn!("'{}' is a {:?} shader bound to the {:?} stage", record.label, record.stage, stage);
            }
        }
        self.bound.shaders[stage.index()] = shader;
        self.push(Command::SetShader { stage, shader });
    }

    fn set_constant_buffer(&mut self, stage: ShaderStage, slot: u32, buffer: Option<BufferHandle>) {
        self.push(Command::SetConstantBuffer { stage, slot, buffer });
    }

    fn set_shader_resource(&mut self, stage: ShaderStage, slot: u32, view: Option<ShaderResourceView>) {
        if let Some(bound) = self.bound.resources[stage.index()].get_mut(slot as usize) {
            *bound = view;
        }
        self.push(Command::SetShaderResource { stage, slot, view });
        self.check_depth_hazard();
    }

    fn set_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: Option<SamplerState>) {
        self.push(Command::SetSampler { stage, slot, sampler });
    }

    fn unbind_shader_resources(&mut self, stage: ShaderStage) {
        self.bound.resources[stage.index()] = [None; MAX_RESOURCE_SLOTS];
        self.push(Command::UnbindShaderResources { stage });
    }

    fn write_buffer_discard(&mut self, buffer: BufferHandle, data: &[u8]) -> Result<()> {
        let record = self
            .buffers
            .get_mut(buffer.0 as usize)
            .ok_or(RenderError::InvalidHandle { kind: "buffer", id: buffer.0 })?;
        if data.len() > record.data.len() {
            return Err(RenderError::BufferOverflow {
                size: record.data.len() as u64,
                len: data.len() as u64,
            });
        }
        if record.usage != BufferUsage::Constant {
            log::warn!("write-discard to a {:?} buffer", record.usage);
        }

        record.data.fill(0);
        record.data[..data.len()].copy_from_slice(data);
        self.push(Command::WriteBuffer { buffer, len: data.len() });
        Ok(())
    }

    fn set_vertex_buffer(&mut self, buffer: BufferHandle, stride: u32) {
        self.bound.vertex_buffer = Some(buffer);
        self.push(Command::SetVertexBuffer { buffer, stride });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle) {
        self.bound.index_buffer = Some(buffer);
        self.push(Command::SetIndexBuffer { buffer });
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) -> Result<()> {
        if self.bound.shaders[ShaderStage::Vertex.index()].is_none() {
            return Err(RenderError::invalid("draw", "no vertex shader bound"));
        }
        let index_buffer = self
            .bound
            .index_buffer
            .ok_or_else(|| RenderError::invalid("draw", "no index buffer bound"))?;
        if self.bound.vertex_buffer.is_none() {
            return Err(RenderError::invalid("draw", "no vertex buffer bound"));
        }
        let available = self
            .buffers
            .get(index_buffer.0 as usize)
            .map_or(0, |b| b.data.len() / 4);
        let end = first_index.checked_add(index_count).ok_or_else(|| {
            RenderError::invalid("draw", format!("{index_count} indices from {first_index} overflow the index range"))
        })?;
        if end as usize > available {
            return Err(RenderError::invalid(
                "draw",
                format!("{} indices from {} exceed the {} in the index buffer", index_count, first_index, available),
            ));
        }

        self.push(Command::DrawIndexed {
            index_count,
            first_index,
            base_vertex,
            color_target: self.bound.color,
            depth_target: self.bound.depth,
            vertex_shader: self.bound.shaders[ShaderStage::Vertex.index()],
            pixel_shader: self.bound.shaders[ShaderStage::Pixel.index()],
            rasterizer: self.bound.rasterizer,
            depth_state: self.bound.depth_state,
        });
        Ok(())
    }

    fn copy_texture_to_slice(&mut self, source: TextureHandle, destination: TextureHandle, slice: u32) -> Result<()> {
        let src = self.texture(source)?;
        let dst = self.texture(destination)?;
        if slice as usize >= dst.layers.len() {
            return Err(RenderError::invalid(
                "texture copy",
                format!("slice {} of a {}-layer texture", slice, dst.layers.len()),
            ));
        }
        if src.format != dst.format || src.width != dst.width || src.height != dst.height {
            log::warn!(
                "copying {}x{} {:?} into {}x{} {:?}; result is undefined",
                src.width, src.height, src.format, dst.width, dst.height, dst.format
            );
        }

        // Row by row over the overlapping region
        let bpp = bytes_per_pixel(src.format).unwrap_or(4) as usize;
        let (src_width, dst_width) = (src.width as usize, dst.width as usize);
        let copy_width = src_width.min(dst_width) * bpp;
        let rows = src.height.min(dst.height) as usize;
        let source_layer = src.layers[0].clone();

        let target = self
            .textures
            .get_mut(destination.0)
            .and_then(|record| record.layers.get_mut(slice as usize))
            .ok_or(RenderError::InvalidHandle {
                kind: "texture",
                id: destination.0,
            })?;
        for row in 0..rows {
            let from = row * src_width * bpp;
            let to = row * dst_width * bpp;
            let (Some(src_row), Some(dst_row)) = (
                source_layer.get(from..from + copy_width),
                target.get_mut(to..to + copy_width),
            ) else {
                break;
            };
            dst_row.copy_from_slice(src_row);
        }

        self.push(Command::CopyTextureToSlice {
            source,
            destination,
            slice,
        });
        Ok(())
    }

    fn present(&mut self, vsync: bool) -> Result<()> {
        self.push(Command::Present { vsync });
        // Presenting drops the output bindings
        self.bound.color = None;
        self.bound.depth = None;
        self.frames_presented += 1;
        Ok(())
    }

    fn discard_frame(&mut self) {
        self.push(Command::DiscardFrame);
        self.bound.color = None;
        self.bound.depth = None;
        self.frames_discarded += 1;
    }
}
