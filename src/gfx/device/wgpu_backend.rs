//! `wgpu` implementation of the device and context traits.
//!
//! The context is immediate-mode on the surface but deferred underneath:
//! state changes and draws are recorded, constant buffer contents are
//! snapshotted into a per-frame uniform ring at each draw, and everything is
//! encoded into render passes and submitted on `present`. A new pass starts
//! whenever the bound targets change or a bound target is cleared.
//!
//! Bind groups follow one convention: group 0 belongs to the vertex stage and
//! group 1 to the pixel stage. Within a group, binding 0 is the uniform block,
//! texture slot `n` is binding `16 + n` and sampler slot `n` is `32 + n`.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use wgpu::util::DeviceExt;
use winit::window::Window;

use super::slots::Slots;
use super::{
    bytes_per_pixel, BufferDesc, BufferHandle, BufferUsage, DepthStencilDesc, DepthStencilState,
    DepthStencilView, GraphicsContext, GraphicsDevice, RasterizerDesc, RasterizerState, RenderTargetView,
    SamplerDesc, SamplerState, ShaderDesc, ShaderHandle, ShaderResourceView, ShaderStage, TextureDesc,
    TextureHandle, ViewDimension, Viewport,
};
use crate::error::{RenderError, Result};
use crate::gfx::scene::Vertex;
use crate::gfx::shader::{ParameterLayout, ResourceKind};

const MAX_RESOURCE_SLOTS: usize = 16;
const TEXTURE_BINDING_BASE: u32 = 16;
const SAMPLER_BINDING_BASE: u32 = 32;
const MIN_RING_CAPACITY: u64 = 64 * 1024;

enum BufferStorage {
    Gpu(wgpu::Buffer),
    /// Constant buffers stay on the CPU; draws copy them into the ring.
    Staged(Vec<u8>),
}

struct GpuBuffer {
    storage: BufferStorage,
    size: u64,
}

struct GpuTexture {
    texture: wgpu::Texture,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
}

struct GpuView {
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    texture: TextureHandle,
}

struct GpuShader {
    label: String,
    stage: ShaderStage,
    module: wgpu::ShaderModule,
    entry_point: String,
    layout: ParameterLayout,
    bind_group_layout: wgpu::BindGroupLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    vertex: ShaderHandle,
    pixel: Option<ShaderHandle>,
    rasterizer: Option<RasterizerState>,
    depth_state: Option<DepthStencilState>,
    color_format: Option<wgpu::TextureFormat>,
    depth_format: Option<wgpu::TextureFormat>,
}

#[derive(Default)]
struct BoundState {
    color: Option<RenderTargetView>,
    depth: Option<DepthStencilView>,
    viewport: Option<Viewport>,
    rasterizer: Option<RasterizerState>,
    depth_state: Option<DepthStencilState>,
    shaders: [Option<ShaderHandle>; 2],
    constant_buffers: [Option<BufferHandle>; 2],
    resources: [[Option<ShaderResourceView>; MAX_RESOURCE_SLOTS]; 2],
    samplers: [[Option<SamplerState>; MAX_RESOURCE_SLOTS]; 2],
    vertex_buffer: Option<(BufferHandle, u32)>,
    index_buffer: Option<BufferHandle>,
}

struct StageBinding {
    shader: ShaderHandle,
    uniform_offset: Option<u32>,
    textures: Vec<(u32, ShaderResourceView)>,
    samplers: Vec<(u32, SamplerState)>,
}

struct RecordedDraw {
    pipeline: PipelineKey,
    viewport: Option<Viewport>,
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    index_count: u32,
    first_index: u32,
    base_vertex: i32,
    stages: Vec<StageBinding>,
}

struct RecordedPass {
    color: Option<RenderTargetView>,
    depth: Option<DepthStencilView>,
    color_clear: Option<[f32; 4]>,
    depth_clear: Option<f32>,
    draws: Vec<RecordedDraw>,
}

#[derive(Default)]
struct FrameRecording {
    passes: Vec<RecordedPass>,
    pass_open: bool,
    color_clears: Vec<(RenderTargetView, [f32; 4])>,
    depth_clears: Vec<(DepthStencilView, f32)>,
}

impl FrameRecording {
    fn take_color_clear(&mut self, view: Option<RenderTargetView>) -> Option<[f32; 4]> {
        let view = view?;
        let i = self.color_clears.iter().position(|(v, _)| *v == view)?;
        Some(self.color_clears.remove(i).1)
    }

    fn take_depth_clear(&mut self, view: Option<DepthStencilView>) -> Option<f32> {
        let view = view?;
        let i = self.depth_clears.iter().position(|(v, _)| *v == view)?;
        Some(self.depth_clears.remove(i).1)
    }
}

/// Per-frame uniform storage addressed with dynamic offsets.
struct UniformRing {
    buffer: Option<wgpu::Buffer>,
    capacity: u64,
    alignment: u64,
    data: Vec<u8>,
}

impl UniformRing {
    fn new(alignment: u32) -> Self {
        Self {
            buffer: None,
            capacity: 0,
            alignment: u64::from(alignment.max(16)),
            data: Vec::new(),
        }
    }

    fn push(&mut self, bytes: &[u8]) -> u32 {
        let offset = (self.data.len() as u64).div_ceil(self.alignment) * self.alignment;
        self.data.resize(offset as usize, 0);
        self.data.extend_from_slice(bytes);
        offset as u32
    }

    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        if self.data.is_empty() {
            return;
        }
        let needed = self.data.len() as u64;
        if self.buffer.is_none() || self.capacity < needed {
            let capacity = needed.next_power_of_two().max(MIN_RING_CAPACITY);
            log::debug!("growing uniform ring to {} bytes", capacity);
            self.buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("uniform_ring"),
                size: capacity,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
            self.capacity = capacity;
        }
        if let Some(buffer) = &self.buffer {
            queue.write_buffer(buffer, 0, &self.data);
        }
    }
}

pub struct WgpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    clamp_to_border: bool,
    buffers: Vec<GpuBuffer>,
    textures: Slots<GpuTexture>,
    /// Index 0 is the back buffer, resolved at present time.
    render_target_views: Slots<Option<GpuView>>,
    depth_stencil_views: Slots<GpuView>,
    shader_resource_views: Slots<GpuView>,
    samplers: Vec<wgpu::Sampler>,
    rasterizers: Vec<RasterizerDesc>,
    depth_states: Vec<DepthStencilDesc>,
    shaders: Vec<GpuShader>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    bound: BoundState,
    frame: FrameRecording,
    ring: UniformRing,
}

impl WgpuDevice {
    /// Opens an adapter and device for `window` and configures its surface.
    pub async fn new(window: Arc<Window>, vsync: bool) -> Result<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;

        let info = adapter.get_info();
        log::info!("using adapter '{}' ({:?})", info.name, info.backend);

        let required_features = adapter.features() & wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER;
        let clamp_to_border = required_features.contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER);
        if !clamp_to_border {
            log::warn!("adapter lacks clamp-to-border sampling; shadow lookups clamp to edge");
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("umbra_device"),
                required_features,
                required_limits: wgpu::Limits {
                    max_texture_dimension_2d: 4096,
                    ..wgpu::Limits::downlevel_defaults()
                },
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        let capabilities = surface.get_capabilities(&adapter);
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| capabilities.formats.first().copied())
            .ok_or_else(|| RenderError::Present("surface reports no formats".to_owned()))?;
        let alpha_mode = capabilities
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: present_mode(vsync),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let alignment = device.limits().min_uniform_buffer_offset_alignment;
        let mut render_target_views = Slots::new();
        render_target_views.insert(None);
        Ok(Self {
            surface,
            device,
            queue,
            config,
            clamp_to_border,
            buffers: Vec::new(),
            textures: Slots::new(),
            render_target_views,
            depth_stencil_views: Slots::new(),
            shader_resource_views: Slots::new(),
            samplers: Vec::new(),
            rasterizers: Vec::new(),
            depth_states: Vec::new(),
            shaders: Vec::new(),
            pipelines: HashMap::new(),
            bound: BoundState::default(),
            frame: FrameRecording::default(),
            ring: UniformRing::new(alignment),
        })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn texture(&self, texture: TextureHandle) -> Result<&GpuTexture> {
        self.textures.get(texture.0).ok_or(RenderError::InvalidHandle {
            kind: "texture",
            id: texture.0,
        })
    }

    fn shader(&self, shader: ShaderHandle) -> Result<&GpuShader> {
        self.shaders.get(shader.0 as usize).ok_or(RenderError::InvalidHandle {
            kind: "shader",
            id: shader.0,
        })
    }

    fn color_format(&self, view: RenderTargetView) -> Result<wgpu::TextureFormat> {
        if view == RenderTargetView::BACK_BUFFER {
            return Ok(self.config.format);
        }
        self.render_target_views
            .get(view.0)
            .and_then(Option::as_ref)
            .map(|v| v.format)
            .ok_or(RenderError::InvalidHandle {
                kind: "render target view",
                id: view.0,
            })
    }

    fn depth_format(&self, view: DepthStencilView) -> Result<wgpu::TextureFormat> {
        self.depth_stencil_views
            .get(view.0)
            .map(|v| v.format)
            .ok_or(RenderError::InvalidHandle {
                kind: "depth stencil view",
                id: view.0,
            })
    }

    /// Runs `f` inside a validation error scope and turns a captured error
    /// into a `RenderError`.
    fn validated<T>(&self, what: &'static str, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(RenderError::invalid(what, err.to_string())),
            None => Ok(value),
        }
    }

    fn bind_group_layout(&self, label: &str, stage: ShaderStage, layout: &ParameterLayout) -> Result<wgpu::BindGroupLayout> {
        let visibility = match stage {
            ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
            ShaderStage::Pixel => wgpu::ShaderStages::FRAGMENT,
        };

        let mut entries = Vec::new();
        if let Some(size) = NonZeroU64::new(u64::from(layout.size())) {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: Some(size),
                },
                count: None,
            });
        }
        for resource in layout.resources() {
            let (binding, ty) = match resource.kind {
                ResourceKind::Texture2d => (
                    TEXTURE_BINDING_BASE + resource.slot,
                    texture_binding(wgpu::TextureSampleType::Float { filterable: true }, wgpu::TextureViewDimension::D2),
                ),
                ResourceKind::TextureCube => (
                    TEXTURE_BINDING_BASE + resource.slot,
                    texture_binding(wgpu::TextureSampleType::Float { filterable: true }, wgpu::TextureViewDimension::Cube),
                ),
                ResourceKind::DepthTexture2d => (
                    TEXTURE_BINDING_BASE + resource.slot,
                    texture_binding(wgpu::TextureSampleType::Depth, wgpu::TextureViewDimension::D2),
                ),
                ResourceKind::Sampler => (
                    SAMPLER_BINDING_BASE + resource.slot,
                    wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                ),
                ResourceKind::ComparisonSampler => (
                    SAMPLER_BINDING_BASE + resource.slot,
                    wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                ),
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility,
                ty,
                count: None,
            });
        }

        self.validated("bind group layout", |device| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &entries,
            })
        })
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) -> Result<()> {
        if self.pipelines.contains_key(&key) {
            return Ok(());
        }

        let vertex = self.shader(key.vertex)?;
        let pixel = key.pixel.map(|p| self.shader(p)).transpose()?;
        let rasterizer = match key.rasterizer {
            Some(state) => *self.rasterizers.get(state.0 as usize).ok_or(RenderError::InvalidHandle {
                kind: "rasterizer state",
                id: state.0,
            })?,
            None => RasterizerDesc::default(),
        };
        let depth = match key.depth_state {
            Some(state) => *self.depth_states.get(state.0 as usize).ok_or(RenderError::InvalidHandle {
                kind: "depth stencil state",
                id: state.0,
            })?,
            None => DepthStencilDesc::default(),
        };

        let mut bind_group_layouts = vec![&vertex.bind_group_layout];
        if let Some(pixel) = pixel {
            bind_group_layouts.push(&pixel.bind_group_layout);
        }
        let label = match pixel {
            Some(pixel) => format!("{}+{}", vertex.label, pixel.label),
            None => vertex.label.clone(),
        };

        let color_targets = [key.color_format.map(|format| wgpu::ColorTargetState {
            format,
            blend: Some(wgpu::BlendState::REPLACE),
            write_mask: wgpu::ColorWrites::ALL,
        })];
        let targets: &[Option<wgpu::ColorTargetState>] = if key.color_format.is_some() {
            &color_targets
        } else {
            &[]
        };

        let pipeline = self.validated("render pipeline", |device| {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label.as_str()),
                bind_group_layouts: &bind_group_layouts,
                push_constant_ranges: &[],
            });

            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label.as_str()),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &vertex.module,
                    entry_point: Some(vertex.entry_point.as_str()),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[Vertex::desc()],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: rasterizer.front_face,
                    cull_mode: rasterizer.cull_mode,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: key.depth_format.map(|format| wgpu::DepthStencilState {
                    format,
                    depth_write_enabled: depth.depth_write,
                    depth_compare: depth.depth_compare,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState {
                        constant: rasterizer.depth_bias,
                        slope_scale: rasterizer.slope_scaled_depth_bias,
                        clamp: rasterizer.depth_bias_clamp,
                    },
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: pixel.map(|pixel| wgpu::FragmentState {
                    module: &pixel.module,
                    entry_point: Some(pixel.entry_point.as_str()),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets,
                }),
                multiview: None,
                cache: None,
            })
        })?;

        log::debug!("created pipeline '{}' ({} cached)", label, self.pipelines.len() + 1);
        self.pipelines.insert(key, pipeline);
        Ok(())
    }

    /// Snapshots what the bound shader on `stage` reads.
    fn stage_binding(&mut self, stage: ShaderStage, shader: ShaderHandle) -> Result<StageBinding> {
        let index = stage.index();
        let gpu_shader = self.shader(shader)?;
        let size = gpu_shader.layout.size() as usize;

        let mut textures = Vec::new();
        let mut samplers = Vec::new();
        for resource in gpu_shader.layout.resources() {
            let slot = resource.slot as usize;
            if resource.kind.is_sampler() {
                let sampler = self.bound.samplers[index][slot].ok_or_else(|| {
                    RenderError::invalid("draw", format!("'{}' has no sampler for '{}'", gpu_shader.label, resource.name))
                })?;
                samplers.push((SAMPLER_BINDING_BASE + resource.slot, sampler));
            } else {
                let view = self.bound.resources[index][slot].ok_or_else(|| {
                    RenderError::invalid("draw", format!("'{}' has no texture for '{}'", gpu_shader.label, resource.name))
                })?;
                textures.push((TEXTURE_BINDING_BASE + resource.slot, view));
            }
        }

        let uniform_offset = if size > 0 {
            let buffer = self.bound.constant_buffers[index].ok_or_else(|| {
                RenderError::invalid("draw", format!("'{}' has no constant buffer bound", gpu_shader.label))
            })?;
            let Some(GpuBuffer {
                storage: BufferStorage::Staged(data),
                ..
            }) = self.buffers.get(buffer.0 as usize)
            else {
                return Err(RenderError::invalid("draw", "constant buffer slot holds a non-constant buffer"));
            };
            let end = size.min(data.len());
            let mut block = data[..end].to_vec();
            block.resize(size, 0);
            Some(self.ring.push(&block))
        } else {
            None
        };

        Ok(StageBinding {
            shader,
            uniform_offset,
            textures,
            samplers,
        })
    }

    fn create_bind_group(&self, group: &StageBinding, ring: &wgpu::Buffer) -> Result<wgpu::BindGroup> {
        let shader = self.shader(group.shader)?;
        let mut entries = Vec::new();
        if let Some(size) = NonZeroU64::new(u64::from(shader.layout.size())) {
            entries.push(wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: ring,
                    offset: 0,
                    size: Some(size),
                }),
            });
        }
        for &(binding, view) in &group.textures {
            let view = self
                .shader_resource_views
                .get(view.0)
                .ok_or(RenderError::InvalidHandle {
                    kind: "shader resource view",
                    id: view.0,
                })?;
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(&view.view),
            });
        }
        for &(binding, sampler) in &group.samplers {
            let sampler = self.samplers.get(sampler.0 as usize).ok_or(RenderError::InvalidHandle {
                kind: "sampler",
                id: sampler.0,
            })?;
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(shader.label.as_str()),
            layout: &shader.bind_group_layout,
            entries: &entries,
        }))
    }

    /// Encodes every recorded pass into `encoder`, drawing to `back_buffer`
    /// wherever the back buffer was bound.
    fn encode_frame(&self, encoder: &mut wgpu::CommandEncoder, back_buffer: &wgpu::TextureView) -> Result<()> {
        let ring = self.ring.buffer.as_ref();
        for (index, pass) in self.frame.passes.iter().enumerate() {
            let mut bind_groups = Vec::with_capacity(pass.draws.len());
            for draw in &pass.draws {
                let mut groups = Vec::with_capacity(draw.stages.len());
                for stage in &draw.stages {
                    let ring = ring.ok_or_else(|| RenderError::invalid("frame", "uniform ring was not uploaded"))?;
                    groups.push(self.create_bind_group(stage, ring)?);
                }
                bind_groups.push(groups);
            }

            let color_view = match pass.color {
                Some(RenderTargetView::BACK_BUFFER) => Some(back_buffer),
                Some(view) => Some(
                    self.render_target_views
                        .get(view.0)
                        .and_then(Option::as_ref)
                        .map(|v| &v.view)
                        .ok_or(RenderError::InvalidHandle {
                            kind: "render target view",
                            id: view.0,
                        })?,
                ),
                None => None,
            };
            let depth_view = match pass.depth {
                Some(view) => Some(
                    self.depth_stencil_views
                        .get(view.0)
                        .map(|v| &v.view)
                        .ok_or(RenderError::InvalidHandle {
                            kind: "depth stencil view",
                            id: view.0,
                        })?,
                ),
                None => None,
            };

            let color_attachments = [color_view.map(|view| wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: match pass.color_clear {
                        Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(r),
                            g: f64::from(g),
                            b: f64::from(b),
                            a: f64::from(a),
                        }),
                        None => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                },
            })];

            let label = format!("pass {index}");
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label.as_str()),
                color_attachments: if color_view.is_some() { &color_attachments } else { &[] },
                depth_stencil_attachment: depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: match pass.depth_clear {
                            Some(depth) => wgpu::LoadOp::Clear(depth),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            for (draw, groups) in pass.draws.iter().zip(&bind_groups) {
                let Some(pipeline) = self.pipelines.get(&draw.pipeline) else {
                    return Err(RenderError::invalid("frame", "draw recorded without a pipeline"));
                };
                render_pass.set_pipeline(pipeline);
                if let Some(vp) = draw.viewport {
                    render_pass.set_viewport(vp.x, vp.y, vp.width, vp.height, vp.min_depth, vp.max_depth);
                }
                for (group, (bind_group, stage)) in groups.iter().zip(&draw.stages).enumerate() {
                    let offsets: Vec<u32> = stage.uniform_offset.into_iter().collect();
                    render_pass.set_bind_group(group as u32, bind_group, &offsets);
                }

                let (Some(GpuBuffer { storage: BufferStorage::Gpu(vertices), .. }), Some(GpuBuffer { storage: BufferStorage::Gpu(indices), .. })) = (
                    self.buffers.get(draw.vertex_buffer.0 as usize),
                    self.buffers.get(draw.index_buffer.0 as usize),
                ) else {
                    return Err(RenderError::invalid("frame", "draw references a missing geometry buffer"));
                };
                render_pass.set_vertex_buffer(0, vertices.slice(..));
                render_pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(
                    draw.first_index..draw.first_index + draw.index_count,
                    draw.base_vertex,
                    0..1,
                );
            }
        }
        Ok(())
    }

    /// Turns clears that no draw picked up into passes of their own.
    fn flush_pending_clears(&mut self) {
        let colors = std::mem::take(&mut self.frame.color_clears);
        let depths = std::mem::take(&mut self.frame.depth_clears);
        for (view, color) in colors {
            self.frame.passes.push(RecordedPass {
                color: Some(view),
                depth: None,
                color_clear: Some(color),
                depth_clear: None,
                draws: Vec::new(),
            });
        }
        for (view, depth) in depths {
            self.frame.passes.push(RecordedPass {
                color: None,
                depth: Some(view),
                color_clear: None,
                depth_clear: Some(depth),
                draws: Vec::new(),
            });
        }
    }

    fn end_frame(&mut self) {
        self.frame = FrameRecording::default();
        self.ring.data.clear();
        self.bound.color = None;
        self.bound.depth = None;
    }

    fn set_present_mode(&mut self, vsync: bool) {
        let mode = present_mode(vsync);
        if self.config.present_mode != mode {
            log::info!("vsync {}", if vsync { "on" } else { "off" });
            self.config.present_mode = mode;
            self.surface.configure(&self.device, &self.config);
        }
    }
}

fn present_mode(vsync: bool) -> wgpu::PresentMode {
    if vsync {
        wgpu::PresentMode::AutoVsync
    } else {
        wgpu::PresentMode::AutoNoVsync
    }
}

fn texture_binding(sample_type: wgpu::TextureSampleType, view_dimension: wgpu::TextureViewDimension) -> wgpu::BindingType {
    wgpu::BindingType::Texture {
        sample_type,
        view_dimension,
        multisampled: false,
    }
}

impl GraphicsDevice for WgpuDevice {
    fn create_buffer(&mut self, desc: &BufferDesc, contents: Option<&[u8]>) -> Result<BufferHandle> {
        if let Some(contents) = contents {
            if contents.len() as u64 > desc.size {
                return Err(RenderError::BufferOverflow {
                    size: desc.size,
                    len: contents.len() as u64,
                });
            }
        }

        let usage = match desc.usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            BufferUsage::Index => wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            BufferUsage::Constant => {
                let mut data = vec![0; desc.size as usize];
                if let Some(contents) = contents {
                    data[..contents.len()].copy_from_slice(contents);
                }
                self.buffers.push(GpuBuffer {
                    storage: BufferStorage::Staged(data),
                    size: desc.size,
                });
                return Ok(BufferHandle(self.buffers.len() as u32 - 1));
            }
        };

        // Sizes are rounded up to the copy alignment
        let size = desc.size.div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT;
        let buffer = match contents {
            Some(contents) => {
                let mut padded = contents.to_vec();
                padded.resize(size as usize, 0);
                self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(desc.label),
                    contents: &padded,
                    usage,
                })
            }
            None => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(desc.label),
                size,
                usage,
                mapped_at_creation: false,
            }),
        };

        self.buffers.push(GpuBuffer {
            storage: BufferStorage::Gpu(buffer),
            size,
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

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.array_layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: desc.usage,
            view_formats: &[],
        });

        if !layers.is_empty() {
            let bpp = bytes_per_pixel(desc.format)
                .ok_or_else(|| RenderError::invalid("texture", format!("cannot upload {:?} data", desc.format)))?;
            for (layer, data) in layers.iter().enumerate() {
                let expected = (bpp * desc.width * desc.height) as usize;
                if data.len() < expected {
                    return Err(RenderError::invalid(
                        "texture",
                        format!("layer {} has {} bytes, needs {}", layer, data.len(), expected),
                    ));
                }
                self.queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d {
                            x: 0,
                            y: 0,
                            z: layer as u32,
                        },
                        aspect: wgpu::TextureAspect::All,
                    },
                    &data[..expected],
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(bpp * desc.width),
                        rows_per_image: Some(desc.height),
                    },
                    wgpu::Extent3d {
                        width: desc.width,
                        height: desc.height,
                        depth_or_array_layers: 1,
                    },
                );
            }
        }

        Ok(TextureHandle(self.textures.insert(GpuTexture {
            texture,
            format: desc.format,
            width: desc.width,
            height: desc.height,
        })))
    }

    fn create_render_target_view(&mut self, texture: TextureHandle) -> Result<RenderTargetView> {
        let record = self.texture(texture)?;
        let view = GpuView {
            view: record.texture.create_view(&wgpu::TextureViewDescriptor::default()),
            format: record.format,
            texture,
        };
        Ok(RenderTargetView(self.render_target_views.insert(Some(view))))
    }

    fn create_depth_stencil_view(&mut self, texture: TextureHandle) -> Result<DepthStencilView> {
        let record = self.texture(texture)?;
        if !record.format.is_depth_stencil_format() {
            return Err(RenderError::invalid(
                "depth stencil view",
                format!("{:?} is not a depth format", record.format),
            ));
        }
        let view = GpuView {
            view: record.texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("depth_stencil_view"),
                dimension: Some(wgpu::TextureViewDimension::D2),
                array_layer_count: Some(1),
                ..Default::default()
            }),
            format: record.format,
            texture,
        };
        Ok(DepthStencilView(self.depth_stencil_views.insert(view)))
    }

    fn create_shader_resource_view(
        &mut self,
        texture: TextureHandle,
        dimension: ViewDimension,
    ) -> Result<ShaderResourceView> {
        let record = self.texture(texture)?;
        let aspect = if record.format.is_depth_stencil_format() {
            wgpu::TextureAspect::DepthOnly
        } else {
            wgpu::TextureAspect::All
        };
        let (dimension, layers) = match dimension {
            ViewDimension::D2 => (wgpu::TextureViewDimension::D2, 1),
            ViewDimension::Cube => (wgpu::TextureViewDimension::Cube, 6),
        };
        let view = GpuView {
            view: record.texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("shader_resource_view"),
                dimension: Some(dimension),
                aspect,
                array_layer_count: Some(layers),
                ..Default::default()
            }),
            format: record.format,
            texture,
        };
        Ok(ShaderResourceView(self.shader_resource_views.insert(view)))
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerState> {
        let mut address_mode = desc.address_mode;
        if address_mode == wgpu::AddressMode::ClampToBorder && !self.clamp_to_border {
            log::warn!("'{}': clamp-to-border unsupported, clamping to edge", desc.label);
            address_mode = wgpu::AddressMode::ClampToEdge;
        }
        let border_color = if address_mode == wgpu::AddressMode::ClampToBorder {
            desc.border_color
        } else {
            None
        };

        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(desc.label),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: desc.filter,
            min_filter: desc.filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: desc.compare,
            border_color,
            ..Default::default()
        });
        self.samplers.push(sampler);
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
        if let Some(resource) = desc.layout.resources().iter().find(|r| r.slot as usize >= MAX_RESOURCE_SLOTS) {
            return Err(RenderError::invalid(
                "shader",
                format!("'{}' puts '{}' in slot {}", desc.label, resource.name, resource.slot),
            ));
        }

        let module = self.validated("shader", |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(desc.source.into()),
            })
        })?;
        let bind_group_layout = self.bind_group_layout(desc.label, desc.stage, desc.layout)?;

        self.shaders.push(GpuShader {
            label: desc.label.to_owned(),
            stage: desc.stage,
            module,
            entry_point: desc.entry_point.to_owned(),
            layout: desc.layout.clone(),
            bind_group_layout,
        });
        Ok(ShaderHandle(self.shaders.len() as u32 - 1))
    }

    fn release_texture(&mut self, texture: TextureHandle) -> Result<()> {
        let record = self.textures.remove(texture.0).ok_or(RenderError::InvalidHandle {
            kind: "texture",
            id: texture.0,
        })?;

        let colors = self
            .render_target_views
            .remove_where(|v| v.as_ref().is_some_and(|v| v.texture == texture));
        if self.bound.color.is_some_and(|view| colors.contains(&view.0)) {
            self.bound.color = None;
        }
        let depths = self.depth_stencil_views.remove_where(|v| v.texture == texture);
        if self.bound.depth.is_some_and(|view| depths.contains(&view.0)) {
            self.bound.depth = None;
        }
        let reads = self.shader_resource_views.remove_where(|v| v.texture == texture);
        for bound in self.bound.resources.iter_mut().flatten() {
            if bound.is_some_and(|view| reads.contains(&view.0)) {
                *bound = None;
            }
        }
        self.frame.color_clears.retain(|(view, _)| !colors.contains(&view.0));
        self.frame.depth_clears.retain(|(view, _)| !depths.contains(&view.0));

        log::trace!(
            "released {}x{} {:?} texture {}",
            record.width,
            record.height,
            record.format,
            texture.0
        );
        // wgpu keeps the memory alive until submitted work using it finishes
        drop(record);
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<()> {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        Ok(())
    }
}

impl GraphicsContext for WgpuDevice {
    fn clear_render_target(&mut self, view: RenderTargetView, color: [f32; 4]) {
        self.frame.color_clears.retain(|(v, _)| *v != view);
        self.frame.color_clears.push((view, color));
        if self.bound.color == Some(view) {
            self.frame.pass_open = false;
        }
    }

    fn clear_depth(&mut self, view: DepthStencilView, depth: f32) {
        self.frame.depth_clears.retain(|(v, _)| *v != view);
        self.frame.depth_clears.push((view, depth));
        if self.bound.depth == Some(view) {
            self.frame.pass_open = false;
        }
    }

    fn set_render_targets(&mut self, color: Option<RenderTargetView>, depth: Option<DepthStencilView>) {
        if self.bound.color != color || self.bound.depth != depth {
            self.frame.pass_open = false;
        }
        self.bound.color = color;
        self.bound.depth = depth;
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.bound.viewport = Some(viewport);
    }

    fn set_rasterizer_state(&mut self, state: Option<RasterizerState>) {
        self.bound.rasterizer = state;
    }

    fn set_depth_stencil_state(&mut self, state: Option<DepthStencilState>) {
        self.bound.depth_state = state;
    }

    fn set_shader(&mut self, stage: ShaderStage, shader: Option<ShaderHandle>) {
        if let Some(record) = shader.and_then(|s| self.shaders.get(s.0 as usize)) {
            if record.stage != stage {
                log::warn!("'{}' is a {:?} shader bound to the {:?} stage", record.label, record.stage, stage);
            }
        }
        self.bound.shaders[stage.index()] = shader;
    }

    fn set_constant_buffer(&mut self, stage: ShaderStage, slot: u32, buffer: Option<BufferHandle>) {
        if slot != 0 {
            log::warn!("only constant buffer slot 0 is used, ignoring slot {}", slot);
            return;
        }
        self.bound.constant_buffers[stage.index()] = buffer;
    }

    fn set_shader_resource(&mut self, stage: ShaderStage, slot: u32, view: Option<ShaderResourceView>) {
        match self.bound.resources[stage.index()].get_mut(slot as usize) {
            Some(bound) => *bound = view,
            None => log::warn!("shader resource slot {} out of range", slot),
        }
    }

    fn set_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: Option<SamplerState>) {
        match self.bound.samplers[stage.index()].get_mut(slot as usize) {
            Some(bound) => *bound = sampler,
            None => log::warn!("sampler slot {} out of range", slot),
        }
    }

    fn unbind_shader_resources(&mut self, stage: ShaderStage) {
        self.bound.resources[stage.index()] = [None; MAX_RESOURCE_SLOTS];
    }

    fn write_buffer_discard(&mut self, buffer: BufferHandle, data: &[u8]) -> Result<()> {
        let record = self
            .buffers
            .get_mut(buffer.0 as usize)
            .ok_or(RenderError::InvalidHandle { kind: "buffer", id: buffer.0 })?;
        if data.len() as u64 > record.size {
            return Err(RenderError::BufferOverflow {
                size: record.size,
                len: data.len() as u64,
            });
        }

        match &mut record.storage {
            BufferStorage::Staged(staged) => {
                staged.fill(0);
                staged[..data.len()].copy_from_slice(data);
            }
            BufferStorage::Gpu(gpu) => {
                let mut padded = data.to_vec();
                padded.resize(record.size as usize, 0);
                self.queue.write_buffer(gpu, 0, &padded);
            }
        }
        Ok(())
    }

    fn set_vertex_buffer(&mut self, buffer: BufferHandle, stride: u32) {
        self.bound.vertex_buffer = Some((buffer, stride));
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle) {
        self.bound.index_buffer = Some(buffer);
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) -> Result<()> {
        let vertex = self.bound.shaders[ShaderStage::Vertex.index()]
            .ok_or_else(|| RenderError::invalid("draw", "no vertex shader bound"))?;
        let pixel = self.bound.shaders[ShaderStage::Pixel.index()];
        let (vertex_buffer, stride) = self
            .bound
            .vertex_buffer
            .ok_or_else(|| RenderError::invalid("draw", "no vertex buffer bound"))?;
        if stride != Vertex::STRIDE {
            return Err(RenderError::invalid("draw", format!("vertex stride {} is not {}", stride, Vertex::STRIDE)));
        }
        let index_buffer = self
            .bound
            .index_buffer
            .ok_or_else(|| RenderError::invalid("draw", "no index buffer bound"))?;
        let end = first_index.checked_add(index_count).ok_or_else(|| {
            RenderError::invalid("draw", format!("{index_count} indices from {first_index} overflow the index range"))
        })?;
        let available = self.buffers.get(index_buffer.0 as usize).map_or(0, |b| b.size / 4);
        if u64::from(end) > available {
            return Err(RenderError::invalid(
                "draw",
                format!("{} indices from {} exceed the {} in the index buffer", index_count, first_index, available),
            ));
        }
        if self.bound.color.is_none() && self.bound.depth.is_none() {
            return Err(RenderError::invalid("draw", "no render target bound"));
        }

        let key = PipelineKey {
            vertex,
            pixel,
            rasterizer: self.bound.rasterizer,
            depth_state: self.bound.depth_state,
            color_format: self.bound.color.map(|v| self.color_format(v)).transpose()?,
            depth_format: self.bound.depth.map(|v| self.depth_format(v)).transpose()?,
        };
        self.ensure_pipeline(key)?;

        let mut stages = vec![self.stage_binding(ShaderStage::Vertex, vertex)?];
        if let Some(pixel) = pixel {
            stages.push(self.stage_binding(ShaderStage::Pixel, pixel)?);
        }

        if !self.frame.pass_open {
            let color_clear = self.frame.take_color_clear(self.bound.color);
            let depth_clear = self.frame.take_depth_clear(self.bound.depth);
            self.frame.passes.push(RecordedPass {
                color: self.bound.color,
                depth: self.bound.depth,
                color_clear,
                depth_clear,
                draws: Vec::new(),
            });
            self.frame.pass_open = true;
        }

        let draw = RecordedDraw {
            pipeline: key,
            viewport: self.bound.viewport,
            vertex_buffer,
            index_buffer,
            index_count,
            first_index,
            base_vertex,
            stages,
        };
        if let Some(pass) = self.frame.passes.last_mut() {
            pass.draws.push(draw);
        }
        Ok(())
    }

    /// Runs immediately on the queue. Meant for setup, before any frame is
    /// recorded.
    fn copy_texture_to_slice(&mut self, source: TextureHandle, destination: TextureHandle, slice: u32) -> Result<()> {
        let src = self.texture(source)?;
        let dst = self.texture(destination)?;
        if slice >= dst.texture.depth_or_array_layers() {
            return Err(RenderError::invalid(
                "texture copy",
                format!("slice {} of a {}-layer texture", slice, dst.texture.depth_or_array_layers()),
            ));
        }
        if src.format != dst.format {
            return Err(RenderError::invalid(
                "texture copy",
                format!("{:?} cannot be copied into {:?}", src.format, dst.format),
            ));
        }
        if (src.width, src.height) != (dst.width, dst.height) {
            log::warn!(
                "copying {}x{} into a {}x{} slice; only the overlap is copied",
                src.width,
                src.height,
                dst.width,
                dst.height
            );
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("texture_copy"),
        });
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &src.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &dst.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: slice },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: src.width.min(dst.width),
                height: src.height.min(dst.height),
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn present(&mut self, vsync: bool) -> Result<()> {
        self.set_present_mode(vsync);

        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost or outdated, reconfiguring and dropping the frame");
                self.surface.configure(&self.device, &self.config);
                self.end_frame();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("timed out acquiring the next frame");
                self.end_frame();
                return Ok(());
            }
            Err(err) => {
                self.end_frame();
                return Err(RenderError::Present(err.to_string()));
            }
        };
        let back_buffer = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.flush_pending_clears();
        self.ring.upload(&self.device, &self.queue);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame"),
        });
        let encoded = self.encode_frame(&mut encoder, &back_buffer);
        self.end_frame();
        encoded?;

        self.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
        Ok(())
    }

    fn discard_frame(&mut self) {
        log::debug!(
            "discarding {} recorded passes and {} uniform bytes",
            self.frame.passes.len(),
            self.ring.data.len()
        );
        self.end_frame();
    }
}
