//! Name-keyed shader parameters.
//!
//! A `ParameterLayout` describes what one shader program declares: uniform
//! fields packed into a single constant buffer with WGSL uniform alignment,
//! plus named texture and sampler slots. `ParameterBlock` stages values for
//! one draw and uploads them in a single write-discard on `commit`.

use std::collections::BTreeMap;
use std::sync::Arc;

use cgmath::{Matrix4, Vector2, Vector3, Vector4};

use crate::error::Result;
use crate::gfx::device::{
    BufferDesc, BufferHandle, BufferUsage, GraphicsContext, GraphicsDevice, SamplerState, ShaderDesc,
    ShaderHandle, ShaderResourceView, ShaderStage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Float,
    Float2,
    Float3,
    Float4,
    Int,
    Matrix4,
    /// Opaque struct of `size` bytes, 16-byte aligned.
    Struct { size: u32 },
}

impl ParameterKind {
    pub fn size(self) -> u32 {
        match self {
            ParameterKind::Float | ParameterKind::Int => 4,
            ParameterKind::Float2 => 8,
            ParameterKind::Float3 => 12,
            ParameterKind::Float4 => 16,
            ParameterKind::Matrix4 => 64,
            ParameterKind::Struct { size } => align_up(size, 16),
        }
    }

    pub fn align(self) -> u32 {
        match self {
            ParameterKind::Float | ParameterKind::Int => 4,
            ParameterKind::Float2 => 8,
            ParameterKind::Float3 | ParameterKind::Float4 | ParameterKind::Matrix4 => 16,
            ParameterKind::Struct { .. } => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Texture2d,
    TextureCube,
    /// Depth texture read through a comparison sampler.
    DepthTexture2d,
    Sampler,
    ComparisonSampler,
}

impl ResourceKind {
    pub fn is_sampler(self) -> bool {
        matches!(self, ResourceKind::Sampler | ResourceKind::ComparisonSampler)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterField {
    pub name: String,
    pub kind: ParameterKind,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSlot {
    pub name: String,
    pub kind: ResourceKind,
    pub slot: u32,
}

/// What a shader program declares, by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterLayout {
    fields: Vec<ParameterField>,
    resources: Vec<ResourceSlot>,
    cursor: u32,
}

impl ParameterLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_float(self, name: &str) -> Self {
        self.with_field(name, ParameterKind::Float)
    }

    pub fn with_float2(self, name: &str) -> Self {
        self.with_field(name, ParameterKind::Float2)
    }

    pub fn with_float3(self, name: &str) -> Self {
        self.with_field(name, ParameterKind::Float3)
    }

    pub fn with_float4(self, name: &str) -> Self {
        self.with_field(name, ParameterKind::Float4)
    }

    pub fn with_int(self, name: &str) -> Self {
        self.with_field(name, ParameterKind::Int)
    }

    pub fn with_matrix4(self, name: &str) -> Self {
        self.with_field(name, ParameterKind::Matrix4)
    }

    pub fn with_struct(self, name: &str, size: u32) -> Self {
        self.with_field(name, ParameterKind::Struct { size })
    }

    /// Appends a field at the next offset its alignment allows.
    pub fn with_field(mut self, name: &str, kind: ParameterKind) -> Self {
        let offset = align_up(self.cursor, kind.align());
        self.cursor = offset + kind.size();
        self.fields.push(ParameterField {
            name: name.to_owned(),
            kind,
            offset,
        });
        self
    }

    pub fn with_texture(self, name: &str, slot: u32) -> Self {
        self.with_resource(name, ResourceKind::Texture2d, slot)
    }

    pub fn with_cube_texture(self, name: &str, slot: u32) -> Self {
        self.with_resource(name, ResourceKind::TextureCube, slot)
    }

    pub fn with_depth_texture(self, name: &str, slot: u32) -> Self {
        self.with_resource(name, ResourceKind::DepthTexture2d, slot)
    }

    pub fn with_sampler(self, name: &str, slot: u32) -> Self {
        self.with_resource(name, ResourceKind::Sampler, slot)
    }

    pub fn with_comparison_sampler(self, name: &str, slot: u32) -> Self {
        self.with_resource(name, ResourceKind::ComparisonSampler, slot)
    }

    pub fn with_resource(mut self, name: &str, kind: ResourceKind, slot: u32) -> Self {
        self.resources.push(ResourceSlot {
            name: name.to_owned(),
            kind,
            slot,
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&ParameterField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceSlot> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn fields(&self) -> &[ParameterField] {
        &self.fields
    }

    pub fn resources(&self) -> &[ResourceSlot] {
        &self.resources
    }

    /// Constant buffer size, rounded up to 16 bytes. Zero when there are no fields.
    pub fn size(&self) -> u32 {
        align_up(self.cursor, 16)
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

/// Typed, name-keyed parameter writes.
///
/// Every setter returns whether the name matched something the program
/// declares. Unmatched names are ignored.
pub trait ShaderParameterSink {
    /// Copies raw bytes into the named field. Fails when the data is larger
    /// than the field.
    fn set_data(&mut self, name: &str, data: &[u8]) -> bool;

    fn set_shader_resource_view(&mut self, name: &str, view: ShaderResourceView) -> bool;

    fn set_sampler_state(&mut self, name: &str, sampler: SamplerState) -> bool;

    fn set_float(&mut self, name: &str, value: f32) -> bool {
        self.set_data(name, bytemuck::bytes_of(&value))
    }

    fn set_float2(&mut self, name: &str, value: Vector2<f32>) -> bool {
        let value: [f32; 2] = value.into();
        self.set_data(name, bytemuck::bytes_of(&value))
    }

    fn set_float3(&mut self, name: &str, value: Vector3<f32>) -> bool {
        let value: [f32; 3] = value.into();
        self.set_data(name, bytemuck::bytes_of(&value))
    }

    fn set_float4(&mut self, name: &str, value: Vector4<f32>) -> bool {
        let value: [f32; 4] = value.into();
        self.set_data(name, bytemuck::bytes_of(&value))
    }

    fn set_int(&mut self, name: &str, value: i32) -> bool {
        self.set_data(name, bytemuck::bytes_of(&value))
    }

    fn set_matrix4x4(&mut self, name: &str, value: &Matrix4<f32>) -> bool {
        let value: [[f32; 4]; 4] = (*value).into();
        self.set_data(name, bytemuck::bytes_of(&value))
    }
}

/// A compiled shader with its declared parameters and constant buffer.
///
/// Programs are immutable and shared between materials through `Arc`.
#[derive(Debug)]
pub struct ShaderProgram {
    label: String,
    stage: ShaderStage,
    shader: ShaderHandle,
    constant_buffer: Option<BufferHandle>,
    layout: ParameterLayout,
}

impl ShaderProgram {
    pub fn new(
        device: &mut dyn GraphicsDevice,
        label: &str,
        stage: ShaderStage,
        source: &str,
        entry_point: &str,
        layout: ParameterLayout,
    ) -> Result<Arc<Self>> {
        let shader = device.create_shader(&ShaderDesc {
            label,
            stage,
            source,
            entry_point,
            layout: &layout,
        })?;

        let constant_buffer = match layout.size() {
            0 => None,
            size => Some(device.create_buffer(
                &BufferDesc {
                    label,
                    usage: BufferUsage::Constant,
                    size: size as u64,
                },
                None,
            )?),
        };

        log::debug!(
            "created {:?} program '{}' ({} bytes of parameters, {} resources)",
            stage,
            label,
            layout.size(),
            layout.resources().len()
        );

        Ok(Arc::new(Self {
            label: label.to_owned(),
            stage,
            shader,
            constant_buffer,
            layout,
        }))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn shader(&self) -> ShaderHandle {
        self.shader
    }

    pub fn constant_buffer(&self) -> Option<BufferHandle> {
        self.constant_buffer
    }

    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }
}

/// Staged parameter values for one draw with one program.
#[derive(Debug, Clone)]
pub struct ParameterBlock {
    program: Arc<ShaderProgram>,
    data: Vec<u8>,
    resources: BTreeMap<u32, ShaderResourceView>,
    samplers: BTreeMap<u32, SamplerState>,
}

impl ParameterBlock {
    pub fn new(program: Arc<ShaderProgram>) -> Self {
        let size = program.layout.size() as usize;
        Self {
            program,
            data: vec![0; size],
            resources: BTreeMap::new(),
            samplers: BTreeMap::new(),
        }
    }

    pub fn program(&self) -> &Arc<ShaderProgram> {
        &self.program
    }

    /// Staged constant buffer bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Binds the program and its constant buffer on the program's stage.
    pub fn activate(&self, ctx: &mut dyn GraphicsContext) {
        let stage = self.program.stage;
        ctx.set_shader(stage, Some(self.program.shader));
        if let Some(buffer) = self.program.constant_buffer {
            ctx.set_constant_buffer(stage, 0, Some(buffer));
        }
    }

    /// Uploads the staged values in one write-discard and binds the staged
    /// textures and samplers.
    pub fn commit(&self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        let stage = self.program.stage;
        if let Some(buffer) = self.program.constant_buffer {
            ctx.write_buffer_discard(buffer, &self.data)?;
        }
        for (&slot, &view) in &self.resources {
            ctx.set_shader_resource(stage, slot, Some(view));
        }
        for (&slot, &sampler) in &self.samplers {
            ctx.set_sampler(stage, slot, Some(sampler));
        }
        Ok(())
    }
}

impl ShaderParameterSink for ParameterBlock {
    fn set_data(&mut self, name: &str, data: &[u8]) -> bool {
        let Some(field) = self.program.layout.field(name) else {
            log::trace!("'{}' declares no parameter '{}'", self.program.label, name);
            return false;
        };
        if data.len() > field.kind.size() as usize {
            log::warn!(
                "'{}': {} bytes do not fit parameter '{}' ({:?})",
                self.program.label,
                data.len(),
                name,
                field.kind
            );
            return false;
        }

        let start = field.offset as usize;
        self.data[start..start + data.len()].copy_from_slice(data);
        true
    }

    fn set_shader_resource_view(&mut self, name: &str, view: ShaderResourceView) -> bool {
        match self.program.layout.resource(name) {
            Some(slot) if !slot.kind.is_sampler() => {
                self.resources.insert(slot.slot, view);
                true
            }
            _ => {
                log::trace!("'{}' declares no texture '{}'", self.program.label, name);
                false
            }
        }
    }

    fn set_sampler_state(&mut self, name: &str, sampler: SamplerState) -> bool {
        match self.program.layout.resource(name) {
            Some(slot) if slot.kind.is_sampler() => {
                self.samplers.insert(slot.slot, sampler);
                true
            }
            _ => {
                log::trace!("'{}' declares no sampler '{}'", self.program.label, name);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::recording::{Command, RecordingDevice};

    fn lit_layout() -> ParameterLayout {
        ParameterLayout::new()
            .with_matrix4("world")
            .with_float3("cameraPosition")
            .with_float("roughness")
            .with_float2("uvScale")
            .with_float4("colorTint")
            .with_texture("SurfaceTexture", 0)
            .with_sampler("BasicSampler", 0)
    }

    #[test]
    fn test_layout_follows_uniform_alignment() {
        let layout = lit_layout();
        assert_eq!(layout.field("world").map(|f| f.offset), Some(0));
        assert_eq!(layout.field("cameraPosition").map(|f| f.offset), Some(64));
        // A float packs into the tail of a vec3
        assert_eq!(layout.field("roughness").map(|f| f.offset), Some(76));
        assert_eq!(layout.field("uvScale").map(|f| f.offset), Some(80));
        assert_eq!(layout.field("colorTint").map(|f| f.offset), Some(96));
        assert_eq!(layout.size(), 112);
    }

    #[test]
    fn test_struct_fields_are_16_aligned() {
        let layout = ParameterLayout::new().with_int("count").with_struct("light", 64);
        assert_eq!(layout.field("light").map(|f| f.offset), Some(16));
        assert_eq!(layout.size(), 80);
    }

    #[test]
    fn test_empty_layout_has_no_constant_buffer() {
        let mut device = RecordingDevice::new(64, 64);
        let program = ShaderProgram::new(
            &mut device,
            "empty",
            ShaderStage::Pixel,
            "",
            "main",
            ParameterLayout::new(),
        )
        .unwrap();
        assert!(program.constant_buffer().is_none());
    }

    #[test]
    fn test_setters_write_at_field_offsets() {
        let mut device = RecordingDevice::new(64, 64);
        let program = ShaderProgram::new(&mut device, "lit", ShaderStage::Pixel, "", "main", lit_layout()).unwrap();
        let mut block = ParameterBlock::new(program);

        assert!(block.set_float("roughness", 0.5));
        assert!(block.set_float2("uvScale", Vector2::new(2.0, 3.0)));

        let bytes = block.bytes();
        assert_eq!(&bytes[76..80], bytemuck::bytes_of(&0.5f32));
        assert_eq!(&bytes[80..88], bytemuck::cast_slice::<f32, u8>(&[2.0, 3.0]));
    }

    #[test]
    fn test_unmatched_names_are_ignored() {
        let mut device = RecordingDevice::new(64, 64);
        let program = ShaderProgram::new(&mut device, "lit", ShaderStage::Pixel, "", "main", lit_layout()).unwrap();
        let mut block = ParameterBlock::new(program);
        let before = block.bytes().to_vec();

        assert!(!block.set_float("metalness", 1.0));
        assert!(!block.set_matrix4x4("view", &Matrix4::from_scale(2.0)));
        // Too large for the field
        assert!(!block.set_float4("roughness", Vector4::new(1.0, 1.0, 1.0, 1.0)));
        assert_eq!(block.bytes(), before.as_slice());

        let srv = ShaderResourceView(7);
        assert!(!block.set_shader_resource_view("NormalMap", srv));
        // A sampler name does not accept a texture
        assert!(!block.set_shader_resource_view("BasicSampler", srv));
    }

    #[test]
    fn test_commit_is_one_write_discard() {
        let mut device = RecordingDevice::new(64, 64);
        let program = ShaderProgram::new(&mut device, "lit", ShaderStage::Pixel, "", "main", lit_layout()).unwrap();
        let buffer = program.constant_buffer().unwrap();
        let mut block = ParameterBlock::new(program);
        block.set_float("roughness", 0.25);
        block.set_float4("colorTint", Vector4::new(1.0, 0.0, 0.0, 1.0));
        block.set_shader_resource_view("SurfaceTexture", ShaderResourceView(3));

        device.clear_log();
        block.activate(&mut device);
        block.commit(&mut device).unwrap();

        let writes: Vec<_> = device
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::WriteBuffer { .. }))
            .collect();
        assert_eq!(writes.len(), 1);
        assert_eq!(device.buffer_contents(buffer), Some(block.bytes()));
        assert!(device.commands().contains(&Command::SetShaderResource {
            stage: ShaderStage::Pixel,
            slot: 0,
            view: Some(ShaderResourceView(3)),
        }));
    }
}
