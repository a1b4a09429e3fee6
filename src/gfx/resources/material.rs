//! Materials and the material library.
//!
//! A material pairs a vertex and a pixel program with surface parameters and
//! name-keyed texture/sampler bindings. Materials are built at load time and
//! shared between entities through `Arc`; the library stores them by name.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use cgmath::{Vector2, Vector4};

use crate::error::{RenderError, Result};
use crate::gfx::device::{GraphicsContext, SamplerState, ShaderResourceView, ShaderStage};
use crate::gfx::shader::{ParameterBlock, ShaderParameterSink, ShaderProgram};

/// Material ID for referencing materials
pub type MaterialId = String;

#[derive(Debug, Clone)]
pub struct Material {
    pub name: MaterialId,
    color_tint: Vector4<f32>,
    roughness: f32,
    uv_scale: Vector2<f32>,
    vertex_program: Arc<ShaderProgram>,
    pixel_program: Arc<ShaderProgram>,
    textures: BTreeMap<String, ShaderResourceView>,
    samplers: BTreeMap<String, SamplerState>,
}

impl Material {
    /// White, half-rough material with no texture bindings.
    pub fn new(
        name: &str,
        vertex_program: Arc<ShaderProgram>,
        pixel_program: Arc<ShaderProgram>,
    ) -> Result<Self> {
        if vertex_program.stage() != ShaderStage::Vertex || pixel_program.stage() != ShaderStage::Pixel {
            return Err(RenderError::invalid(
                "material",
                format!("'{name}' needs a vertex and a pixel program"),
            ));
        }

        Ok(Self {
            name: name.to_owned(),
            color_tint: Vector4::new(1.0, 1.0, 1.0, 1.0),
            roughness: 0.5,
            uv_scale: Vector2::new(1.0, 1.0),
            vertex_program,
            pixel_program,
            textures: BTreeMap::new(),
            samplers: BTreeMap::new(),
        })
    }

    pub fn with_color_tint(mut self, r: f32, g: f32, b: f32, a: f32) -> Self {
        self.set_color_tint(Vector4::new(r, g, b, a));
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.set_roughness(roughness);
        self
    }

    pub fn with_uv_scale(mut self, u: f32, v: f32) -> Self {
        self.set_uv_scale(Vector2::new(u, v));
        self
    }

    pub fn with_texture(mut self, name: &str, view: ShaderResourceView) -> Self {
        self.add_texture(name, view);
        self
    }

    pub fn with_sampler(mut self, name: &str, sampler: SamplerState) -> Self {
        self.add_sampler(name, sampler);
        self
    }

    pub fn set_color_tint(&mut self, tint: Vector4<f32>) {
        self.color_tint = tint;
    }

    /// Clamped to [0, 1].
    pub fn set_roughness(&mut self, roughness: f32) {
        self.roughness = roughness.clamp(0.0, 1.0);
    }

    pub fn set_uv_scale(&mut self, scale: Vector2<f32>) {
        self.uv_scale = scale;
    }

    /// Binds (or rebinds) a texture under the name the pixel program declares.
    pub fn add_texture(&mut self, name: &str, view: ShaderResourceView) {
        self.textures.insert(name.to_owned(), view);
    }

    pub fn add_sampler(&mut self, name: &str, sampler: SamplerState) {
        self.samplers.insert(name.to_owned(), sampler);
    }

    pub fn color_tint(&self) -> Vector4<f32> {
        self.color_tint
    }

    pub fn roughness(&self) -> f32 {
        self.roughness
    }

    pub fn uv_scale(&self) -> Vector2<f32> {
        self.uv_scale
    }

    pub fn vertex_program(&self) -> &Arc<ShaderProgram> {
        &self.vertex_program
    }

    pub fn pixel_program(&self) -> &Arc<ShaderProgram> {
        &self.pixel_program
    }

    /// Pushes every texture and sampler binding under its logical name.
    pub fn prepare(&self, sink: &mut dyn ShaderParameterSink) {
        for (name, &view) in &self.textures {
            sink.set_shader_resource_view(name, view);
        }
        for (name, &sampler) in &self.samplers {
            sink.set_sampler_state(name, sampler);
        }
    }
}

/// Staging blocks for both programs of a material, for one draw.
#[derive(Debug, Clone)]
pub struct MaterialParameters {
    pub vertex: ParameterBlock,
    pub pixel: ParameterBlock,
}

impl MaterialParameters {
    pub fn new(material: &Material) -> Self {
        Self {
            vertex: ParameterBlock::new(material.vertex_program.clone()),
            pixel: ParameterBlock::new(material.pixel_program.clone()),
        }
    }

    pub fn activate(&self, ctx: &mut dyn GraphicsContext) {
        self.vertex.activate(ctx);
        self.pixel.activate(ctx);
    }

    pub fn commit(&self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        self.vertex.commit(ctx)?;
        self.pixel.commit(ctx)
    }
}

/// Materials by name.
#[derive(Debug, Default)]
pub struct MaterialLibrary {
    materials: HashMap<MaterialId, Arc<Material>>,
    default_material: Option<MaterialId>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a material, replacing any with the same name. The first material
    /// added becomes the default.
    pub fn add_material(&mut self, material: Material) -> Arc<Material> {
        let material = Arc::new(material);
        if self.default_material.is_none() {
            self.default_material = Some(material.name.clone());
        }
        if self
            .materials
            .insert(material.name.clone(), material.clone())
            .is_some()
        {
            log::debug!("replaced material '{}'", material.name);
        }
        material
    }

    pub fn get_material(&self, id: &str) -> Option<&Arc<Material>> {
        self.materials.get(id)
    }

    pub fn get_default_material(&self) -> Option<&Arc<Material>> {
        self.default_material.as_deref().and_then(|id| self.materials.get(id))
    }

    /// The named material, or the default when the name is unknown.
    pub fn get_material_or_default(&self, id: &str) -> Option<&Arc<Material>> {
        self.get_material(id).or_else(|| {
            log::warn!("material '{id}' not found, using default");
            self.get_default_material()
        })
    }

    pub fn set_default_material(&mut self, id: &str) -> bool {
        if self.materials.contains_key(id) {
            self.default_material = Some(id.to_owned());
            true
        } else {
            false
        }
    }

    pub fn list_materials(&self) -> Vec<&MaterialId> {
        let mut names: Vec<_> = self.materials.keys().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::RecordingDevice;
    use crate::gfx::shader::ParameterLayout;

    fn programs(device: &mut RecordingDevice) -> (Arc<ShaderProgram>, Arc<ShaderProgram>) {
        let vs = ShaderProgram::new(
            device,
            "vs",
            ShaderStage::Vertex,
            "",
            "vs_main",
            ParameterLayout::new().with_matrix4("world"),
        )
        .unwrap();
        let ps = ShaderProgram::new(
            device,
            "ps",
            ShaderStage::Pixel,
            "",
            "fs_main",
            ParameterLayout::new()
                .with_float4("colorTint")
                .with_texture("SurfaceTexture", 0)
                .with_sampler("BasicSampler", 0),
        )
        .unwrap();
        (vs, ps)
    }

    #[test]
    fn test_programs_must_match_stages() {
        let mut device = RecordingDevice::new(8, 8);
        let (vs, ps) = programs(&mut device);
        assert!(Material::new("swapped", ps, vs).is_err());
    }

    #[test]
    fn test_roughness_is_clamped() {
        let mut device = RecordingDevice::new(8, 8);
        let (vs, ps) = programs(&mut device);
        let material = Material::new("m", vs, ps).unwrap().with_roughness(3.0);
        assert_eq!(material.roughness(), 1.0);
    }

    #[test]
    fn test_prepare_binds_by_name() {
        let mut device = RecordingDevice::new(8, 8);
        let (vs, ps) = programs(&mut device);
        let material = Material::new("m", vs, ps)
            .unwrap()
            .with_texture("SurfaceTexture", ShaderResourceView(4))
            .with_texture("NormalMap", ShaderResourceView(5))
            .with_sampler("BasicSampler", SamplerState(1));

        let mut params = MaterialParameters::new(&material);
        material.prepare(&mut params.pixel);

        device.clear_log();
        params.pixel.commit(&mut device).unwrap();
        let commands = device.commands();
        // NormalMap is not declared and is dropped silently
        assert!(commands.iter().any(|c| matches!(
            c,
            crate::gfx::device::recording::Command::SetShaderResource { view: Some(ShaderResourceView(4)), .. }
        )));
        assert!(!commands.iter().any(|c| matches!(
            c,
            crate::gfx::device::recording::Command::SetShaderResource { view: Some(ShaderResourceView(5)), .. }
        )));
    }

    #[test]
    fn test_library_default_and_lookup() {
        let mut device = RecordingDevice::new(8, 8);
        let (vs, ps) = programs(&mut device);
        let mut library = MaterialLibrary::new();
        library.add_material(Material::new("stone", vs.clone(), ps.clone()).unwrap());
        library.add_material(Material::new("metal", vs, ps).unwrap());

        assert_eq!(library.len(), 2);
        assert_eq!(library.get_default_material().map(|m| m.name.as_str()), Some("stone"));
        assert_eq!(
            library.get_material_or_default("missing").map(|m| m.name.as_str()),
            Some("stone")
        );
        assert!(library.set_default_material("metal"));
        assert!(!library.set_default_material("glass"));
        assert_eq!(library.list_materials(), vec!["metal", "stone"]);
    }
}
