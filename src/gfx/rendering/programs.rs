//! The renderer's built-in shader programs and the parameters they declare.

use std::sync::Arc;

use crate::error::Result;
use crate::gfx::device::{GraphicsDevice, ShaderStage};
use crate::gfx::lights::{Light, SceneLighting};
use crate::gfx::shader::{ParameterLayout, ShaderProgram};

const LIT_SHADER: &str = include_str!("lit.wgsl");
const SHADOW_SHADER: &str = include_str!("shadow_pass.wgsl");
const SKY_SHADER: &str = include_str!("sky.wgsl");

pub fn lit_vertex_layout() -> ParameterLayout {
    ParameterLayout::new()
        .with_matrix4("world")
        .with_matrix4("worldInverseTranspose")
        .with_matrix4("view")
        .with_matrix4("projection")
        .with_matrix4("lightView")
        .with_matrix4("lightProjection")
}

pub fn lit_pixel_layout() -> ParameterLayout {
    let mut layout = ParameterLayout::new()
        .with_float4("colorTint")
        .with_float3(SceneLighting::AMBIENT)
        .with_float("roughness")
        .with_float2("uvScale")
        .with_float3("cameraPosition");
    for name in SceneLighting::DIRECTIONAL_SLOTS.into_iter().chain(SceneLighting::POINT_SLOTS) {
        layout = layout.with_struct(name, Light::SIZE);
    }
    layout
        .with_texture("SurfaceTexture", 0)
        .with_depth_texture("ShadowMap", 1)
        .with_sampler("BasicSampler", 0)
        .with_comparison_sampler("ShadowSampler", 1)
}

pub fn shadow_vertex_layout() -> ParameterLayout {
    ParameterLayout::new()
        .with_matrix4("world")
        .with_matrix4("lightView")
        .with_matrix4("lightProjection")
}

pub fn sky_vertex_layout() -> ParameterLayout {
    ParameterLayout::new()
        .with_matrix4("view")
        .with_matrix4("projection")
        .with_float("totalTime")
}

pub fn sky_pixel_layout() -> ParameterLayout {
    ParameterLayout::new()
        .with_cube_texture("SkyTexture", 0)
        .with_cube_texture("SkyTextureNight", 1)
        .with_sampler("BasicSampler", 0)
}

/// Compiled programs shared by materials, the shadow pass and the sky.
#[derive(Debug, Clone)]
pub struct Programs {
    pub lit_vertex: Arc<ShaderProgram>,
    pub lit_pixel: Arc<ShaderProgram>,
    /// Position-only program for the depth pass.
    pub shadow_vertex: Arc<ShaderProgram>,
    pub sky_vertex: Arc<ShaderProgram>,
    pub sky_pixel: Arc<ShaderProgram>,
}

impl Programs {
    pub fn new(device: &mut dyn GraphicsDevice) -> Result<Self> {
        Ok(Self {
            lit_vertex: ShaderProgram::new(
                device,
                "lit_vs",
                ShaderStage::Vertex,
                LIT_SHADER,
                "vs_main",
                lit_vertex_layout(),
            )?,
            lit_pixel: ShaderProgram::new(
                device,
                "lit_ps",
                ShaderStage::Pixel,
                LIT_SHADER,
                "fs_main",
                lit_pixel_layout(),
            )?,
            shadow_vertex: ShaderProgram::new(
                device,
                "shadow_vs",
                ShaderStage::Vertex,
                SHADOW_SHADER,
                "vs_main",
                shadow_vertex_layout(),
            )?,
            sky_vertex: ShaderProgram::new(
                device,
                "sky_vs",
                ShaderStage::Vertex,
                SKY_SHADER,
                "vs_main",
                sky_vertex_layout(),
            )?,
            sky_pixel: ShaderProgram::new(
                device,
                "sky_ps",
                ShaderStage::Pixel,
                SKY_SHADER,
                "fs_main",
                sky_pixel_layout(),
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::RecordingDevice;

    // Offsets must match the WGSL structs in lit.wgsl and sky.wgsl
    #[test]
    fn test_lit_pixel_offsets_match_wgsl() {
        let layout = lit_pixel_layout();
        let offset = |name: &str| layout.field(name).unwrap().offset;
        assert_eq!(offset("colorTint"), 0);
        assert_eq!(offset("ambientColor"), 16);
        assert_eq!(offset("roughness"), 28);
        assert_eq!(offset("uvScale"), 32);
        assert_eq!(offset("cameraPosition"), 48);
        assert_eq!(offset("directionalLight1"), 64);
        assert_eq!(offset("directionalLight3"), 192);
        assert_eq!(offset("pointLight2"), 320);
        assert_eq!(layout.size(), 384);
    }

    #[test]
    fn test_sky_vertex_size() {
        let layout = sky_vertex_layout();
        assert_eq!(layout.field("totalTime").unwrap().offset, 128);
        assert_eq!(layout.size(), 144);
        assert_eq!(sky_pixel_layout().size(), 0);
    }

    #[test]
    fn test_programs_build() {
        let mut device = RecordingDevice::new(8, 8);
        let programs = Programs::new(&mut device).unwrap();
        assert_eq!(programs.lit_pixel.stage(), ShaderStage::Pixel);
        assert!(programs.shadow_vertex.constant_buffer().is_some());
        assert!(programs.sky_pixel.constant_buffer().is_none());
        assert_eq!(device.shader_label(programs.sky_vertex.shader()), Some("sky_vs"));
    }
}
