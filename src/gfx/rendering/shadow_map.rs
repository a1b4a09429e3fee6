//! Directional shadow mapping.
//!
//! One square depth texture is written from the sun's point of view and then
//! read by the main pass through a comparison sampler. The write view and the
//! read view share the texture, so the pass is a small state machine that
//! never has both bound at once:
//!
//! ```text
//! Idle --begin_depth_pass--> DepthPass --begin_sampling--> Sampling --end_frame--> Idle
//! ```

use std::fmt;
use std::sync::Arc;

use cgmath::{InnerSpace, Matrix4, Point3, SquareMatrix, Vector3};

use crate::config::ShadowConfig;
use crate::error::{RenderError, Result};
use crate::gfx::device::{
    GraphicsContext, GraphicsDevice, RasterizerDesc, RasterizerState, SamplerDesc, SamplerState,
    ShaderResourceView, ShaderStage, Viewport,
};
use crate::gfx::math::{look_to_lh, orthographic_lh};
use crate::gfx::resources::DepthTarget;
use crate::gfx::scene::Entity;
use crate::gfx::shader::{ParameterBlock, ShaderParameterSink, ShaderProgram};

use super::RenderTargets;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowPassState {
    /// Nothing bound; the start and end of every frame.
    Idle,
    /// The depth view is the render target.
    DepthPass,
    /// The read view may be bound to the pixel stage.
    Sampling,
}

impl ShadowPassState {
    pub fn name(self) -> &'static str {
        match self {
            ShadowPassState::Idle => "Idle",
            ShadowPassState::DepthPass => "DepthPass",
            ShadowPassState::Sampling => "Sampling",
        }
    }
}

impl fmt::Display for ShadowPassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub struct ShadowMap {
    state: ShadowPassState,
    target: DepthTarget,
    read_view: ShaderResourceView,
    sampler: SamplerState,
    rasterizer: RasterizerState,
    program: Arc<ShaderProgram>,
    light_view: Matrix4<f32>,
    light_projection: Matrix4<f32>,
    light_distance: f32,
}

impl ShadowMap {
    pub const SHADOW_MAP: &'static str = "ShadowMap";
    pub const SHADOW_SAMPLER: &'static str = "ShadowSampler";

    /// Allocates the depth texture, both of its views, the biased rasterizer
    /// state and the border-clamped comparison sampler.
    ///
    /// `program` is the position-only vertex program used for the depth pass.
    pub fn new(device: &mut dyn GraphicsDevice, config: &ShadowConfig, program: Arc<ShaderProgram>) -> Result<Self> {
        if config.resolution == 0 {
            return Err(RenderError::invalid("shadow map", "resolution must be non-zero"));
        }
        if program.stage() != ShaderStage::Vertex {
            return Err(RenderError::invalid("shadow map", "depth pass needs a vertex program"));
        }

        let target = DepthTarget::new(device, "shadow_map", config.resolution, config.resolution, true)?;
        let read_view = target
            .read_view
            .ok_or_else(|| RenderError::invalid("shadow map", "depth target has no read view"))?;

        let rasterizer = device.create_rasterizer_state(&RasterizerDesc {
            depth_bias: config.depth_bias,
            slope_scaled_depth_bias: config.slope_scaled_depth_bias,
            depth_bias_clamp: config.depth_bias_clamp,
            ..RasterizerDesc::default()
        })?;

        // Anything outside the light volume reads as fully lit
        let sampler = device.create_sampler(&SamplerDesc {
            label: "shadow_sampler",
            address_mode: wgpu::AddressMode::ClampToBorder,
            filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            border_color: Some(wgpu::SamplerBorderColor::OpaqueWhite),
        })?;

        log::info!(
            "shadow map: {0}x{0}, {1} unit light volume",
            config.resolution,
            config.extent
        );

        let mut shadow_map = Self {
            state: ShadowPassState::Idle,
            target,
            read_view,
            sampler,
            rasterizer,
            program,
            light_view: Matrix4::identity(),
            light_projection: orthographic_lh(config.extent, config.extent, config.near, config.far),
            light_distance: config.light_distance,
        };
        shadow_map.aim(Vector3::new(0.0, -1.0, 1.0), Point3::new(0.0, 0.0, 0.0));
        Ok(shadow_map)
    }

    pub fn state(&self) -> ShadowPassState {
        self.state
    }

    pub fn resolution(&self) -> u32 {
        self.target.width
    }

    pub fn depth_target(&self) -> &DepthTarget {
        &self.target
    }

    pub fn read_view(&self) -> ShaderResourceView {
        self.read_view
    }

    pub fn sampler(&self) -> SamplerState {
        self.sampler
    }

    pub fn rasterizer(&self) -> RasterizerState {
        self.rasterizer
    }

    pub fn light_view(&self) -> Matrix4<f32> {
        self.light_view
    }

    pub fn light_projection(&self) -> Matrix4<f32> {
        self.light_projection
    }

    /// Points the light volume along `direction` at `focus`.
    ///
    /// Meant to run once per frame before `begin_depth_pass`. A zero
    /// direction keeps the previous view.
    pub fn aim(&mut self, direction: Vector3<f32>, focus: Point3<f32>) {
        if direction.magnitude2() <= f32::EPSILON {
            log::warn!("ignoring zero light direction");
            return;
        }
        let direction = direction.normalize();
        let up = if direction.y.abs() > 0.99 {
            Vector3::unit_z()
        } else {
            Vector3::unit_y()
        };
        let eye = focus - direction * self.light_distance;
        self.light_view = look_to_lh(eye, direction, up);
    }

    pub fn set_light_view(&mut self, view: Matrix4<f32>) {
        self.light_view = view;
    }

    fn transition(&mut self, from: ShadowPassState, to: ShadowPassState) -> Result<()> {
        if self.state != from {
            return Err(RenderError::InvalidPassTransition {
                from: self.state.name(),
                to: to.name(),
            });
        }
        self.state = to;
        Ok(())
    }

    /// Idle -> DepthPass. Binds the depth view as the only target, clears
    /// it, and switches to the biased rasterizer with no pixel stage.
    pub fn begin_depth_pass(&mut self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        self.transition(ShadowPassState::Idle, ShadowPassState::DepthPass)?;

        // Last frame's read view must be gone before the texture is a target
        ctx.unbind_shader_resources(ShaderStage::Pixel);
        ctx.set_render_targets(None, Some(self.target.depth_view));
        ctx.clear_depth(self.target.depth_view, 1.0);
        ctx.set_viewport(Viewport::full(self.target.width, self.target.height));
        ctx.set_rasterizer_state(Some(self.rasterizer));
        ctx.set_depth_stencil_state(None);
        ctx.set_shader(ShaderStage::Pixel, None);
        Ok(())
    }

    /// Draws every entity into the depth texture. Only valid in DepthPass.
    pub fn render_casters(&self, ctx: &mut dyn GraphicsContext, entities: &[Entity]) -> Result<()> {
        if self.state != ShadowPassState::DepthPass {
            return Err(RenderError::InvalidPassTransition {
                from: self.state.name(),
                to: ShadowPassState::DepthPass.name(),
            });
        }

        let mut block = ParameterBlock::new(self.program.clone());
        block.activate(ctx);
        for entity in entities {
            block.set_matrix4x4("world", &entity.transform.world_matrix());
            block.set_matrix4x4("lightView", &self.light_view);
            block.set_matrix4x4("lightProjection", &self.light_projection);
            block.commit(ctx)?;
            entity.mesh().draw(ctx)?;
        }
        Ok(())
    }

    /// DepthPass -> Sampling. Restores the main targets, viewport and
    /// default rasterizer.
    pub fn begin_sampling(&mut self, ctx: &mut dyn GraphicsContext, targets: &RenderTargets) -> Result<()> {
        self.transition(ShadowPassState::DepthPass, ShadowPassState::Sampling)?;
        targets.bind(ctx);
        ctx.set_rasterizer_state(None);
        Ok(())
    }

    /// Runs a whole depth pass: begin, draw every caster, switch to sampling.
    pub fn render(&mut self, ctx: &mut dyn GraphicsContext, entities: &[Entity], targets: &RenderTargets) -> Result<()> {
        self.begin_depth_pass(ctx)?;
        self.render_casters(ctx, entities)?;
        self.begin_sampling(ctx, targets)
    }

    /// Writes the light matrices for the vertex stage and the shadow texture
    /// and sampler for the pixel stage. Only valid in Sampling.
    pub fn apply(&self, vertex: &mut dyn ShaderParameterSink, pixel: &mut dyn ShaderParameterSink) -> Result<()> {
        if self.state != ShadowPassState::Sampling {
            return Err(RenderError::InvalidPassTransition {
                from: self.state.name(),
                to: ShadowPassState::Sampling.name(),
            });
        }
        vertex.set_matrix4x4("lightView", &self.light_view);
        vertex.set_matrix4x4("lightProjection", &self.light_projection);
        pixel.set_shader_resource_view(Self::SHADOW_MAP, self.read_view);
        pixel.set_sampler_state(Self::SHADOW_SAMPLER, self.sampler);
        Ok(())
    }

    /// Sampling -> Idle. Unbinds pixel-stage resources so the depth texture
    /// can be a target again next frame.
    pub fn end_frame(&mut self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        self.transition(ShadowPassState::Sampling, ShadowPassState::Idle)?;
        ctx.unbind_shader_resources(ShaderStage::Pixel);
        Ok(())
    }

    /// Drops back to Idle from any state, after a frame failed half way.
    pub fn reset(&mut self, ctx: &mut dyn GraphicsContext) {
        if self.state != ShadowPassState::Idle {
            log::warn!("resetting shadow pass from {}", self.state);
            ctx.unbind_shader_resources(ShaderStage::Pixel);
            self.state = ShadowPassState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::recording::{Command, RecordingDevice};
    use crate::gfx::rendering::Programs;

    fn shadow_map(device: &mut RecordingDevice) -> ShadowMap {
        let programs = Programs::new(device).unwrap();
        let config = ShadowConfig {
            resolution: 256,
            ..ShadowConfig::default()
        };
        ShadowMap::new(device, &config, programs.shadow_vertex).unwrap()
    }

    fn main_targets(device: &mut RecordingDevice) -> RenderTargets {
        RenderTargets::for_back_buffer(device, 64, 64).unwrap()
    }

    #[test]
    fn test_views_share_one_texture() {
        let mut device = RecordingDevice::new(64, 64);
        let shadow = shadow_map(&mut device);
        let texture = shadow.depth_target().texture;
        assert_eq!(device.depth_stencil_view_texture(shadow.depth_target().depth_view), Some(texture));
        assert_eq!(device.shader_resource_view_texture(shadow.read_view()), Some(texture));
    }

    #[test]
    fn test_sampler_and_rasterizer_setup() {
        let mut device = RecordingDevice::new(64, 64);
        let shadow = shadow_map(&mut device);

        let sampler = device.sampler_desc(shadow.sampler()).unwrap();
        assert_eq!(sampler.address_mode, wgpu::AddressMode::ClampToBorder);
        assert_eq!(sampler.border_color, Some(wgpu::SamplerBorderColor::OpaqueWhite));
        assert!(sampler.compare.is_some());

        let rasterizer = device.rasterizer_desc(shadow.rasterizer()).unwrap();
        assert_eq!(rasterizer.depth_bias, 1000);
        assert!(rasterizer.slope_scaled_depth_bias > 0.0);
    }

    #[test]
    fn test_depth_pass_binds_depth_only() {
        let mut device = RecordingDevice::new(64, 64);
        let mut shadow = shadow_map(&mut device);
        device.clear_log();

        shadow.begin_depth_pass(&mut device).unwrap();

        assert_eq!(shadow.state(), ShadowPassState::DepthPass);
        assert_eq!(device.bound_targets(), (None, Some(shadow.depth_target().depth_view)));
        assert!(device
            .commands()
            .iter()
            .any(|c| *c == Command::ClearDepth { view: shadow.depth_target().depth_view, depth: 1.0 }));
        assert!(device
            .commands()
            .iter()
            .any(|c| *c == Command::SetViewport(Viewport::full(256, 256))));
    }

    #[test]
    fn test_full_cycle_returns_to_idle_without_hazards() {
        let mut device = RecordingDevice::new(64, 64);
        let mut shadow = shadow_map(&mut device);
        let targets = main_targets(&mut device);

        for _ in 0..2 {
            shadow.render(&mut device, &[], &targets).unwrap();
            assert_eq!(device.bound_targets(), (Some(targets.color), Some(targets.depth.depth_view)));

            let mut capture = CapturingSink::default();
            let mut vertex = CapturingSink::default();
            shadow.apply(&mut vertex, &mut capture).unwrap();
            assert_eq!(capture.views, vec![(ShadowMap::SHADOW_MAP.to_owned(), shadow.read_view())]);
            assert!(vertex.names.contains(&"lightView".to_owned()));

            device.set_shader_resource(ShaderStage::Pixel, 1, Some(shadow.read_view()));
            shadow.end_frame(&mut device).unwrap();
            assert_eq!(shadow.state(), ShadowPassState::Idle);
        }
        assert!(device.hazards().is_empty());
    }

    #[test]
    fn test_out_of_order_transitions_fail() {
        let mut device = RecordingDevice::new(64, 64);
        let mut shadow = shadow_map(&mut device);
        let targets = main_targets(&mut device);

        let err = shadow.begin_sampling(&mut device, &targets).unwrap_err();
        assert!(matches!(
            err,
            RenderError::InvalidPassTransition { from: "Idle", to: "Sampling" }
        ));
        assert!(shadow.end_frame(&mut device).is_err());
        assert!(shadow.render_casters(&mut device, &[]).is_err());

        shadow.begin_depth_pass(&mut device).unwrap();
        assert!(shadow.begin_depth_pass(&mut device).is_err());
        let mut sink = CapturingSink::default();
        let mut other = CapturingSink::default();
        assert!(shadow.apply(&mut sink, &mut other).is_err());
    }

    #[test]
    fn test_aim_places_eye_against_direction() {
        let mut device = RecordingDevice::new(64, 64);
        let mut shadow = shadow_map(&mut device);
        shadow.aim(Vector3::new(0.0, -1.0, 0.0), Point3::new(0.0, 0.0, 0.0));

        // The focus point sits light_distance in front of the light
        let focus = shadow.light_view() * cgmath::Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert!((focus.z - 20.0).abs() < 1e-4);
        assert!(focus.x.abs() < 1e-4 && focus.y.abs() < 1e-4);

        let before = shadow.light_view();
        shadow.aim(Vector3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        assert_eq!(shadow.light_view(), before);
    }

    #[derive(Default)]
    struct CapturingSink {
        names: Vec<String>,
        views: Vec<(String, ShaderResourceView)>,
    }

    impl ShaderParameterSink for CapturingSink {
        fn set_data(&mut self, name: &str, _: &[u8]) -> bool {
            self.names.push(name.to_owned());
            true
        }

        fn set_shader_resource_view(&mut self, name: &str, view: ShaderResourceView) -> bool {
            self.views.push((name.to_owned(), view));
            true
        }

        fn set_sampler_state(&mut self, name: &str, _: SamplerState) -> bool {
            self.names.push(name.to_owned());
            true
        }
    }
}
