//! Cubemap sky drawn after the opaque geometry.
//!
//! The unit cube is seen from the inside, so front faces are culled, and the
//! vertex program pins it to the far plane, so it only shows where the depth
//! buffer still holds the clear value (`LessEqual`, no depth writes).

use std::sync::Arc;

use crate::error::Result;
use crate::gfx::camera::Camera;
use crate::gfx::device::{
    DepthStencilDesc, DepthStencilState, GraphicsContext, GraphicsDevice, RasterizerDesc, RasterizerState,
    SamplerDesc, SamplerState, ShaderResourceView,
};
use crate::gfx::geometry::generate_cube;
use crate::gfx::resources::Mesh;
use crate::gfx::shader::{ParameterBlock, ShaderParameterSink, ShaderProgram};

use super::cubemap::Cubemap;
use super::programs::Programs;

#[derive(Debug)]
pub struct Sky {
    mesh: Mesh,
    day: Cubemap,
    night: Option<Cubemap>,
    sampler: SamplerState,
    rasterizer: RasterizerState,
    depth_state: DepthStencilState,
    vertex: Arc<ShaderProgram>,
    pixel: Arc<ShaderProgram>,
}

impl Sky {
    pub fn new(device: &mut dyn GraphicsDevice, programs: &Programs, day: Cubemap, night: Option<Cubemap>) -> Result<Self> {
        let mesh = Mesh::new(device, "sky_cube", &generate_cube())?;
        let sampler = device.create_sampler(&SamplerDesc {
            label: "sky_sampler",
            address_mode: wgpu::AddressMode::ClampToEdge,
            ..SamplerDesc::default()
        })?;
        let rasterizer = device.create_rasterizer_state(&RasterizerDesc {
            cull_mode: Some(wgpu::Face::Front),
            ..RasterizerDesc::default()
        })?;
        let depth_state = device.create_depth_stencil_state(&DepthStencilDesc {
            depth_write: false,
            depth_compare: wgpu::CompareFunction::LessEqual,
        })?;

        Ok(Self {
            mesh,
            day,
            night,
            sampler,
            rasterizer,
            depth_state,
            vertex: programs.sky_vertex.clone(),
            pixel: programs.sky_pixel.clone(),
        })
    }

    pub fn day(&self) -> &Cubemap {
        &self.day
    }

    pub fn night(&self) -> Option<&Cubemap> {
        self.night.as_ref()
    }

    pub fn rasterizer(&self) -> RasterizerState {
        self.rasterizer
    }

    pub fn depth_state(&self) -> DepthStencilState {
        self.depth_state
    }

    /// Without a night cubemap the day cubemap stands in for both.
    fn night_view(&self) -> ShaderResourceView {
        self.night.as_ref().unwrap_or(&self.day).view
    }

    /// Draws the sky and puts rasterizer and depth state back to defaults.
    pub fn draw(&self, ctx: &mut dyn GraphicsContext, camera: &dyn Camera, total_time: f32) -> Result<()> {
        ctx.set_rasterizer_state(Some(self.rasterizer));
        ctx.set_depth_stencil_state(Some(self.depth_state));

        let mut vertex = ParameterBlock::new(self.vertex.clone());
        let mut pixel = ParameterBlock::new(self.pixel.clone());
        vertex.activate(ctx);
        pixel.activate(ctx);

        vertex.set_matrix4x4("view", &camera.view_matrix());
        vertex.set_matrix4x4("projection", &camera.projection_matrix());
        vertex.set_float("totalTime", total_time);
        pixel.set_shader_resource_view("SkyTexture", self.day.view);
        pixel.set_shader_resource_view("SkyTextureNight", self.night_view());
        pixel.set_sampler_state("BasicSampler", self.sampler);

        vertex.commit(ctx)?;
        pixel.commit(ctx)?;
        let drawn = self.mesh.draw(ctx);

        ctx.set_rasterizer_state(None);
        ctx.set_depth_stencil_state(None);
        drawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraConfig;
    use crate::gfx::camera::FlyCamera;
    use crate::gfx::device::recording::{Command, RecordingDevice};
    use crate::gfx::device::{ShaderStage, Viewport};
    use crate::gfx::resources::DepthTarget;
    use crate::gfx::rendering::cubemap::gradient_sky_faces;

    fn sky(device: &mut RecordingDevice, with_night: bool) -> Sky {
        let programs = Programs::new(device).unwrap();
        let faces = gradient_sky_faces(4, [0, 0, 255, 255], [200, 200, 255, 255], [50, 50, 50, 255]);
        let day = Cubemap::from_faces(device, "day", &faces).unwrap();
        let night = if with_night {
            Some(Cubemap::from_faces(&mut *device, "night", &faces).unwrap())
        } else {
            None
        };
        Sky::new(device, &programs, day, night).unwrap()
    }

    fn bind_targets(device: &mut RecordingDevice) {
        let depth = DepthTarget::new(device, "depth", 8, 8, false).unwrap();
        device.set_render_targets(Some(crate::gfx::device::RenderTargetView::BACK_BUFFER), Some(depth.depth_view));
        device.set_viewport(Viewport::full(8, 8));
    }

    #[test]
    fn test_states_are_front_cull_less_equal() {
        let mut device = RecordingDevice::new(8, 8);
        let sky = sky(&mut device, false);

        let rasterizer = device.rasterizer_desc(sky.rasterizer()).unwrap();
        assert_eq!(rasterizer.cull_mode, Some(wgpu::Face::Front));
        let depth = device.depth_stencil_desc(sky.depth_state()).unwrap();
        assert_eq!(depth.depth_compare, wgpu::CompareFunction::LessEqual);
        assert!(!depth.depth_write);
    }

    #[test]
    fn test_draw_uses_sky_states_then_resets() {
        let mut device = RecordingDevice::new(8, 8);
        let sky = sky(&mut device, true);
        let camera = FlyCamera::new(1.0, &CameraConfig::default());
        bind_targets(&mut device);
        device.clear_log();

        sky.draw(&mut device, &camera, 3.0).unwrap();

        let commands = device.commands();
        let draw = commands
            .iter()
            .find_map(|c| match c {
                Command::DrawIndexed { rasterizer, depth_state, .. } => Some((*rasterizer, *depth_state)),
                _ => None,
            })
            .unwrap();
        assert_eq!(draw, (Some(sky.rasterizer()), Some(sky.depth_state())));

        let tail = &commands[commands.len() - 2..];
        assert_eq!(
            tail,
            &[Command::SetRasterizerState(None), Command::SetDepthStencilState(None)]
        );
    }

    #[test]
    fn test_night_falls_back_to_day() {
        let mut device = RecordingDevice::new(8, 8);
        let sky = sky(&mut device, false);
        let camera = FlyCamera::new(1.0, &CameraConfig::default());
        bind_targets(&mut device);
        device.clear_log();

        sky.draw(&mut device, &camera, 0.0).unwrap();

        let bound = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::SetShaderResource { stage: ShaderStage::Pixel, view, .. } => *view,
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(bound, vec![sky.day().view, sky.day().view]);
        assert!(sky.night().is_none());
    }
}
