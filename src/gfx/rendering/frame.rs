//! Per-frame orchestration.
//!
//! Every frame runs the same fixed sequence:
//!
//! 1. bind and clear the main color and depth targets
//! 2. depth pass from the sun into the shadow map
//! 3. restore the main targets and viewport
//! 4. per entity: ambient and light slots, shadow data, material, draw
//! 5. sky
//! 6. present, then bind the main targets again

use cgmath::{EuclideanSpace, Point3, Vector3};

use crate::config::RendererConfig;
use crate::error::Result;
use crate::gfx::device::{GraphicsContext, GraphicsDevice};
use crate::gfx::scene::Scene;

use super::programs::Programs;
use super::shadow_map::ShadowMap;
use super::sky::Sky;
use super::RenderTargets;

/// What one `render` call submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u64,
    pub shadow_draw_calls: u32,
    pub draw_calls: u32,
    pub vertices: u32,
}

#[derive(Debug)]
pub struct FrameRenderer {
    targets: RenderTargets,
    shadow: ShadowMap,
    sky: Option<Sky>,
    clear_color: [f32; 4],
    vsync: bool,
    frame: u64,
}

impl FrameRenderer {
    pub fn new(
        device: &mut dyn GraphicsDevice,
        config: &RendererConfig,
        programs: &Programs,
        sky: Option<Sky>,
    ) -> Result<Self> {
        let (width, height) = device.surface_size();
        let targets = RenderTargets::for_back_buffer(device, width, height)?;
        let shadow = ShadowMap::new(device, &config.shadow, programs.shadow_vertex.clone())?;

        log::info!(
            "frame renderer ready: {}x{}, vsync {}, sky {}",
            width,
            height,
            config.vsync,
            if sky.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            targets,
            shadow,
            sky,
            clear_color: config.clear_color,
            vsync: config.vsync,
            frame: 0,
        })
    }

    pub fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    pub fn shadow_map(&self) -> &ShadowMap {
        &self.shadow
    }

    /// For driving the shadow pass by hand, e.g. with a custom light view.
    pub fn shadow_map_mut(&mut self) -> &mut ShadowMap {
        &mut self.shadow
    }

    pub fn sky(&self) -> Option<&Sky> {
        self.sky.as_ref()
    }

    pub fn set_sky(&mut self, sky: Option<Sky>) {
        self.sky = sky;
    }

    pub fn vsync(&self) -> bool {
        self.vsync
    }

    pub fn set_vsync(&mut self, vsync: bool) {
        self.vsync = vsync;
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// Resizes the surface and replaces the main depth buffer, releasing the
    /// old one.
    pub fn resize(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        device.resize_surface(width, height)?;
        let targets = RenderTargets::for_back_buffer(device, width, height)?;
        let old = std::mem::replace(&mut self.targets, targets);
        old.depth.release(device)?;
        log::debug!("resized to {}x{}", width, height);
        Ok(())
    }

    /// Renders and presents one frame of `scene`.
    ///
    /// On failure the partial frame is discarded and the shadow pass reset,
    /// so the next frame starts clean.
    pub fn render(&mut self, ctx: &mut dyn GraphicsContext, scene: &Scene) -> Result<FrameReport> {
        match self.render_passes(ctx, scene) {
            Ok(report) => Ok(report),
            Err(err) => {
                ctx.discard_frame();
                self.shadow.reset(ctx);
                self.targets.bind(ctx);
                Err(err)
            }
        }
    }

    fn render_passes(&mut self, ctx: &mut dyn GraphicsContext, scene: &Scene) -> Result<FrameReport> {
        // 1: clear
        self.targets.bind(ctx);
        ctx.clear_render_target(self.targets.color, self.clear_color);
        ctx.clear_depth(self.targets.depth.depth_view, 1.0);

        // 2 and 3: shadow depth pass, then back to the main targets
        self.shadow
            .aim(Vector3::from(scene.lighting.sun().direction), Point3::origin());
        self.shadow.render(ctx, &scene.entities, &self.targets)?;

        // 4: lit entities
        let mut vertices = 0;
        for entity in &scene.entities {
            let mut params = entity.parameters();
            scene.lighting.apply(&mut params.pixel);
            self.shadow.apply(&mut params.vertex, &mut params.pixel)?;
            entity.draw(ctx, &scene.camera, &mut params)?;
            vertices += entity.mesh().vertex_count();
        }

        // 5: sky
        let sky_draws = match &self.sky {
            Some(sky) => {
                sky.draw(ctx, &scene.camera, scene.total_time())?;
                1
            }
            None => 0,
        };

        // 6: present; presenting unbinds the targets
        self.shadow.end_frame(ctx)?;
        ctx.present(self.vsync)?;
        self.targets.bind(ctx);

        let entity_count = scene.entities.len() as u32;
        self.frame += 1;
        Ok(FrameReport {
            frame: self.frame,
            shadow_draw_calls: entity_count,
            draw_calls: entity_count * 2 + sky_draws,
            vertices,
        })
    }
}
