//! Windowed driver: owns the window, the `wgpu` device, the scene and the
//! frame renderer, and runs one frame per redraw.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    keyboard::KeyCode,
    window::{Window, WindowAttributes, WindowId},
};

use crate::config::RendererConfig;
use crate::error::{RenderError, Result};
use crate::gfx::camera::FlyCamera;
use crate::gfx::device::{GraphicsContext, GraphicsDevice, SamplerDesc, WgpuDevice};
use crate::gfx::geometry::{generate_cube, generate_plane, generate_sphere};
use crate::gfx::lights::SceneLighting;
use crate::gfx::rendering::cubemap::gradient_sky_faces;
use crate::gfx::rendering::{Cubemap, FrameRenderer, Programs, Sky};
use crate::gfx::resources::{ImageData, Material, TextureResource};
use crate::gfx::scene::{Entity, Scene};
use crate::input::Input;
use crate::performance::{FrameStats, PerformanceMonitor};

/// Frames between window title refreshes.
const TITLE_REFRESH_FRAMES: u64 = 30;

struct RunningState {
    window: Arc<Window>,
    device: WgpuDevice,
    renderer: FrameRenderer,
    scene: Scene,
}

pub struct UmbraApp {
    config: RendererConfig,
    state: Option<RunningState>,
    input: Input,
    performance: PerformanceMonitor,
    last_frame: Option<Instant>,
    frame_stats: FrameStats,
    frame_count: u64,
    error: Option<RenderError>,
}

impl UmbraApp {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            state: None,
            input: Input::new(),
            performance: PerformanceMonitor::new(),
            last_frame: None,
            frame_stats: FrameStats::default(),
            frame_count: 0,
            error: None,
        }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Values for a debug overlay, refreshed every frame.
    pub fn frame_stats(&self) -> FrameStats {
        self.frame_stats
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.state.as_ref().map(|s| &s.scene)
    }

    /// Mutable scene access, e.g. to edit light positions and colors.
    pub fn scene_mut(&mut self) -> Option<&mut Scene> {
        self.state.as_mut().map(|s| &mut s.scene)
    }

    /// The setup error that stopped the event loop, if any.
    pub fn take_error(&mut self) -> Option<RenderError> {
        self.error.take()
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = WindowAttributes::default()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| RenderError::Present(format!("window creation failed: {err}")))?,
        );

        let mut device = pollster::block_on(WgpuDevice::new(window.clone(), self.config.vsync))?;
        log::info!("surface format {:?}", device.surface_format());

        let (renderer, scene) = build_demo(&mut device, &self.config)?;
        self.state = Some(RunningState {
            window,
            device,
            renderer,
            scene,
        });
        Ok(())
    }

    fn redraw(&mut self) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        let now = Instant::now();
        let dt = self.last_frame.map_or(0.0, |last| (now - last).as_secs_f32());
        self.last_frame = Some(now);
        self.performance.begin_frame();

        if self.input.key_pressed(KeyCode::KeyV) {
            let vsync = !state.renderer.vsync();
            state.renderer.set_vsync(vsync);
            log::info!("vsync {}", if vsync { "on" } else { "off" });
        }

        state.scene.update(dt, &self.input);
        match state.renderer.render(&mut state.device, &state.scene) {
            Ok(report) => self.performance.update_render_stats(&report),
            Err(err) => log::error!("frame failed: {err}"),
        }

        self.performance.end_frame();
        self.frame_stats = self
            .performance
            .frame_stats(dt, state.scene.entity_count(), self.input.mouse_position());
        self.input.end_frame();

        self.frame_count += 1;
        if self.frame_count % TITLE_REFRESH_FRAMES == 0 {
            state.window.set_title(&format!(
                "{} | {:.0} fps | {} entities",
                self.config.title, self.frame_stats.fps, self.frame_stats.entity_count
            ));
        }
    }
}

impl ApplicationHandler for UmbraApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        if let Err(err) = self.start(event_loop) {
            log::error!("setup failed: {err}");
            self.error = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        self.input.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput { .. } if self.input.key_pressed(KeyCode::Escape) => event_loop.exit(),
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                if let Some(state) = self.state.as_mut() {
                    if let Err(err) = state.renderer.resize(&mut state.device, width, height) {
                        log::error!("resize to {width}x{height} failed: {err}");
                    }
                    state.scene.resize(width, height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => (),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = self.state.as_ref() {
            state.window.request_redraw();
        }
    }
}

/// Builds the demo scene: a textured cube, a sphere and a floor under an
/// orbiting sun, with a day/night sky.
///
/// Sky faces come from `config.sky_dir` when set (a `night` subdirectory adds
/// the night cubemap), otherwise from procedural gradients.
pub fn build_demo<G>(gpu: &mut G, config: &RendererConfig) -> Result<(FrameRenderer, Scene)>
where
    G: GraphicsDevice + GraphicsContext,
{
    let programs = Programs::new(gpu)?;

    let checker = TextureResource::from_image(
        gpu,
        "checker",
        &ImageData::checkerboard(256, 32, [230, 230, 230, 255], [60, 60, 70, 255]),
    )?;
    let white = TextureResource::from_image(gpu, "white", &ImageData::solid(1, 1, [255, 255, 255, 255]))?;
    let sampler = gpu.create_sampler(&SamplerDesc {
        label: "basic_sampler",
        ..SamplerDesc::default()
    })?;

    let (width, height) = gpu.surface_size();
    let camera = FlyCamera::new(width as f32 / height.max(1) as f32, &config.camera);
    let mut scene = Scene::new(camera, SceneLighting::reference(config.ambient_color))
        .with_sun_orbit_speed(config.sun_orbit_speed);

    let crate_material = scene.add_material(
        Material::new("crate", programs.lit_vertex.clone(), programs.lit_pixel.clone())?
            .with_texture("SurfaceTexture", checker.view)
            .with_sampler("BasicSampler", sampler)
            .with_roughness(0.6),
    );
    let glossy = scene.add_material(
        Material::new("glossy", programs.lit_vertex.clone(), programs.lit_pixel.clone())?
            .with_texture("SurfaceTexture", white.view)
            .with_sampler("BasicSampler", sampler)
            .with_color_tint(0.9, 0.3, 0.2, 1.0)
            .with_roughness(0.1),
    );
    let floor = scene.add_material(
        Material::new("floor", programs.lit_vertex.clone(), programs.lit_pixel.clone())?
            .with_texture("SurfaceTexture", checker.view)
            .with_sampler("BasicSampler", sampler)
            .with_uv_scale(8.0, 8.0)
            .with_roughness(0.9),
    );

    let cube = scene.add_mesh(gpu, "cube", &generate_cube())?;
    let sphere = scene.add_mesh(gpu, "sphere", &generate_sphere(32, 16))?;
    let plane = scene.add_mesh(gpu, "plane", &generate_plane(20.0, 20.0, 1, 1))?;

    scene.add_entity(Entity::new("cube", cube, crate_material).with_position(-1.5, 0.0, 0.0).with_rotation(0.0, 0.6, 0.0));
    scene.add_entity(Entity::new("sphere", sphere, glossy).with_position(1.5, 0.0, 0.0));
    scene.add_entity(Entity::new("floor", plane, floor).with_position(0.0, -1.0, 0.0));

    let sky = build_sky(gpu, &programs, config.sky_dir.as_deref())?;
    let renderer = FrameRenderer::new(gpu, config, &programs, Some(sky))?;

    let stats = scene.statistics();
    log::info!(
        "demo scene: {} entities, {} meshes, {} materials, {} triangles",
        stats.entity_count,
        stats.mesh_count,
        stats.material_count,
        stats.total_triangles
    );
    Ok((renderer, scene))
}

fn build_sky<G>(gpu: &mut G, programs: &Programs, sky_dir: Option<&Path>) -> Result<Sky>
where
    G: GraphicsDevice + GraphicsContext,
{
    let (day, night) = match sky_dir {
        Some(dir) => {
            let day = Cubemap::load_dir(gpu, dir)?;
            let night_dir = dir.join("night");
            let night = if night_dir.is_dir() {
                Some(Cubemap::load_dir(gpu, &night_dir)?)
            } else {
                None
            };
            (day, night)
        }
        None => {
            let day_faces = gradient_sky_faces(64, [70, 120, 200, 255], [190, 215, 240, 255], [90, 85, 80, 255]);
            let night_faces = gradient_sky_faces(64, [5, 5, 20, 255], [30, 35, 60, 255], [10, 10, 10, 255]);
            (
                Cubemap::from_faces(gpu, "day_sky", &day_faces)?,
                Some(Cubemap::from_faces(gpu, "night_sky", &night_faces)?),
            )
        }
    };
    Sky::new(gpu, programs, day, night)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::RecordingDevice;

    #[test]
    fn test_demo_scene_renders() {
        let mut device = RecordingDevice::new(320, 180);
        let config = RendererConfig::default().with_shadow_resolution(64);
        let (mut renderer, scene) = build_demo(&mut device, &config).unwrap();

        assert_eq!(scene.entity_count(), 3);
        assert!(renderer.sky().and_then(|sky| sky.night()).is_some());

        let report = renderer.render(&mut device, &scene).unwrap();
        assert_eq!(report.shadow_draw_calls, 3);
        assert_eq!(report.draw_calls, 7);
        assert!(device.hazards().is_empty());
    }

    #[test]
    fn test_missing_sky_dir_is_an_error() {
        let mut device = RecordingDevice::new(32, 32);
        let config = RendererConfig::default()
            .with_shadow_resolution(16)
            .with_sky_dir("/nonexistent/umbra/sky");
        assert!(build_demo(&mut device, &config).is_err());
    }

    #[test]
    fn test_app_starts_without_state() {
        let mut app = UmbraApp::new(RendererConfig::default());
        assert!(app.scene().is_none());
        assert!(app.take_error().is_none());
        assert_eq!(app.frame_stats().entity_count, 0);
    }
}
