//! Renderer configuration.
//!
//! `RendererConfig` collects every tunable the frame driver needs. Defaults
//! match the reference scene (1280x720, camera at (0,0,-5), 45 degree FOV);
//! `from_env` layers `UMBRA_*` environment overrides on top.

use std::path::PathBuf;

use cgmath::{Deg, Point3, Rad};

/// Free-fly camera tunables.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub start_position: Point3<f32>,
    /// World units per second.
    pub move_speed: f32,
    /// Radians per pointer pixel per second.
    pub look_speed: f32,
    pub fov_y: Rad<f32>,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            start_position: Point3::new(0.0, 0.0, -5.0),
            move_speed: 5.0,
            look_speed: 1.0,
            fov_y: Deg(45.0).into(),
            near: 0.1,
            far: 100.0,
        }
    }
}

/// Shadow map tunables.
#[derive(Debug, Clone)]
pub struct ShadowConfig {
    /// Width and height of the square depth texture.
    pub resolution: u32,
    /// Width and height of the orthographic light volume in world units.
    pub extent: f32,
    /// Distance from the scene origin to the light eye.
    pub light_distance: f32,
    pub near: f32,
    pub far: f32,
    pub depth_bias: i32,
    pub slope_scaled_depth_bias: f32,
    pub depth_bias_clamp: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            resolution: 2048,
            extent: 20.0,
            light_distance: 20.0,
            near: 0.1,
            far: 50.0,
            depth_bias: 1000,
            slope_scaled_depth_bias: 1.0,
            depth_bias_clamp: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub clear_color: [f32; 4],
    pub ambient_color: [f32; 3],
    /// Radians per second the sun orbits the scene.
    pub sun_orbit_speed: f32,
    /// Directory with `right/left/up/down/front/back.png` sky faces. Procedural faces are used when unset.
    pub sky_dir: Option<PathBuf>,
    pub camera: CameraConfig,
    pub shadow: ShadowConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            title: "Umbra".to_string(),
            width: 1280,
            height: 720,
            vsync: false,
            clear_color: [0.4, 0.6, 0.75, 1.0],
            ambient_color: [0.1, 0.1, 0.15],
            sun_orbit_speed: 0.25,
            sky_dir: None,
            camera: CameraConfig::default(),
            shadow: ShadowConfig::default(),
        }
    }
}

impl RendererConfig {
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_owned();
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_ambient_color(mut self, color: [f32; 3]) -> Self {
        self.ambient_color = color;
        self
    }

    pub fn with_shadow_resolution(mut self, resolution: u32) -> Self {
        self.shadow.resolution = resolution;
        self
    }

    pub fn with_sky_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sky_dir = Some(dir.into());
        self
    }

    pub fn with_camera(mut self, camera: CameraConfig) -> Self {
        self.camera = camera;
        self
    }

    /// Aspect ratio of the configured window size.
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Applies `UMBRA_WIDTH`, `UMBRA_HEIGHT`, `UMBRA_VSYNC`,
    /// `UMBRA_SHADOW_RESOLUTION` and `UMBRA_SKY_DIR` when present.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(width) = parse_var(&lookup, "UMBRA_WIDTH") {
            self.width = width;
        }
        if let Some(height) = parse_var(&lookup, "UMBRA_HEIGHT") {
            self.height = height;
        }
        if let Some(vsync) = parse_var(&lookup, "UMBRA_VSYNC") {
            self.vsync = vsync;
        }
        if let Some(resolution) = parse_var::<u32>(&lookup, "UMBRA_SHADOW_RESOLUTION") {
            if resolution == 0 {
                log::warn!("UMBRA_SHADOW_RESOLUTION must be positive, keeping {}", self.shadow.resolution);
            } else {
                self.shadow.resolution = resolution;
            }
        }
        if let Some(dir) = lookup("UMBRA_SKY_DIR") {
            self.sky_dir = Some(PathBuf::from(dir));
        }
        self
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("ignoring {key}={raw:?}: not a valid value");
            None
        }
    }
}
