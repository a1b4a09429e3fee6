//! # Graphics Module
//!
//! Everything between the scene description and the GPU.
//!
//! - **Device** ([`device`]) - handle-based device and immediate-mode context traits, with a `wgpu` backend and a headless recording backend
//! - **Shader parameters** ([`shader`]) - named parameter layouts and per-draw staging blocks
//! - **Camera** ([`camera`]) - left-handed free-fly camera
//! - **Scene** ([`scene`]) - entities with cached transforms, meshes and materials
//! - **Rendering** ([`rendering`]) - shadow map, cubemap sky and the per-frame pass order
//!
//! ## Usage
//!
//! ```no_run
//! use umbra::gfx::device::RecordingDevice;
//! use umbra::RendererConfig;
//!
//! let mut device = RecordingDevice::new(1280, 720);
//! let (mut renderer, scene) = umbra::app::build_demo(&mut device, &RendererConfig::default()).unwrap();
//! renderer.render(&mut device, &scene).unwrap();
//! ```

pub mod camera;
pub mod device;
pub mod geometry;
pub mod lights;
pub mod math;
pub mod rendering;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod transform;

// Re-export commonly used types
pub use camera::{Camera, FlyCamera};
pub use lights::{Light, SceneLighting};
pub use rendering::FrameRenderer;
pub use scene::{Entity, Scene};
pub use shader::{ParameterBlock, ShaderParameterSink, ShaderProgram};
pub use transform::Transform;
