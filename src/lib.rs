//! Umbra
//!
//! A minimal real-time 3D renderer built on wgpu and winit: entities with
//! cached transforms, a free-fly camera, named shader parameters, a
//! directional shadow map and a cubemap sky.

pub mod app;
pub mod config;
pub mod error;
pub mod gfx;
pub mod input;
pub mod logging;
pub mod performance;

// Re-export main types for convenience
pub use app::UmbraApp;
pub use config::RendererConfig;
pub use error::{RenderError, Result};
