//! Error types shared by the renderer.
//!
//! Resource creation failures are setup errors: the renderer does not retry,
//! it hands them to the driver (`UmbraApp` or a test) which decides to abort.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no compatible GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to open GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("surface lost or unusable: {0}")]
    Present(String),

    #[error("unknown {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u32 },

    #[error("invalid {what} descriptor: {reason}")]
    InvalidDescriptor { what: &'static str, reason: String },

    #[error("write of {len} bytes overflows buffer of {size} bytes")]
    BufferOverflow { size: u64, len: u64 },

    #[error("shadow pass cannot go from {from} to {to}")]
    InvalidPassTransition { from: &'static str, to: &'static str },

    #[error("cubemap needs 6 faces, got {0}")]
    CubemapFaceCount(usize),

    #[error("mesh '{0}' has no geometry")]
    EmptyMesh(String),

    #[error("failed to load model {path}: {source}")]
    Model {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;

impl RenderError {
    pub(crate) fn invalid(what: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            what,
            reason: reason.into(),
        }
    }
}
