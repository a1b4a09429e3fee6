//! Core rendering functionality
//!
//! Built-in shader programs, the shadow map, cubemap sky and the per-frame
//! orchestration that ties them together.

pub mod cubemap;
pub mod frame;
pub mod programs;
pub mod shadow_map;
pub mod sky;

pub use cubemap::{CubeFace, Cubemap};
pub use frame::{FrameRenderer, FrameReport};
pub use programs::Programs;
pub use shadow_map::{ShadowMap, ShadowPassState};
pub use sky::Sky;

use crate::error::Result;
use crate::gfx::device::{GraphicsContext, GraphicsDevice, RenderTargetView, Viewport};
use crate::gfx::resources::DepthTarget;

/// The main color and depth targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTargets {
    pub color: RenderTargetView,
    pub depth: DepthTarget,
}

impl RenderTargets {
    /// The swapchain image plus a matching depth buffer.
    pub fn for_back_buffer(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> Result<Self> {
        let depth = DepthTarget::new(device, "main_depth", width.max(1), height.max(1), false)?;
        Ok(Self {
            color: RenderTargetView::BACK_BUFFER,
            depth,
        })
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::full(self.depth.width, self.depth.height)
    }

    /// Binds both targets and a full-size viewport.
    pub fn bind(&self, ctx: &mut dyn GraphicsContext) {
        ctx.set_render_targets(Some(self.color), Some(self.depth.depth_view));
        ctx.set_viewport(self.viewport());
    }
}
