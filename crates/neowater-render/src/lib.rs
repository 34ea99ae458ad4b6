// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic frame pacing.
//!
//! Everything here talks to the GPU through the [`Device`] trait; the Vulkan
//! implementation lives in `neowater-render-vk`.

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub mod device;
pub mod error;
pub mod layout;
pub mod pacer;
pub mod pipeline;
pub mod recorder;
pub mod resource;
pub mod swapchain;
pub mod sync;
pub mod upload;

#[cfg(test)]
mod mock;

pub use device::{Device, Extent, PresentMode, PresentStatus, SurfaceInfo};
pub use error::{ErrorScope, RenderError, RenderResult};
pub use layout::{
    transition_masks, AccessFlags, Aspect, ImageLayout, ImageResource, StageFlags,
    SubresourceRange, TransitionMasks,
};
pub use pacer::{FrameOutcome, FramePacer, RenderConfig};
pub use pipeline::{DrawBindings, PipelineProvider, RenderTarget};
pub use recorder::{ClearValues, CommandRecorder, DrawCall};
pub use resource::{Resource, ResourceArena};
pub use swapchain::{Generation, SwapchainImage, SwapchainManager, SwapchainState};
pub use sync::{FrameScheduler, FrameSlot};
pub use upload::upload_image;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<RenderSize> for Extent {
    fn from(size: RenderSize) -> Self {
        Extent::new(size.width, size.height)
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        config: &RenderConfig,
    ) -> Result<Self>
    where
        Self: Sized;

    /// A zero-area size pauses rendering until the next non-zero resize.
    fn resize(&mut self, size: RenderSize) -> Result<()>;
    /// No-op while paused.
    fn render(&mut self) -> Result<()>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    /// Applied at the next swapchain rebuild, which this schedules.
    fn set_present_mode(&mut self, mode: PresentMode);
}
