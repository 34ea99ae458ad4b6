// SPDX-License-Identifier: CEPL-1.0
use std::path::Path;

use anyhow::{Context, Result};
use neowater_render::{
    Device, ErrorScope, FrameOutcome, FramePacer, PipelineProvider, PresentMode, RenderConfig,
    RenderSize, Renderer,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};

mod context;
pub mod convert;
pub mod device;
pub mod memory;
pub mod scene;
pub mod surface;

pub use device::VkDevice;
pub use scene::QuadPipeline;

pub struct VkRenderer {
    // Dropped after `pacer` is destroyed in Drop below.
    device: VkDevice,
    pacer: Option<FramePacer<VkDevice, QuadPipeline>>,
    paused: bool,
}

impl VkRenderer {
    /// Like [`Renderer::new`], but samples `texture` instead of the
    /// built-in checkerboard.
    pub fn with_texture(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        config: &RenderConfig,
        texture: Option<&Path>,
    ) -> Result<Self> {
        let mut device = VkDevice::new(window, display, size).context("vulkan device")?;
        let scene = QuadPipeline::new(&mut device, texture).context("quad scene")?;
        let pacer = FramePacer::new(&mut device, scene, config).context("frame pacer")?;
        info!(
            frames_in_flight = config.frames_in_flight,
            present_mode = ?config.present_mode,
            "vulkan renderer ready"
        );
        Ok(Self {
            paused: size.is_empty(),
            device,
            pacer: Some(pacer),
        })
    }
}

// STRICT TEARDOWN ORDER:
// - device_wait_idle()
// - pacer: recorded buffers, pipeline, generation, frame slots
// - scene: geometry, texture, camera buffer, set layout
// - VkDevice drop: command pool, device, debug messenger, surface, instance
impl Drop for VkRenderer {
    fn drop(&mut self) {
        if let Some(mut pacer) = self.pacer.take() {
            if let Err(e) = pacer.destroy(&mut self.device) {
                warn!(error = %e, "frame pacer teardown failed");
            }
            pacer.provider_mut().release(&mut self.device);
        }
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        config: &RenderConfig,
    ) -> Result<Self> {
        Self::with_texture(window, display, size, config, None)
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        if size.is_empty() {
            if !self.paused {
                info!("vk: resize to 0x0 → paused=true");
            }
            self.paused = true;
            return Ok(());
        }
        if self.paused {
            info!(width = size.width, height = size.height, "vk: resize → paused=false");
        }
        self.paused = false;
        self.device.set_size_hint(size);
        if let Some(pacer) = &mut self.pacer {
            pacer.request_resize();
        }
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        if self.paused {
            return Ok(());
        }
        let Some(pacer) = &mut self.pacer else {
            return Ok(());
        };

        match pacer.draw_frame(&mut self.device) {
            Ok(FrameOutcome::Presented {
                image_index,
                rebuilt,
            }) => {
                debug!(image_index, rebuilt, "frame presented");
                Ok(())
            }
            Ok(FrameOutcome::Rebuilt) => {
                debug!("swapchain out of date; frame skipped");
                Ok(())
            }
            Ok(FrameOutcome::Suspended) => {
                debug!("surface has no area; frame skipped");
                Ok(())
            }
            Err(e) if e.scope() == ErrorScope::Frame => {
                warn!(error = %e, "frame abandoned");
                Ok(())
            }
            Err(e) => {
                // Nothing more is drawn; the owner decides whether to exit.
                self.paused = true;
                self.device.wait_idle().ok();
                Err(e.into())
            }
        }
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        if let Some(pacer) = &mut self.pacer {
            pacer.set_clear_color(rgba);
        }
    }

    fn set_present_mode(&mut self, mode: PresentMode) {
        if let Some(pacer) = &mut self.pacer {
            pacer.set_present_mode(mode);
        }
    }
}
