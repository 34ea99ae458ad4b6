// SPDX-License-Identifier: CEPL-1.0
//! The frame loop.
//!
//! One [`FramePacer::draw_frame`] call is one iteration:
//!
//! 1. wait on the current slot's fence
//! 2. acquire an image (out of date: rebuild and skip the frame)
//! 3. wait on whatever frame last used that image, then claim it
//! 4. reset the slot fence and submit the image's pre-recorded buffer
//! 5. present, advance the slot, and rebuild if anything asked for it
//!
//! Rebuilds always go through [`FramePacer::rebuild`]: device idle, tear
//! down the old generation newest first, build and record the new one.
//! Frame slots are never touched by a rebuild.

use tracing::{debug, info};

use crate::device::{Device, PresentMode, PresentStatus};
use crate::error::{RenderError, RenderResult};
use crate::layout::StageFlags;
use crate::pipeline::{DrawBindings, PipelineProvider};
use crate::recorder::{ClearValues, CommandRecorder};
use crate::swapchain::{SwapchainManager, SwapchainState};
use crate::sync::FrameScheduler;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderConfig {
    pub frames_in_flight: usize,
    pub present_mode: PresentMode,
    pub clear: ClearValues,
    /// `u64::MAX` waits forever.
    pub fence_timeout_ns: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            present_mode: PresentMode::Mailbox,
            clear: ClearValues::default(),
            fence_timeout_ns: u64::MAX,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame reached the presentation engine. `rebuilt` is set when a new
    /// generation was built during this call.
    Presented { image_index: u32, rebuilt: bool },
    /// The swapchain was out of date; nothing was submitted.
    Rebuilt,
    /// The surface has no area; nothing to draw into.
    Suspended,
}

pub struct FramePacer<D: Device, P: PipelineProvider<D>> {
    frames: FrameScheduler<D>,
    swapchain: SwapchainManager<D>,
    recorder: CommandRecorder<D>,
    provider: P,
    bindings: Option<DrawBindings<D>>,
    resize_requested: bool,
}

impl<D: Device, P: PipelineProvider<D>> FramePacer<D, P> {
    /// Creates the frame slots and the first generation.
    ///
    /// On failure the provider is released, since it cannot be handed back.
    pub fn new(device: &mut D, mut provider: P, config: &RenderConfig) -> RenderResult<Self> {
        let frames = match FrameScheduler::new(device, config.frames_in_flight) {
            Ok(f) => f.with_fence_timeout(config.fence_timeout_ns),
            Err(e) => {
                provider.release(device);
                return Err(e);
            }
        };
        let mut pacer = Self {
            frames,
            swapchain: SwapchainManager::new(config.present_mode)
                .with_fence_timeout(config.fence_timeout_ns),
            recorder: CommandRecorder::new(config.clear),
            provider,
            bindings: None,
            resize_requested: false,
        };

        if let Err(e) = pacer.build_generation(device) {
            pacer.swapchain.destroy(device);
            pacer.frames.destroy(device);
            pacer.provider.release(device);
            return Err(e);
        }
        Ok(pacer)
    }

    pub fn state(&self) -> SwapchainState {
        self.swapchain.state()
    }

    pub fn swapchain(&self) -> &SwapchainManager<D> {
        &self.swapchain
    }

    pub fn frames(&self) -> &FrameScheduler<D> {
        &self.frames
    }

    pub fn recorder(&self) -> &CommandRecorder<D> {
        &self.recorder
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn frame_index(&self) -> usize {
        self.frames.current_index()
    }

    /// External resize flag; polled once per iteration after present.
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    /// New clear color; the whole command set is re-recorded through a
    /// rebuild at the next frame.
    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        let mut clear = self.recorder.clear_values();
        if clear.color != rgba {
            clear.color = rgba;
            self.recorder.set_clear_values(clear);
            self.swapchain.invalidate();
        }
    }

    pub fn set_present_mode(&mut self, mode: PresentMode) {
        self.swapchain.set_present_mode(mode);
    }

    pub fn draw_frame(&mut self, device: &mut D) -> RenderResult<FrameOutcome> {
        let mut rebuilt = false;
        if self.resize_requested || self.swapchain.state() != SwapchainState::Ready {
            if !self.rebuild(device)? {
                return Ok(FrameOutcome::Suspended);
            }
            rebuilt = true;
        }

        let slot = self.frames.begin_frame(device)?;
        let (image_index, acquired) = self.swapchain.acquire_next(device, slot.image_available)?;
        if acquired == PresentStatus::OutOfDate {
            // Slot fence still signaled and unreset; the same slot is reused.
            return if self.rebuild(device)? {
                Ok(FrameOutcome::Rebuilt)
            } else {
                Ok(FrameOutcome::Suspended)
            };
        }

        self.swapchain
            .track_image_fence(device, image_index, slot.in_flight)?;
        let cmd = self.recorder.buffer(image_index as usize)?;

        device.reset_fence(slot.in_flight)?;
        device.submit(
            cmd,
            Some((slot.image_available, StageFlags::COLOR_ATTACHMENT_OUTPUT)),
            Some(slot.render_finished),
            Some(slot.in_flight),
        )?;
        let presented = self
            .swapchain
            .present(device, image_index, slot.render_finished)?;
        debug!(
            frame = self.frames.current_index(),
            image = image_index,
            ?acquired,
            ?presented,
            "frame presented"
        );
        self.frames.advance();

        if acquired != PresentStatus::Optimal
            || presented != PresentStatus::Optimal
            || self.resize_requested
        {
            self.rebuild(device)?;
            rebuilt = true;
        }

        Ok(FrameOutcome::Presented {
            image_index,
            rebuilt,
        })
    }

    /// Tears down the current generation and builds the next one.
    ///
    /// Returns `Ok(false)` when the surface has no area; the pacer then
    /// stays suspended until a later rebuild succeeds.
    pub fn rebuild(&mut self, device: &mut D) -> RenderResult<bool> {
        device.wait_idle()?;
        let previous = self.swapchain.generation().map(|g| g.id());
        self.teardown_generation(device);
        self.resize_requested = false;

        let built = self.build_generation(device)?;
        if built {
            info!(
                from = ?previous,
                to = ?self.swapchain.generation().map(|g| g.id()),
                "swapchain rebuilt"
            );
        }
        Ok(built)
    }

    /// Waits for the device and releases everything except the provider's
    /// own long-lived resources.
    pub fn destroy(&mut self, device: &mut D) -> RenderResult<()> {
        device.wait_idle()?;
        self.teardown_generation(device);
        self.swapchain.destroy(device);
        self.frames.destroy(device);
        Ok(())
    }

    fn build_generation(&mut self, device: &mut D) -> RenderResult<bool> {
        if !self.swapchain.build(device)? {
            return Ok(false);
        }
        let generation = self
            .swapchain
            .generation()
            .ok_or_else(|| RenderError::InvalidConfig("swapchain built without a generation".into()))?;

        let bindings = match self.provider.build(device, &generation.render_target()) {
            Ok(b) => b,
            Err(e) => {
                self.swapchain.teardown(device);
                return Err(e);
            }
        };
        if let Err(e) = self.recorder.record(device, generation, &bindings) {
            self.provider.destroy(device, bindings);
            self.swapchain.teardown(device);
            return Err(e);
        }
        self.bindings = Some(bindings);
        Ok(true)
    }

    /// Command buffers, then pipeline objects, then the swapchain generation.
    /// The device must be idle.
    fn teardown_generation(&mut self, device: &mut D) {
        self.recorder.release(device);
        if let Some(bindings) = self.bindings.take() {
            self.provider.destroy(device, bindings);
        }
        self.swapchain.teardown(device);
    }
}
