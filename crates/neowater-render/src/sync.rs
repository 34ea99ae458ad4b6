// SPDX-License-Identifier: CEPL-1.0
//! Frames in flight.
//!
//! A fixed ring of [`FrameSlot`]s. Each slot's fence is created signaled so
//! the first pass through the ring does not block. Slots live as long as the
//! scheduler and survive every swapchain rebuild.

use tracing::debug;

use crate::device::Device;
use crate::error::{RenderError, RenderResult};
use crate::resource::ResourceArena;

/// Per-frame sync objects.
pub struct FrameSlot<D: Device> {
    /// Signaled by acquire, waited on by the submit.
    pub image_available: D::Semaphore,
    /// Signaled by the submit, waited on by present.
    pub render_finished: D::Semaphore,
    /// Signaled when this slot's submission retires.
    pub in_flight: D::Fence,
}

impl<D: Device> Clone for FrameSlot<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: Device> Copy for FrameSlot<D> {}

impl<D: Device> std::fmt::Debug for FrameSlot<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSlot")
            .field("image_available", &self.image_available)
            .field("render_finished", &self.render_finished)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

pub struct FrameScheduler<D: Device> {
    slots: Vec<FrameSlot<D>>,
    current: usize,
    fence_timeout_ns: u64,
    arena: ResourceArena<D>,
}

impl<D: Device> FrameScheduler<D> {
    pub fn new(device: &mut D, frames_in_flight: usize) -> RenderResult<Self> {
        if frames_in_flight == 0 {
            return Err(RenderError::InvalidConfig(
                "frames_in_flight must be at least 1".into(),
            ));
        }

        let mut arena = ResourceArena::new("frame slots");
        let mut slots = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            match create_slot(device, &mut arena) {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    arena.destroy_all(device);
                    return Err(e);
                }
            }
        }
        debug!(frames_in_flight, "created frame slots");

        Ok(Self {
            slots,
            current: 0,
            fence_timeout_ns: u64::MAX,
            arena,
        })
    }

    pub fn with_fence_timeout(mut self, timeout_ns: u64) -> Self {
        self.fence_timeout_ns = timeout_ns;
        self
    }

    pub fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout_ns
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn slot(&self, index: usize) -> Option<&FrameSlot<D>> {
        self.slots.get(index)
    }

    /// Blocks until the current slot's previous submission has retired and
    /// returns the slot. The fence is left signaled; reset it right before
    /// the submit that reuses it.
    pub fn begin_frame(&mut self, device: &mut D) -> RenderResult<FrameSlot<D>> {
        let slot = self.slots[self.current];
        device.wait_fence(slot.in_flight, self.fence_timeout_ns)?;
        Ok(slot)
    }

    /// Moves to the next slot. Called once per completed iteration.
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }

    /// The device must be idle.
    pub fn destroy(&mut self, device: &mut D) {
        self.arena.destroy_all(device);
        self.slots.clear();
        self.current = 0;
    }
}

fn create_slot<D: Device>(
    device: &mut D,
    arena: &mut ResourceArena<D>,
) -> RenderResult<FrameSlot<D>> {
    Ok(FrameSlot {
        image_available: arena.semaphore(device.create_semaphore()?),
        render_finished: arena.semaphore(device.create_semaphore()?),
        in_flight: arena.fence(device.create_fence(true)?),
    })
}
