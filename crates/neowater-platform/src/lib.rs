// SPDX-License-Identifier: CEPL-1.0
//! Window provider.
//!
//! Re-exports `winit` and keeps the few bits of window state the frame loop
//! polls: drawable size, an out-of-band resize flag, occlusion and close.

pub use winit;

use tracing::info;

#[derive(Debug, Default)]
pub struct SurfaceState {
    width: u32,
    height: u32,
    occluded: bool,
    focused: bool,
    resized: bool,
    close_requested: bool,
}

impl SurfaceState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            focused: true,
            ..Self::default()
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Records a new drawable size and raises the resize flag if it changed.
    pub fn on_resized(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        let was_paused = self.paused();
        self.width = width;
        self.height = height;
        self.resized = true;
        if was_paused != self.paused() {
            info!(width, height, paused = self.paused(), "surface resized");
        }
    }

    pub fn on_occluded(&mut self, occluded: bool) {
        if self.occluded != occluded {
            self.occluded = occluded;
            info!(occluded, paused = self.paused(), "surface occlusion changed");
        }
    }

    pub fn on_focused(&mut self, focused: bool) -> bool {
        let changed = self.focused != focused;
        self.focused = focused;
        changed
    }

    pub fn focused(&self) -> bool {
        self.focused
    }

    /// Returns the resize flag and clears it.
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    /// Minimized (zero area) or fully hidden.
    pub fn paused(&self) -> bool {
        self.occluded || self.width == 0 || self.height == 0
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn should_close(&self) -> bool {
        self.close_requested
    }
}
