// SPDX-License-Identifier: CEPL-1.0
use tracing::trace;

use crate::device::Device;

/// A device object owned through a [`ResourceArena`].
pub enum Resource<D: Device> {
    Fence(D::Fence),
    Semaphore(D::Semaphore),
    Swapchain(D::Swapchain),
    Image(D::Image),
    ImageView(D::ImageView),
    RenderPass(D::RenderPass),
    Framebuffer(D::Framebuffer),
}

impl<D: Device> std::fmt::Debug for Resource<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Fence(h) => f.debug_tuple("Fence").field(h).finish(),
            Resource::Semaphore(h) => f.debug_tuple("Semaphore").field(h).finish(),
            Resource::Swapchain(h) => f.debug_tuple("Swapchain").field(h).finish(),
            Resource::Image(h) => f.debug_tuple("Image").field(h).finish(),
            Resource::ImageView(h) => f.debug_tuple("ImageView").field(h).finish(),
            Resource::RenderPass(h) => f.debug_tuple("RenderPass").field(h).finish(),
            Resource::Framebuffer(h) => f.debug_tuple("Framebuffer").field(h).finish(),
        }
    }
}

impl<D: Device> Resource<D> {
    fn destroy(self, device: &mut D) {
        match self {
            Resource::Fence(h) => device.destroy_fence(h),
            Resource::Semaphore(h) => device.destroy_semaphore(h),
            Resource::Swapchain(h) => device.destroy_swapchain(h),
            Resource::Image(h) => device.destroy_image(h),
            Resource::ImageView(h) => device.destroy_image_view(h),
            Resource::RenderPass(h) => device.destroy_render_pass(h),
            Resource::Framebuffer(h) => device.destroy_framebuffer(h),
        }
    }
}

/// Owner-held list of device objects, destroyed in reverse creation order.
///
/// Objects are never shared between arenas, so whoever owns the arena decides
/// exactly when its objects go away.
pub struct ResourceArena<D: Device> {
    label: &'static str,
    entries: Vec<Resource<D>>,
}

impl<D: Device> ResourceArena<D> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            entries: Vec::new(),
        }
    }

    pub fn track(&mut self, resource: Resource<D>) {
        self.entries.push(resource);
    }

    pub fn fence(&mut self, fence: D::Fence) -> D::Fence {
        self.track(Resource::Fence(fence));
        fence
    }

    pub fn semaphore(&mut self, semaphore: D::Semaphore) -> D::Semaphore {
        self.track(Resource::Semaphore(semaphore));
        semaphore
    }

    pub fn swapchain(&mut self, swapchain: D::Swapchain) -> D::Swapchain {
        self.track(Resource::Swapchain(swapchain));
        swapchain
    }

    pub fn image(&mut self, image: D::Image) -> D::Image {
        self.track(Resource::Image(image));
        image
    }

    pub fn image_view(&mut self, view: D::ImageView) -> D::ImageView {
        self.track(Resource::ImageView(view));
        view
    }

    pub fn render_pass(&mut self, render_pass: D::RenderPass) -> D::RenderPass {
        self.track(Resource::RenderPass(render_pass));
        render_pass
    }

    pub fn framebuffer(&mut self, framebuffer: D::Framebuffer) -> D::Framebuffer {
        self.track(Resource::Framebuffer(framebuffer));
        framebuffer
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Destroys everything, newest first. The caller must have made sure no
    /// pending GPU work still references these objects.
    pub fn destroy_all(&mut self, device: &mut D) {
        trace!(arena = self.label, count = self.entries.len(), "destroying arena");
        while let Some(resource) = self.entries.pop() {
            resource.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Extent;
    use crate::layout::Aspect;
    use crate::mock::{Event, MockDevice};

    #[test]
    fn destroys_in_reverse_creation_order() {
        let mut dev = MockDevice::new(Extent::new(32, 32), 2);
        let mut arena = ResourceArena::new("test");

        let fmt = dev.color_format();
        let img = arena.image(dev.create_attachment_image(fmt, Extent::new(8, 8), Aspect::COLOR).unwrap());
        let view = arena.image_view(dev.create_image_view(img, fmt, Aspect::COLOR).unwrap());
        let fence = arena.fence(dev.create_fence(true).unwrap());
        assert_eq!(arena.len(), 3);

        dev.clear_events();
        arena.destroy_all(&mut dev);
        assert!(arena.is_empty());

        let destroyed: Vec<_> = dev
            .events()
            .iter()
            .filter_map(|e| match e {
                Event::Destroy(_, h) => Some(*h),
                _ => None,
            })
            .collect();
        assert_eq!(destroyed, vec![fence, view, img]);
        assert_eq!(dev.live_count(), 0);
    }
}
