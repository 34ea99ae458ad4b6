// SPDX-License-Identifier: CEPL-1.0
//! Swapchain lifecycle.
//!
//! ```text
//! Uninitialized -> Ready -> Invalid -> Ready (new generation) -> ... -> Destroyed
//! ```
//!
//! Every build produces a new [`Generation`] owning the presentable chain,
//! its per-image attachments, the render pass and the framebuffers. A
//! generation is destroyed as a whole, in reverse construction order, before
//! the next one is created.

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::device::{Device, Extent, PresentMode, PresentStatus, SurfaceInfo};
use crate::error::{RenderError, RenderResult};
use crate::layout::Aspect;
use crate::pipeline::RenderTarget;
use crate::resource::ResourceArena;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapchainState {
    Uninitialized,
    Ready,
    Invalid,
    Destroyed,
}

pub struct SwapchainImage<D: Device> {
    pub image: D::Image,
    pub color_view: D::ImageView,
    pub depth_image: D::Image,
    pub depth_view: D::ImageView,
    pub framebuffer: D::Framebuffer,
    /// Fence of the frame slot that last submitted work for this image.
    /// Borrowed from the frame scheduler, never destroyed from here.
    in_flight: Option<D::Fence>,
}

impl<D: Device> SwapchainImage<D> {
    pub fn in_flight(&self) -> Option<D::Fence> {
        self.in_flight
    }
}

pub struct Generation<D: Device> {
    id: u64,
    swapchain: D::Swapchain,
    images: Vec<SwapchainImage<D>>,
    render_pass: D::RenderPass,
    extent: Extent,
    color_format: D::Format,
    depth_format: D::Format,
    arena: ResourceArena<D>,
}

impl<D: Device> Generation<D> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn swapchain(&self) -> D::Swapchain {
        self.swapchain
    }

    pub fn render_pass(&self) -> D::RenderPass {
        self.render_pass
    }

    pub fn image(&self, index: usize) -> Option<&SwapchainImage<D>> {
        self.images.get(index)
    }

    pub fn framebuffer(&self, index: usize) -> Option<D::Framebuffer> {
        self.images.get(index).map(|i| i.framebuffer)
    }

    pub fn render_target(&self) -> RenderTarget<D> {
        RenderTarget {
            generation: self.id,
            render_pass: self.render_pass,
            extent: self.extent,
            image_count: self.images.len(),
            color_format: self.color_format,
            depth_format: self.depth_format,
        }
    }
}

pub struct SwapchainManager<D: Device> {
    state: SwapchainState,
    generation: Option<Generation<D>>,
    next_generation: u64,
    present_mode: PresentMode,
    fence_timeout_ns: u64,
}

impl<D: Device> SwapchainManager<D> {
    pub fn new(present_mode: PresentMode) -> Self {
        Self {
            state: SwapchainState::Uninitialized,
            generation: None,
            next_generation: 1,
            present_mode,
            fence_timeout_ns: u64::MAX,
        }
    }

    pub fn with_fence_timeout(mut self, timeout_ns: u64) -> Self {
        self.fence_timeout_ns = timeout_ns;
        self
    }

    pub fn state(&self) -> SwapchainState {
        self.state
    }

    pub fn generation(&self) -> Option<&Generation<D>> {
        self.generation.as_ref()
    }

    /// Number of swapchain images in the live generation (0 if none).
    pub fn len(&self) -> usize {
        self.generation.as_ref().map_or(0, Generation::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn present_mode(&self) -> PresentMode {
        self.present_mode
    }

    /// Applies from the next build on.
    pub fn set_present_mode(&mut self, mode: PresentMode) {
        if self.present_mode != mode {
            self.present_mode = mode;
            self.invalidate();
        }
    }

    /// Marks the live generation stale; the owner rebuilds at the next
    /// frame boundary.
    pub fn invalidate(&mut self) {
        if self.state == SwapchainState::Ready {
            self.state = SwapchainState::Invalid;
        }
    }

    /// Builds a new generation from freshly queried surface info.
    ///
    /// Returns `Ok(false)` when the surface currently has no area; the
    /// manager then stays `Invalid` and the caller retries later.
    pub fn build(&mut self, device: &mut D) -> RenderResult<bool> {
        match self.state {
            SwapchainState::Destroyed => {
                return Err(RenderError::InvalidConfig(
                    "swapchain manager already destroyed".into(),
                ))
            }
            _ if self.generation.is_some() => {
                return Err(RenderError::InvalidConfig(
                    "previous swapchain generation was not torn down".into(),
                ))
            }
            _ => {}
        }

        let info = device.update_surface_info()?;
        if info.extent.is_empty() {
            debug!("surface has zero area; deferring swapchain build");
            self.state = SwapchainState::Invalid;
            return Ok(false);
        }

        let mut arena = ResourceArena::new("swapchain generation");
        let built = build_generation(device, &info, self.present_mode, &mut arena);
        let (swapchain, images, render_pass) = match built {
            Ok(parts) => parts,
            Err(e) => {
                arena.destroy_all(device);
                self.state = SwapchainState::Invalid;
                return Err(e);
            }
        };

        let id = self.next_generation;
        self.next_generation += 1;
        info!(
            generation = id,
            width = info.extent.width,
            height = info.extent.height,
            images = images.len(),
            mode = ?self.present_mode,
            "swapchain ready"
        );

        self.generation = Some(Generation {
            id,
            swapchain,
            images,
            render_pass,
            extent: info.extent,
            color_format: info.color_format,
            depth_format: info.depth_format,
            arena,
        });
        self.state = SwapchainState::Ready;
        Ok(true)
    }

    /// Destroys the live generation. The device must be idle.
    pub fn teardown(&mut self, device: &mut D) {
        if let Some(mut generation) = self.generation.take() {
            debug!(generation = generation.id, "tearing down swapchain generation");
            generation.arena.destroy_all(device);
        }
        if self.state == SwapchainState::Ready {
            self.state = SwapchainState::Invalid;
        }
    }

    pub fn destroy(&mut self, device: &mut D) {
        self.teardown(device);
        self.state = SwapchainState::Destroyed;
    }

    /// Requests the next presentable image, signaling `signal` once it is
    /// available. `OutOfDate` and `Suboptimal` invalidate the generation;
    /// only `OutOfDate` leaves `signal` untouched.
    pub fn acquire_next(
        &mut self,
        device: &mut D,
        signal: D::Semaphore,
    ) -> RenderResult<(u32, PresentStatus)> {
        if self.state != SwapchainState::Ready {
            return Err(RenderError::InvalidConfig(format!(
                "acquire while swapchain is {:?}",
                self.state
            )));
        }
        let (swapchain, id, len) = self.live()?;
        let (index, status) = device.acquire_next_image(swapchain, signal)?;
        match status {
            PresentStatus::Optimal => {}
            PresentStatus::Suboptimal => {
                warn!(generation = id, "acquire reported suboptimal swapchain");
                self.state = SwapchainState::Invalid;
            }
            PresentStatus::OutOfDate => {
                info!(generation = id, "acquire reported out-of-date swapchain");
                self.state = SwapchainState::Invalid;
                return Ok((index, status));
            }
        }
        if index as usize >= len {
            return Err(anyhow!("acquired image {index} but generation {id} has {len} images").into());
        }
        Ok((index, status))
    }

    /// Queues `image_index` for presentation once `wait` signals.
    pub fn present(
        &mut self,
        device: &mut D,
        image_index: u32,
        wait: D::Semaphore,
    ) -> RenderResult<PresentStatus> {
        let (swapchain, id, _) = self.live()?;
        let status = device.present(swapchain, image_index, wait)?;
        match status {
            PresentStatus::Optimal => {}
            PresentStatus::Suboptimal => {
                warn!(generation = id, "present reported suboptimal swapchain");
                self.state = SwapchainState::Invalid;
            }
            PresentStatus::OutOfDate => {
                info!(generation = id, "present reported out-of-date swapchain");
                self.state = SwapchainState::Invalid;
            }
        }
        Ok(status)
    }

    /// Waits for whatever frame last used `image_index`, then hands the image
    /// to `fence`.
    pub fn track_image_fence(
        &mut self,
        device: &mut D,
        image_index: u32,
        fence: D::Fence,
    ) -> RenderResult<()> {
        let timeout = self.fence_timeout_ns;
        let generation = self
            .generation
            .as_mut()
            .ok_or_else(|| RenderError::InvalidConfig("no live swapchain generation".into()))?;
        let image = generation
            .images
            .get_mut(image_index as usize)
            .ok_or(RenderError::NotRecorded {
                index: image_index as usize,
            })?;

        if let Some(previous) = image.in_flight {
            device.wait_fence(previous, timeout)?;
        }
        image.in_flight = Some(fence);
        Ok(())
    }

    fn live(&self) -> RenderResult<(D::Swapchain, u64, usize)> {
        self.generation
            .as_ref()
            .map(|g| (g.swapchain, g.id, g.images.len()))
            .ok_or_else(|| RenderError::InvalidConfig("no live swapchain generation".into()))
    }
}

type GenerationParts<D> = (
    <D as Device>::Swapchain,
    Vec<SwapchainImage<D>>,
    <D as Device>::RenderPass,
);

fn build_generation<D: Device>(
    device: &mut D,
    info: &SurfaceInfo<D::Format>,
    present_mode: PresentMode,
    arena: &mut ResourceArena<D>,
) -> RenderResult<GenerationParts<D>> {
    let (swapchain, presentable) = device.create_swapchain(info, present_mode)?;
    let swapchain = arena.swapchain(swapchain);

    let mut attachments = Vec::with_capacity(presentable.len());
    for &image in &presentable {
        let color_view = arena.image_view(device.create_image_view(
            image,
            info.color_format,
            Aspect::COLOR,
        )?);
        let depth_image = arena.image(device.create_attachment_image(
            info.depth_format,
            info.extent,
            Aspect::DEPTH,
        )?);
        let depth_view = arena.image_view(device.create_image_view(
            depth_image,
            info.depth_format,
            Aspect::DEPTH,
        )?);
        attachments.push((image, color_view, depth_image, depth_view));
    }

    let render_pass =
        arena.render_pass(device.create_render_pass(info.color_format, info.depth_format)?);

    let mut images = Vec::with_capacity(attachments.len());
    for (image, color_view, depth_image, depth_view) in attachments {
        let framebuffer = arena.framebuffer(device.create_framebuffer(
            render_pass,
            &[color_view, depth_view],
            info.extent,
        )?);
        images.push(SwapchainImage {
            image,
            color_view,
            depth_image,
            depth_view,
            framebuffer,
            in_flight: None,
        });
    }

    Ok((swapchain, images, render_pass))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Event, Kind, MockDevice};

    #[test]
    fn build_creates_attachments_and_framebuffers_per_image() {
        let mut dev = MockDevice::new(Extent::new(1280, 720), 3);
        let mut sc = SwapchainManager::new(PresentMode::Mailbox);
        assert_eq!(sc.state(), SwapchainState::Uninitialized);

        assert!(sc.build(&mut dev).unwrap());
        assert_eq!(sc.state(), SwapchainState::Ready);
        assert_eq!(sc.len(), 3);

        let gen = sc.generation().unwrap();
        assert_eq!(gen.id(), 1);
        assert_eq!(gen.extent(), Extent::new(1280, 720));
        assert_eq!(dev.live_of(Kind::Framebuffer).len(), 3);
        assert_eq!(dev.live_of(Kind::ImageView).len(), 6);
        assert_eq!(dev.live_of(Kind::Image).len(), 3);
        assert_eq!(dev.live_of(Kind::RenderPass).len(), 1);
        assert!((0..3).all(|i| gen.image(i).unwrap().in_flight().is_none()));
    }

    #[test]
    fn every_build_requeries_the_surface() {
        let mut dev = MockDevice::new(Extent::new(640, 480), 2);
        let mut sc = SwapchainManager::new(PresentMode::Fifo);
        sc.build(&mut dev).unwrap();
        sc.teardown(&mut dev);
        dev.resize_surface(Extent::new(1024, 768));
        dev.set_image_count(4);
        sc.build(&mut dev).unwrap();

        let queries = dev.events().iter().filter(|e| **e == Event::SurfaceQuery).count();
        assert_eq!(queries, 2);
        let gen = sc.generation().unwrap();
        assert_eq!(gen.id(), 2);
        assert_eq!(gen.extent(), Extent::new(1024, 768));
        assert_eq!(gen.len(), 4);
    }

    #[test]
    fn teardown_reverses_construction_order() {
        let mut dev = MockDevice::new(Extent::new(640, 480), 2);
        let mut sc = SwapchainManager::new(PresentMode::Fifo);
        sc.build(&mut dev).unwrap();

        let created: Vec<_> = dev
            .events()
            .iter()
            .filter_map(|e| match e {
                Event::Create(_, h) => Some(*h),
                _ => None,
            })
            .collect();
        dev.clear_events();
        sc.teardown(&mut dev);
        assert_eq!(sc.state(), SwapchainState::Invalid);

        let destroyed: Vec<_> = dev
            .events()
            .iter()
            .filter_map(|e| match e {
                Event::Destroy(_, h) => Some(*h),
                _ => None,
            })
            .collect();
        let mut expected = created;
        expected.reverse();
        assert_eq!(destroyed, expected);
        assert!(matches!(dev.events().first(), Some(Event::Destroy(Kind::Framebuffer, _))));
        assert!(matches!(dev.events().last(), Some(Event::Destroy(Kind::Swapchain, _))));
        assert_eq!(dev.live_count(), 0);
    }

    #[test]
    fn zero_area_surface_defers_build() {
        let mut dev = MockDevice::new(Extent::new(0, 0), 2);
        let mut sc = SwapchainManager::new(PresentMode::Fifo);
        assert!(!sc.build(&mut dev).unwrap());
        assert_eq!(sc.state(), SwapchainState::Invalid);
        assert!(sc.generation().is_none());
        assert_eq!(sc.len(), 0);

        dev.resize_surface(Extent::new(300, 200));
        assert!(sc.build(&mut dev).unwrap());
        assert_eq!(sc.state(), SwapchainState::Ready);
    }

    #[test]
    fn build_over_live_generation_is_rejected() {
        let mut dev = MockDevice::new(Extent::new(640, 480), 2);
        let mut sc = SwapchainManager::new(PresentMode::Fifo);
        sc.build(&mut dev).unwrap();
        assert!(matches!(sc.build(&mut dev), Err(RenderError::InvalidConfig(_))));
    }

    #[test]
    fn out_of_date_acquire_invalidates_without_signaling() {
        let mut dev = MockDevice::new(Extent::new(640, 480), 2);
        let sem = dev.create_semaphore().unwrap();
        let mut sc = SwapchainManager::new(PresentMode::Fifo);
        sc.build(&mut dev).unwrap();

        dev.resize_surface(Extent::new(800, 600));
        let (_, status) = sc.acquire_next(&mut dev, sem).unwrap();
        assert_eq!(status, PresentStatus::OutOfDate);
        assert_eq!(sc.state(), SwapchainState::Invalid);
        assert!(matches!(
            sc.acquire_next(&mut dev, sem),
            Err(RenderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn reused_image_waits_for_its_previous_fence() {
        let mut dev = MockDevice::new(Extent::new(640, 480), 2);
        let mut sc = SwapchainManager::new(PresentMode::Fifo);
        sc.build(&mut dev).unwrap();
        let first = dev.create_fence(true).unwrap();
        let second = dev.create_fence(true).unwrap();

        sc.track_image_fence(&mut dev, 0, first).unwrap();
        assert!(!dev.events().contains(&Event::WaitFence(first)));

        sc.track_image_fence(&mut dev, 0, second).unwrap();
        assert!(dev.events().contains(&Event::WaitFence(first)));
        assert_eq!(sc.generation().unwrap().image(0).unwrap().in_flight(), Some(second));
    }

    #[test]
    fn destroy_is_terminal() {
        let mut dev = MockDevice::new(Extent::new(640, 480), 2);
        let mut sc = SwapchainManager::new(PresentMode::Fifo);
        sc.build(&mut dev).unwrap();
        sc.destroy(&mut dev);
        assert_eq!(sc.state(), SwapchainState::Destroyed);
        assert_eq!(dev.live_count(), 0);
        assert!(sc.build(&mut dev).is_err());
    }
}
