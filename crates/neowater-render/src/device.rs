// SPDX-License-Identifier: CEPL-1.0
//! The seam between the frame-pacing core and a concrete GPU API.
//!
//! Handles are opaque `Copy` values; the core only stores them and passes
//! them back. Destruction is always explicit and issued by the owner.

use std::fmt::Debug;

use crate::error::RenderResult;
use crate::layout::{Aspect, ImageLayout, StageFlags, SubresourceRange, TransitionMasks};
use crate::recorder::{ClearValues, DrawCall};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Zero-area surfaces (minimized windows) cannot back a swapchain.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What the surface supports right now. Re-queried on every swapchain build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceInfo<F> {
    pub extent: Extent,
    pub color_format: F,
    pub depth_format: F,
    pub min_image_count: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentMode {
    Fifo,
    #[default]
    Mailbox,
    Immediate,
}

/// Non-error outcomes of acquire and present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    /// Still usable, but the swapchain no longer matches the surface exactly.
    Suboptimal,
    /// Unusable; the swapchain must be rebuilt.
    OutOfDate,
}

pub trait Device {
    type Fence: Copy + Eq + Debug;
    type Semaphore: Copy + Eq + Debug;
    type CommandBuffer: Copy + Eq + Debug;
    type Image: Copy + Eq + Debug;
    type ImageView: Copy + Eq + Debug;
    type Framebuffer: Copy + Eq + Debug;
    type RenderPass: Copy + Eq + Debug;
    type Swapchain: Copy + Eq + Debug;
    type Buffer: Copy + Eq + Debug;
    type Format: Copy + Eq + Debug;
    type Pipeline: Copy + Eq + Debug;
    type PipelineLayout: Copy + Eq + Debug;
    type DescriptorSet: Copy + Eq + Debug;

    // sync
    fn create_fence(&mut self, signaled: bool) -> RenderResult<Self::Fence>;
    fn destroy_fence(&mut self, fence: Self::Fence);
    /// Blocks until `fence` signals. Timing out is fatal.
    fn wait_fence(&mut self, fence: Self::Fence, timeout_ns: u64) -> RenderResult<()>;
    fn reset_fence(&mut self, fence: Self::Fence) -> RenderResult<()>;
    fn create_semaphore(&mut self) -> RenderResult<Self::Semaphore>;
    fn destroy_semaphore(&mut self, semaphore: Self::Semaphore);
    /// Blocks until every queue drains.
    fn wait_idle(&mut self) -> RenderResult<()>;

    // surface + swapchain
    fn update_surface_info(&mut self) -> RenderResult<SurfaceInfo<Self::Format>>;
    fn create_swapchain(
        &mut self,
        info: &SurfaceInfo<Self::Format>,
        present_mode: PresentMode,
    ) -> RenderResult<(Self::Swapchain, Vec<Self::Image>)>;
    fn destroy_swapchain(&mut self, swapchain: Self::Swapchain);
    fn create_image_view(
        &mut self,
        image: Self::Image,
        format: Self::Format,
        aspect: Aspect,
    ) -> RenderResult<Self::ImageView>;
    fn destroy_image_view(&mut self, view: Self::ImageView);
    /// Device-local image for use as a render attachment; the backend owns its memory.
    fn create_attachment_image(
        &mut self,
        format: Self::Format,
        extent: Extent,
        aspect: Aspect,
    ) -> RenderResult<Self::Image>;
    fn destroy_image(&mut self, image: Self::Image);
    fn create_render_pass(
        &mut self,
        color_format: Self::Format,
        depth_format: Self::Format,
    ) -> RenderResult<Self::RenderPass>;
    fn destroy_render_pass(&mut self, render_pass: Self::RenderPass);
    fn create_framebuffer(
        &mut self,
        render_pass: Self::RenderPass,
        attachments: &[Self::ImageView],
        extent: Extent,
    ) -> RenderResult<Self::Framebuffer>;
    fn destroy_framebuffer(&mut self, framebuffer: Self::Framebuffer);
    /// Signals `signal` once the returned image is available. `OutOfDate`
    /// signals nothing.
    fn acquire_next_image(
        &mut self,
        swapchain: Self::Swapchain,
        signal: Self::Semaphore,
    ) -> RenderResult<(u32, PresentStatus)>;
    fn present(
        &mut self,
        swapchain: Self::Swapchain,
        image_index: u32,
        wait: Self::Semaphore,
    ) -> RenderResult<PresentStatus>;

    // commands
    fn allocate_command_buffers(&mut self, count: usize) -> RenderResult<Vec<Self::CommandBuffer>>;
    fn free_command_buffers(&mut self, buffers: &[Self::CommandBuffer]);
    fn begin_commands(&mut self, cmd: Self::CommandBuffer, one_time: bool) -> RenderResult<()>;
    fn end_commands(&mut self, cmd: Self::CommandBuffer) -> RenderResult<()>;
    fn cmd_begin_render_pass(
        &mut self,
        cmd: Self::CommandBuffer,
        render_pass: Self::RenderPass,
        framebuffer: Self::Framebuffer,
        extent: Extent,
        clear: ClearValues,
    );
    fn cmd_end_render_pass(&mut self, cmd: Self::CommandBuffer);
    fn cmd_bind_pipeline(&mut self, cmd: Self::CommandBuffer, pipeline: Self::Pipeline);
    fn cmd_bind_descriptor_set(
        &mut self,
        cmd: Self::CommandBuffer,
        layout: Self::PipelineLayout,
        set: Self::DescriptorSet,
    );
    fn cmd_bind_vertex_buffer(&mut self, cmd: Self::CommandBuffer, buffer: Self::Buffer);
    fn cmd_bind_index_buffer(&mut self, cmd: Self::CommandBuffer, buffer: Self::Buffer);
    fn cmd_draw(&mut self, cmd: Self::CommandBuffer, draw: DrawCall);
    fn cmd_image_barrier(
        &mut self,
        cmd: Self::CommandBuffer,
        image: Self::Image,
        range: SubresourceRange,
        old: ImageLayout,
        new: ImageLayout,
        masks: TransitionMasks,
    );
    /// Copies a tightly packed buffer into `image`, which must be in `TransferDst`.
    fn cmd_copy_buffer_to_image(
        &mut self,
        cmd: Self::CommandBuffer,
        buffer: Self::Buffer,
        image: Self::Image,
        range: SubresourceRange,
        extent: Extent,
    );
    fn submit(
        &mut self,
        cmd: Self::CommandBuffer,
        wait: Option<(Self::Semaphore, StageFlags)>,
        signal: Option<Self::Semaphore>,
        fence: Option<Self::Fence>,
    ) -> RenderResult<()>;
}
