// SPDX-License-Identifier: CEPL-1.0
//! [`Device`] over `ash`.
//!
//! Raw handles are the associated types, so the core stores real Vulkan
//! objects. Attachment images own device memory, which is tracked here and
//! freed with the image.

use std::collections::HashMap;

use anyhow::anyhow;
use ash::vk;
use neowater_render::{
    Aspect, ClearValues, Device, DrawCall, Extent, ImageLayout, PresentMode, PresentStatus,
    RenderError, RenderResult, RenderSize, StageFlags, SubresourceRange, SurfaceInfo,
    TransitionMasks,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};

use crate::context::Context;
use crate::convert;
use crate::memory::{self, BufferAlloc, STAGING_PROPS};
use crate::surface::{
    choose_extent, choose_image_count, choose_present_mode, choose_surface_format,
    present_mode_name,
};

/// Maps a failed call; device loss is singled out, the rest is opaque.
fn vk_err(what: &'static str) -> impl Fn(vk::Result) -> RenderError {
    move |e| match e {
        vk::Result::ERROR_DEVICE_LOST => RenderError::DeviceLost,
        vk::Result::ERROR_SURFACE_LOST_KHR => RenderError::Presentation(format!("{what}: {e}")),
        other => RenderError::Backend(anyhow!("{what}: {other}")),
    }
}

pub struct VkDevice {
    ctx: Context,
    size_hint: RenderSize,
    surface_format: vk::SurfaceFormatKHR,
    caps: vk::SurfaceCapabilitiesKHR,
    attachment_memory: HashMap<vk::Image, vk::DeviceMemory>,
}

impl VkDevice {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> anyhow::Result<Self> {
        let ctx = unsafe { Context::new(window, display)? };
        Ok(Self {
            ctx,
            size_hint: size,
            surface_format: vk::SurfaceFormatKHR::default(),
            caps: vk::SurfaceCapabilitiesKHR::default(),
            attachment_memory: HashMap::new(),
        })
    }

    pub fn raw(&self) -> &ash::Device {
        &self.ctx.device
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.ctx.instance
    }

    pub fn phys(&self) -> vk::PhysicalDevice {
        self.ctx.phys
    }

    /// Used when the surface leaves the extent up to us.
    pub fn set_size_hint(&mut self, size: RenderSize) {
        self.size_hint = size;
    }

    pub unsafe fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        props: vk::MemoryPropertyFlags,
    ) -> RenderResult<BufferAlloc> {
        let (buffer, memory) = memory::create_buffer_and_memory(
            &self.ctx.instance,
            &self.ctx.device,
            self.ctx.phys,
            size,
            usage,
            props,
        )?;
        Ok(BufferAlloc { buffer, memory })
    }

    /// Host-visible buffer already holding `data`.
    pub unsafe fn create_staging(&self, data: &[u8]) -> RenderResult<BufferAlloc> {
        let staging = self.create_buffer(
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            STAGING_PROPS,
        )?;
        if let Err(e) = memory::write_mapped(&self.ctx.device, staging.memory, data) {
            staging.destroy(&self.ctx.device);
            return Err(e.into());
        }
        Ok(staging)
    }

    /// Device-local buffer filled through a staging copy. Blocks on a
    /// private fence until the copy retires.
    pub unsafe fn create_device_local_buffer(
        &mut self,
        usage: vk::BufferUsageFlags,
        data: &[u8],
    ) -> RenderResult<BufferAlloc> {
        let size = data.len() as vk::DeviceSize;
        let dst = self.create_buffer(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let staging = match self.create_staging(data) {
            Ok(s) => s,
            Err(e) => {
                dst.destroy(&self.ctx.device);
                return Err(e);
            }
        };

        let copied = self.copy_buffer_blocking(staging.buffer, dst.buffer, size);
        staging.destroy(&self.ctx.device);
        match copied {
            Ok(()) => Ok(dst),
            Err(e) => {
                dst.destroy(&self.ctx.device);
                Err(e)
            }
        }
    }

    unsafe fn copy_buffer_blocking(
        &mut self,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) -> RenderResult<()> {
        let cmd = self.allocate_command_buffers(1)?[0];
        let fence = match self.create_fence(false) {
            Ok(f) => f,
            Err(e) => {
                self.free_command_buffers(&[cmd]);
                return Err(e);
            }
        };

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        let submitted = self
            .begin_commands(cmd, true)
            .and_then(|()| {
                self.ctx
                    .device
                    .cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region));
                self.end_commands(cmd)
            })
            .and_then(|()| self.submit(cmd, None, None, Some(fence)));
        if let Err(e) = submitted {
            self.free_command_buffers(&[cmd]);
            self.destroy_fence(fence);
            return Err(e);
        }

        self.wait_fence(fence, u64::MAX)?;
        self.free_command_buffers(&[cmd]);
        self.destroy_fence(fence);
        Ok(())
    }
}

impl Drop for VkDevice {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();
            for (image, mem) in self.attachment_memory.drain() {
                self.ctx.device.destroy_image(image, None);
                self.ctx.device.free_memory(mem, None);
            }
            self.ctx.destroy();
        }
    }
}

impl Device for VkDevice {
    type Fence = vk::Fence;
    type Semaphore = vk::Semaphore;
    type CommandBuffer = vk::CommandBuffer;
    type Image = vk::Image;
    type ImageView = vk::ImageView;
    type Framebuffer = vk::Framebuffer;
    type RenderPass = vk::RenderPass;
    type Swapchain = vk::SwapchainKHR;
    type Buffer = vk::Buffer;
    type Format = vk::Format;
    type Pipeline = vk::Pipeline;
    type PipelineLayout = vk::PipelineLayout;
    type DescriptorSet = vk::DescriptorSet;

    fn create_fence(&mut self, signaled: bool) -> RenderResult<vk::Fence> {
        let ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        unsafe { self.ctx.device.create_fence(&ci, None) }.map_err(vk_err("create_fence"))
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        unsafe { self.ctx.device.destroy_fence(fence, None) }
    }

    fn wait_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> RenderResult<()> {
        match unsafe { self.ctx.device.wait_for_fences(&[fence], true, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(RenderError::FenceTimeout { timeout_ns }),
            Err(e) => Err(vk_err("wait_for_fences")(e)),
        }
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> RenderResult<()> {
        unsafe { self.ctx.device.reset_fences(&[fence]) }.map_err(vk_err("reset_fences"))
    }

    fn create_semaphore(&mut self) -> RenderResult<vk::Semaphore> {
        let ci = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        unsafe { self.ctx.device.create_semaphore(&ci, None) }.map_err(vk_err("create_semaphore"))
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        unsafe { self.ctx.device.destroy_semaphore(semaphore, None) }
    }

    fn wait_idle(&mut self) -> RenderResult<()> {
        unsafe { self.ctx.device.device_wait_idle() }.map_err(vk_err("device_wait_idle"))
    }

    fn update_surface_info(&mut self) -> RenderResult<SurfaceInfo<vk::Format>> {
        let (caps, formats) = unsafe {
            let caps = self
                .ctx
                .surface_loader
                .get_physical_device_surface_capabilities(self.ctx.phys, self.ctx.surface)
                .map_err(vk_err("get_physical_device_surface_capabilities"))?;
            let formats = self
                .ctx
                .surface_loader
                .get_physical_device_surface_formats(self.ctx.phys, self.ctx.surface)
                .map_err(vk_err("get_physical_device_surface_formats"))?;
            (caps, formats)
        };
        let format = choose_surface_format(&formats)
            .ok_or_else(|| RenderError::Presentation("surface reports no formats".into()))?;
        if format != self.surface_format {
            debug!(format = ?format.format, color_space = ?format.color_space, "surface format");
        }
        self.caps = caps;
        self.surface_format = format;

        let extent = choose_extent(&caps, self.size_hint);
        Ok(SurfaceInfo {
            extent: Extent::new(extent.width, extent.height),
            color_format: format.format,
            depth_format: self.ctx.depth_format,
            min_image_count: choose_image_count(&caps),
        })
    }

    fn create_swapchain(
        &mut self,
        info: &SurfaceInfo<vk::Format>,
        present_mode: PresentMode,
    ) -> RenderResult<(vk::SwapchainKHR, Vec<vk::Image>)> {
        let modes = unsafe {
            self.ctx
                .surface_loader
                .get_physical_device_surface_present_modes(self.ctx.phys, self.ctx.surface)
        }
        .map_err(vk_err("get_physical_device_surface_present_modes"))?;
        let mode = choose_present_mode(&modes, present_mode);
        if mode != convert::present_mode(present_mode) {
            info!(
                wanted = ?present_mode,
                using = present_mode_name(mode),
                "present mode unavailable; falling back"
            );
        }

        let families = [self.ctx.graphics_family, self.ctx.present_family];
        let (sharing, family_count) = if families[0] != families[1] {
            (vk::SharingMode::CONCURRENT, 2)
        } else {
            (vk::SharingMode::EXCLUSIVE, 0)
        };
        let composite_alpha = if self
            .caps
            .supported_composite_alpha
            .contains(vk::CompositeAlphaFlagsKHR::OPAQUE)
        {
            vk::CompositeAlphaFlagsKHR::OPAQUE
        } else {
            vk::CompositeAlphaFlagsKHR::INHERIT
        };

        let ci = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: self.ctx.surface,
            min_image_count: info.min_image_count,
            image_format: info.color_format,
            image_color_space: self.surface_format.color_space,
            image_extent: convert::extent(info.extent),
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing,
            queue_family_index_count: family_count,
            p_queue_family_indices: families.as_ptr(),
            pre_transform: self.caps.current_transform,
            composite_alpha,
            present_mode: mode,
            clipped: vk::TRUE,
            // The previous generation is always destroyed before this one is built.
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };

        unsafe {
            let swapchain = self
                .ctx
                .swapchain_loader
                .create_swapchain(&ci, None)
                .map_err(vk_err("create_swapchain"))?;
            match self.ctx.swapchain_loader.get_swapchain_images(swapchain) {
                Ok(images) => Ok((swapchain, images)),
                Err(e) => {
                    self.ctx.swapchain_loader.destroy_swapchain(swapchain, None);
                    Err(vk_err("get_swapchain_images")(e))
                }
            }
        }
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        unsafe { self.ctx.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn create_image_view(
        &mut self,
        image: vk::Image,
        format: vk::Format,
        aspect: Aspect,
    ) -> RenderResult<vk::ImageView> {
        let ci = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            subresource_range: convert::subresource_range(SubresourceRange::single(aspect)),
            ..Default::default()
        };
        unsafe { self.ctx.device.create_image_view(&ci, None) }.map_err(vk_err("create_image_view"))
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        unsafe { self.ctx.device.destroy_image_view(view, None) }
    }

    fn create_attachment_image(
        &mut self,
        format: vk::Format,
        extent: Extent,
        aspect: Aspect,
    ) -> RenderResult<vk::Image> {
        let usage = if aspect.intersects(Aspect::DEPTH | Aspect::STENCIL) {
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            vk::ImageUsageFlags::COLOR_ATTACHMENT
        };
        let (image, mem) = unsafe {
            memory::create_image_and_memory(
                &self.ctx.instance,
                &self.ctx.device,
                self.ctx.phys,
                format,
                convert::extent(extent),
                usage,
            )?
        };
        self.attachment_memory.insert(image, mem);
        Ok(image)
    }

    fn destroy_image(&mut self, image: vk::Image) {
        unsafe {
            self.ctx.device.destroy_image(image, None);
            if let Some(mem) = self.attachment_memory.remove(&image) {
                self.ctx.device.free_memory(mem, None);
            }
        }
    }

    fn create_render_pass(
        &mut self,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> RenderResult<vk::RenderPass> {
        let attachments = [
            vk::AttachmentDescription {
                format: color_format,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                ..Default::default()
            },
            vk::AttachmentDescription {
                format: depth_format,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                ..Default::default()
            },
        ];
        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &color_ref,
            p_depth_stencil_attachment: &depth_ref,
            ..Default::default()
        };
        // Orders our attachment writes after the presentation engine's read
        // that the acquire semaphore guards.
        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: stages,
            dst_stage_mask: stages,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ..Default::default()
        };
        let ci = vk::RenderPassCreateInfo {
            s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: 1,
            p_dependencies: &dependency,
            ..Default::default()
        };
        unsafe { self.ctx.device.create_render_pass(&ci, None) }
            .map_err(vk_err("create_render_pass"))
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        unsafe { self.ctx.device.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: Extent,
    ) -> RenderResult<vk::Framebuffer> {
        let ci = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass,
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            width: extent.width,
            height: extent.height,
            layers: 1,
            ..Default::default()
        };
        unsafe { self.ctx.device.create_framebuffer(&ci, None) }
            .map_err(vk_err("create_framebuffer"))
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        unsafe { self.ctx.device.destroy_framebuffer(framebuffer, None) }
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> RenderResult<(u32, PresentStatus)> {
        let acquired = unsafe {
            self.ctx.swapchain_loader.acquire_next_image(
                swapchain,
                u64::MAX,
                signal,
                vk::Fence::null(),
            )
        };
        match acquired {
            Ok((index, false)) => Ok((index, PresentStatus::Optimal)),
            Ok((index, true)) => Ok((index, PresentStatus::Suboptimal)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok((0, PresentStatus::OutOfDate)),
            Err(e) => Err(vk_err("acquire_next_image")(e)),
        }
    }

    fn present(
        &mut self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RenderResult<PresentStatus> {
        let info = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        match unsafe {
            self.ctx
                .swapchain_loader
                .queue_present(self.ctx.present_queue, &info)
        } {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(vk::Result::ERROR_DEVICE_LOST) => Err(RenderError::DeviceLost),
            Err(e) => Err(RenderError::Presentation(e.to_string())),
        }
    }

    fn allocate_command_buffers(&mut self, count: usize) -> RenderResult<Vec<vk::CommandBuffer>> {
        let ai = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.ctx.cmd_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count as u32,
            ..Default::default()
        };
        unsafe { self.ctx.device.allocate_command_buffers(&ai) }
            .map_err(vk_err("allocate_command_buffers"))
    }

    fn free_command_buffers(&mut self, buffers: &[vk::CommandBuffer]) {
        unsafe {
            self.ctx
                .device
                .free_command_buffers(self.ctx.cmd_pool, buffers)
        }
    }

    fn begin_commands(&mut self, cmd: vk::CommandBuffer, one_time: bool) -> RenderResult<()> {
        let bi = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: if one_time {
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
            } else {
                vk::CommandBufferUsageFlags::empty()
            },
            ..Default::default()
        };
        unsafe { self.ctx.device.begin_command_buffer(cmd, &bi) }
            .map_err(vk_err("begin_command_buffer"))
    }

    fn end_commands(&mut self, cmd: vk::CommandBuffer) -> RenderResult<()> {
        unsafe { self.ctx.device.end_command_buffer(cmd) }.map_err(vk_err("end_command_buffer"))
    }

    fn cmd_begin_render_pass(
        &mut self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: Extent,
        clear: ClearValues,
    ) {
        let clears = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear.color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: clear.depth,
                    stencil: clear.stencil,
                },
            },
        ];
        let bi = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass,
            framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: convert::extent(extent),
            },
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.ctx
                .device
                .cmd_begin_render_pass(cmd, &bi, vk::SubpassContents::INLINE)
        }
    }

    fn cmd_end_render_pass(&mut self, cmd: vk::CommandBuffer) {
        unsafe { self.ctx.device.cmd_end_render_pass(cmd) }
    }

    fn cmd_bind_pipeline(&mut self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.ctx
                .device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        }
    }

    fn cmd_bind_descriptor_set(
        &mut self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        unsafe {
            self.ctx.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            )
        }
    }

    fn cmd_bind_vertex_buffer(&mut self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe { self.ctx.device.cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[0]) }
    }

    /// Indices are always `u32`.
    fn cmd_bind_index_buffer(&mut self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe {
            self.ctx
                .device
                .cmd_bind_index_buffer(cmd, buffer, 0, vk::IndexType::UINT32)
        }
    }

    fn cmd_draw(&mut self, cmd: vk::CommandBuffer, draw: DrawCall) {
        unsafe {
            match draw {
                DrawCall::Indexed {
                    index_count,
                    instance_count,
                } => self
                    .ctx
                    .device
                    .cmd_draw_indexed(cmd, index_count, instance_count, 0, 0, 0),
                DrawCall::NonIndexed {
                    vertex_count,
                    instance_count,
                } => self
                    .ctx
                    .device
                    .cmd_draw(cmd, vertex_count, instance_count, 0, 0),
            }
        }
    }

    fn cmd_image_barrier(
        &mut self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        range: SubresourceRange,
        old: ImageLayout,
        new: ImageLayout,
        masks: TransitionMasks,
    ) {
        let barrier = vk::ImageMemoryBarrier {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
            src_access_mask: convert::access(masks.src_access),
            dst_access_mask: convert::access(masks.dst_access),
            old_layout: convert::layout(old),
            new_layout: convert::layout(new),
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image,
            subresource_range: convert::subresource_range(range),
            ..Default::default()
        };
        unsafe {
            self.ctx.device.cmd_pipeline_barrier(
                cmd,
                convert::stage(masks.src_stage),
                convert::stage(masks.dst_stage),
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(&barrier),
            )
        }
    }

    fn cmd_copy_buffer_to_image(
        &mut self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        image: vk::Image,
        range: SubresourceRange,
        extent: Extent,
    ) {
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: convert::subresource_layers(range),
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
        };
        unsafe {
            self.ctx.device.cmd_copy_buffer_to_image(
                cmd,
                buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&region),
            )
        }
    }

    fn submit(
        &mut self,
        cmd: vk::CommandBuffer,
        wait: Option<(vk::Semaphore, StageFlags)>,
        signal: Option<vk::Semaphore>,
        fence: Option<vk::Fence>,
    ) -> RenderResult<()> {
        let (wait_sems, wait_stages): (Vec<_>, Vec<_>) = wait
            .map(|(sem, stage)| (sem, convert::stage(stage)))
            .into_iter()
            .unzip();
        let signal_sems: Vec<_> = signal.into_iter().collect();

        let si = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: wait_sems.len() as u32,
            p_wait_semaphores: wait_sems.as_ptr(),
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: signal_sems.len() as u32,
            p_signal_semaphores: signal_sems.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.ctx.device.queue_submit(
                self.ctx.graphics_queue,
                std::slice::from_ref(&si),
                fence.unwrap_or(vk::Fence::null()),
            )
        }
        .map_err(vk_err("queue_submit"))
    }
}
