// SPDX-License-Identifier: CEPL-1.0
//! Image layout tracking and the fixed table of legal upload transitions.
//!
//! An [`ImageResource`] remembers the last layout a barrier moved it to. The
//! only way to change that layout is [`ImageResource::transition`], which
//! looks the `(old, new)` pair up in [`transition_masks`], records the
//! barrier and updates the tracked layout in the same call. Pairs outside the
//! table are rejected before anything is recorded.

use bitflags::bitflags;

use crate::device::{Device, Extent};
use crate::error::{RenderError, RenderResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    General,
    TransferSrc,
    TransferDst,
    ShaderReadOnly,
    ColorAttachment,
    DepthStencilAttachment,
    PresentSrc,
}

impl ImageLayout {
    pub const ALL: [ImageLayout; 8] = [
        ImageLayout::Undefined,
        ImageLayout::General,
        ImageLayout::TransferSrc,
        ImageLayout::TransferDst,
        ImageLayout::ShaderReadOnly,
        ImageLayout::ColorAttachment,
        ImageLayout::DepthStencilAttachment,
        ImageLayout::PresentSrc,
    ];
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const TRANSFER_READ = 1 << 0;
        const TRANSFER_WRITE = 1 << 1;
        const SHADER_READ = 1 << 2;
        const SHADER_WRITE = 1 << 3;
        const COLOR_ATTACHMENT_READ = 1 << 4;
        const COLOR_ATTACHMENT_WRITE = 1 << 5;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 6;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 7;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct StageFlags: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const TRANSFER = 1 << 1;
        const VERTEX_SHADER = 1 << 2;
        const FRAGMENT_SHADER = 1 << 3;
        const COMPUTE_SHADER = 1 << 4;
        const EARLY_FRAGMENT_TESTS = 1 << 5;
        const LATE_FRAGMENT_TESTS = 1 << 6;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 7;
        const BOTTOM_OF_PIPE = 1 << 8;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Aspect: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Source/destination scopes of one layout barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub src_stage: StageFlags,
    pub dst_stage: StageFlags,
}

/// Barrier scopes for a legal `(old, new)` pair.
pub fn transition_masks(old: ImageLayout, new: ImageLayout) -> RenderResult<TransitionMasks> {
    use ImageLayout as L;

    let masks = match (old, new) {
        (L::Undefined, L::TransferDst) => TransitionMasks {
            src_access: AccessFlags::empty(),
            dst_access: AccessFlags::TRANSFER_WRITE,
            src_stage: StageFlags::TOP_OF_PIPE,
            dst_stage: StageFlags::TRANSFER,
        },
        (L::Undefined, L::General) => TransitionMasks {
            src_access: AccessFlags::empty(),
            dst_access: AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE,
            src_stage: StageFlags::TOP_OF_PIPE,
            dst_stage: StageFlags::COMPUTE_SHADER | StageFlags::FRAGMENT_SHADER,
        },
        (L::TransferDst, L::General) => TransitionMasks {
            src_access: AccessFlags::TRANSFER_WRITE,
            dst_access: AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE,
            src_stage: StageFlags::TRANSFER,
            dst_stage: StageFlags::COMPUTE_SHADER | StageFlags::FRAGMENT_SHADER,
        },
        (L::TransferDst, L::TransferSrc) => TransitionMasks {
            src_access: AccessFlags::TRANSFER_WRITE,
            dst_access: AccessFlags::TRANSFER_READ,
            src_stage: StageFlags::TRANSFER,
            dst_stage: StageFlags::TRANSFER,
        },
        (L::TransferDst, L::ShaderReadOnly) => TransitionMasks {
            src_access: AccessFlags::TRANSFER_WRITE,
            dst_access: AccessFlags::SHADER_READ,
            src_stage: StageFlags::TRANSFER,
            dst_stage: StageFlags::FRAGMENT_SHADER,
        },
        (from, to) => return Err(RenderError::UnsupportedTransition { from, to }),
    };
    Ok(masks)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubresourceRange {
    pub aspect: Aspect,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

impl SubresourceRange {
    pub const fn single(aspect: Aspect) -> Self {
        Self {
            aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

/// A GPU image plus the CPU-side record of its current layout.
#[derive(Debug)]
pub struct ImageResource<I> {
    image: I,
    layout: ImageLayout,
    range: SubresourceRange,
    extent: Extent,
}

impl<I: Copy> ImageResource<I> {
    /// Wraps a freshly created image; its contents are undefined.
    pub fn new(image: I, range: SubresourceRange, extent: Extent) -> Self {
        Self {
            image,
            layout: ImageLayout::Undefined,
            range,
            extent,
        }
    }

    pub fn image(&self) -> I {
        self.image
    }

    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub fn range(&self) -> SubresourceRange {
        self.range
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Records a layout barrier into `cmd` and updates the tracked layout.
    ///
    /// An illegal pair leaves both the command buffer and the tracked layout
    /// untouched.
    pub fn transition<D>(
        &mut self,
        device: &mut D,
        cmd: D::CommandBuffer,
        new: ImageLayout,
    ) -> RenderResult<()>
    where
        D: Device<Image = I>,
    {
        let masks = transition_masks(self.layout, new)?;
        device.cmd_image_barrier(cmd, self.image, self.range, self.layout, new, masks);
        tracing::trace!(from = ?self.layout, to = ?new, "image layout transition");
        self.layout = new;
        Ok(())
    }
}
