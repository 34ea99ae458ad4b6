// SPDX-License-Identifier: CEPL-1.0
//! Core enums and flags to their `ash` equivalents.

use ash::vk;
use neowater_render::{AccessFlags, Aspect, Extent, ImageLayout, PresentMode, StageFlags, SubresourceRange};

pub fn layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub fn access(flags: AccessFlags) -> vk::AccessFlags {
    const TABLE: [(AccessFlags, vk::AccessFlags); 8] = [
        (AccessFlags::TRANSFER_READ, vk::AccessFlags::TRANSFER_READ),
        (AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_WRITE),
        (AccessFlags::SHADER_READ, vk::AccessFlags::SHADER_READ),
        (AccessFlags::SHADER_WRITE, vk::AccessFlags::SHADER_WRITE),
        (AccessFlags::COLOR_ATTACHMENT_READ, vk::AccessFlags::COLOR_ATTACHMENT_READ),
        (AccessFlags::COLOR_ATTACHMENT_WRITE, vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
        (
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
        ),
        (
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
    ];
    TABLE
        .iter()
        .filter(|(ours, _)| flags.contains(*ours))
        .fold(vk::AccessFlags::empty(), |acc, (_, theirs)| acc | *theirs)
}

pub fn stage(flags: StageFlags) -> vk::PipelineStageFlags {
    const TABLE: [(StageFlags, vk::PipelineStageFlags); 9] = [
        (StageFlags::TOP_OF_PIPE, vk::PipelineStageFlags::TOP_OF_PIPE),
        (StageFlags::TRANSFER, vk::PipelineStageFlags::TRANSFER),
        (StageFlags::VERTEX_SHADER, vk::PipelineStageFlags::VERTEX_SHADER),
        (StageFlags::FRAGMENT_SHADER, vk::PipelineStageFlags::FRAGMENT_SHADER),
        (StageFlags::COMPUTE_SHADER, vk::PipelineStageFlags::COMPUTE_SHADER),
        (StageFlags::EARLY_FRAGMENT_TESTS, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS),
        (StageFlags::LATE_FRAGMENT_TESTS, vk::PipelineStageFlags::LATE_FRAGMENT_TESTS),
        (
            StageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        (StageFlags::BOTTOM_OF_PIPE, vk::PipelineStageFlags::BOTTOM_OF_PIPE),
    ];
    TABLE
        .iter()
        .filter(|(ours, _)| flags.contains(*ours))
        .fold(vk::PipelineStageFlags::empty(), |acc, (_, theirs)| acc | *theirs)
}

pub fn aspect(aspect: Aspect) -> vk::ImageAspectFlags {
    let mut flags = vk::ImageAspectFlags::empty();
    if aspect.contains(Aspect::COLOR) {
        flags |= vk::ImageAspectFlags::COLOR;
    }
    if aspect.contains(Aspect::DEPTH) {
        flags |= vk::ImageAspectFlags::DEPTH;
    }
    if aspect.contains(Aspect::STENCIL) {
        flags |= vk::ImageAspectFlags::STENCIL;
    }
    flags
}

pub fn subresource_range(range: SubresourceRange) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect(range.aspect),
        base_mip_level: range.base_mip_level,
        level_count: range.level_count,
        base_array_layer: range.base_array_layer,
        layer_count: range.layer_count,
    }
}

pub fn subresource_layers(range: SubresourceRange) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: aspect(range.aspect),
        mip_level: range.base_mip_level,
        base_array_layer: range.base_array_layer,
        layer_count: range.layer_count,
    }
}

pub fn extent(e: Extent) -> vk::Extent2D {
    vk::Extent2D {
        width: e.width,
        height: e.height,
    }
}

pub fn present_mode(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neowater_render::transition_masks;

    #[test]
    fn upload_barrier_masks_map_one_to_one() {
        let m = transition_masks(ImageLayout::TransferDst, ImageLayout::ShaderReadOnly).unwrap();
        assert_eq!(access(m.src_access), vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(access(m.dst_access), vk::AccessFlags::SHADER_READ);
        assert_eq!(stage(m.src_stage), vk::PipelineStageFlags::TRANSFER);
        assert_eq!(stage(m.dst_stage), vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn combined_flags_keep_every_bit() {
        let s = stage(StageFlags::COMPUTE_SHADER | StageFlags::FRAGMENT_SHADER);
        assert_eq!(
            s,
            vk::PipelineStageFlags::COMPUTE_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER
        );
        assert!(access(AccessFlags::empty()).is_empty());
        assert_eq!(
            aspect(Aspect::DEPTH | Aspect::STENCIL),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn every_layout_has_a_distinct_vk_layout() {
        let mapped: Vec<_> = ImageLayout::ALL.iter().map(|l| layout(*l)).collect();
        for (i, a) in mapped.iter().enumerate() {
            for b in &mapped[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(layout(ImageLayout::Undefined), vk::ImageLayout::UNDEFINED);
    }
}
