// SPDX-License-Identifier: CEPL-1.0
use crate::device::{Device, Extent};
use crate::error::{RenderError, RenderResult};
use crate::recorder::DrawCall;

/// The swapchain-dependent objects a pipeline is built against.
pub struct RenderTarget<D: Device> {
    pub generation: u64,
    pub render_pass: D::RenderPass,
    pub extent: Extent,
    pub image_count: usize,
    pub color_format: D::Format,
    pub depth_format: D::Format,
}

/// Everything the recorder binds before its single draw.
pub struct DrawBindings<D: Device> {
    pub pipeline: D::Pipeline,
    pub layout: D::PipelineLayout,
    /// Empty, one set shared by every image, or exactly one per swapchain image.
    pub descriptor_sets: Vec<D::DescriptorSet>,
    pub vertex_buffer: Option<D::Buffer>,
    pub index_buffer: Option<D::Buffer>,
    pub draw: DrawCall,
}

impl<D: Device> DrawBindings<D> {
    pub fn descriptor_set_for(&self, image_index: usize) -> Option<D::DescriptorSet> {
        match self.descriptor_sets.len() {
            0 => None,
            1 => Some(self.descriptor_sets[0]),
            _ => self.descriptor_sets.get(image_index).copied(),
        }
    }

    pub fn validate(&self, image_count: usize) -> RenderResult<()> {
        let sets = self.descriptor_sets.len();
        if sets > 1 && sets != image_count {
            return Err(RenderError::InvalidConfig(format!(
                "{sets} descriptor sets for {image_count} swapchain images"
            )));
        }
        if matches!(self.draw, DrawCall::Indexed { .. }) && self.index_buffer.is_none() {
            return Err(RenderError::InvalidConfig(
                "indexed draw without an index buffer".into(),
            ));
        }
        Ok(())
    }
}

/// Supplies a ready-to-bind pipeline for each swapchain generation.
///
/// `build` is called after the new generation's render pass and framebuffers
/// exist; `destroy` is called after a device-idle wait, before the render
/// pass goes away. `release` frees whatever the provider keeps across
/// generations; its owner calls it once no generation is left.
pub trait PipelineProvider<D: Device> {
    fn build(&mut self, device: &mut D, target: &RenderTarget<D>) -> RenderResult<DrawBindings<D>>;
    fn destroy(&mut self, device: &mut D, bindings: DrawBindings<D>);
    fn release(&mut self, _device: &mut D) {}
}
