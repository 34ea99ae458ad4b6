// SPDX-License-Identifier: CEPL-1.0
//! Static per-image command buffers.
//!
//! One primary buffer per swapchain image, recorded once right after a
//! generation is built and never touched again until the next rebuild.

use tracing::debug;

use crate::device::Device;
use crate::error::{RenderError, RenderResult};
use crate::pipeline::DrawBindings;
use crate::swapchain::Generation;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
            stencil: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawCall {
    Indexed {
        index_count: u32,
        instance_count: u32,
    },
    NonIndexed {
        vertex_count: u32,
        instance_count: u32,
    },
}

pub struct CommandRecorder<D: Device> {
    buffers: Vec<D::CommandBuffer>,
    generation: Option<u64>,
    clear: ClearValues,
}

impl<D: Device> CommandRecorder<D> {
    pub fn new(clear: ClearValues) -> Self {
        Self {
            buffers: Vec::new(),
            generation: None,
            clear,
        }
    }

    pub fn clear_values(&self) -> ClearValues {
        self.clear
    }

    /// Takes effect at the next [`record`](Self::record).
    pub fn set_clear_values(&mut self, clear: ClearValues) {
        self.clear = clear;
    }

    /// Generation the current set was recorded for.
    pub fn recorded_generation(&self) -> Option<u64> {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn buffer(&self, image_index: usize) -> RenderResult<D::CommandBuffer> {
        self.buffers
            .get(image_index)
            .copied()
            .ok_or(RenderError::NotRecorded { index: image_index })
    }

    /// Records the whole set for `generation`. A set that fails half way is
    /// freed, never left behind for submission.
    pub fn record(
        &mut self,
        device: &mut D,
        generation: &Generation<D>,
        bindings: &DrawBindings<D>,
    ) -> RenderResult<()> {
        if !self.buffers.is_empty() {
            // Left over from a generation that is already torn down.
            self.release(device);
        }
        bindings.validate(generation.len())?;

        let buffers = device.allocate_command_buffers(generation.len())?;
        for (i, &cmd) in buffers.iter().enumerate() {
            if let Err(e) = self.record_one(device, cmd, generation, bindings, i) {
                device.free_command_buffers(&buffers);
                return Err(e);
            }
        }

        debug!(
            generation = generation.id(),
            count = buffers.len(),
            "recorded command buffers"
        );
        self.buffers = buffers;
        self.generation = Some(generation.id());
        Ok(())
    }

    fn record_one(
        &self,
        device: &mut D,
        cmd: D::CommandBuffer,
        generation: &Generation<D>,
        bindings: &DrawBindings<D>,
        image_index: usize,
    ) -> RenderResult<()> {
        let framebuffer = generation
            .framebuffer(image_index)
            .ok_or(RenderError::NotRecorded { index: image_index })?;

        device.begin_commands(cmd, false)?;
        device.cmd_begin_render_pass(
            cmd,
            generation.render_pass(),
            framebuffer,
            generation.extent(),
            self.clear,
        );

        if let Some(set) = bindings.descriptor_set_for(image_index) {
            device.cmd_bind_descriptor_set(cmd, bindings.layout, set);
        }
        if let Some(vb) = bindings.vertex_buffer {
            device.cmd_bind_vertex_buffer(cmd, vb);
        }
        if let Some(ib) = bindings.index_buffer {
            device.cmd_bind_index_buffer(cmd, ib);
        }
        device.cmd_bind_pipeline(cmd, bindings.pipeline);
        device.cmd_draw(cmd, bindings.draw);

        device.cmd_end_render_pass(cmd);
        device.end_commands(cmd)
    }

    /// Frees the set. Only call once the GPU is done with it.
    pub fn release(&mut self, device: &mut D) {
        if !self.buffers.is_empty() {
            device.free_command_buffers(&self.buffers);
            self.buffers.clear();
        }
        self.generation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Extent, PresentMode};
    use crate::mock::{MockCommand, MockDevice, MockPipeline};
    use crate::pipeline::PipelineProvider;
    use crate::swapchain::SwapchainManager;

    fn setup(images: u32) -> (MockDevice, SwapchainManager<MockDevice>, MockPipeline) {
        let mut dev = MockDevice::new(Extent::new(800, 600), images);
        let mut sc = SwapchainManager::new(PresentMode::Fifo);
        assert!(sc.build(&mut dev).unwrap());
        let pipe = MockPipeline::new(&mut dev);
        (dev, sc, pipe)
    }

    #[test]
    fn records_one_buffer_per_image_against_its_framebuffer() {
        let (mut dev, sc, mut pipe) = setup(3);
        let gen = sc.generation().unwrap();
        let bindings = pipe.build(&mut dev, &gen.render_target()).unwrap();

        let clear = ClearValues {
            color: [0.1, 0.2, 0.3, 1.0],
            ..ClearValues::default()
        };
        let mut rec = CommandRecorder::new(clear);
        rec.record(&mut dev, gen, &bindings).unwrap();
        assert_eq!(rec.len(), 3);
        assert_eq!(rec.recorded_generation(), Some(gen.id()));

        for i in 0..3 {
            let cmds = dev.commands(rec.buffer(i).unwrap());
            assert_eq!(cmds.first(), Some(&MockCommand::Begin { one_time: false }));
            assert_eq!(cmds.last(), Some(&MockCommand::End));
            assert_eq!(
                cmds[1],
                MockCommand::BeginRenderPass {
                    render_pass: gen.render_pass(),
                    framebuffer: gen.framebuffer(i).unwrap(),
                    extent: Extent::new(800, 600),
                    clear,
                }
            );
            assert!(cmds.contains(&MockCommand::BindDescriptorSet {
                layout: bindings.layout,
                set: bindings.descriptor_sets[i],
            }));
            let draws = cmds.iter().filter(|c| matches!(c, MockCommand::Draw(_))).count();
            assert_eq!(draws, 1);
            assert_eq!(cmds[cmds.len() - 2], MockCommand::EndRenderPass);
        }
    }

    #[test]
    fn mismatched_descriptor_sets_fail_without_leaking_buffers() {
        let (mut dev, sc, mut pipe) = setup(3);
        let gen = sc.generation().unwrap();
        let mut bindings = pipe.build(&mut dev, &gen.render_target()).unwrap();
        bindings.descriptor_sets.truncate(2);

        let before = dev.live_of(crate::mock::Kind::CommandBuffer).len();
        let mut rec = CommandRecorder::new(ClearValues::default());
        let err = rec.record(&mut dev, gen, &bindings).unwrap_err();
        assert!(matches!(err, RenderError::InvalidConfig(_)));
        assert!(rec.is_empty());
        assert_eq!(dev.live_of(crate::mock::Kind::CommandBuffer).len(), before);
        assert!(matches!(rec.buffer(0), Err(RenderError::NotRecorded { index: 0 })));
    }

    #[test]
    fn non_indexed_draw_skips_index_binding() {
        let (mut dev, sc, mut pipe) = setup(2);
        let gen = sc.generation().unwrap();
        let mut bindings = pipe.build(&mut dev, &gen.render_target()).unwrap();
        bindings.index_buffer = None;
        bindings.draw = DrawCall::NonIndexed {
            vertex_count: 3,
            instance_count: 1,
        };

        let mut rec = CommandRecorder::new(ClearValues::default());
        rec.record(&mut dev, gen, &bindings).unwrap();
        let cmds = dev.commands(rec.buffer(1).unwrap());
        assert!(!cmds.iter().any(|c| matches!(c, MockCommand::BindIndexBuffer(_))));
        assert!(cmds.contains(&MockCommand::Draw(DrawCall::NonIndexed {
            vertex_count: 3,
            instance_count: 1
        })));
    }
}
