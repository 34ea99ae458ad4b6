// SPDX-License-Identifier: CEPL-1.0
//! Headless [`Device`] used by the unit tests.
//!
//! GPU work completes lazily: a submission only finishes when the CPU waits
//! on its fence (or on the whole device), and queue order is respected, so
//! any pacing bug shows up as too many outstanding submissions. Misuse that a
//! validation layer would flag panics immediately.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::device::{Device, Extent, PresentMode, PresentStatus, SurfaceInfo};
use crate::error::{RenderError, RenderResult};
use crate::layout::{Aspect, ImageLayout, StageFlags, SubresourceRange, TransitionMasks};
use crate::pipeline::{DrawBindings, PipelineProvider, RenderTarget};
use crate::recorder::{ClearValues, DrawCall};

pub const COLOR_FORMAT: u32 = 50;
pub const DEPTH_FORMAT: u32 = 126;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MockHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Fence,
    Semaphore,
    Swapchain,
    Image,
    ImageView,
    RenderPass,
    Framebuffer,
    CommandBuffer,
    Buffer,
    Pipeline,
    PipelineLayout,
    DescriptorSet,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Create(Kind, MockHandle),
    Destroy(Kind, MockHandle),
    WaitFence(MockHandle),
    ResetFence(MockHandle),
    WaitIdle,
    SurfaceQuery,
    Acquire { image: u32, status: PresentStatus },
    Submit { cmd: MockHandle, fence: Option<MockHandle> },
    Present { image: u32, status: PresentStatus },
}

#[derive(Clone, Debug, PartialEq)]
pub enum MockCommand {
    Begin { one_time: bool },
    End,
    BeginRenderPass {
        render_pass: MockHandle,
        framebuffer: MockHandle,
        extent: Extent,
        clear: ClearValues,
    },
    EndRenderPass,
    BindPipeline(MockHandle),
    BindDescriptorSet { layout: MockHandle, set: MockHandle },
    BindVertexBuffer(MockHandle),
    BindIndexBuffer(MockHandle),
    Draw(DrawCall),
    Barrier {
        image: MockHandle,
        old: ImageLayout,
        new: ImageLayout,
        masks: TransitionMasks,
    },
    CopyBufferToImage {
        buffer: MockHandle,
        image: MockHandle,
        extent: Extent,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    Pending,
}

struct MockSwapchain {
    extent: Extent,
    images: Vec<MockHandle>,
    next: u32,
}

struct PendingSubmit {
    cmd: MockHandle,
    fence: Option<MockHandle>,
}

pub struct MockDevice {
    next_id: u64,
    live: BTreeMap<MockHandle, Kind>,
    events: Vec<Event>,

    surface_extent: Extent,
    image_count: u32,
    swapchains: HashMap<MockHandle, MockSwapchain>,

    fences: HashMap<MockHandle, FenceState>,
    signaled_semaphores: HashSet<MockHandle>,
    pending: VecDeque<PendingSubmit>,
    max_outstanding: usize,

    commands: HashMap<MockHandle, Vec<MockCommand>>,
    recording: HashSet<MockHandle>,

    acquire_calls: usize,
    acquire_overrides: HashMap<usize, PresentStatus>,
    acquire_order: VecDeque<u32>,
    present_failure: Option<String>,
    hung: bool,
}

impl MockDevice {
    /// A device whose surface reports `extent` and hands out `image_count`
    /// swapchain images.
    pub fn new(extent: Extent, image_count: u32) -> Self {
        Self {
            next_id: 1,
            live: BTreeMap::new(),
            events: Vec::new(),
            surface_extent: extent,
            image_count,
            swapchains: HashMap::new(),
            fences: HashMap::new(),
            signaled_semaphores: HashSet::new(),
            pending: VecDeque::new(),
            max_outstanding: 0,
            commands: HashMap::new(),
            recording: HashSet::new(),
            acquire_calls: 0,
            acquire_overrides: HashMap::new(),
            acquire_order: VecDeque::new(),
            present_failure: None,
            hung: false,
        }
    }

    pub fn color_format(&self) -> u32 {
        COLOR_FORMAT
    }

    // --- scripting

    /// Simulates a window resize; the current swapchain goes out of date.
    pub fn resize_surface(&mut self, extent: Extent) {
        self.surface_extent = extent;
    }

    pub fn set_image_count(&mut self, count: u32) {
        self.image_count = count;
    }

    /// Makes the `call`-th (zero based) acquire report `status`.
    pub fn script_acquire(&mut self, call: usize, status: PresentStatus) {
        self.acquire_overrides.insert(call, status);
    }

    /// Forces the image indices handed out by subsequent acquires.
    pub fn script_acquire_order(&mut self, order: &[u32]) {
        self.acquire_order.extend(order.iter().copied());
    }

    pub fn fail_presents(&mut self, reason: &str) {
        self.present_failure = Some(reason.to_owned());
    }

    /// The GPU stops completing work.
    pub fn hang(&mut self) {
        self.hung = true;
    }

    // --- inspection

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn commands(&self, cmd: MockHandle) -> &[MockCommand] {
        self.commands.get(&cmd).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, handle: MockHandle) -> bool {
        self.live.contains_key(&handle)
    }

    pub fn live_of(&self, kind: Kind) -> Vec<MockHandle> {
        self.live
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(h, _)| *h)
            .collect()
    }

    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding
    }

    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    // --- internals

    pub fn create_object(&mut self, kind: Kind) -> MockHandle {
        let h = MockHandle(self.next_id);
        self.next_id += 1;
        self.live.insert(h, kind);
        self.events.push(Event::Create(kind, h));
        h
    }

    pub fn destroy_object(&mut self, kind: Kind, h: MockHandle) {
        match self.live.remove(&h) {
            Some(k) if k == kind => {}
            Some(k) => panic!("destroying {h:?} as {kind:?}, but it is a {k:?}"),
            None => panic!("double destroy or unknown {kind:?} {h:?}"),
        }
        if !matches!(kind, Kind::Fence | Kind::Semaphore | Kind::Buffer) && !self.pending.is_empty() {
            panic!("{kind:?} {h:?} destroyed while GPU work is still pending");
        }
        self.events.push(Event::Destroy(kind, h));
    }

    fn expect_live(&self, h: MockHandle, kind: Kind) {
        assert_eq!(self.live.get(&h), Some(&kind), "{h:?} is not a live {kind:?}");
    }

    fn push_cmd(&mut self, cmd: MockHandle, c: MockCommand) {
        assert!(self.recording.contains(&cmd), "{cmd:?} is not recording");
        self.commands.entry(cmd).or_default().push(c);
    }

    fn complete_through(&mut self, idx: usize) {
        for _ in 0..=idx {
            if let Some(done) = self.pending.pop_front() {
                if let Some(f) = done.fence {
                    self.fences.insert(f, FenceState::Signaled);
                }
            }
        }
    }
}

impl Device for MockDevice {
    type Fence = MockHandle;
    type Semaphore = MockHandle;
    type CommandBuffer = MockHandle;
    type Image = MockHandle;
    type ImageView = MockHandle;
    type Framebuffer = MockHandle;
    type RenderPass = MockHandle;
    type Swapchain = MockHandle;
    type Buffer = MockHandle;
    type Format = u32;
    type Pipeline = MockHandle;
    type PipelineLayout = MockHandle;
    type DescriptorSet = MockHandle;

    fn create_fence(&mut self, signaled: bool) -> RenderResult<MockHandle> {
        let h = self.create_object(Kind::Fence);
        let state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        self.fences.insert(h, state);
        Ok(h)
    }

    fn destroy_fence(&mut self, fence: MockHandle) {
        assert_ne!(
            self.fences.get(&fence),
            Some(&FenceState::Pending),
            "destroying pending fence"
        );
        self.fences.remove(&fence);
        self.destroy_object(Kind::Fence, fence);
    }

    fn wait_fence(&mut self, fence: MockHandle, timeout_ns: u64) -> RenderResult<()> {
        self.expect_live(fence, Kind::Fence);
        self.events.push(Event::WaitFence(fence));
        let state = self.fences[&fence];
        match state {
            FenceState::Signaled => Ok(()),
            FenceState::Pending if !self.hung => {
                let idx = self
                    .pending
                    .iter()
                    .position(|p| p.fence == Some(fence))
                    .expect("pending fence without submission");
                self.complete_through(idx);
                Ok(())
            }
            _ if timeout_ns == u64::MAX => panic!("wait on {fence:?} would block forever"),
            _ => Err(RenderError::FenceTimeout { timeout_ns }),
        }
    }

    fn reset_fence(&mut self, fence: MockHandle) -> RenderResult<()> {
        self.expect_live(fence, Kind::Fence);
        assert_ne!(self.fences[&fence], FenceState::Pending, "reset of pending fence");
        self.events.push(Event::ResetFence(fence));
        self.fences.insert(fence, FenceState::Unsignaled);
        Ok(())
    }

    fn create_semaphore(&mut self) -> RenderResult<MockHandle> {
        Ok(self.create_object(Kind::Semaphore))
    }

    fn destroy_semaphore(&mut self, semaphore: MockHandle) {
        self.signaled_semaphores.remove(&semaphore);
        self.destroy_object(Kind::Semaphore, semaphore);
    }

    fn wait_idle(&mut self) -> RenderResult<()> {
        if self.hung && !self.pending.is_empty() {
            return Err(RenderError::DeviceLost);
        }
        self.events.push(Event::WaitIdle);
        if !self.pending.is_empty() {
            self.complete_through(self.pending.len() - 1);
        }
        Ok(())
    }

    fn update_surface_info(&mut self) -> RenderResult<SurfaceInfo<u32>> {
        self.events.push(Event::SurfaceQuery);
        Ok(SurfaceInfo {
            extent: self.surface_extent,
            color_format: COLOR_FORMAT,
            depth_format: DEPTH_FORMAT,
            min_image_count: self.image_count,
        })
    }

    fn create_swapchain(
        &mut self,
        info: &SurfaceInfo<u32>,
        _present_mode: PresentMode,
    ) -> RenderResult<(MockHandle, Vec<MockHandle>)> {
        assert!(!info.extent.is_empty(), "swapchain with zero extent");
        let sc = self.create_object(Kind::Swapchain);
        // Presentable images belong to the swapchain, not to the caller.
        let images = (0..self.image_count)
            .map(|_| {
                let h = MockHandle(self.next_id);
                self.next_id += 1;
                h
            })
            .collect::<Vec<_>>();
        self.swapchains.insert(
            sc,
            MockSwapchain {
                extent: info.extent,
                images: images.clone(),
                next: 0,
            },
        );
        Ok((sc, images))
    }

    fn destroy_swapchain(&mut self, swapchain: MockHandle) {
        self.swapchains.remove(&swapchain);
        self.destroy_object(Kind::Swapchain, swapchain);
    }

    fn create_image_view(
        &mut self,
        image: MockHandle,
        _format: u32,
        _aspect: Aspect,
    ) -> RenderResult<MockHandle> {
        let owned = self.live.get(&image) == Some(&Kind::Image);
        let presentable = self.swapchains.values().any(|s| s.images.contains(&image));
        assert!(owned || presentable, "view of unknown image {image:?}");
        Ok(self.create_object(Kind::ImageView))
    }

    fn destroy_image_view(&mut self, view: MockHandle) {
        self.destroy_object(Kind::ImageView, view);
    }

    fn create_attachment_image(
        &mut self,
        _format: u32,
        extent: Extent,
        _aspect: Aspect,
    ) -> RenderResult<MockHandle> {
        assert!(!extent.is_empty());
        Ok(self.create_object(Kind::Image))
    }

    fn destroy_image(&mut self, image: MockHandle) {
        self.destroy_object(Kind::Image, image);
    }

    fn create_render_pass(&mut self, _color: u32, _depth: u32) -> RenderResult<MockHandle> {
        Ok(self.create_object(Kind::RenderPass))
    }

    fn destroy_render_pass(&mut self, render_pass: MockHandle) {
        self.destroy_object(Kind::RenderPass, render_pass);
    }

    fn create_framebuffer(
        &mut self,
        render_pass: MockHandle,
        attachments: &[MockHandle],
        _extent: Extent,
    ) -> RenderResult<MockHandle> {
        self.expect_live(render_pass, Kind::RenderPass);
        for &a in attachments {
            self.expect_live(a, Kind::ImageView);
        }
        Ok(self.create_object(Kind::Framebuffer))
    }

    fn destroy_framebuffer(&mut self, framebuffer: MockHandle) {
        self.destroy_object(Kind::Framebuffer, framebuffer);
    }

    fn acquire_next_image(
        &mut self,
        swapchain: MockHandle,
        signal: MockHandle,
    ) -> RenderResult<(u32, PresentStatus)> {
        self.expect_live(swapchain, Kind::Swapchain);
        self.expect_live(signal, Kind::Semaphore);
        let call = self.acquire_calls;
        self.acquire_calls += 1;

        let surface = self.surface_extent;
        let sc = self
            .swapchains
            .get_mut(&swapchain)
            .expect("swapchain bookkeeping");
        let status = match self.acquire_overrides.remove(&call) {
            Some(s) => s,
            None if sc.extent != surface => PresentStatus::OutOfDate,
            None => PresentStatus::Optimal,
        };
        if status == PresentStatus::OutOfDate {
            self.events.push(Event::Acquire { image: u32::MAX, status });
            return Ok((u32::MAX, status));
        }

        let image = match self.acquire_order.pop_front() {
            Some(i) => i,
            None => {
                let i = sc.next;
                sc.next = (sc.next + 1) % sc.images.len() as u32;
                i
            }
        };
        assert!(
            self.signaled_semaphores.insert(signal),
            "acquire signals {signal:?}, which is already signaled and never waited on"
        );
        self.events.push(Event::Acquire { image, status });
        Ok((image, status))
    }

    fn present(
        &mut self,
        swapchain: MockHandle,
        image_index: u32,
        wait: MockHandle,
    ) -> RenderResult<PresentStatus> {
        self.expect_live(swapchain, Kind::Swapchain);
        if let Some(reason) = &self.present_failure {
            return Err(RenderError::Presentation(reason.clone()));
        }
        assert!(
            self.signaled_semaphores.remove(&wait),
            "present waits on {wait:?}, which nothing signaled"
        );
        let sc = &self.swapchains[&swapchain];
        assert!((image_index as usize) < sc.images.len());
        let status = if sc.extent != self.surface_extent {
            PresentStatus::OutOfDate
        } else {
            PresentStatus::Optimal
        };
        self.events.push(Event::Present {
            image: image_index,
            status,
        });
        Ok(status)
    }

    fn allocate_command_buffers(&mut self, count: usize) -> RenderResult<Vec<MockHandle>> {
        Ok((0..count)
            .map(|_| self.create_object(Kind::CommandBuffer))
            .collect())
    }

    fn free_command_buffers(&mut self, buffers: &[MockHandle]) {
        for &b in buffers {
            assert!(
                self.pending.iter().all(|p| p.cmd != b),
                "freeing {b:?} while it is executing"
            );
            self.commands.remove(&b);
            self.recording.remove(&b);
            self.destroy_object(Kind::CommandBuffer, b);
        }
    }

    fn begin_commands(&mut self, cmd: MockHandle, one_time: bool) -> RenderResult<()> {
        self.expect_live(cmd, Kind::CommandBuffer);
        self.commands.insert(cmd, vec![MockCommand::Begin { one_time }]);
        self.recording.insert(cmd);
        Ok(())
    }

    fn end_commands(&mut self, cmd: MockHandle) -> RenderResult<()> {
        self.push_cmd(cmd, MockCommand::End);
        self.recording.remove(&cmd);
        Ok(())
    }

    fn cmd_begin_render_pass(
        &mut self,
        cmd: MockHandle,
        render_pass: MockHandle,
        framebuffer: MockHandle,
        extent: Extent,
        clear: ClearValues,
    ) {
        self.push_cmd(
            cmd,
            MockCommand::BeginRenderPass {
                render_pass,
                framebuffer,
                extent,
                clear,
            },
        );
    }

    fn cmd_end_render_pass(&mut self, cmd: MockHandle) {
        self.push_cmd(cmd, MockCommand::EndRenderPass);
    }

    fn cmd_bind_pipeline(&mut self, cmd: MockHandle, pipeline: MockHandle) {
        self.push_cmd(cmd, MockCommand::BindPipeline(pipeline));
    }

    fn cmd_bind_descriptor_set(&mut self, cmd: MockHandle, layout: MockHandle, set: MockHandle) {
        self.push_cmd(cmd, MockCommand::BindDescriptorSet { layout, set });
    }

    fn cmd_bind_vertex_buffer(&mut self, cmd: MockHandle, buffer: MockHandle) {
        self.push_cmd(cmd, MockCommand::BindVertexBuffer(buffer));
    }

    fn cmd_bind_index_buffer(&mut self, cmd: MockHandle, buffer: MockHandle) {
        self.push_cmd(cmd, MockCommand::BindIndexBuffer(buffer));
    }

    fn cmd_draw(&mut self, cmd: MockHandle, draw: DrawCall) {
        self.push_cmd(cmd, MockCommand::Draw(draw));
    }

    fn cmd_image_barrier(
        &mut self,
        cmd: MockHandle,
        image: MockHandle,
        _range: SubresourceRange,
        old: ImageLayout,
        new: ImageLayout,
        masks: TransitionMasks,
    ) {
        self.push_cmd(
            cmd,
            MockCommand::Barrier {
                image,
                old,
                new,
                masks,
            },
        );
    }

    fn cmd_copy_buffer_to_image(
        &mut self,
        cmd: MockHandle,
        buffer: MockHandle,
        image: MockHandle,
        _range: SubresourceRange,
        extent: Extent,
    ) {
        self.push_cmd(
            cmd,
            MockCommand::CopyBufferToImage {
                buffer,
                image,
                extent,
            },
        );
    }

    fn submit(
        &mut self,
        cmd: MockHandle,
        wait: Option<(MockHandle, StageFlags)>,
        signal: Option<MockHandle>,
        fence: Option<MockHandle>,
    ) -> RenderResult<()> {
        self.expect_live(cmd, Kind::CommandBuffer);
        assert!(!self.recording.contains(&cmd), "submitting {cmd:?} mid-recording");
        assert_eq!(
            self.commands(cmd).last(),
            Some(&MockCommand::End),
            "submitting an unfinished command buffer"
        );
        if let Some((sem, _)) = wait {
            assert!(
                self.signaled_semaphores.remove(&sem),
                "submit waits on {sem:?}, which nothing signaled"
            );
        }
        if let Some(sem) = signal {
            assert!(self.signaled_semaphores.insert(sem), "{sem:?} signaled twice");
        }
        if let Some(f) = fence {
            assert_eq!(
                self.fences[&f],
                FenceState::Unsignaled,
                "submitting with a fence that was not reset"
            );
            self.fences.insert(f, FenceState::Pending);
        }
        self.events.push(Event::Submit { cmd, fence });
        self.pending.push_back(PendingSubmit { cmd, fence });
        self.max_outstanding = self.max_outstanding.max(self.pending.len());
        Ok(())
    }
}

/// Minimal pipeline collaborator: one pipeline, one layout, one descriptor
/// set per swapchain image, and a persistent quad.
pub struct MockPipeline {
    pub vertex_buffer: MockHandle,
    pub index_buffer: MockHandle,
    pub builds: usize,
}

impl MockPipeline {
    pub fn new(device: &mut MockDevice) -> Self {
        Self {
            vertex_buffer: device.create_object(Kind::Buffer),
            index_buffer: device.create_object(Kind::Buffer),
            builds: 0,
        }
    }
}

impl PipelineProvider<MockDevice> for MockPipeline {
    fn build(
        &mut self,
        device: &mut MockDevice,
        target: &RenderTarget<MockDevice>,
    ) -> RenderResult<DrawBindings<MockDevice>> {
        device.expect_live(target.render_pass, Kind::RenderPass);
        self.builds += 1;
        let layout = device.create_object(Kind::PipelineLayout);
        let pipeline = device.create_object(Kind::Pipeline);
        let descriptor_sets = (0..target.image_count)
            .map(|_| device.create_object(Kind::DescriptorSet))
            .collect();
        Ok(DrawBindings {
            pipeline,
            layout,
            descriptor_sets,
            vertex_buffer: Some(self.vertex_buffer),
            index_buffer: Some(self.index_buffer),
            draw: DrawCall::Indexed {
                index_count: 6,
                instance_count: 1,
            },
        })
    }

    fn destroy(&mut self, device: &mut MockDevice, bindings: DrawBindings<MockDevice>) {
        device.destroy_object(Kind::Pipeline, bindings.pipeline);
        device.destroy_object(Kind::PipelineLayout, bindings.layout);
        for set in bindings.descriptor_sets {
            device.destroy_object(Kind::DescriptorSet, set);
        }
    }

    fn release(&mut self, device: &mut MockDevice) {
        device.destroy_object(Kind::Buffer, self.index_buffer);
        device.destroy_object(Kind::Buffer, self.vertex_buffer);
    }
}
