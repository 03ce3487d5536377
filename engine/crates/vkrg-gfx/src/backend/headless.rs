//! 在 CPU 上模拟的设备
//!
//! - 每个 Vulkan 对象只是一个递增的 handle，buffer 拥有真实的 host 内存，拷贝命令会真实地拷贝字节
//! - command buffer 中的命令在提交时按顺序"执行"，fence 直到被等待（或 device wait idle）才算完成
//! - 记录所有调用，并检测同步错误（semaphore 重复 signal、提交仍在执行中的 command buffer、
//!   等待从未 set 的 event 等），测试通过 [`GfxHeadlessDevice::violations`] 检查

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
};

use ash::vk;
use ash::vk::Handle;

use crate::{
    commands::submit_info::GfxSubmitInfo,
    descriptors::write_descriptor_set::GfxWriteDescriptorSet,
    device::{
        GfxBufferDesc, GfxDevice, GfxFramebufferDesc, GfxGraphicsPipelineDesc, GfxImageDesc, GfxImageViewDesc,
        GfxRenderPassDesc, GfxShaderStageDesc, GfxSwapchainDesc,
    },
    resources::sampler::GfxSamplerDesc,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxHeadlessObjectType {
    Buffer,
    Image,
    ImageView,
    Sampler,
    Fence,
    Semaphore,
    Event,
    CommandBuffer,
    DescriptorSetLayout,
    DescriptorPool,
    Swapchain,
    ShaderModule,
    RenderPass,
    Framebuffer,
    PipelineLayout,
    Pipeline,
}

/// command buffer 中录制的命令
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GfxHeadlessCmd {
    SetEvent(vk::Event),
    ResetEvent(vk::Event),
    WaitEvent(vk::Event),
    CopyBuffer { src: vk::Buffer, dst: vk::Buffer },
    CopyBufferToImage { src: vk::Buffer, dst: vk::Image },
    ImageBarrier { image: vk::Image, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout },
    BeginRenderPass { render_pass: vk::RenderPass, framebuffer: vk::Framebuffer },
    EndRenderPass,
    BindPipeline { bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline },
    BindDescriptorSets { layout: vk::PipelineLayout, sets: Vec<vk::DescriptorSet> },
    BindVertexBuffers { first_binding: u32, buffers: Vec<vk::Buffer> },
    BindIndexBuffer { buffer: vk::Buffer, index_type: vk::IndexType },
    Draw { vertex_count: u32, instance_count: u32 },
    DrawIndexed { index_count: u32, instance_count: u32 },
    Dispatch { x: u32, y: u32, z: u32 },
    /// 由测试中的 operation 录制，用于观察执行顺序
    Marker(String),
}

/// 设备层面的调用记录
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GfxHeadlessCall {
    WaitFence(vk::Fence),
    ResetFence(vk::Fence),
    Acquire { image_index: u32, semaphore: Option<vk::Semaphore> },
    AcquireOutOfDate,
    Submit {
        command_buffers: Vec<vk::CommandBuffer>,
        wait_semaphores: Vec<vk::Semaphore>,
        signal_semaphores: Vec<vk::Semaphore>,
        fence: Option<vk::Fence>,
    },
    Present { image_index: u32, wait_semaphores: Vec<vk::Semaphore> },
    PresentOutOfDate { image_index: u32 },
    DeviceWaitIdle,
    RecreateSwapchain,
    UpdateDescriptorSets(Vec<GfxWriteDescriptorSet>),
}

/// 检测到的同步错误
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GfxHeadlessViolation {
    SemaphoreSignaledTwice(vk::Semaphore),
    SemaphoreWaitedUnsignaled(vk::Semaphore),
    FenceSubmittedSignaled(vk::Fence),
    FenceResetWhilePending(vk::Fence),
    FenceWaitNeverSubmitted(vk::Fence),
    CommandBufferReusedWhilePending(vk::CommandBuffer),
    EventDeadlock(vk::Event),
    DrawOutsideRenderPass(vk::CommandBuffer),
    RenderPassNotEnded(vk::CommandBuffer),
    DestroyUnknownObject(GfxHeadlessObjectType, u64),
}

/// 交换链 acquire 的脚本
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GfxHeadlessAcquire {
    Image(u32),
    Suboptimal(u32),
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    /// 已经提交，GPU 尚未被观察到完成
    Pending,
}

struct HeadlessCommandBuffer {
    cmds: Vec<GfxHeadlessCmd>,
    recording: bool,
    pending: bool,
    in_render_pass: bool,
}

struct HeadlessBuffer {
    data: Vec<u8>,
    host_visible: bool,
}

struct HeadlessSwapchain {
    images: Vec<vk::Image>,
    next_image: u32,
}

#[derive(Default)]
struct HeadlessState {
    next_handle: u64,
    live: HashMap<GfxHeadlessObjectType, HashSet<u64>>,
    names: HashMap<u64, String>,

    buffers: HashMap<vk::Buffer, HeadlessBuffer>,
    fences: HashMap<vk::Fence, FenceState>,
    fence_command_buffers: HashMap<vk::Fence, Vec<vk::CommandBuffer>>,
    semaphores: HashMap<vk::Semaphore, bool>,
    events: HashMap<vk::Event, bool>,
    command_buffers: HashMap<vk::CommandBuffer, HeadlessCommandBuffer>,
    swapchains: HashMap<vk::SwapchainKHR, HeadlessSwapchain>,
    render_passes: HashMap<vk::RenderPass, GfxRenderPassDesc>,
    framebuffers: HashMap<vk::Framebuffer, GfxFramebufferDesc>,
    graphics_pipelines: HashMap<vk::Pipeline, GfxGraphicsPipelineDesc>,
    compute_pipelines: HashMap<vk::Pipeline, GfxShaderStageDesc>,

    swapchain_image_count: u32,
    swapchain_extent: vk::Extent2D,
    acquire_script: VecDeque<GfxHeadlessAcquire>,
    present_script: VecDeque<Result<bool, vk::Result>>,

    calls: Vec<GfxHeadlessCall>,
    violations: Vec<GfxHeadlessViolation>,
}

impl HeadlessState {
    fn alloc_handle(&mut self, ty: GfxHeadlessObjectType, name: &str) -> u64 {
        self.next_handle += 1;
        let raw = self.next_handle;
        self.live.entry(ty).or_default().insert(raw);
        self.names.insert(raw, name.to_string());
        raw
    }

    fn release_handle(&mut self, ty: GfxHeadlessObjectType, raw: u64) {
        let removed = self.live.get_mut(&ty).map(|set| set.remove(&raw)).unwrap_or(false);
        if !removed {
            self.violations.push(GfxHeadlessViolation::DestroyUnknownObject(ty, raw));
        }
    }

    fn record(&mut self, command_buffer: vk::CommandBuffer, cmd: GfxHeadlessCmd) {
        let Some(cb) = self.command_buffers.get_mut(&command_buffer) else {
            panic!("record into unknown command buffer {:?}", command_buffer);
        };
        assert!(cb.recording, "command buffer {:?} is not recording", command_buffer);
        match cmd {
            GfxHeadlessCmd::BeginRenderPass { .. } => cb.in_render_pass = true,
            GfxHeadlessCmd::EndRenderPass => cb.in_render_pass = false,
            GfxHeadlessCmd::Draw { .. } | GfxHeadlessCmd::DrawIndexed { .. } if !cb.in_render_pass => {
                self.violations.push(GfxHeadlessViolation::DrawOutsideRenderPass(command_buffer));
            }
            _ => {}
        }
        cb.cmds.push(cmd);
    }

    fn complete_fence(&mut self, fence: vk::Fence) {
        self.fences.insert(fence, FenceState::Signaled);
        for cmd in self.fence_command_buffers.remove(&fence).unwrap_or_default() {
            if let Some(cb) = self.command_buffers.get_mut(&cmd) {
                cb.pending = false;
            }
        }
    }

    fn execute(&mut self, command_buffer: vk::CommandBuffer) {
        let cmds = match self.command_buffers.get(&command_buffer) {
            Some(cb) => cb.cmds.clone(),
            None => panic!("submit unknown command buffer {:?}", command_buffer),
        };
        for cmd in cmds {
            match cmd {
                GfxHeadlessCmd::SetEvent(event) => {
                    self.events.insert(event, true);
                }
                GfxHeadlessCmd::ResetEvent(event) => {
                    self.events.insert(event, false);
                }
                GfxHeadlessCmd::WaitEvent(event) => {
                    if !self.events.get(&event).copied().unwrap_or(false) {
                        self.violations.push(GfxHeadlessViolation::EventDeadlock(event));
                    }
                }
                // 拷贝的 region 保存在 GfxHeadlessDevice::copies 中，由 queue_submit 执行
                _ => {}
            }
        }
    }

    fn new_swapchain_images(&mut self) -> Vec<vk::Image> {
        (0..self.swapchain_image_count)
            .map(|i| vk::Image::from_raw(self.alloc_handle(GfxHeadlessObjectType::Image, &format!("swapchain-image-{i}"))))
            .collect()
    }
}

/// 在 CPU 上模拟的设备，见模块文档
pub struct GfxHeadlessDevice {
    state: RefCell<HeadlessState>,
    /// 录制的拷贝命令：(command buffer, src, dst, regions)
    copies: RefCell<Vec<(vk::CommandBuffer, vk::Buffer, vk::Buffer, Vec<vk::BufferCopy>)>>,
}

impl Default for GfxHeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl GfxHeadlessDevice {
    pub fn new() -> Self {
        let state = HeadlessState {
            swapchain_image_count: 3,
            swapchain_extent: vk::Extent2D { width: 800, height: 600 },
            ..Default::default()
        };
        Self {
            state: RefCell::new(state),
            copies: RefCell::new(vec![]),
        }
    }

    /// 创建一个模拟的交换链，acquire 默认按照 0, 1, 2, ... 轮转
    pub fn create_swapchain(&self, image_count: u32, extent: vk::Extent2D) -> GfxSwapchainDesc {
        let mut state = self.state.borrow_mut();
        state.swapchain_image_count = image_count;
        state.swapchain_extent = extent;
        let handle = vk::SwapchainKHR::from_raw(state.alloc_handle(GfxHeadlessObjectType::Swapchain, "swapchain"));
        let images = state.new_swapchain_images();
        state.swapchains.insert(
            handle,
            HeadlessSwapchain {
                images: images.clone(),
                next_image: 0,
            },
        );
        GfxSwapchainDesc {
            handle,
            images,
            format: vk::Format::B8G8R8A8_UNORM,
            extent,
        }
    }
}

// 测试脚本
impl GfxHeadlessDevice {
    /// 指定接下来 acquire 的结果，脚本用完之后恢复轮转
    pub fn script_acquire(&self, script: impl IntoIterator<Item = GfxHeadlessAcquire>) {
        self.state.borrow_mut().acquire_script.extend(script);
    }

    /// 指定接下来 present 的结果：Ok(is_suboptimal) 或者错误码
    pub fn script_present(&self, script: impl IntoIterator<Item = Result<bool, vk::Result>>) {
        self.state.borrow_mut().present_script.extend(script);
    }

    /// 在 command buffer 中录制一个标记
    pub fn cmd_marker(&self, command_buffer: vk::CommandBuffer, label: impl Into<String>) {
        self.state.borrow_mut().record(command_buffer, GfxHeadlessCmd::Marker(label.into()));
    }
}

// 观察
impl GfxHeadlessDevice {
    pub fn calls(&self) -> Vec<GfxHeadlessCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn violations(&self) -> Vec<GfxHeadlessViolation> {
        self.state.borrow().violations.clone()
    }

    pub fn live_count(&self, ty: GfxHeadlessObjectType) -> usize {
        self.state.borrow().live.get(&ty).map_or(0, |set| set.len())
    }

    pub fn recorded_commands(&self, command_buffer: vk::CommandBuffer) -> Vec<GfxHeadlessCmd> {
        self.state.borrow().command_buffers.get(&command_buffer).map(|cb| cb.cmds.clone()).unwrap_or_default()
    }

    /// 直接读取 buffer 的内存，不要求 host visible
    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Vec<u8> {
        self.state.borrow().buffers.get(&buffer).map(|b| b.data.clone()).unwrap_or_default()
    }

    pub fn object_name(&self, raw: u64) -> Option<String> {
        self.state.borrow().names.get(&raw).cloned()
    }

    pub fn is_fence_signaled(&self, fence: vk::Fence) -> bool {
        self.state.borrow().fences.get(&fence) == Some(&FenceState::Signaled)
    }

    pub fn render_pass_desc(&self, render_pass: vk::RenderPass) -> Option<GfxRenderPassDesc> {
        self.state.borrow().render_passes.get(&render_pass).cloned()
    }

    pub fn framebuffer_desc(&self, framebuffer: vk::Framebuffer) -> Option<GfxFramebufferDesc> {
        self.state.borrow().framebuffers.get(&framebuffer).cloned()
    }

    pub fn graphics_pipeline_desc(&self, pipeline: vk::Pipeline) -> Option<GfxGraphicsPipelineDesc> {
        self.state.borrow().graphics_pipelines.get(&pipeline).cloned()
    }

    pub fn compute_pipeline_stage(&self, pipeline: vk::Pipeline) -> Option<GfxShaderStageDesc> {
        self.state.borrow().compute_pipelines.get(&pipeline).cloned()
    }
}

impl GfxDevice for GfxHeadlessDevice {
    fn create_buffer(&self, desc: &GfxBufferDesc, debug_name: &str) -> vk::Buffer {
        let mut state = self.state.borrow_mut();
        let buffer = vk::Buffer::from_raw(state.alloc_handle(GfxHeadlessObjectType::Buffer, debug_name));
        state.buffers.insert(
            buffer,
            HeadlessBuffer {
                data: vec![0; desc.size as usize],
                host_visible: desc.host_visible,
            },
        );
        buffer
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = self.state.borrow_mut();
        state.buffers.remove(&buffer);
        state.release_handle(GfxHeadlessObjectType::Buffer, buffer.as_raw());
    }

    fn write_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        let Some(b) = state.buffers.get_mut(&buffer) else {
            panic!("write unknown buffer {:?}", buffer);
        };
        assert!(b.host_visible, "buffer {:?} is not host visible", buffer);
        let offset = offset as usize;
        b.data[offset..offset + data.len()].copy_from_slice(data);
    }

    fn read_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, dst: &mut [u8]) {
        let state = self.state.borrow();
        let Some(b) = state.buffers.get(&buffer) else {
            panic!("read unknown buffer {:?}", buffer);
        };
        assert!(b.host_visible, "buffer {:?} is not host visible", buffer);
        let offset = offset as usize;
        dst.copy_from_slice(&b.data[offset..offset + dst.len()]);
    }

    fn create_image(&self, _desc: &GfxImageDesc, debug_name: &str) -> vk::Image {
        vk::Image::from_raw(self.state.borrow_mut().alloc_handle(GfxHeadlessObjectType::Image, debug_name))
    }

    fn destroy_image(&self, image: vk::Image) {
        self.state.borrow_mut().release_handle(GfxHeadlessObjectType::Image, image.as_raw());
    }

    fn create_image_view(&self, _desc: &GfxImageViewDesc, debug_name: &str) -> vk::ImageView {
        vk::ImageView::from_raw(self.state.borrow_mut().alloc_handle(GfxHeadlessObjectType::ImageView, debug_name))
    }

    fn destroy_image_view(&self, image_view: vk::ImageView) {
        self.state.borrow_mut().release_handle(GfxHeadlessObjectType::ImageView, image_view.as_raw());
    }

    fn create_sampler(&self, _desc: &GfxSamplerDesc, debug_name: &str) -> vk::Sampler {
        vk::Sampler::from_raw(self.state.borrow_mut().alloc_handle(GfxHeadlessObjectType::Sampler, debug_name))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.state.borrow_mut().release_handle(GfxHeadlessObjectType::Sampler, sampler.as_raw());
    }

    fn create_fence(&self, signaled: bool, debug_name: &str) -> vk::Fence {
        let mut state = self.state.borrow_mut();
        let fence = vk::Fence::from_raw(state.alloc_handle(GfxHeadlessObjectType::Fence, debug_name));
        state.fences.insert(fence, if signaled { FenceState::Signaled } else { FenceState::Unsignaled });
        fence
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.borrow_mut();
        state.fences.remove(&fence);
        state.release_handle(GfxHeadlessObjectType::Fence, fence.as_raw());
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], _timeout: u64) -> Result<(), vk::Result> {
        let mut state = self.state.borrow_mut();
        for &fence in fences {
            state.calls.push(GfxHeadlessCall::WaitFence(fence));
            match state.fences.get(&fence).copied() {
                Some(FenceState::Signaled) => {}
                Some(FenceState::Pending) => state.complete_fence(fence),
                Some(FenceState::Unsignaled) | None => {
                    state.violations.push(GfxHeadlessViolation::FenceWaitNeverSubmitted(fence));
                    return Err(vk::Result::TIMEOUT);
                }
            }
        }
        Ok(())
    }

    fn reset_fences(&self, fences: &[vk::Fence]) {
        let mut state = self.state.borrow_mut();
        for &fence in fences {
            state.calls.push(GfxHeadlessCall::ResetFence(fence));
            if state.fences.get(&fence) == Some(&FenceState::Pending) {
                state.violations.push(GfxHeadlessViolation::FenceResetWhilePending(fence));
            }
            state.fences.insert(fence, FenceState::Unsignaled);
        }
    }

    fn create_semaphore(&self, debug_name: &str) -> vk::Semaphore {
        let mut state = self.state.borrow_mut();
        let semaphore = vk::Semaphore::from_raw(state.alloc_handle(GfxHeadlessObjectType::Semaphore, debug_name));
        state.semaphores.insert(semaphore, false);
        semaphore
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.state.borrow_mut();
        state.semaphores.remove(&semaphore);
        state.release_handle(GfxHeadlessObjectType::Semaphore, semaphore.as_raw());
    }

    fn create_event(&self, debug_name: &str) -> vk::Event {
        let mut state = self.state.borrow_mut();
        let event = vk::Event::from_raw(state.alloc_handle(GfxHeadlessObjectType::Event, debug_name));
        state.events.insert(event, false);
        event
    }

    fn destroy_event(&self, event: vk::Event) {
        let mut state = self.state.borrow_mut();
        state.events.remove(&event);
        state.release_handle(GfxHeadlessObjectType::Event, event.as_raw());
    }

    fn allocate_command_buffer(&self, debug_name: &str) -> vk::CommandBuffer {
        let mut state = self.state.borrow_mut();
        let cmd = vk::CommandBuffer::from_raw(state.alloc_handle(GfxHeadlessObjectType::CommandBuffer, debug_name));
        state.command_buffers.insert(
            cmd,
            HeadlessCommandBuffer {
                cmds: vec![],
                recording: false,
                pending: false,
                in_render_pass: false,
            },
        );
        cmd
    }

    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        let mut state = self.state.borrow_mut();
        state.command_buffers.remove(&command_buffer);
        state.release_handle(GfxHeadlessObjectType::CommandBuffer, command_buffer.as_raw());
        self.copies.borrow_mut().retain(|(cmd, ..)| *cmd != command_buffer);
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, _usage: vk::CommandBufferUsageFlags) {
        let mut state = self.state.borrow_mut();
        let Some(cb) = state.command_buffers.get_mut(&command_buffer) else {
            panic!("begin unknown command buffer {:?}", command_buffer);
        };
        let pending = cb.pending;
        cb.cmds.clear();
        cb.recording = true;
        cb.in_render_pass = false;
        if pending {
            state.violations.push(GfxHeadlessViolation::CommandBufferReusedWhilePending(command_buffer));
        }
        self.copies.borrow_mut().retain(|(cmd, ..)| *cmd != command_buffer);
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        let mut state = self.state.borrow_mut();
        let Some(cb) = state.command_buffers.get_mut(&command_buffer) else {
            return;
        };
        cb.recording = false;
        let in_render_pass = cb.in_render_pass;
        if in_render_pass {
            state.violations.push(GfxHeadlessViolation::RenderPassNotEnded(command_buffer));
        }
    }

    fn cmd_set_event(&self, command_buffer: vk::CommandBuffer, event: vk::Event, _stage: vk::PipelineStageFlags2) {
        self.state.borrow_mut().record(command_buffer, GfxHeadlessCmd::SetEvent(event));
    }

    fn cmd_reset_event(&self, command_buffer: vk::CommandBuffer, event: vk::Event, _stage: vk::PipelineStageFlags2) {
        self.state.borrow_mut().record(command_buffer, GfxHeadlessCmd::ResetEvent(event));
    }

    fn cmd_wait_event(
        &self,
        command_buffer: vk::CommandBuffer,
        event: vk::Event,
        _src_stage: vk::PipelineStageFlags2,
        _dst_stage: vk::PipelineStageFlags2,
    ) {
        self.state.borrow_mut().record(command_buffer, GfxHeadlessCmd::WaitEvent(event));
    }

    fn cmd_copy_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        self.state.borrow_mut().record(command_buffer, GfxHeadlessCmd::CopyBuffer { src, dst });
        self.copies.borrow_mut().push((command_buffer, src, dst, regions.to_vec()));
    }

    fn cmd_copy_buffer_to_image(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        _dst_layout: vk::ImageLayout,
        _regions: &[vk::BufferImageCopy],
    ) {
        self.state.borrow_mut().record(command_buffer, GfxHeadlessCmd::CopyBufferToImage { src, dst });
    }

    fn cmd_image_memory_barrier(&self, command_buffer: vk::CommandBuffer, barriers: &[vk::ImageMemoryBarrier2<'_>]) {
        let mut state = self.state.borrow_mut();
        for barrier in barriers {
            state.record(
                command_buffer,
                GfxHeadlessCmd::ImageBarrier {
                    image: barrier.image,
                    old_layout: barrier.old_layout,
                    new_layout: barrier.new_layout,
                },
            );
        }
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        _extent: vk::Extent2D,
        _clear_values: &[vk::ClearValue],
    ) {
        self.state
            .borrow_mut()
            .record(command_buffer, GfxHeadlessCmd::BeginRenderPass { render_pass, framebuffer });
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        self.state.borrow_mut().record(command_buffer, GfxHeadlessCmd::EndRenderPass);
    }

    fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        self.state
            .borrow_mut()
            .record(command_buffer, GfxHeadlessCmd::BindPipeline { bind_point, pipeline });
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        _first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        self.state.borrow_mut().record(
            command_buffer,
            GfxHeadlessCmd::BindDescriptorSets {
                layout,
                sets: descriptor_sets.to_vec(),
            },
        );
    }

    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        assert_eq!(buffers.len(), offsets.len(), "every vertex buffer needs an offset");
        self.state.borrow_mut().record(
            command_buffer,
            GfxHeadlessCmd::BindVertexBuffers {
                first_binding,
                buffers: buffers.to_vec(),
            },
        );
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        _offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        self.state
            .borrow_mut()
            .record(command_buffer, GfxHeadlessCmd::BindIndexBuffer { buffer, index_type });
    }

    fn cmd_draw(
        &self,
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) {
        self.state.borrow_mut().record(
            command_buffer,
            GfxHeadlessCmd::Draw {
                vertex_count,
                instance_count,
            },
        );
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.state.borrow_mut().record(
            command_buffer,
            GfxHeadlessCmd::DrawIndexed {
                index_count,
                instance_count,
            },
        );
    }

    fn cmd_dispatch(&self, command_buffer: vk::CommandBuffer, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        self.state.borrow_mut().record(
            command_buffer,
            GfxHeadlessCmd::Dispatch {
                x: group_count_x,
                y: group_count_y,
                z: group_count_z,
            },
        );
    }

    fn queue_submit(&self, submit_infos: &[GfxSubmitInfo], fence: Option<vk::Fence>) {
        let mut state = self.state.borrow_mut();

        if let Some(fence) = fence {
            if state.fences.get(&fence) != Some(&FenceState::Unsignaled) {
                state.violations.push(GfxHeadlessViolation::FenceSubmittedSignaled(fence));
            }
            state.fences.insert(fence, FenceState::Pending);
        }

        for info in submit_infos {
            for semaphore in info.wait_semaphores() {
                if !state.semaphores.get(&semaphore).copied().unwrap_or(false) {
                    state.violations.push(GfxHeadlessViolation::SemaphoreWaitedUnsignaled(semaphore));
                }
                state.semaphores.insert(semaphore, false);
            }

            for &cmd in info.command_buffers() {
                let pending = state.command_buffers.get(&cmd).is_some_and(|cb| cb.pending);
                if pending {
                    state.violations.push(GfxHeadlessViolation::CommandBufferReusedWhilePending(cmd));
                }
                state.execute(cmd);

                // 执行拷贝
                for (_, src, dst, regions) in self.copies.borrow().iter().filter(|(c, ..)| *c == cmd) {
                    for region in regions {
                        let (src_offset, dst_offset, size) =
                            (region.src_offset as usize, region.dst_offset as usize, region.size as usize);
                        let bytes = state.buffers[src].data[src_offset..src_offset + size].to_vec();
                        if let Some(dst) = state.buffers.get_mut(dst) {
                            dst.data[dst_offset..dst_offset + size].copy_from_slice(&bytes);
                        }
                    }
                }

                if let Some(cb) = state.command_buffers.get_mut(&cmd) {
                    cb.pending = true;
                }
                if let Some(fence) = fence {
                    state.fence_command_buffers.entry(fence).or_default().push(cmd);
                }
            }

            for semaphore in info.signal_semaphores() {
                if state.semaphores.get(&semaphore).copied().unwrap_or(false) {
                    state.violations.push(GfxHeadlessViolation::SemaphoreSignaledTwice(semaphore));
                }
                state.semaphores.insert(semaphore, true);
            }

            state.calls.push(GfxHeadlessCall::Submit {
                command_buffers: info.command_buffers().to_vec(),
                wait_semaphores: info.wait_semaphores().collect(),
                signal_semaphores: info.signal_semaphores().collect(),
                fence,
            });
        }
    }

    fn device_wait_idle(&self) {
        let mut state = self.state.borrow_mut();
        state.calls.push(GfxHeadlessCall::DeviceWaitIdle);
        let pending = state.fences.iter().filter(|(_, s)| **s == FenceState::Pending).map(|(f, _)| *f).collect::<Vec<_>>();
        for fence in pending {
            state.complete_fence(fence);
        }
        for cb in state.command_buffers.values_mut() {
            cb.pending = false;
        }
    }

    fn create_descriptor_set_layout(
        &self,
        _bindings: &[vk::DescriptorSetLayoutBinding<'_>],
        debug_name: &str,
    ) -> vk::DescriptorSetLayout {
        vk::DescriptorSetLayout::from_raw(
            self.state.borrow_mut().alloc_handle(GfxHeadlessObjectType::DescriptorSetLayout, debug_name),
        )
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.state.borrow_mut().release_handle(GfxHeadlessObjectType::DescriptorSetLayout, layout.as_raw());
    }

    fn create_descriptor_pool(
        &self,
        _pool_sizes: &[vk::DescriptorPoolSize],
        _max_sets: u32,
        debug_name: &str,
    ) -> vk::DescriptorPool {
        vk::DescriptorPool::from_raw(self.state.borrow_mut().alloc_handle(GfxHeadlessObjectType::DescriptorPool, debug_name))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.state.borrow_mut().release_handle(GfxHeadlessObjectType::DescriptorPool, pool.as_raw());
    }

    fn allocate_descriptor_sets(
        &self,
        _pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Vec<vk::DescriptorSet> {
        let mut state = self.state.borrow_mut();
        layouts
            .iter()
            .map(|_| {
                state.next_handle += 1;
                vk::DescriptorSet::from_raw(state.next_handle)
            })
            .collect()
    }

    fn update_descriptor_sets(&self, writes: &[GfxWriteDescriptorSet]) {
        self.state.borrow_mut().calls.push(GfxHeadlessCall::UpdateDescriptorSets(writes.to_vec()));
    }

    fn create_shader_module(&self, _code: &[u32], debug_name: &str) -> vk::ShaderModule {
        vk::ShaderModule::from_raw(self.state.borrow_mut().alloc_handle(GfxHeadlessObjectType::ShaderModule, debug_name))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.state.borrow_mut().release_handle(GfxHeadlessObjectType::ShaderModule, module.as_raw());
    }

    fn create_render_pass(&self, desc: &GfxRenderPassDesc, debug_name: &str) -> vk::RenderPass {
        let mut state = self.state.borrow_mut();
        let render_pass = vk::RenderPass::from_raw(state.alloc_handle(GfxHeadlessObjectType::RenderPass, debug_name));
        state.render_passes.insert(render_pass, desc.clone());
        render_pass
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        let mut state = self.state.borrow_mut();
        state.render_passes.remove(&render_pass);
        state.release_handle(GfxHeadlessObjectType::RenderPass, render_pass.as_raw());
    }

    fn create_framebuffer(&self, desc: &GfxFramebufferDesc, debug_name: &str) -> vk::Framebuffer {
        let mut state = self.state.borrow_mut();
        if let Some(render_pass) = state.render_passes.get(&desc.render_pass) {
            assert_eq!(
                render_pass.attachments.len(),
                desc.attachments.len(),
                "framebuffer {} does not match its render pass",
                debug_name
            );
        }
        let framebuffer = vk::Framebuffer::from_raw(state.alloc_handle(GfxHeadlessObjectType::Framebuffer, debug_name));
        state.framebuffers.insert(framebuffer, desc.clone());
        framebuffer
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        let mut state = self.state.borrow_mut();
        state.framebuffers.remove(&framebuffer);
        state.release_handle(GfxHeadlessObjectType::Framebuffer, framebuffer.as_raw());
    }

    fn create_pipeline_layout(&self, _set_layouts: &[vk::DescriptorSetLayout], debug_name: &str) -> vk::PipelineLayout {
        vk::PipelineLayout::from_raw(self.state.borrow_mut().alloc_handle(GfxHeadlessObjectType::PipelineLayout, debug_name))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state.borrow_mut().release_handle(GfxHeadlessObjectType::PipelineLayout, layout.as_raw());
    }

    fn create_graphics_pipeline(&self, desc: &GfxGraphicsPipelineDesc, debug_name: &str) -> vk::Pipeline {
        let mut state = self.state.borrow_mut();
        let pipeline = vk::Pipeline::from_raw(state.alloc_handle(GfxHeadlessObjectType::Pipeline, debug_name));
        state.graphics_pipelines.insert(pipeline, desc.clone());
        pipeline
    }

    fn create_compute_pipeline(
        &self,
        _layout: vk::PipelineLayout,
        stage: &GfxShaderStageDesc,
        debug_name: &str,
    ) -> vk::Pipeline {
        let mut state = self.state.borrow_mut();
        let pipeline = vk::Pipeline::from_raw(state.alloc_handle(GfxHeadlessObjectType::Pipeline, debug_name));
        state.compute_pipelines.insert(pipeline, stage.clone());
        pipeline
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        let mut state = self.state.borrow_mut();
        state.graphics_pipelines.remove(&pipeline);
        state.compute_pipelines.remove(&pipeline);
        state.release_handle(GfxHeadlessObjectType::Pipeline, pipeline.as_raw());
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        semaphore: Option<vk::Semaphore>,
        fence: Option<vk::Fence>,
    ) -> Result<(u32, bool), vk::Result> {
        let mut state = self.state.borrow_mut();
        let image_count = match state.swapchains.get(&swapchain) {
            Some(sc) => sc.images.len() as u32,
            None => return Err(vk::Result::ERROR_SURFACE_LOST_KHR),
        };

        let (image_index, suboptimal) = match state.acquire_script.pop_front() {
            Some(GfxHeadlessAcquire::OutOfDate) => {
                state.calls.push(GfxHeadlessCall::AcquireOutOfDate);
                return Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
            }
            Some(GfxHeadlessAcquire::Image(index)) => (index, false),
            Some(GfxHeadlessAcquire::Suboptimal(index)) => (index, true),
            None => {
                let Some(sc) = state.swapchains.get_mut(&swapchain) else {
                    return Err(vk::Result::ERROR_SURFACE_LOST_KHR);
                };
                let index = sc.next_image;
                sc.next_image = (sc.next_image + 1) % image_count;
                (index, false)
            }
        };
        assert!(image_index < image_count, "scripted image index {} out of range", image_index);

        if let Some(semaphore) = semaphore {
            if state.semaphores.get(&semaphore).copied().unwrap_or(false) {
                state.violations.push(GfxHeadlessViolation::SemaphoreSignaledTwice(semaphore));
            }
            state.semaphores.insert(semaphore, true);
        }
        if let Some(fence) = fence {
            if state.fences.get(&fence) != Some(&FenceState::Unsignaled) {
                state.violations.push(GfxHeadlessViolation::FenceSubmittedSignaled(fence));
            }
            state.fences.insert(fence, FenceState::Signaled);
        }

        state.calls.push(GfxHeadlessCall::Acquire { image_index, semaphore });
        Ok((image_index, suboptimal))
    }

    fn queue_present(
        &self,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool, vk::Result> {
        let mut state = self.state.borrow_mut();
        for &semaphore in wait_semaphores {
            if !state.semaphores.get(&semaphore).copied().unwrap_or(false) {
                state.violations.push(GfxHeadlessViolation::SemaphoreWaitedUnsignaled(semaphore));
            }
            state.semaphores.insert(semaphore, false);
        }

        let result = state.present_script.pop_front().unwrap_or(Ok(false));
        match result {
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => state.calls.push(GfxHeadlessCall::PresentOutOfDate { image_index }),
            _ => state.calls.push(GfxHeadlessCall::Present {
                image_index,
                wait_semaphores: wait_semaphores.to_vec(),
            }),
        }
        result
    }

    fn recreate_swapchain(&self, old_swapchain: vk::SwapchainKHR) -> GfxSwapchainDesc {
        let mut state = self.state.borrow_mut();
        state.calls.push(GfxHeadlessCall::RecreateSwapchain);

        if let Some(old) = state.swapchains.remove(&old_swapchain) {
            for image in old.images {
                state.release_handle(GfxHeadlessObjectType::Image, image.as_raw());
            }
            state.release_handle(GfxHeadlessObjectType::Swapchain, old_swapchain.as_raw());
        }

        let handle = vk::SwapchainKHR::from_raw(state.alloc_handle(GfxHeadlessObjectType::Swapchain, "swapchain"));
        let images = state.new_swapchain_images();
        state.swapchains.insert(
            handle,
            HeadlessSwapchain {
                images: images.clone(),
                next_image: 0,
            },
        );
        GfxSwapchainDesc {
            handle,
            images,
            format: vk::Format::B8G8R8A8_UNORM,
            extent: state.swapchain_extent,
        }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.borrow_mut();
        if let Some(old) = state.swapchains.remove(&swapchain) {
            for image in old.images {
                state.release_handle(GfxHeadlessObjectType::Image, image.as_raw());
            }
        }
        state.release_handle(GfxHeadlessObjectType::Swapchain, swapchain.as_raw());
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{
        commands::{command_buffer::GfxCommandBuffer, event::GfxEvent, fence::GfxFence},
        device::GfxDeviceRef,
        pipelines::{
            pipeline::{GfxPipeline, GfxPipelineLayout},
            render_pass::GfxRenderPass,
            shader_module::GfxShaderStage,
        },
        resources::buffer::GfxBuffer,
    };

    fn new_device() -> (Rc<GfxHeadlessDevice>, GfxDeviceRef) {
        let headless = Rc::new(GfxHeadlessDevice::new());
        let device: GfxDeviceRef = headless.clone();
        (headless, device)
    }

    #[test]
    fn test_buffer_upload_and_download() {
        let (headless, device) = new_device();
        let buffer = GfxBuffer::new_device_local(device.clone(), 16, vk::BufferUsageFlags::STORAGE_BUFFER, "test");

        buffer.upload(4, &[1, 2, 3, 4]);
        assert_eq!(buffer.download(4, 4), vec![1, 2, 3, 4]);
        assert_eq!(&headless.buffer_contents(buffer.handle())[..8], &[0, 0, 0, 0, 1, 2, 3, 4]);

        drop(buffer);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::Buffer), 0);
        assert!(headless.violations().is_empty());
    }

    #[test]
    fn test_wait_unsubmitted_fence_times_out() {
        let (headless, device) = new_device();
        let fence = GfxFence::new(device, false, "never-submitted");

        assert_eq!(fence.wait_timeout(0), Err(vk::Result::TIMEOUT));
        assert_eq!(headless.violations(), vec![GfxHeadlessViolation::FenceWaitNeverSubmitted(fence.handle())]);
    }

    #[test]
    fn test_event_wait_without_set_is_deadlock() {
        let (headless, device) = new_device();
        let event = GfxEvent::new(device.clone(), "event");
        let cmd = GfxCommandBuffer::new(device.clone(), "cmd");
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        event.cmd_wait(&cmd, vk::PipelineStageFlags2::ALL_COMMANDS, vk::PipelineStageFlags2::ALL_COMMANDS);
        cmd.end();

        device.queue_submit(&[GfxSubmitInfo::new(&[&cmd])], None);
        assert_eq!(headless.violations(), vec![GfxHeadlessViolation::EventDeadlock(event.handle())]);
    }

    #[test]
    fn test_resubmit_pending_command_buffer_is_violation() {
        let (headless, device) = new_device();
        let cmd = GfxCommandBuffer::new(device.clone(), "cmd");
        cmd.begin(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);
        cmd.end();

        let fence = GfxFence::new(device.clone(), false, "fence");
        device.queue_submit(&[GfxSubmitInfo::new(&[&cmd])], Some(fence.handle()));
        device.queue_submit(&[GfxSubmitInfo::new(&[&cmd])], None);

        assert_eq!(headless.violations(), vec![GfxHeadlessViolation::CommandBufferReusedWhilePending(cmd.vk_handle())]);
    }

    #[test]
    fn test_draw_outside_render_pass_is_violation() {
        let (headless, device) = new_device();
        let cmd = GfxCommandBuffer::new(device.clone(), "cmd");
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        cmd.cmd_draw(3, 1, 0, 0);
        cmd.cmd_begin_render_pass(vk::RenderPass::null(), vk::Framebuffer::null(), vk::Extent2D::default(), &[]);
        cmd.end();

        assert_eq!(
            headless.violations(),
            vec![
                GfxHeadlessViolation::DrawOutsideRenderPass(cmd.vk_handle()),
                GfxHeadlessViolation::RenderPassNotEnded(cmd.vk_handle())
            ]
        );
    }

    #[test]
    fn test_pipeline_objects_are_released() {
        let (headless, device) = new_device();
        let render_pass = GfxRenderPass::new(
            device.clone(),
            GfxRenderPassDesc {
                attachments: vec![vk::AttachmentDescription::default().format(vk::Format::R8G8B8A8_UNORM)],
                color_references: vec![vk::AttachmentReference {
                    attachment: 0,
                    layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                }],
                input_references: vec![],
            },
            "pass",
        );
        let layout = Rc::new(GfxPipelineLayout::new(device.clone(), &[], "layout"));
        let stage = GfxShaderStage::new(device.clone(), vk::ShaderStageFlags::VERTEX, &[0x0723_0203], "main", "vs");
        let desc = GfxGraphicsPipelineDesc {
            layout: vk::PipelineLayout::null(),
            render_pass: render_pass.handle(),
            stages: vec![stage.desc()],
            vertex_bindings: vec![],
            vertex_attributes: vec![],
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            extent: vk::Extent2D { width: 4, height: 4 },
            color_attachment_count: render_pass.color_attachment_count(),
            blend_enabled: true,
        };
        let pipeline = GfxPipeline::new_graphics(device.clone(), desc, layout.clone(), "pipeline");
        drop(stage);

        let created = headless.graphics_pipeline_desc(pipeline.handle()).unwrap();
        assert_eq!(created.layout, layout.handle());
        assert_eq!(created.color_attachment_count, 1);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::ShaderModule), 0);

        drop(layout);
        drop(pipeline);
        drop(render_pass);
        for ty in [GfxHeadlessObjectType::Pipeline, GfxHeadlessObjectType::PipelineLayout, GfxHeadlessObjectType::RenderPass] {
            assert_eq!(headless.live_count(ty), 0, "{:?}", ty);
        }
        assert!(headless.violations().is_empty());
    }
}
