use ash::vk;

use crate::{commands::command_buffer::GfxCommandBuffer, device::GfxDeviceRef};

/// 同一个 queue 内部的细粒度同步原语
///
/// 用于单缓冲的可写资源：写入之后 set，读取之前 wait
pub struct GfxEvent {
    device: GfxDeviceRef,
    event: vk::Event,
}

// 创建与销毁
impl GfxEvent {
    pub fn new(device: GfxDeviceRef, debug_name: &str) -> Self {
        let event = device.create_event(debug_name);
        Self { device, event }
    }
}
impl Drop for GfxEvent {
    fn drop(&mut self) {
        self.device.destroy_event(self.event);
    }
}

// getters
impl GfxEvent {
    #[inline]
    pub fn handle(&self) -> vk::Event {
        self.event
    }
}

// tools
impl GfxEvent {
    #[inline]
    pub fn cmd_set(&self, cmd: &GfxCommandBuffer, stage: vk::PipelineStageFlags2) {
        self.device.cmd_set_event(cmd.vk_handle(), self.event, stage);
    }

    #[inline]
    pub fn cmd_reset(&self, cmd: &GfxCommandBuffer, stage: vk::PipelineStageFlags2) {
        self.device.cmd_reset_event(cmd.vk_handle(), self.event, stage);
    }

    #[inline]
    pub fn cmd_wait(&self, cmd: &GfxCommandBuffer, src_stage: vk::PipelineStageFlags2, dst_stage: vk::PipelineStageFlags2) {
        self.device.cmd_wait_event(cmd.vk_handle(), self.event, src_stage, dst_stage);
    }
}
