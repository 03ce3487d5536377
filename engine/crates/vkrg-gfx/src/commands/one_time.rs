use ash::vk;

use crate::{
    commands::{command_buffer::GfxCommandBuffer, fence::GfxFence, submit_info::GfxSubmitInfo},
    device::GfxDeviceRef,
};

/// 录制一次性的命令，提交并阻塞等待执行完成
///
/// 用于资源上传、回读等初始化阶段的操作
pub fn one_time_exec<F, R>(device: &GfxDeviceRef, name: &str, func: F) -> R
where
    F: FnOnce(&GfxCommandBuffer) -> R,
{
    let _span = vkrg_crate_tools::profile_span!("one_time_exec");

    let command_buffer = GfxCommandBuffer::new(device.clone(), &format!("one-time-{}", name));
    command_buffer.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    let result = func(&command_buffer);
    command_buffer.end();

    let fence = GfxFence::new(device.clone(), false, &format!("one-time-{}", name));
    device.queue_submit(&[GfxSubmitInfo::new(&[&command_buffer])], Some(fence.handle()));
    fence.wait();

    result
}
