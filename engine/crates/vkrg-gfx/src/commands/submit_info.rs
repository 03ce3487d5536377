use ash::vk;
use itertools::Itertools;

use crate::commands::{command_buffer::GfxCommandBuffer, semaphore::GfxSemaphore};

/// Gfx 关于 submitInfo 的封装，更易用
///
/// 只保存 handle，在提交时才转换为 `vk::SubmitInfo2`，避免悬垂指针
#[derive(Default, Clone, Debug)]
pub struct GfxSubmitInfo {
    command_buffers: Vec<vk::CommandBuffer>,
    wait_infos: Vec<(vk::Semaphore, vk::PipelineStageFlags2)>,
    signal_infos: Vec<(vk::Semaphore, vk::PipelineStageFlags2)>,
}

impl GfxSubmitInfo {
    pub fn new(commands: &[&GfxCommandBuffer]) -> Self {
        Self {
            command_buffers: commands.iter().map(|cmd| cmd.vk_handle()).collect_vec(),
            wait_infos: vec![],
            signal_infos: vec![],
        }
    }

    #[inline]
    pub fn wait(mut self, semaphore: &GfxSemaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.wait_infos.push((semaphore.handle(), stage));
        self
    }

    #[inline]
    pub fn signal(mut self, semaphore: &GfxSemaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.signal_infos.push((semaphore.handle(), stage));
        self
    }
}
// getters
impl GfxSubmitInfo {
    #[inline]
    pub fn command_buffers(&self) -> &[vk::CommandBuffer] {
        &self.command_buffers
    }

    #[inline]
    pub fn wait_semaphores(&self) -> impl Iterator<Item = vk::Semaphore> + '_ {
        self.wait_infos.iter().map(|(s, _)| *s)
    }

    #[inline]
    pub fn signal_semaphores(&self) -> impl Iterator<Item = vk::Semaphore> + '_ {
        self.signal_infos.iter().map(|(s, _)| *s)
    }
}
// tools
impl GfxSubmitInfo {
    /// 将 submit info 转换为 vulkan 的结构体，并在回调中使用
    pub fn with_vk_submit_infos<R>(infos: &[Self], f: impl FnOnce(&[vk::SubmitInfo2<'_>]) -> R) -> R {
        let command_buffer_infos = infos
            .iter()
            .map(|info| {
                info.command_buffers
                    .iter()
                    .map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(*cmd))
                    .collect_vec()
            })
            .collect_vec();
        let semaphore_infos = |list: &[(vk::Semaphore, vk::PipelineStageFlags2)]| {
            list.iter()
                .map(|(semaphore, stage)| vk::SemaphoreSubmitInfo::default().semaphore(*semaphore).stage_mask(*stage))
                .collect_vec()
        };
        let wait_infos = infos.iter().map(|info| semaphore_infos(&info.wait_infos)).collect_vec();
        let signal_infos = infos.iter().map(|info| semaphore_infos(&info.signal_infos)).collect_vec();

        let submit_infos = (0..infos.len())
            .map(|i| {
                vk::SubmitInfo2::default()
                    .command_buffer_infos(&command_buffer_infos[i])
                    .wait_semaphore_infos(&wait_infos[i])
                    .signal_semaphore_infos(&signal_infos[i])
            })
            .collect_vec();
        f(&submit_infos)
    }
}
