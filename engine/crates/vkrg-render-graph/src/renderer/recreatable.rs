use std::time::{Duration, Instant};

use vkrg_gfx::{
    commands::semaphore::GfxSemaphore,
    commands::fence::GfxFence,
    device::GfxDeviceRef,
    swapchain::{GfxSwapchain, GfxSwapchainStatus},
};

use crate::{graph::RenderGraph, settings::RgGraphSettings};

/// 提交之前调用：graph、本帧的 resource index、距离上一帧的时间
pub type RgPreSubmitListener = Box<dyn FnMut(&RenderGraph, u32, Duration)>;

/// 渲染器共用的交换链部分：acquire、present、失效后的重建
pub struct RgRecreatableSwapchain {
    device: GfxDeviceRef,
    swapchain: GfxSwapchain,
    pre_submit_listeners: Vec<RgPreSubmitListener>,
    last_draw_time: Instant,
    frame_id: u64,
}

// new & init
impl RgRecreatableSwapchain {
    pub fn new(device: GfxDeviceRef, swapchain: GfxSwapchain) -> Self {
        Self {
            device,
            swapchain,
            pre_submit_listeners: vec![],
            last_draw_time: Instant::now(),
            frame_id: 0,
        }
    }
}

// getters
impl RgRecreatableSwapchain {
    #[inline]
    pub fn device(&self) -> &GfxDeviceRef {
        &self.device
    }

    #[inline]
    pub fn swapchain(&self) -> &GfxSwapchain {
        &self.swapchain
    }

    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// 用于日志：`[F{frame_id}-{slot}]`
    #[inline]
    pub fn frame_name(&self, frame_slot: u32) -> String {
        format!("[F{}-{}]", self.frame_id, frame_slot)
    }

    /// 按照当前交换链编译 graph 时使用的设置
    pub fn graph_settings(&self) -> RgGraphSettings {
        RgGraphSettings::from_swapchain(self.device.clone(), &self.swapchain)
    }
}

// update
impl RgRecreatableSwapchain {
    #[inline]
    pub fn add_pre_submit_listener(&mut self, listener: RgPreSubmitListener) {
        self.pre_submit_listeners.push(listener);
    }

    /// 成功时返回 image 下标以及是否需要在 present 之后重建
    pub fn acquire(&mut self, semaphore: &GfxSemaphore, fence: Option<&GfxFence>, timeout: u64) -> Option<(u32, bool)> {
        match self.swapchain.acquire_next_image(Some(semaphore), fence, timeout) {
            GfxSwapchainStatus::OutOfDate => None,
            status => Some((self.swapchain.current_image_index() as u32, status.need_recreate())),
        }
    }

    pub fn notify_pre_submit(&mut self, graph: &RenderGraph, resource_index: u32) {
        let now = Instant::now();
        let delta = now - self.last_draw_time;
        self.last_draw_time = now;
        for listener in &mut self.pre_submit_listeners {
            listener(graph, resource_index, delta);
        }
    }

    /// 返回是否需要重建交换链
    pub fn present(&mut self, image_index: u32, wait_semaphore: &GfxSemaphore) -> bool {
        let status = self.swapchain.present_image(image_index, &[wait_semaphore]);
        self.frame_id = self.frame_id.wrapping_add(1);
        status.need_recreate()
    }

    /// 等待设备空闲，重建交换链，并按照新的交换链重新编译 graph
    ///
    /// 调度器自己的同步对象由调度器在之后按照新的 image 数量调整
    pub fn recreate(&mut self, graph: &mut RenderGraph) {
        let _span = vkrg_crate_tools::profile_span!("RgRecreatableSwapchain::recreate");
        log::info!("recreate swapchain at frame {}", self.frame_id);
        self.device.device_wait_idle();
        self.swapchain.recreate();
        graph.compile(self.graph_settings());
    }
}
