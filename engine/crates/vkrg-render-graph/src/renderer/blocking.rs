use ash::vk;
use vkrg_gfx::{commands::semaphore::GfxSemaphore, device::GfxDeviceRef, swapchain::GfxSwapchain};

use crate::{
    graph::RenderGraph,
    renderer::{RgFrameDisplayObserver, RgGraphRenderer, RgPreSubmitListener, RgRecreatableSwapchain},
    settings::RgGraphSettings,
};

/// 每帧结束时等待设备空闲，只有一组同步对象
///
/// 没有任何帧间重叠，用于验证多帧并行调度的结果
pub struct BlockingGraphRenderer {
    target: RgRecreatableSwapchain,
    image_available: GfxSemaphore,
    render_finished: GfxSemaphore,
    last_resource_index: Option<u32>,
}

impl BlockingGraphRenderer {
    pub fn new(device: GfxDeviceRef, swapchain: GfxSwapchain) -> Self {
        Self {
            image_available: GfxSemaphore::new(device.clone(), "blocking-image-available"),
            render_finished: GfxSemaphore::new(device.clone(), "blocking-render-finished"),
            target: RgRecreatableSwapchain::new(device, swapchain),
            last_resource_index: None,
        }
    }

    #[inline]
    pub fn swapchain(&self) -> &GfxSwapchain {
        self.target.swapchain()
    }

    #[inline]
    pub fn graph_settings(&self) -> RgGraphSettings {
        self.target.graph_settings()
    }
}

impl RgGraphRenderer for BlockingGraphRenderer {
    #[inline]
    fn last_render_resource_index(&self) -> Option<u32> {
        self.last_resource_index
    }

    fn render_next_frame(&mut self, graph: &mut RenderGraph, observer: &mut dyn RgFrameDisplayObserver) -> Option<u32> {
        let _span = vkrg_crate_tools::profile_span!("BlockingGraphRenderer::render_next_frame");

        observer.on_image_acquisition_started();
        let Some((image_index, suboptimal)) = self.target.acquire(&self.image_available, None, u64::MAX) else {
            self.recreate(graph);
            return None;
        };
        observer.on_image_acquisition_returned(image_index);
        observer.on_image_acquisition_ended(image_index);

        observer.on_render_started(image_index);
        self.target.notify_pre_submit(graph, image_index);
        graph.submit(
            image_index,
            &[(&self.image_available, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)],
            &[&self.render_finished],
            None,
        );
        self.last_resource_index = Some(image_index);

        observer.on_present_started(image_index);
        let present_suboptimal = self.target.present(image_index, &self.render_finished);
        self.target.device().device_wait_idle();

        if suboptimal || present_suboptimal {
            self.recreate(graph);
        }
        Some(image_index)
    }

    fn recreate(&mut self, graph: &mut RenderGraph) {
        self.target.recreate(graph);
    }

    #[inline]
    fn frames_in_flight(&self) -> u32 {
        1
    }

    #[inline]
    fn add_pre_submit_listener(&mut self, listener: RgPreSubmitListener) {
        self.target.add_pre_submit_listener(listener);
    }
}
