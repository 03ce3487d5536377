/// 观察一帧中的各个阶段，只用于统计与调试，不影响调度
///
/// 参数：fence 相关的 hook 是 frame slot，acquire 相关的是交换链 image 下标，render / present 是 resource index
#[allow(unused_variables)]
pub trait RgFrameDisplayObserver {
    fn on_image_fence_wait_started(&mut self, frame_slot: u32) {}
    fn on_image_fence_wait_ended(&mut self, frame_slot: u32) {}
    fn on_image_acquisition_started(&mut self) {}
    fn on_image_acquisition_returned(&mut self, image_index: u32) {}
    fn on_image_acquisition_fence_signaled(&mut self, image_index: u32) {}
    fn on_image_acquisition_ended(&mut self, image_index: u32) {}
    fn on_render_started(&mut self, resource_index: u32) {}
    fn on_present_started(&mut self, resource_index: u32) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RgNoopFrameDisplayObserver;

impl RgFrameDisplayObserver for RgNoopFrameDisplayObserver {}
