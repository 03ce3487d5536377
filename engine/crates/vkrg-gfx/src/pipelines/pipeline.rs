use std::rc::Rc;

use ash::vk;

use crate::device::{GfxDeviceRef, GfxGraphicsPipelineDesc, GfxShaderStageDesc};

pub struct GfxPipelineLayout {
    device: GfxDeviceRef,
    handle: vk::PipelineLayout,
}
impl GfxPipelineLayout {
    pub fn new(device: GfxDeviceRef, set_layouts: &[vk::DescriptorSetLayout], name: &str) -> Self {
        let handle = device.create_pipeline_layout(set_layouts, name);
        Self { device, handle }
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }
}
impl Drop for GfxPipelineLayout {
    fn drop(&mut self) {
        self.device.destroy_pipeline_layout(self.handle);
    }
}

/// 图形管线或者计算管线
pub struct GfxPipeline {
    device: GfxDeviceRef,
    handle: vk::Pipeline,
    bind_point: vk::PipelineBindPoint,

    /// 多个 pipeline 可以使用同一个 pipeline layout，所以这里使用 Rc
    layout: Rc<GfxPipelineLayout>,
}
// new & init
impl GfxPipeline {
    /// `desc.layout` 会被替换为 `layout` 的 handle
    pub fn new_graphics(
        device: GfxDeviceRef,
        mut desc: GfxGraphicsPipelineDesc,
        layout: Rc<GfxPipelineLayout>,
        name: &str,
    ) -> Self {
        desc.layout = layout.handle();
        let handle = device.create_graphics_pipeline(&desc, name);
        Self {
            device,
            handle,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            layout,
        }
    }

    pub fn new_compute(
        device: GfxDeviceRef,
        stage: &GfxShaderStageDesc,
        layout: Rc<GfxPipelineLayout>,
        name: &str,
    ) -> Self {
        let handle = device.create_compute_pipeline(layout.handle(), stage, name);
        Self {
            device,
            handle,
            bind_point: vk::PipelineBindPoint::COMPUTE,
            layout,
        }
    }
}
// getters
impl GfxPipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }
}
impl Drop for GfxPipeline {
    fn drop(&mut self) {
        self.device.destroy_pipeline(self.handle);
    }
}
