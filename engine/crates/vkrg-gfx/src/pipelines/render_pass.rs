use ash::vk;

use crate::device::{GfxDeviceRef, GfxFramebufferDesc, GfxRenderPassDesc};

/// 只有一个 subpass 的 render pass
pub struct GfxRenderPass {
    device: GfxDeviceRef,
    handle: vk::RenderPass,
    desc: GfxRenderPassDesc,
}
// new & init
impl GfxRenderPass {
    pub fn new(device: GfxDeviceRef, desc: GfxRenderPassDesc, name: &str) -> Self {
        let handle = device.create_render_pass(&desc, name);
        Self { device, handle, desc }
    }
}
// getters
impl GfxRenderPass {
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    #[inline]
    pub fn color_attachment_count(&self) -> u32 {
        self.desc.color_references.len() as u32
    }

    #[inline]
    pub fn attachment_count(&self) -> usize {
        self.desc.attachments.len()
    }
}
impl Drop for GfxRenderPass {
    fn drop(&mut self) {
        self.device.destroy_render_pass(self.handle);
    }
}

pub struct GfxFramebuffer {
    device: GfxDeviceRef,
    handle: vk::Framebuffer,
    extent: vk::Extent2D,
}
// new & init
impl GfxFramebuffer {
    pub fn new(
        device: GfxDeviceRef,
        render_pass: &GfxRenderPass,
        attachments: Vec<vk::ImageView>,
        extent: vk::Extent2D,
        name: &str,
    ) -> Self {
        let desc = GfxFramebufferDesc {
            render_pass: render_pass.handle(),
            attachments,
            extent,
        };
        let handle = device.create_framebuffer(&desc, name);
        Self { device, handle, extent }
    }
}
// getters
impl GfxFramebuffer {
    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.handle
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}
impl Drop for GfxFramebuffer {
    fn drop(&mut self) {
        self.device.destroy_framebuffer(self.handle);
    }
}
