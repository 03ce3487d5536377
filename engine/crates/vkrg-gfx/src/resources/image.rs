use ash::vk;

use crate::{
    commands::one_time::one_time_exec,
    device::{GfxDeviceRef, GfxImageDesc, GfxImageViewDesc},
    resources::buffer::GfxBuffer,
};

/// 独占的 image 对象，drop 时销毁
pub struct GfxImage {
    device: GfxDeviceRef,
    handle: vk::Image,
    desc: GfxImageDesc,
    name: String,
}
impl Drop for GfxImage {
    fn drop(&mut self) {
        self.device.destroy_image(self.handle);
    }
}
// new & init
impl GfxImage {
    pub fn new(device: GfxDeviceRef, desc: GfxImageDesc, name: impl AsRef<str>) -> Self {
        let handle = device.create_image(&desc, name.as_ref());
        Self {
            device,
            handle,
            desc,
            name: name.as_ref().to_string(),
        }
    }
}
// getters
impl GfxImage {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn desc(&self) -> &GfxImageDesc {
        &self.desc
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn layer_count(&self) -> u32 {
        self.desc.array_layers
    }
}
// tools
impl GfxImage {
    /// 通过 staging buffer 将像素数据拷贝到某一层
    ///
    /// 该层先从 `old_layout` 转换为 TRANSFER_DST，拷贝完成后转换为 `final_layout`
    pub fn copy_layer(&self, old_layout: vk::ImageLayout, data: &[u8], layer: u32, final_layout: vk::ImageLayout) {
        assert!(layer < self.desc.array_layers, "layer {} out of range for image {}", layer, self.name);

        let stage = GfxBuffer::new_host_visible(
            self.device.clone(),
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            format!("{}-stage-layer-{}", self.name, layer),
        );
        stage.write(0, data);

        one_time_exec(&self.device, &format!("{}-copy-layer-{}", self.name, layer), |cmd| {
            cmd.cmd_transition_image_layer(self.handle, layer, old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
            cmd.cmd_copy_buffer_to_image(
                stage.handle(),
                self.handle,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[vk::BufferImageCopy {
                    buffer_offset: 0,
                    buffer_row_length: 0,
                    buffer_image_height: 0,
                    image_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: 0,
                        base_array_layer: layer,
                        layer_count: 1,
                    },
                    image_offset: vk::Offset3D::default(),
                    image_extent: self.desc.extent,
                }],
            );
            cmd.cmd_transition_image_layer(self.handle, layer, vk::ImageLayout::TRANSFER_DST_OPTIMAL, final_layout);
        });
    }

    /// 将每一层从 UNDEFINED 转换为 `layout`
    pub fn transition_all_layers(&self, layout: vk::ImageLayout) {
        one_time_exec(&self.device, &format!("{}-transition", self.name), |cmd| {
            for layer in 0..self.desc.array_layers {
                cmd.cmd_transition_image_layer(self.handle, layer, vk::ImageLayout::UNDEFINED, layout);
            }
        });
    }
}

/// 独占的 image view 对象，drop 时销毁
pub struct GfxImageView {
    device: GfxDeviceRef,
    handle: vk::ImageView,
    desc: GfxImageViewDesc,
}
impl Drop for GfxImageView {
    fn drop(&mut self) {
        self.device.destroy_image_view(self.handle);
    }
}
// new & init
impl GfxImageView {
    pub fn new(device: GfxDeviceRef, desc: GfxImageViewDesc, name: impl AsRef<str>) -> Self {
        let handle = device.create_image_view(&desc, name.as_ref());
        Self { device, handle, desc }
    }

    /// 2D image 中某一层的 color view
    pub fn new_2d_layer(
        device: GfxDeviceRef,
        image: vk::Image,
        format: vk::Format,
        layer: u32,
        name: impl AsRef<str>,
    ) -> Self {
        Self::new(
            device,
            GfxImageViewDesc {
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format,
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_array_layer: layer,
                layer_count: 1,
            },
            name,
        )
    }
}
// getters
impl GfxImageView {
    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }

    #[inline]
    pub fn desc(&self) -> &GfxImageViewDesc {
        &self.desc
    }
}
