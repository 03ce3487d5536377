use ash::vk;
use vkrg_gfx::{
    device::{GfxImageDesc, GfxImageViewDesc},
    resources::{
        image::{GfxImage, GfxImageView},
        sampler::{GfxSampler, GfxSamplerDesc},
    },
};

use crate::{
    resource::{RgImageResource, RgResourceHooks},
    settings::RgGraphSettings,
};

struct ReadOnlyImageObjects {
    image: GfxImage,
    view: GfxImageView,
    sampler: GfxSampler,
}

/// 只读的纹理
///
/// 所有 resource index 共享同一个 image，只允许编译一次。
/// 创建后处于 SHADER_READ_ONLY_OPTIMAL，通过 [`RgReadOnlyImageResource::copy_layer`] 上传像素。
pub struct RgReadOnlyImageResource {
    format: vk::Format,
    filter: vk::Filter,
    extent: vk::Extent3D,
    layer_count: u32,

    objects: Option<ReadOnlyImageObjects>,
}

// new & init
impl RgReadOnlyImageResource {
    /// `depth > 1` 时为 3D image，此时只能有一层
    pub fn new(format: vk::Format, filter: vk::Filter, width: u32, height: u32, depth: u32, layer_count: u32) -> Self {
        vkrg_crate_tools::rg_assert!(
            depth <= 1 || layer_count <= 1,
            "3D image can not have {} layers",
            layer_count
        );
        Self {
            format,
            filter,
            extent: vk::Extent3D {
                width: width.max(1),
                height: height.max(1),
                depth: depth.max(1),
            },
            layer_count: layer_count.max(1),
            objects: None,
        }
    }

    #[inline]
    pub fn new_2d(format: vk::Format, filter: vk::Filter, width: u32, height: u32) -> Self {
        Self::new(format, filter, width, height, 1, 1)
    }

    fn view_type(&self) -> vk::ImageViewType {
        if self.extent.depth > 1 {
            vk::ImageViewType::TYPE_3D
        } else if self.layer_count > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        }
    }
}

// getters
impl RgReadOnlyImageResource {
    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    #[inline]
    pub fn filter(&self) -> vk::Filter {
        self.filter
    }
}

// tools
impl RgReadOnlyImageResource {
    /// 上传某一层的像素，数据按照 image 的格式紧密排列
    pub fn copy_layer<T: bytemuck::Pod>(&self, pixels: &[T], layer: u32) {
        let Some(objects) = self.objects.as_ref() else {
            vkrg_crate_tools::rg_break!("copy pixels into read only image before it is compiled");
            return;
        };
        if !vkrg_crate_tools::rg_verify!(layer < self.layer_count, "layer {} out of {}", layer, self.layer_count) {
            return;
        }
        objects.image.copy_layer(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            bytemuck::cast_slice(pixels),
            layer,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
    }
}

impl RgResourceHooks for RgReadOnlyImageResource {
    fn compile(&mut self, settings: &RgGraphSettings, name: &str) {
        if !vkrg_crate_tools::rg_verify!(self.objects.is_none(), "read only image {} is compiled twice", name) {
            return;
        }
        let device = settings.device.clone();

        let mut desc = GfxImageDesc::new_2d(
            self.extent.width,
            self.extent.height,
            self.layer_count,
            self.format,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        );
        if self.extent.depth > 1 {
            desc.image_type = vk::ImageType::TYPE_3D;
            desc.extent.depth = self.extent.depth;
        }
        let image = GfxImage::new(device.clone(), desc, name);
        let view = GfxImageView::new(
            device.clone(),
            GfxImageViewDesc {
                image: image.handle(),
                view_type: self.view_type(),
                format: self.format,
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_array_layer: 0,
                layer_count: self.layer_count,
            },
            format!("{}-view", name),
        );
        let sampler = GfxSampler::new(device, &GfxSamplerDesc::with_filter(self.filter), format!("{}-sampler", name));

        image.transition_all_layers(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        self.objects = Some(ReadOnlyImageObjects { image, view, sampler });
    }

    #[inline]
    fn is_compiled(&self) -> bool {
        self.objects.is_some()
    }

    #[inline]
    fn is_compile_once(&self) -> bool {
        true
    }
}

impl RgImageResource for RgReadOnlyImageResource {
    fn images(&self) -> Vec<vk::Image> {
        self.objects.iter().map(|o| o.image.handle()).collect()
    }

    fn images_for(&self, _resource_index: u32) -> Vec<vk::Image> {
        self.images()
    }

    /// 一个 view 覆盖所有层
    fn image_view(&self, _resource_index: u32, _layer: u32) -> vk::ImageView {
        self.objects.as_ref().map_or(vk::ImageView::null(), |o| o.view.handle())
    }

    fn sampler(&self) -> vk::Sampler {
        self.objects.as_ref().map_or(vk::Sampler::null(), |o| o.sampler.handle())
    }

    #[inline]
    fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    fn initial_layout(&self) -> vk::ImageLayout {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    }

    #[inline]
    fn final_layout(&self) -> vk::ImageLayout {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    }

    #[inline]
    fn layer_count(&self) -> u32 {
        self.layer_count
    }
}

#[cfg(test)]
mod tests {
    use vkrg_gfx::backend::headless::{GfxHeadlessCall, GfxHeadlessObjectType};

    use super::*;
    use crate::test_utils::{graph_settings, headless_device};

    #[test]
    fn test_compile_creates_shared_objects() {
        let (headless, device) = headless_device();
        let mut image = RgReadOnlyImageResource::new(vk::Format::R8G8B8A8_UNORM, vk::Filter::NEAREST, 4, 4, 1, 3);
        image.compile(&graph_settings(&device, 3), "albedo");

        assert!(image.is_compiled());
        assert_eq!(headless.live_count(GfxHeadlessObjectType::Image), 1);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::ImageView), 1);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::Sampler), 1);
        assert_eq!(image.image_view(0, 0), image.image_view(2, 1));
        assert_eq!(image.images_for(1), image.images());
        assert_eq!(image.view_type(), vk::ImageViewType::TYPE_2D_ARRAY);
    }

    #[test]
    fn test_copy_layer_uploads_through_staging() {
        let (headless, device) = headless_device();
        let mut image = RgReadOnlyImageResource::new_2d(vk::Format::R8G8B8A8_UNORM, vk::Filter::LINEAR, 2, 1);
        image.compile(&graph_settings(&device, 2), "lut");
        headless.clear_calls();

        image.copy_layer(&[0xff00_00ff_u32, 0x00ff_00ff], 0);

        let submits = headless.calls().into_iter().filter(|c| matches!(c, GfxHeadlessCall::Submit { .. })).count();
        assert_eq!(submits, 1);
        assert!(headless.violations().is_empty());
        // staging buffer 在拷贝完成后释放
        assert_eq!(headless.live_count(GfxHeadlessObjectType::Buffer), 0);
    }

    #[test]
    #[should_panic(expected = "Verify Failed")]
    fn test_compile_twice_is_reported() {
        let (_headless, device) = headless_device();
        let mut image = RgReadOnlyImageResource::new_2d(vk::Format::R8G8B8A8_UNORM, vk::Filter::LINEAR, 1, 1);
        let settings = graph_settings(&device, 1);
        image.compile(&settings, "once");
        image.compile(&settings, "once");
    }

    #[test]
    fn test_drop_releases_objects() {
        let (headless, device) = headless_device();
        {
            let mut image = RgReadOnlyImageResource::new(vk::Format::R8_UNORM, vk::Filter::LINEAR, 8, 8, 8, 1);
            image.compile(&graph_settings(&device, 1), "volume");
            assert_eq!(image.view_type(), vk::ImageViewType::TYPE_3D);
        }
        assert_eq!(headless.live_count(GfxHeadlessObjectType::Image), 0);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::Sampler), 0);
    }
}
