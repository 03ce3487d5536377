use ash::vk;
use vkrg_gfx::resources::image::GfxImageView;

use crate::{
    resource::{RgImageResource, RgResourceHooks, slot_at},
    settings::RgGraphSettings,
};

/// 交换链的 image
///
/// image 属于交换链，这里只创建 view；resource index 即交换链 image 的下标
#[derive(Default)]
pub struct RgSwapchainImageResource {
    name: String,
    format: vk::Format,
    images: Vec<vk::Image>,
    views: Vec<GfxImageView>,
}

impl RgSwapchainImageResource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RgResourceHooks for RgSwapchainImageResource {
    fn compile(&mut self, settings: &RgGraphSettings, name: &str) {
        self.views.clear();
        self.images.clear();
        self.name = name.to_string();

        let Some(swapchain) = settings.swapchain.as_ref() else {
            vkrg_crate_tools::rg_break!("swapchain image {} is compiled without a swapchain", name);
            return;
        };
        vkrg_crate_tools::rg_assert!(
            swapchain.images.len() == settings.resource_count as usize,
            "swapchain has {} images but resource count is {}",
            swapchain.images.len(),
            settings.resource_count
        );

        self.format = swapchain.format;
        self.images = swapchain.images.clone();
        self.views = self
            .images
            .iter()
            .enumerate()
            .map(|(i, &image)| {
                GfxImageView::new_2d_layer(settings.device.clone(), image, self.format, 0, format!("{}-{}", name, i))
            })
            .collect();
    }

    #[inline]
    fn is_compiled(&self) -> bool {
        !self.views.is_empty()
    }
}

impl RgImageResource for RgSwapchainImageResource {
    fn images(&self) -> Vec<vk::Image> {
        self.images.clone()
    }

    fn images_for(&self, resource_index: u32) -> Vec<vk::Image> {
        slot_at(&self.images, resource_index, &self.name).copied().into_iter().collect()
    }

    fn image_view(&self, resource_index: u32, _layer: u32) -> vk::ImageView {
        slot_at(&self.views, resource_index, &self.name).map_or(vk::ImageView::null(), |v| v.handle())
    }

    /// 交换链 image 不会被采样
    #[inline]
    fn sampler(&self) -> vk::Sampler {
        vk::Sampler::null()
    }

    #[inline]
    fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    fn initial_layout(&self) -> vk::ImageLayout {
        vk::ImageLayout::UNDEFINED
    }

    #[inline]
    fn final_layout(&self) -> vk::ImageLayout {
        vk::ImageLayout::PRESENT_SRC_KHR
    }

    #[inline]
    fn layer_count(&self) -> u32 {
        1
    }
}

#[cfg(test)]
mod tests {
    use vkrg_gfx::{backend::headless::GfxHeadlessObjectType, swapchain::GfxSwapchain};

    use super::*;
    use crate::test_utils::headless_device;

    #[test]
    fn test_views_follow_swapchain_images() {
        let (headless, device) = headless_device();
        let swapchain = GfxSwapchain::new(
            device.clone(),
            headless.create_swapchain(3, vk::Extent2D { width: 320, height: 240 }),
        );
        let mut resource = RgSwapchainImageResource::new();
        resource.compile(&RgGraphSettings::from_swapchain(device.clone(), &swapchain), "backbuffer");

        assert_eq!(resource.format(), swapchain.format());
        assert_eq!(resource.images(), swapchain.images());
        assert_eq!(resource.images_for(2), vec![swapchain.images()[2]]);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::ImageView), 3);
        assert_eq!(resource.final_layout(), vk::ImageLayout::PRESENT_SRC_KHR);

        drop(resource);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::ImageView), 0);
        // image 属于交换链
        assert_eq!(headless.live_count(GfxHeadlessObjectType::Image), 3);
    }

    #[test]
    #[should_panic(expected = "Debug Break")]
    fn test_compile_without_swapchain_is_reported() {
        let (_headless, device) = headless_device();
        let mut resource = RgSwapchainImageResource::new();
        resource.compile(&RgGraphSettings::new(device, 2), "backbuffer");
    }
}
