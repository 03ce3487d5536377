use ash::vk;

use crate::{
    commands::{fence::GfxFence, semaphore::GfxSemaphore},
    device::{GfxDeviceRef, GfxSwapchainDesc},
};

/// acquire / present 的结果
///
/// 交换链失效不是错误，调用方需要走重建流程
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GfxSwapchainStatus {
    Optimal,
    /// 本次 acquire / present 成功，但交换链应当尽快重建
    Suboptimal,
    /// 本次 acquire / present 没有发生，必须先重建交换链
    OutOfDate,
}
impl GfxSwapchainStatus {
    #[inline]
    pub fn need_recreate(self) -> bool {
        self != Self::Optimal
    }
}

/// 交换链
///
/// 交换链的创建（surface、present mode 等）在设备后端中完成，这里只负责 acquire / present / 重建
pub struct GfxSwapchain {
    device: GfxDeviceRef,
    desc: GfxSwapchainDesc,
    swapchain_image_index: usize,
}

// new & init
impl GfxSwapchain {
    pub fn new(device: GfxDeviceRef, desc: GfxSwapchainDesc) -> Self {
        log::info!(
            "swapchain created: {} images, format {:?}, extent {}x{}",
            desc.images.len(),
            desc.format,
            desc.extent.width,
            desc.extent.height
        );
        Self {
            device,
            desc,
            swapchain_image_index: 0,
        }
    }
}
impl Drop for GfxSwapchain {
    fn drop(&mut self) {
        self.device.destroy_swapchain(self.desc.handle);
    }
}

// getters
impl GfxSwapchain {
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.desc.handle
    }

    #[inline]
    pub fn desc(&self) -> &GfxSwapchainDesc {
        &self.desc
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.desc.images
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.desc.images.len() as u32
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    #[inline]
    pub fn current_image_index(&self) -> usize {
        self.swapchain_image_index
    }
}

// update
impl GfxSwapchain {
    /// timeout: nano seconds
    ///
    /// 成功时 [`GfxSwapchain::current_image_index`] 更新为新获取的 image
    pub fn acquire_next_image(
        &mut self,
        semaphore: Option<&GfxSemaphore>,
        fence: Option<&GfxFence>,
        timeout: u64,
    ) -> GfxSwapchainStatus {
        let result = self.device.acquire_next_image(
            self.desc.handle,
            timeout,
            semaphore.map(|s| s.handle()),
            fence.map(|f| f.handle()),
        );

        match result {
            Ok((image_index, is_suboptimal)) => {
                self.swapchain_image_index = image_index as usize;
                if is_suboptimal {
                    log::warn!("swapchain acquire image index {} is not optimal", image_index);
                    GfxSwapchainStatus::Suboptimal
                } else {
                    GfxSwapchainStatus::Optimal
                }
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when acquire next image");
                GfxSwapchainStatus::OutOfDate
            }
            Err(e) => {
                panic!("failed to acquire next image: {:?}", e);
            }
        }
    }

    pub fn present_image(&self, image_index: u32, wait_semaphores: &[&GfxSemaphore]) -> GfxSwapchainStatus {
        let wait_semaphores = wait_semaphores.iter().map(|s| s.handle()).collect::<Vec<_>>();
        match self.device.queue_present(self.desc.handle, image_index, &wait_semaphores) {
            Ok(false) => GfxSwapchainStatus::Optimal,
            Ok(true) => {
                log::warn!("swapchain is suboptimal when present image {}", image_index);
                GfxSwapchainStatus::Suboptimal
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when present image {}", image_index);
                GfxSwapchainStatus::OutOfDate
            }
            Err(e) => {
                panic!("failed to present image {}: {:?}", image_index, e);
            }
        }
    }

    /// 重建交换链，调用前需要保证设备已经空闲
    pub fn recreate(&mut self) {
        let desc = self.device.recreate_swapchain(self.desc.handle);
        log::info!(
            "swapchain recreated: {} images, extent {}x{}",
            desc.images.len(),
            desc.extent.width,
            desc.extent.height
        );
        self.desc = desc;
        self.swapchain_image_index = 0;
    }
}
