use ash::vk;

use crate::device::GfxDeviceRef;

/// GPU 与 GPU 之间的同步原语（binary semaphore）
pub struct GfxSemaphore {
    device: GfxDeviceRef,
    semaphore: vk::Semaphore,
}

// 创建与销毁
impl GfxSemaphore {
    pub fn new(device: GfxDeviceRef, debug_name: &str) -> Self {
        let semaphore = device.create_semaphore(debug_name);
        Self { device, semaphore }
    }
}
impl Drop for GfxSemaphore {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.semaphore);
    }
}

// getters
impl GfxSemaphore {
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}
