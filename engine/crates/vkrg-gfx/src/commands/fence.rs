use ash::vk;

use crate::device::GfxDeviceRef;

/// CPU 与 GPU 之间的同步原语
///
/// # Destroy
/// 独占 fence，drop 时销毁
pub struct GfxFence {
    device: GfxDeviceRef,
    fence: vk::Fence,
    name: String,
}

// 创建与销毁
impl GfxFence {
    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(device: GfxDeviceRef, signaled: bool, debug_name: &str) -> Self {
        let fence = device.create_fence(signaled, debug_name);
        Self {
            device,
            fence,
            name: debug_name.to_string(),
        }
    }
}
impl Drop for GfxFence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.fence);
    }
}

// getters
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

// tools
impl GfxFence {
    /// 阻塞等待 fence
    ///
    /// 等待失败说明设备已经处于错误状态，无法恢复，直接 panic
    #[inline]
    pub fn wait(&self) {
        if let Err(e) = self.wait_timeout(u64::MAX) {
            panic!("failed to wait fence {}: {:?}", self.name, e);
        }
    }

    /// timeout: nano seconds
    #[inline]
    pub fn wait_timeout(&self, timeout: u64) -> Result<(), vk::Result> {
        self.device.wait_for_fences(std::slice::from_ref(&self.fence), timeout)
    }

    #[inline]
    pub fn reset(&self) {
        self.device.reset_fences(std::slice::from_ref(&self.fence));
    }
}
