use std::path::Path;

use anyhow::Context;
use ash::vk;
use vkrg_gfx::{device::GfxDeviceRef, swapchain::GfxSwapchain};

/// graph 编译时使用的设置
///
/// 资源数量以及交换链的格式都在编译时从这里读取
#[derive(Clone)]
pub struct RgGraphSettings {
    pub device: GfxDeviceRef,
    /// 每个资源需要准备多少份 GPU 对象，和交换链 image 的数量相同
    pub resource_count: u32,
    /// 交换链的快照，供交换链 image 资源使用
    pub swapchain: Option<vkrg_gfx::device::GfxSwapchainDesc>,
}

impl RgGraphSettings {
    pub fn new(device: GfxDeviceRef, resource_count: u32) -> Self {
        Self {
            device,
            resource_count,
            swapchain: None,
        }
    }

    pub fn from_swapchain(device: GfxDeviceRef, swapchain: &GfxSwapchain) -> Self {
        Self {
            device,
            resource_count: swapchain.image_count(),
            swapchain: Some(swapchain.desc().clone()),
        }
    }

    #[inline]
    pub fn swapchain_format(&self) -> Option<vk::Format> {
        self.swapchain.as_ref().map(|s| s.format)
    }
}

impl std::fmt::Debug for RgGraphSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RgGraphSettings")
            .field("resource_count", &self.resource_count)
            .field("swapchain", &self.swapchain)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RgSettingsError {
    #[error("invalid renderer settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// 帧调度器的设置，可以从 TOML 中读取
///
/// ```toml
/// frames_in_flight = 2
/// acquire_timeout_ns = 1000000000
/// wait_presentation_engine = true
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RgRendererSettings {
    /// 同时在 GPU 上执行的帧数
    pub frames_in_flight: u32,
    /// acquire 交换链 image 的超时时间
    pub acquire_timeout_ns: u64,
    /// acquire 时是否额外使用 fence 等待 presentation engine 释放 image
    pub wait_presentation_engine: bool,
}

impl Default for RgRendererSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            acquire_timeout_ns: u64::MAX,
            wait_presentation_engine: true,
        }
    }
}

impl RgRendererSettings {
    pub fn from_toml_str(text: &str) -> Result<Self, RgSettingsError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).with_context(|| format!("failed to read renderer settings {:?}", path))?;
        Self::from_toml_str(&text).with_context(|| format!("failed to parse renderer settings {:?}", path))
    }

    /// 帧数不能超过交换链 image 的数量，也不能为 0
    pub fn clamped_frames_in_flight(&self, image_count: u32) -> u32 {
        let clamped = self.frames_in_flight.clamp(1, image_count.max(1));
        if clamped != self.frames_in_flight {
            log::warn!(
                "frames in flight {} is clamped to {} (swapchain image count {})",
                self.frames_in_flight,
                clamped,
                image_count
            );
        }
        clamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_settings_from_toml() {
        let settings = RgRendererSettings::from_toml_str("frames_in_flight = 3\nwait_presentation_engine = false\n").unwrap();
        assert_eq!(settings.frames_in_flight, 3);
        assert!(!settings.wait_presentation_engine);
        assert_eq!(settings.acquire_timeout_ns, u64::MAX);

        assert_eq!(RgRendererSettings::from_toml_str("").unwrap(), RgRendererSettings::default());
        assert!(RgRendererSettings::from_toml_str("frames = 3").is_err());
    }

    #[test]
    fn test_frames_in_flight_clamp() {
        let settings = RgRendererSettings {
            frames_in_flight: 5,
            ..Default::default()
        };
        assert_eq!(settings.clamped_frames_in_flight(3), 3);
        assert_eq!(RgRendererSettings { frames_in_flight: 0, ..settings }.clamped_frames_in_flight(3), 1);
        assert_eq!(RgRendererSettings::default().clamped_frames_in_flight(3), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = RgRendererSettings::load("/nonexistent/renderer.toml").unwrap_err();
        assert!(err.to_string().contains("failed to read renderer settings"));
    }
}
