//! RenderGraph 的资源
//!
//! 资源是封闭的几种变体（[`RgResource`]），每种变体实现 hook 协议 [`RgResourceHooks`]，
//! 以及 [`RgImageResource`] / [`RgBufferResource`] 两种能力接口之一。
//!
//! # 生命周期
//! - graph 编译时调用 `compile`，按照 [`RgGraphSettings::resource_count`] 为每个 resource index 创建 GPU 对象
//! - 重新编译时先释放之前的 GPU 对象；只允许编译一次的资源（只读 image）在 graph 重新编译时被跳过
//! - 录制 command buffer 时，graph 在每个 operation 前后调用读写 hook
//!
//! 资源独占自己的 GPU 对象，drop 时销毁。

use ash::vk;
use vkrg_gfx::commands::command_buffer::GfxCommandBuffer;

use crate::settings::RgGraphSettings;

mod buffer;
mod read_only_image;
mod swapchain_image;
mod writable_image;

pub use buffer::{RgCpuBufferResource, RgGpuBufferResource, RgMemoryMapping};
pub use read_only_image::RgReadOnlyImageResource;
pub use swapchain_image::RgSwapchainImageResource;
pub use writable_image::{RgSingleWritableImageResource, RgWritableImageResource};

/// 资源的编译与录制 hook，录制相关的 hook 默认什么也不做
pub trait RgResourceHooks {
    /// 为 `settings.resource_count` 个 resource index 创建 GPU 对象
    fn compile(&mut self, settings: &RgGraphSettings, name: &str);

    fn is_compiled(&self) -> bool;

    /// 只允许编译一次，graph 重新编译时跳过
    fn is_compile_once(&self) -> bool {
        false
    }

    fn on_pre_read(&self, _resource_index: u32, _cmd: &GfxCommandBuffer) {}
    fn on_pre_write(&self, _resource_index: u32, _cmd: &GfxCommandBuffer) {}
    fn on_post_write(&self, _resource_index: u32, _cmd: &GfxCommandBuffer) {}
    fn on_graph_execution_started(&self, _resource_index: u32, _cmd: &GfxCommandBuffer) {}
    fn on_graph_execution_ended(&self, _resource_index: u32, _cmd: &GfxCommandBuffer) {}
}

pub trait RgImageResource {
    /// 所有 resource index 的 image
    fn images(&self) -> Vec<vk::Image>;
    fn images_for(&self, resource_index: u32) -> Vec<vk::Image>;
    fn image_view(&self, resource_index: u32, layer: u32) -> vk::ImageView;
    /// 没有 sampler 的资源返回 null
    fn sampler(&self) -> vk::Sampler;
    fn format(&self) -> vk::Format;
    fn initial_layout(&self) -> vk::ImageLayout;
    fn final_layout(&self) -> vk::ImageLayout;
    fn layer_count(&self) -> u32;
}

pub trait RgBufferResource {
    fn buffer(&self, resource_index: u32) -> vk::Buffer;
    fn size(&self) -> vk::DeviceSize;
}

/// 所有资源变体
pub enum RgResource {
    ReadOnlyImage(RgReadOnlyImageResource),
    WritableImage(RgWritableImageResource),
    SingleWritableImage(RgSingleWritableImageResource),
    SwapchainImage(RgSwapchainImageResource),
    CpuBuffer(RgCpuBufferResource),
    GpuBuffer(RgGpuBufferResource),
}

impl RgResource {
    pub fn hooks(&self) -> &dyn RgResourceHooks {
        match self {
            Self::ReadOnlyImage(r) => r,
            Self::WritableImage(r) => r,
            Self::SingleWritableImage(r) => r,
            Self::SwapchainImage(r) => r,
            Self::CpuBuffer(r) => r,
            Self::GpuBuffer(r) => r,
        }
    }

    pub fn hooks_mut(&mut self) -> &mut dyn RgResourceHooks {
        match self {
            Self::ReadOnlyImage(r) => r,
            Self::WritableImage(r) => r,
            Self::SingleWritableImage(r) => r,
            Self::SwapchainImage(r) => r,
            Self::CpuBuffer(r) => r,
            Self::GpuBuffer(r) => r,
        }
    }

    pub fn as_image(&self) -> Option<&dyn RgImageResource> {
        match self {
            Self::ReadOnlyImage(r) => Some(r),
            Self::WritableImage(r) => Some(r),
            Self::SingleWritableImage(r) => Some(r),
            Self::SwapchainImage(r) => Some(r),
            Self::CpuBuffer(_) | Self::GpuBuffer(_) => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&dyn RgBufferResource> {
        match self {
            Self::CpuBuffer(r) => Some(r),
            Self::GpuBuffer(r) => Some(r),
            _ => None,
        }
    }

    #[inline]
    pub fn as_read_only_image(&self) -> Option<&RgReadOnlyImageResource> {
        match self {
            Self::ReadOnlyImage(r) => Some(r),
            _ => None,
        }
    }

    #[inline]
    pub fn as_cpu_buffer(&self) -> Option<&RgCpuBufferResource> {
        match self {
            Self::CpuBuffer(r) => Some(r),
            _ => None,
        }
    }

    #[inline]
    pub fn as_gpu_buffer(&self) -> Option<&RgGpuBufferResource> {
        match self {
            Self::GpuBuffer(r) => Some(r),
            _ => None,
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::ReadOnlyImage(_) => "ReadOnlyImage",
            Self::WritableImage(_) => "WritableImage",
            Self::SingleWritableImage(_) => "SingleWritableImage",
            Self::SwapchainImage(_) => "SwapchainImage",
            Self::CpuBuffer(_) => "CpuBuffer",
            Self::GpuBuffer(_) => "GpuBuffer",
        }
    }
}

macro_rules! impl_from_variant {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for RgResource {
            fn from(resource: $ty) -> Self {
                Self::$variant(resource)
            }
        }
    };
}

impl_from_variant!(ReadOnlyImage, RgReadOnlyImageResource);
impl_from_variant!(WritableImage, RgWritableImageResource);
impl_from_variant!(SingleWritableImage, RgSingleWritableImageResource);
impl_from_variant!(SwapchainImage, RgSwapchainImageResource);
impl_from_variant!(CpuBuffer, RgCpuBufferResource);
impl_from_variant!(GpuBuffer, RgGpuBufferResource);

/// 按 resource index 取对象，越界时按照断言策略报告
pub(crate) fn slot_at<'a, T>(slots: &'a [T], resource_index: u32, name: &str) -> Option<&'a T> {
    let slot = slots.get(resource_index as usize);
    vkrg_crate_tools::rg_assert!(
        slot.is_some(),
        "resource {} has no object for resource index {} ({} compiled)",
        name,
        resource_index,
        slots.len()
    );
    slot
}
