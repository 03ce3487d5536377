//! Vulkan GFX 抽象层
//!
//! RenderGraph 通过 [`device::GfxDevice`] 这一能力接口使用图形 API，
//! 其上是一组 RAII 封装（fence、semaphore、event、command buffer、buffer、image、pipeline 等），
//! 每个封装对象独占自己的 Vulkan 对象，并在 drop 时销毁。
//!
//! # 后端
//! - [`backend::vulkan::GfxVulkanDevice`]：基于 ash + vk-mem 的真实设备
//! - [`backend::headless::GfxHeadlessDevice`]：在 CPU 上模拟的设备，记录所有调用，用于测试

pub mod backend;
pub mod commands;
pub mod descriptors;
pub mod device;
pub mod pipelines;
pub mod resources;
pub mod swapchain;
