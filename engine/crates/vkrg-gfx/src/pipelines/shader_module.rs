use ash::vk;

use crate::device::{GfxDeviceRef, GfxShaderStageDesc};

/// 独占的 vk::ShaderModule
///
/// 只在创建 pipeline 时需要，pipeline 创建完成之后就可以销毁
pub struct GfxShaderModule {
    device: GfxDeviceRef,
    handle: vk::ShaderModule,
}
// new & init
impl GfxShaderModule {
    pub fn new(device: GfxDeviceRef, code: &[u32], name: &str) -> Self {
        let handle = device.create_shader_module(code, name);
        Self { device, handle }
    }
}
// getters
impl GfxShaderModule {
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }
}
impl Drop for GfxShaderModule {
    fn drop(&mut self) {
        self.device.destroy_shader_module(self.handle);
    }
}

/// pipeline 中的一个阶段
pub struct GfxShaderStage {
    pub module: GfxShaderModule,
    pub stage: vk::ShaderStageFlags,
    pub entry_point: String,
}
impl GfxShaderStage {
    pub fn new(
        device: GfxDeviceRef,
        stage: vk::ShaderStageFlags,
        code: &[u32],
        entry_point: impl Into<String>,
        name: &str,
    ) -> Self {
        Self {
            module: GfxShaderModule::new(device, code, name),
            stage,
            entry_point: entry_point.into(),
        }
    }

    #[inline]
    pub fn desc(&self) -> GfxShaderStageDesc {
        GfxShaderStageDesc {
            stage: self.stage,
            module: self.module.handle(),
            entry_point: self.entry_point.clone(),
        }
    }
}
