use ash::vk;

use crate::device::GfxDeviceRef;

// Sampler descriptor
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GfxSamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    pub mipmap_mode: vk::SamplerMipmapMode,
}
impl Default for GfxSamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        }
    }
}
impl GfxSamplerDesc {
    #[inline]
    pub fn with_filter(filter: vk::Filter) -> Self {
        Self {
            mag_filter: filter,
            min_filter: filter,
            ..Default::default()
        }
    }
}

pub struct GfxSampler {
    device: GfxDeviceRef,
    handle: vk::Sampler,
}
// new & init
impl GfxSampler {
    pub fn new(device: GfxDeviceRef, desc: &GfxSamplerDesc, name: impl AsRef<str>) -> Self {
        let handle = device.create_sampler(desc, name.as_ref());
        Self { device, handle }
    }
}
// getters
impl GfxSampler {
    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }
}
impl Drop for GfxSampler {
    fn drop(&mut self) {
        self.device.destroy_sampler(self.handle);
    }
}
