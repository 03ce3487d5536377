use ash::vk;
use vkrg_gfx::resources::buffer::GfxBuffer;

use crate::{
    resource::{RgBufferResource, RgResourceHooks, slot_at},
    settings::RgGraphSettings,
};

const RG_BUFFER_USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::from_raw(
    vk::BufferUsageFlags::UNIFORM_BUFFER.as_raw() | vk::BufferUsageFlags::STORAGE_BUFFER.as_raw(),
);

/// CPU 可见的 buffer 的映射
///
/// buffer 在创建时持久映射，这里只是借用
pub struct RgMemoryMapping<'a> {
    buffer: &'a GfxBuffer,
}

impl RgMemoryMapping<'_> {
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }

    #[inline]
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) {
        self.buffer.write(offset, data);
    }

    #[inline]
    pub fn write_pod<T: bytemuck::Pod>(&self, offset: vk::DeviceSize, value: &T) {
        self.buffer.write(offset, bytemuck::bytes_of(value));
    }

    #[inline]
    pub fn read(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Vec<u8> {
        self.buffer.read(offset, size)
    }
}

/// CPU 可见的 buffer，每个 resource index 一份
///
/// 一般用作 uniform buffer，每帧直接写入映射的内存
pub struct RgCpuBufferResource {
    size: vk::DeviceSize,
    name: String,
    buffers: Vec<GfxBuffer>,
}

impl RgCpuBufferResource {
    pub fn new(size: vk::DeviceSize) -> Self {
        Self {
            size,
            name: String::new(),
            buffers: vec![],
        }
    }

    /// resource index 对应的 buffer 的映射
    pub fn mapping(&self, resource_index: u32) -> Option<RgMemoryMapping<'_>> {
        slot_at(&self.buffers, resource_index, &self.name).map(|buffer| RgMemoryMapping { buffer })
    }
}

impl RgResourceHooks for RgCpuBufferResource {
    fn compile(&mut self, settings: &RgGraphSettings, name: &str) {
        self.buffers.clear();
        self.name = name.to_string();
        self.buffers = (0..settings.resource_count)
            .map(|ri| {
                GfxBuffer::new_host_visible(
                    settings.device.clone(),
                    self.size,
                    RG_BUFFER_USAGE | vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
                    format!("{}-{}", name, ri),
                )
            })
            .collect();
    }

    #[inline]
    fn is_compiled(&self) -> bool {
        !self.buffers.is_empty()
    }
}

impl RgBufferResource for RgCpuBufferResource {
    fn buffer(&self, resource_index: u32) -> vk::Buffer {
        slot_at(&self.buffers, resource_index, &self.name).map_or(vk::Buffer::null(), |b| b.handle())
    }

    #[inline]
    fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

/// GPU 本地的 buffer，每个 resource index 一份
///
/// 一般用作 storage buffer；与 CPU 之间的传输都是阻塞的
pub struct RgGpuBufferResource {
    size: vk::DeviceSize,
    name: String,
    buffers: Vec<GfxBuffer>,
}

// new & init
impl RgGpuBufferResource {
    pub fn new(size: vk::DeviceSize) -> Self {
        Self {
            size,
            name: String::new(),
            buffers: vec![],
        }
    }
}

// tools
impl RgGpuBufferResource {
    pub fn transfer_from_cpu_to_gpu(&self, resource_index: u32, data: &[u8]) {
        let Some(buffer) = slot_at(&self.buffers, resource_index, &self.name) else {
            return;
        };
        if !vkrg_crate_tools::rg_verify!(
            data.len() as vk::DeviceSize <= self.size,
            "upload {} bytes into buffer {} of {} bytes",
            data.len(),
            self.name,
            self.size
        ) {
            return;
        }
        buffer.upload(0, data);
    }

    /// 回读整个 buffer
    pub fn transfer_from_gpu_to_cpu(&self, resource_index: u32) -> Vec<u8> {
        self.transfer_range_from_gpu_to_cpu(resource_index, self.size, 0)
    }

    pub fn transfer_range_from_gpu_to_cpu(
        &self,
        resource_index: u32,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> Vec<u8> {
        let Some(buffer) = slot_at(&self.buffers, resource_index, &self.name) else {
            return vec![];
        };
        if !vkrg_crate_tools::rg_verify!(
            offset.checked_add(size).is_some_and(|end| end <= self.size),
            "read {} bytes at offset {} out of buffer {}",
            size,
            offset,
            self.name
        ) {
            return vec![];
        }
        buffer.download(offset, size)
    }
}

impl RgResourceHooks for RgGpuBufferResource {
    fn compile(&mut self, settings: &RgGraphSettings, name: &str) {
        self.buffers.clear();
        self.name = name.to_string();
        self.buffers = (0..settings.resource_count)
            .map(|ri| GfxBuffer::new_device_local(settings.device.clone(), self.size, RG_BUFFER_USAGE, format!("{}-{}", name, ri)))
            .collect();
    }

    #[inline]
    fn is_compiled(&self) -> bool {
        !self.buffers.is_empty()
    }
}

impl RgBufferResource for RgGpuBufferResource {
    fn buffer(&self, resource_index: u32) -> vk::Buffer {
        slot_at(&self.buffers, resource_index, &self.name).map_or(vk::Buffer::null(), |b| b.handle())
    }

    #[inline]
    fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use vkrg_gfx::backend::headless::GfxHeadlessObjectType;

    use super::*;
    use crate::test_utils::{graph_settings, headless_device};

    #[test]
    fn test_cpu_buffer_mapping_per_resource_index() {
        let (headless, device) = headless_device();
        let mut buffer = RgCpuBufferResource::new(16);
        buffer.compile(&graph_settings(&device, 2), "globals");

        buffer.mapping(0).unwrap().write_pod(4, &7.5_f32);
        buffer.mapping(1).unwrap().write(0, &[1, 2, 3, 4]);

        assert_eq!(buffer.mapping(0).unwrap().read(4, 4), 7.5_f32.to_ne_bytes());
        assert_eq!(&headless.buffer_contents(buffer.buffer(1))[..4], &[1, 2, 3, 4]);
        assert_eq!(headless.buffer_contents(buffer.buffer(0))[..4], [0; 4]);
        assert_eq!(buffer.mapping(1).unwrap().size(), 16);
    }

    #[test]
    fn test_gpu_buffer_round_trip() {
        let (headless, device) = headless_device();
        let mut buffer = RgGpuBufferResource::new(8);
        buffer.compile(&graph_settings(&device, 3), "particles");
        assert_eq!(headless.live_count(GfxHeadlessObjectType::Buffer), 3);

        buffer.transfer_from_cpu_to_gpu(1, &[9, 8, 7, 6]);
        assert_eq!(buffer.transfer_from_gpu_to_cpu(1), vec![9, 8, 7, 6, 0, 0, 0, 0]);
        assert_eq!(buffer.transfer_range_from_gpu_to_cpu(1, 2, 1), vec![8, 7]);
        assert_eq!(buffer.transfer_from_gpu_to_cpu(0), vec![0; 8]);

        // staging buffer 都已经释放
        assert_eq!(headless.live_count(GfxHeadlessObjectType::Buffer), 3);
        assert!(headless.violations().is_empty());
    }

    #[test]
    fn test_recompile_replaces_buffers() {
        let (headless, device) = headless_device();
        let mut buffer = RgCpuBufferResource::new(4);
        buffer.compile(&graph_settings(&device, 3), "globals");
        buffer.compile(&graph_settings(&device, 2), "globals");
        assert_eq!(headless.live_count(GfxHeadlessObjectType::Buffer), 2);
    }

    #[test]
    #[should_panic(expected = "Verify Failed")]
    fn test_upload_larger_than_buffer_is_reported() {
        let (_headless, device) = headless_device();
        let mut buffer = RgGpuBufferResource::new(2);
        buffer.compile(&graph_settings(&device, 1), "small");
        buffer.transfer_from_cpu_to_gpu(0, &[1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "Verify Failed")]
    fn test_read_range_overflow_is_reported() {
        let (_headless, device) = headless_device();
        let mut buffer = RgGpuBufferResource::new(8);
        buffer.compile(&graph_settings(&device, 1), "particles");
        buffer.transfer_range_from_gpu_to_cpu(0, 2, vk::DeviceSize::MAX);
    }
}
