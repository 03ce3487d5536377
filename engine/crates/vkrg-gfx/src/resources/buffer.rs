use ash::vk;

use crate::{
    commands::one_time::one_time_exec,
    device::{GfxBufferDesc, GfxDeviceRef},
};

/// 独占的 buffer 对象
///
/// - host visible 的 buffer 在创建时持久映射，可以直接 [`GfxBuffer::write`] / [`GfxBuffer::read`]
/// - device local 的 buffer 通过 staging buffer 上传和回读
pub struct GfxBuffer {
    device: GfxDeviceRef,
    handle: vk::Buffer,
    desc: GfxBufferDesc,
    debug_name: String,
}
impl Drop for GfxBuffer {
    fn drop(&mut self) {
        self.device.destroy_buffer(self.handle);
    }
}
// init & destroy
impl GfxBuffer {
    pub fn new(device: GfxDeviceRef, desc: GfxBufferDesc, name: impl AsRef<str>) -> Self {
        let handle = device.create_buffer(&desc, name.as_ref());
        Self {
            device,
            handle,
            desc,
            debug_name: name.as_ref().to_string(),
        }
    }

    /// 持久映射的 buffer，用于 uniform 以及 staging
    pub fn new_host_visible(
        device: GfxDeviceRef,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        name: impl AsRef<str>,
    ) -> Self {
        Self::new(
            device,
            GfxBufferDesc {
                size,
                usage,
                host_visible: true,
            },
            name,
        )
    }

    pub fn new_device_local(
        device: GfxDeviceRef,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        name: impl AsRef<str>,
    ) -> Self {
        Self::new(
            device,
            GfxBufferDesc {
                size,
                usage: usage | vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
                host_visible: false,
            },
            name,
        )
    }
}
// getters
impl GfxBuffer {
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.desc.size
    }

    #[inline]
    pub fn is_host_visible(&self) -> bool {
        self.desc.host_visible
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}
// tools
impl GfxBuffer {
    /// 写入映射的内存，写入范围不能超出 buffer
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) {
        assert!(self.desc.host_visible, "buffer {} is not host visible", self.debug_name);
        assert!(
            offset + data.len() as vk::DeviceSize <= self.desc.size,
            "write out of range: buffer {}, offset {}, len {}, size {}",
            self.debug_name,
            offset,
            data.len(),
            self.desc.size
        );
        self.device.write_buffer(self.handle, offset, data);
    }

    pub fn read(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Vec<u8> {
        assert!(self.desc.host_visible, "buffer {} is not host visible", self.debug_name);
        assert!(offset + size <= self.desc.size, "read out of range: buffer {}", self.debug_name);
        let mut dst = vec![0_u8; size as usize];
        self.device.read_buffer(self.handle, offset, &mut dst);
        dst
    }

    /// 通过 staging buffer 将数据上传到 device local 的 buffer，阻塞直到传输完成
    pub fn upload(&self, offset: vk::DeviceSize, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let stage = GfxBuffer::new_host_visible(
            self.device.clone(),
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            format!("{}-stage-upload", self.debug_name),
        );
        stage.write(0, data);

        one_time_exec(&self.device, &format!("{}-upload", self.debug_name), |cmd| {
            cmd.cmd_copy_buffer(
                stage.handle(),
                self.handle,
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: offset,
                    size: data.len() as vk::DeviceSize,
                }],
            );
        });
    }

    /// 将 device local 的 buffer 回读到 CPU，阻塞直到传输完成
    pub fn download(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Vec<u8> {
        if size == 0 {
            return vec![];
        }
        let stage = GfxBuffer::new_host_visible(
            self.device.clone(),
            size,
            vk::BufferUsageFlags::TRANSFER_DST,
            format!("{}-stage-download", self.debug_name),
        );

        one_time_exec(&self.device, &format!("{}-download", self.debug_name), |cmd| {
            cmd.cmd_copy_buffer(
                self.handle,
                stage.handle(),
                &[vk::BufferCopy {
                    src_offset: offset,
                    dst_offset: 0,
                    size,
                }],
            );
        });

        stage.read(0, size)
    }
}
