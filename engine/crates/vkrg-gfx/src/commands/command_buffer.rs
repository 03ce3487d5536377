use ash::vk;

use crate::device::{GfxDevice, GfxDeviceRef};

/// 命令缓冲封装
///
/// 独占一个 primary command buffer，drop 时归还给 command pool。
/// 只暴露 RenderGraph 需要的命令，其余命令由 operation 通过 [`GfxCommandBuffer::vk_handle`] 自行录制。
///
/// # 使用示例
/// ```ignore
/// let cmd = GfxCommandBuffer::new(device.clone(), "my-pass");
/// cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
/// cmd.cmd_copy_buffer(src, dst, &[region]);
/// cmd.end();
/// ```
pub struct GfxCommandBuffer {
    device: GfxDeviceRef,
    vk_handle: vk::CommandBuffer,
    name: String,
}
// new & init
impl GfxCommandBuffer {
    pub fn new(device: GfxDeviceRef, debug_name: &str) -> Self {
        let vk_handle = device.allocate_command_buffer(debug_name);
        Self {
            device,
            vk_handle,
            name: debug_name.to_string(),
        }
    }
}
impl Drop for GfxCommandBuffer {
    fn drop(&mut self) {
        self.device.free_command_buffer(self.vk_handle);
    }
}
// Basic 命令
impl GfxCommandBuffer {
    /// 开始录制 command
    #[inline]
    pub fn begin(&self, usage_flag: vk::CommandBufferUsageFlags) {
        self.device.begin_command_buffer(self.vk_handle, usage_flag);
    }

    /// 结束录制 command
    #[inline]
    pub fn end(&self) {
        self.device.end_command_buffer(self.vk_handle);
    }
}
// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn device(&self) -> &dyn GfxDevice {
        self.device.as_ref()
    }
}
// 传输与同步命令
impl GfxCommandBuffer {
    #[inline]
    pub fn cmd_copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.device.cmd_copy_buffer(self.vk_handle, src, dst, regions);
    }

    #[inline]
    pub fn cmd_copy_buffer_to_image(
        &self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.device.cmd_copy_buffer_to_image(self.vk_handle, src, dst, dst_layout, regions);
    }

    /// 对 image 的某一层做 layout 转换
    pub fn cmd_transition_image_layer(
        &self,
        image: vk::Image,
        layer: u32,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) {
        let barrier = vk::ImageMemoryBarrier2::default()
            .image(image)
            .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .dst_access_mask(vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: layer,
                layer_count: 1,
            });
        self.device.cmd_image_memory_barrier(self.vk_handle, std::slice::from_ref(&barrier));
    }
}

// 绘制命令
impl GfxCommandBuffer {
    /// - command type: action, state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        self.device.cmd_begin_render_pass(self.vk_handle, render_pass, framebuffer, extent, clear_values);
    }

    #[inline]
    pub fn cmd_end_render_pass(&self) {
        self.device.cmd_end_render_pass(self.vk_handle);
    }

    /// - command type: state
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn cmd_bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.device.cmd_bind_pipeline(self.vk_handle, bind_point, pipeline);
    }

    /// - command type: state
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn cmd_bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        self.device.cmd_bind_descriptor_sets(self.vk_handle, bind_point, layout, first_set, descriptor_sets);
    }

    /// buffers 每个 vertex buffer 以及 offset
    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_bind_vertex_buffers(&self, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        self.device.cmd_bind_vertex_buffers(self.vk_handle, first_binding, buffers, offsets);
    }

    #[inline]
    pub fn cmd_bind_index_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        self.device.cmd_bind_index_buffer(self.vk_handle, buffer, offset, index_type);
    }

    /// 不使用 index buffer 的绘制
    #[inline]
    pub fn cmd_draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.device.cmd_draw(self.vk_handle, vertex_count, instance_count, first_vertex, first_instance);
    }

    #[inline]
    pub fn cmd_draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.device.cmd_draw_indexed(
            self.vk_handle,
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        );
    }

    #[inline]
    pub fn cmd_dispatch(&self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        self.device.cmd_dispatch(self.vk_handle, group_count_x, group_count_y, group_count_z);
    }
}
