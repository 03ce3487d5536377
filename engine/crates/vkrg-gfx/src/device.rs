use std::rc::Rc;

use ash::vk;

use crate::{
    commands::submit_info::GfxSubmitInfo, descriptors::write_descriptor_set::GfxWriteDescriptorSet,
    resources::sampler::GfxSamplerDesc,
};

/// 所有 Gfx 对象共享的设备引用
///
/// RenderGraph 只在提交线程上使用，因此使用 `Rc` 而不是 `Arc`
pub type GfxDeviceRef = Rc<dyn GfxDevice>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxBufferDesc {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    /// 是否需要持久映射到 host 内存
    pub host_visible: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxImageDesc {
    pub image_type: vk::ImageType,
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub array_layers: u32,
    pub tiling: vk::ImageTiling,
}

impl GfxImageDesc {
    /// 2D 图像，`array_layers` 层
    pub fn new_2d(width: u32, height: u32, array_layers: u32, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            image_type: vk::ImageType::TYPE_2D,
            extent: vk::Extent3D { width, height, depth: 1 },
            format,
            usage,
            array_layers,
            tiling: vk::ImageTiling::OPTIMAL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxImageViewDesc {
    pub image: vk::Image,
    pub view_type: vk::ImageViewType,
    pub format: vk::Format,
    pub aspect_mask: vk::ImageAspectFlags,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

/// 交换链的快照：handle 以及其中的 image
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxSwapchainDesc {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

/// 只有一个 subpass 的 render pass
///
/// subpass 与外部之间的依赖由后端补全
#[derive(Clone, Debug, Default)]
pub struct GfxRenderPassDesc {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub color_references: Vec<vk::AttachmentReference>,
    pub input_references: Vec<vk::AttachmentReference>,
}

#[derive(Clone, Debug)]
pub struct GfxFramebufferDesc {
    pub render_pass: vk::RenderPass,
    pub attachments: Vec<vk::ImageView>,
    pub extent: vk::Extent2D,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxShaderStageDesc {
    pub stage: vk::ShaderStageFlags,
    pub module: vk::ShaderModule,
    pub entry_point: String,
}

/// 固定 viewport 的图形管线，不使用深度测试
#[derive(Clone, Debug)]
pub struct GfxGraphicsPipelineDesc {
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub stages: Vec<GfxShaderStageDesc>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub extent: vk::Extent2D,
    pub color_attachment_count: u32,
    /// 所有 color attachment 使用 alpha 混合
    pub blend_enabled: bool,
}

/// RenderGraph 所需的图形 API 能力接口
///
/// 设备、队列、command pool、内存分配器以及交换链的创建都在接口之外完成，
/// 这里只暴露 RenderGraph 实际调用的操作。
///
/// # 失败语义
/// 在正确的程序中不会失败的调用直接返回结果，实现方在失败时 panic；
/// 只有 fence 等待、交换链 acquire / present 会把 `vk::Result` 返回给调用者。
pub trait GfxDevice {
    // buffer
    fn create_buffer(&self, desc: &GfxBufferDesc, debug_name: &str) -> vk::Buffer;
    fn destroy_buffer(&self, buffer: vk::Buffer);
    /// 写入 host visible 的 buffer
    fn write_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]);
    /// 读取 host visible 的 buffer
    fn read_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, dst: &mut [u8]);

    // image
    fn create_image(&self, desc: &GfxImageDesc, debug_name: &str) -> vk::Image;
    fn destroy_image(&self, image: vk::Image);
    fn create_image_view(&self, desc: &GfxImageViewDesc, debug_name: &str) -> vk::ImageView;
    fn destroy_image_view(&self, image_view: vk::ImageView);
    fn create_sampler(&self, desc: &GfxSamplerDesc, debug_name: &str) -> vk::Sampler;
    fn destroy_sampler(&self, sampler: vk::Sampler);

    // sync
    fn create_fence(&self, signaled: bool, debug_name: &str) -> vk::Fence;
    fn destroy_fence(&self, fence: vk::Fence);
    fn wait_for_fences(&self, fences: &[vk::Fence], timeout: u64) -> Result<(), vk::Result>;
    fn reset_fences(&self, fences: &[vk::Fence]);
    fn create_semaphore(&self, debug_name: &str) -> vk::Semaphore;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_event(&self, debug_name: &str) -> vk::Event;
    fn destroy_event(&self, event: vk::Event);

    // command buffer
    fn allocate_command_buffer(&self, debug_name: &str) -> vk::CommandBuffer;
    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer);
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, usage: vk::CommandBufferUsageFlags);
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer);

    fn cmd_set_event(&self, command_buffer: vk::CommandBuffer, event: vk::Event, stage: vk::PipelineStageFlags2);
    fn cmd_reset_event(&self, command_buffer: vk::CommandBuffer, event: vk::Event, stage: vk::PipelineStageFlags2);
    fn cmd_wait_event(
        &self,
        command_buffer: vk::CommandBuffer,
        event: vk::Event,
        src_stage: vk::PipelineStageFlags2,
        dst_stage: vk::PipelineStageFlags2,
    );
    fn cmd_copy_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    );
    fn cmd_copy_buffer_to_image(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    );
    fn cmd_image_memory_barrier(&self, command_buffer: vk::CommandBuffer, barriers: &[vk::ImageMemoryBarrier2<'_>]);

    // draw
    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    );
    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);
    fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    );
    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    );
    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    );
    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    );
    fn cmd_draw(
        &self,
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );
    fn cmd_draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn cmd_dispatch(&self, command_buffer: vk::CommandBuffer, group_count_x: u32, group_count_y: u32, group_count_z: u32);

    // queue
    fn queue_submit(&self, submit_infos: &[GfxSubmitInfo], fence: Option<vk::Fence>);
    fn device_wait_idle(&self);

    // descriptor
    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
        debug_name: &str,
    ) -> vk::DescriptorSetLayout;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    fn create_descriptor_pool(
        &self,
        pool_sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
        debug_name: &str,
    ) -> vk::DescriptorPool;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Vec<vk::DescriptorSet>;
    fn update_descriptor_sets(&self, writes: &[GfxWriteDescriptorSet]);

    // pipeline
    fn create_shader_module(&self, code: &[u32], debug_name: &str) -> vk::ShaderModule;
    fn destroy_shader_module(&self, module: vk::ShaderModule);
    fn create_render_pass(&self, desc: &GfxRenderPassDesc, debug_name: &str) -> vk::RenderPass;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_framebuffer(&self, desc: &GfxFramebufferDesc, debug_name: &str) -> vk::Framebuffer;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);
    fn create_pipeline_layout(&self, set_layouts: &[vk::DescriptorSetLayout], debug_name: &str) -> vk::PipelineLayout;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    fn create_graphics_pipeline(&self, desc: &GfxGraphicsPipelineDesc, debug_name: &str) -> vk::Pipeline;
    fn create_compute_pipeline(
        &self,
        layout: vk::PipelineLayout,
        stage: &GfxShaderStageDesc,
        debug_name: &str,
    ) -> vk::Pipeline;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    // swapchain
    /// return: (image index, is suboptimal)
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: Option<vk::Semaphore>,
        fence: Option<vk::Fence>,
    ) -> Result<(u32, bool), vk::Result>;
    /// return: is suboptimal
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool, vk::Result>;
    /// 使用旧的交换链重建交换链，旧的交换链在返回之前被销毁
    fn recreate_swapchain(&self, old_swapchain: vk::SwapchainKHR) -> GfxSwapchainDesc;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
}
