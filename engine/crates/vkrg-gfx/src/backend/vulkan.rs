use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    ffi::CString,
};

use ash::vk;
use itertools::Itertools;
use vk_mem::Alloc;

use crate::{
    commands::submit_info::GfxSubmitInfo,
    descriptors::write_descriptor_set::GfxWriteDescriptorSet,
    device::{
        GfxBufferDesc, GfxDevice, GfxFramebufferDesc, GfxGraphicsPipelineDesc, GfxImageDesc, GfxImageViewDesc,
        GfxRenderPassDesc, GfxShaderStageDesc, GfxSwapchainDesc,
    },
    resources::sampler::GfxSamplerDesc,
};

/// 交换链所需的 surface 信息
///
/// surface 由窗口系统创建，这里只负责在销毁设备时销毁 surface
pub struct GfxVulkanSurface {
    pub loader: ash::khr::surface::Instance,
    pub handle: vk::SurfaceKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    /// 窗口的物理尺寸，在 surface 不指定 extent 时使用
    pub window_extent: vk::Extent2D,
}

/// 创建 [`GfxVulkanDevice`] 所需的对象
///
/// instance、device 由调用者创建并持有，device 需要开启 synchronization2
pub struct GfxVulkanDeviceCreateInfo {
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue_family_index: u32,
    pub debug_utils: Option<ash::ext::debug_utils::Device>,
    pub surface: Option<GfxVulkanSurface>,
}

struct GfxVulkanBuffer {
    allocation: vk_mem::Allocation,
    mapped_ptr: Option<*mut u8>,
}

/// 基于 ash + vk-mem 的设备
///
/// 所有命令提交到同一个 queue，command buffer 从同一个 command pool 中分配
pub struct GfxVulkanDevice {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    allocator: vk_mem::Allocator,
    debug_utils: Option<ash::ext::debug_utils::Device>,

    swapchain_loader: ash::khr::swapchain::Device,
    surface: Option<GfxVulkanSurface>,
    window_extent: Cell<vk::Extent2D>,

    buffers: RefCell<HashMap<vk::Buffer, GfxVulkanBuffer>>,
    images: RefCell<HashMap<vk::Image, vk_mem::Allocation>>,
}

// new & init
impl GfxVulkanDevice {
    pub fn new(info: GfxVulkanDeviceCreateInfo) -> Self {
        let _span = vkrg_crate_tools::profile_span!("GfxVulkanDevice::new");

        let queue = unsafe { info.device.get_device_queue(info.queue_family_index, 0) };
        let command_pool = unsafe {
            info.device
                .create_command_pool(
                    &vk::CommandPoolCreateInfo::default()
                        .queue_family_index(info.queue_family_index)
                        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
                    None,
                )
                .unwrap_or_else(|e| panic!("failed to create command pool: {:?}", e))
        };

        // vma 持有 instance 和 device 的引用，二者需要比 allocator 活得更久
        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(&info.instance, &info.device, info.physical_device);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        let allocator = unsafe {
            vk_mem::Allocator::new(vma_ci).unwrap_or_else(|e| panic!("failed to create vma allocator: {:?}", e))
        };

        let swapchain_loader = ash::khr::swapchain::Device::new(&info.instance, &info.device);
        let window_extent = info.surface.as_ref().map(|s| s.window_extent).unwrap_or_default();

        Self {
            device: info.device,
            physical_device: info.physical_device,
            queue,
            command_pool,
            allocator,
            debug_utils: info.debug_utils,
            swapchain_loader,
            surface: info.surface,
            window_extent: Cell::new(window_extent),
            buffers: RefCell::new(HashMap::new()),
            images: RefCell::new(HashMap::new()),
        }
    }

    /// 根据 surface 创建第一个交换链
    pub fn create_swapchain(&self) -> GfxSwapchainDesc {
        self.create_swapchain_impl(vk::SwapchainKHR::null())
    }

    /// 窗口尺寸发生变化时调用，在下一次重建交换链时生效
    #[inline]
    pub fn set_window_extent(&self, extent: vk::Extent2D) {
        self.window_extent.set(extent);
    }
}
impl Drop for GfxVulkanDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.command_pool, None);
            if let Some(surface) = &self.surface {
                surface.loader.destroy_surface(surface.handle, None);
            }
        }
        if !self.buffers.borrow().is_empty() || !self.images.borrow().is_empty() {
            log::error!(
                "GfxVulkanDevice dropped with {} buffers and {} images alive",
                self.buffers.borrow().len(),
                self.images.borrow().len()
            );
        }
    }
}

// getters
impl GfxVulkanDevice {
    #[inline]
    pub fn ash_device(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }
}

// tools
impl GfxVulkanDevice {
    fn set_debug_name<T: vk::Handle>(&self, handle: T, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let name = CString::new(name).unwrap_or_default();
        unsafe {
            let _ = debug_utils.set_debug_utils_object_name(
                &vk::DebugUtilsObjectNameInfoEXT::default().object_handle(handle).object_name(&name),
            );
        }
    }

    /// 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
    fn calculate_swapchain_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
        let surface_extent = capabilities.current_extent;
        if surface_extent.width == 0xFFFFFFFF || surface_extent.height == 0xFFFFFFFF {
            vk::Extent2D {
                width: window_extent.width.clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
                height: window_extent
                    .height
                    .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
            }
        } else {
            surface_extent
        }
    }

    fn create_swapchain_impl(&self, old_swapchain: vk::SwapchainKHR) -> GfxSwapchainDesc {
        let Some(surface) = &self.surface else {
            panic!("GfxVulkanDevice is created without surface, can not create swapchain");
        };

        let capabilities = unsafe {
            surface
                .loader
                .get_physical_device_surface_capabilities(self.physical_device, surface.handle)
                .unwrap_or_else(|e| panic!("failed to get surface capabilities: {:?}", e))
        };
        let extent = Self::calculate_swapchain_extent(&capabilities, self.window_extent.get());

        // max_image_count == 0，表示不限制 image 数量
        let image_count = if capabilities.max_image_count == 0 {
            capabilities.min_image_count + 1
        } else {
            u32::min(capabilities.max_image_count, capabilities.min_image_count + 1)
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(surface.surface_format.format)
            .image_color_space(surface.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(surface.present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true)
            .old_swapchain(old_swapchain);

        unsafe {
            let handle = self
                .swapchain_loader
                .create_swapchain(&create_info, None)
                .unwrap_or_else(|e| panic!("failed to create swapchain: {:?}", e));
            if old_swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(old_swapchain, None);
            }
            self.set_debug_name(handle, "main");

            let images = self
                .swapchain_loader
                .get_swapchain_images(handle)
                .unwrap_or_else(|e| panic!("failed to get swapchain images: {:?}", e));

            GfxSwapchainDesc {
                handle,
                images,
                format: surface.surface_format.format,
                extent,
            }
        }
    }

    /// set 与 wait 需要使用相同的 dependency info
    fn event_barrier(src_stage: vk::PipelineStageFlags2) -> vk::MemoryBarrier2<'static> {
        vk::MemoryBarrier2::default()
            .src_stage_mask(src_stage)
            .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .dst_access_mask(vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE)
    }

    /// subpass 与外部之间的双向依赖，覆盖图形管线中所有的读写
    fn external_dependencies() -> [vk::SubpassDependency; 2] {
        let access = vk::AccessFlags::INDIRECT_COMMAND_READ
            | vk::AccessFlags::INDEX_READ
            | vk::AccessFlags::VERTEX_ATTRIBUTE_READ
            | vk::AccessFlags::UNIFORM_READ
            | vk::AccessFlags::INPUT_ATTACHMENT_READ
            | vk::AccessFlags::SHADER_READ
            | vk::AccessFlags::SHADER_WRITE
            | vk::AccessFlags::COLOR_ATTACHMENT_READ
            | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
            | vk::AccessFlags::TRANSFER_READ
            | vk::AccessFlags::TRANSFER_WRITE;
        let incoming = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::ALL_GRAPHICS)
            .dst_stage_mask(vk::PipelineStageFlags::ALL_GRAPHICS)
            .src_access_mask(access)
            .dst_access_mask(access);
        let outgoing = incoming.src_subpass(0).dst_subpass(vk::SUBPASS_EXTERNAL);
        [incoming, outgoing]
    }

    fn entry_point_name(stage: &GfxShaderStageDesc) -> CString {
        CString::new(stage.entry_point.as_str()).unwrap_or_else(|_| c"main".to_owned())
    }
}

impl GfxDevice for GfxVulkanDevice {
    fn create_buffer(&self, desc: &GfxBufferDesc, debug_name: &str) -> vk::Buffer {
        let buffer_ci = vk::BufferCreateInfo::default().size(desc.size).usage(desc.usage);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: if desc.host_visible {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        };

        let (buffer, mut allocation) = unsafe {
            self.allocator
                .create_buffer(&buffer_ci, &alloc_ci)
                .unwrap_or_else(|e| panic!("failed to create buffer {}: {:?}", debug_name, e))
        };
        let mapped_ptr = if desc.host_visible {
            Some(unsafe {
                self.allocator
                    .map_memory(&mut allocation)
                    .unwrap_or_else(|e| panic!("failed to map buffer {}: {:?}", debug_name, e))
            })
        } else {
            None
        };

        self.set_debug_name(buffer, &format!("Buffer::{}", debug_name));
        self.buffers.borrow_mut().insert(buffer, GfxVulkanBuffer { allocation, mapped_ptr });
        buffer
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let Some(mut entry) = self.buffers.borrow_mut().remove(&buffer) else {
            log::error!("destroy unknown buffer {:?}", buffer);
            return;
        };
        unsafe {
            if entry.mapped_ptr.is_some() {
                self.allocator.unmap_memory(&mut entry.allocation);
            }
            self.allocator.destroy_buffer(buffer, &mut entry.allocation);
        }
    }

    fn write_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]) {
        let buffers = self.buffers.borrow();
        let Some(entry) = buffers.get(&buffer) else {
            panic!("write unknown buffer {:?}", buffer);
        };
        let Some(ptr) = entry.mapped_ptr else {
            panic!("buffer {:?} is not host visible", buffer);
        };
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
            self.allocator
                .flush_allocation(&entry.allocation, offset, data.len() as vk::DeviceSize)
                .unwrap_or_else(|e| panic!("failed to flush buffer {:?}: {:?}", buffer, e));
        }
    }

    fn read_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, dst: &mut [u8]) {
        let buffers = self.buffers.borrow();
        let Some(entry) = buffers.get(&buffer) else {
            panic!("read unknown buffer {:?}", buffer);
        };
        let Some(ptr) = entry.mapped_ptr else {
            panic!("buffer {:?} is not host visible", buffer);
        };
        unsafe {
            self.allocator
                .invalidate_allocation(&entry.allocation, offset, dst.len() as vk::DeviceSize)
                .unwrap_or_else(|e| panic!("failed to invalidate buffer {:?}: {:?}", buffer, e));
            std::ptr::copy_nonoverlapping(ptr.add(offset as usize), dst.as_mut_ptr(), dst.len());
        }
    }

    fn create_image(&self, desc: &GfxImageDesc, debug_name: &str) -> vk::Image {
        let image_ci = vk::ImageCreateInfo::default()
            .image_type(desc.image_type)
            .format(desc.format)
            .extent(desc.extent)
            .mip_levels(1)
            .array_layers(desc.array_layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(desc.tiling)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };

        let (image, allocation) = unsafe {
            self.allocator
                .create_image(&image_ci, &alloc_ci)
                .unwrap_or_else(|e| panic!("failed to create image {}: {:?}", debug_name, e))
        };
        self.set_debug_name(image, &format!("Image::{}", debug_name));
        self.images.borrow_mut().insert(image, allocation);
        image
    }

    fn destroy_image(&self, image: vk::Image) {
        let Some(mut allocation) = self.images.borrow_mut().remove(&image) else {
            log::error!("destroy unknown image {:?}", image);
            return;
        };
        unsafe { self.allocator.destroy_image(image, &mut allocation) };
    }

    fn create_image_view(&self, desc: &GfxImageViewDesc, debug_name: &str) -> vk::ImageView {
        let info = vk::ImageViewCreateInfo::default()
            .image(desc.image)
            .view_type(desc.view_type)
            .format(desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: desc.aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: desc.base_array_layer,
                layer_count: desc.layer_count,
            });
        let handle = unsafe {
            self.device
                .create_image_view(&info, None)
                .unwrap_or_else(|e| panic!("failed to create image view {}: {:?}", debug_name, e))
        };
        self.set_debug_name(handle, &format!("ImageView::{}", debug_name));
        handle
    }

    fn destroy_image_view(&self, image_view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(image_view, None) };
    }

    fn create_sampler(&self, desc: &GfxSamplerDesc, debug_name: &str) -> vk::Sampler {
        let info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.mag_filter)
            .min_filter(desc.min_filter)
            .mipmap_mode(desc.mipmap_mode)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .max_lod(vk::LOD_CLAMP_NONE);
        let handle = unsafe {
            self.device
                .create_sampler(&info, None)
                .unwrap_or_else(|e| panic!("failed to create sampler {}: {:?}", debug_name, e))
        };
        self.set_debug_name(handle, &format!("Sampler::{}", debug_name));
        handle
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) };
    }

    fn create_fence(&self, signaled: bool, debug_name: &str) -> vk::Fence {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe {
            self.device
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)
                .unwrap_or_else(|e| panic!("failed to create fence {}: {:?}", debug_name, e))
        };
        self.set_debug_name(fence, &format!("Fence::{}", debug_name));
        fence
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], timeout: u64) -> Result<(), vk::Result> {
        unsafe { self.device.wait_for_fences(fences, true, timeout) }
    }

    fn reset_fences(&self, fences: &[vk::Fence]) {
        unsafe {
            self.device.reset_fences(fences).unwrap_or_else(|e| panic!("failed to reset fences: {:?}", e));
        }
    }

    fn create_semaphore(&self, debug_name: &str) -> vk::Semaphore {
        let semaphore = unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .unwrap_or_else(|e| panic!("failed to create semaphore {}: {:?}", debug_name, e))
        };
        self.set_debug_name(semaphore, &format!("Semaphore::{}", debug_name));
        semaphore
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn create_event(&self, debug_name: &str) -> vk::Event {
        let event = unsafe {
            self.device
                .create_event(&vk::EventCreateInfo::default().flags(vk::EventCreateFlags::DEVICE_ONLY), None)
                .unwrap_or_else(|e| panic!("failed to create event {}: {:?}", debug_name, e))
        };
        self.set_debug_name(event, &format!("Event::{}", debug_name));
        event
    }

    fn destroy_event(&self, event: vk::Event) {
        unsafe { self.device.destroy_event(event, None) };
    }

    fn allocate_command_buffer(&self, debug_name: &str) -> vk::CommandBuffer {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe {
            self.device
                .allocate_command_buffers(&info)
                .unwrap_or_else(|e| panic!("failed to allocate command buffer {}: {:?}", debug_name, e))[0]
        };
        self.set_debug_name(command_buffer, &format!("CommandBuffer::{}", debug_name));
        command_buffer
    }

    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.free_command_buffers(self.command_pool, std::slice::from_ref(&command_buffer)) };
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, usage: vk::CommandBufferUsageFlags) {
        unsafe {
            self.device
                .begin_command_buffer(command_buffer, &vk::CommandBufferBeginInfo::default().flags(usage))
                .unwrap_or_else(|e| panic!("failed to begin command buffer: {:?}", e));
        }
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device
                .end_command_buffer(command_buffer)
                .unwrap_or_else(|e| panic!("failed to end command buffer: {:?}", e));
        }
    }

    fn cmd_set_event(&self, command_buffer: vk::CommandBuffer, event: vk::Event, stage: vk::PipelineStageFlags2) {
        let barriers = [Self::event_barrier(stage)];
        let dependency = vk::DependencyInfo::default().memory_barriers(&barriers);
        unsafe { self.device.cmd_set_event2(command_buffer, event, &dependency) };
    }

    fn cmd_reset_event(&self, command_buffer: vk::CommandBuffer, event: vk::Event, stage: vk::PipelineStageFlags2) {
        unsafe { self.device.cmd_reset_event2(command_buffer, event, stage) };
    }

    fn cmd_wait_event(
        &self,
        command_buffer: vk::CommandBuffer,
        event: vk::Event,
        src_stage: vk::PipelineStageFlags2,
        _dst_stage: vk::PipelineStageFlags2,
    ) {
        let barriers = [Self::event_barrier(src_stage)];
        let dependency = vk::DependencyInfo::default().memory_barriers(&barriers);
        unsafe {
            self.device.cmd_wait_events2(
                command_buffer,
                std::slice::from_ref(&event),
                std::slice::from_ref(&dependency),
            )
        };
    }

    fn cmd_copy_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        unsafe { self.device.cmd_copy_buffer(command_buffer, src, dst, regions) };
    }

    fn cmd_copy_buffer_to_image(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe { self.device.cmd_copy_buffer_to_image(command_buffer, src, dst, dst_layout, regions) };
    }

    fn cmd_image_memory_barrier(&self, command_buffer: vk::CommandBuffer, barriers: &[vk::ImageMemoryBarrier2<'_>]) {
        let dependency = vk::DependencyInfo::default().image_memory_barriers(barriers);
        unsafe { self.device.cmd_pipeline_barrier2(command_buffer, &dependency) };
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            })
            .clear_values(clear_values);
        unsafe { self.device.cmd_begin_render_pass(command_buffer, &info, vk::SubpassContents::INLINE) };
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(command_buffer) };
    }

    fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        unsafe { self.device.cmd_bind_pipeline(command_buffer, bind_point, pipeline) };
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(command_buffer, bind_point, layout, first_set, descriptor_sets, &[]);
        }
    }

    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        unsafe { self.device.cmd_bind_vertex_buffers(command_buffer, first_binding, buffers, offsets) };
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        unsafe { self.device.cmd_bind_index_buffer(command_buffer, buffer, offset, index_type) };
    }

    fn cmd_draw(
        &self,
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe { self.device.cmd_draw(command_buffer, vertex_count, instance_count, first_vertex, first_instance) };
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    fn cmd_dispatch(&self, command_buffer: vk::CommandBuffer, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        unsafe { self.device.cmd_dispatch(command_buffer, group_count_x, group_count_y, group_count_z) };
    }

    fn queue_submit(&self, submit_infos: &[GfxSubmitInfo], fence: Option<vk::Fence>) {
        let _span = vkrg_crate_tools::profile_span!("queue_submit");
        GfxSubmitInfo::with_vk_submit_infos(submit_infos, |infos| unsafe {
            self.device
                .queue_submit2(self.queue, infos, fence.unwrap_or_default())
                .unwrap_or_else(|e| panic!("failed to submit to queue: {:?}", e));
        });
    }

    fn device_wait_idle(&self) {
        unsafe {
            self.device.device_wait_idle().unwrap_or_else(|e| panic!("failed to wait device idle: {:?}", e));
        }
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
        debug_name: &str,
    ) -> vk::DescriptorSetLayout {
        let layout = unsafe {
            self.device
                .create_descriptor_set_layout(&vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings), None)
                .unwrap_or_else(|e| panic!("failed to create descriptor set layout {}: {:?}", debug_name, e))
        };
        self.set_debug_name(layout, &format!("DescriptorSetLayout::{}", debug_name));
        layout
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
    }

    fn create_descriptor_pool(
        &self,
        pool_sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
        debug_name: &str,
    ) -> vk::DescriptorPool {
        let info = vk::DescriptorPoolCreateInfo::default().pool_sizes(pool_sizes).max_sets(max_sets);
        let pool = unsafe {
            self.device
                .create_descriptor_pool(&info, None)
                .unwrap_or_else(|e| panic!("failed to create descriptor pool {}: {:?}", debug_name, e))
        };
        self.set_debug_name(pool, &format!("DescriptorPool::{}", debug_name));
        pool
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) };
    }

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Vec<vk::DescriptorSet> {
        let info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(pool).set_layouts(layouts);
        unsafe {
            self.device
                .allocate_descriptor_sets(&info)
                .unwrap_or_else(|e| panic!("failed to allocate descriptor sets: {:?}", e))
        }
    }

    fn update_descriptor_sets(&self, writes: &[GfxWriteDescriptorSet]) {
        GfxWriteDescriptorSet::with_writes(writes, |writes| unsafe {
            self.device.update_descriptor_sets(writes, &[]);
        });
    }

    fn create_shader_module(&self, code: &[u32], debug_name: &str) -> vk::ShaderModule {
        let module = unsafe {
            self.device
                .create_shader_module(&vk::ShaderModuleCreateInfo::default().code(code), None)
                .unwrap_or_else(|e| panic!("failed to create shader module {}: {:?}", debug_name, e))
        };
        self.set_debug_name(module, &format!("ShaderModule::{}", debug_name));
        module
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) };
    }

    fn create_render_pass(&self, desc: &GfxRenderPassDesc, debug_name: &str) -> vk::RenderPass {
        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&desc.color_references)
            .input_attachments(&desc.input_references);
        let dependencies = Self::external_dependencies();
        let info = vk::RenderPassCreateInfo::default()
            .attachments(&desc.attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(&dependencies);
        let render_pass = unsafe {
            self.device
                .create_render_pass(&info, None)
                .unwrap_or_else(|e| panic!("failed to create render pass {}: {:?}", debug_name, e))
        };
        self.set_debug_name(render_pass, &format!("RenderPass::{}", debug_name));
        render_pass
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) };
    }

    fn create_framebuffer(&self, desc: &GfxFramebufferDesc, debug_name: &str) -> vk::Framebuffer {
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(desc.render_pass)
            .attachments(&desc.attachments)
            .width(desc.extent.width)
            .height(desc.extent.height)
            .layers(1);
        let framebuffer = unsafe {
            self.device
                .create_framebuffer(&info, None)
                .unwrap_or_else(|e| panic!("failed to create framebuffer {}: {:?}", debug_name, e))
        };
        self.set_debug_name(framebuffer, &format!("Framebuffer::{}", debug_name));
        framebuffer
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) };
    }

    fn create_pipeline_layout(&self, set_layouts: &[vk::DescriptorSetLayout], debug_name: &str) -> vk::PipelineLayout {
        let layout = unsafe {
            self.device
                .create_pipeline_layout(&vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts), None)
                .unwrap_or_else(|e| panic!("failed to create pipeline layout {}: {:?}", debug_name, e))
        };
        self.set_debug_name(layout, &format!("PipelineLayout::{}", debug_name));
        layout
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) };
    }

    fn create_graphics_pipeline(&self, desc: &GfxGraphicsPipelineDesc, debug_name: &str) -> vk::Pipeline {
        // CString 需要活到 pipeline 创建之后
        let entry_points = desc.stages.iter().map(Self::entry_point_name).collect_vec();
        let stages = desc
            .stages
            .iter()
            .zip(&entry_points)
            .map(|(stage, name)| {
                vk::PipelineShaderStageCreateInfo::default().stage(stage.stage).module(stage.module).name(name)
            })
            .collect_vec();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&desc.vertex_bindings)
            .vertex_attribute_descriptions(&desc.vertex_attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(desc.topology)
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: desc.extent.width as f32,
            height: desc.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: desc.extent,
        }];
        let viewport = vk::PipelineViewportStateCreateInfo::default().viewports(&viewports).scissors(&scissors);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);
        let multisample =
            vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(desc.blend_enabled)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        let blend_attachments = vec![blend_attachment; desc.color_attachment_count as usize];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(0);

        let pipeline = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&info), None)
                .unwrap_or_else(|(_, e)| panic!("failed to create graphics pipeline {}: {:?}", debug_name, e))[0]
        };
        self.set_debug_name(pipeline, &format!("GraphicsPipeline::{}", debug_name));
        pipeline
    }

    fn create_compute_pipeline(
        &self,
        layout: vk::PipelineLayout,
        stage: &GfxShaderStageDesc,
        debug_name: &str,
    ) -> vk::Pipeline {
        let entry_point = Self::entry_point_name(stage);
        let stage_info =
            vk::PipelineShaderStageCreateInfo::default().stage(stage.stage).module(stage.module).name(&entry_point);
        let info = vk::ComputePipelineCreateInfo::default().stage(stage_info).layout(layout);
        let pipeline = unsafe {
            self.device
                .create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&info), None)
                .unwrap_or_else(|(_, e)| panic!("failed to create compute pipeline {}: {:?}", debug_name, e))[0]
        };
        self.set_debug_name(pipeline, &format!("ComputePipeline::{}", debug_name));
        pipeline
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) };
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: Option<vk::Semaphore>,
        fence: Option<vk::Fence>,
    ) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                swapchain,
                timeout,
                semaphore.unwrap_or_default(),
                fence.unwrap_or_default(),
            )
        }
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool, vk::Result> {
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        unsafe { self.swapchain_loader.queue_present(self.queue, &present_info) }
    }

    fn recreate_swapchain(&self, old_swapchain: vk::SwapchainKHR) -> GfxSwapchainDesc {
        self.create_swapchain_impl(old_swapchain)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
    }
}

impl GfxVulkanDevice {
    /// 当前所有存活的 buffer 的 handle，用于泄漏检查
    pub fn live_buffers(&self) -> Vec<vk::Buffer> {
        self.buffers.borrow().keys().copied().collect_vec()
    }
}
