use ash::vk;

use crate::device::GfxDeviceRef;

/// 独占的 descriptor set layout
pub struct GfxDescriptorSetLayout {
    device: GfxDeviceRef,
    handle: vk::DescriptorSetLayout,
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}
impl GfxDescriptorSetLayout {
    pub fn new(device: GfxDeviceRef, bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>, name: &str) -> Self {
        let handle = device.create_descriptor_set_layout(&bindings, name);
        Self {
            device,
            handle,
            bindings,
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    #[inline]
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        &self.bindings
    }

    /// 按 descriptor type 统计数量，用于创建 descriptor pool
    pub fn pool_sizes(&self, set_count: u32) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes: Vec<vk::DescriptorPoolSize> = vec![];
        for binding in &self.bindings {
            match sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
                Some(size) => size.descriptor_count += binding.descriptor_count * set_count,
                None => sizes.push(vk::DescriptorPoolSize {
                    ty: binding.descriptor_type,
                    descriptor_count: binding.descriptor_count * set_count,
                }),
            }
        }
        sizes
    }
}
impl Drop for GfxDescriptorSetLayout {
    fn drop(&mut self) {
        self.device.destroy_descriptor_set_layout(self.handle);
    }
}

/// 独占的 descriptor pool，其中分配的 descriptor set 随 pool 一起释放
pub struct GfxDescriptorPool {
    device: GfxDeviceRef,
    handle: vk::DescriptorPool,
}
impl GfxDescriptorPool {
    /// `pool_sizes` 为空时（layout 中没有任何 binding）仍然创建一个可用的 pool
    pub fn new(device: GfxDeviceRef, pool_sizes: &[vk::DescriptorPoolSize], max_sets: u32, name: &str) -> Self {
        let handle = device.create_descriptor_pool(pool_sizes, max_sets.max(1), name);
        Self { device, handle }
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }

    /// 为同一个 layout 分配 `count` 个 descriptor set
    pub fn allocate(&self, layout: &GfxDescriptorSetLayout, count: u32) -> Vec<vk::DescriptorSet> {
        let layouts = vec![layout.handle(); count as usize];
        self.device.allocate_descriptor_sets(self.handle, &layouts)
    }
}
impl Drop for GfxDescriptorPool {
    fn drop(&mut self) {
        self.device.destroy_descriptor_pool(self.handle);
    }
}
