use ash::vk;
use itertools::Itertools;

/// 拥有数据的 descriptor write
///
/// `vk::WriteDescriptorSet` 只保存指针，这里保存实际的 buffer / image info，
/// 在调用 `vkUpdateDescriptorSets` 时再转换
#[derive(Clone, Debug)]
pub struct GfxWriteDescriptorSet {
    pub dst_set: vk::DescriptorSet,
    pub dst_binding: u32,
    pub dst_array_element: u32,
    pub descriptor_type: vk::DescriptorType,

    pub buffer_infos: Vec<vk::DescriptorBufferInfo>,
    pub image_infos: Vec<vk::DescriptorImageInfo>,
}
/// `vk::Descriptor*Info` 没有实现 `PartialEq`，逐个字段比较
impl PartialEq for GfxWriteDescriptorSet {
    fn eq(&self, other: &Self) -> bool {
        let buffer_key = |b: &vk::DescriptorBufferInfo| (b.buffer, b.offset, b.range);
        let image_key = |i: &vk::DescriptorImageInfo| (i.sampler, i.image_view, i.image_layout);

        self.dst_set == other.dst_set
            && self.dst_binding == other.dst_binding
            && self.dst_array_element == other.dst_array_element
            && self.descriptor_type == other.descriptor_type
            && self.buffer_infos.iter().map(buffer_key).eq(other.buffer_infos.iter().map(buffer_key))
            && self.image_infos.iter().map(image_key).eq(other.image_infos.iter().map(image_key))
    }
}
impl Eq for GfxWriteDescriptorSet {}

impl GfxWriteDescriptorSet {
    pub fn new_images(
        dst_set: vk::DescriptorSet,
        dst_binding: u32,
        dst_array_element: u32,
        descriptor_type: vk::DescriptorType,
        image_infos: Vec<vk::DescriptorImageInfo>,
    ) -> Self {
        Self {
            dst_set,
            dst_binding,
            dst_array_element,
            descriptor_type,
            buffer_infos: vec![],
            image_infos,
        }
    }

    pub fn new_buffers(
        dst_set: vk::DescriptorSet,
        dst_binding: u32,
        descriptor_type: vk::DescriptorType,
        buffer_infos: Vec<vk::DescriptorBufferInfo>,
    ) -> Self {
        Self {
            dst_set,
            dst_binding,
            dst_array_element: 0,
            descriptor_type,
            buffer_infos,
            image_infos: vec![],
        }
    }

    #[inline]
    pub fn descriptor_count(&self) -> u32 {
        (self.buffer_infos.len() + self.image_infos.len()) as u32
    }

    pub fn to_vk_type(&self) -> vk::WriteDescriptorSet<'_> {
        assert!(
            self.buffer_infos.is_empty() != self.image_infos.is_empty(),
            "Only one of buffer_infos or image_infos should be set in GfxWriteDescriptorSet"
        );

        vk::WriteDescriptorSet {
            dst_set: self.dst_set,
            dst_binding: self.dst_binding,
            dst_array_element: self.dst_array_element,
            descriptor_count: self.descriptor_count(),
            descriptor_type: self.descriptor_type,
            // 选择 buffer ptr 还是 image ptr，是由 descriptor type 控制的
            p_buffer_info: self.buffer_infos.as_ptr(),
            p_image_info: self.image_infos.as_ptr(),
            ..Default::default()
        }
    }

    pub fn with_writes(writes: &[Self], cbk: impl FnOnce(&[vk::WriteDescriptorSet])) {
        let writes = writes.iter().map(|w| w.to_vk_type()).collect_vec();
        cbk(&writes);
    }
}
