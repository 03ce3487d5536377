//! 从反射数据推导 descriptor set layout，并写入 descriptor
//!
//! binding 的顺序：sampler、uniform buffer、storage buffer、subpass input

use ash::vk;
use vkrg_gfx::{descriptors::write_descriptor_set::GfxWriteDescriptorSet, device::GfxDeviceRef};
use vkrg_shader::{reflection::ShaderModuleReflection, shader_kind::ShaderKind};

/// 为 descriptor 写入提供 image / buffer 信息
pub trait RgDescriptorWriteInfoProvider {
    fn image_infos(&self, name: &str, kind: ShaderKind, layer: u32, resource_index: u32) -> Vec<vk::DescriptorImageInfo>;
    fn buffer_infos(&self, name: &str, kind: ShaderKind, resource_index: u32) -> Vec<vk::DescriptorBufferInfo>;
}

/// descriptor 写入的去处
pub trait RgDescriptorUpdater {
    fn update_descriptor_sets(&mut self, writes: &[GfxWriteDescriptorSet]);
}

impl RgDescriptorUpdater for GfxDeviceRef {
    fn update_descriptor_sets(&mut self, writes: &[GfxWriteDescriptorSet]) {
        vkrg_gfx::device::GfxDevice::update_descriptor_sets(self.as_ref(), writes);
    }
}

/// 收集所有写入，不提交给设备
impl RgDescriptorUpdater for Vec<GfxWriteDescriptorSet> {
    fn update_descriptor_sets(&mut self, writes: &[GfxWriteDescriptorSet]) {
        self.extend_from_slice(writes);
    }
}

pub struct RgDescriptorImageEntry {
    pub name: String,
    pub kind: ShaderKind,
    pub sampler: vk::Sampler,
    /// (resource index, layer) -> image view
    pub image_view: Box<dyn Fn(u32, u32) -> vk::ImageView>,
    pub image_layout: vk::ImageLayout,
}

pub struct RgDescriptorBufferEntry {
    pub name: String,
    pub kind: ShaderKind,
    /// resource index -> buffer
    pub buffer: Box<dyn Fn(u32) -> vk::Buffer>,
    pub offset: vk::DeviceSize,
    pub range: vk::DeviceSize,
}

/// 按照 (name, kind) 过滤的表，所有匹配的条目都会被写入
#[derive(Default)]
pub struct RgDescriptorWriteInfoTable {
    pub image_infos: Vec<RgDescriptorImageEntry>,
    pub buffer_infos: Vec<RgDescriptorBufferEntry>,
}

impl RgDescriptorWriteInfoProvider for RgDescriptorWriteInfoTable {
    fn image_infos(&self, name: &str, kind: ShaderKind, layer: u32, resource_index: u32) -> Vec<vk::DescriptorImageInfo> {
        self.image_infos
            .iter()
            .filter(|e| e.name == name && e.kind == kind)
            .map(|e| vk::DescriptorImageInfo {
                sampler: e.sampler,
                image_view: (e.image_view)(resource_index, layer),
                image_layout: e.image_layout,
            })
            .collect()
    }

    fn buffer_infos(&self, name: &str, kind: ShaderKind, resource_index: u32) -> Vec<vk::DescriptorBufferInfo> {
        self.buffer_infos
            .iter()
            .filter(|e| e.name == name && e.kind == kind)
            .map(|e| vk::DescriptorBufferInfo {
                buffer: (e.buffer)(resource_index),
                offset: e.offset,
                range: e.range,
            })
            .collect()
    }
}

/// descriptor set layout 的 binding
pub fn get_layout(reflection: &ShaderModuleReflection, kind: ShaderKind) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
    let binding = |binding: u32, descriptor_type: vk::DescriptorType, count: u32| {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(descriptor_type)
            .descriptor_count(count)
            .stage_flags(kind.stage_flags())
    };

    let samplers = reflection
        .samplers
        .iter()
        .map(|s| binding(s.binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, s.array_size));
    let ubos = reflection.ubos.iter().map(|b| binding(b.binding, vk::DescriptorType::UNIFORM_BUFFER, 1));
    let storage_buffers =
        reflection.storage_buffers.iter().map(|b| binding(b.binding, vk::DescriptorType::STORAGE_BUFFER, 1));
    let subpass_inputs =
        reflection.subpass_inputs.iter().map(|i| binding(i.binding, vk::DescriptorType::INPUT_ATTACHMENT, 1));

    samplers.chain(ubos).chain(storage_buffers).chain(subpass_inputs).collect()
}

/// 每个数组元素一个写入
fn image_writes<'a>(
    entries: impl Iterator<Item = (&'a str, u32, u32)>,
    dst_set: vk::DescriptorSet,
    resource_index: u32,
    kind: ShaderKind,
    descriptor_type: vk::DescriptorType,
    provider: &dyn RgDescriptorWriteInfoProvider,
) -> Vec<GfxWriteDescriptorSet> {
    let mut writes = vec![];
    for (name, binding, array_size) in entries {
        for layer in 0..array_size {
            let infos = provider.image_infos(name, kind, layer, resource_index);
            if vkrg_crate_tools::rg_error!(infos.is_empty()) {
                log::error!("{:?} \"{}\" (layer {}) has no descriptor bound", descriptor_type, name, layer);
                continue;
            }
            writes.push(GfxWriteDescriptorSet::new_images(dst_set, binding, layer, descriptor_type, infos));
        }
    }
    writes
}

fn buffer_writes<'a>(
    entries: impl Iterator<Item = (&'a str, u32)>,
    dst_set: vk::DescriptorSet,
    resource_index: u32,
    kind: ShaderKind,
    descriptor_type: vk::DescriptorType,
    provider: &dyn RgDescriptorWriteInfoProvider,
) -> Vec<GfxWriteDescriptorSet> {
    let mut writes = vec![];
    for (name, binding) in entries {
        let infos = provider.buffer_infos(name, kind, resource_index);
        if vkrg_crate_tools::rg_error!(infos.is_empty()) {
            log::error!("{:?} \"{}\" has no descriptor bound", descriptor_type, name);
            continue;
        }
        writes.push(GfxWriteDescriptorSet::new_buffers(dst_set, binding, descriptor_type, infos));
    }
    writes
}

/// 将反射数据中所有的 binding 写入 `dst_set`
///
/// 每一类 binding 调用一次 `updater`，没有任何写入的类别不调用
pub fn write_descriptors(
    reflection: &ShaderModuleReflection,
    dst_set: vk::DescriptorSet,
    resource_index: u32,
    kind: ShaderKind,
    provider: &dyn RgDescriptorWriteInfoProvider,
    updater: &mut dyn RgDescriptorUpdater,
) {
    let categories = [
        image_writes(
            reflection.samplers.iter().map(|s| (s.name.as_str(), s.binding, s.array_size)),
            dst_set,
            resource_index,
            kind,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            provider,
        ),
        buffer_writes(
            reflection.ubos.iter().map(|b| (b.name.as_str(), b.binding)),
            dst_set,
            resource_index,
            kind,
            vk::DescriptorType::UNIFORM_BUFFER,
            provider,
        ),
        buffer_writes(
            reflection.storage_buffers.iter().map(|b| (b.name.as_str(), b.binding)),
            dst_set,
            resource_index,
            kind,
            vk::DescriptorType::STORAGE_BUFFER,
            provider,
        ),
        image_writes(
            reflection.subpass_inputs.iter().map(|i| (i.name.as_str(), i.binding, i.array_size)),
            dst_set,
            resource_index,
            kind,
            vk::DescriptorType::INPUT_ATTACHMENT,
            provider,
        ),
    ];

    for writes in categories.iter().filter(|w| !w.is_empty()) {
        updater.update_descriptor_sets(writes);
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;
    use crate::test_utils::{buffer_object, globals_ubo, sampler, textured_fragment_module};

    fn table() -> RgDescriptorWriteInfoTable {
        let mut table = RgDescriptorWriteInfoTable::default();
        table.image_infos.push(RgDescriptorImageEntry {
            name: "albedo".to_string(),
            kind: ShaderKind::Fragment,
            sampler: vk::Sampler::from_raw(7),
            image_view: Box::new(|ri, layer| vk::ImageView::from_raw(100 + ri as u64 * 10 + layer as u64)),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        });
        table.buffer_infos.push(RgDescriptorBufferEntry {
            name: "Globals".to_string(),
            kind: ShaderKind::Fragment,
            buffer: Box::new(|ri| vk::Buffer::from_raw(500 + ri as u64)),
            offset: 0,
            range: 20,
        });
        table
    }

    #[test]
    fn test_fragment_layout_sampler_then_ubo() {
        let mut reflection = ShaderModuleReflection::default();
        reflection.samplers.push(sampler("albedo", 0, 1));
        reflection.ubos.push(buffer_object(
            "Material",
            1,
            vec![crate::test_utils::array_field(
                "rows",
                0,
                vkrg_shader::reflection::ReflFieldType::vec(vkrg_shader::reflection::ReflBaseType::Float, 4),
                4,
                16,
            )],
        ));
        assert_eq!(reflection.ubos[0].full_size, 64);

        let layout = get_layout(&reflection, ShaderKind::Fragment);
        assert_eq!(layout.len(), 2);
        assert_eq!(layout[0].binding, 0);
        assert_eq!(layout[0].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(layout[1].binding, 1);
        assert_eq!(layout[1].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        for binding in &layout {
            assert_eq!(binding.descriptor_count, 1);
            assert_eq!(binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
        }
    }

    #[test]
    fn test_sampler_array_count_and_order() {
        let mut reflection = ShaderModuleReflection::default();
        reflection.subpass_inputs.push(crate::test_utils::subpass_input("gbuffer", 3, 0));
        reflection.storage_buffers.push(buffer_object("Particles", 2, vec![]));
        reflection.ubos.push(globals_ubo(1));
        reflection.samplers.push(sampler("shadow", 0, 4));

        let layout = get_layout(&reflection, ShaderKind::Compute);
        assert_eq!(
            layout.iter().map(|b| (b.binding, b.descriptor_type, b.descriptor_count)).collect::<Vec<_>>(),
            vec![
                (0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4),
                (1, vk::DescriptorType::UNIFORM_BUFFER, 1),
                (2, vk::DescriptorType::STORAGE_BUFFER, 1),
                (3, vk::DescriptorType::INPUT_ATTACHMENT, 1),
            ]
        );
        assert!(layout.iter().all(|b| b.stage_flags == vk::ShaderStageFlags::COMPUTE));
    }

    #[test]
    fn test_write_descriptors_per_category() {
        let module = textured_fragment_module();
        let set = vk::DescriptorSet::from_raw(42);
        let mut writes: Vec<GfxWriteDescriptorSet> = vec![];
        write_descriptors(module.reflection(), set, 2, ShaderKind::Fragment, &table(), &mut writes);

        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(writes[0].image_infos[0].image_view, vk::ImageView::from_raw(120));
        assert_eq!(writes[1].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(writes[1].dst_binding, 1);
        assert_eq!(writes[1].buffer_infos[0].buffer, vk::Buffer::from_raw(502));
        assert!(writes.iter().all(|w| w.dst_set == set));
    }

    #[test]
    fn test_unbound_descriptor_is_skipped() {
        let mut reflection = textured_fragment_module().reflection().clone();
        reflection.samplers.push(sampler("missing", 2, 2));

        let mut writes: Vec<GfxWriteDescriptorSet> = vec![];
        write_descriptors(&reflection, vk::DescriptorSet::from_raw(1), 0, ShaderKind::Fragment, &table(), &mut writes);
        assert_eq!(writes.len(), 2);
        assert!(writes.iter().all(|w| w.dst_binding != 2));

        // 阶段不匹配时同样跳过
        let mut writes: Vec<GfxWriteDescriptorSet> = vec![];
        write_descriptors(&reflection, vk::DescriptorSet::from_raw(1), 0, ShaderKind::Vertex, &table(), &mut writes);
        assert!(writes.is_empty());
    }

    #[test]
    fn test_write_descriptors_is_idempotent() {
        let module = textured_fragment_module();
        let table = table();
        let collect = || {
            let mut writes: Vec<GfxWriteDescriptorSet> = vec![];
            write_descriptors(module.reflection(), vk::DescriptorSet::from_raw(9), 1, ShaderKind::Fragment, &table, &mut writes);
            writes
        };
        assert_eq!(collect(), collect());
    }
}
