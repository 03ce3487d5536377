//! 从 fragment shader 的输出以及 subpass input 推导 attachment
//!
//! attachment 的顺序：先是所有输出（按反射顺序），后是所有 subpass input

use std::rc::Rc;

use ash::vk;
use vkrg_shader::{reflection::ShaderModuleReflection, shader_kind::ShaderKind};

/// 一个 attachment 的数据
#[derive(Clone)]
pub struct RgAttachmentData {
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    /// (resource index, layer) -> image view
    pub image_view: Rc<dyn Fn(u32, u32) -> vk::ImageView>,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

impl std::fmt::Debug for RgAttachmentData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RgAttachmentData")
            .field("format", &self.format)
            .field("load_op", &self.load_op)
            .field("initial_layout", &self.initial_layout)
            .field("final_layout", &self.final_layout)
            .finish()
    }
}

pub trait RgAttachmentProvider {
    fn attachment_data(&self, name: &str, kind: ShaderKind) -> Option<RgAttachmentData>;
}

#[derive(Clone, Debug)]
pub struct RgAttachmentDataEntry {
    pub name: String,
    pub kind: ShaderKind,
    pub data: RgAttachmentData,
}

/// 按照 (name, kind) 查找的表，同名时使用第一个
#[derive(Clone, Debug, Default)]
pub struct RgAttachmentDataTable {
    pub table: Vec<RgAttachmentDataEntry>,
}

impl RgAttachmentDataTable {
    pub fn push(&mut self, name: impl Into<String>, kind: ShaderKind, data: RgAttachmentData) {
        self.table.push(RgAttachmentDataEntry {
            name: name.into(),
            kind,
            data,
        });
    }
}

impl RgAttachmentProvider for RgAttachmentDataTable {
    fn attachment_data(&self, name: &str, kind: ShaderKind) -> Option<RgAttachmentData> {
        self.table.iter().find(|e| e.name == name && e.kind == kind).map(|e| e.data.clone())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum AttachmentRole {
    Output,
    SubpassInput,
}

/// 按照 attachment 的顺序取出数据，没有数据的记录错误并跳过
fn collect_attachments(
    reflection: &ShaderModuleReflection,
    kind: ShaderKind,
    provider: &dyn RgAttachmentProvider,
) -> Vec<(AttachmentRole, RgAttachmentData)> {
    let outputs = reflection.outputs.iter().map(|o| (AttachmentRole::Output, o.name.as_str()));
    let inputs = reflection.subpass_inputs.iter().map(|i| (AttachmentRole::SubpassInput, i.name.as_str()));

    outputs
        .chain(inputs)
        .filter_map(|(role, name)| {
            let data = provider.attachment_data(name, kind);
            if vkrg_crate_tools::rg_error!(data.is_none()) {
                log::error!("attachment \"{}\" of {} shader has no data bound", name, kind);
            }
            data.map(|data| (role, data))
        })
        .collect()
}

/// framebuffer 使用的 image view，与 [`get_attachment_descriptions`] 一一对应
pub fn get_image_views(
    reflection: &ShaderModuleReflection,
    kind: ShaderKind,
    resource_index: u32,
    provider: &dyn RgAttachmentProvider,
) -> Vec<vk::ImageView> {
    collect_attachments(reflection, kind, provider)
        .into_iter()
        .map(|(_, data)| (data.image_view)(resource_index, 0))
        .collect()
}

/// 输出的 color attachment reference
pub fn get_attachment_references(
    reflection: &ShaderModuleReflection,
    kind: ShaderKind,
    provider: &dyn RgAttachmentProvider,
) -> Vec<vk::AttachmentReference> {
    collect_attachments(reflection, kind, provider)
        .into_iter()
        .enumerate()
        .filter(|(_, (role, _))| *role == AttachmentRole::Output)
        .map(|(index, _)| vk::AttachmentReference {
            attachment: index as u32,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        })
        .collect()
}

/// subpass input 的 reference，attachment 下标从 `start_index` 开始
pub fn get_input_attachment_references(
    reflection: &ShaderModuleReflection,
    kind: ShaderKind,
    provider: &dyn RgAttachmentProvider,
    start_index: u32,
) -> Vec<vk::AttachmentReference> {
    collect_attachments(reflection, kind, provider)
        .into_iter()
        .filter(|(role, _)| *role == AttachmentRole::SubpassInput)
        .enumerate()
        .map(|(index, _)| vk::AttachmentReference {
            attachment: start_index + index as u32,
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        })
        .collect()
}

pub fn get_attachment_descriptions(
    reflection: &ShaderModuleReflection,
    kind: ShaderKind,
    provider: &dyn RgAttachmentProvider,
) -> Vec<vk::AttachmentDescription> {
    collect_attachments(reflection, kind, provider)
        .into_iter()
        .map(|(_, data)| vk::AttachmentDescription {
            flags: vk::AttachmentDescriptionFlags::empty(),
            format: data.format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: data.load_op,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: data.initial_layout,
            final_layout: data.final_layout,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;
    use vkrg_shader::reflection::{ReflBaseType, ReflFieldType, ReflOutput};

    use super::*;
    use crate::test_utils::subpass_input;

    fn output(name: &str, location: u32) -> ReflOutput {
        ReflOutput {
            name: name.to_string(),
            location,
            ty: ReflFieldType::vec(ReflBaseType::Float, 4),
            array_size: 1,
        }
    }

    fn data(format: vk::Format, view_base: u64) -> RgAttachmentData {
        RgAttachmentData {
            format,
            load_op: vk::AttachmentLoadOp::CLEAR,
            image_view: Rc::new(move |ri, layer| vk::ImageView::from_raw(view_base + ri as u64 * 10 + layer as u64)),
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    fn reflection() -> ShaderModuleReflection {
        ShaderModuleReflection {
            outputs: vec![output("outColor", 0), output("outNormal", 1), output("outDepth", 2)],
            subpass_inputs: vec![subpass_input("gbuffer", 0, 0)],
            ..Default::default()
        }
    }

    fn table() -> RgAttachmentDataTable {
        let mut table = RgAttachmentDataTable::default();
        table.push("outColor", ShaderKind::Fragment, data(vk::Format::B8G8R8A8_UNORM, 100));
        table.push("outDepth", ShaderKind::Fragment, data(vk::Format::R32_SFLOAT, 200));
        table.push("gbuffer", ShaderKind::Fragment, data(vk::Format::R16G16B16A16_SFLOAT, 300));
        // 阶段不匹配，不会被使用
        table.push("outNormal", ShaderKind::Vertex, data(vk::Format::R8G8B8A8_UNORM, 400));
        table
    }

    #[test]
    fn test_missing_attachment_is_skipped_consistently() {
        let reflection = reflection();
        let table = table();

        let views = get_image_views(&reflection, ShaderKind::Fragment, 1, &table);
        assert_eq!(views.iter().map(|v| v.as_raw()).collect::<Vec<_>>(), vec![110, 210, 310]);

        let descriptions = get_attachment_descriptions(&reflection, ShaderKind::Fragment, &table);
        assert_eq!(
            descriptions.iter().map(|d| d.format).collect::<Vec<_>>(),
            vec![vk::Format::B8G8R8A8_UNORM, vk::Format::R32_SFLOAT, vk::Format::R16G16B16A16_SFLOAT]
        );
        assert!(descriptions.iter().all(|d| d.store_op == vk::AttachmentStoreOp::STORE));

        let refs = get_attachment_references(&reflection, ShaderKind::Fragment, &table);
        assert_eq!(refs.iter().map(|r| r.attachment).collect::<Vec<_>>(), vec![0, 1]);
        assert!(refs.iter().all(|r| r.layout == vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
    }

    #[test]
    fn test_input_attachment_references_start_index() {
        let refs = get_input_attachment_references(&reflection(), ShaderKind::Fragment, &table(), 2);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].attachment, 2);
        assert_eq!(refs[0].layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_attachment_binder_is_idempotent() {
        let reflection = reflection();
        let table = table();
        let first = get_attachment_references(&reflection, ShaderKind::Fragment, &table);
        let second = get_attachment_references(&reflection, ShaderKind::Fragment, &table);
        assert_eq!(
            first.iter().map(|r| (r.attachment, r.layout)).collect::<Vec<_>>(),
            second.iter().map(|r| (r.attachment, r.layout)).collect::<Vec<_>>()
        );
        assert_eq!(
            get_image_views(&reflection, ShaderKind::Fragment, 0, &table),
            get_image_views(&reflection, ShaderKind::Fragment, 0, &table)
        );
    }
}
