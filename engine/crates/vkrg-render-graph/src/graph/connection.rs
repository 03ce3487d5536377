//! operation 与资源之间的连接
//!
//! 连接在构建 graph 时添加，graph 编译之后冻结。
//! 编译时 [`RgConnectionProvider`] 把某个 operation 的连接转换为 binder 需要的数据。

use std::rc::Rc;

use ash::vk;
use itertools::Itertools;
use slotmap::SlotMap;
use vkrg_shader::shader_kind::ShaderKind;

use crate::{
    binder::{RgAttachmentData, RgAttachmentProvider, RgDescriptorWriteInfoProvider},
    graph::render_graph::RgResourceNode,
    ids::{RgOperationHandle, RgResourceHandle},
};

/// 资源以什么方式绑定到 shader 中的名字上
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RgBinding {
    /// sampler / uniform buffer / storage buffer，只读
    Descriptor,
    /// 在 shader 中写入的 storage image / storage buffer
    OutputDescriptor,
    /// fragment shader 的输出
    Attachment(vk::AttachmentLoadOp),
    /// subpass input，只读
    InputAttachment,
}

impl RgBinding {
    #[inline]
    pub fn is_write(self) -> bool {
        matches!(self, Self::OutputDescriptor | Self::Attachment(_))
    }

    #[inline]
    fn is_attachment(self) -> bool {
        matches!(self, Self::Attachment(_) | Self::InputAttachment)
    }

    #[inline]
    fn is_descriptor(self) -> bool {
        matches!(self, Self::Descriptor | Self::OutputDescriptor | Self::InputAttachment)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgConnection {
    pub operation: RgOperationHandle,
    pub resource: RgResourceHandle,
    /// shader 中的名字：buffer object 的 block 名、sampler 名、输出名
    pub name: String,
    pub kind: ShaderKind,
    pub binding: RgBinding,
}

#[derive(Debug, Default)]
pub struct RgConnectionSet {
    connections: Vec<RgConnection>,
    frozen: bool,
}

// update
impl RgConnectionSet {
    pub fn add(&mut self, connection: RgConnection) {
        vkrg_crate_tools::rg_assert!(
            !self.frozen,
            "can not connect \"{}\" after the graph is compiled",
            connection.name
        );
        if self.frozen {
            return;
        }
        self.connections.push(connection);
    }

    #[inline]
    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }
}

// getters
impl RgConnectionSet {
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &RgConnection> {
        self.connections.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn for_operation(&self, operation: RgOperationHandle) -> impl Iterator<Item = &RgConnection> {
        self.connections.iter().filter(move |c| c.operation == operation)
    }

    /// operation 的 shader 中的名字是否已经连接了资源
    pub fn is_connected(&self, operation: RgOperationHandle, name: &str, kind: ShaderKind) -> bool {
        self.for_operation(operation).any(|c| c.name == name && c.kind == kind)
    }

    /// operation 读取的资源，不重复
    pub fn reads(&self, operation: RgOperationHandle) -> Vec<RgResourceHandle> {
        self.for_operation(operation).filter(|c| !c.binding.is_write()).map(|c| c.resource).unique().collect()
    }

    /// operation 写入的资源，不重复
    pub fn writes(&self, operation: RgOperationHandle) -> Vec<RgResourceHandle> {
        self.for_operation(operation).filter(|c| c.binding.is_write()).map(|c| c.resource).unique().collect()
    }

    /// (writer, reader) 对，同一个资源先写后读
    pub fn dependencies(&self) -> Vec<(RgOperationHandle, RgOperationHandle)> {
        let writers = self.connections.iter().filter(|c| c.binding.is_write());
        let readers = self.connections.iter().filter(|c| !c.binding.is_write());
        writers
            .cartesian_product(readers.collect_vec())
            .filter(|(w, r)| w.resource == r.resource && w.operation != r.operation)
            .map(|(w, r)| (w.operation, r.operation))
            .unique()
            .collect()
    }

    pub(crate) fn provider<'a>(
        &'a self,
        resources: &'a SlotMap<RgResourceHandle, RgResourceNode>,
        operation: RgOperationHandle,
        resource_count: u32,
    ) -> RgConnectionProvider<'a> {
        RgConnectionProvider {
            connections: self,
            resources,
            operation,
            resource_count,
        }
    }
}

/// 某个 operation 的连接，作为 binder 的 provider
pub struct RgConnectionProvider<'a> {
    connections: &'a RgConnectionSet,
    resources: &'a SlotMap<RgResourceHandle, RgResourceNode>,
    operation: RgOperationHandle,
    resource_count: u32,
}

impl RgConnectionProvider<'_> {
    fn find<'b>(
        &'b self,
        name: &'b str,
        kind: ShaderKind,
        filter: impl Fn(RgBinding) -> bool + 'b,
    ) -> impl Iterator<Item = (&'b RgConnection, &'b RgResourceNode)> + 'b {
        self.connections
            .for_operation(self.operation)
            .filter(move |c| c.name == name && c.kind == kind && filter(c.binding))
            .filter_map(move |c| self.resources.get(c.resource).map(|node| (c, node)))
    }
}

impl RgAttachmentProvider for RgConnectionProvider<'_> {
    fn attachment_data(&self, name: &str, kind: ShaderKind) -> Option<RgAttachmentData> {
        let (connection, node) = self.find(name, kind, RgBinding::is_attachment).next()?;
        let image = node.resource.as_image()?;

        // 闭包不能借用资源，预先取出所有 view
        let views = (0..self.resource_count)
            .map(|ri| (0..image.layer_count()).map(|layer| image.image_view(ri, layer)).collect_vec())
            .collect_vec();
        let load_op = match connection.binding {
            RgBinding::Attachment(load_op) => load_op,
            _ => vk::AttachmentLoadOp::LOAD,
        };

        Some(RgAttachmentData {
            format: image.format(),
            load_op,
            image_view: Rc::new(move |ri, layer| {
                views
                    .get(ri as usize)
                    .and_then(|layers| layers.get(layer as usize))
                    .copied()
                    .unwrap_or(vk::ImageView::null())
            }),
            initial_layout: image.initial_layout(),
            final_layout: image.final_layout(),
        })
    }
}

impl RgDescriptorWriteInfoProvider for RgConnectionProvider<'_> {
    fn image_infos(&self, name: &str, kind: ShaderKind, layer: u32, resource_index: u32) -> Vec<vk::DescriptorImageInfo> {
        self.find(name, kind, RgBinding::is_descriptor)
            .filter_map(|(c, node)| node.resource.as_image().map(|image| (c, image)))
            .filter(|(_, image)| layer < image.layer_count())
            .map(|(c, image)| vk::DescriptorImageInfo {
                sampler: image.sampler(),
                image_view: image.image_view(resource_index, layer),
                image_layout: if c.binding == RgBinding::OutputDescriptor {
                    vk::ImageLayout::GENERAL
                } else {
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                },
            })
            .collect()
    }

    fn buffer_infos(&self, name: &str, kind: ShaderKind, resource_index: u32) -> Vec<vk::DescriptorBufferInfo> {
        self.find(name, kind, RgBinding::is_descriptor)
            .filter_map(|(_, node)| node.resource.as_buffer())
            .map(|buffer| vk::DescriptorBufferInfo {
                buffer: buffer.buffer(resource_index),
                offset: 0,
                range: buffer.size(),
            })
            .collect()
    }
}
