use ash::vk;
use itertools::Itertools;
use petgraph::{algo::toposort, graph::DiGraph};
use slotmap::{SecondaryMap, SlotMap};
use vkrg_gfx::{
    commands::{command_buffer::GfxCommandBuffer, fence::GfxFence, semaphore::GfxSemaphore, submit_info::GfxSubmitInfo},
    descriptors::descriptor_pool::{GfxDescriptorPool, GfxDescriptorSetLayout},
    device::GfxDeviceRef,
};
use vkrg_shader::shader_kind::ShaderKind;

use crate::{
    binder::{
        get_attachment_descriptions, get_attachment_references, get_image_views, get_input_attachment_references,
        write_descriptors,
    },
    graph::{
        connection::{RgBinding, RgConnection, RgConnectionSet},
        operation::{RgOperation, RgOperationCompileContext},
    },
    ids::{RgOperationHandle, RgOperationId, RgResourceHandle, RgResourceId},
    resource::RgResource,
    settings::RgGraphSettings,
    shader_pipeline::merge_layout_bindings,
};

/// graph 中的资源
pub struct RgResourceNode {
    pub name: String,
    pub id: RgResourceId,
    pub resource: RgResource,
}

/// graph 中的 operation 以及编译时为它创建的 descriptor 对象
struct RgOperationNode {
    operation: Box<dyn RgOperation>,
    /// 每个 resource index 一个，layout 中没有 binding 时为 null
    descriptor_sets: Vec<vk::DescriptorSet>,
    descriptor_pool: Option<GfxDescriptorPool>,
    descriptor_set_layout: Option<GfxDescriptorSetLayout>,
}

impl RgOperationNode {
    fn clear_compiled(&mut self) {
        self.descriptor_sets.clear();
        self.descriptor_pool = None;
        self.descriptor_set_layout = None;
    }
}

/// RenderGraph
///
/// 构建阶段添加资源、operation 以及它们之间的连接；[`RenderGraph::compile`] 之后连接被冻结。
///
/// 编译时为每个 resource index 预先录制一个 command buffer，每帧只需要 [`RenderGraph::submit`]。
/// resource index 与交换链的 image index 相同。
#[derive(Default)]
pub struct RenderGraph {
    /// 先于资源释放
    command_buffers: Vec<GfxCommandBuffer>,
    operations: SlotMap<RgOperationHandle, RgOperationNode>,
    resources: SlotMap<RgResourceHandle, RgResourceNode>,
    connections: RgConnectionSet,

    execution_order: Vec<RgOperationHandle>,
    settings: Option<RgGraphSettings>,
}

// new & init
impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resource(&mut self, name: impl Into<String>, resource: impl Into<RgResource>) -> RgResourceHandle {
        self.resources.insert(RgResourceNode {
            name: name.into(),
            id: RgResourceId::new(),
            resource: resource.into(),
        })
    }

    pub fn add_operation(&mut self, operation: impl RgOperation + 'static) -> RgOperationHandle {
        self.operations.insert(RgOperationNode {
            operation: Box::new(operation),
            descriptor_sets: vec![],
            descriptor_pool: None,
            descriptor_set_layout: None,
        })
    }
}

// connect
impl RenderGraph {
    fn connect(
        &mut self,
        operation: RgOperationHandle,
        resource: RgResourceHandle,
        name: impl Into<String>,
        kind: ShaderKind,
        binding: RgBinding,
    ) {
        vkrg_crate_tools::rg_assert!(self.operations.contains_key(operation), "connect unknown operation");
        vkrg_crate_tools::rg_assert!(self.resources.contains_key(resource), "connect unknown resource");
        self.connections.add(RgConnection {
            operation,
            resource,
            name: name.into(),
            kind,
            binding,
        });
    }

    /// 只读的 descriptor：sampler、uniform buffer、storage buffer
    pub fn connect_descriptor(
        &mut self,
        operation: RgOperationHandle,
        resource: RgResourceHandle,
        name: impl Into<String>,
        kind: ShaderKind,
    ) {
        self.connect(operation, resource, name, kind, RgBinding::Descriptor);
    }

    /// shader 会写入的 descriptor
    pub fn connect_output_descriptor(
        &mut self,
        operation: RgOperationHandle,
        resource: RgResourceHandle,
        name: impl Into<String>,
        kind: ShaderKind,
    ) {
        self.connect(operation, resource, name, kind, RgBinding::OutputDescriptor);
    }

    pub fn connect_attachment(
        &mut self,
        operation: RgOperationHandle,
        resource: RgResourceHandle,
        name: impl Into<String>,
        kind: ShaderKind,
        load_op: vk::AttachmentLoadOp,
    ) {
        self.connect(operation, resource, name, kind, RgBinding::Attachment(load_op));
    }

    pub fn connect_input_attachment(
        &mut self,
        operation: RgOperationHandle,
        resource: RgResourceHandle,
        name: impl Into<String>,
        kind: ShaderKind,
    ) {
        self.connect(operation, resource, name, kind, RgBinding::InputAttachment);
    }
}

// getters
impl RenderGraph {
    #[inline]
    pub fn resource(&self, handle: RgResourceHandle) -> Option<&RgResource> {
        self.resources.get(handle).map(|node| &node.resource)
    }

    #[inline]
    pub fn resource_mut(&mut self, handle: RgResourceHandle) -> Option<&mut RgResource> {
        self.resources.get_mut(handle).map(|node| &mut node.resource)
    }

    #[inline]
    pub fn resource_node(&self, handle: RgResourceHandle) -> Option<&RgResourceNode> {
        self.resources.get(handle)
    }

    pub fn find_resource(&self, name: &str) -> Option<RgResourceHandle> {
        self.resources.iter().find(|(_, node)| node.name == name).map(|(handle, _)| handle)
    }

    pub fn resources(&self) -> impl Iterator<Item = (RgResourceHandle, &RgResourceNode)> {
        self.resources.iter()
    }

    #[inline]
    pub fn operation(&self, handle: RgOperationHandle) -> Option<&dyn RgOperation> {
        self.operations.get(handle).map(|node| node.operation.as_ref())
    }

    pub fn operations(&self) -> impl Iterator<Item = (RgOperationHandle, &dyn RgOperation)> {
        self.operations.iter().map(|(handle, node)| (handle, node.operation.as_ref()))
    }

    pub fn find_operation(&self, id: RgOperationId) -> Option<RgOperationHandle> {
        self.operations.iter().find(|(_, node)| node.operation.uuid() == id).map(|(handle, _)| handle)
    }

    #[inline]
    pub fn connections(&self) -> &RgConnectionSet {
        &self.connections
    }

    /// 上一次编译得到的执行顺序
    #[inline]
    pub fn execution_order(&self) -> &[RgOperationHandle] {
        &self.execution_order
    }

    #[inline]
    pub fn settings(&self) -> Option<&RgGraphSettings> {
        self.settings.as_ref()
    }

    #[inline]
    pub fn is_compiled(&self) -> bool {
        self.settings.is_some()
    }

    /// 未编译时为 0
    #[inline]
    pub fn resource_count(&self) -> u32 {
        self.settings.as_ref().map_or(0, |s| s.resource_count)
    }

    pub fn descriptor_set(&self, operation: RgOperationHandle, resource_index: u32) -> vk::DescriptorSet {
        self.operations
            .get(operation)
            .and_then(|node| node.descriptor_sets.get(resource_index as usize))
            .copied()
            .unwrap_or(vk::DescriptorSet::null())
    }

    pub fn descriptor_set_layout(&self, operation: RgOperationHandle) -> Option<&GfxDescriptorSetLayout> {
        self.operations.get(operation).and_then(|node| node.descriptor_set_layout.as_ref())
    }

    #[inline]
    pub fn command_buffer(&self, resource_index: u32) -> Option<&GfxCommandBuffer> {
        self.command_buffers.get(resource_index as usize)
    }
}

// compile
impl RenderGraph {
    /// 编译资源与 operation，并为每个 resource index 录制 command buffer
    ///
    /// 可以重复调用（例如交换链重建之后），之前编译的对象会先被释放；
    /// 已经编译过的只允许编译一次的资源会被跳过
    pub fn compile(&mut self, settings: RgGraphSettings) {
        let _span = vkrg_crate_tools::profile_span!("RenderGraph::compile");
        log::info!(
            "compile render graph: {} resources, {} operations, resource count {}",
            self.resources.len(),
            self.operations.len(),
            settings.resource_count
        );

        self.connections.freeze();
        self.command_buffers.clear();
        self.settings = None;
        for node in self.operations.values_mut() {
            node.clear_compiled();
        }

        self.compile_resources(&settings);
        self.execution_order = self.sort_operations();
        for handle in self.execution_order.clone() {
            self.compile_operation(handle, &settings);
        }
        self.command_buffers = (0..settings.resource_count).map(|ri| self.record(&settings, ri)).collect();

        self.settings = Some(settings);
    }

    fn compile_resources(&mut self, settings: &RgGraphSettings) {
        for node in self.resources.values_mut() {
            let hooks = node.resource.hooks_mut();
            if hooks.is_compile_once() && hooks.is_compiled() {
                log::debug!("resource [{}] is already compiled, skip", node.name);
                continue;
            }
            log::debug!("compile {} resource [{}]", node.resource.variant_name(), node.name);
            node.resource.hooks_mut().compile(settings, &node.name);
        }
    }

    /// 写者先于读者；有环时报告并退回到添加的顺序
    fn sort_operations(&self) -> Vec<RgOperationHandle> {
        let mut graph = DiGraph::<RgOperationHandle, ()>::new();
        let mut indices = SecondaryMap::new();
        for handle in self.operations.keys() {
            indices.insert(handle, graph.add_node(handle));
        }
        for (writer, reader) in self.connections.dependencies() {
            if let (Some(&writer), Some(&reader)) = (indices.get(writer), indices.get(reader)) {
                graph.update_edge(writer, reader, ());
            }
        }

        match toposort(&graph, None) {
            Ok(order) => order.into_iter().map(|index| graph[index]).collect(),
            Err(cycle) => {
                let name = self.operations.get(graph[cycle.node_id()]).map_or("", |node| node.operation.name());
                vkrg_crate_tools::rg_assert!(false, "render graph has a cycle at operation [{}]", name);
                self.operations.keys().collect()
            }
        }
    }

    fn compile_operation(&mut self, handle: RgOperationHandle, settings: &RgGraphSettings) {
        let Self {
            operations,
            resources,
            connections,
            ..
        } = self;
        let Some(node) = operations.get_mut(handle) else {
            return;
        };
        let provider = connections.provider(resources, handle, settings.resource_count);
        let name = node.operation.name().to_string();

        let modules = node.operation.shader_modules();
        let bindings = merge_layout_bindings(modules.iter().copied());
        let has_bindings = !bindings.is_empty();
        let layout = GfxDescriptorSetLayout::new(settings.device.clone(), bindings, &format!("{}-layout", name));

        let (pool, descriptor_sets) = if has_bindings {
            let pool = GfxDescriptorPool::new(
                settings.device.clone(),
                &layout.pool_sizes(settings.resource_count),
                settings.resource_count,
                &format!("{}-pool", name),
            );
            let sets = pool.allocate(&layout, settings.resource_count);
            let mut updater: GfxDeviceRef = settings.device.clone();
            for (ri, set) in sets.iter().enumerate() {
                for module in &modules {
                    write_descriptors(module.reflection(), *set, ri as u32, module.kind(), &provider, &mut updater);
                }
            }
            (Some(pool), sets)
        } else {
            (None, vec![vk::DescriptorSet::null(); settings.resource_count as usize])
        };

        let mut ctx = RgOperationCompileContext {
            settings,
            descriptor_set_layout: layout.handle(),
            attachment_descriptions: vec![],
            attachment_references: vec![],
            input_attachment_references: vec![],
            framebuffer_views: vec![],
        };
        if let Some(fragment) = modules.iter().find(|m| m.kind() == ShaderKind::Fragment) {
            let reflection = fragment.reflection();
            ctx.attachment_descriptions = get_attachment_descriptions(reflection, ShaderKind::Fragment, &provider);
            ctx.attachment_references = get_attachment_references(reflection, ShaderKind::Fragment, &provider);
            ctx.input_attachment_references = get_input_attachment_references(
                reflection,
                ShaderKind::Fragment,
                &provider,
                ctx.attachment_references.len() as u32,
            );
            ctx.framebuffer_views = (0..settings.resource_count)
                .map(|ri| get_image_views(reflection, ShaderKind::Fragment, ri, &provider))
                .collect();
        }
        drop(modules);

        node.operation.compile(&ctx);
        node.descriptor_set_layout = Some(layout);
        node.descriptor_pool = pool;
        node.descriptor_sets = descriptor_sets;
    }

    /// 录制一个 resource index 的 command buffer：在每个 operation 前后调用资源的读写 hook
    fn record(&self, settings: &RgGraphSettings, resource_index: u32) -> GfxCommandBuffer {
        let _span = vkrg_crate_tools::profile_span!("RenderGraph::record");
        let cmd = GfxCommandBuffer::new(settings.device.clone(), &format!("render-graph-{}", resource_index));
        cmd.begin(vk::CommandBufferUsageFlags::empty());

        for node in self.resources.values() {
            node.resource.hooks().on_graph_execution_started(resource_index, &cmd);
        }

        for &handle in &self.execution_order {
            let Some(node) = self.operations.get(handle) else {
                continue;
            };
            let reads = self.connections.reads(handle);
            let writes = self.connections.writes(handle);
            let hooks = |handles: &[RgResourceHandle]| {
                handles.iter().filter_map(|h| self.resources.get(*h)).map(|n| n.resource.hooks()).collect_vec()
            };

            hooks(&reads).iter().for_each(|h| h.on_pre_read(resource_index, &cmd));
            hooks(&writes).iter().for_each(|h| h.on_pre_write(resource_index, &cmd));
            node.operation.record(&cmd, resource_index, self.descriptor_set(handle, resource_index));
            hooks(&writes).iter().for_each(|h| h.on_post_write(resource_index, &cmd));
        }

        for node in self.resources.values() {
            node.resource.hooks().on_graph_execution_ended(resource_index, &cmd);
        }

        cmd.end();
        cmd
    }
}

// submit
impl RenderGraph {
    /// 提交 resource index 对应的 command buffer
    pub fn submit(
        &self,
        resource_index: u32,
        wait: &[(&GfxSemaphore, vk::PipelineStageFlags2)],
        signal: &[&GfxSemaphore],
        fence: Option<&GfxFence>,
    ) {
        let _span = vkrg_crate_tools::profile_span!("RenderGraph::submit");
        let (Some(settings), Some(cmd)) = (self.settings.as_ref(), self.command_buffers.get(resource_index as usize))
        else {
            vkrg_crate_tools::rg_break!(
                "submit resource index {} of a graph with {} command buffers",
                resource_index,
                self.command_buffers.len()
            );
            return;
        };

        let mut info = GfxSubmitInfo::new(&[cmd]);
        for (semaphore, stage) in wait {
            info = info.wait(semaphore, *stage);
        }
        for semaphore in signal {
            info = info.signal(semaphore, vk::PipelineStageFlags2::ALL_COMMANDS);
        }
        settings.device.queue_submit(&[info], fence.map(|f| f.handle()));
    }
}
