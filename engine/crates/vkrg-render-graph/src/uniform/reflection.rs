use std::sync::Arc;

use indexmap::IndexMap;
use vkrg_shader::{reflection::ReflBufferObject, shader_kind::ShaderKind, shader_module::ShaderModule};

use crate::{
    graph::{RenderGraph, RgOperation},
    ids::{RgOperationHandle, RgOperationId, RgResourceHandle},
    resource::{RgCpuBufferResource, RgGpuBufferResource, RgResource},
    uniform::buffer_data::RgBufferData,
};

/// 为 buffer object 创建资源
///
/// 把 `treat_as_output` 置为 true 时，资源以可写的 descriptor 连接，并且不会在 flush 时被写入
pub type RgBufferResourceCreator = dyn Fn(&dyn RgOperation, &ShaderModule, &Arc<ReflBufferObject>, &mut bool) -> RgResource;

/// 每个 resource index 一个 CPU 可见的 buffer
pub fn default_resource_creator(
    _operation: &dyn RgOperation,
    _module: &ShaderModule,
    object: &Arc<ReflBufferObject>,
    _treat_as_output: &mut bool,
) -> RgResource {
    RgCpuBufferResource::new(object.full_size as u64).into()
}

/// 每个 resource index 一个 GPU 本地的 buffer，flush 时通过 staging buffer 传输
pub fn gpu_buffer_resource_creator(
    _operation: &dyn RgOperation,
    _module: &ShaderModule,
    object: &Arc<ReflBufferObject>,
    _treat_as_output: &mut bool,
) -> RgResource {
    RgGpuBufferResource::new(object.full_size as u64).into()
}

/// 自动创建的资源与 buffer object 的对应关系
#[derive(Clone, Debug)]
pub struct RgBufferObjectConnection {
    pub operation: RgOperationId,
    pub object: Arc<ReflBufferObject>,
    pub resource: RgResourceHandle,
    pub kind: ShaderKind,
    pub is_output: bool,
}

/// 按 buffer object 名字选择
#[derive(Debug, Default)]
pub struct RgBufferObjectSelector {
    datas: IndexMap<String, RgBufferData>,
}

impl RgBufferObjectSelector {
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.datas.contains_key(name)
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&RgBufferData> {
        self.datas.get(name)
    }

    #[inline]
    pub fn get_mut(&mut self, name: &str) -> Option<&mut RgBufferData> {
        self.datas.get_mut(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datas.keys().map(|k| k.as_str())
    }
}

/// 按 shader 阶段选择
#[derive(Debug, Default)]
pub struct RgShaderKindSelector {
    selectors: IndexMap<ShaderKind, RgBufferObjectSelector>,
}

impl RgShaderKindSelector {
    #[inline]
    pub fn get(&self, kind: ShaderKind) -> Option<&RgBufferObjectSelector> {
        self.selectors.get(&kind)
    }

    #[inline]
    pub fn get_mut(&mut self, kind: ShaderKind) -> Option<&mut RgBufferObjectSelector> {
        self.selectors.get_mut(&kind)
    }
}

/// 为 graph 中 operation 的 buffer object 自动创建资源，并在每帧写入暂存的数据
///
/// 已经显式连接的 (operation, buffer object) 不会创建资源。
/// 数据按照 `[operation uuid][shader kind][buffer object name]` 查找：
///
/// ```ignore
/// let mut uniforms = UniformReflection::new(&mut graph);
/// graph.compile(settings);
/// uniforms.buffer_data(op_id, ShaderKind::Fragment, "Globals").field("time").set(&t);
/// uniforms.flush(&graph, resource_index);
/// ```
pub struct UniformReflection {
    selectors: IndexMap<RgOperationId, RgShaderKindSelector>,
    connections: Vec<RgBufferObjectConnection>,
    /// 查找失败时返回，写入被丢弃
    dummy: RgBufferData,
}

/// 需要创建资源的 buffer object
struct PendingBufferObject {
    operation: RgOperationHandle,
    operation_id: RgOperationId,
    name: String,
    kind: ShaderKind,
    object: Arc<ReflBufferObject>,
    resource: RgResource,
    is_output: bool,
}

// new & init
impl UniformReflection {
    pub fn new(graph: &mut RenderGraph) -> Self {
        Self::with_creator(graph, &default_resource_creator)
    }

    pub fn with_creator(graph: &mut RenderGraph, creator: &RgBufferResourceCreator) -> Self {
        let pending = Self::create_graph_resources(graph, creator);

        let mut reflection = Self {
            selectors: IndexMap::new(),
            connections: vec![],
            dummy: RgBufferData::dummy(),
        };
        reflection.create_graph_connections(graph, pending);
        reflection
    }

    fn create_graph_resources(graph: &RenderGraph, creator: &RgBufferResourceCreator) -> Vec<PendingBufferObject> {
        let mut pending = vec![];
        for (handle, operation) in graph.operations() {
            for module in operation.shader_modules() {
                for object in module.reflection().buffer_objects() {
                    if graph.connections().is_connected(handle, &object.name, module.kind()) {
                        continue;
                    }
                    let mut is_output = false;
                    let resource = creator(operation, module, object, &mut is_output);
                    pending.push(PendingBufferObject {
                        operation: handle,
                        operation_id: operation.uuid(),
                        name: format!("{}-{}-{}", operation.name(), module.kind(), object.name),
                        kind: module.kind(),
                        object: object.clone(),
                        resource,
                        is_output,
                    });
                }
            }
        }
        pending
    }

    fn create_graph_connections(&mut self, graph: &mut RenderGraph, pending: Vec<PendingBufferObject>) {
        for p in pending {
            let resource = graph.add_resource(p.name, p.resource);
            if p.is_output {
                graph.connect_output_descriptor(p.operation, resource, p.object.name.clone(), p.kind);
            } else {
                graph.connect_descriptor(p.operation, resource, p.object.name.clone(), p.kind);
            }

            self.selectors
                .entry(p.operation_id)
                .or_default()
                .selectors
                .entry(p.kind)
                .or_default()
                .datas
                .insert(p.object.name.clone(), RgBufferData::new(p.object.clone()));
            self.connections.push(RgBufferObjectConnection {
                operation: p.operation_id,
                object: p.object,
                resource,
                kind: p.kind,
                is_output: p.is_output,
            });
        }
    }
}

// getters
impl UniformReflection {
    #[inline]
    pub fn connections(&self) -> &[RgBufferObjectConnection] {
        &self.connections
    }

    pub fn selector(&self, operation: RgOperationId) -> Option<&RgShaderKindSelector> {
        self.selectors.get(&operation)
    }

    pub fn contains(&self, operation: RgOperationId, kind: ShaderKind, name: &str) -> bool {
        self.selectors.get(&operation).and_then(|s| s.get(kind)).is_some_and(|s| s.contains(name))
    }

    /// 查找失败时按照断言策略报告，并返回一个丢弃所有写入的数据
    pub fn buffer_data(&mut self, operation: RgOperationId, kind: ShaderKind, name: &str) -> &mut RgBufferData {
        let found = self.contains(operation, kind, name);
        if !vkrg_crate_tools::rg_verify!(found, "no buffer object {} in {} shader of operation {}", name, kind, operation)
        {
            self.dummy = RgBufferData::dummy();
            return &mut self.dummy;
        }
        match self.selectors.get_mut(&operation).and_then(|s| s.get_mut(kind)).and_then(|s| s.get_mut(name)) {
            Some(data) => data,
            None => &mut self.dummy,
        }
    }
}

// update
impl UniformReflection {
    /// 把所有暂存的数据写入 resource index 对应的 buffer，可写的 buffer object 除外
    pub fn flush(&self, graph: &RenderGraph, resource_index: u32) {
        let _span = vkrg_crate_tools::profile_span!("UniformReflection::flush");
        for connection in self.connections.iter().filter(|c| !c.is_output) {
            let data = self
                .selectors
                .get(&connection.operation)
                .and_then(|s| s.get(connection.kind))
                .and_then(|s| s.get(&connection.object.name));
            let Some(data) = data else {
                vkrg_crate_tools::rg_break!("buffer object {} has no staged data", connection.object.name);
                continue;
            };

            match graph.resource(connection.resource) {
                Some(RgResource::CpuBuffer(buffer)) => {
                    if let Some(mapping) = buffer.mapping(resource_index) {
                        mapping.write(0, data.bytes());
                    }
                }
                Some(RgResource::GpuBuffer(buffer)) => buffer.transfer_from_cpu_to_gpu(resource_index, data.bytes()),
                other => {
                    vkrg_crate_tools::rg_break!(
                        "buffer object {} is backed by {:?}",
                        connection.object.name,
                        other.map(|r| r.variant_name())
                    );
                }
            }
        }
    }

    pub fn print_debug_info(&self) {
        log::info!("uniform reflection: {} buffer objects", self.connections.len());
        for (operation, kind_selector) in &self.selectors {
            log::info!("operation {}", operation);
            for (kind, selector) in &kind_selector.selectors {
                for (name, data) in &selector.datas {
                    log::info!("    [{}] {} ({} bytes)", kind, name, data.size());
                }
            }
        }
        for connection in &self.connections {
            log::info!(
                "connection: operation {} [{}] {} -> {:?}{}",
                connection.operation,
                connection.kind,
                connection.object.name,
                connection.resource,
                if connection.is_output { " (output)" } else { "" }
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ash::vk;
    use vkrg_gfx::backend::headless::GfxHeadlessCall;

    use super::*;
    use crate::{
        graph::RgPipelineOperation,
        resource::RgReadOnlyImageResource,
        shader_pipeline::ShaderPipeline,
        test_utils::{RecordingFrontend, graph_settings, headless_device, textured_fragment_module},
    };

    /// 带有 textured fragment shader 的 graph，sampler 已经连接
    fn textured_graph() -> (RenderGraph, RgOperationHandle, RgOperationId) {
        let mut pipeline = ShaderPipeline::new(Arc::new(RecordingFrontend::default()));
        pipeline.set_shader_module(textured_fragment_module());
        let operation = RgPipelineOperation::new("textured", pipeline);
        let id = operation.uuid();

        let mut graph = RenderGraph::new();
        let op = graph.add_operation(operation);
        let albedo = graph.add_resource(
            "albedo",
            RgReadOnlyImageResource::new_2d(vk::Format::R8G8B8A8_UNORM, vk::Filter::LINEAR, 1, 1),
        );
        graph.connect_descriptor(op, albedo, "albedo", ShaderKind::Fragment);
        (graph, op, id)
    }

    fn stage_globals(uniforms: &mut UniformReflection, id: RgOperationId) -> Vec<u8> {
        let globals = uniforms.buffer_data(id, ShaderKind::Fragment, "Globals");
        globals.field("color").set(&glam::Vec4::new(0.1, 0.2, 0.3, 0.4));
        globals.field("time").set(&7.5f32);
        globals.bytes().to_vec()
    }

    #[test]
    fn test_flush_writes_cpu_buffer_at_reflected_offsets() {
        let (headless, device) = headless_device();
        let (mut graph, op, id) = textured_graph();
        let mut uniforms = UniformReflection::new(&mut graph);
        assert_eq!(uniforms.connections().len(), 1);
        assert!(uniforms.contains(id, ShaderKind::Fragment, "Globals"));
        assert!(graph.connections().is_connected(op, "Globals", ShaderKind::Fragment));
        let resource = graph.find_resource("textured-Fragment-Globals").unwrap();

        graph.compile(graph_settings(&device, 2));
        let staged = stage_globals(&mut uniforms, id);
        uniforms.flush(&graph, 1);

        let mut expected = vec![0u8; 20];
        expected[0..16].copy_from_slice(bytemuck::cast_slice(&[0.1f32, 0.2, 0.3, 0.4]));
        expected[16..20].copy_from_slice(&7.5f32.to_ne_bytes());
        assert_eq!(staged, expected);

        let buffer = graph.resource(resource).and_then(|r| r.as_cpu_buffer()).unwrap();
        assert_eq!(buffer.mapping(1).unwrap().read(0, 20), expected);
        // 只写入指定的 resource index
        assert_eq!(buffer.mapping(0).unwrap().read(0, 20), vec![0u8; 20]);

        // descriptor 指向自动创建的 buffer
        let handle = graph.resource(resource).and_then(|r| r.as_buffer()).unwrap().buffer(1);
        assert!(headless.calls().iter().any(|c| match c {
            GfxHeadlessCall::UpdateDescriptorSets(writes) =>
                writes.iter().any(|w| w.buffer_infos.iter().any(|i| i.buffer == handle)),
            _ => false,
        }));
    }

    #[test]
    fn test_flush_transfers_gpu_buffer() {
        let (headless, device) = headless_device();
        let (mut graph, _, id) = textured_graph();
        let mut uniforms = UniformReflection::with_creator(&mut graph, &gpu_buffer_resource_creator);
        graph.compile(graph_settings(&device, 2));

        let staged = stage_globals(&mut uniforms, id);
        uniforms.flush(&graph, 0);

        let resource = uniforms.connections()[0].resource;
        let buffer = graph.resource(resource).and_then(|r| r.as_gpu_buffer()).unwrap();
        assert_eq!(buffer.transfer_from_gpu_to_cpu(0), staged);
        assert!(headless.violations().is_empty());
    }

    #[test]
    fn test_explicit_connection_is_not_duplicated() {
        let (mut graph, op, _) = textured_graph();
        let manual = graph.add_resource("manual-globals", RgCpuBufferResource::new(20));
        graph.connect_descriptor(op, manual, "Globals", ShaderKind::Fragment);

        let uniforms = UniformReflection::new(&mut graph);
        assert!(uniforms.connections().is_empty());
        assert!(graph.find_resource("textured-Fragment-Globals").is_none());
    }

    #[test]
    fn test_output_buffer_objects_are_not_flushed() {
        let (_headless, device) = headless_device();
        let (mut graph, op, id) = textured_graph();
        let creator = |_: &dyn RgOperation, _: &ShaderModule, object: &Arc<ReflBufferObject>, output: &mut bool| {
            *output = true;
            RgResource::from(RgCpuBufferResource::new(object.full_size as u64))
        };
        let mut uniforms = UniformReflection::with_creator(&mut graph, &creator);
        assert!(uniforms.connections()[0].is_output);
        assert_eq!(graph.connections().writes(op).len(), 1);

        graph.compile(graph_settings(&device, 1));
        stage_globals(&mut uniforms, id);
        uniforms.flush(&graph, 0);
        uniforms.print_debug_info();

        let resource = uniforms.connections()[0].resource;
        let buffer = graph.resource(resource).and_then(|r| r.as_cpu_buffer()).unwrap();
        assert_eq!(buffer.mapping(0).unwrap().read(0, 20), vec![0u8; 20]);
    }

    #[test]
    #[should_panic(expected = "Verify Failed")]
    fn test_unknown_buffer_object_is_reported() {
        let (mut graph, _, id) = textured_graph();
        let mut uniforms = UniformReflection::new(&mut graph);
        uniforms.buffer_data(id, ShaderKind::Vertex, "Globals");
    }
}
