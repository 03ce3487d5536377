use ash::vk;
use vkrg_shader::reflection::ReflSampler;

use crate::{graph::RenderGraph, ids::RgResourceHandle, resource::RgReadOnlyImageResource};

/// 为 sampler 提供图像的尺寸、格式与过滤方式，返回 None 时使用默认值
pub type RgImageExtentProvider = dyn Fn(&ReflSampler) -> Option<(vk::Extent3D, vk::Format, vk::Filter)>;

/// sampler 与自动创建的只读图像
#[derive(Debug, Default)]
pub struct RgImageMap {
    images: Vec<(ReflSampler, RgResourceHandle)>,
}

impl RgImageMap {
    pub fn find_by_name(&self, name: &str) -> Option<RgResourceHandle> {
        self.images.iter().find(|(sampler, _)| sampler.name == name).map(|(_, handle)| *handle)
    }

    pub fn put(&mut self, sampler: ReflSampler, handle: RgResourceHandle) {
        self.images.push((sampler, handle));
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &(ReflSampler, RgResourceHandle)> {
        self.images.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// 为所有还没有连接的 sampler 创建 1x1 的只读图像
pub fn create_empty_image_resources(graph: &mut RenderGraph) -> RgImageMap {
    create_empty_image_resources_with(graph, &|_| None)
}

pub fn create_empty_image_resources_with(graph: &mut RenderGraph, provider: &RgImageExtentProvider) -> RgImageMap {
    let mut pending = vec![];
    for (handle, operation) in graph.operations() {
        for module in operation.shader_modules() {
            for sampler in &module.reflection().samplers {
                if graph.connections().is_connected(handle, &sampler.name, module.kind()) {
                    continue;
                }
                let name = format!("{}-{}-{}", operation.name(), module.kind(), sampler.name);
                pending.push((handle, module.kind(), sampler.clone(), name));
            }
        }
    }

    let mut map = RgImageMap::default();
    for (operation, kind, sampler, name) in pending {
        let (extent, format, filter) = provider(&sampler).unwrap_or((
            vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            },
            vk::Format::R8G8B8A8_UNORM,
            vk::Filter::LINEAR,
        ));
        let layer_count = sampler.array_size.max(1);
        log::debug!("create empty image {} ({}x{}x{}, {} layers)", name, extent.width, extent.height, extent.depth, layer_count);

        let image = RgReadOnlyImageResource::new(format, filter, extent.width, extent.height, extent.depth, layer_count);
        let resource = graph.add_resource(name, image);
        graph.connect_descriptor(operation, resource, sampler.name.clone(), kind);
        map.put(sampler, resource);
    }
    map
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vkrg_gfx::backend::headless::GfxHeadlessCall;
    use vkrg_shader::shader_kind::ShaderKind;

    use super::*;
    use crate::{
        graph::RgPipelineOperation,
        shader_pipeline::ShaderPipeline,
        test_utils::{RecordingFrontend, graph_settings, headless_device, textured_fragment_module},
        uniform::UniformReflection,
    };

    fn textured_graph() -> (RenderGraph, crate::ids::RgOperationHandle) {
        let mut pipeline = ShaderPipeline::new(Arc::new(RecordingFrontend::default()));
        pipeline.set_shader_module(textured_fragment_module());
        let mut graph = RenderGraph::new();
        let op = graph.add_operation(RgPipelineOperation::new("textured", pipeline));
        (graph, op)
    }

    #[test]
    fn test_default_images_satisfy_every_descriptor() {
        let (headless, device) = headless_device();
        let (mut graph, op) = textured_graph();
        let images = create_empty_image_resources(&mut graph);
        let _uniforms = UniformReflection::new(&mut graph);

        assert_eq!(images.len(), 1);
        let albedo = images.find_by_name("albedo").unwrap();
        assert_eq!(graph.find_resource("textured-Fragment-albedo"), Some(albedo));
        assert!(graph.connections().is_connected(op, "albedo", ShaderKind::Fragment));
        assert!(images.find_by_name("missing").is_none());

        let image = graph.resource(albedo).and_then(|r| r.as_read_only_image()).unwrap();
        assert_eq!(image.extent().width, 1);
        assert_eq!(image.filter(), vk::Filter::LINEAR);

        graph.compile(graph_settings(&device, 2));
        // 两个 binding，每个 resource index 一次
        let writes: usize = headless
            .calls()
            .iter()
            .map(|c| match c {
                GfxHeadlessCall::UpdateDescriptorSets(writes) => writes.len(),
                _ => 0,
            })
            .sum();
        assert_eq!(writes, 4);
    }

    #[test]
    fn test_provider_overrides_extent_and_format() {
        let (mut graph, _) = textured_graph();
        let provider = |sampler: &ReflSampler| {
            (sampler.name == "albedo").then_some((
                vk::Extent3D {
                    width: 4,
                    height: 2,
                    depth: 1,
                },
                vk::Format::R32_SFLOAT,
                vk::Filter::NEAREST,
            ))
        };
        let images = create_empty_image_resources_with(&mut graph, &provider);

        let image = graph.resource(images.find_by_name("albedo").unwrap()).unwrap();
        let read_only = image.as_read_only_image().unwrap();
        assert_eq!((read_only.extent().width, read_only.extent().height), (4, 2));
        assert_eq!(read_only.filter(), vk::Filter::NEAREST);
        assert_eq!(image.as_image().unwrap().format(), vk::Format::R32_SFLOAT);
    }

    #[test]
    fn test_connected_samplers_are_skipped() {
        let (mut graph, op) = textured_graph();
        let albedo = graph.add_resource(
            "albedo",
            RgReadOnlyImageResource::new_2d(vk::Format::R8G8B8A8_SRGB, vk::Filter::LINEAR, 8, 8),
        );
        graph.connect_descriptor(op, albedo, "albedo", ShaderKind::Fragment);

        let images = create_empty_image_resources(&mut graph);
        assert!(images.is_empty());
        assert_eq!(graph.resources().count(), 1);
    }
}
