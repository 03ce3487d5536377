//! 按阶段组织的 shader 模块
//!
//! [`ShaderPipeline`] 每个阶段最多一个模块；[`ComputeShaderPipeline`] 只有一个 compute 模块。
//! descriptor set layout 由所有模块的反射数据拼接而成。
//!
//! `compile` 根据 graph 推导出的 attachment 信息创建 render pass、pipeline layout 以及 pipeline。

use std::{path::Path, rc::Rc, sync::Arc};

use ash::vk;
use itertools::Itertools;
use rayon::prelude::*;
use vkrg_gfx::{
    descriptors::descriptor_pool::GfxDescriptorSetLayout,
    device::{GfxDeviceRef, GfxGraphicsPipelineDesc, GfxRenderPassDesc},
    pipelines::{
        pipeline::{GfxPipeline, GfxPipelineLayout},
        render_pass::GfxRenderPass,
        shader_module::GfxShaderStage,
    },
};
use vkrg_shader::{
    error::ShaderCompileError,
    frontend::ShaderFrontend,
    reflection::ShaderModuleReflection,
    shader_kind::{SHADER_KIND_COUNT, ShaderKind},
    shader_module::ShaderModule,
};

use crate::binder::{get_layout, get_vertex_attributes, get_vertex_bindings};

/// 遍历模块的顺序
const ITERATE_ORDER: [ShaderKind; SHADER_KIND_COUNT] = [
    ShaderKind::Vertex,
    ShaderKind::Fragment,
    ShaderKind::Geometry,
    ShaderKind::TessellationEvaluation,
    ShaderKind::TessellationControl,
    ShaderKind::Compute,
];

/// 拼接多个模块的 binding，同一个 binding 出现在多个阶段时合并 stage flags
pub(crate) fn merge_layout_bindings<'a>(
    modules: impl Iterator<Item = &'a ShaderModule>,
) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
    let mut bindings: Vec<vk::DescriptorSetLayoutBinding<'static>> = vec![];
    for module in modules {
        for binding in get_layout(module.reflection(), module.kind()) {
            match bindings.iter_mut().find(|b| b.binding == binding.binding) {
                Some(existing) => {
                    vkrg_crate_tools::rg_assert!(
                        existing.descriptor_type == binding.descriptor_type,
                        "binding {} is {:?} in one stage and {:?} in {}",
                        binding.binding,
                        existing.descriptor_type,
                        binding.descriptor_type,
                        module.kind()
                    );
                    existing.stage_flags |= binding.stage_flags;
                    existing.descriptor_count = existing.descriptor_count.max(binding.descriptor_count);
                }
                None => bindings.push(binding),
            }
        }
    }
    bindings
}

fn create_layout(
    device: GfxDeviceRef,
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
    name: &str,
) -> GfxDescriptorSetLayout {
    GfxDescriptorSetLayout::new(device, bindings, name)
}

fn create_stage(device: GfxDeviceRef, module: &ShaderModule, name: &str) -> GfxShaderStage {
    GfxShaderStage::new(
        device,
        module.kind().stage_flags(),
        module.binary(),
        module.entry_point(),
        &format!("{}-{}", name, module.kind()),
    )
}

/// 编译图形管线需要的信息，attachment 相关的字段由 graph 从 fragment shader 推导
#[derive(Clone, Debug)]
pub struct RgGraphicsPipelineSettings {
    pub extent: vk::Extent2D,
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    pub attachment_descriptions: Vec<vk::AttachmentDescription>,
    pub attachment_references: Vec<vk::AttachmentReference>,
    pub input_attachment_references: Vec<vk::AttachmentReference>,
    pub topology: vk::PrimitiveTopology,
    /// 没有指定时开启混合
    pub blend_enabled: Option<bool>,
}

/// 图形管线的编译结果
pub struct RgGraphicsPipelineObjects {
    render_pass: GfxRenderPass,
    pipeline: GfxPipeline,
}

impl RgGraphicsPipelineObjects {
    #[inline]
    pub fn render_pass(&self) -> &GfxRenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn pipeline(&self) -> &GfxPipeline {
        &self.pipeline
    }

    #[inline]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline.layout()
    }
}

pub struct ShaderPipeline {
    frontend: Arc<dyn ShaderFrontend>,
    shaders: [Option<ShaderModule>; SHADER_KIND_COUNT],
    compiled: Option<RgGraphicsPipelineObjects>,
}

// new & init
impl ShaderPipeline {
    pub fn new(frontend: Arc<dyn ShaderFrontend>) -> Self {
        Self {
            frontend,
            shaders: Default::default(),
            compiled: None,
        }
    }

    pub fn from_source_files(
        frontend: Arc<dyn ShaderFrontend>,
        paths: &[impl AsRef<Path> + Sync],
    ) -> Result<Self, ShaderCompileError> {
        let mut pipeline = Self::new(frontend);
        pipeline.set_shaders_from_source_files(paths)?;
        Ok(pipeline)
    }
}

// setters
impl ShaderPipeline {
    /// 放入已经编译好的模块，阶段由模块决定
    pub fn set_shader_module(&mut self, module: ShaderModule) {
        let slot = &mut self.shaders[module.kind().index()];
        vkrg_crate_tools::rg_assert!(slot.is_none(), "{} shader is already set", module.kind());
        *slot = Some(module);
    }

    pub fn set_shader_from_source_string(
        &mut self,
        kind: ShaderKind,
        source: impl Into<String>,
    ) -> Result<(), ShaderCompileError> {
        let module = ShaderModule::from_glsl_string(self.frontend.clone(), kind, source, vec![], vec![])?;
        self.set_shader_module(module);
        Ok(())
    }

    #[inline]
    pub fn set_vertex_shader_from_string(&mut self, source: impl Into<String>) -> Result<(), ShaderCompileError> {
        self.set_shader_from_source_string(ShaderKind::Vertex, source)
    }

    #[inline]
    pub fn set_fragment_shader_from_string(&mut self, source: impl Into<String>) -> Result<(), ShaderCompileError> {
        self.set_shader_from_source_string(ShaderKind::Fragment, source)
    }

    /// 阶段由扩展名决定，该阶段不能已经有模块
    pub fn set_shader_from_source_file(&mut self, path: impl AsRef<Path>) -> Result<(), ShaderCompileError> {
        let path = path.as_ref();
        if let Some(kind) = path.extension().and_then(|e| e.to_str()).and_then(ShaderKind::from_extension) {
            vkrg_crate_tools::rg_assert!(self.shaders[kind.index()].is_none(), "{} shader is already set", kind);
        }
        let module = ShaderModule::from_glsl_file(self.frontend.clone(), path, vec![], vec![])?;
        self.set_shader_module(module);
        Ok(())
    }

    /// 每个文件一个任务并行编译，全部成功后才放入
    pub fn set_shaders_from_source_files(&mut self, paths: &[impl AsRef<Path> + Sync]) -> Result<(), ShaderCompileError> {
        let _span = vkrg_crate_tools::profile_span!("ShaderPipeline::set_shaders_from_source_files");
        let modules = paths
            .par_iter()
            .map(|path| ShaderModule::from_glsl_file(self.frontend.clone(), path, vec![], vec![]))
            .collect::<Result<Vec<_>, _>>()?;
        for module in modules {
            self.set_shader_module(module);
        }
        Ok(())
    }
}

// update
impl ShaderPipeline {
    /// 并行重新加载所有模块
    ///
    /// 失败的模块保留之前的结果，返回第一个错误
    pub fn reload(&mut self) -> Result<(), ShaderCompileError> {
        let _span = vkrg_crate_tools::profile_span!("ShaderPipeline::reload");
        let results = self
            .shaders
            .par_iter_mut()
            .filter_map(|slot| slot.as_mut())
            .map(|module| module.reload())
            .collect::<Vec<_>>();
        results.into_iter().collect()
    }

    /// 创建 render pass、pipeline layout 以及图形管线，之前的编译结果会先被释放
    ///
    /// 顶点输入由 vertex shader 的反射数据推导，所有输入都按 vertex 读取
    pub fn compile(&mut self, device: GfxDeviceRef, settings: &RgGraphicsPipelineSettings, name: &str) {
        let _span = vkrg_crate_tools::profile_span!("ShaderPipeline::compile");
        self.compiled = None;

        let Some(vertex) = self.reflection(ShaderKind::Vertex) else {
            vkrg_crate_tools::rg_assert!(false, "graphics pipeline [{}] has no vertex shader", name);
            return;
        };
        let not_instanced = |_: &str| false;
        let vertex_bindings = get_vertex_bindings(vertex, &not_instanced);
        let vertex_attributes = get_vertex_attributes(vertex);

        let render_pass = GfxRenderPass::new(
            device.clone(),
            GfxRenderPassDesc {
                attachments: settings.attachment_descriptions.clone(),
                color_references: settings.attachment_references.clone(),
                input_references: settings.input_attachment_references.clone(),
            },
            &format!("{}-pass", name),
        );
        let layout = Rc::new(GfxPipelineLayout::new(
            device.clone(),
            &[settings.descriptor_set_layout],
            &format!("{}-pipeline-layout", name),
        ));

        // shader module 在 pipeline 创建之后即可销毁
        let stages = self.shader_stages(device.clone(), name);
        let desc = GfxGraphicsPipelineDesc {
            layout: vk::PipelineLayout::null(),
            render_pass: render_pass.handle(),
            stages: stages.iter().map(|s| s.desc()).collect_vec(),
            vertex_bindings,
            vertex_attributes,
            topology: settings.topology,
            extent: settings.extent,
            color_attachment_count: render_pass.color_attachment_count(),
            blend_enabled: settings.blend_enabled.unwrap_or(true),
        };
        let pipeline = GfxPipeline::new_graphics(device, desc, layout, &format!("{}-pipeline", name));
        log::debug!(
            "compiled graphics pipeline [{}]: {} stages, {} attachments",
            name,
            stages.len(),
            settings.attachment_descriptions.len()
        );

        self.compiled = Some(RgGraphicsPipelineObjects { render_pass, pipeline });
    }
}

// getters
impl ShaderPipeline {
    #[inline]
    pub fn shader(&self, kind: ShaderKind) -> Option<&ShaderModule> {
        self.shaders[kind.index()].as_ref()
    }

    #[inline]
    pub fn reflection(&self, kind: ShaderKind) -> Option<&ShaderModuleReflection> {
        self.shader(kind).map(|m| m.reflection())
    }

    /// vertex、fragment、geometry、tessellation evaluation、tessellation control、compute
    pub fn iterate_shaders(&self, mut f: impl FnMut(&ShaderModule)) {
        ITERATE_ORDER.iter().filter_map(|kind| self.shader(*kind)).for_each(|m| f(m));
    }

    pub fn modules(&self) -> Vec<&ShaderModule> {
        ITERATE_ORDER.iter().filter_map(|kind| self.shader(*kind)).collect_vec()
    }

    /// 每个模块一个阶段，顺序与 [`ShaderPipeline::iterate_shaders`] 相同
    pub fn shader_stages(&self, device: GfxDeviceRef, name: &str) -> Vec<GfxShaderStage> {
        self.modules().into_iter().map(|m| create_stage(device.clone(), m, name)).collect_vec()
    }

    #[inline]
    pub fn compiled(&self) -> Option<&RgGraphicsPipelineObjects> {
        self.compiled.as_ref()
    }

    pub fn descriptor_set_layout_bindings(&self) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        merge_layout_bindings(self.modules().into_iter())
    }

    pub fn create_descriptor_set_layout(&self, device: GfxDeviceRef, name: &str) -> GfxDescriptorSetLayout {
        create_layout(device, self.descriptor_set_layout_bindings(), name)
    }
}

/// 只有一个 compute shader 的 pipeline
pub struct ComputeShaderPipeline {
    frontend: Arc<dyn ShaderFrontend>,
    shader: Option<ShaderModule>,
    compiled: Option<GfxPipeline>,
}

// new & init
impl ComputeShaderPipeline {
    pub fn new(frontend: Arc<dyn ShaderFrontend>) -> Self {
        Self {
            frontend,
            shader: None,
            compiled: None,
        }
    }

    pub fn from_source_string(frontend: Arc<dyn ShaderFrontend>, source: impl Into<String>) -> Result<Self, ShaderCompileError> {
        let mut pipeline = Self::new(frontend);
        pipeline.set_shader_from_source_string(source)?;
        Ok(pipeline)
    }
}

// setters
impl ComputeShaderPipeline {
    pub fn set_shader_module(&mut self, module: ShaderModule) {
        vkrg_crate_tools::rg_assert!(module.kind() == ShaderKind::Compute, "{} shader in compute pipeline", module.kind());
        vkrg_crate_tools::rg_assert!(self.shader.is_none(), "compute shader is already set");
        self.shader = Some(module);
    }

    pub fn set_shader_from_source_string(&mut self, source: impl Into<String>) -> Result<(), ShaderCompileError> {
        let module = ShaderModule::from_glsl_string(self.frontend.clone(), ShaderKind::Compute, source, vec![], vec![])?;
        self.set_shader_module(module);
        Ok(())
    }

    pub fn set_shader_from_source_file(&mut self, path: impl AsRef<Path>) -> Result<(), ShaderCompileError> {
        let module = ShaderModule::from_glsl_file(self.frontend.clone(), path, vec![], vec![])?;
        self.set_shader_module(module);
        Ok(())
    }
}

// update
impl ComputeShaderPipeline {
    pub fn reload(&mut self) -> Result<(), ShaderCompileError> {
        match self.shader.as_mut() {
            Some(module) => module.reload(),
            None => Ok(()),
        }
    }

    /// 创建 pipeline layout 以及计算管线，之前的编译结果会先被释放
    pub fn compile(&mut self, device: GfxDeviceRef, descriptor_set_layout: vk::DescriptorSetLayout, name: &str) {
        let _span = vkrg_crate_tools::profile_span!("ComputeShaderPipeline::compile");
        self.compiled = None;

        let Some(stage) = self.shader_stages(device.clone(), name).pop() else {
            vkrg_crate_tools::rg_assert!(false, "compute pipeline [{}] has no compute shader", name);
            return;
        };
        let layout = Rc::new(GfxPipelineLayout::new(
            device.clone(),
            &[descriptor_set_layout],
            &format!("{}-pipeline-layout", name),
        ));
        self.compiled = Some(GfxPipeline::new_compute(device, &stage.desc(), layout, &format!("{}-pipeline", name)));
    }
}

// getters
impl ComputeShaderPipeline {
    #[inline]
    pub fn shader(&self) -> Option<&ShaderModule> {
        self.shader.as_ref()
    }

    #[inline]
    pub fn reflection(&self) -> Option<&ShaderModuleReflection> {
        self.shader.as_ref().map(|m| m.reflection())
    }

    pub fn iterate_shaders(&self, mut f: impl FnMut(&ShaderModule)) {
        if let Some(module) = self.shader.as_ref() {
            f(module);
        }
    }

    pub fn shader_stages(&self, device: GfxDeviceRef, name: &str) -> Vec<GfxShaderStage> {
        self.shader.iter().map(|m| create_stage(device.clone(), m, name)).collect_vec()
    }

    #[inline]
    pub fn compiled(&self) -> Option<&GfxPipeline> {
        self.compiled.as_ref()
    }

    pub fn descriptor_set_layout_bindings(&self) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        merge_layout_bindings(self.shader.iter())
    }

    pub fn create_descriptor_set_layout(&self, device: GfxDeviceRef, name: &str) -> GfxDescriptorSetLayout {
        create_layout(device, self.descriptor_set_layout_bindings(), name)
    }
}

#[cfg(test)]
mod tests {
    use vkrg_gfx::backend::headless::GfxHeadlessObjectType;
    use vkrg_shader::reflection::{ReflBaseType, ReflFieldType, ReflInput};

    use super::*;
    use crate::test_utils::{RecordingFrontend, globals_ubo, headless_device, textured_fragment_module, write_temp_shader};

    fn vertex_module() -> ShaderModule {
        let mut reflection = ShaderModuleReflection::default();
        reflection.ubos.push(globals_ubo(1));
        ShaderModule::from_parts(ShaderKind::Vertex, reflection)
    }

    /// `layout(location = 0) in vec3 position; layout(location = 1) in vec2 uv;`
    fn vertex_input_module() -> ShaderModule {
        let input = |name: &str, location: u32, components: u32| ReflInput {
            name: name.to_string(),
            location,
            ty: ReflFieldType::vec(ReflBaseType::Float, components),
            array_size: 1,
        };
        let reflection = ShaderModuleReflection {
            inputs: vec![input("position", 0, 3), input("uv", 1, 2)],
            ..Default::default()
        };
        ShaderModule::from_parts(ShaderKind::Vertex, reflection)
    }

    fn color_attachment() -> (vk::AttachmentDescription, vk::AttachmentReference) {
        let description = vk::AttachmentDescription {
            format: vk::Format::R8G8B8A8_UNORM,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ..Default::default()
        };
        let reference = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        (description, reference)
    }

    fn graphics_settings(layout: vk::DescriptorSetLayout) -> RgGraphicsPipelineSettings {
        let (description, reference) = color_attachment();
        RgGraphicsPipelineSettings {
            extent: vk::Extent2D { width: 16, height: 8 },
            descriptor_set_layout: layout,
            attachment_descriptions: vec![description],
            attachment_references: vec![reference],
            input_attachment_references: vec![],
            topology: vk::PrimitiveTopology::TRIANGLE_STRIP,
            blend_enabled: None,
        }
    }

    #[test]
    fn test_iterate_order_and_merged_bindings() {
        let mut pipeline = ShaderPipeline::new(Arc::new(RecordingFrontend::default()));
        pipeline.set_shader_module(textured_fragment_module());
        pipeline.set_shader_module(vertex_module());

        let mut kinds = vec![];
        pipeline.iterate_shaders(|m| kinds.push(m.kind()));
        assert_eq!(kinds, vec![ShaderKind::Vertex, ShaderKind::Fragment]);

        let bindings = pipeline.descriptor_set_layout_bindings();
        assert_eq!(
            bindings.iter().map(|b| (b.binding, b.descriptor_type, b.stage_flags)).collect::<Vec<_>>(),
            vec![
                (
                    1,
                    vk::DescriptorType::UNIFORM_BUFFER,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
                ),
                (0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT),
            ]
        );
    }

    #[test]
    fn test_create_descriptor_set_layout() {
        let (headless, device) = headless_device();
        let mut pipeline = ShaderPipeline::new(Arc::new(RecordingFrontend::default()));
        pipeline.set_shader_module(textured_fragment_module());
        let layout = pipeline.create_descriptor_set_layout(device, "textured");
        assert_eq!(layout.bindings().len(), 2);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::DescriptorSetLayout), 1);
    }

    #[test]
    fn test_set_shaders_from_source_files_in_parallel() {
        let frontend = Arc::new(RecordingFrontend::default());
        let paths = [
            write_temp_shader("pipeline", "quad.vert", "#version 450\nvoid main() {}\n"),
            write_temp_shader("pipeline", "quad.frag", "#version 450\nvoid main() {}\n"),
        ];
        let mut pipeline = ShaderPipeline::from_source_files(frontend.clone(), &paths).unwrap();
        assert!(pipeline.shader(ShaderKind::Vertex).is_some());
        assert!(pipeline.shader(ShaderKind::Fragment).is_some());
        assert_eq!(frontend.compiled.lock().unwrap().len(), 2);

        pipeline.reload().unwrap();
        assert_eq!(frontend.compiled.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_compile_error_keeps_pipeline_empty() {
        let frontend = Arc::new(RecordingFrontend {
            fail: true,
            ..Default::default()
        });
        let mut pipeline = ShaderPipeline::new(frontend);
        let result = pipeline.set_fragment_shader_from_string("void main() {");
        assert!(matches!(result, Err(ShaderCompileError::Diagnostic { .. })));
        assert!(pipeline.shader(ShaderKind::Fragment).is_none());
    }

    #[test]
    #[should_panic(expected = "Assertion Failed")]
    fn test_set_shader_file_twice_is_reported() {
        let mut pipeline = ShaderPipeline::new(Arc::new(RecordingFrontend::default()));
        pipeline.set_shader_module(textured_fragment_module());
        let _ = pipeline.set_shader_from_source_file("other.frag");
    }

    #[test]
    fn test_compute_pipeline_from_string() {
        let frontend = Arc::new(RecordingFrontend::default());
        let mut pipeline = ComputeShaderPipeline::from_source_string(frontend, "void main() {}").unwrap();
        assert_eq!(pipeline.shader().map(|m| m.kind()), Some(ShaderKind::Compute));
        assert!(pipeline.descriptor_set_layout_bindings().is_empty());
        pipeline.reload().unwrap();
    }

    #[test]
    fn test_shader_stages_follow_iterate_order() {
        let (headless, device) = headless_device();
        let mut pipeline = ShaderPipeline::new(Arc::new(RecordingFrontend::default()));
        pipeline.set_shader_module(textured_fragment_module());
        pipeline.set_shader_module(vertex_input_module());

        let stages = pipeline.shader_stages(device, "quad");
        assert_eq!(
            stages.iter().map(|s| s.desc().stage).collect_vec(),
            vec![vk::ShaderStageFlags::VERTEX, vk::ShaderStageFlags::FRAGMENT]
        );
        assert!(stages.iter().all(|s| s.desc().entry_point == "main"));
        assert_eq!(headless.live_count(GfxHeadlessObjectType::ShaderModule), 2);
        drop(stages);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::ShaderModule), 0);
    }

    #[test]
    fn test_compile_graphics_pipeline() {
        let (headless, device) = headless_device();
        let mut pipeline = ShaderPipeline::new(Arc::new(RecordingFrontend::default()));
        pipeline.set_shader_module(textured_fragment_module());
        pipeline.set_shader_module(vertex_input_module());
        let layout = pipeline.create_descriptor_set_layout(device.clone(), "quad");

        pipeline.compile(device.clone(), &graphics_settings(layout.handle()), "quad");

        let objects = pipeline.compiled().unwrap();
        let pass = headless.render_pass_desc(objects.render_pass().handle()).unwrap();
        assert_eq!(pass.attachments.len(), 1);
        assert_eq!(pass.color_references.len(), 1);
        assert_eq!(objects.render_pass().color_attachment_count(), 1);

        let desc = headless.graphics_pipeline_desc(objects.pipeline().handle()).unwrap();
        assert_eq!(desc.layout, objects.pipeline_layout());
        assert_eq!(desc.render_pass, objects.render_pass().handle());
        assert_eq!(
            desc.stages.iter().map(|s| s.stage).collect_vec(),
            vec![vk::ShaderStageFlags::VERTEX, vk::ShaderStageFlags::FRAGMENT]
        );
        assert_eq!(
            desc.vertex_bindings.iter().map(|b| (b.binding, b.stride, b.input_rate)).collect_vec(),
            vec![(0, 12, vk::VertexInputRate::VERTEX), (1, 8, vk::VertexInputRate::VERTEX)]
        );
        assert_eq!(desc.vertex_attributes.len(), 2);
        assert_eq!(desc.topology, vk::PrimitiveTopology::TRIANGLE_STRIP);
        assert_eq!(desc.extent, vk::Extent2D { width: 16, height: 8 });
        assert_eq!(desc.color_attachment_count, 1);
        assert!(desc.blend_enabled);
        assert_eq!(objects.pipeline().bind_point(), vk::PipelineBindPoint::GRAPHICS);

        // shader module 只在创建 pipeline 期间存在
        assert_eq!(headless.live_count(GfxHeadlessObjectType::ShaderModule), 0);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::Pipeline), 1);

        // 重新编译先释放之前的对象
        pipeline.compile(device, &graphics_settings(layout.handle()), "quad");
        assert_eq!(headless.live_count(GfxHeadlessObjectType::RenderPass), 1);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::PipelineLayout), 1);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::Pipeline), 1);
        drop(pipeline);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::RenderPass), 0);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::PipelineLayout), 0);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::Pipeline), 0);
        assert!(headless.violations().is_empty());
    }

    #[test]
    #[should_panic(expected = "Assertion Failed")]
    fn test_compile_without_vertex_shader_is_reported() {
        let (_headless, device) = headless_device();
        let mut pipeline = ShaderPipeline::new(Arc::new(RecordingFrontend::default()));
        pipeline.set_shader_module(textured_fragment_module());
        pipeline.compile(device, &graphics_settings(vk::DescriptorSetLayout::null()), "fragment-only");
    }

    #[test]
    fn test_compile_compute_pipeline() {
        let (headless, device) = headless_device();
        let frontend = Arc::new(RecordingFrontend::default());
        let mut pipeline = ComputeShaderPipeline::from_source_string(frontend, "void main() {}").unwrap();
        let layout = pipeline.create_descriptor_set_layout(device.clone(), "blur");

        pipeline.compile(device, layout.handle(), "blur");

        let compiled = pipeline.compiled().unwrap();
        assert_eq!(compiled.bind_point(), vk::PipelineBindPoint::COMPUTE);
        let stage = headless.compute_pipeline_stage(compiled.handle()).unwrap();
        assert_eq!(stage.stage, vk::ShaderStageFlags::COMPUTE);
        assert_eq!(stage.entry_point, "main");
        assert_eq!(headless.live_count(GfxHeadlessObjectType::ShaderModule), 0);
        assert_eq!(headless.live_count(GfxHeadlessObjectType::PipelineLayout), 1);
    }
}
