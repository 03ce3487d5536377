use ash::vk;
use itertools::Itertools;
use vkrg_gfx::{commands::command_buffer::GfxCommandBuffer, pipelines::render_pass::GfxFramebuffer};
use vkrg_shader::{shader_kind::ShaderKind, shader_module::ShaderModule};

use crate::{
    drawable::RgDrawable,
    ids::RgOperationId,
    settings::RgGraphSettings,
    shader_pipeline::{ComputeShaderPipeline, RgGraphicsPipelineSettings, ShaderPipeline},
};

/// graph 编译 operation 时提供的信息
///
/// attachment 相关的字段从 fragment shader 推导，没有 fragment shader 时为空
pub struct RgOperationCompileContext<'a> {
    pub settings: &'a RgGraphSettings,
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    pub attachment_descriptions: Vec<vk::AttachmentDescription>,
    pub attachment_references: Vec<vk::AttachmentReference>,
    pub input_attachment_references: Vec<vk::AttachmentReference>,
    /// 每个 resource index 的 framebuffer image view
    pub framebuffer_views: Vec<Vec<vk::ImageView>>,
}

/// graph 中的节点
///
/// operation 只负责提供 shader 以及录制命令；资源的同步由 graph 在录制前后调用资源的 hook 完成
pub trait RgOperation {
    fn uuid(&self) -> RgOperationId;

    fn name(&self) -> &str;

    /// 按照 vertex、fragment、geometry、tessellation evaluation、tessellation control、compute 的顺序
    fn shader_modules(&self) -> Vec<&ShaderModule>;

    /// 创建 pipeline、render pass 等，graph 每次编译都会调用
    fn compile(&mut self, _ctx: &RgOperationCompileContext) {}

    fn record(&self, cmd: &GfxCommandBuffer, resource_index: u32, descriptor_set: vk::DescriptorSet);
}

pub type RgRecordFn = Box<dyn Fn(&GfxCommandBuffer, u32, vk::DescriptorSet)>;

enum RgOperationShaders {
    Graphics(ShaderPipeline),
    Compute(ComputeShaderPipeline),
}

/// 编译结果的摘要
#[derive(Clone, Debug, Default)]
pub struct RgCompiledOperationInfo {
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    pub attachment_descriptions: Vec<vk::AttachmentDescription>,
    pub attachment_references: Vec<vk::AttachmentReference>,
    pub input_attachment_references: Vec<vk::AttachmentReference>,
    pub framebuffer_views: Vec<Vec<vk::ImageView>>,
}

/// 由 shader pipeline、绘制对象与录制回调组成的 operation
///
/// 有 vertex shader 的图形 operation 在编译时创建 render pass、framebuffer 与图形管线，
/// 录制时开始 render pass、绑定管线与 descriptor set，然后录制回调与绘制对象。
/// 有 compute shader 的 operation 创建计算管线，录制回调之后 dispatch。
/// 其余 operation 只调用录制回调。
pub struct RgPipelineOperation {
    id: RgOperationId,
    name: String,
    /// 每个 resource index 一个，先于 render pass 释放
    framebuffers: Vec<GfxFramebuffer>,
    shaders: RgOperationShaders,
    record_fn: RgRecordFn,
    drawables: Vec<Box<dyn RgDrawable>>,

    extent: Option<vk::Extent2D>,
    topology: vk::PrimitiveTopology,
    blend_enabled: Option<bool>,
    clear_color: [f32; 4],
    dispatch: Option<[u32; 3]>,

    compiled: Option<RgCompiledOperationInfo>,
    compile_count: u32,
}

// new & init
impl RgPipelineOperation {
    pub fn new(name: impl Into<String>, pipeline: ShaderPipeline) -> Self {
        Self::with_shaders(name.into(), RgOperationShaders::Graphics(pipeline))
    }

    pub fn new_compute(name: impl Into<String>, pipeline: ComputeShaderPipeline) -> Self {
        Self::with_shaders(name.into(), RgOperationShaders::Compute(pipeline))
    }

    fn with_shaders(name: String, shaders: RgOperationShaders) -> Self {
        Self {
            id: RgOperationId::new(),
            name,
            framebuffers: vec![],
            shaders,
            record_fn: Box::new(|_, _, _| {}),
            drawables: vec![],
            extent: None,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            blend_enabled: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            dispatch: None,
            compiled: None,
            compile_count: 0,
        }
    }

    pub fn with_record(mut self, record_fn: impl Fn(&GfxCommandBuffer, u32, vk::DescriptorSet) + 'static) -> Self {
        self.record_fn = Box::new(record_fn);
        self
    }

    pub fn with_drawable(mut self, drawable: impl RgDrawable + 'static) -> Self {
        self.drawables.push(Box::new(drawable));
        self
    }

    /// 没有指定时使用交换链的尺寸
    pub fn with_extent(mut self, width: u32, height: u32) -> Self {
        self.extent = Some(vk::Extent2D { width, height });
        self
    }

    pub fn with_topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_blend(mut self, enabled: bool) -> Self {
        self.blend_enabled = Some(enabled);
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_dispatch(mut self, x: u32, y: u32, z: u32) -> Self {
        self.dispatch = Some([x, y, z]);
        self
    }
}

// compile & record
impl RgPipelineOperation {
    fn compile_graphics(&mut self, ctx: &RgOperationCompileContext) {
        self.framebuffers.clear();
        let RgOperationShaders::Graphics(pipeline) = &mut self.shaders else {
            return;
        };
        if pipeline.shader(ShaderKind::Vertex).is_none() {
            log::debug!("operation [{}] has no vertex shader, skip pipeline creation", self.name);
            return;
        }
        let Some(extent) = self.extent.or(ctx.settings.swapchain.as_ref().map(|s| s.extent)) else {
            log::error!("operation [{}] has neither an extent nor a swapchain", self.name);
            return;
        };

        let settings = RgGraphicsPipelineSettings {
            extent,
            descriptor_set_layout: ctx.descriptor_set_layout,
            attachment_descriptions: ctx.attachment_descriptions.clone(),
            attachment_references: ctx.attachment_references.clone(),
            input_attachment_references: ctx.input_attachment_references.clone(),
            topology: self.topology,
            blend_enabled: self.blend_enabled,
        };
        pipeline.compile(ctx.settings.device.clone(), &settings, &self.name);
        let Some(objects) = pipeline.compiled() else {
            return;
        };

        self.framebuffers = (0..ctx.settings.resource_count)
            .map(|ri| {
                let views = ctx.framebuffer_views.get(ri as usize).cloned().unwrap_or_default();
                GfxFramebuffer::new(
                    ctx.settings.device.clone(),
                    objects.render_pass(),
                    views,
                    extent,
                    &format!("{}-{}", self.name, ri),
                )
            })
            .collect_vec();
    }

    fn record_graphics(&self, pipeline: &ShaderPipeline, cmd: &GfxCommandBuffer, resource_index: u32, set: vk::DescriptorSet) {
        let (Some(objects), Some(framebuffer)) = (pipeline.compiled(), self.framebuffers.get(resource_index as usize))
        else {
            (self.record_fn)(cmd, resource_index, set);
            return;
        };

        let clear_values = vec![
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            };
            objects.render_pass().attachment_count()
        ];
        cmd.cmd_begin_render_pass(objects.render_pass().handle(), framebuffer.handle(), framebuffer.extent(), &clear_values);
        cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, objects.pipeline().handle());
        if set != vk::DescriptorSet::null() {
            cmd.cmd_bind_descriptor_sets(vk::PipelineBindPoint::GRAPHICS, objects.pipeline_layout(), 0, &[set]);
        }
        (self.record_fn)(cmd, resource_index, set);
        for drawable in &self.drawables {
            drawable.record(cmd);
        }
        cmd.cmd_end_render_pass();
    }

    fn record_compute(&self, pipeline: &ComputeShaderPipeline, cmd: &GfxCommandBuffer, resource_index: u32, set: vk::DescriptorSet) {
        let Some(compiled) = pipeline.compiled() else {
            (self.record_fn)(cmd, resource_index, set);
            return;
        };

        cmd.cmd_bind_pipeline(vk::PipelineBindPoint::COMPUTE, compiled.handle());
        if set != vk::DescriptorSet::null() {
            cmd.cmd_bind_descriptor_sets(vk::PipelineBindPoint::COMPUTE, compiled.layout(), 0, &[set]);
        }
        (self.record_fn)(cmd, resource_index, set);
        if let Some([x, y, z]) = self.dispatch {
            cmd.cmd_dispatch(x, y, z);
        }
    }
}

// getters
impl RgPipelineOperation {
    #[inline]
    pub fn compiled(&self) -> Option<&RgCompiledOperationInfo> {
        self.compiled.as_ref()
    }

    #[inline]
    pub fn compile_count(&self) -> u32 {
        self.compile_count
    }

    #[inline]
    pub fn framebuffers(&self) -> &[GfxFramebuffer] {
        &self.framebuffers
    }

    #[inline]
    pub fn graphics_pipeline(&self) -> Option<&ShaderPipeline> {
        match &self.shaders {
            RgOperationShaders::Graphics(p) => Some(p),
            RgOperationShaders::Compute(_) => None,
        }
    }

    #[inline]
    pub fn compute_pipeline(&self) -> Option<&ComputeShaderPipeline> {
        match &self.shaders {
            RgOperationShaders::Compute(p) => Some(p),
            RgOperationShaders::Graphics(_) => None,
        }
    }
}

impl RgOperation for RgPipelineOperation {
    #[inline]
    fn uuid(&self) -> RgOperationId {
        self.id
    }

    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    fn shader_modules(&self) -> Vec<&ShaderModule> {
        match &self.shaders {
            RgOperationShaders::Graphics(p) => p.modules(),
            RgOperationShaders::Compute(p) => p.shader().into_iter().collect(),
        }
    }

    fn compile(&mut self, ctx: &RgOperationCompileContext) {
        self.compile_count += 1;
        match &mut self.shaders {
            RgOperationShaders::Graphics(_) => self.compile_graphics(ctx),
            RgOperationShaders::Compute(pipeline) => {
                if pipeline.shader().is_some() {
                    pipeline.compile(ctx.settings.device.clone(), ctx.descriptor_set_layout, &self.name);
                }
            }
        }
        self.compiled = Some(RgCompiledOperationInfo {
            descriptor_set_layout: ctx.descriptor_set_layout,
            attachment_descriptions: ctx.attachment_descriptions.clone(),
            attachment_references: ctx.attachment_references.clone(),
            input_attachment_references: ctx.input_attachment_references.clone(),
            framebuffer_views: ctx.framebuffer_views.clone(),
        });
    }

    fn record(&self, cmd: &GfxCommandBuffer, resource_index: u32, descriptor_set: vk::DescriptorSet) {
        match &self.shaders {
            RgOperationShaders::Graphics(pipeline) => self.record_graphics(pipeline, cmd, resource_index, descriptor_set),
            RgOperationShaders::Compute(pipeline) => self.record_compute(pipeline, cmd, resource_index, descriptor_set),
        }
    }
}
