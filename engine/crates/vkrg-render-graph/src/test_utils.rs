//! 测试共用的工具：headless 设备以及手工构造的反射数据

use std::{rc::Rc, sync::Arc};

use vkrg_gfx::{backend::headless::GfxHeadlessDevice, device::GfxDeviceRef};
use vkrg_shader::{
    reflection::{ReflBufferObject, ReflField, ReflFieldType, ReflImageDim, ReflSampler, ReflSubpassInput},
    shader_kind::ShaderKind,
    shader_module::ShaderModule,
};

use crate::settings::RgGraphSettings;

pub fn headless_device() -> (Rc<GfxHeadlessDevice>, GfxDeviceRef) {
    vkrg_crate_tools::init_log::init_log_with_filter(log::LevelFilter::Warn);
    let headless = Rc::new(GfxHeadlessDevice::new());
    let device: GfxDeviceRef = headless.clone();
    (headless, device)
}

pub fn graph_settings(device: &GfxDeviceRef, resource_count: u32) -> RgGraphSettings {
    RgGraphSettings::new(device.clone(), resource_count)
}

pub fn field(name: &str, offset: u32, ty: ReflFieldType) -> ReflField {
    ReflField {
        name: name.to_string(),
        offset,
        size: ty.packed_size(),
        array_size: 1,
        array_stride: 0,
        ty,
        fields: vec![],
    }
}

pub fn array_field(name: &str, offset: u32, ty: ReflFieldType, array_size: u32, array_stride: u32) -> ReflField {
    ReflField {
        name: name.to_string(),
        offset,
        size: array_size * array_stride,
        array_size,
        array_stride,
        ty,
        fields: vec![],
    }
}

pub fn buffer_object(name: &str, binding: u32, fields: Vec<ReflField>) -> Arc<ReflBufferObject> {
    let full_size = fields.iter().map(|f| f.offset + f.size).max().unwrap_or(0);
    Arc::new(ReflBufferObject {
        name: name.to_string(),
        instance_name: name.to_lowercase(),
        binding,
        set: 0,
        full_size,
        fields,
    })
}

pub fn sampler(name: &str, binding: u32, array_size: u32) -> ReflSampler {
    ReflSampler {
        name: name.to_string(),
        binding,
        set: 0,
        array_size,
        dim: ReflImageDim::D2,
    }
}

pub fn subpass_input(name: &str, binding: u32, input_attachment_index: u32) -> ReflSubpassInput {
    ReflSubpassInput {
        name: name.to_string(),
        binding,
        set: 0,
        input_attachment_index,
        array_size: 1,
    }
}

/// `Globals { vec4 color; float time; }`
pub fn globals_ubo(binding: u32) -> Arc<ReflBufferObject> {
    buffer_object(
        "Globals",
        binding,
        vec![
            field("color", 0, ReflFieldType::vec(vkrg_shader::reflection::ReflBaseType::Float, 4)),
            field("time", 16, ReflFieldType::float()),
        ],
    )
}

/// 带有一个 sampler 与一个 uniform buffer 的 fragment shader
pub fn textured_fragment_module() -> ShaderModule {
    let mut reflection = vkrg_shader::reflection::ShaderModuleReflection::default();
    reflection.samplers.push(sampler("albedo", 0, 1));
    reflection.ubos.push(globals_ubo(1));
    ShaderModule::from_parts(ShaderKind::Fragment, reflection)
}

/// 只有 header 与 entry point 的最小 SPIR-V
pub fn minimal_spirv() -> Vec<u32> {
    // "main\0" 补齐到 8 字节
    let name = [u32::from_le_bytes(*b"main"), 0];
    let mut words = vec![0x0723_0203, 0x0001_0000, 0, 3, 0];
    words.extend([(2 << 16) | 17, 1]);
    words.extend([(3 << 16) | 14, 0, 1]);
    words.push(((3 + name.len() as u32) << 16) | 15);
    words.extend([5, 1]);
    words.extend(name);
    words
}

/// 编译结果固定的前端，记录编译过的源码名
#[derive(Default)]
pub struct RecordingFrontend {
    pub compiled: std::sync::Mutex<Vec<String>>,
    pub fail: bool,
}

impl vkrg_shader::frontend::ShaderFrontend for RecordingFrontend {
    fn compile(
        &self,
        request: &vkrg_shader::frontend::ShaderCompileRequest,
    ) -> Result<Vec<u32>, vkrg_shader::error::ShaderCompileError> {
        self.compiled.lock().unwrap().push(request.source_name.to_string());
        if self.fail {
            return Err(vkrg_shader::error::ShaderCompileError::Diagnostic {
                name: request.source_name.to_string(),
                diagnostic: "error: syntax error".to_string(),
            });
        }
        Ok(minimal_spirv())
    }
}

/// 在临时目录中写入 shader 源码文件，返回文件路径
pub fn write_temp_shader(dir_name: &str, file_name: &str, source: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("vkrg-{}-{}", dir_name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(file_name);
    std::fs::write(&path, source).unwrap();
    path
}
