//! GLSL 编译前端
//!
//! 使用 glslc (来自 Vulkan SDK) 将 GLSL 源码编译为 SPIR-V

use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use itertools::Itertools;

use crate::{error::ShaderCompileError, shader_kind::ShaderKind, spirv_reflect::spirv_words_from_bytes};

/// 一次编译请求
#[derive(Debug, Clone)]
pub struct ShaderCompileRequest<'a> {
    pub kind: ShaderKind,
    pub source: &'a str,
    /// 用于诊断信息的名字，一般是文件路径
    pub source_name: &'a str,
    /// `#include` 的查找目录
    pub include_dir: Option<&'a Path>,
    /// `NAME` 或者 `NAME=VALUE`
    pub defines: &'a [String],
    pub undefines: &'a [String],
}

/// GLSL 到 SPIR-V 的编译器
pub trait ShaderFrontend: Send + Sync {
    fn compile(&self, request: &ShaderCompileRequest) -> Result<Vec<u32>, ShaderCompileError>;
}

/// 在 `#version` 之后插入 `#undef`，没有 `#version` 时插入到最前面
pub fn inject_undefines(source: &str, undefines: &[String]) -> String {
    if undefines.is_empty() {
        return source.to_string();
    }

    let undef_lines = undefines.iter().map(|name| format!("#undef {}", name)).join("\n");
    let mut lines = source.lines().collect_vec();
    let insert_at = lines.iter().position(|line| line.trim_start().starts_with("#version")).map_or(0, |i| i + 1);
    lines.insert(insert_at, &undef_lines);

    let mut result = lines.join("\n");
    if source.ends_with('\n') {
        result.push('\n');
    }
    result
}

/// 调用 glslc，源码通过 stdin 传入，SPIR-V 从 stdout 读出
#[derive(Debug, Clone)]
pub struct GlslcFrontend {
    executable: PathBuf,
}

impl Default for GlslcFrontend {
    fn default() -> Self {
        Self::new()
    }
}

impl GlslcFrontend {
    pub fn new() -> Self {
        Self::with_executable("glslc")
    }

    pub fn with_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    #[inline]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn args(request: &ShaderCompileRequest) -> Vec<String> {
        let mut args = vec![
            format!("-fshader-stage={}", request.kind.glslc_stage()),
            "--target-env=vulkan1.2".to_string(),
        ];
        if let Some(include_dir) = request.include_dir {
            args.push("-I".to_string());
            args.push(include_dir.to_string_lossy().into_owned());
        }
        args.extend(request.defines.iter().map(|define| format!("-D{}", define)));
        args.extend(["-o", "-", "-"].map(String::from));
        args
    }
}

impl ShaderFrontend for GlslcFrontend {
    fn compile(&self, request: &ShaderCompileRequest) -> Result<Vec<u32>, ShaderCompileError> {
        let _span = vkrg_crate_tools::profile_span!("GlslcFrontend::compile");
        let launch_error = |source| ShaderCompileError::Launch {
            executable: self.executable.display().to_string(),
            source,
        };

        let mut child = Command::new(&self.executable)
            .args(Self::args(request))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(launch_error)?;

        let source = inject_undefines(request.source, request.undefines);
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(source.as_bytes()).map_err(launch_error)?;
        }
        let output = child.wait_with_output().map_err(launch_error)?;

        if !output.stderr.is_empty() {
            log::warn!("glslc {}: {}", request.source_name, String::from_utf8_lossy(&output.stderr));
        }
        if !output.status.success() {
            return Err(ShaderCompileError::Diagnostic {
                name: request.source_name.to_string(),
                diagnostic: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        log::debug!("compiled {} ({} bytes of SPIR-V)", request.source_name, output.stdout.len());
        Ok(spirv_words_from_bytes(&output.stdout)?)
    }
}
