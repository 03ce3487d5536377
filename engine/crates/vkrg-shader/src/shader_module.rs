use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    error::ShaderCompileError,
    frontend::{ShaderCompileRequest, ShaderFrontend},
    reflection::ShaderModuleReflection,
    shader_kind::ShaderKind,
    spirv_reflect::{reflect_spirv, spirv_words_from_bytes},
};

/// shader 的来源，决定 [`ShaderModule::reload`] 如何重新编译
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderReadMode {
    GlslFilePath,
    SpvFilePath,
    GlslString,
    /// 直接给定的 SPIR-V 或者反射数据，无法重新加载
    Binary,
}

/// 编译好的 shader：SPIR-V 以及反射数据
///
/// 反射数据在创建之后只读，`reload` 成功时整体替换
pub struct ShaderModule {
    kind: ShaderKind,
    read_mode: ShaderReadMode,
    /// GLSL 源码，只有 `GlslString` / `GlslFilePath` 有值
    source_code: String,
    location: Option<PathBuf>,
    binary: Vec<u32>,
    defines: Vec<String>,
    undefines: Vec<String>,
    reflection: ShaderModuleReflection,
    entry_point: String,
    frontend: Option<Arc<dyn ShaderFrontend>>,
}

impl std::fmt::Debug for ShaderModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderModule")
            .field("kind", &self.kind)
            .field("read_mode", &self.read_mode)
            .field("location", &self.location)
            .field("binary_words", &self.binary.len())
            .field("entry_point", &self.entry_point)
            .finish()
    }
}

// new & init
impl ShaderModule {
    pub fn from_glsl_string(
        frontend: Arc<dyn ShaderFrontend>,
        kind: ShaderKind,
        source: impl Into<String>,
        defines: Vec<String>,
        undefines: Vec<String>,
    ) -> Result<Self, ShaderCompileError> {
        let mut module = Self::empty(kind, ShaderReadMode::GlslString);
        module.source_code = source.into();
        module.defines = defines;
        module.undefines = undefines;
        module.frontend = Some(frontend);
        module.reload()?;
        Ok(module)
    }

    /// shader 阶段由文件扩展名决定
    pub fn from_glsl_file(
        frontend: Arc<dyn ShaderFrontend>,
        path: impl AsRef<Path>,
        defines: Vec<String>,
        undefines: Vec<String>,
    ) -> Result<Self, ShaderCompileError> {
        let path = path.as_ref();
        let kind = Self::kind_from_path(path)?;
        let mut module = Self::empty(kind, ShaderReadMode::GlslFilePath);
        module.location = Some(path.to_path_buf());
        module.defines = defines;
        module.undefines = undefines;
        module.frontend = Some(frontend);
        module.reload()?;
        Ok(module)
    }

    pub fn from_spv_file(kind: ShaderKind, path: impl AsRef<Path>) -> Result<Self, ShaderCompileError> {
        let mut module = Self::empty(kind, ShaderReadMode::SpvFilePath);
        module.location = Some(path.as_ref().to_path_buf());
        module.reload()?;
        Ok(module)
    }

    pub fn from_spirv(kind: ShaderKind, words: Vec<u32>) -> Result<Self, ShaderCompileError> {
        let reflected = reflect_spirv(&words)?;
        let mut module = Self::empty(kind, ShaderReadMode::Binary);
        module.binary = words;
        module.reflection = reflected.reflection;
        module.entry_point = reflected.entry_point;
        Ok(module)
    }

    /// 直接使用给定的反射数据，没有 SPIR-V
    pub fn from_parts(kind: ShaderKind, reflection: ShaderModuleReflection) -> Self {
        let mut module = Self::empty(kind, ShaderReadMode::Binary);
        module.reflection = reflection;
        module
    }

    fn empty(kind: ShaderKind, read_mode: ShaderReadMode) -> Self {
        Self {
            kind,
            read_mode,
            source_code: String::new(),
            location: None,
            binary: vec![],
            defines: vec![],
            undefines: vec![],
            reflection: ShaderModuleReflection::default(),
            entry_point: "main".to_string(),
            frontend: None,
        }
    }

    fn kind_from_path(path: &Path) -> Result<ShaderKind, ShaderCompileError> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(ShaderKind::from_extension)
            .ok_or_else(|| ShaderCompileError::UnknownExtension(path.to_path_buf()))
    }
}

// update
impl ShaderModule {
    /// 按照创建时的方式重新编译，并替换 SPIR-V 与反射数据
    ///
    /// 失败时保留之前的结果
    pub fn reload(&mut self) -> Result<(), ShaderCompileError> {
        let _span = vkrg_crate_tools::profile_span!("ShaderModule::reload");
        let read_file = |path: &Path| {
            std::fs::read(path).map_err(|source| ShaderCompileError::Io {
                path: path.to_path_buf(),
                source,
            })
        };

        let (source_code, binary) = match self.read_mode {
            ShaderReadMode::Binary => return Ok(()),
            ShaderReadMode::SpvFilePath => {
                let Some(path) = self.location.as_deref() else {
                    return Ok(());
                };
                (String::new(), spirv_words_from_bytes(&read_file(path)?)?)
            }
            ShaderReadMode::GlslString | ShaderReadMode::GlslFilePath => {
                let source_code = match (self.read_mode, self.location.as_deref()) {
                    (ShaderReadMode::GlslFilePath, Some(path)) => {
                        String::from_utf8_lossy(&read_file(path)?).into_owned()
                    }
                    _ => self.source_code.clone(),
                };
                let source_name = self
                    .location
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| format!("<{} string>", self.kind));
                let Some(frontend) = self.frontend.as_ref() else {
                    return Ok(());
                };
                let binary = frontend.compile(&ShaderCompileRequest {
                    kind: self.kind,
                    source: &source_code,
                    source_name: &source_name,
                    include_dir: self.location.as_deref().and_then(Path::parent),
                    defines: &self.defines,
                    undefines: &self.undefines,
                })?;
                (source_code, binary)
            }
        };

        let reflected = reflect_spirv(&binary)?;
        self.source_code = source_code;
        self.binary = binary;
        self.reflection = reflected.reflection;
        self.entry_point = reflected.entry_point;
        log::debug!("loaded {} shader {:?}", self.kind, self.location);
        Ok(())
    }
}

// getters
impl ShaderModule {
    #[inline]
    pub fn kind(&self) -> ShaderKind {
        self.kind
    }

    #[inline]
    pub fn read_mode(&self) -> ShaderReadMode {
        self.read_mode
    }

    #[inline]
    pub fn source_code(&self) -> &str {
        &self.source_code
    }

    #[inline]
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    #[inline]
    pub fn binary(&self) -> &[u32] {
        &self.binary
    }

    #[inline]
    pub fn defines(&self) -> &[String] {
        &self.defines
    }

    #[inline]
    pub fn undefines(&self) -> &[String] {
        &self.undefines
    }

    #[inline]
    pub fn reflection(&self) -> &ShaderModuleReflection {
        &self.reflection
    }

    #[inline]
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}
