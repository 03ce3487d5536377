use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ShaderReflectError {
    #[error("invalid SPIR-V binary: {0}")]
    Parse(String),
    #[error("SPIR-V binary size {0} is not a multiple of 4")]
    UnalignedBinary(usize),
    #[error("SPIR-V id {0} is referenced but never declared as a type")]
    UnresolvedType(u32),
}

#[derive(Debug, thiserror::Error)]
pub enum ShaderCompileError {
    #[error("failed to launch shader compiler `{executable}`: {source}")]
    Launch {
        executable: String,
        #[source]
        source: std::io::Error,
    },
    /// 编译器给出的诊断信息
    #[error("failed to compile {name}:\n{diagnostic}")]
    Diagnostic { name: String, diagnostic: String },
    #[error("failed to read shader file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("can not infer shader kind from file {0}")]
    UnknownExtension(PathBuf),
    #[error(transparent)]
    Reflect(#[from] ShaderReflectError),
}
