use ash::vk;

/// shader 所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderKind {
    Vertex,
    Fragment,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Compute,
}

pub const SHADER_KIND_COUNT: usize = 6;

impl ShaderKind {
    pub const ALL: [ShaderKind; SHADER_KIND_COUNT] = [
        ShaderKind::Vertex,
        ShaderKind::Fragment,
        ShaderKind::TessellationControl,
        ShaderKind::TessellationEvaluation,
        ShaderKind::Geometry,
        ShaderKind::Compute,
    ];

    /// 根据文件扩展名确定 shader 阶段，扩展名可以带也可以不带 `.`
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.') {
            "vert" => Some(Self::Vertex),
            "frag" => Some(Self::Fragment),
            "tesc" => Some(Self::TessellationControl),
            "tese" => Some(Self::TessellationEvaluation),
            "geom" => Some(Self::Geometry),
            "comp" => Some(Self::Compute),
            _ => None,
        }
    }

    #[inline]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Vertex => ".vert",
            Self::Fragment => ".frag",
            Self::TessellationControl => ".tesc",
            Self::TessellationEvaluation => ".tese",
            Self::Geometry => ".geom",
            Self::Compute => ".comp",
        }
    }

    #[inline]
    pub fn stage_flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
            Self::TessellationControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            Self::TessellationEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            Self::Geometry => vk::ShaderStageFlags::GEOMETRY,
            Self::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }

    /// glslc `-fshader-stage` 参数
    #[inline]
    pub fn glslc_stage(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::TessellationControl => "tesscontrol",
            Self::TessellationEvaluation => "tesseval",
            Self::Geometry => "geometry",
            Self::Compute => "compute",
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for ShaderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Vertex => "Vertex",
            Self::Fragment => "Fragment",
            Self::TessellationControl => "TessellationControl",
            Self::TessellationEvaluation => "TessellationEvaluation",
            Self::Geometry => "Geometry",
            Self::Compute => "Compute",
        };
        f.write_str(name)
    }
}
