//! shader 反射数据
//!
//! 每个编译好的 shader 模块产生一份 [`ShaderModuleReflection`]，之后只读。
//! 各个列表按照 SPIR-V 中变量声明的顺序排列。

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReflBaseType {
    Bool,
    Int,
    UInt,
    Float,
    Double,
    Struct,
    Image,
    Unknown,
}

/// 字段的类型：标量、向量或者矩阵
///
/// - 标量：`vec_size == 1 && columns == 1`
/// - 向量：`vec_size` 个分量
/// - 矩阵：`columns` 列，每列 `vec_size` 个分量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReflFieldType {
    pub base: ReflBaseType,
    /// 单个分量的字节数
    pub component_size: u32,
    pub vec_size: u32,
    pub columns: u32,
}

impl ReflFieldType {
    pub const UNKNOWN: Self = Self {
        base: ReflBaseType::Unknown,
        component_size: 0,
        vec_size: 1,
        columns: 1,
    };

    #[inline]
    pub const fn scalar(base: ReflBaseType, component_size: u32) -> Self {
        Self {
            base,
            component_size,
            vec_size: 1,
            columns: 1,
        }
    }

    #[inline]
    pub const fn float() -> Self {
        Self::scalar(ReflBaseType::Float, 4)
    }

    #[inline]
    pub const fn vec(base: ReflBaseType, vec_size: u32) -> Self {
        Self {
            base,
            component_size: 4,
            vec_size,
            columns: 1,
        }
    }

    /// `columns` 列，每列 `rows` 个 float
    #[inline]
    pub const fn mat(columns: u32, rows: u32) -> Self {
        Self {
            base: ReflBaseType::Float,
            component_size: 4,
            vec_size: rows,
            columns,
        }
    }

    #[inline]
    pub const fn structure() -> Self {
        Self::scalar(ReflBaseType::Struct, 0)
    }

    #[inline]
    pub fn is_matrix(&self) -> bool {
        self.columns > 1
    }

    /// 紧密排列时一列（或者一个向量）的字节数
    #[inline]
    pub fn column_size(&self) -> u32 {
        self.component_size * self.vec_size
    }

    /// 紧密排列时的字节数
    #[inline]
    pub fn packed_size(&self) -> u32 {
        self.column_size() * self.columns
    }
}

/// buffer object 中的一个字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflField {
    pub name: String,
    /// 相对于外层（buffer object 或者外层结构体的一个元素）的字节偏移
    pub offset: u32,
    /// 整个字段的字节数，数组时为所有元素的大小，运行时数组为 0
    pub size: u32,
    /// 非数组为 1，运行时数组为 0
    pub array_size: u32,
    pub array_stride: u32,
    pub ty: ReflFieldType,
    /// 结构体（或者结构体数组的元素）的成员
    pub fields: Vec<ReflField>,
}

impl ReflField {
    #[inline]
    pub fn is_array(&self) -> bool {
        self.array_size != 1
    }

    /// 单个元素的字节数
    #[inline]
    pub fn element_size(&self) -> u32 {
        if self.is_array() { self.array_stride } else { self.size }
    }

    pub fn find(&self, name: &str) -> Option<&ReflField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// uniform buffer 或者 storage buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflBufferObject {
    /// block 的类型名，用于查找
    pub name: String,
    /// 变量名
    pub instance_name: String,
    pub binding: u32,
    pub set: u32,
    /// 所有字段 `offset + size` 的最大值
    pub full_size: u32,
    pub fields: Vec<ReflField>,
}

impl ReflBufferObject {
    pub fn find(&self, name: &str) -> Option<&ReflField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReflImageDim {
    D1,
    D2,
    D3,
    Cube,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflSampler {
    pub name: String,
    pub binding: u32,
    pub set: u32,
    pub array_size: u32,
    pub dim: ReflImageDim,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflSubpassInput {
    pub name: String,
    pub binding: u32,
    pub set: u32,
    pub input_attachment_index: u32,
    pub array_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflInput {
    pub name: String,
    pub location: u32,
    pub ty: ReflFieldType,
    pub array_size: u32,
}

impl ReflInput {
    /// 作为顶点属性时占用的字节数
    #[inline]
    pub fn size(&self) -> u32 {
        self.ty.packed_size() * self.array_size
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflOutput {
    pub name: String,
    pub location: u32,
    pub ty: ReflFieldType,
    pub array_size: u32,
}

/// 一个 shader 模块的反射数据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderModuleReflection {
    pub ubos: Vec<Arc<ReflBufferObject>>,
    pub samplers: Vec<ReflSampler>,
    pub storage_buffers: Vec<Arc<ReflBufferObject>>,
    pub inputs: Vec<ReflInput>,
    pub outputs: Vec<ReflOutput>,
    pub subpass_inputs: Vec<ReflSubpassInput>,
}

impl ShaderModuleReflection {
    /// 所有的 buffer object：先 uniform buffer，后 storage buffer
    pub fn buffer_objects(&self) -> impl Iterator<Item = &Arc<ReflBufferObject>> {
        self.ubos.iter().chain(self.storage_buffers.iter())
    }
}
