//! 从 SPIR-V 中读取反射数据
//!
//! 只关心 RenderGraph 需要的信息：
//! - `Uniform` + `Block` 的变量是 uniform buffer
//! - `Uniform` + `BufferBlock`，或者 `StorageBuffer` 的变量是 storage buffer
//! - `UniformConstant` 的 sampled image 是 sampler，`SubpassData` 的 image 是 subpass input
//! - 带有 `Location` 的 `Input` / `Output` 变量（不包括 builtin）

use std::{collections::HashMap, sync::Arc};

use rspirv::{
    dr::{self, Operand},
    spirv::{Decoration, Dim, Op, StorageClass, Word},
};

use crate::{
    error::ShaderReflectError,
    reflection::{
        ReflBaseType, ReflBufferObject, ReflField, ReflFieldType, ReflImageDim, ReflInput, ReflOutput, ReflSampler,
        ReflSubpassInput, ShaderModuleReflection,
    },
};

/// SPIR-V 的反射结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpirvReflection {
    pub entry_point: String,
    pub reflection: ShaderModuleReflection,
}

/// 将 SPIR-V 的字节流转换为 word，字节数必须是 4 的倍数
pub fn spirv_words_from_bytes(bytes: &[u8]) -> Result<Vec<u32>, ShaderReflectError> {
    if bytes.len() % 4 != 0 {
        return Err(ShaderReflectError::UnalignedBinary(bytes.len()));
    }
    Ok(bytes.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect())
}

pub fn reflect_spirv(words: &[u32]) -> Result<SpirvReflection, ShaderReflectError> {
    let module = dr::load_words(words).map_err(|e| ShaderReflectError::Parse(format!("{:?}", e)))?;
    let info = SpirvInfo::collect(&module);

    let entry_point = module
        .entry_points
        .iter()
        .find_map(|inst| match inst.operands.get(2) {
            Some(Operand::LiteralString(name)) => Some(name.clone()),
            _ => None,
        })
        .unwrap_or_else(|| "main".to_string());

    let mut reflection = ShaderModuleReflection::default();
    for var in &info.variables {
        info.reflect_variable(var, &mut reflection)?;
    }

    Ok(SpirvReflection { entry_point, reflection })
}

#[derive(Debug, Clone)]
enum SpirvType {
    Bool,
    Int { width: u32, signed: bool },
    Float { width: u32 },
    Vector { component: Word, count: u32 },
    Matrix { column: Word, count: u32 },
    Image { dim: Dim },
    SampledImage { image: Word },
    Array { element: Word, length_id: Word },
    RuntimeArray { element: Word },
    Struct { members: Vec<Word> },
    Pointer { pointee: Word },
    Other,
}

#[derive(Debug, Default, Clone)]
struct Decorations {
    binding: Option<u32>,
    set: Option<u32>,
    location: Option<u32>,
    input_attachment_index: Option<u32>,
    array_stride: Option<u32>,
    offset: Option<u32>,
    matrix_stride: Option<u32>,
    block: bool,
    buffer_block: bool,
    builtin: bool,
}

impl Decorations {
    fn apply(&mut self, decoration: Decoration, value: Option<u32>) {
        match decoration {
            Decoration::Binding => self.binding = value,
            Decoration::DescriptorSet => self.set = value,
            Decoration::Location => self.location = value,
            Decoration::InputAttachmentIndex => self.input_attachment_index = value,
            Decoration::ArrayStride => self.array_stride = value,
            Decoration::Offset => self.offset = value,
            Decoration::MatrixStride => self.matrix_stride = value,
            Decoration::Block => self.block = true,
            Decoration::BufferBlock => self.buffer_block = true,
            Decoration::BuiltIn => self.builtin = true,
            _ => {}
        }
    }
}

struct SpirvVariable {
    id: Word,
    pointer_type: Word,
    storage_class: StorageClass,
}

#[derive(Default)]
struct SpirvInfo {
    names: HashMap<Word, String>,
    member_names: HashMap<(Word, u32), String>,
    decorations: HashMap<Word, Decorations>,
    member_decorations: HashMap<(Word, u32), Decorations>,
    types: HashMap<Word, SpirvType>,
    constants: HashMap<Word, u32>,
    variables: Vec<SpirvVariable>,
}

fn id_operand(operand: Option<&Operand>) -> Option<Word> {
    match operand {
        Some(Operand::IdRef(id)) => Some(*id),
        _ => None,
    }
}

fn literal_operand(operand: Option<&Operand>) -> Option<u32> {
    match operand {
        Some(Operand::LiteralBit32(value)) => Some(*value),
        _ => None,
    }
}

fn string_operand(operand: Option<&Operand>) -> Option<String> {
    match operand {
        Some(Operand::LiteralString(s)) => Some(s.clone()),
        _ => None,
    }
}

// 收集
impl SpirvInfo {
    fn collect(module: &dr::Module) -> Self {
        let mut info = Self::default();

        for inst in &module.debug_names {
            let ops = &inst.operands;
            match inst.class.opcode {
                Op::Name => {
                    if let (Some(target), Some(name)) = (id_operand(ops.first()), string_operand(ops.get(1))) {
                        info.names.insert(target, name);
                    }
                }
                Op::MemberName => {
                    if let (Some(target), Some(member), Some(name)) =
                        (id_operand(ops.first()), literal_operand(ops.get(1)), string_operand(ops.get(2)))
                    {
                        info.member_names.insert((target, member), name);
                    }
                }
                _ => {}
            }
        }

        for inst in &module.annotations {
            let ops = &inst.operands;
            match inst.class.opcode {
                Op::Decorate => {
                    let (Some(target), Some(Operand::Decoration(decoration))) = (id_operand(ops.first()), ops.get(1))
                    else {
                        continue;
                    };
                    info.decorations.entry(target).or_default().apply(*decoration, literal_operand(ops.get(2)));
                }
                Op::MemberDecorate => {
                    let (Some(target), Some(member), Some(Operand::Decoration(decoration))) =
                        (id_operand(ops.first()), literal_operand(ops.get(1)), ops.get(2))
                    else {
                        continue;
                    };
                    info.member_decorations
                        .entry((target, member))
                        .or_default()
                        .apply(*decoration, literal_operand(ops.get(3)));
                }
                _ => {}
            }
        }

        for inst in &module.types_global_values {
            let ops = &inst.operands;
            let Some(result_id) = inst.result_id else {
                continue;
            };
            let ty = match inst.class.opcode {
                Op::TypeBool => SpirvType::Bool,
                Op::TypeInt => SpirvType::Int {
                    width: literal_operand(ops.first()).unwrap_or(32),
                    signed: literal_operand(ops.get(1)).unwrap_or(0) != 0,
                },
                Op::TypeFloat => SpirvType::Float {
                    width: literal_operand(ops.first()).unwrap_or(32),
                },
                Op::TypeVector => SpirvType::Vector {
                    component: id_operand(ops.first()).unwrap_or_default(),
                    count: literal_operand(ops.get(1)).unwrap_or(1),
                },
                Op::TypeMatrix => SpirvType::Matrix {
                    column: id_operand(ops.first()).unwrap_or_default(),
                    count: literal_operand(ops.get(1)).unwrap_or(1),
                },
                Op::TypeImage => SpirvType::Image {
                    dim: match ops.get(1) {
                        Some(Operand::Dim(dim)) => *dim,
                        _ => Dim::Dim2D,
                    },
                },
                Op::TypeSampledImage => SpirvType::SampledImage {
                    image: id_operand(ops.first()).unwrap_or_default(),
                },
                Op::TypeArray => SpirvType::Array {
                    element: id_operand(ops.first()).unwrap_or_default(),
                    length_id: id_operand(ops.get(1)).unwrap_or_default(),
                },
                Op::TypeRuntimeArray => SpirvType::RuntimeArray {
                    element: id_operand(ops.first()).unwrap_or_default(),
                },
                Op::TypeStruct => SpirvType::Struct {
                    members: ops.iter().filter_map(|op| id_operand(Some(op))).collect(),
                },
                Op::TypePointer => SpirvType::Pointer {
                    pointee: id_operand(ops.get(1)).unwrap_or_default(),
                },
                Op::Constant => {
                    if let Some(value) = literal_operand(ops.first()) {
                        info.constants.insert(result_id, value);
                    }
                    continue;
                }
                Op::Variable => {
                    if let (Some(pointer_type), Some(Operand::StorageClass(storage_class))) =
                        (inst.result_type, ops.first())
                    {
                        info.variables.push(SpirvVariable {
                            id: result_id,
                            pointer_type,
                            storage_class: *storage_class,
                        });
                    }
                    continue;
                }
                Op::TypeVoid | Op::TypeSampler | Op::TypeFunction => SpirvType::Other,
                _ => continue,
            };
            info.types.insert(result_id, ty);
        }

        info
    }
}

// 类型
impl SpirvInfo {
    fn ty(&self, id: Word) -> Result<&SpirvType, ShaderReflectError> {
        self.types.get(&id).ok_or(ShaderReflectError::UnresolvedType(id))
    }

    fn name(&self, id: Word) -> String {
        self.names.get(&id).cloned().unwrap_or_default()
    }

    fn decorations(&self, id: Word) -> Decorations {
        self.decorations.get(&id).cloned().unwrap_or_default()
    }

    fn array_length(&self, length_id: Word) -> u32 {
        self.constants.get(&length_id).copied().unwrap_or(1)
    }

    fn field_type(&self, id: Word) -> Result<ReflFieldType, ShaderReflectError> {
        Ok(match self.ty(id)? {
            SpirvType::Bool => ReflFieldType::scalar(ReflBaseType::Bool, 4),
            SpirvType::Int { width, signed } => {
                ReflFieldType::scalar(if *signed { ReflBaseType::Int } else { ReflBaseType::UInt }, width / 8)
            }
            SpirvType::Float { width: 64 } => ReflFieldType::scalar(ReflBaseType::Double, 8),
            SpirvType::Float { width } => ReflFieldType::scalar(ReflBaseType::Float, width / 8),
            SpirvType::Vector { component, count } => ReflFieldType {
                vec_size: *count,
                ..self.field_type(*component)?
            },
            SpirvType::Matrix { column, count } => ReflFieldType {
                columns: *count,
                ..self.field_type(*column)?
            },
            SpirvType::Struct { .. } => ReflFieldType::structure(),
            SpirvType::Image { .. } | SpirvType::SampledImage { .. } => ReflFieldType::scalar(ReflBaseType::Image, 0),
            SpirvType::Array { element, .. } | SpirvType::RuntimeArray { element } => self.field_type(*element)?,
            SpirvType::Pointer { .. } | SpirvType::Other => ReflFieldType::UNKNOWN,
        })
    }

    /// 类型的字节数，运行时数组为 0
    fn type_size(&self, id: Word, matrix_stride: Option<u32>) -> Result<u32, ShaderReflectError> {
        Ok(match self.ty(id)? {
            SpirvType::Bool => 4,
            SpirvType::Int { width, .. } | SpirvType::Float { width } => width / 8,
            SpirvType::Vector { component, count } => self.type_size(*component, None)? * count,
            SpirvType::Matrix { column, count } => {
                let column_size = match matrix_stride {
                    Some(stride) => stride,
                    None => self.type_size(*column, None)?,
                };
                column_size * count
            }
            SpirvType::Array { element, length_id } => {
                let stride = match self.decorations(id).array_stride {
                    Some(stride) => stride,
                    None => self.type_size(*element, matrix_stride)?,
                };
                stride * self.array_length(*length_id)
            }
            SpirvType::RuntimeArray { .. } => 0,
            SpirvType::Struct { .. } => self
                .struct_fields(id)?
                .iter()
                .map(|f| f.offset + f.size)
                .max()
                .unwrap_or(0),
            SpirvType::Image { .. } | SpirvType::SampledImage { .. } | SpirvType::Pointer { .. } | SpirvType::Other => 0,
        })
    }

    fn struct_fields(&self, struct_id: Word) -> Result<Vec<ReflField>, ShaderReflectError> {
        let SpirvType::Struct { members } = self.ty(struct_id)? else {
            return Ok(vec![]);
        };

        members
            .iter()
            .enumerate()
            .map(|(index, member_ty)| {
                let decorations =
                    self.member_decorations.get(&(struct_id, index as u32)).cloned().unwrap_or_default();
                let name = self.member_names.get(&(struct_id, index as u32)).cloned().unwrap_or_default();
                self.field(name, *member_ty, decorations.offset.unwrap_or(0), decorations.matrix_stride)
            })
            .collect()
    }

    fn field(
        &self,
        name: String,
        ty_id: Word,
        offset: u32,
        matrix_stride: Option<u32>,
    ) -> Result<ReflField, ShaderReflectError> {
        let (element, array_size) = match self.ty(ty_id)? {
            SpirvType::Array { element, length_id } => (*element, self.array_length(*length_id)),
            SpirvType::RuntimeArray { element } => (*element, 0),
            _ => (ty_id, 1),
        };

        let element_size = self.type_size(element, matrix_stride)?;
        let (size, array_stride) = if array_size == 1 && element == ty_id {
            (element_size, 0)
        } else {
            let stride = self.decorations(ty_id).array_stride.unwrap_or(element_size);
            (stride * array_size, stride)
        };

        let fields = match self.ty(element)? {
            SpirvType::Struct { .. } => self.struct_fields(element)?,
            _ => vec![],
        };

        Ok(ReflField {
            name,
            offset,
            size,
            array_size,
            array_stride,
            ty: self.field_type(element)?,
            fields,
        })
    }

    /// 结构体或者其成员是否带有 builtin 修饰（例如 gl_PerVertex）
    fn is_builtin(&self, var_id: Word, pointee: Word) -> bool {
        if self.decorations(var_id).builtin {
            return true;
        }
        match self.types.get(&pointee) {
            Some(SpirvType::Struct { members }) => (0..members.len() as u32)
                .any(|i| self.member_decorations.get(&(pointee, i)).is_some_and(|d| d.builtin)),
            _ => false,
        }
    }

    /// 去掉最外层的数组：(元素类型, 数组大小)
    fn unwrap_array(&self, id: Word) -> Result<(Word, u32), ShaderReflectError> {
        Ok(match self.ty(id)? {
            SpirvType::Array { element, length_id } => (*element, self.array_length(*length_id)),
            SpirvType::RuntimeArray { element } => (*element, 0),
            _ => (id, 1),
        })
    }
}

// 变量
impl SpirvInfo {
    fn reflect_variable(
        &self,
        var: &SpirvVariable,
        reflection: &mut ShaderModuleReflection,
    ) -> Result<(), ShaderReflectError> {
        let SpirvType::Pointer { pointee } = self.ty(var.pointer_type)? else {
            return Ok(());
        };
        let pointee = *pointee;
        let decorations = self.decorations(var.id);
        let name = self.name(var.id);

        match var.storage_class {
            StorageClass::Uniform | StorageClass::StorageBuffer => {
                let (block_ty, array_size) = self.unwrap_array(pointee)?;
                if array_size != 1 {
                    log::warn!("buffer object array {} is reflected as a single buffer object", name);
                }
                let block_decorations = self.decorations(block_ty);
                let buffer_object = Arc::new(ReflBufferObject {
                    name: self.name(block_ty),
                    instance_name: name,
                    binding: decorations.binding.unwrap_or(0),
                    set: decorations.set.unwrap_or(0),
                    full_size: self.type_size(block_ty, None)?,
                    fields: self.struct_fields(block_ty)?,
                });

                if var.storage_class == StorageClass::StorageBuffer || block_decorations.buffer_block {
                    reflection.storage_buffers.push(buffer_object);
                } else if block_decorations.block {
                    reflection.ubos.push(buffer_object);
                }
            }
            StorageClass::UniformConstant => {
                let (element, array_size) = self.unwrap_array(pointee)?;
                match self.ty(element)? {
                    SpirvType::SampledImage { image } => {
                        let dim = match self.ty(*image)? {
                            SpirvType::Image { dim } => *dim,
                            _ => Dim::Dim2D,
                        };
                        reflection.samplers.push(ReflSampler {
                            name,
                            binding: decorations.binding.unwrap_or(0),
                            set: decorations.set.unwrap_or(0),
                            array_size,
                            dim: match dim {
                                Dim::Dim1D => ReflImageDim::D1,
                                Dim::Dim2D => ReflImageDim::D2,
                                Dim::Dim3D => ReflImageDim::D3,
                                Dim::DimCube => ReflImageDim::Cube,
                                _ => ReflImageDim::Other,
                            },
                        });
                    }
                    SpirvType::Image { dim: Dim::DimSubpassData } => {
                        reflection.subpass_inputs.push(ReflSubpassInput {
                            name,
                            binding: decorations.binding.unwrap_or(0),
                            set: decorations.set.unwrap_or(0),
                            input_attachment_index: decorations.input_attachment_index.unwrap_or(0),
                            array_size,
                        });
                    }
                    _ => {
                        log::debug!("uniform constant {} is not reflected", name);
                    }
                }
            }
            StorageClass::Input | StorageClass::Output => {
                if self.is_builtin(var.id, pointee) {
                    return Ok(());
                }
                let Some(location) = decorations.location else {
                    log::debug!("interface variable {} has no location", name);
                    return Ok(());
                };
                let (element, array_size) = self.unwrap_array(pointee)?;
                let ty = self.field_type(element)?;
                if var.storage_class == StorageClass::Input {
                    reflection.inputs.push(ReflInput {
                        name,
                        location,
                        ty,
                        array_size,
                    });
                } else {
                    reflection.outputs.push(ReflOutput {
                        name,
                        location,
                        ty,
                        array_size,
                    });
                }
            }
            _ => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 操作码
    const OP_NAME: u16 = 5;
    const OP_MEMBER_NAME: u16 = 6;
    const OP_MEMORY_MODEL: u16 = 14;
    const OP_ENTRY_POINT: u16 = 15;
    const OP_CAPABILITY: u16 = 17;
    const OP_TYPE_INT: u16 = 21;
    const OP_TYPE_FLOAT: u16 = 22;
    const OP_TYPE_VECTOR: u16 = 23;
    const OP_TYPE_MATRIX: u16 = 24;
    const OP_TYPE_IMAGE: u16 = 25;
    const OP_TYPE_SAMPLED_IMAGE: u16 = 27;
    const OP_TYPE_ARRAY: u16 = 28;
    const OP_TYPE_RUNTIME_ARRAY: u16 = 29;
    const OP_TYPE_STRUCT: u16 = 30;
    const OP_TYPE_POINTER: u16 = 32;
    const OP_CONSTANT: u16 = 43;
    const OP_VARIABLE: u16 = 59;
    const OP_DECORATE: u16 = 71;
    const OP_MEMBER_DECORATE: u16 = 72;

    // decoration
    const DECO_BLOCK: u32 = 2;
    const DECO_COL_MAJOR: u32 = 5;
    const DECO_ARRAY_STRIDE: u32 = 6;
    const DECO_MATRIX_STRIDE: u32 = 7;
    const DECO_BUILTIN: u32 = 11;
    const DECO_LOCATION: u32 = 30;
    const DECO_BINDING: u32 = 33;
    const DECO_DESCRIPTOR_SET: u32 = 34;
    const DECO_OFFSET: u32 = 35;
    const DECO_INPUT_ATTACHMENT_INDEX: u32 = 43;

    // storage class
    const SC_UNIFORM_CONSTANT: u32 = 0;
    const SC_INPUT: u32 = 1;
    const SC_UNIFORM: u32 = 2;
    const SC_OUTPUT: u32 = 3;
    const SC_STORAGE_BUFFER: u32 = 12;

    const DIM_2D: u32 = 1;
    const DIM_SUBPASS_DATA: u32 = 6;

    /// 按照 SPIR-V 的逻辑布局逐个 word 构造测试模块
    #[derive(Default)]
    struct SpirvAssembler {
        bound: u32,
        entry_points: Vec<u32>,
        debug: Vec<u32>,
        annotations: Vec<u32>,
        types: Vec<u32>,
    }

    impl SpirvAssembler {
        fn new() -> Self {
            Self {
                bound: 1,
                ..Default::default()
            }
        }

        fn id(&mut self) -> u32 {
            let id = self.bound;
            self.bound += 1;
            id
        }

        fn encode(section: &mut Vec<u32>, opcode: u16, operands: &[u32]) {
            section.push(((operands.len() as u32 + 1) << 16) | opcode as u32);
            section.extend_from_slice(operands);
        }

        fn string(s: &str) -> Vec<u32> {
            let mut bytes = s.as_bytes().to_vec();
            bytes.push(0);
            while bytes.len() % 4 != 0 {
                bytes.push(0);
            }
            bytes.chunks(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
        }

        fn entry_point(&mut self, execution_model: u32, function: u32, name: &str) {
            let mut operands = vec![execution_model, function];
            operands.extend(Self::string(name));
            Self::encode(&mut self.entry_points, OP_ENTRY_POINT, &operands);
        }

        fn name(&mut self, target: u32, name: &str) {
            let mut operands = vec![target];
            operands.extend(Self::string(name));
            Self::encode(&mut self.debug, OP_NAME, &operands);
        }

        fn member_name(&mut self, target: u32, member: u32, name: &str) {
            let mut operands = vec![target, member];
            operands.extend(Self::string(name));
            Self::encode(&mut self.debug, OP_MEMBER_NAME, &operands);
        }

        fn decorate(&mut self, target: u32, decoration: u32, extra: &[u32]) {
            let mut operands = vec![target, decoration];
            operands.extend_from_slice(extra);
            Self::encode(&mut self.annotations, OP_DECORATE, &operands);
        }

        fn member_decorate(&mut self, target: u32, member: u32, decoration: u32, extra: &[u32]) {
            let mut operands = vec![target, member, decoration];
            operands.extend_from_slice(extra);
            Self::encode(&mut self.annotations, OP_MEMBER_DECORATE, &operands);
        }

        fn ty(&mut self, opcode: u16, operands: &[u32]) -> u32 {
            let id = self.id();
            let mut all = vec![id];
            all.extend_from_slice(operands);
            Self::encode(&mut self.types, opcode, &all);
            id
        }

        fn constant(&mut self, ty: u32, value: u32) -> u32 {
            let id = self.id();
            Self::encode(&mut self.types, OP_CONSTANT, &[ty, id, value]);
            id
        }

        fn variable(&mut self, pointer_ty: u32, storage_class: u32) -> u32 {
            let id = self.id();
            Self::encode(&mut self.types, OP_VARIABLE, &[pointer_ty, id, storage_class]);
            id
        }

        fn finish(self) -> Vec<u32> {
            let mut words = vec![0x0723_0203, 0x0001_0000, 0, self.bound, 0];
            // Capability Shader; MemoryModel Logical GLSL450
            Self::encode(&mut words, OP_CAPABILITY, &[1]);
            Self::encode(&mut words, OP_MEMORY_MODEL, &[0, 1]);
            words.extend(self.entry_points);
            words.extend(self.debug);
            words.extend(self.annotations);
            words.extend(self.types);
            words
        }
    }

    /// ```glsl
    /// layout(binding = 0) uniform sampler2D tex;
    /// layout(binding = 1) uniform Time { float time; vec4 color; mat4 mvp; } time_ubo;
    /// layout(location = 0) in vec2 uv;
    /// layout(location = 0) out vec4 out_color;
    /// ```
    fn fragment_module() -> Vec<u32> {
        let mut asm = SpirvAssembler::new();
        let float = asm.ty(OP_TYPE_FLOAT, &[32]);
        let vec2 = asm.ty(OP_TYPE_VECTOR, &[float, 2]);
        let vec4 = asm.ty(OP_TYPE_VECTOR, &[float, 4]);
        let mat4 = asm.ty(OP_TYPE_MATRIX, &[vec4, 4]);
        let image = asm.ty(OP_TYPE_IMAGE, &[float, DIM_2D, 0, 0, 0, 1, 0]);
        let sampled_image = asm.ty(OP_TYPE_SAMPLED_IMAGE, &[image]);
        let ptr_sampled_image = asm.ty(OP_TYPE_POINTER, &[SC_UNIFORM_CONSTANT, sampled_image]);
        let tex = asm.variable(ptr_sampled_image, SC_UNIFORM_CONSTANT);
        let time_block = asm.ty(OP_TYPE_STRUCT, &[float, vec4, mat4]);
        let ptr_time_block = asm.ty(OP_TYPE_POINTER, &[SC_UNIFORM, time_block]);
        let time_ubo = asm.variable(ptr_time_block, SC_UNIFORM);
        let ptr_in_vec2 = asm.ty(OP_TYPE_POINTER, &[SC_INPUT, vec2]);
        let uv = asm.variable(ptr_in_vec2, SC_INPUT);
        let ptr_out_vec4 = asm.ty(OP_TYPE_POINTER, &[SC_OUTPUT, vec4]);
        let out_color = asm.variable(ptr_out_vec4, SC_OUTPUT);
        let main_fn = asm.id();

        asm.entry_point(4, main_fn, "main");

        asm.name(tex, "tex");
        asm.name(time_block, "Time");
        asm.member_name(time_block, 0, "time");
        asm.member_name(time_block, 1, "color");
        asm.member_name(time_block, 2, "mvp");
        asm.name(time_ubo, "time_ubo");
        asm.name(uv, "uv");
        asm.name(out_color, "out_color");

        asm.decorate(tex, DECO_BINDING, &[0]);
        asm.decorate(tex, DECO_DESCRIPTOR_SET, &[0]);
        asm.decorate(time_block, DECO_BLOCK, &[]);
        asm.member_decorate(time_block, 0, DECO_OFFSET, &[0]);
        asm.member_decorate(time_block, 1, DECO_OFFSET, &[16]);
        asm.member_decorate(time_block, 2, DECO_COL_MAJOR, &[]);
        asm.member_decorate(time_block, 2, DECO_OFFSET, &[32]);
        asm.member_decorate(time_block, 2, DECO_MATRIX_STRIDE, &[16]);
        asm.decorate(time_ubo, DECO_BINDING, &[1]);
        asm.decorate(time_ubo, DECO_DESCRIPTOR_SET, &[0]);
        asm.decorate(uv, DECO_LOCATION, &[0]);
        asm.decorate(out_color, DECO_LOCATION, &[0]);

        asm.finish()
    }

    #[test]
    fn test_reflect_fragment_shader() {
        let result = reflect_spirv(&fragment_module()).unwrap();
        let reflection = &result.reflection;
        assert_eq!(result.entry_point, "main");

        assert_eq!(
            reflection.samplers,
            vec![ReflSampler {
                name: "tex".to_string(),
                binding: 0,
                set: 0,
                array_size: 1,
                dim: ReflImageDim::D2,
            }]
        );

        assert_eq!(reflection.ubos.len(), 1);
        let ubo = &reflection.ubos[0];
        assert_eq!(ubo.name, "Time");
        assert_eq!(ubo.instance_name, "time_ubo");
        assert_eq!(ubo.binding, 1);
        assert_eq!(ubo.full_size, 96);
        let offsets = ubo.fields.iter().map(|f| (f.name.as_str(), f.offset, f.size)).collect::<Vec<_>>();
        assert_eq!(offsets, vec![("time", 0, 4), ("color", 16, 16), ("mvp", 32, 64)]);
        assert_eq!(ubo.fields[2].ty, ReflFieldType::mat(4, 4));

        assert!(reflection.storage_buffers.is_empty());
        assert_eq!(reflection.inputs.len(), 1);
        assert_eq!(reflection.inputs[0].location, 0);
        assert_eq!(reflection.inputs[0].ty, ReflFieldType::vec(ReflBaseType::Float, 2));
        assert_eq!(reflection.outputs.len(), 1);
        assert_eq!(reflection.outputs[0].name, "out_color");
    }

    /// ```glsl
    /// layout(binding = 0) uniform sampler2D textures[4];
    /// layout(input_attachment_index = 1, binding = 2) uniform subpassInput prev;
    /// struct Particle { vec3 pos; float mass; };
    /// layout(std430, binding = 3) buffer Particles { uint count; Particle items[]; } particles;
    /// layout(std140, binding = 1) uniform Lights { vec4 colors[3]; } lights;
    /// ```
    fn arrays_module() -> Vec<u32> {
        let mut asm = SpirvAssembler::new();
        let uint = asm.ty(OP_TYPE_INT, &[32, 0]);
        let float = asm.ty(OP_TYPE_FLOAT, &[32]);
        let vec3 = asm.ty(OP_TYPE_VECTOR, &[float, 3]);
        let vec4 = asm.ty(OP_TYPE_VECTOR, &[float, 4]);
        let three = asm.constant(uint, 3);
        let four = asm.constant(uint, 4);

        let image = asm.ty(OP_TYPE_IMAGE, &[float, DIM_2D, 0, 0, 0, 1, 0]);
        let sampled_image = asm.ty(OP_TYPE_SAMPLED_IMAGE, &[image]);
        let sampled_image_array = asm.ty(OP_TYPE_ARRAY, &[sampled_image, four]);
        let ptr_sampled_image_array = asm.ty(OP_TYPE_POINTER, &[SC_UNIFORM_CONSTANT, sampled_image_array]);
        let textures = asm.variable(ptr_sampled_image_array, SC_UNIFORM_CONSTANT);

        let subpass_image = asm.ty(OP_TYPE_IMAGE, &[float, DIM_SUBPASS_DATA, 0, 0, 0, 2, 0]);
        let ptr_subpass_image = asm.ty(OP_TYPE_POINTER, &[SC_UNIFORM_CONSTANT, subpass_image]);
        let prev = asm.variable(ptr_subpass_image, SC_UNIFORM_CONSTANT);

        let particle = asm.ty(OP_TYPE_STRUCT, &[vec3, float]);
        let particle_array = asm.ty(OP_TYPE_RUNTIME_ARRAY, &[particle]);
        let particles_block = asm.ty(OP_TYPE_STRUCT, &[uint, particle_array]);
        let ptr_particles_block = asm.ty(OP_TYPE_POINTER, &[SC_STORAGE_BUFFER, particles_block]);
        let particles = asm.variable(ptr_particles_block, SC_STORAGE_BUFFER);

        let color_array = asm.ty(OP_TYPE_ARRAY, &[vec4, three]);
        let lights_block = asm.ty(OP_TYPE_STRUCT, &[color_array]);
        let ptr_lights_block = asm.ty(OP_TYPE_POINTER, &[SC_UNIFORM, lights_block]);
        let lights = asm.variable(ptr_lights_block, SC_UNIFORM);

        asm.name(textures, "textures");
        asm.name(prev, "prev");
        asm.name(particle, "Particle");
        asm.member_name(particle, 0, "pos");
        asm.member_name(particle, 1, "mass");
        asm.name(particles_block, "Particles");
        asm.member_name(particles_block, 0, "count");
        asm.member_name(particles_block, 1, "items");
        asm.name(particles, "particles");
        asm.name(lights_block, "Lights");
        asm.member_name(lights_block, 0, "colors");
        asm.name(lights, "lights");

        asm.decorate(textures, DECO_BINDING, &[0]);
        asm.decorate(prev, DECO_BINDING, &[2]);
        asm.decorate(prev, DECO_INPUT_ATTACHMENT_INDEX, &[1]);
        asm.member_decorate(particle, 0, DECO_OFFSET, &[0]);
        asm.member_decorate(particle, 1, DECO_OFFSET, &[12]);
        asm.decorate(particle_array, DECO_ARRAY_STRIDE, &[16]);
        asm.decorate(particles_block, DECO_BLOCK, &[]);
        asm.member_decorate(particles_block, 0, DECO_OFFSET, &[0]);
        asm.member_decorate(particles_block, 1, DECO_OFFSET, &[16]);
        asm.decorate(particles, DECO_BINDING, &[3]);
        asm.decorate(color_array, DECO_ARRAY_STRIDE, &[16]);
        asm.decorate(lights_block, DECO_BLOCK, &[]);
        asm.member_decorate(lights_block, 0, DECO_OFFSET, &[0]);
        asm.decorate(lights, DECO_BINDING, &[1]);

        asm.finish()
    }

    #[test]
    fn test_reflect_arrays_and_storage_buffers() {
        let reflection = reflect_spirv(&arrays_module()).unwrap().reflection;

        assert_eq!(reflection.samplers.len(), 1);
        assert_eq!(reflection.samplers[0].array_size, 4);

        assert_eq!(
            reflection.subpass_inputs,
            vec![ReflSubpassInput {
                name: "prev".to_string(),
                binding: 2,
                set: 0,
                input_attachment_index: 1,
                array_size: 1,
            }]
        );

        assert_eq!(reflection.storage_buffers.len(), 1);
        let particles = &reflection.storage_buffers[0];
        assert_eq!(particles.name, "Particles");
        assert_eq!(particles.full_size, 16);
        let items = particles.find("items").unwrap();
        assert_eq!((items.offset, items.array_size, items.array_stride, items.size), (16, 0, 16, 0));
        let mass = items.find("mass").unwrap();
        assert_eq!((mass.offset, mass.size), (12, 4));

        assert_eq!(reflection.ubos.len(), 1);
        let lights = &reflection.ubos[0];
        assert_eq!(lights.full_size, 48);
        let colors = lights.find("colors").unwrap();
        assert_eq!((colors.array_size, colors.array_stride, colors.size), (3, 16, 48));
        assert_eq!(colors.element_size(), 16);
    }

    #[test]
    fn test_builtin_outputs_are_skipped() {
        let mut asm = SpirvAssembler::new();
        let float = asm.ty(OP_TYPE_FLOAT, &[32]);
        let vec4 = asm.ty(OP_TYPE_VECTOR, &[float, 4]);
        let per_vertex = asm.ty(OP_TYPE_STRUCT, &[vec4]);
        let ptr_out_per_vertex = asm.ty(OP_TYPE_POINTER, &[SC_OUTPUT, per_vertex]);
        let gl_out = asm.variable(ptr_out_per_vertex, SC_OUTPUT);
        let ptr_out_vec4 = asm.ty(OP_TYPE_POINTER, &[SC_OUTPUT, vec4]);
        let color = asm.variable(ptr_out_vec4, SC_OUTPUT);

        asm.name(gl_out, "");
        asm.name(color, "color");
        // BuiltIn Position
        asm.member_decorate(per_vertex, 0, DECO_BUILTIN, &[0]);
        asm.decorate(color, DECO_LOCATION, &[2]);

        let reflection = reflect_spirv(&asm.finish()).unwrap().reflection;
        assert_eq!(reflection.outputs.len(), 1);
        assert_eq!(reflection.outputs[0].name, "color");
        assert_eq!(reflection.outputs[0].location, 2);
    }

    #[test]
    fn test_invalid_binary() {
        assert!(matches!(reflect_spirv(&[1, 2, 3]), Err(ShaderReflectError::Parse(_))));
        assert!(matches!(spirv_words_from_bytes(&[0; 5]), Err(ShaderReflectError::UnalignedBinary(5))));
    }
}
