//! shader 模块与反射
//!
//! - [`shader_kind::ShaderKind`]：shader 所处的阶段
//! - [`reflection`]：反射得到的数据（uniform buffer、sampler、输入输出等），只读
//! - [`spirv_reflect`]：从 SPIR-V 中读取反射数据
//! - [`frontend`]：GLSL 到 SPIR-V 的编译前端（默认使用 glslc）
//! - [`shader_module::ShaderModule`]：编译结果与反射数据，支持原地重新加载

pub mod error;
pub mod frontend;
pub mod reflection;
pub mod shader_kind;
pub mod shader_module;
pub mod spirv_reflect;
