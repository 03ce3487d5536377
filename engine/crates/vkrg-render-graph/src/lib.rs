//! RenderGraph 执行核心
//!
//! 将声明式的 graph（带有 shader 的 operation 以及有类型的资源）转换为：
//! - 从 shader 反射数据自动推导的绑定信息（attachment、descriptor set layout、descriptor 写入）
//! - 帧同步的执行调度，多帧并行时 CPU 录制与 GPU 执行相互重叠
//!
//! # 模块
//! - [`resource`]：资源的生命周期与 hook 协议
//! - [`binder`]：从反射数据推导 attachment / descriptor / 顶点输入
//! - [`shader_pipeline`]：按阶段组织的 shader 模块
//! - [`graph`]：operation、连接关系、编译与提交
//! - [`drawable`]：录制到 operation 中的绘制命令
//! - [`uniform`]：为 shader 中的 buffer object 自动创建资源，并在每帧写入
//! - [`renderer`]：帧调度器

pub mod binder;
pub mod drawable;
pub mod graph;
pub mod ids;
pub mod renderer;
pub mod resource;
pub mod settings;
pub mod shader_pipeline;
pub mod uniform;

#[cfg(test)]
pub(crate) mod test_utils;
