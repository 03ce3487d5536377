//! RenderGraph：operation、资源以及它们之间的连接
//!
//! - [`operation`]：graph 的节点，提供 shader 并录制命令
//! - [`connection`]：operation 与资源的连接，编译时作为 binder 的 provider
//! - [`render_graph`]：编译（资源、descriptor、预录制 command buffer）与提交

pub mod connection;
pub mod operation;
pub mod render_graph;

pub use connection::{RgBinding, RgConnection, RgConnectionSet};
pub use operation::{RgCompiledOperationInfo, RgOperation, RgOperationCompileContext, RgPipelineOperation, RgRecordFn};
pub use render_graph::{RenderGraph, RgResourceNode};
