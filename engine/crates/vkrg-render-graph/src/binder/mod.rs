//! 从 shader 反射数据推导绑定信息
//!
//! 这里都是纯函数：输入反射数据、shader 阶段以及提供数据的 provider，
//! 输出可以直接用于创建 render pass / descriptor set layout / pipeline 的结构。
//! 输出的顺序只由反射数据决定，多次调用结果相同。
//!
//! provider 没有提供数据的绑定会记录错误日志并跳过，不会中止。

pub mod attachment;
pub mod descriptor;
pub mod vertex;

pub use attachment::{
    RgAttachmentData, RgAttachmentDataEntry, RgAttachmentDataTable, RgAttachmentProvider, get_attachment_descriptions,
    get_attachment_references, get_image_views, get_input_attachment_references,
};
pub use descriptor::{
    RgDescriptorBufferEntry, RgDescriptorImageEntry, RgDescriptorUpdater, RgDescriptorWriteInfoProvider,
    RgDescriptorWriteInfoTable, get_layout, write_descriptors,
};
pub use vertex::{get_vertex_attributes, get_vertex_bindings};
