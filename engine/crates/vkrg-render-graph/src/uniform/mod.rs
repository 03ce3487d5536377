//! 从 shader 反射数据自动创建 graph 资源
//!
//! - [`reflection`]：为 buffer object 创建 buffer，按名字暂存数据并在每帧写入
//! - [`buffer_data`]：按照反射布局读写暂存的数据
//! - [`image_map`]：为没有连接的 sampler 创建占位图像

pub mod buffer_data;
pub mod image_map;
pub mod reflection;

pub use buffer_data::{RgBufferData, RgBufferView};
pub use image_map::{RgImageExtentProvider, RgImageMap, create_empty_image_resources, create_empty_image_resources_with};
pub use reflection::{
    RgBufferObjectConnection, RgBufferObjectSelector, RgBufferResourceCreator, RgShaderKindSelector, UniformReflection,
    default_resource_creator, gpu_buffer_resource_creator,
};
