pub mod descriptor_pool;
pub mod write_descriptor_set;
