pub mod pipeline;
pub mod render_pass;
pub mod shader_module;
