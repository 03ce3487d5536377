pub mod command_buffer;
pub mod event;
pub mod fence;
pub mod one_time;
pub mod semaphore;
pub mod submit_info;
