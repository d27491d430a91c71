pub use command_buffer::*;
pub use command_pool::CommandPool;
pub use dynamic_render::DynamicRenderContext;

pub mod command_buffer;
pub mod command_pool;
pub mod dynamic_render;
