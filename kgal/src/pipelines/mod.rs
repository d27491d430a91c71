pub use compute::{ComputePipeline, ComputePipelineBuilder};
pub use graphics::{GraphicsPipeline, GraphicsPipelineBuilder};
pub use pipeline_layout::PipelineLayout;
pub use pipeline_layout_builder::PipelineLayoutBuilder;
pub use traits::*;

pub mod compute;
pub mod graphics;
mod pipeline_layout;
pub mod pipeline_layout_builder;
pub mod traits;
