use ash::vk;

use crate::traits::Destructible;

pub trait Pipeline: Destructible {
    /// Where the pipeline binds on a command buffer
    const BIND_POINT: vk::PipelineBindPoint;

    fn handle(&self) -> vk::Pipeline;
}

/// Entry point every shader stage is expected to export
pub(crate) const SHADER_ENTRY: &std::ffi::CStr = c"main";
