use std::sync::PoisonError;

use ash::vk;
/// Possible errors
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KgalError {
    #[error("No suitable physical device has been found")]
    NoSuitablePhysicalDevice,

    #[error("No queue family supports both graphics and presentation")]
    NoSuitableQueueFamily,

    #[error("Surface does not expose any usable format")]
    UnsupportedSurfaceFormat,

    #[error("Poisoned mutex")]
    PoisonError,

    #[error("Vulkan resource does not have a mapped pointer. You're most likely using GPU only")]
    NoMappedPointer,

    #[error("Insufficient space to upload the data: {required} bytes into {available}")]
    InsufficientSpace {
        required: vk::DeviceSize,
        available: vk::DeviceSize,
    },

    #[error("Expected buffer to have vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS")]
    NoShaderDeviceAddress,

    #[error("Shader code is not valid SPIR-V")]
    InvalidShaderCode,

    #[error("Allocator has already been destroyed")]
    AllocatorDestroyed,

    #[error("Allocation error: {0}")]
    Allocation(String),

    #[error("String contains null byte")]
    StringContainsNull,

    #[error("{operation} failed with {result}")]
    GpuOperationFailed {
        operation: &'static str,
        result: vk::Result,
    },

    #[error(transparent)]
    VkError(#[from] vk::Result),
}

impl<T> From<PoisonError<T>> for KgalError {
    fn from(_: PoisonError<T>) -> Self {
        KgalError::PoisonError
    }
}

/// Attaches the name of the failing API call to a [`vk::Result`]
pub trait GpuResultExt<T> {
    fn gpu_op(self, operation: &'static str) -> Result<T, KgalError>;
}

impl<T> GpuResultExt<T> for ash::prelude::VkResult<T> {
    fn gpu_op(self, operation: &'static str) -> Result<T, KgalError> {
        self.map_err(|result| KgalError::GpuOperationFailed { operation, result })
    }
}
