use std::path::PathBuf;

use kgal::ash::vk;
use kgal::KgalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine has already been initialized")]
    AlreadyInitialized,

    #[error("Engine has not been initialized")]
    NotInitialized,

    #[error("{operation} failed with {result}")]
    GpuOperationFailed {
        operation: &'static str,
        result: vk::Result,
    },

    #[error("Failed to load {path:?}")]
    AssetLoad {
        path: PathBuf,
        #[source]
        source: gltf::Error,
    },

    #[error("Mesh {mesh} has a primitive without indices")]
    MissingIndices { mesh: String },

    #[error("Mesh {mesh} has a primitive without positions")]
    MissingPositions { mesh: String },

    #[error("Mesh {mesh} has no vertices or no indices")]
    EmptyMesh { mesh: String },

    #[error("Failed to load shader {path:?}")]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Window error: {0}")]
    Window(String),
}

impl EngineError {
    /// Surfaces a failed GPU call found anywhere in `error`'s chain as
    /// [`EngineError::GpuOperationFailed`]. Other errors pass through untouched.
    pub fn lift_gpu_failure(error: anyhow::Error) -> anyhow::Error {
        let failed = error
            .chain()
            .find_map(|cause| match cause.downcast_ref::<KgalError>() {
                Some(KgalError::GpuOperationFailed { operation, result }) => {
                    Some((*operation, *result))
                }
                _ => None,
            });
        match failed {
            Some((operation, result)) => {
                EngineError::GpuOperationFailed { operation, result }.into()
            }
            None => error,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gpu_failures_are_lifted() {
        let error = anyhow::Error::new(KgalError::GpuOperationFailed {
            operation: "vkQueueSubmit2",
            result: vk::Result::ERROR_DEVICE_LOST,
        });
        let lifted = EngineError::lift_gpu_failure(error);
        assert!(matches!(
            lifted.downcast_ref::<EngineError>(),
            Some(EngineError::GpuOperationFailed {
                operation: "vkQueueSubmit2",
                result: vk::Result::ERROR_DEVICE_LOST,
            })
        ));
    }

    #[test]
    fn other_errors_pass_through() {
        let lifted = EngineError::lift_gpu_failure(EngineError::NotInitialized.into());
        assert!(matches!(
            lifted.downcast_ref::<EngineError>(),
            Some(EngineError::NotInitialized)
        ));
    }
}
