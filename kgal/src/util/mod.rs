/// Utility types commonly used
pub mod deletion_queue;
pub use deletion_queue::DeletionQueue;
pub mod immediate_submit;
pub use immediate_submit::ImmediateSubmit;
