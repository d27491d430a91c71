pub use instance::Instance;

pub mod instance;
