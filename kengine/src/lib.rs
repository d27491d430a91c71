pub mod choreography;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod gltf_loader;
pub mod mesh;
pub mod passes;
pub mod renderer;
pub mod shaders;
pub mod window;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use renderer::{Renderer, RendererCreateInfo};
