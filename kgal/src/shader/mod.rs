pub use shader::Shader;

pub mod shader;
