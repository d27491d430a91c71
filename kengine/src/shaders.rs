use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::error::EngineError;

pub const GRADIENT_SHADER: &str = "gradient.comp";
pub const MESH_VERTEX_SHADER: &str = "colored_triangle_mesh.vert";
pub const MESH_FRAGMENT_SHADER: &str = "colored_triangle.frag";

/// Somewhere precompiled SPIR-V can be looked up by shader name
pub trait ShaderSource {
    /// SPIR-V bytes of the shader `name`, e.g. `"gradient.comp"`
    fn load(&self, name: &str) -> Result<Vec<u8>>;
}

/// Reads `<dir>/<name>.spv` from disk
#[derive(Debug, Clone)]
pub struct ShaderDirectory {
    dir: PathBuf,
}

impl ShaderDirectory {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.spv"))
    }
}

impl ShaderSource for ShaderDirectory {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_of(name);
        let words = std::fs::read(&path)
            .and_then(|bytes| kgal::ash::util::read_spv(&mut Cursor::new(bytes)))
            .map_err(|source| EngineError::ShaderLoad {
                path: path.clone(),
                source,
            })?;
        debug!("Loaded shader {}", path.display());
        Ok(bytemuck::cast_slice(&words).to_vec())
    }
}

/// Shaders held in memory, keyed by name
#[derive(Debug, Clone, Default)]
pub struct InMemoryShaders {
    shaders: HashMap<String, Vec<u8>>,
}

impl InMemoryShaders {
    pub fn insert(mut self, name: &str, code: Vec<u8>) -> Self {
        self.shaders.insert(name.to_string(), code);
        self
    }
}

impl ShaderSource for InMemoryShaders {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        self.shaders.get(name).cloned().ok_or_else(|| {
            EngineError::ShaderLoad {
                path: PathBuf::from(name),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such shader"),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("kengine-shaders-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn reads_word_aligned_spirv() {
        let dir = scratch_dir("aligned");
        // SPIR-V magic followed by one word
        let code: Vec<u8> = [0x0723_0203u32, 0x0001_0000]
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .collect();
        std::fs::write(dir.join("gradient.comp.spv"), &code).unwrap();

        let loaded = ShaderDirectory::new(&dir).load(GRADIENT_SHADER).unwrap();
        assert_eq!(loaded, code);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn misaligned_files_are_rejected() {
        let dir = scratch_dir("misaligned");
        std::fs::write(dir.join("broken.spv"), [0u8; 6]).unwrap();

        let err = ShaderDirectory::new(&dir).load("broken").unwrap_err();
        match err.downcast_ref::<EngineError>() {
            Some(EngineError::ShaderLoad { path, .. }) => assert_eq!(path, &dir.join("broken.spv")),
            other => panic!("unexpected error {other:?}"),
        }
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_files_name_the_path() {
        let source = ShaderDirectory::new("no/such/dir");
        let err = source.load(MESH_VERTEX_SHADER).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::ShaderLoad { .. })
        ));
        assert!(err.to_string().contains("colored_triangle_mesh.vert.spv"));
    }

    #[test]
    fn in_memory_lookup() {
        let shaders = InMemoryShaders::default().insert(MESH_FRAGMENT_SHADER, vec![0; 8]);
        assert_eq!(shaders.load(MESH_FRAGMENT_SHADER).unwrap(), vec![0; 8]);
        assert!(shaders.load(GRADIENT_SHADER).is_err());
    }
}
