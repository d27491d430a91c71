use std::path::{Path, PathBuf};
use std::time::Duration;

use kgal::ash::vk;
use kgal::descriptor::PoolSizeRatio;

/// Top and bottom colours of the compute gradient drawn behind the geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundColors {
    pub top: glam::Vec4,
    pub bottom: glam::Vec4,
}

impl Default for BackgroundColors {
    fn default() -> Self {
        Self {
            top: glam::Vec4::new(1.0, 0.0, 0.0, 1.0),
            bottom: glam::Vec4::new(0.0, 0.0, 1.0, 1.0),
        }
    }
}

/// Everything the engine reads at start up
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub title: String,
    pub extent: vk::Extent2D,
    pub resizable: bool,
    /// Enables the Khronos validation layer and the debug messenger
    pub validation: bool,
    pub vulkan_version: (u32, u32, u32),
    /// Directory holding the precompiled `.spv` shaders
    pub shader_dir: PathBuf,
    /// glTF file uploaded at init. [`None`] starts with an empty scene.
    pub mesh_path: Option<PathBuf>,
    pub descriptor_sets_per_pool: u32,
    pub descriptor_ratios: Vec<PoolSizeRatio>,
    pub background: BackgroundColors,
    pub log_level: tracing::Level,
    /// How long the loop sleeps between event polls while rendering is suspended
    pub suspend_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: String::from("KEngine"),
            extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            resizable: true,
            validation: cfg!(debug_assertions),
            vulkan_version: (1, 3, 0),
            shader_dir: PathBuf::from("shaders"),
            mesh_path: Some(PathBuf::from("assets/basicmesh.glb")),
            descriptor_sets_per_pool: 10,
            descriptor_ratios: vec![PoolSizeRatio::default()
                .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                .ratio(1.0)],
            background: BackgroundColors::default(),
            log_level: tracing::Level::INFO,
            suspend_poll_interval: Duration::from_millis(100),
        }
    }
}

impl EngineConfig {
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn with_extent(mut self, width: u32, height: u32) -> Self {
        self.extent = vk::Extent2D { width, height };
        self
    }

    pub fn with_resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_vulkan_version(mut self, version: (u32, u32, u32)) -> Self {
        self.vulkan_version = version;
        self
    }

    pub fn with_shader_dir(mut self, shader_dir: impl AsRef<Path>) -> Self {
        self.shader_dir = shader_dir.as_ref().to_path_buf();
        self
    }

    pub fn with_mesh_path(mut self, mesh_path: Option<PathBuf>) -> Self {
        self.mesh_path = mesh_path;
        self
    }

    pub fn with_descriptor_sets_per_pool(mut self, sets: u32) -> Self {
        self.descriptor_sets_per_pool = sets;
        self
    }

    pub fn with_descriptor_ratios(mut self, ratios: &[PoolSizeRatio]) -> Self {
        self.descriptor_ratios = ratios.to_vec();
        self
    }

    pub fn with_background(mut self, background: BackgroundColors) -> Self {
        self.background = background;
        self
    }

    pub fn with_log_level(mut self, level: tracing::Level) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_suspend_poll_interval(mut self, interval: Duration) -> Self {
        self.suspend_poll_interval = interval;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_describe_a_720p_window() {
        let config = EngineConfig::default();
        assert_eq!(config.title, "KEngine");
        assert_eq!(
            config.extent,
            vk::Extent2D {
                width: 1280,
                height: 720
            }
        );
        assert_eq!(config.vulkan_version, (1, 3, 0));
        assert_eq!(config.descriptor_sets_per_pool, 10);
        assert_eq!(config.descriptor_ratios.len(), 1);
        assert_eq!(
            config.descriptor_ratios[0].descriptor_type,
            vk::DescriptorType::STORAGE_IMAGE
        );
        assert_eq!(config.suspend_poll_interval, Duration::from_millis(100));
        assert_eq!(config.log_level, tracing::Level::INFO);
    }

    #[test]
    fn setters_override_fields() {
        let config = EngineConfig::default()
            .with_title("viewer")
            .with_extent(640, 480)
            .with_validation(false)
            .with_mesh_path(None)
            .with_shader_dir("compiled");
        assert_eq!(config.title, "viewer");
        assert_eq!(config.extent.width, 640);
        assert_eq!(config.extent.height, 480);
        assert!(!config.validation);
        assert!(config.mesh_path.is_none());
        assert_eq!(config.shader_dir, PathBuf::from("compiled"));
    }
}
