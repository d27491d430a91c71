pub use background::{BackgroundPass, GradientPushConstants};
pub use geometry::{camera_matrix, DrawPushConstants, GeometryPass};

pub mod background;
pub mod geometry;
