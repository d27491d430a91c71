pub trait WindowDimensions {
    /// Window width
    fn width(&self) -> u32;
    /// Window height
    fn height(&self) -> u32;
}

#[cfg(feature = "winit")]
impl WindowDimensions for winit::window::Window {
    fn width(&self) -> u32 {
        self.inner_size().width
    }

    fn height(&self) -> u32 {
        self.inner_size().height
    }
}
