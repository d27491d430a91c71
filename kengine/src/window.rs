use std::time::Duration;

use anyhow::Result;
use derivative::Derivative;
use kgal::ash::vk;
use kgal::winit;
use kgal::winit::application::ApplicationHandler;
use kgal::winit::event::WindowEvent;
use kgal::winit::event_loop::{ActiveEventLoop, EventLoop};
use kgal::winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use kgal::winit::window::{Window, WindowAttributes, WindowId};
use kgal::wsi::WindowDimensions;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::EngineError;

/// What the main loop cares about from the windowing system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    Quit,
    /// The window can no longer be drawn to
    Minimized,
    Restored,
}

/// Anything that can be polled for [`EngineEvent`]s without blocking
pub trait EventSource {
    /// Events received since the last call, oldest first
    fn poll_events(&mut self) -> Vec<EngineEvent>;
}

struct WindowApp {
    attributes: WindowAttributes,
    window: Option<Window>,
    created: bool,
    events: Vec<EngineEvent>,
    error: Option<String>,
}

impl ApplicationHandler for WindowApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.created {
            return;
        }
        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                self.window = Some(window);
                self.created = true;
            }
            Err(e) => {
                self.error = Some(e.to_string());
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(event) = translate(&event) {
            debug!("Window event {:?}", event);
            self.events.push(event);
        }
    }
}

fn translate(event: &WindowEvent) -> Option<EngineEvent> {
    match event {
        WindowEvent::CloseRequested => Some(EngineEvent::Quit),
        // prevent 0,0
        WindowEvent::Resized(size) if size.width == 0 || size.height == 0 => {
            Some(EngineEvent::Minimized)
        }
        WindowEvent::Resized(_) => Some(EngineEvent::Restored),
        WindowEvent::Occluded(true) => Some(EngineEvent::Minimized),
        WindowEvent::Occluded(false) => Some(EngineEvent::Restored),
        _ => None,
    }
}

/// A winit window whose event loop is pumped by the engine instead of owning the thread
#[derive(Derivative)]
#[derivative(Debug)]
pub struct WinitWindow {
    #[derivative(Debug = "ignore")]
    event_loop: EventLoop<()>,
    #[derivative(Debug = "ignore")]
    app: WindowApp,
    window: Window,
}

impl WinitWindow {
    /// Opens the window described by `config`, pumping the event loop until it exists
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let mut event_loop = EventLoop::new().map_err(|e| EngineError::Window(e.to_string()))?;
        let mut app = WindowApp {
            attributes: WindowAttributes::default()
                .with_title(config.title.clone())
                .with_inner_size(winit::dpi::PhysicalSize::new(
                    config.extent.width,
                    config.extent.height,
                ))
                .with_resizable(config.resizable),
            window: None,
            created: false,
            events: Vec::new(),
            error: None,
        };
        let window = loop {
            let status = event_loop.pump_app_events(Some(Duration::ZERO), &mut app);
            if let Some(error) = app.error.take() {
                return Err(EngineError::Window(error).into());
            }
            if let Some(window) = app.window.take() {
                break window;
            }
            if let PumpStatus::Exit(code) = status {
                return Err(EngineError::Window(format!(
                    "Event loop exited with {code} before a window was created"
                ))
                .into());
            }
        };
        info!("Opened window {:?} ({}x{})", config.title, window.width(), window.height());
        Ok(Self {
            event_loop,
            app,
            window,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Current drawable size of the window
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.window.width(),
            height: self.window.height(),
        }
    }
}

impl EventSource for WinitWindow {
    fn poll_events(&mut self) -> Vec<EngineEvent> {
        let status = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut self.app);
        if let PumpStatus::Exit(_) = status {
            self.app.events.push(EngineEvent::Quit);
        }
        std::mem::take(&mut self.app.events)
    }
}

#[cfg(test)]
mod test {
    use winit::dpi::PhysicalSize;

    use super::*;

    #[test]
    fn zero_sized_windows_are_minimized() {
        assert_eq!(
            translate(&WindowEvent::Resized(PhysicalSize::new(0, 0))),
            Some(EngineEvent::Minimized)
        );
        assert_eq!(
            translate(&WindowEvent::Resized(PhysicalSize::new(1280, 0))),
            Some(EngineEvent::Minimized)
        );
        assert_eq!(
            translate(&WindowEvent::Resized(PhysicalSize::new(800, 600))),
            Some(EngineEvent::Restored)
        );
    }

    #[test]
    fn occlusion_and_close() {
        assert_eq!(translate(&WindowEvent::Occluded(true)), Some(EngineEvent::Minimized));
        assert_eq!(translate(&WindowEvent::Occluded(false)), Some(EngineEvent::Restored));
        assert_eq!(translate(&WindowEvent::CloseRequested), Some(EngineEvent::Quit));
        assert_eq!(translate(&WindowEvent::Focused(true)), None);
    }
}
