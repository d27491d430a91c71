use std::time::Duration;

use anyhow::Result;
use derivative::Derivative;
use kgal::allocators::{Allocator, GpuAllocator};
use kgal::ash;
use kgal::ash::vk;
use kgal::bootstrap::{
    InstanceBuilder, LogicalDeviceBuilder, PhysicalDeviceSelector, RequiredFeatures,
    SwapchainBuilder,
};
use kgal::device::{DebugMessenger, Device};
use kgal::raw_window_handle::HasDisplayHandle;
use kgal::traits::Destructible;
use kgal::util::DeletionQueue;
use kgal::wsi::Surface;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::gltf_loader::load_gltf_meshes;
use crate::renderer::{Renderer, RendererCreateInfo};
use crate::shaders::ShaderDirectory;
use crate::window::{EngineEvent, EventSource, WinitWindow};

/// Polls `events` and draws with `renderer` until a quit is requested.
///
/// While the window is minimized nothing is acquired, submitted or presented and the loop sleeps
/// for `poll_interval` between polls.
pub fn run_loop<D: Device, A: Allocator, E: EventSource>(
    renderer: &mut Renderer<D, A>,
    events: &mut E,
    poll_interval: Duration,
) -> Result<()> {
    let mut suspended = false;
    loop {
        for event in events.poll_events() {
            match event {
                EngineEvent::Quit => {
                    info!("Quit requested after {} frames", renderer.frame_number());
                    return Ok(());
                }
                EngineEvent::Minimized => {
                    if !suspended {
                        info!("Window minimized, suspending rendering");
                    }
                    suspended = true;
                }
                EngineEvent::Restored => {
                    if suspended {
                        info!("Window restored, resuming rendering");
                    }
                    suspended = false;
                }
            }
        }
        if suspended {
            std::thread::sleep(poll_interval);
            continue;
        }
        renderer.draw()?;
    }
}

struct EngineContext {
    window: WinitWindow,
    renderer: Renderer,
    /// Instance level objects, released after the renderer
    deletion_queue: DeletionQueue<'static>,
}

/// Owns the window and every GPU object. Construct one, [`Engine::init`] it once, then
/// [`Engine::run`] it.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Engine {
    config: EngineConfig,
    initialized: bool,
    #[derivative(Debug = "ignore")]
    context: Option<EngineContext>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            initialized: false,
            context: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Opens the window, stands up Vulkan and uploads the configured meshes.
    ///
    /// May only be called once per engine, even after [`Engine::cleanup`].
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Err(EngineError::AlreadyInitialized.into());
        }
        self.initialized = true;

        let window = WinitWindow::new(&self.config)?;
        let mut deletion_queue = DeletionQueue::new();
        match Self::create_renderer(&self.config, &window, &mut deletion_queue) {
            Ok(renderer) => {
                self.context = Some(EngineContext {
                    window,
                    renderer,
                    deletion_queue,
                });
                info!("Engine initialized");
                Ok(())
            }
            Err(e) => {
                deletion_queue.flush();
                Err(e)
            }
        }
    }

    fn create_renderer(
        config: &EngineConfig,
        window: &WinitWindow,
        deletion_queue: &mut DeletionQueue<'static>,
    ) -> Result<Renderer> {
        let entry = unsafe { ash::Entry::load()? };
        let instance = InstanceBuilder::new()
            .set_validation(config.validation)
            .set_vulkan_version(config.vulkan_version)
            .set_application_name(&config.title)?
            .set_engine_name("KEngine")?
            .add_window_extensions(window.window().display_handle()?.as_raw())?
            .build(entry)?;
        deletion_queue.push_resource(&instance);

        if config.validation {
            let messenger = DebugMessenger::new(instance.get_entry(), instance.get_instance())?;
            deletion_queue.push_resource(&messenger);
        }

        let mut surface =
            Surface::new(instance.get_entry(), instance.get_instance(), window.window())?;
        deletion_queue.push_resource(&surface);

        let selected = PhysicalDeviceSelector::default()
            .set_minimum_vulkan_version(config.vulkan_version)
            .add_required_extension(ash::khr::swapchain::NAME)
            .set_required_features(RequiredFeatures {
                dynamic_rendering: true,
                synchronization2: true,
                buffer_device_address: true,
                descriptor_indexing: true,
            })
            .select(instance.get_instance(), &surface)?;
        let physical_device = selected.handle.handle();
        info!("Using physical device {}", selected.handle.name());
        surface.query_details(physical_device)?;

        let (device, queue) = LogicalDeviceBuilder::from(selected).build(instance.get_instance())?;
        deletion_queue.push_resource(&device);
        let allocator = GpuAllocator::new(instance.get_instance(), &device, physical_device, true)?;
        deletion_queue.push_resource(&allocator);

        let swapchain = SwapchainBuilder::new(&surface)?
            .request_image_format(vk::Format::B8G8R8A8_UNORM)
            .request_color_space(vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .request_present_mode(vk::PresentModeKHR::FIFO)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .set_extent(window.extent())
            .build(device.clone())?;

        let shaders = ShaderDirectory::new(&config.shader_dir);
        let mut renderer = Renderer::new(RendererCreateInfo {
            device,
            allocator,
            queue,
            swapchain,
            draw_extent: window.extent(),
            shaders: &shaders,
            background: config.background,
            descriptor_sets_per_pool: config.descriptor_sets_per_pool,
            descriptor_ratios: &config.descriptor_ratios,
        })?;

        if let Some(path) = config.mesh_path.as_ref() {
            let uploaded = load_gltf_meshes(path).and_then(|meshes| renderer.upload_meshes(meshes));
            if let Err(e) = uploaded {
                renderer.destroy();
                return Err(e);
            }
        }
        Ok(renderer)
    }

    /// Runs the main loop until the window is closed
    pub fn run(&mut self) -> Result<()> {
        let poll_interval = self.config.suspend_poll_interval;
        let context = self.context.as_mut().ok_or(EngineError::NotInitialized)?;
        run_loop(&mut context.renderer, &mut context.window, poll_interval)
    }

    /// Draws a single frame
    pub fn draw(&mut self) -> Result<()> {
        let context = self.context.as_mut().ok_or(EngineError::NotInitialized)?;
        context.renderer.draw()
    }

    /// Waits for the GPU and releases everything [`Engine::init`] created. Safe to call more
    /// than once.
    pub fn cleanup(&mut self) {
        let Some(mut context) = self.context.take() else {
            return;
        };
        context.renderer.destroy();
        context.deletion_queue.flush();
        info!("Engine shut down");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.context.is_some() {
            warn!("Engine dropped without cleanup");
            self.cleanup();
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;
    use std::time::Instant;

    use kgal::testing::{DeviceCall, TestDevice};

    use super::*;
    use crate::renderer::test::test_renderer;

    /// Plays back fixed batches of events, then asks to quit
    struct ScriptedEvents {
        batches: VecDeque<Vec<EngineEvent>>,
    }

    impl ScriptedEvents {
        fn new(batches: Vec<Vec<EngineEvent>>) -> Self {
            Self {
                batches: batches.into(),
            }
        }
    }

    impl EventSource for ScriptedEvents {
        fn poll_events(&mut self) -> Vec<EngineEvent> {
            self.batches
                .pop_front()
                .unwrap_or_else(|| vec![EngineEvent::Quit])
        }
    }

    fn frame_calls(device: &TestDevice) -> usize {
        device.count_calls(|call| {
            matches!(
                call,
                DeviceCall::AcquireNextImage { .. }
                    | DeviceCall::QueueSubmit { .. }
                    | DeviceCall::QueuePresent { .. }
            )
        })
    }

    #[test]
    fn minimized_windows_are_not_drawn() {
        let device = TestDevice::new();
        let mut renderer = test_renderer(&device).unwrap();
        device.clear_calls();
        let mut events = ScriptedEvents::new(vec![vec![EngineEvent::Minimized], vec![], vec![]]);

        let interval = EngineConfig::default().suspend_poll_interval;
        let started = Instant::now();
        run_loop(&mut renderer, &mut events, interval).unwrap();

        assert_eq!(frame_calls(&device), 0);
        assert!(started.elapsed() >= interval * 3);
        assert_eq!(renderer.frame_number(), 0);
        renderer.destroy();
    }

    #[test]
    fn drawing_resumes_after_restore() {
        let device = TestDevice::new();
        let mut renderer = test_renderer(&device).unwrap();
        let mut events = ScriptedEvents::new(vec![
            vec![],
            vec![EngineEvent::Minimized],
            vec![EngineEvent::Restored],
            vec![],
        ]);

        run_loop(&mut renderer, &mut events, Duration::from_millis(1)).unwrap();

        // one frame before minimizing, two after restoring
        assert_eq!(renderer.frame_number(), 3);
        assert_eq!(
            device.count_calls(|call| matches!(call, DeviceCall::QueuePresent { .. })),
            3
        );
        renderer.destroy();
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn uninitialized_engines_refuse_to_draw() {
        let mut engine = Engine::new(EngineConfig::default());
        for result in [engine.draw(), engine.run()] {
            assert!(matches!(
                result.unwrap_err().downcast_ref::<EngineError>(),
                Some(EngineError::NotInitialized)
            ));
        }
        // nothing to release
        engine.cleanup();
    }

    #[test]
    fn second_init_is_rejected() {
        let mut engine = Engine::new(EngineConfig::default());
        engine.initialized = true;
        assert!(matches!(
            engine.init().unwrap_err().downcast_ref::<EngineError>(),
            Some(EngineError::AlreadyInitialized)
        ));
    }
}
