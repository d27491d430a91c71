use anyhow::Result;
use kgal::allocators::{Allocator, GpuAllocator, MemoryLocation};
use kgal::ash::vk;
use kgal::command::CommandBufferRecording;
use kgal::descriptor::{DescriptorAllocator, PoolSizeRatio};
use kgal::device::{Device, LogicalDevice, Queue};
use kgal::resource::{blit_image, Image, ImageCreateInfo, LayoutTracked, Resource};
use kgal::sync::BinarySemaphore;
use kgal::traits::Destructible;
use kgal::util::{DeletionQueue, ImmediateSubmit};
use kgal::wsi::Swapchain;
use tracing::{debug, error, info, warn};

use crate::choreography::{FrameImage, FramePass, FrameStep, FRAME_SCRIPT};
use crate::config::BackgroundColors;
use crate::error::EngineError;
use crate::frame::{slot_for, FrameContext, FRAME_OVERLAP};
use crate::mesh::{MeshAsset, MeshData, MeshUploader};
use crate::passes::{BackgroundPass, GeometryPass};
use crate::shaders::{ShaderSource, GRADIENT_SHADER, MESH_FRAGMENT_SHADER, MESH_VERTEX_SHADER};

pub const DRAW_IMAGE_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const DEPTH_IMAGE_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Everything a [`Renderer`] is built from. The renderer takes ownership of the swapchain.
pub struct RendererCreateInfo<'a, D: Device = LogicalDevice, A: Allocator = GpuAllocator> {
    pub device: D,
    pub allocator: A,
    pub queue: Queue,
    pub swapchain: Swapchain<D>,
    /// Size of the offscreen draw and depth targets
    pub draw_extent: vk::Extent2D,
    pub shaders: &'a dyn ShaderSource,
    pub background: BackgroundColors,
    pub descriptor_sets_per_pool: u32,
    pub descriptor_ratios: &'a [PoolSizeRatio],
}

/// Records, submits and presents frames.
///
/// Each frame draws the compute gradient and every uploaded mesh into an offscreen target, then
/// blits it into the acquired swapchain image. Up to [`FRAME_OVERLAP`] frames are in flight.
#[derive(Debug)]
pub struct Renderer<D: Device = LogicalDevice, A: Allocator = GpuAllocator> {
    device: D,
    allocator: A,
    queue: Queue,
    swapchain: Swapchain<D>,
    /// Signalled when rendering into the swapchain image of the same index finished
    render_semaphores: Vec<BinarySemaphore<D>>,
    frames: Vec<FrameContext<D>>,
    frame_number: u64,
    draw_image: Image<D, A>,
    depth_image: Image<D, A>,
    descriptors: DescriptorAllocator<D>,
    background: BackgroundPass<D>,
    geometry: GeometryPass<D>,
    immediate: ImmediateSubmit<D>,
    meshes: Vec<MeshAsset<D, A>>,
    draw_filter: Option<usize>,
    deletion_queue: DeletionQueue<'static>,
}

struct RendererResources<D: Device, A: Allocator> {
    render_semaphores: Vec<BinarySemaphore<D>>,
    draw_image: Image<D, A>,
    depth_image: Image<D, A>,
    background: BackgroundPass<D>,
    geometry: GeometryPass<D>,
    immediate: ImmediateSubmit<D>,
}

impl<D: Device, A: Allocator> Renderer<D, A> {
    pub fn new(create_info: RendererCreateInfo<'_, D, A>) -> Result<Self> {
        let RendererCreateInfo {
            device,
            mut allocator,
            queue,
            mut swapchain,
            draw_extent,
            shaders,
            background,
            descriptor_sets_per_pool,
            descriptor_ratios,
        } = create_info;

        let descriptors = DescriptorAllocator::new(
            device.clone(),
            descriptor_sets_per_pool,
            descriptor_ratios,
        );
        let mut descriptors = match descriptors {
            Ok(descriptors) => descriptors,
            Err(e) => {
                swapchain.destroy();
                return Err(e);
            }
        };
        let mut deletion_queue = DeletionQueue::new();
        let mut frames = Vec::with_capacity(FRAME_OVERLAP);
        let resources = Self::create_resources(
            &device,
            &mut allocator,
            queue,
            swapchain.image_count(),
            draw_extent,
            shaders,
            background,
            &mut descriptors,
            &mut frames,
            &mut deletion_queue,
        );
        let resources = match resources {
            Ok(resources) => resources,
            Err(e) => {
                deletion_queue.flush();
                frames.iter_mut().for_each(|frame| frame.destroy());
                descriptors.destroy();
                swapchain.destroy();
                return Err(e);
            }
        };
        info!(
            "Renderer ready: {}x{} draw target, {} swapchain images",
            draw_extent.width,
            draw_extent.height,
            swapchain.image_count()
        );
        Ok(Self {
            device,
            allocator,
            queue,
            swapchain,
            render_semaphores: resources.render_semaphores,
            frames,
            frame_number: 0,
            draw_image: resources.draw_image,
            depth_image: resources.depth_image,
            descriptors,
            background: resources.background,
            geometry: resources.geometry,
            immediate: resources.immediate,
            meshes: Vec::new(),
            draw_filter: None,
            deletion_queue,
        })
    }

    /// Creates everything that outlives a single frame. Whatever was created before a failure
    /// is left in `frames` and `deletion_queue` for the caller to release.
    #[allow(clippy::too_many_arguments)]
    fn create_resources(
        device: &D,
        allocator: &mut A,
        queue: Queue,
        swapchain_image_count: usize,
        draw_extent: vk::Extent2D,
        shaders: &dyn ShaderSource,
        background: BackgroundColors,
        descriptors: &mut DescriptorAllocator<D>,
        frames: &mut Vec<FrameContext<D>>,
        deletion_queue: &mut DeletionQueue<'static>,
    ) -> Result<RendererResources<D, A>> {
        for _ in 0..FRAME_OVERLAP {
            frames.push(FrameContext::new(device.clone(), queue.get_family_index())?);
        }
        let mut render_semaphores = Vec::with_capacity(swapchain_image_count);
        for _ in 0..swapchain_image_count {
            let semaphore = BinarySemaphore::new(device.clone())?;
            deletion_queue.push_resource(&semaphore);
            render_semaphores.push(semaphore);
        }

        let extent = vk::Extent3D {
            width: draw_extent.width,
            height: draw_extent.height,
            depth: 1,
        };
        let draw_image = Image::new(ImageCreateInfo::NewAllocated {
            device: device.clone(),
            allocator: &mut *allocator,
            format: DRAW_IMAGE_FORMAT,
            extent,
            usage_flags: vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST,
            aspect: vk::ImageAspectFlags::COLOR,
            location: MemoryLocation::GpuOnly,
            name: "draw image",
        })?;
        deletion_queue.push_resource(&draw_image);
        let depth_image = Image::new(ImageCreateInfo::NewAllocated {
            device: device.clone(),
            allocator: &mut *allocator,
            format: DEPTH_IMAGE_FORMAT,
            extent,
            usage_flags: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH,
            location: MemoryLocation::GpuOnly,
            name: "depth image",
        })?;
        deletion_queue.push_resource(&depth_image);

        let background = BackgroundPass::new(
            device.clone(),
            descriptors,
            draw_image.view(),
            &shaders.load(GRADIENT_SHADER)?,
            background,
        )?;
        deletion_queue.push_resource(&background);
        let geometry = GeometryPass::new(
            device.clone(),
            &shaders.load(MESH_VERTEX_SHADER)?,
            &shaders.load(MESH_FRAGMENT_SHADER)?,
            DRAW_IMAGE_FORMAT,
            DEPTH_IMAGE_FORMAT,
        )?;
        deletion_queue.push_resource(&geometry);

        let immediate = ImmediateSubmit::new(device.clone(), queue)?;
        Ok(RendererResources {
            render_semaphores,
            draw_image,
            depth_image,
            background,
            geometry,
            immediate,
        })
    }

    /// Uploads `meshes` and adds them to the drawn set
    pub fn upload_meshes(&mut self, meshes: Vec<MeshData>) -> Result<()> {
        let mut uploader =
            MeshUploader::new(self.device.clone(), &mut self.allocator, &self.immediate);
        for mesh in meshes {
            let asset = uploader.upload(mesh)?;
            self.deletion_queue.push_resource(&asset);
            self.meshes.push(asset);
        }
        info!("{} meshes resident", self.meshes.len());
        Ok(())
    }

    /// Restricts drawing to the mesh at `index`. [`None`] draws every mesh.
    pub fn set_draw_filter(&mut self, index: Option<usize>) {
        self.draw_filter = index;
    }

    pub fn meshes(&self) -> &[MeshAsset<D, A>] {
        &self.meshes
    }

    /// Frames presented so far
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn swapchain(&self) -> &Swapchain<D> {
        &self.swapchain
    }

    /// Records, submits and presents one frame. A failed GPU call is reported as
    /// [`EngineError::GpuOperationFailed`].
    pub fn draw(&mut self) -> Result<()> {
        self.draw_frame().map_err(EngineError::lift_gpu_failure)
    }

    fn draw_frame(&mut self) -> Result<()> {
        let slot = slot_for(self.frame_number);
        debug!("Drawing frame {} in slot {}", self.frame_number, slot);

        let frame = &mut self.frames[slot];
        frame.wait_for_slot()?;
        let command_buffer = frame.command_buffer().clone();
        let render_fence = frame.render_fence().handle();
        let acquire_semaphore = frame.swapchain_semaphore().handle();
        let wait_info = frame
            .swapchain_semaphore()
            .submit_info(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);

        let (image_index, suboptimal) = self
            .swapchain
            .next_image_index(u64::MAX, acquire_semaphore)?;
        if suboptimal {
            warn!("Acquired image {image_index} from a suboptimal swapchain");
        }
        let render_semaphore = self
            .render_semaphores
            .get(image_index as usize)
            .ok_or_else(|| {
                anyhow::anyhow!("Swapchain returned unknown image index {image_index}")
            })?;
        let signal_info = render_semaphore.submit_info(vk::PipelineStageFlags2::ALL_GRAPHICS);
        let render_semaphore = render_semaphore.handle();

        command_buffer.reset()?;
        let cmd = command_buffer.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        self.record_frame(&cmd, image_index)?;
        cmd.end()?
            .submit(self.queue.handle(), &[wait_info], &[signal_info], render_fence)?;

        if self
            .swapchain
            .present(self.queue.handle(), render_semaphore, image_index)?
        {
            warn!("Presented image {image_index} to a suboptimal swapchain");
        }

        self.frames[slot].flush_retired();
        self.frame_number += 1;
        Ok(())
    }

    fn record_frame(&mut self, cmd: &CommandBufferRecording<D>, image_index: u32) -> Result<()> {
        let draw_extent = self.draw_image.extent_2d();
        let swapchain_extent = self.swapchain.extent();
        for step in FRAME_SCRIPT {
            match *step {
                FrameStep::Transition { image, from, to } => match image {
                    FrameImage::Draw => self.draw_image.transition(cmd, from, to),
                    FrameImage::Depth => self.depth_image.transition(cmd, from, to),
                    FrameImage::Swapchain => self
                        .swapchain
                        .image_mut(image_index)
                        .ok_or_else(|| anyhow::anyhow!("No swapchain image {image_index}"))?
                        .transition(cmd, from, to),
                },
                FrameStep::Pass(FramePass::Background) => {
                    self.background.record(cmd, draw_extent, self.frame_number)
                }
                FrameStep::Pass(FramePass::Geometry) => {
                    let filter = self.draw_filter;
                    let meshes = self
                        .meshes
                        .iter()
                        .enumerate()
                        .filter(move |(index, _)| filter.is_none_or(|only| only == *index))
                        .map(|(_, mesh)| mesh);
                    self.geometry.record(
                        cmd,
                        self.draw_image.view(),
                        self.depth_image.view(),
                        draw_extent,
                        meshes,
                    );
                }
                FrameStep::Pass(FramePass::Blit) => {
                    let target = self.swapchain.images()[image_index as usize].handle();
                    blit_image(
                        cmd,
                        self.draw_image.handle(),
                        target,
                        draw_extent,
                        swapchain_extent,
                    );
                }
            }
        }
        Ok(())
    }
}

impl<D: Device, A: Allocator> Destructible for Renderer<D, A> {
    fn destroy(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for the device before teardown: {e}");
        }
        self.meshes.clear();
        for frame in self.frames.iter_mut() {
            frame.destroy();
        }
        self.frames.clear();
        self.immediate.destroy();
        self.descriptors.destroy();
        self.deletion_queue.flush();
        self.swapchain.destroy();
    }
}

#[cfg(test)]
pub(crate) mod test {
    use kgal::allocators::TestAllocator;
    use kgal::testing::{DeviceCall, TestDevice, MINIMAL_SPIRV};

    use super::*;
    use crate::mesh::{GeoSurface, Vertex};
    use crate::shaders::InMemoryShaders;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 1280,
        height: 720,
    };

    fn shaders() -> InMemoryShaders {
        InMemoryShaders::default()
            .insert(GRADIENT_SHADER, MINIMAL_SPIRV.to_vec())
            .insert(MESH_VERTEX_SHADER, MINIMAL_SPIRV.to_vec())
            .insert(MESH_FRAGMENT_SHADER, MINIMAL_SPIRV.to_vec())
    }

    fn renderer(
        device: &TestDevice,
        shaders: &InMemoryShaders,
    ) -> Result<Renderer<TestDevice, TestAllocator>> {
        let swapchain = Swapchain::new(
            device.clone(),
            &vk::SwapchainCreateInfoKHR::default()
                .image_format(vk::Format::B8G8R8A8_UNORM)
                .image_extent(EXTENT)
                .image_usage(
                    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
                ),
        )?;
        let ratios = [PoolSizeRatio::default()
            .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
            .ratio(1.0)];
        Renderer::new(RendererCreateInfo {
            device: device.clone(),
            allocator: TestAllocator::new(device.clone()),
            queue: Queue::new(vk::Queue::null(), 0, 0, vk::QueueFlags::GRAPHICS),
            swapchain,
            draw_extent: EXTENT,
            shaders,
            background: BackgroundColors::default(),
            descriptor_sets_per_pool: 10,
            descriptor_ratios: &ratios,
        })
    }

    /// A renderer over `device` with placeholder shaders and no meshes
    pub(crate) fn test_renderer(
        device: &TestDevice,
    ) -> Result<Renderer<TestDevice, TestAllocator>> {
        renderer(device, &shaders())
    }

    fn quad(name: &str) -> MeshData {
        let vertex = |x: f32, y: f32| Vertex {
            position: glam::Vec4::new(x, y, 0.0, 1.0),
            color: glam::Vec4::ONE,
        };
        MeshData {
            name: name.to_string(),
            surfaces: vec![
                GeoSurface {
                    start_index: 0,
                    count: 3,
                },
                GeoSurface {
                    start_index: 3,
                    count: 3,
                },
            ],
            vertices: vec![vertex(0.0, 0.0), vertex(1.0, 0.0), vertex(1.0, 1.0), vertex(0.0, 1.0)],
            indices: vec![0, 1, 2, 2, 3, 0],
        }
    }

    #[test]
    fn one_draw_presents_one_image() {
        let device = TestDevice::new();
        let shaders = shaders();
        let mut renderer = renderer(&device, &shaders).unwrap();
        device.clear_calls();

        renderer.draw().unwrap();

        let calls = device.calls();
        let acquires = calls
            .iter()
            .filter(|call| matches!(call, DeviceCall::AcquireNextImage { .. }))
            .count();
        let presents: Vec<&DeviceCall> = calls
            .iter()
            .filter(|call| matches!(call, DeviceCall::QueuePresent { .. }))
            .collect();
        assert_eq!(acquires, 1);
        assert_eq!(presents.len(), 1);
        assert_eq!(renderer.frame_number(), 1);

        // the present waits on the semaphore the submit signals
        let signalled = calls.iter().find_map(|call| match call {
            DeviceCall::QueueSubmit { signal, .. } => Some(signal.clone()),
            _ => None,
        });
        match presents[0] {
            DeviceCall::QueuePresent { wait, image_indices } => {
                assert_eq!(Some(wait.clone()), signalled);
                assert_eq!(image_indices, &vec![0]);
            }
            _ => unreachable!(),
        }

        // compute dispatch before the draw pass, blit last
        let position = |pred: fn(&DeviceCall) -> bool| calls.iter().position(pred).unwrap();
        let dispatch = position(|call| matches!(call, DeviceCall::Dispatch(..)));
        let rendering = position(|call| matches!(call, DeviceCall::BeginRendering { .. }));
        let blit = position(|call| matches!(call, DeviceCall::BlitImage { .. }));
        assert!(dispatch < rendering && rendering < blit);
        renderer.destroy();
    }

    #[test]
    fn slots_alternate_and_wait_before_reuse() {
        let device = TestDevice::new();
        let shaders = shaders();
        let mut renderer = renderer(&device, &shaders).unwrap();
        device.clear_calls();

        for _ in 0..4 {
            renderer.draw().unwrap();
        }

        let calls = device.calls();
        let submitted: Vec<vk::Fence> = calls
            .iter()
            .filter_map(|call| match call {
                DeviceCall::QueueSubmit { fence, .. } => Some(*fence),
                _ => None,
            })
            .collect();
        assert_eq!(submitted.len(), 4);
        assert_ne!(submitted[0], submitted[1]);
        assert_eq!(submitted[0], submitted[2]);
        assert_eq!(submitted[1], submitted[3]);

        // every submission is preceded by a wait on its own fence
        let mut waited = Vec::new();
        for call in &calls {
            match call {
                DeviceCall::WaitForFences(fences) => waited.extend(fences.iter().copied()),
                DeviceCall::QueueSubmit { fence, .. } => assert_eq!(waited.last(), Some(fence)),
                _ => {}
            }
        }
        assert_eq!(renderer.frame_number(), 4);
        renderer.destroy();
    }

    #[test]
    fn present_failures_name_the_operation() {
        let device = TestDevice::new();
        let shaders = shaders();
        let mut renderer = renderer(&device, &shaders).unwrap();
        device.fail_next("queue_present", vk::Result::ERROR_OUT_OF_DATE_KHR);

        let err = renderer.draw().unwrap_err();
        match err.downcast_ref::<EngineError>() {
            Some(EngineError::GpuOperationFailed { operation, result }) => {
                assert_eq!(*operation, "vkQueuePresentKHR");
                assert_eq!(*result, vk::Result::ERROR_OUT_OF_DATE_KHR);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(renderer.frame_number(), 0);
        renderer.destroy();
    }

    #[test]
    fn every_surface_of_every_mesh_is_drawn() {
        let device = TestDevice::new();
        let shaders = shaders();
        let mut renderer = renderer(&device, &shaders).unwrap();
        renderer
            .upload_meshes(vec![quad("first"), quad("second")])
            .unwrap();
        assert_eq!(renderer.meshes().len(), 2);
        device.clear_calls();

        renderer.draw().unwrap();
        let draws = |device: &TestDevice| {
            device
                .calls()
                .into_iter()
                .filter_map(|call| match call {
                    DeviceCall::DrawIndexed {
                        index_count,
                        first_index,
                    } => Some((index_count, first_index)),
                    _ => None,
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(draws(&device), vec![(3, 0), (3, 3), (3, 0), (3, 3)]);

        renderer.set_draw_filter(Some(1));
        device.clear_calls();
        renderer.draw().unwrap();
        assert_eq!(draws(&device), vec![(3, 0), (3, 3)]);
        let bound: Vec<DeviceCall> = device
            .calls()
            .into_iter()
            .filter(|call| matches!(call, DeviceCall::BindIndexBuffer(_)))
            .collect();
        assert_eq!(
            bound,
            vec![DeviceCall::BindIndexBuffer(
                renderer.meshes()[1].buffers().index_buffer.handle()
            )]
        );
        renderer.destroy();
    }

    #[test]
    fn meshes_are_released_by_the_deletion_queue() {
        let device = TestDevice::new();
        let shaders = shaders();
        let mut renderer = renderer(&device, &shaders).unwrap();
        let queued = renderer.deletion_queue.len();
        renderer
            .upload_meshes(vec![quad("first"), quad("second")])
            .unwrap();
        assert_eq!(renderer.deletion_queue.len(), queued + 2);

        let index_buffers: Vec<vk::Buffer> = renderer
            .meshes()
            .iter()
            .map(|mesh| mesh.buffers().index_buffer.handle())
            .collect();
        device.clear_calls();
        renderer.destroy();

        // last uploaded first
        let destroyed: Vec<vk::Buffer> = device
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::DestroyBuffer(buffer) if index_buffers.contains(&buffer) => {
                    Some(buffer)
                }
                _ => None,
            })
            .collect();
        assert_eq!(destroyed, vec![index_buffers[1], index_buffers[0]]);
        assert!(renderer.meshes().is_empty());
        assert!(renderer.deletion_queue.is_empty());
        assert_eq!(device.live_memory_count(), 0);
    }

    #[test]
    fn teardown_releases_every_object() {
        let device = TestDevice::new();
        let shaders = shaders();
        let mut renderer = renderer(&device, &shaders).unwrap();
        renderer.upload_meshes(vec![quad("mesh")]).unwrap();
        for _ in 0..3 {
            renderer.draw().unwrap();
        }

        renderer.destroy();
        assert_eq!(device.live_object_count(), 0);
        assert_eq!(device.live_memory_count(), 0);
    }

    #[test]
    fn missing_shaders_release_partial_state() {
        let device = TestDevice::new();
        let shaders = InMemoryShaders::default().insert(GRADIENT_SHADER, MINIMAL_SPIRV.to_vec());
        let err = renderer(&device, &shaders).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::ShaderLoad { .. })
        ));
        assert_eq!(device.live_object_count(), 0);
        assert_eq!(device.live_memory_count(), 0);
    }
}
