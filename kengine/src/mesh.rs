use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use kgal::allocators::{Allocator, GpuAllocator, MemoryLocation};
use kgal::ash::vk;
use kgal::device::{Device, LogicalDevice};
use kgal::resource::{Buffer, BufferCreateInfo, Resource};
use kgal::traits::Destructible;
use kgal::util::ImmediateSubmit;
use tracing::debug;

use crate::error::EngineError;

/// Vertex layout read by the mesh vertex shader through the buffer's device address
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: glam::Vec4,
    pub color: glam::Vec4,
}

/// Range of a mesh's index buffer drawn with one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoSurface {
    pub start_index: u32,
    pub count: u32,
}

/// Host side geometry of one mesh, ready to upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub name: String,
    pub surfaces: Vec<GeoSurface>,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

/// Device local vertex and index buffers of a mesh
#[derive(Debug, Clone)]
pub struct MeshBuffer<D: Device = LogicalDevice, A: Allocator = GpuAllocator> {
    pub index_buffer: Buffer<D, A>,
    pub vertex_buffer: Buffer<D, A>,
    /// Queried once when the vertex buffer was created
    pub vertex_buffer_address: vk::DeviceAddress,
}

impl<D: Device, A: Allocator> Destructible for MeshBuffer<D, A> {
    fn destroy(&mut self) {
        self.index_buffer.destroy();
        self.vertex_buffer.destroy();
    }
}

/// An uploaded mesh. Immutable once created.
#[derive(Debug, Clone)]
pub struct MeshAsset<D: Device = LogicalDevice, A: Allocator = GpuAllocator> {
    name: String,
    surfaces: Vec<GeoSurface>,
    buffers: MeshBuffer<D, A>,
}

impl<D: Device, A: Allocator> MeshAsset<D, A> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn surfaces(&self) -> &[GeoSurface] {
        &self.surfaces
    }

    pub fn buffers(&self) -> &MeshBuffer<D, A> {
        &self.buffers
    }
}

impl<D: Device, A: Allocator> Destructible for MeshAsset<D, A> {
    fn destroy(&mut self) {
        self.buffers.destroy();
    }
}

/// Copies mesh data into device local buffers through a staging buffer and a blocking
/// [`ImmediateSubmit`]. Meant for load time only.
#[derive(Debug)]
pub struct MeshUploader<'a, D: Device = LogicalDevice, A: Allocator = GpuAllocator> {
    device: D,
    allocator: &'a mut A,
    immediate: &'a ImmediateSubmit<D>,
}

impl<'a, D: Device, A: Allocator> MeshUploader<'a, D, A> {
    pub fn new(device: D, allocator: &'a mut A, immediate: &'a ImmediateSubmit<D>) -> Self {
        Self {
            device,
            allocator,
            immediate,
        }
    }

    fn create_buffer(
        &mut self,
        size: vk::DeviceSize,
        location: MemoryLocation,
        usage_flags: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<Buffer<D, A>> {
        Buffer::new(BufferCreateInfo::NewEmptyBuffer {
            device: self.device.clone(),
            allocator: &mut *self.allocator,
            size,
            location,
            usage_flags,
            name,
        })
    }

    /// Uploads `vertices` and `indices` into two new device local buffers.
    ///
    /// Both regions are staged in one host visible buffer and copied by a single blocking
    /// submission. The staging buffer is released before returning.
    pub fn upload_buffers(
        &mut self,
        name: &str,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<MeshBuffer<D, A>> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(EngineError::EmptyMesh {
                mesh: name.to_string(),
            }
            .into());
        }
        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);
        let vertex_size = vertex_bytes.len() as vk::DeviceSize;
        let index_size = index_bytes.len() as vk::DeviceSize;

        let mut vertex_buffer = self.create_buffer(
            vertex_size,
            MemoryLocation::GpuOnly,
            vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::TRANSFER_DST
                | vk::BufferUsageFlags::TRANSFER_SRC
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            &format!("{name} vertices"),
        )?;
        let mut index_buffer = match self.create_buffer(
            index_size,
            MemoryLocation::GpuOnly,
            vk::BufferUsageFlags::INDEX_BUFFER
                | vk::BufferUsageFlags::TRANSFER_DST
                | vk::BufferUsageFlags::TRANSFER_SRC,
            &format!("{name} indices"),
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                vertex_buffer.destroy();
                return Err(e);
            }
        };

        let copied = self.stage_and_copy(
            vertex_bytes,
            index_bytes,
            vertex_buffer.handle(),
            index_buffer.handle(),
        );
        let vertex_buffer_address = copied.and_then(|_| vertex_buffer.address());
        match vertex_buffer_address {
            Ok(vertex_buffer_address) => {
                debug!(
                    "Uploaded mesh {name}: {} vertices, {} indices",
                    vertices.len(),
                    indices.len()
                );
                Ok(MeshBuffer {
                    index_buffer,
                    vertex_buffer,
                    vertex_buffer_address,
                })
            }
            Err(e) => {
                index_buffer.destroy();
                vertex_buffer.destroy();
                Err(e)
            }
        }
    }

    fn stage_and_copy(
        &mut self,
        vertex_bytes: &[u8],
        index_bytes: &[u8],
        vertex_buffer: vk::Buffer,
        index_buffer: vk::Buffer,
    ) -> Result<()> {
        let vertex_size = vertex_bytes.len() as vk::DeviceSize;
        let index_size = index_bytes.len() as vk::DeviceSize;
        let mut staging = self.create_buffer(
            vertex_size + index_size,
            MemoryLocation::CpuToGpu,
            vk::BufferUsageFlags::TRANSFER_SRC,
            "mesh staging",
        )?;
        let result = staging
            .write(0, vertex_bytes)
            .and_then(|_| staging.write(vertex_size, index_bytes))
            .and_then(|_| {
                self.immediate.submit(|cmd| {
                    cmd.copy_buffer(
                        staging.handle(),
                        vertex_buffer,
                        &[vk::BufferCopy {
                            src_offset: 0,
                            dst_offset: 0,
                            size: vertex_size,
                        }],
                    );
                    cmd.copy_buffer(
                        staging.handle(),
                        index_buffer,
                        &[vk::BufferCopy {
                            src_offset: vertex_size,
                            dst_offset: 0,
                            size: index_size,
                        }],
                    );
                })
            });
        // the submit blocked until the copies finished
        staging.destroy();
        result
    }

    /// Uploads `mesh`, keeping its name and surfaces
    pub fn upload(&mut self, mesh: MeshData) -> Result<MeshAsset<D, A>> {
        let buffers = self.upload_buffers(&mesh.name, &mesh.vertices, &mesh.indices)?;
        Ok(MeshAsset {
            name: mesh.name,
            surfaces: mesh.surfaces,
            buffers,
        })
    }

    /// Copies the first `vertex_count` vertices and `index_count` indices of `buffers` back to
    /// the host. Debugging aid, blocks like every other upload.
    pub fn read_back(
        &mut self,
        buffers: &MeshBuffer<D, A>,
        vertex_count: usize,
        index_count: usize,
    ) -> Result<(Vec<Vertex>, Vec<u32>)> {
        let vertex_size = (vertex_count * std::mem::size_of::<Vertex>()) as vk::DeviceSize;
        let index_size = (index_count * std::mem::size_of::<u32>()) as vk::DeviceSize;
        let mut readback = self.create_buffer(
            vertex_size + index_size,
            MemoryLocation::GpuToCpu,
            vk::BufferUsageFlags::TRANSFER_DST,
            "mesh readback",
        )?;
        let result = self
            .immediate
            .submit(|cmd| {
                cmd.copy_buffer(
                    buffers.vertex_buffer.handle(),
                    readback.handle(),
                    &[vk::BufferCopy {
                        src_offset: 0,
                        dst_offset: 0,
                        size: vertex_size,
                    }],
                );
                cmd.copy_buffer(
                    buffers.index_buffer.handle(),
                    readback.handle(),
                    &[vk::BufferCopy {
                        src_offset: 0,
                        dst_offset: vertex_size,
                        size: index_size,
                    }],
                );
            })
            .and_then(|_| {
                let vertices = readback.read(0, vertex_size as usize)?;
                let indices = readback.read(vertex_size, index_size as usize)?;
                Ok((
                    bytemuck::pod_collect_to_vec::<u8, Vertex>(&vertices),
                    bytemuck::pod_collect_to_vec::<u8, u32>(&indices),
                ))
            });
        readback.destroy();
        result
    }
}

#[cfg(test)]
mod test {
    use kgal::allocators::TestAllocator;
    use kgal::device::Queue;
    use kgal::testing::{DeviceCall, TestDevice};

    use super::*;

    fn triangle() -> MeshData {
        let color = glam::Vec4::new(1.0, 0.0, 0.0, 1.0);
        MeshData {
            name: String::from("triangle"),
            surfaces: vec![GeoSurface {
                start_index: 0,
                count: 3,
            }],
            vertices: vec![
                Vertex {
                    position: glam::Vec4::new(-1.0, -1.0, 0.0, 1.0),
                    color,
                },
                Vertex {
                    position: glam::Vec4::new(1.0, -1.0, 0.0, 1.0),
                    color,
                },
                Vertex {
                    position: glam::Vec4::new(0.0, 1.0, 0.0, 1.0),
                    color,
                },
            ],
            indices: vec![0, 1, 2],
        }
    }

    fn setup() -> (TestDevice, TestAllocator, ImmediateSubmit<TestDevice>) {
        let device = TestDevice::new();
        let allocator = TestAllocator::new(device.clone());
        let queue = Queue::new(vk::Queue::null(), 0, 0, vk::QueueFlags::GRAPHICS);
        let immediate = ImmediateSubmit::new(device.clone(), queue).unwrap();
        (device, allocator, immediate)
    }

    #[test]
    fn round_trip_reproduces_input() {
        let (device, mut allocator, mut immediate) = setup();
        let mesh = triangle();
        let (vertices, indices) = (mesh.vertices.clone(), mesh.indices.clone());

        let mut uploader = MeshUploader::new(device.clone(), &mut allocator, &immediate);
        let mut asset = uploader.upload(mesh).unwrap();
        let (read_vertices, read_indices) = uploader
            .read_back(asset.buffers(), vertices.len(), indices.len())
            .unwrap();

        assert_eq!(read_vertices, vertices);
        assert_eq!(read_indices, indices);
        assert_eq!(asset.name(), "triangle");
        assert_eq!(asset.surfaces().len(), 1);
        assert_ne!(asset.buffers().vertex_buffer_address, 0);

        asset.destroy();
        immediate.destroy();
        assert_eq!(allocator.live_allocations(), 0);
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn both_copies_share_one_blocking_submit() {
        let (device, mut allocator, mut immediate) = setup();
        device.clear_calls();

        let mut buffers = MeshUploader::new(device.clone(), &mut allocator, &immediate)
            .upload_buffers("triangle", &triangle().vertices, &triangle().indices)
            .unwrap();

        let vertex_size = (3 * std::mem::size_of::<Vertex>()) as vk::DeviceSize;
        let copies: Vec<(vk::Buffer, vk::Buffer, Vec<(u64, u64, u64)>)> = device
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::CopyBuffer { src, dst, regions } => Some((src, dst, regions)),
                _ => None,
            })
            .collect();
        assert_eq!(copies.len(), 2);
        let staging = copies[0].0;
        assert_eq!(copies[1].0, staging);
        assert_eq!(copies[0].1, buffers.vertex_buffer.handle());
        assert_eq!(copies[0].2, vec![(0, 0, vertex_size)]);
        assert_eq!(copies[1].1, buffers.index_buffer.handle());
        assert_eq!(copies[1].2, vec![(vertex_size, 0, 12)]);
        assert_eq!(
            device.count_calls(|call| matches!(call, DeviceCall::QueueSubmit { .. })),
            1
        );
        // vertex buffer, index buffer; the staging buffer is already gone
        assert_eq!(allocator.live_allocations(), 2);

        buffers.destroy();
        immediate.destroy();
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn empty_meshes_are_rejected() {
        let (device, mut allocator, mut immediate) = setup();
        let err = MeshUploader::new(device.clone(), &mut allocator, &immediate)
            .upload(MeshData {
                name: String::from("nothing"),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::EmptyMesh { .. })
        ));
        immediate.destroy();
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn failed_copy_releases_every_buffer() {
        let (device, mut allocator, mut immediate) = setup();
        device.fail_next("queue_submit", vk::Result::ERROR_DEVICE_LOST);

        let mesh = triangle();
        let result = MeshUploader::new(device.clone(), &mut allocator, &immediate).upload_buffers(
            "triangle",
            &mesh.vertices,
            &mesh.indices,
        );

        assert!(result.is_err());
        assert_eq!(allocator.live_allocations(), 0);
        immediate.destroy();
        assert_eq!(device.live_object_count(), 0);
    }
}
