//! Reads meshes out of binary or embedded glTF files into host side [`MeshData`]
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::mesh::{GeoSurface, MeshData, Vertex};

const UNNAMED_MESH: &str = "unknown name";
const VERTEX_COLOR: glam::Vec4 = glam::Vec4::new(1.0, 0.0, 0.0, 1.0);

/// Loads every mesh of the glTF file at `path`
pub fn load_gltf_meshes(path: impl AsRef<Path>) -> Result<Vec<MeshData>> {
    let path = path.as_ref();
    let (document, buffers, _) = gltf::import(path).map_err(|source| EngineError::AssetLoad {
        path: path.to_path_buf(),
        source,
    })?;
    let meshes = parse_meshes(&document, &buffers)?;
    info!("Loaded {} meshes from {}", meshes.len(), path.display());
    Ok(meshes)
}

/// Loads every mesh of a glTF file already in memory
pub fn load_gltf_meshes_from_slice(bytes: &[u8]) -> Result<Vec<MeshData>> {
    let (document, buffers, _) = gltf::import_slice(bytes).map_err(|source| EngineError::AssetLoad {
        path: PathBuf::from("<memory>"),
        source,
    })?;
    parse_meshes(&document, &buffers)
}

fn parse_meshes(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
) -> Result<Vec<MeshData>> {
    document
        .meshes()
        .map(|mesh| {
            let name = match mesh.name() {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => UNNAMED_MESH.to_string(),
            };
            let mut data = MeshData {
                name,
                ..Default::default()
            };
            for primitive in mesh.primitives() {
                let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
                let start_index = data.indices.len() as u32;
                let initial_vertex = data.vertices.len() as u32;

                let indices = reader.read_indices().ok_or_else(|| EngineError::MissingIndices {
                    mesh: data.name.clone(),
                })?;
                data.indices
                    .extend(indices.into_u32().map(|index| index + initial_vertex));

                let positions = reader
                    .read_positions()
                    .ok_or_else(|| EngineError::MissingPositions {
                        mesh: data.name.clone(),
                    })?;
                data.vertices.extend(positions.map(|position| Vertex {
                    position: glam::Vec3::from(position).extend(1.0),
                    color: VERTEX_COLOR,
                }));

                data.surfaces.push(GeoSurface {
                    start_index,
                    count: data.indices.len() as u32 - start_index,
                });
            }
            debug!(
                "Parsed mesh {}: {} surfaces, {} vertices",
                data.name,
                data.surfaces.len(),
                data.vertices.len()
            );
            Ok(data)
        })
        .collect()
}
