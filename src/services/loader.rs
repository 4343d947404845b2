use crate::error::IngestError;
use crate::models::{AssetId, PendingFile};
use crate::services::scene::{Mesh, SceneObject};
use crate::utils::validation::validate_extension;
use async_trait::async_trait;
use glam::{Mat4, Vec3};
use std::sync::Arc;

/// A decoded model ready to be attached to the scene
#[derive(Debug)]
pub struct LoadedAsset {
    pub id: AssetId,
    pub object: SceneObject,
    pub file: Arc<PendingFile>,
}

/// Trait for model decoding implementations
#[async_trait]
pub trait AssetDecoder: Send + Sync {
    /// Decode file content into a renderable object, or return the decoder's diagnostic
    async fn decode(&self, file: &PendingFile) -> Result<SceneObject, String>;
}

/// glTF 2.0 decoder (binary `.glb` and JSON `.gltf`)
pub struct GltfDecoder;

impl GltfDecoder {
    pub fn decode_blocking(file: &PendingFile) -> Result<SceneObject, gltf::Error> {
        // JSON glTF read from disk may reference sibling .bin files
        let (document, buffers, _images) = match &file.source {
            Some(path) if file.extension() == "gltf" => gltf::import(path)?,
            _ => gltf::import_slice(&file.content)?,
        };

        let mut meshes = Vec::new();
        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next());
        match scene {
            Some(scene) => {
                for node in scene.nodes() {
                    collect_node(&node, &Mat4::IDENTITY, &buffers, &mut meshes);
                }
            }
            None => {
                for mesh in document.meshes() {
                    collect_mesh(&mesh, &Mat4::IDENTITY, &buffers, &mut meshes);
                }
            }
        }

        Ok(SceneObject::new(file.base_name(), meshes))
    }
}

#[async_trait]
impl AssetDecoder for GltfDecoder {
    async fn decode(&self, file: &PendingFile) -> Result<SceneObject, String> {
        let file = file.clone();
        tokio::task::spawn_blocking(move || Self::decode_blocking(&file))
            .await
            .map_err(|e| format!("decoder task failed: {}", e))?
            .map_err(|e| e.to_string())
    }
}

fn collect_node(
    node: &gltf::Node,
    parent: &Mat4,
    buffers: &[gltf::buffer::Data],
    out: &mut Vec<Mesh>,
) {
    let world = *parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        collect_mesh(&mesh, &world, buffers, out);
    }
    for child in node.children() {
        collect_node(&child, &world, buffers, out);
    }
}

fn collect_mesh(
    mesh: &gltf::Mesh,
    world: &Mat4,
    buffers: &[gltf::buffer::Data],
    out: &mut Vec<Mesh>,
) {
    for primitive in mesh.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            tracing::debug!("Skipping non-triangle primitive in mesh {:?}", mesh.name());
            continue;
        }

        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
        let Some(positions) = reader.read_positions() else {
            continue;
        };
        let positions: Vec<[f32; 3]> = positions
            .map(|p| world.transform_point3(Vec3::from(p)).to_array())
            .collect();

        let mut indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };
        indices.truncate(indices.len() - indices.len() % 3);

        let factor = primitive
            .material()
            .pbr_metallic_roughness()
            .base_color_factor();
        let color = [factor[0], factor[1], factor[2]].map(|c| (c.clamp(0.0, 1.0) * 255.0) as u8);

        out.push(Mesh {
            positions,
            indices,
            color,
        });
    }
}

/// Adapter between selected files and the decoding capability
#[derive(Clone)]
pub struct AssetLoader {
    decoder: Arc<dyn AssetDecoder>,
}

impl AssetLoader {
    pub fn new(decoder: Arc<dyn AssetDecoder>) -> Self {
        Self { decoder }
    }

    pub fn gltf() -> Self {
        Self::new(Arc::new(GltfDecoder))
    }

    pub async fn load(&self, file: Arc<PendingFile>) -> Result<LoadedAsset, IngestError> {
        validate_extension(&file.name)?;

        let object = self
            .decoder
            .decode(&file)
            .await
            .map_err(|reason| IngestError::Decode {
                file: file.name.clone(),
                reason,
            })?;

        let id = AssetId::new();
        tracing::info!(
            "📦 Decoded {} ({} bytes, {} meshes, {} triangles)",
            file.name,
            file.size(),
            object.meshes.len(),
            object.triangle_count()
        );

        Ok(LoadedAsset { id, object, file })
    }
}
