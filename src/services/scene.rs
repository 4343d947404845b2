//! Scene membership and the software viewport that renders it.
//!
//! The pipeline is the only writer of scene membership (`attach`/`detach`);
//! the render loop and the thumbnail capturer only read.

use crate::error::SceneError;
use crate::models::AssetId;
use glam::{Mat4, Vec3};
use std::sync::{Arc, Mutex, MutexGuard};

/// Triangle mesh in world space
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    /// Triangle list; always a multiple of three
    pub indices: Vec<u32>,
    pub color: [u8; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f32; 3]>) -> Option<Self> {
        let mut iter = points.into_iter().map(|p| Vec3::from(*p));
        let first = iter.next()?;
        Some(iter.fold(
            Bounds {
                min: first,
                max: first,
            },
            |bounds, p| Bounds {
                min: bounds.min.min(p),
                max: bounds.max.max(p),
            },
        ))
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn radius(&self) -> f32 {
        (self.max - self.min).length() * 0.5
    }
}

/// Renderable root object produced by the loader
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub name: String,
    pub meshes: Vec<Mesh>,
    pub bounds: Option<Bounds>,
}

impl SceneObject {
    pub fn new(name: impl Into<String>, meshes: Vec<Mesh>) -> Self {
        let bounds = Bounds::from_points(meshes.iter().flat_map(|m| m.positions.iter()));
        Self {
            name: name.into(),
            meshes,
            bounds,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.indices.len() / 3).sum()
    }
}

/// One rendered frame, RGBA8 row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<Vec<u8>>,
    pub seq: u64,
    /// Asset that was resident when the frame was drawn
    pub asset: Option<AssetId>,
}

impl Frame {
    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }
}

/// Rendering surface as seen by the ingestion core
pub trait Viewport: Send + Sync {
    /// Adds an object; fails if another asset is already resident
    fn attach(&self, id: AssetId, object: SceneObject) -> Result<(), SceneError>;

    /// Removes the object if `id` is the resident asset
    fn detach(&self, id: AssetId) -> Option<SceneObject>;

    fn resident(&self) -> Option<AssetId>;

    /// Draws the current scene and returns the new frame sequence number
    fn render(&self) -> u64;

    /// Last rendered frame, `None` until the first render
    fn current_frame(&self) -> Option<Frame>;
}

#[derive(Debug, Clone)]
pub struct ViewportSettings {
    pub size: u32,
    pub background: [u8; 3],
    pub ground: [u8; 3],
    /// Camera position relative to the framed target
    pub camera_offset: Vec3,
    pub fov_degrees: f32,
    /// Direction towards the light
    pub light_dir: Vec3,
    pub ground_half_extent: f32,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            size: 550,
            background: [0x87, 0xce, 0xeb],
            ground: [0x5c, 0x76, 0x68],
            camera_offset: Vec3::new(1.0, 2.0, 4.5),
            fov_degrees: 75.0,
            light_dir: Vec3::new(0.0, 55.0, 35.0).normalize(),
            ground_half_extent: 50.0,
        }
    }
}

impl ViewportSettings {
    pub fn with_size(size: u32) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct SceneState {
    resident: Option<(AssetId, Arc<SceneObject>)>,
    frame: Option<Frame>,
    seq: u64,
}

/// Owned rendering context: scene membership, camera setup and the last frame
pub struct RenderContext {
    settings: ViewportSettings,
    state: Mutex<SceneState>,
}

impl RenderContext {
    pub fn new(settings: ViewportSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(SceneState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SceneState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn rasterize(&self, object: Option<&SceneObject>) -> Vec<u8> {
        let size = self.settings.size as usize;
        let camera = Camera::framing(&self.settings, object.and_then(|o| o.bounds));
        let mut color = vec![0u8; size * size * 4];
        let mut depth = vec![f32::INFINITY; size * size];

        // Sky and ground plane
        for py in 0..size {
            for px in 0..size {
                let dir = camera.ray(px as f32 + 0.5, py as f32 + 0.5);
                let rgb = if self.hits_ground(camera.eye, dir) {
                    self.settings.ground
                } else {
                    self.settings.background
                };
                let i = (py * size + px) * 4;
                color[i..i + 3].copy_from_slice(&rgb);
                color[i + 3] = 255;
            }
        }

        let Some(object) = object else {
            return color;
        };

        for mesh in &object.meshes {
            for tri in mesh.indices.chunks_exact(3) {
                let fetch = |i: u32| mesh.positions.get(i as usize).map(|p| Vec3::from(*p));
                let (Some(a), Some(b), Some(c)) = (fetch(tri[0]), fetch(tri[1]), fetch(tri[2]))
                else {
                    continue;
                };
                let normal = (b - a).cross(c - a).normalize_or_zero();
                let shade = 0.35 + 0.65 * normal.dot(self.settings.light_dir).abs();
                let rgb = mesh.color.map(|ch| (f32::from(ch) * shade).min(255.0) as u8);

                let (Some(pa), Some(pb), Some(pc)) =
                    (camera.project(a), camera.project(b), camera.project(c))
                else {
                    continue;
                };
                fill_triangle(&mut color, &mut depth, size, [pa, pb, pc], rgb);
            }
        }

        color
    }

    fn hits_ground(&self, eye: Vec3, dir: Vec3) -> bool {
        if dir.y >= 0.0 || eye.y <= 0.0 {
            return false;
        }
        let hit = eye + dir * (-eye.y / dir.y);
        let half = self.settings.ground_half_extent;
        hit.x.abs() <= half && hit.z.abs() <= half
    }
}

impl Viewport for RenderContext {
    fn attach(&self, id: AssetId, object: SceneObject) -> Result<(), SceneError> {
        let mut state = self.lock();
        if state.resident.is_some() {
            return Err(SceneError::Occupied);
        }
        tracing::debug!(
            "Attaching '{}' ({} triangles) as {}",
            object.name,
            object.triangle_count(),
            id
        );
        state.resident = Some((id, Arc::new(object)));
        Ok(())
    }

    fn detach(&self, id: AssetId) -> Option<SceneObject> {
        let mut state = self.lock();
        if state.resident.as_ref().map(|(resident, _)| *resident) != Some(id) {
            return None;
        }
        let (_, object) = state.resident.take()?;
        Some(Arc::try_unwrap(object).unwrap_or_else(|shared| (*shared).clone()))
    }

    fn resident(&self) -> Option<AssetId> {
        self.lock().resident.as_ref().map(|(id, _)| *id)
    }

    fn render(&self) -> u64 {
        let snapshot = self.lock().resident.clone();
        let pixels = self.rasterize(snapshot.as_ref().map(|(_, o)| o.as_ref()));

        let mut state = self.lock();
        state.seq += 1;
        let seq = state.seq;
        state.frame = Some(Frame {
            width: self.settings.size,
            height: self.settings.size,
            pixels: Arc::new(pixels),
            seq,
            asset: snapshot.map(|(id, _)| id),
        });
        seq
    }

    fn current_frame(&self) -> Option<Frame> {
        self.lock().frame.clone()
    }
}

/// Perspective camera looking at the framed asset, mapping world space to
/// pixel coordinates
struct Camera {
    eye: Vec3,
    view_proj: Mat4,
    inverse: Mat4,
    size: f32,
}

impl Camera {
    const NEAR: f32 = 0.01;

    fn framing(settings: &ViewportSettings, bounds: Option<Bounds>) -> Self {
        let target = bounds.map(|b| b.center()).unwrap_or(Vec3::ZERO);
        let radius = bounds.map(|b| b.radius()).unwrap_or(0.0);
        let fov = settings.fov_degrees.to_radians().max(0.02);

        // Keep the configured viewing angle and back off until the bounds fit
        let offset = settings.camera_offset;
        let base_distance = offset.length();
        let fit_distance = radius / (fov * 0.5).tan() * 1.2;
        let scale = if base_distance > 0.0 {
            fit_distance.max(base_distance) / base_distance
        } else {
            1.0
        };
        let eye = target + offset * scale;

        let far = (eye - target).length() + radius + settings.ground_half_extent * 2.0;
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        let proj = Mat4::perspective_rh(fov, 1.0, Self::NEAR, far);
        let view_proj = proj * view;

        Self {
            eye,
            view_proj,
            inverse: view_proj.inverse(),
            size: settings.size as f32,
        }
    }

    /// World-space direction through a pixel
    fn ray(&self, px: f32, py: f32) -> Vec3 {
        let x = px / self.size * 2.0 - 1.0;
        let y = 1.0 - py / self.size * 2.0;
        let near = self.inverse.project_point3(Vec3::new(x, y, 0.0));
        let far = self.inverse.project_point3(Vec3::new(x, y, 1.0));
        (far - near).normalize_or_zero()
    }

    /// Pixel position and view depth
    fn project(&self, p: Vec3) -> Option<Vec3> {
        let clip = self.view_proj * p.extend(1.0);
        if clip.w < Self::NEAR {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        Some(Vec3::new(
            (ndc.x + 1.0) * 0.5 * self.size,
            (1.0 - ndc.y) * 0.5 * self.size,
            clip.w,
        ))
    }
}

fn fill_triangle(color: &mut [u8], depth: &mut [f32], size: usize, v: [Vec3; 3], rgb: [u8; 3]) {
    let area = edge(v[0], v[1], v[2]);
    if area.abs() < f32::EPSILON {
        return;
    }

    let lo = v[0].min(v[1]).min(v[2]);
    let hi = v[0].max(v[1]).max(v[2]);
    if hi.x < 0.0 || hi.y < 0.0 {
        return;
    }
    let min_x = lo.x.floor().max(0.0) as usize;
    let min_y = lo.y.floor().max(0.0) as usize;
    let max_x = (hi.x.ceil() as usize).min(size.saturating_sub(1));
    let max_y = (hi.y.ceil() as usize).min(size.saturating_sub(1));

    for py in min_y..=max_y {
        for px in min_x..=max_x {
            let p = Vec3::new(px as f32 + 0.5, py as f32 + 0.5, 0.0);
            let w0 = edge(v[1], v[2], p) / area;
            let w1 = edge(v[2], v[0], p) / area;
            let w2 = edge(v[0], v[1], p) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let z = w0 * v[0].z + w1 * v[1].z + w2 * v[2].z;
            let i = py * size + px;
            if z < depth[i] {
                depth[i] = z;
                color[i * 4..i * 4 + 3].copy_from_slice(&rgb);
                color[i * 4 + 3] = 255;
            }
        }
    }
}

fn edge(a: Vec3, b: Vec3, p: Vec3) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}
