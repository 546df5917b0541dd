//! Scene construction for one overlay request.
//!
//! Turns keypoints, triangulation and UVs into a textured face mesh placed in
//! a y-up orthographic world, plus the unlit background photo and the light
//! rig the render loop updates every frame.

use crate::landmarks::{validate_topology, LandmarkError};
use crate::types::{Keypoint, OverlayOptions, OverlayRequest, PendingImage, Tint, Triangle, Uv};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use thiserror::Error;

const AMBIENT_INTENSITY: f32 = 0.4;
const KEY_LIGHT_INTENSITY: f32 = 0.6;
const FILL_LIGHT_INTENSITY: f32 = 0.2;
const CAMERA_NEAR: f32 = -1000.0;
const CAMERA_FAR: f32 = 1000.0;
const CAMERA_Z: f32 = 1.0;
/// Fraction of the mean keypoint depth used as the mesh's base offset.
const DEPTH_PLACEMENT: f32 = 0.5;
/// Extra depth for the wireframe so it never coincides with the mask.
const WIREFRAME_DEPTH_OFFSET: f32 = 0.01;
const ALPHA_TEST: f32 = 0.01;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("overlay size must be non-zero, got {width}x{height}")]
    ZeroSize { width: u32, height: u32 },
    #[error("overlay request has no keypoints")]
    NoKeypoints,
    #[error("mask image is empty")]
    EmptyMask,
    #[error("invalid topology: {0}")]
    Topology(#[from] LandmarkError),
}

/// Orthographic camera spanning the overlay in world units (y up).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthoCamera {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    pub near: f32,
    pub far: f32,
    pub z: f32,
}

impl OrthoCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            left: 0.0,
            right: width as f32,
            top: height as f32,
            bottom: 0.0,
            near: CAMERA_NEAR,
            far: CAMERA_FAR,
            z: CAMERA_Z,
        }
    }

    /// Map a world point to pixel coordinates (y down) for a `width` x `height` target.
    pub fn project(&self, p: [f32; 3], width: u32, height: u32) -> [f32; 2] {
        let sx = (p[0] - self.left) / (self.right - self.left) * width as f32;
        let sy = (self.top - p[1]) / (self.top - self.bottom) * height as f32;
        [sx, sy]
    }

    /// Whether a world depth lies between the near and far planes.
    pub fn in_depth_range(&self, z: f32) -> bool {
        let view_z = z - self.z;
        view_z <= -self.near && view_z >= -self.far
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Unit vector pointing toward the light.
    pub direction: [f32; 3],
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lighting {
    pub ambient: f32,
    /// Driven by the light estimator every frame.
    pub key: DirectionalLight,
    pub fill: DirectionalLight,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient: AMBIENT_INTENSITY,
            key: DirectionalLight {
                direction: [0.0, 0.0, 1.0],
                intensity: KEY_LIGHT_INTENSITY,
            },
            fill: DirectionalLight {
                direction: normalize([0.0, -1.0, 1.0]),
                intensity: FILL_LIGHT_INTENSITY,
            },
        }
    }
}

impl Lighting {
    /// Total diffuse factor for a unit normal.
    pub fn shade(&self, normal: [f32; 3]) -> f32 {
        let lambert = |l: &DirectionalLight| dot(normal, l.direction).max(0.0) * l.intensity;
        self.ambient + lambert(&self.key) + lambert(&self.fill)
    }
}

/// Scale-then-translate placement of a mesh in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub scale: [f32; 3],
    pub position: [f32; 3],
}

impl Transform {
    pub fn apply(&self, p: [f32; 3]) -> [f32; 3] {
        [
            p[0] * self.scale[0] + self.position[0],
            p[1] * self.scale[1] + self.position[1],
            p[2] * self.scale[2] + self.position[2],
        ]
    }

    /// Transform a normal by the inverse-transpose of the scale.
    pub fn apply_normal(&self, n: [f32; 3]) -> [f32; 3] {
        normalize([n[0] / self.scale[0], n[1] / self.scale[1], n[2] / self.scale[2]])
    }
}

/// Face mesh in keypoint space.
#[derive(Debug, Clone)]
pub struct FaceGeometry {
    /// Source keypoints, kept for per-frame light sampling.
    pub keypoints: Vec<Keypoint>,
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<Triangle>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<Uv>,
}

impl FaceGeometry {
    pub fn new(keypoints: &[Keypoint], indices: &[Triangle], uvs: &[Uv]) -> Self {
        let positions: Vec<[f32; 3]> = keypoints.iter().map(|k| [k.x, k.y, k.z]).collect();
        let normals = vertex_normals(&positions, indices);
        Self {
            keypoints: keypoints.to_vec(),
            positions,
            indices: indices.to_vec(),
            normals,
            uvs: uvs.to_vec(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Mean z over all vertices.
    pub fn mean_depth(&self) -> f32 {
        if self.positions.is_empty() {
            return 0.0;
        }
        self.positions.iter().map(|p| p[2]).sum::<f32>() / self.positions.len() as f32
    }
}

/// Smooth per-vertex normals: area-weighted sum of incident face normals.
pub fn vertex_normals(positions: &[[f32; 3]], indices: &[Triangle]) -> Vec<[f32; 3]> {
    let mut acc = vec![[0.0f32; 3]; positions.len()];
    for tri in indices {
        let [a, b, c] = tri.map(|i| i as usize);
        let (Some(pa), Some(pb), Some(pc)) = (positions.get(a), positions.get(b), positions.get(c)) else {
            continue;
        };
        let face = cross(sub(*pc, *pb), sub(*pa, *pb));
        for v in [a, b, c] {
            for k in 0..3 {
                acc[v][k] += face[k];
            }
        }
    }
    acc.into_iter()
        .map(|n| if length(n) > 0.0 { normalize(n) } else { [0.0, 0.0, 1.0] })
        .collect()
}

/// Tinted, translucent makeup material.
#[derive(Debug, Clone)]
pub struct MakeupMaterial {
    /// Mask resampled to exactly the overlay size.
    pub texture: RgbaImage,
    pub tint: Tint,
    pub opacity: f32,
    pub alpha_test: f32,
}

impl MakeupMaterial {
    /// Bilinear lookup with clamp-to-edge; `v = 0` is the top row.
    pub fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        sample_bilinear(&self.texture, u, v)
    }
}

/// Wireframe overlay: same geometry, unlit, drawn after the mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wireframe {
    pub transform: Transform,
    pub color: Rgba<u8>,
}

/// The source photo as an unlit layer sized to the overlay.
#[derive(Debug, Clone)]
pub struct Background {
    source: PendingImage,
    width: u32,
    height: u32,
    buffer: Option<RgbaImage>,
}

impl Background {
    pub fn new(source: PendingImage, width: u32, height: u32) -> Self {
        Self {
            source,
            width,
            height,
            buffer: None,
        }
    }

    /// Pick up the decoded photo once it is available. Returns whether it is ready.
    pub fn resolve(&mut self) -> bool {
        if self.buffer.is_none() {
            if let Some(decoded) = self.source.get() {
                self.buffer = Some(fit(decoded, self.width, self.height));
                tracing::debug!(width = self.width, height = self.height, "background decoded");
            }
        }
        self.buffer.is_some()
    }

    /// The photo at overlay size, if decoded.
    pub fn image(&self) -> Option<&RgbaImage> {
        self.buffer.as_ref()
    }
}

/// Everything the renderer draws for one overlay.
#[derive(Debug, Clone)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    pub camera: OrthoCamera,
    pub lights: Lighting,
    pub geometry: FaceGeometry,
    pub mask_transform: Transform,
    pub material: MakeupMaterial,
    pub wireframe: Option<Wireframe>,
    pub background: Background,
}

impl Scene {
    /// Build the scene for `request`. Normals are recomputed from the given keypoints.
    pub fn build(request: &OverlayRequest, options: &OverlayOptions) -> Result<Self, SceneError> {
        let (width, height) = (request.width, request.height);
        if width == 0 || height == 0 {
            return Err(SceneError::ZeroSize { width, height });
        }
        if request.keypoints.is_empty() {
            return Err(SceneError::NoKeypoints);
        }
        if request.mask.width() == 0 || request.mask.height() == 0 {
            return Err(SceneError::EmptyMask);
        }
        validate_topology(request.keypoints.len(), &request.triangulation, &request.uv)?;

        let geometry = FaceGeometry::new(&request.keypoints, &request.triangulation, &request.uv);

        // Keypoint y grows downward; the world grows upward.
        let mask_transform = Transform {
            scale: [1.0, -1.0, 1.0],
            position: [0.0, height as f32, geometry.mean_depth() * DEPTH_PLACEMENT],
        };

        let material = MakeupMaterial {
            texture: fit(&request.mask, width, height),
            tint: options.tint,
            opacity: options.opacity.clamp(0.0, 1.0),
            alpha_test: ALPHA_TEST,
        };

        let wireframe = options.wireframe.then(|| {
            let mut transform = mask_transform;
            transform.position[2] += WIREFRAME_DEPTH_OFFSET;
            Wireframe {
                transform,
                color: Rgba([255, 255, 255, 255]),
            }
        });

        Ok(Self {
            width,
            height,
            camera: OrthoCamera::new(width, height),
            lights: Lighting::default(),
            geometry,
            mask_transform,
            material,
            wireframe,
            background: Background::new(request.background.clone(), width, height),
        })
    }
}

/// Resample `image` to exactly `width` x `height` (bilinear).
fn fit(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// Bilinear texture lookup in normalized coordinates, components in [0, 1].
pub fn sample_bilinear(texture: &RgbaImage, u: f32, v: f32) -> [f32; 4] {
    let (w, h) = texture.dimensions();
    if w == 0 || h == 0 {
        return [0.0; 4];
    }
    let x = (u.clamp(0.0, 1.0) * w as f32 - 0.5).clamp(0.0, (w - 1) as f32);
    let y = (v.clamp(0.0, 1.0) * h as f32 - 0.5).clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let tl = texture.get_pixel(x0, y0).0;
    let tr = texture.get_pixel(x1, y0).0;
    let bl = texture.get_pixel(x0, y1).0;
    let br = texture.get_pixel(x1, y1).0;

    let mut out = [0.0f32; 4];
    for c in 0..4 {
        let top = tl[c] as f32 * (1.0 - fx) + tr[c] as f32 * fx;
        let bot = bl[c] as f32 * (1.0 - fx) + br[c] as f32 * fx;
        out[c] = (top * (1.0 - fy) + bot * fy) / 255.0;
    }
    out
}

pub(crate) fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub(crate) fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub(crate) fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn length(a: [f32; 3]) -> f32 {
    dot(a, a).sqrt()
}

pub(crate) fn normalize(a: [f32; 3]) -> [f32; 3] {
    let len = length(a);
    if len > 0.0 {
        [a[0] / len, a[1] / len, a[2] / len]
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{grid_face, solid};
    use crate::types::FaceLandmarks;

    fn request(face: FaceLandmarks, mask: RgbaImage) -> OverlayRequest {
        OverlayRequest::new(face, 200, 100, mask, PendingImage::new())
    }

    #[test]
    fn test_build_vertex_and_index_counts() {
        let face = grid_face(200.0, 100.0);
        let n = face.keypoints.len();
        let tris = face.triangulation.len();
        let scene = Scene::build(&request(face, solid(10, 10, [255, 0, 0, 255])), &OverlayOptions::default()).unwrap();

        assert_eq!(scene.geometry.vertex_count(), n);
        assert_eq!(scene.geometry.normals.len(), n);
        assert_eq!(scene.geometry.uvs.len(), n);
        assert_eq!(scene.geometry.indices.len(), tris);
        assert!(scene
            .geometry
            .indices
            .iter()
            .all(|t| t.iter().all(|&i| (i as usize) < n)));
    }

    #[test]
    fn test_mask_resampled_to_overlay_size() {
        let scene = Scene::build(
            &request(grid_face(200.0, 100.0), solid(100, 100, [255, 0, 0, 255])),
            &OverlayOptions::default(),
        )
        .unwrap();
        assert_eq!(scene.material.texture.dimensions(), (200, 100));
    }

    #[test]
    fn test_vertical_mirror_and_depth_placement() {
        let face = grid_face(200.0, 100.0);
        let mean_z = face.keypoints.iter().map(|k| k.z).sum::<f32>() / face.keypoints.len() as f32;
        let scene = Scene::build(&request(face, solid(4, 4, [0; 4])), &OverlayOptions::default()).unwrap();

        assert_eq!(scene.mask_transform.scale, [1.0, -1.0, 1.0]);
        assert_eq!(scene.mask_transform.position[1], 100.0);
        assert!((scene.mask_transform.position[2] - mean_z * 0.5).abs() < 1e-5);

        // A keypoint at image y = 10 lands at world y = 90 and back on pixel row 10.
        let world = scene.mask_transform.apply([5.0, 10.0, 0.0]);
        assert_eq!(world[1], 90.0);
        let px = scene.camera.project(world, 200, 100);
        assert!((px[1] - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_wireframe_offset_behind_mask_order() {
        let options = OverlayOptions { wireframe: true, ..OverlayOptions::default() };
        let scene = Scene::build(&request(grid_face(200.0, 100.0), solid(4, 4, [0; 4])), &options).unwrap();
        let wf = scene.wireframe.unwrap();
        assert!((wf.transform.position[2] - scene.mask_transform.position[2] - 0.01).abs() < 1e-6);
        assert_eq!(wf.transform.scale, scene.mask_transform.scale);
    }

    #[test]
    fn test_no_wireframe_by_default() {
        let scene = Scene::build(&request(grid_face(200.0, 100.0), solid(4, 4, [0; 4])), &OverlayOptions::default()).unwrap();
        assert!(scene.wireframe.is_none());
    }

    #[test]
    fn test_material_params_applied() {
        let options = OverlayOptions {
            tint: Tint { r: 10, g: 20, b: 30 },
            opacity: 1.7,
            ..OverlayOptions::default()
        };
        let scene = Scene::build(&request(grid_face(200.0, 100.0), solid(4, 4, [0; 4])), &options).unwrap();
        assert_eq!(scene.material.tint, Tint { r: 10, g: 20, b: 30 });
        assert_eq!(scene.material.opacity, 1.0);
    }

    #[test]
    fn test_build_rejects_bad_topology() {
        let mut face = grid_face(200.0, 100.0);
        let mut tris = face.triangulation.to_vec();
        tris.push([0, 1, 9999]);
        face.triangulation = tris.into();
        let err = Scene::build(&request(face, solid(4, 4, [0; 4])), &OverlayOptions::default()).unwrap_err();
        assert!(matches!(err, SceneError::Topology(LandmarkError::IndexOutOfRange { index: 9999, .. })));
    }

    #[test]
    fn test_build_rejects_empty_inputs() {
        let face = grid_face(200.0, 100.0);
        let mut req = request(face.clone(), solid(4, 4, [0; 4]));
        req.width = 0;
        assert!(matches!(
            Scene::build(&req, &OverlayOptions::default()),
            Err(SceneError::ZeroSize { .. })
        ));

        let req = request(face, RgbaImage::new(0, 0));
        assert_eq!(Scene::build(&req, &OverlayOptions::default()).unwrap_err(), SceneError::EmptyMask);
    }

    #[test]
    fn test_normals_flat_plane_point_along_z() {
        let positions = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let normals = vertex_normals(&positions, &[[0, 1, 2]]);
        for n in normals {
            assert!((n[2].abs() - 1.0).abs() < 1e-6, "{n:?}");
        }
    }

    #[test]
    fn test_normals_are_recomputed_per_keypoint_set() {
        let face = grid_face(200.0, 100.0);
        let a = FaceGeometry::new(&face.keypoints, &face.triangulation, &face.uv);
        let b = FaceGeometry::new(&face.keypoints, &face.triangulation, &face.uv);
        assert_eq!(a.normals, b.normals);

        let mut moved = face.keypoints.clone();
        for k in moved.iter_mut() {
            k.z += k.x * 0.5;
        }
        let c = FaceGeometry::new(&moved, &face.triangulation, &face.uv);
        assert_ne!(a.normals, c.normals);
    }

    #[test]
    fn test_unreferenced_vertex_gets_default_normal() {
        let positions = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [5.0, 5.0, 5.0]];
        let normals = vertex_normals(&positions, &[[0, 1, 2]]);
        assert_eq!(normals[3], [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_background_resolves_after_decode() {
        let pending = PendingImage::new();
        let mut bg = Background::new(pending.clone(), 20, 10);
        assert!(!bg.resolve());
        assert!(bg.image().is_none());

        pending.fill(solid(40, 20, [9, 9, 9, 255]));
        assert!(bg.resolve());
        assert_eq!(bg.image().map(|i| i.dimensions()), Some((20, 10)));
    }

    #[test]
    fn test_lighting_shade_front_facing() {
        let lights = Lighting::default();
        let s = lights.shade([0.0, 0.0, 1.0]);
        let expected = 0.4 + 0.6 + 0.2 * std::f32::consts::FRAC_1_SQRT_2;
        assert!((s - expected).abs() < 1e-5, "{s}");
    }

    #[test]
    fn test_sample_bilinear_uniform() {
        let tex = solid(8, 8, [255, 0, 0, 255]);
        let s = sample_bilinear(&tex, 0.37, 0.81);
        assert!((s[0] - 1.0).abs() < 1e-6 && s[1].abs() < 1e-6 && (s[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_camera_depth_range() {
        let cam = OrthoCamera::new(10, 10);
        assert!(cam.in_depth_range(0.0));
        assert!(cam.in_depth_range(-998.0));
        assert!(!cam.in_depth_range(2000.0));
    }
}
