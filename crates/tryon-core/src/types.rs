use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use image::RgbaImage;

/// A detected 3-D facial landmark in source-image pixel space.
///
/// `z` is relative depth, on roughly the same scale as `x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Texture coordinate paired positionally with a keypoint.
pub type Uv = [f32; 2];

/// Index triple into the keypoint set.
pub type Triangle = [u32; 3];

/// Keypoints of one face together with the provider's fixed topology.
///
/// Triangulation and UVs are shared across detections; only the keypoints
/// change from image to image.
#[derive(Debug, Clone)]
pub struct FaceLandmarks {
    pub keypoints: Vec<Keypoint>,
    pub triangulation: Arc<[Triangle]>,
    pub uv: Arc<[Uv]>,
}

/// Mask tint color, multiplied into the texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tint {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Tint {
    pub const WHITE: Tint = Tint { r: 255, g: 255, b: 255 };

    /// Channel multipliers in [0, 1].
    pub fn factors(&self) -> [f32; 3] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        ]
    }
}

impl Default for Tint {
    fn default() -> Self {
        Self::WHITE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid tint {0:?}: expected #rrggbb")]
pub struct TintParseError(pub String);

impl FromStr for Tint {
    type Err = TintParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().strip_prefix('#').unwrap_or(s.trim());
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(TintParseError(s.to_string()));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| TintParseError(s.to_string()))
        };
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }
}

impl TryFrom<String> for Tint {
    type Error = TintParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Tint> for String {
    fn from(tint: Tint) -> Self {
        tint.to_string()
    }
}

impl fmt::Display for Tint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Caller-supplied material and debug parameters, re-applied on every build.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayOptions {
    pub tint: Tint,
    /// Mask opacity in [0, 1].
    pub opacity: f32,
    pub wireframe: bool,
    /// Draw the light sample points and direction arrow over each frame.
    pub debug: bool,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            tint: Tint::WHITE,
            opacity: 0.8,
            wireframe: false,
            debug: false,
        }
    }
}

/// Write-once image slot filled by an asynchronous decode.
///
/// Readers see either nothing or the complete image, never a partial one.
#[derive(Debug, Clone, Default)]
pub struct PendingImage {
    slot: Arc<OnceLock<RgbaImage>>,
}

impl PendingImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A slot that is already decoded.
    pub fn ready(image: RgbaImage) -> Self {
        let pending = Self::new();
        pending.fill(image);
        pending
    }

    /// Store the decoded image. Returns false if the slot was already filled.
    pub fn fill(&self, image: RgbaImage) -> bool {
        self.slot.set(image).is_ok()
    }

    pub fn is_ready(&self) -> bool {
        self.slot.get().is_some()
    }

    pub fn get(&self) -> Option<&RgbaImage> {
        self.slot.get()
    }
}

/// Everything one render cycle needs. Immutable once handed to the scene builder.
#[derive(Debug, Clone)]
pub struct OverlayRequest {
    pub keypoints: Vec<Keypoint>,
    pub triangulation: Arc<[Triangle]>,
    pub uv: Arc<[Uv]>,
    pub width: u32,
    pub height: u32,
    /// Decoded makeup texture. Sessions only start once the mask is available.
    pub mask: RgbaImage,
    /// The source photo; may still be decoding when the session starts.
    pub background: PendingImage,
}

impl OverlayRequest {
    pub fn new(
        landmarks: FaceLandmarks,
        width: u32,
        height: u32,
        mask: RgbaImage,
        background: PendingImage,
    ) -> Self {
        Self {
            keypoints: landmarks.keypoints,
            triangulation: landmarks.triangulation,
            uv: landmarks.uv,
            width,
            height,
            mask,
            background,
        }
    }
}

/// User-visible failure notices raised by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NoFaceDetected,
    DecodeFailed(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NoFaceDetected => write!(f, "No face detected."),
            Notice::DecodeFailed(what) => write!(f, "Could not load image: {what}"),
        }
    }
}

/// Receives user-visible notices.
pub trait Notifier {
    fn notify(&mut self, notice: Notice);
}

impl Notifier for Vec<Notice> {
    fn notify(&mut self, notice: Notice) {
        self.push(notice);
    }
}
