//! tryon-core: Virtual makeup try-on engine.
//!
//! Detects a face mesh, estimates scene lighting from the photo and
//! composites a tinted makeup texture over it every frame, with at most one
//! live overlay per target surface.

pub mod compare;
pub mod debug;
pub mod error;
pub mod landmarks;
pub mod lifecycle;
pub mod light;
pub mod pipeline;
pub mod raster;
pub mod scene;
pub mod scheduler;
pub mod session;
pub mod surface;
pub mod types;

#[cfg(test)]
mod testutil;

pub use error::TryOnError;
pub use landmarks::{detect_landmarks, LandmarkError, LandmarkProvider};
pub use lifecycle::{LifecycleError, SessionManager, Ticket};
pub use light::{LightEstimate, LightEstimator};
pub use pipeline::{apply_overlay, start_overlay};
pub use raster::{RenderError, Renderer, SoftwareRenderer};
pub use scene::{Scene, SceneError};
pub use scheduler::{FrameDriver, FrameScheduler, FrameTask, RunFlag};
pub use session::{RenderSession, SessionId, SharedSurface};
pub use surface::{Canvas, Surface};
pub use types::{
    FaceLandmarks, Keypoint, Notice, Notifier, OverlayOptions, OverlayRequest, PendingImage, Tint, Triangle, Uv,
};
