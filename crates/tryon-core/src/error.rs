use crate::landmarks::LandmarkError;
use crate::lifecycle::LifecycleError;
use crate::raster::RenderError;
use crate::scene::SceneError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TryOnError {
    #[error("landmark error: {0}")]
    Landmark(#[from] LandmarkError),
    #[error("scene error: {0}")]
    Scene(#[from] SceneError),
    #[error("render error: {0}")]
    Render(#[from] RenderError),
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}
