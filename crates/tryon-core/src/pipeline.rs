//! Overlay entry points: scene construction plus session start in one call.

use crate::error::TryOnError;
use crate::lifecycle::{SessionManager, Ticket};
use crate::raster::Renderer;
use crate::scene::Scene;
use crate::scheduler::FrameScheduler;
use crate::session::{RenderSession, SessionId};
use crate::surface::Surface;
use crate::types::{OverlayOptions, OverlayRequest};

/// Build the scene for `request` and start its render loop under `ticket`.
///
/// The caller obtained `ticket` from `manager.begin()` before any
/// asynchronous work (mask decode) so the previous overlay is already gone.
pub fn start_overlay<F, S, R>(
    manager: &mut SessionManager<F, S>,
    ticket: Ticket,
    request: &OverlayRequest,
    options: &OverlayOptions,
    renderer: R,
) -> Result<SessionId, TryOnError>
where
    F: FrameScheduler,
    S: Surface + 'static,
    R: Renderer + 'static,
{
    manager.start(ticket, |ctx| {
        let scene = Scene::build(request, options)?;
        tracing::debug!(
            session = %ctx.id,
            width = scene.width,
            height = scene.height,
            vertices = scene.geometry.vertex_count(),
            triangles = scene.geometry.indices.len(),
            depth = scene.mask_transform.position[2],
            wireframe = scene.wireframe.is_some(),
            "scene built"
        );
        Ok(RenderSession::new(ctx, scene, renderer, options.debug))
    })
}

/// Replace whatever overlay is showing with a new one.
pub fn apply_overlay<F, S, R>(
    manager: &mut SessionManager<F, S>,
    request: &OverlayRequest,
    options: &OverlayOptions,
    renderer: R,
) -> Result<SessionId, TryOnError>
where
    F: FrameScheduler,
    S: Surface + 'static,
    R: Renderer + 'static,
{
    let ticket = manager.begin();
    start_overlay(manager, ticket, request, options, renderer)
}
