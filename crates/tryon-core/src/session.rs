//! Render session: the live state of one overlay and its per-frame loop.

use crate::debug;
use crate::light::LightEstimator;
use crate::raster::Renderer;
use crate::scene::Scene;
use crate::scheduler::{FrameTask, RunFlag};
use crate::surface::Surface;
use std::cell::RefCell;
use std::fmt;
use std::ops::ControlFlow;
use std::rc::Rc;

/// Target surface shared between the lifecycle manager and the active session.
pub type SharedSurface<S> = Rc<RefCell<S>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handed to a session factory by the lifecycle manager.
#[derive(Debug)]
pub struct SessionContext<S> {
    pub id: SessionId,
    pub running: RunFlag,
    pub target: SharedSurface<S>,
}

/// One active overlay: scene, renderer, light state and target.
pub struct RenderSession<R, S> {
    id: SessionId,
    running: RunFlag,
    scene: Scene,
    renderer: R,
    light: LightEstimator,
    samples: Option<[(u32, u32); 5]>,
    target: SharedSurface<S>,
    debug: bool,
    frames: u64,
}

impl<R: Renderer, S: Surface> RenderSession<R, S> {
    /// Take over the target surface, sized to the scene and blank.
    pub fn new(ctx: SessionContext<S>, scene: Scene, renderer: R, debug: bool) -> Self {
        match ctx.target.try_borrow_mut() {
            Ok(mut target) => target.resize(scene.width, scene.height),
            Err(_) => tracing::warn!(
                session = %ctx.id,
                width = scene.width,
                height = scene.height,
                "target surface busy; resizing on first frame"
            ),
        }
        Self {
            id: ctx.id,
            running: ctx.running,
            scene,
            renderer,
            light: LightEstimator::new(),
            samples: None,
            target: ctx.target,
            debug,
            frames: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn run_flag(&self) -> &RunFlag {
        &self.running
    }

    pub fn light(&self) -> &LightEstimator {
        &self.light
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl<R: Renderer, S: Surface> FrameTask for RenderSession<R, S> {
    fn run_frame(&mut self) -> ControlFlow<()> {
        if !self.running.is_running() {
            return ControlFlow::Break(());
        }

        // Light from the photo; skipped until the background has decoded.
        self.scene.background.resolve();
        if let Some(bg) = self.scene.background.image() {
            let keypoints = &self.scene.geometry.keypoints;
            if let Some(estimate) = self.light.estimate(bg, keypoints, self.scene.width, self.scene.height) {
                self.samples = Some(estimate.sampled_points);
            }
        }
        self.scene.lights.key.direction = self.light.direction();

        let frame = match self.renderer.render(&self.scene) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(session = %self.id, error = %err, "render failed; stopping session");
                self.running.stop();
                return ControlFlow::Break(());
            }
        };

        let Ok(mut target) = self.target.try_borrow_mut() else {
            tracing::warn!(session = %self.id, "target surface busy; skipping frame");
            return ControlFlow::Continue(());
        };

        // Clear, photo, overlay: one borrow, no yield in between.
        if (target.width(), target.height()) != (self.scene.width, self.scene.height) {
            target.resize(self.scene.width, self.scene.height);
        }
        target.clear();
        match self.scene.background.image() {
            Some(bg) => target.draw_image(bg, 0, 0),
            None => tracing::trace!(session = %self.id, "background still decoding; drawing overlay alone"),
        }
        target.draw_image(frame, 0, 0);

        if self.debug {
            if let Some(samples) = &self.samples {
                debug::draw_light_debug(&mut *target, samples, self.light.smoothed());
            }
        }

        self.frames += 1;
        ControlFlow::Continue(())
    }

    fn dispose(&mut self) {
        self.running.stop();
        self.renderer.release();
        tracing::debug!(session = %self.id, frames = self.frames, "session disposed");
    }
}
