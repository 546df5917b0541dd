//! Cooperative per-frame scheduling.
//!
//! The host owns the frame clock (a display callback, a headless driver, a
//! test). Tasks run to completion once per frame; a task that returns
//! `ControlFlow::Break` is disposed and never runs again.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A repeating unit of per-frame work.
pub trait FrameTask {
    /// Run one iteration. `Break` ends the task.
    fn run_frame(&mut self) -> ControlFlow<()>;

    /// Release held resources. Called exactly once, when the task ends or is cancelled.
    fn dispose(&mut self) {}
}

/// Identifies a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

/// Source of per-frame callbacks.
pub trait FrameScheduler {
    fn schedule(&mut self, task: Box<dyn FrameTask>) -> FrameHandle;

    /// Remove a pending task without running it again. Returns it so the
    /// caller can dispose of it; `None` if it already finished.
    fn cancel(&mut self, handle: FrameHandle) -> Option<Box<dyn FrameTask>>;
}

/// Shared cancellation flag for one session.
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// A flag in the running state.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame driver ticked by the host.
#[derive(Default)]
pub struct FrameDriver {
    next_handle: u64,
    frame: u64,
    tasks: Vec<(FrameHandle, Box<dyn FrameTask>)>,
}

impl FrameDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live tasks.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_scheduled(&self, handle: FrameHandle) -> bool {
        self.tasks.iter().any(|(h, _)| *h == handle)
    }

    /// Frames ticked so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Run every live task once. Returns how many ran.
    pub fn tick(&mut self) -> usize {
        self.frame += 1;
        let ran = self.tasks.len();
        let mut i = 0;
        while i < self.tasks.len() {
            match self.tasks[i].1.run_frame() {
                ControlFlow::Continue(()) => i += 1,
                ControlFlow::Break(()) => {
                    let (handle, mut task) = self.tasks.remove(i);
                    task.dispose();
                    tracing::trace!(?handle, frame = self.frame, "frame task finished");
                }
            }
        }
        ran
    }
}

impl FrameScheduler for FrameDriver {
    fn schedule(&mut self, task: Box<dyn FrameTask>) -> FrameHandle {
        self.next_handle += 1;
        let handle = FrameHandle(self.next_handle);
        self.tasks.push((handle, task));
        handle
    }

    fn cancel(&mut self, handle: FrameHandle) -> Option<Box<dyn FrameTask>> {
        let pos = self.tasks.iter().position(|(h, _)| *h == handle)?;
        Some(self.tasks.remove(pos).1)
    }
}
