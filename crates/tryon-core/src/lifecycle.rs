//! Session lifecycle: at most one live overlay per target surface.
//!
//! Every new overlay starts with `begin`, which tears the previous session
//! down before anything else happens and hands out a ticket. Work that
//! finishes after a newer `begin` (or a `teardown`) presents a stale ticket
//! and is refused, so an old decode can never resurrect a session.

use crate::error::TryOnError;
use crate::scheduler::{FrameHandle, FrameScheduler, FrameTask, RunFlag};
use crate::session::{SessionContext, SessionId, SharedSurface};
use crate::surface::Surface;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("overlay request superseded (ticket {ticket}, current {current})")]
    Superseded { ticket: u64, current: u64 },
}

/// Proof that the caller tore down the previous session. Consumed by `start`.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a ticket does nothing until passed to start"]
pub struct Ticket {
    generation: u64,
}

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
struct ActiveSession {
    id: SessionId,
    running: RunFlag,
    handle: FrameHandle,
}

pub struct SessionManager<F, S> {
    scheduler: F,
    target: SharedSurface<S>,
    generation: u64,
    next_id: u64,
    active: Option<ActiveSession>,
}

impl<F: FrameScheduler, S: Surface> SessionManager<F, S> {
    pub fn new(scheduler: F, target: SharedSurface<S>) -> Self {
        Self {
            scheduler,
            target,
            generation: 0,
            next_id: 0,
            active: None,
        }
    }

    pub fn scheduler(&self) -> &F {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut F {
        &mut self.scheduler
    }

    pub fn target(&self) -> &SharedSurface<S> {
        &self.target
    }

    /// Current generation; bumped by every `teardown`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The most recently started session, if not torn down.
    pub fn active_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Whether a session is started and its loop has not stopped.
    pub fn is_active(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.running.is_running())
    }

    /// Stop the active session, release its renderer and blank the target.
    ///
    /// Safe to call repeatedly. Returns whether a session was torn down.
    pub fn teardown(&mut self) -> bool {
        self.generation += 1;
        let Some(active) = self.active.take() else {
            return false;
        };

        active.running.stop();
        match self.scheduler.cancel(active.handle) {
            Some(mut task) => task.dispose(),
            // Already ended on its own and was disposed by the scheduler.
            None => tracing::debug!(session = %active.id, "session had already stopped"),
        }

        match self.target.try_borrow_mut() {
            Ok(mut target) => target.clear(),
            Err(_) => tracing::warn!(session = %active.id, "target surface busy; not cleared"),
        }

        tracing::info!(session = %active.id, "session torn down");
        true
    }

    /// Tear down the current session and reserve the right to start the next.
    pub fn begin(&mut self) -> Ticket {
        self.teardown();
        Ticket { generation: self.generation }
    }

    /// Build a session with `factory` and schedule it.
    ///
    /// Fails with `Superseded` without calling `factory` if another `begin`
    /// or `teardown` happened since `ticket` was issued. A failing factory
    /// leaves the target blank and nothing scheduled.
    pub fn start<T, G>(&mut self, ticket: Ticket, factory: G) -> Result<SessionId, TryOnError>
    where
        T: FrameTask + 'static,
        G: FnOnce(SessionContext<S>) -> Result<T, TryOnError>,
    {
        if ticket.generation != self.generation {
            tracing::debug!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding stale overlay request"
            );
            return Err(LifecycleError::Superseded {
                ticket: ticket.generation,
                current: self.generation,
            }
            .into());
        }

        self.next_id += 1;
        let id = SessionId(self.next_id);
        let running = RunFlag::new();
        let task = factory(SessionContext {
            id,
            running: running.clone(),
            target: self.target.clone(),
        })?;

        let handle = self.scheduler.schedule(Box::new(task));
        self.active = Some(ActiveSession { id, running, handle });
        tracing::info!(session = %id, "session started");
        Ok(id)
    }

    /// `begin` followed immediately by `start`.
    pub fn replace<T, G>(&mut self, factory: G) -> Result<SessionId, TryOnError>
    where
        T: FrameTask + 'static,
        G: FnOnce(SessionContext<S>) -> Result<T, TryOnError>,
    {
        let ticket = self.begin();
        self.start(ticket, factory)
    }
}

impl<F, S> Drop for SessionManager<F, S> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.running.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::FrameDriver;
    use crate::surface::Canvas;
    use std::cell::{Cell, RefCell};
    use std::ops::ControlFlow;
    use std::rc::Rc;

    #[derive(Default)]
    struct Tally {
        runs: Cell<u32>,
        disposed: Cell<u32>,
    }

    struct Task {
        tally: Rc<Tally>,
        running: RunFlag,
        target: SharedSurface<Canvas>,
    }

    impl FrameTask for Task {
        fn run_frame(&mut self) -> ControlFlow<()> {
            if !self.running.is_running() {
                return ControlFlow::Break(());
            }
            self.tally.runs.set(self.tally.runs.get() + 1);
            self.target.borrow_mut().blend_pixel(0, 0, image::Rgba([255, 255, 255, 255]));
            ControlFlow::Continue(())
        }

        fn dispose(&mut self) {
            self.tally.disposed.set(self.tally.disposed.get() + 1);
        }
    }

    fn manager() -> SessionManager<FrameDriver, Canvas> {
        SessionManager::new(FrameDriver::new(), Rc::new(RefCell::new(Canvas::new(2, 2))))
    }

    fn factory(tally: &Rc<Tally>) -> impl FnOnce(SessionContext<Canvas>) -> Result<Task, TryOnError> {
        let tally = tally.clone();
        move |ctx| {
            Ok(Task {
                tally,
                running: ctx.running,
                target: ctx.target,
            })
        }
    }

    #[test]
    fn test_start_schedules_task() {
        let mut m = manager();
        let tally = Rc::new(Tally::default());
        let ticket = m.begin();
        let id = m.start(ticket, factory(&tally)).unwrap();
        assert_eq!(m.active_id(), Some(id));
        assert!(m.is_active());
        m.scheduler_mut().tick();
        assert_eq!(tally.runs.get(), 1);
    }

    #[test]
    fn test_replace_disposes_previous_session() {
        let mut m = manager();
        let first = Rc::new(Tally::default());
        let second = Rc::new(Tally::default());
        m.replace(factory(&first)).unwrap();
        m.scheduler_mut().tick();
        m.replace(factory(&second)).unwrap();
        m.scheduler_mut().tick();
        m.scheduler_mut().tick();

        assert_eq!(first.runs.get(), 1);
        assert_eq!(first.disposed.get(), 1);
        assert_eq!(second.runs.get(), 2);
        assert_eq!(m.scheduler().pending(), 1);
    }

    #[test]
    fn test_teardown_is_idempotent_and_clears_target() {
        let mut m = manager();
        let tally = Rc::new(Tally::default());
        m.replace(factory(&tally)).unwrap();
        m.scheduler_mut().tick();
        assert_eq!(m.target().borrow().read_pixel(0, 0), Some(image::Rgba([255, 255, 255, 255])));

        assert!(m.teardown());
        assert!(!m.teardown());
        assert_eq!(tally.disposed.get(), 1);
        assert_eq!(m.target().borrow().read_pixel(0, 0), Some(image::Rgba([0, 0, 0, 0])));
        assert!(m.active_id().is_none());
        assert_eq!(m.scheduler().pending(), 0);
    }

    #[test]
    fn test_stale_ticket_is_refused() {
        let mut m = manager();
        let a = Rc::new(Tally::default());
        let b = Rc::new(Tally::default());

        // Request A begins, then B arrives before A's decode finishes.
        let ticket_a = m.begin();
        let ticket_b = m.begin();
        m.start(ticket_b, factory(&b)).unwrap();

        let err = m.start(ticket_a, factory(&a)).unwrap_err();
        assert!(matches!(err, TryOnError::Lifecycle(LifecycleError::Superseded { .. })));

        m.scheduler_mut().tick();
        assert_eq!(a.runs.get(), 0);
        assert_eq!(b.runs.get(), 1);
        assert_eq!(m.scheduler().pending(), 1);
    }

    #[test]
    fn test_teardown_invalidates_outstanding_ticket() {
        let mut m = manager();
        let tally = Rc::new(Tally::default());
        let ticket = m.begin();
        m.teardown();
        assert!(m.start(ticket, factory(&tally)).is_err());
        assert_eq!(m.scheduler().pending(), 0);
    }

    #[test]
    fn test_failed_factory_schedules_nothing() {
        let mut m = manager();
        let tally = Rc::new(Tally::default());
        m.replace(factory(&tally)).unwrap();

        let err = m
            .replace(|_ctx: SessionContext<Canvas>| -> Result<Task, TryOnError> {
                Err(crate::scene::SceneError::NoKeypoints.into())
            })
            .unwrap_err();
        assert!(matches!(err, TryOnError::Scene(_)));
        assert_eq!(tally.disposed.get(), 1);
        assert_eq!(m.scheduler().pending(), 0);
        assert!(m.active_id().is_none());
    }

    #[test]
    fn test_self_stopped_session_teardown() {
        let mut m = manager();
        let tally = Rc::new(Tally::default());
        let ticket = m.begin();
        let mut flag = None;
        let tally2 = tally.clone();
        m.start(ticket, |ctx: SessionContext<Canvas>| {
            flag = Some(ctx.running.clone());
            factory(&tally2)(ctx)
        })
        .unwrap();
        flag.unwrap().stop();
        m.scheduler_mut().tick();
        assert!(!m.is_active());
        // Scheduler already disposed it; teardown must not dispose twice.
        assert!(m.teardown());
        assert_eq!(tally.disposed.get(), 1);
    }
}
