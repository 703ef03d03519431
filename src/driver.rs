//! Draw loop driver.
//!
//! The host owns frame timing. A loop is a chain of one-shot callbacks, each
//! of which requests its successor before returning. Stopping sets a
//! cancellation token that every callback checks before drawing and before
//! rescheduling, and cancels the one request that is still pending.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameRequestId(pub u64);

impl fmt::Display for FrameRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Invoked once with the frame timestamp (milliseconds) and the host's frame.
pub type FrameCallback<F> = Box<dyn FnOnce(f64, F)>;

/// Host frame scheduling primitive: an animation-frame queue for the debug
/// preview, or an immersive session for headset rendering.
///
/// Methods take `&self` because callbacks request their successor while the
/// host is still dispatching them.
pub trait FrameScheduler {
    type Frame;

    fn request_frame(&self, callback: FrameCallback<Self::Frame>) -> FrameRequestId;

    fn cancel_frame(&self, request: FrameRequestId);
}

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Rc<Cell<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

type Step<F> = Box<dyn FnMut(f64, &F)>;

struct LoopInner<S: FrameScheduler> {
    scheduler: Rc<S>,
    token: CancellationToken,
    pending: Cell<Option<FrameRequestId>>,
    step: RefCell<Step<S::Frame>>,
    frames: Cell<u64>,
}

impl<S> LoopInner<S>
where
    S: FrameScheduler + 'static,
    S::Frame: 'static,
{
    fn schedule(this: &Rc<Self>) {
        let next = Rc::clone(this);
        let request = this
            .scheduler
            .request_frame(Box::new(move |timestamp, frame| next.run(timestamp, frame)));
        this.pending.set(Some(request));
    }

    fn run(self: Rc<Self>, timestamp: f64, frame: S::Frame) {
        self.pending.set(None);
        if self.token.is_cancelled() {
            return;
        }

        (self.step.borrow_mut())(timestamp, &frame);
        self.frames.set(self.frames.get() + 1);

        if self.token.is_cancelled() {
            log::trace!("[driver] loop stopped during frame at {timestamp:.1}ms");
            return;
        }
        Self::schedule(&self);
    }
}

/// A running self-rescheduling loop. Dropping it stops it.
pub struct DrawLoop<S>
where
    S: FrameScheduler + 'static,
    S::Frame: 'static,
{
    inner: Rc<LoopInner<S>>,
}

impl<S> DrawLoop<S>
where
    S: FrameScheduler + 'static,
    S::Frame: 'static,
{
    pub fn start(scheduler: Rc<S>, step: impl FnMut(f64, &S::Frame) + 'static) -> Self {
        let inner = Rc::new(LoopInner {
            scheduler,
            token: CancellationToken::new(),
            pending: Cell::new(None),
            step: RefCell::new(Box::new(step)),
            frames: Cell::new(0),
        });
        LoopInner::schedule(&inner);
        log::debug!("[driver] draw loop started");
        Self { inner }
    }

    pub fn stop(&self) {
        if self.inner.token.is_cancelled() {
            return;
        }
        self.inner.token.cancel();
        if let Some(request) = self.inner.pending.take() {
            self.inner.scheduler.cancel_frame(request);
            log::debug!("[driver] cancelled pending frame request {request}");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.inner.token.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    pub fn pending_request(&self) -> Option<FrameRequestId> {
        self.inner.pending.get()
    }

    /// Frames whose step ran to completion.
    pub fn frames_drawn(&self) -> u64 {
        self.inner.frames.get()
    }
}

impl<S> Drop for DrawLoop<S>
where
    S: FrameScheduler + 'static,
    S::Frame: 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

/// Host-side queue of requested frame callbacks.
pub struct FrameQueue<F> {
    pending: RefCell<Vec<(FrameRequestId, FrameCallback<F>)>>,
    next_id: Cell<u64>,
}

impl<F> Default for FrameQueue<F> {
    fn default() -> Self {
        Self {
            pending: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }
}

impl<F> FrameQueue<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, callback: FrameCallback<F>) -> FrameRequestId {
        let id = FrameRequestId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.pending.borrow_mut().push((id, callback));
        id
    }

    pub fn cancel(&self, request: FrameRequestId) -> bool {
        let mut pending = self.pending.borrow_mut();
        let before = pending.len();
        pending.retain(|(id, _)| *id != request);
        before != pending.len()
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every callback requested before this call. Callbacks requested
    /// while dispatching wait for the next dispatch. Returns how many ran.
    pub fn dispatch(&self, timestamp: f64, mut frame: impl FnMut() -> F) -> usize {
        let due = std::mem::take(&mut *self.pending.borrow_mut());
        let count = due.len();
        for (_, callback) in due {
            callback(timestamp, frame());
        }
        count
    }
}

/// Animation-frame host driven by hand: each `advance` is one display
/// refresh. Demos and tests stand it in for a window's redraw cycle.
#[derive(Default)]
pub struct ManualScheduler {
    queue: FrameQueue<()>,
    cancelled: Cell<u64>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, timestamp: f64) -> usize {
        self.queue.dispatch(timestamp, || ())
    }

    pub fn pending_requests(&self) -> usize {
        self.queue.len()
    }

    pub fn cancelled_requests(&self) -> u64 {
        self.cancelled.get()
    }
}

impl FrameScheduler for ManualScheduler {
    type Frame = ();

    fn request_frame(&self, callback: FrameCallback<()>) -> FrameRequestId {
        self.queue.push(callback)
    }

    fn cancel_frame(&self, request: FrameRequestId) {
        if self.queue.cancel(request) {
            self.cancelled.set(self.cancelled.get() + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_loop(scheduler: &Rc<ManualScheduler>) -> (DrawLoop<ManualScheduler>, Rc<Cell<u32>>) {
        let count = Rc::new(Cell::new(0));
        let seen = Rc::clone(&count);
        let draw_loop = DrawLoop::start(Rc::clone(scheduler), move |_, _| seen.set(seen.get() + 1));
        (draw_loop, count)
    }

    #[test]
    fn loop_reschedules_every_frame() {
        let scheduler = Rc::new(ManualScheduler::new());
        let (draw_loop, count) = counting_loop(&scheduler);

        assert_eq!(scheduler.pending_requests(), 1);
        for frame in 0..5 {
            assert_eq!(scheduler.advance(frame as f64 * 16.0), 1);
            assert_eq!(scheduler.pending_requests(), 1);
        }
        assert_eq!(count.get(), 5);
        assert_eq!(draw_loop.frames_drawn(), 5);
    }

    #[test]
    fn stop_cancels_exactly_the_pending_request() {
        let scheduler = Rc::new(ManualScheduler::new());
        let (draw_loop, count) = counting_loop(&scheduler);
        scheduler.advance(0.0);

        draw_loop.stop();
        assert!(!draw_loop.is_running());
        assert_eq!(scheduler.pending_requests(), 0);
        assert_eq!(scheduler.cancelled_requests(), 1);

        draw_loop.stop();
        assert_eq!(scheduler.cancelled_requests(), 1);

        scheduler.advance(16.0);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn in_flight_callback_does_not_resurrect_stopped_loop() {
        let scheduler = Rc::new(ManualScheduler::new());
        let token_slot: Rc<RefCell<Option<CancellationToken>>> = Rc::new(RefCell::new(None));
        let count = Rc::new(Cell::new(0));

        let slot = Rc::clone(&token_slot);
        let seen = Rc::clone(&count);
        let draw_loop = DrawLoop::start(Rc::clone(&scheduler), move |_, _| {
            seen.set(seen.get() + 1);
            // a stop racing with this callback
            if let Some(token) = slot.borrow().as_ref() {
                token.cancel();
            }
        });
        *token_slot.borrow_mut() = Some(draw_loop.token());

        scheduler.advance(0.0);
        assert_eq!(count.get(), 1);
        assert_eq!(scheduler.pending_requests(), 0);
        assert!(draw_loop.pending_request().is_none());
    }

    #[test]
    fn dropping_the_loop_stops_it() {
        let scheduler = Rc::new(ManualScheduler::new());
        let (draw_loop, count) = counting_loop(&scheduler);
        drop(draw_loop);

        assert_eq!(scheduler.pending_requests(), 0);
        scheduler.advance(0.0);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn queue_defers_requests_made_during_dispatch() {
        let queue: Rc<FrameQueue<u32>> = Rc::new(FrameQueue::new());
        let inner = Rc::clone(&queue);
        queue.push(Box::new(move |_, frame| {
            assert_eq!(frame, 7);
            inner.push(Box::new(|_, _| {}));
        }));

        assert_eq!(queue.dispatch(1.0, || 7), 1);
        assert_eq!(queue.len(), 1);
    }
}
