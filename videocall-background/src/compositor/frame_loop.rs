/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use log::{debug, warn};
use std::cell::RefCell;
use std::rc::Rc;

use crate::backend::{MediaBackend, SegmentationEngine};

/// Counters of one session's frame loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameLoopStats {
    pub submitted: u64,
    pub failed: u64,
    pub paused: bool,
    /// A frame callback is currently scheduled with the host.
    pub scheduled: bool,
}

//
// LoopState holds the flags shared between the session owner and the
// scheduled frame callbacks. A frame callback only ever reschedules itself
// after its submission settled, so at most one submission is in flight and
// at most one callback is pending.
//
struct LoopState<H> {
    stopped: bool,
    paused: bool,
    in_flight: bool,
    pending: Option<H>,
    stats: FrameLoopStats,
}

pub(crate) struct FrameLoop<B: MediaBackend> {
    backend: Rc<B>,
    engine: Rc<RefCell<B::Engine>>,
    video: Rc<B::Video>,
    state: RefCell<LoopState<B::FrameHandle>>,
}

impl<B: MediaBackend> FrameLoop<B> {
    pub(crate) fn new(
        backend: Rc<B>,
        engine: Rc<RefCell<B::Engine>>,
        video: Rc<B::Video>,
    ) -> Rc<Self> {
        Rc::new(Self {
            backend,
            engine,
            video,
            state: RefCell::new(LoopState {
                stopped: false,
                paused: false,
                in_flight: false,
                pending: None,
                stats: FrameLoopStats::default(),
            }),
        })
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.state.borrow().stopped
    }

    pub(crate) fn stats(&self) -> FrameLoopStats {
        let state = self.state.borrow();
        FrameLoopStats {
            paused: state.paused,
            scheduled: state.pending.is_some(),
            ..state.stats
        }
    }

    /// Submits the first frame right away.
    pub(crate) fn start(self: &Rc<Self>) {
        Rc::clone(self).tick();
    }

    /// Stops submitting frames without releasing anything.
    pub(crate) fn pause(&self) {
        let pending = {
            let mut state = self.state.borrow_mut();
            state.paused = true;
            state.pending.take()
        };
        if let Some(handle) = pending {
            self.backend.cancel_frame(handle);
        }
    }

    pub(crate) fn resume(self: &Rc<Self>) {
        self.state.borrow_mut().paused = false;
        self.schedule_next();
    }

    /// Marks the loop stopped and cancels the scheduled callback. A
    /// submission still in flight settles without rescheduling.
    pub(crate) fn stop(&self) {
        let pending = {
            let mut state = self.state.borrow_mut();
            state.stopped = true;
            state.pending.take()
        };
        if let Some(handle) = pending {
            self.backend.cancel_frame(handle);
        }
    }

    fn tick(self: Rc<Self>) {
        {
            let mut state = self.state.borrow_mut();
            // The handle of the callback being run is spent.
            state.pending = None;
            if state.stopped || state.paused || state.in_flight {
                return;
            }
            state.in_flight = true;
            state.stats.submitted += 1;
        }

        let submission = self.engine.borrow().send(&self.video);
        let frame_loop = Rc::clone(&self);
        self.backend.spawn_local(Box::pin(async move {
            let result = submission.await;
            {
                let mut state = frame_loop.state.borrow_mut();
                state.in_flight = false;
                if let Err(e) = &result {
                    state.stats.failed += 1;
                    warn!("Segmentation error: {e}");
                }
            }
            frame_loop.schedule_next();
        }));
    }

    fn schedule_next(self: &Rc<Self>) {
        {
            let state = self.state.borrow();
            if state.stopped || state.paused || state.in_flight || state.pending.is_some() {
                return;
            }
        }
        let frame_loop = Rc::clone(self);
        let handle = self.backend.request_frame(Box::new(move || frame_loop.tick()));

        let mut state = self.state.borrow_mut();
        if state.stopped || state.paused {
            drop(state);
            debug!("frame loop halted while scheduling, cancelling");
            self.backend.cancel_frame(handle);
        } else {
            state.pending = Some(handle);
        }
    }
}
