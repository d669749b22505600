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

use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

use super::frame_loop::FrameLoop;
use crate::backend::{FrameSize, MediaBackend, SegmentationEngine, SourceVideo};
use crate::effect::BackgroundEffect;

/// The resources of one compositing run.
///
/// A session is owned by the compositor; replacing it always goes through
/// [`Session::release`], which stops the frame loop, closes the engine and
/// unbinds the source video. Dropping a session releases it as well.
pub(crate) struct Session<B: MediaBackend> {
    pub(crate) id: u64,
    pub(crate) effect: BackgroundEffect,
    pub(crate) size: FrameSize,
    pub(crate) video: Rc<B::Video>,
    pub(crate) surface: Rc<RefCell<B::Surface>>,
    pub(crate) engine: Rc<RefCell<B::Engine>>,
    pub(crate) frame_loop: Rc<FrameLoop<B>>,
    /// Set once playback started and the first frame went out.
    pub(crate) running: bool,
    released: bool,
}

/// Shared handles into a session, cloned out so async steps never hold a
/// borrow of the compositor across an await.
pub(crate) struct SessionParts<B: MediaBackend> {
    pub(crate) video: Rc<B::Video>,
    pub(crate) surface: Rc<RefCell<B::Surface>>,
    pub(crate) engine: Rc<RefCell<B::Engine>>,
    pub(crate) frame_loop: Rc<FrameLoop<B>>,
}

impl<B: MediaBackend> Session<B> {
    pub(crate) fn new(
        backend: Rc<B>,
        id: u64,
        effect: BackgroundEffect,
        size: FrameSize,
        video: B::Video,
        surface: B::Surface,
        engine: B::Engine,
    ) -> Self {
        let video = Rc::new(video);
        let engine = Rc::new(RefCell::new(engine));
        let frame_loop = FrameLoop::new(backend, Rc::clone(&engine), Rc::clone(&video));
        Self {
            id,
            effect,
            size,
            video,
            surface: Rc::new(RefCell::new(surface)),
            engine,
            frame_loop,
            running: false,
            released: false,
        }
    }

    pub(crate) fn parts(&self) -> SessionParts<B> {
        SessionParts {
            video: Rc::clone(&self.video),
            surface: Rc::clone(&self.surface),
            engine: Rc::clone(&self.engine),
            frame_loop: Rc::clone(&self.frame_loop),
        }
    }

    pub(crate) fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        debug!("releasing background session {}", self.id);
        self.frame_loop.stop();
        self.engine.borrow_mut().close();
        self.video.pause();
        self.video.detach();
    }
}

impl<B: MediaBackend> Drop for Session<B> {
    fn drop(&mut self) {
        self.release();
    }
}
