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

//! The background compositor: one owned compositing session at a time, driven
//! by the capture handle, the effect selection and the enabled flag.

mod draw;
mod frame_loop;
mod session;

pub use draw::{compose_frame, Backdrop};
pub use frame_loop::FrameLoopStats;

use log::{debug, error, info, warn};
use std::cell::RefCell;
use std::rc::Rc;

use crate::backend::{
    FrameSize, MediaBackend, SegmentationEngine, SourceVideo, StreamHandle, TrackHandle,
};
use crate::config::CompositorConfig;
use crate::effect::BackgroundEffect;
use crate::error::CompositorError;
use crate::events::{CompositorEvent, CompositorListener, CompositorPhase};
use session::{Session, SessionParts};

type Events<B> = Vec<CompositorEvent<<B as MediaBackend>::Stream>>;

/// [BackgroundCompositor] replaces the background of a camera capture with a
/// blur or an image and re-exports the result as a new stream.
///
/// The caller feeds it the current inputs through [`apply`](Self::apply) and
/// [`set_enabled`](Self::set_enabled) and reads back
/// [`output`](Self::output) / [`is_processing`](Self::is_processing), or
/// subscribes with [`set_listener`](Self::set_listener).
///
/// At most one session exists at a time. Starting a new one tears the previous
/// one down first: its frame loop is cancelled, its segmentation engine closed,
/// its source video unbound and every track of the stream it published
/// stopped. Dropping the compositor does the same.
///
/// All failures degrade to "no effect": [`output`](Self::output) becomes `None`
/// and [`effective_stream`](Self::effective_stream) hands back the raw capture.
pub struct BackgroundCompositor<B: MediaBackend> {
    shared: Rc<Shared<B>>,
}

struct Shared<B: MediaBackend> {
    backend: Rc<B>,
    config: CompositorConfig,
    inner: RefCell<Inner<B>>,
    listener: RefCell<Option<CompositorListener<B::Stream>>>,
}

struct Inner<B: MediaBackend> {
    capture: Option<B::Stream>,
    effect: BackgroundEffect,
    enabled: bool,
    session: Option<Session<B>>,
    output: Option<B::Stream>,
    phase: CompositorPhase,
    processing: bool,
    next_session_id: u64,
}

struct Launch<B: MediaBackend> {
    id: u64,
    capture: B::Stream,
    effect: BackgroundEffect,
}

impl<B: MediaBackend> BackgroundCompositor<B> {
    /// Creates an idle compositor. The upstream video is assumed enabled until
    /// told otherwise.
    pub fn new(backend: B, config: CompositorConfig) -> Self {
        Self {
            shared: Rc::new(Shared {
                backend: Rc::new(backend),
                config,
                inner: RefCell::new(Inner {
                    capture: None,
                    effect: BackgroundEffect::None,
                    enabled: true,
                    session: None,
                    output: None,
                    phase: CompositorPhase::Idle,
                    processing: false,
                    next_session_id: 1,
                }),
                listener: RefCell::new(None),
            }),
        }
    }

    pub fn set_listener(&self, listener: impl Fn(&CompositorEvent<B::Stream>) + 'static) {
        *self.shared.listener.borrow_mut() = Some(Rc::new(listener));
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.shared.config
    }

    /// Updates the capture and effect. A new session is started only when
    /// either one actually changed.
    pub fn apply(&self, capture: Option<B::Stream>, effect: BackgroundEffect) {
        let changed = {
            let mut inner = self.shared.inner.borrow_mut();
            let capture_changed = match (&inner.capture, &capture) {
                (Some(current), Some(next)) => !current.same_as(next),
                (None, None) => false,
                _ => true,
            };
            let effect_changed = inner.effect != effect;
            inner.capture = capture;
            inner.effect = effect;
            capture_changed || effect_changed
        };
        if changed {
            self.shared.start();
        }
    }

    /// Tears down the current session and starts over with the current inputs.
    pub fn restart(&self) {
        self.shared.start();
    }

    /// Pauses or resumes frame processing without tearing the session down.
    pub fn set_enabled(&self, enabled: bool) {
        let mut events = Vec::new();
        let resumed = {
            let mut inner = self.shared.inner.borrow_mut();
            if inner.enabled == enabled {
                return;
            }
            inner.enabled = enabled;
            // A session still coming up picks the flag up once it is playing.
            let parts = match inner.session.as_ref() {
                Some(session) if session.running => session.parts(),
                _ => return,
            };
            if enabled {
                inner.set_phase(CompositorPhase::Running, &mut events);
                Some(parts)
            } else {
                parts.frame_loop.pause();
                if !parts.video.is_paused() {
                    parts.video.pause();
                }
                inner.set_phase(CompositorPhase::Paused, &mut events);
                None
            }
        };
        if let Some(parts) = resumed {
            parts.frame_loop.resume();
            if parts.video.is_paused() {
                let playing = parts.video.play();
                self.shared.backend.spawn_local(Box::pin(async move {
                    if let Err(e) = playing.await {
                        warn!("Virtual background video failed to play on toggle: {e}");
                    }
                }));
            }
        }
        self.shared.emit(events);
    }

    /// Tears everything down. The inputs are kept, [`restart`](Self::restart)
    /// brings the effect back.
    pub fn stop(&self) {
        let mut events = Vec::new();
        self.shared.inner.borrow_mut().teardown(&mut events);
        self.shared.emit(events);
    }

    /// The processed stream, if a session published one.
    pub fn output(&self) -> Option<B::Stream> {
        self.shared.inner.borrow().output.clone()
    }

    /// The stream to display: the processed one when available, the raw
    /// capture otherwise.
    pub fn effective_stream(&self) -> Option<B::Stream> {
        let inner = self.shared.inner.borrow();
        inner.output.clone().or_else(|| inner.capture.clone())
    }

    pub fn is_processing(&self) -> bool {
        self.shared.inner.borrow().processing
    }

    pub fn phase(&self) -> CompositorPhase {
        self.shared.inner.borrow().phase
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.inner.borrow().enabled
    }

    pub fn effect(&self) -> BackgroundEffect {
        self.shared.inner.borrow().effect.clone()
    }

    pub fn session_id(&self) -> Option<u64> {
        self.shared.inner.borrow().session.as_ref().map(|s| s.id)
    }

    /// Size of the current session's drawing surface.
    pub fn surface_size(&self) -> Option<FrameSize> {
        self.shared.inner.borrow().session.as_ref().map(|s| s.size)
    }

    pub fn stats(&self) -> Option<FrameLoopStats> {
        self.shared
            .inner
            .borrow()
            .session
            .as_ref()
            .map(|s| s.frame_loop.stats())
    }
}

impl<B: MediaBackend> Drop for BackgroundCompositor<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<B: MediaBackend> Inner<B> {
    fn is_current(&self, id: u64) -> bool {
        self.session.as_ref().is_some_and(|s| s.id == id)
    }

    fn set_phase(&mut self, phase: CompositorPhase, events: &mut Events<B>) {
        if self.phase != phase {
            debug!("compositor phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
            events.push(CompositorEvent::PhaseChanged(phase));
        }
    }

    fn set_processing(&mut self, processing: bool, events: &mut Events<B>) {
        if self.processing != processing {
            self.processing = processing;
            events.push(CompositorEvent::ProcessingChanged(processing));
        }
    }

    // Stops every track of the stream we handed out before letting go of it.
    fn replace_output(&mut self, output: Option<B::Stream>, events: &mut Events<B>) {
        let previous = self.output.take();
        if let Some(previous) = &previous {
            for track in previous.tracks() {
                track.stop();
            }
        }
        if previous.is_some() || output.is_some() {
            self.output = output.clone();
            events.push(CompositorEvent::OutputChanged(output));
        }
    }

    fn teardown(&mut self, events: &mut Events<B>) {
        if let Some(session) = self.session.as_mut() {
            session.release();
        }
        if self.session.take().is_some() {
            self.set_phase(CompositorPhase::Stopped, events);
        }
        self.replace_output(None, events);
        self.set_processing(false, events);
    }
}

impl<B: MediaBackend> Shared<B> {
    fn emit(&self, events: Events<B>) {
        if events.is_empty() {
            return;
        }
        let listener = self.listener.borrow().clone();
        if let Some(listener) = listener {
            for event in &events {
                listener(event);
            }
        }
    }

    fn is_current(&self, id: u64) -> bool {
        self.inner.borrow().is_current(id)
    }

    fn parts_of(&self, id: u64) -> Option<SessionParts<B>> {
        self.inner
            .borrow()
            .session
            .as_ref()
            .filter(|s| s.id == id)
            .map(|s| s.parts())
    }

    fn start(self: &Rc<Self>) {
        let mut events = Vec::new();
        let launch = {
            let mut inner = self.inner.borrow_mut();
            inner.teardown(&mut events);
            match self.prepare(&mut inner, &mut events) {
                Ok(launch) => launch,
                Err(e) => {
                    error!("Could not start virtual background: {e}");
                    inner.teardown(&mut events);
                    if inner.phase == CompositorPhase::Initializing {
                        inner.set_phase(CompositorPhase::Stopped, &mut events);
                    }
                    events.push(CompositorEvent::Error(e));
                    None
                }
            }
        };
        self.emit(events);
        if let Some(launch) = launch {
            let shared = Rc::clone(self);
            self.backend.spawn_local(Box::pin(shared.launch(launch)));
        }
    }

    // Synchronous part of a session start: everything up to the first await.
    fn prepare(
        &self,
        inner: &mut Inner<B>,
        events: &mut Events<B>,
    ) -> Result<Option<Launch<B>>, CompositorError> {
        let Some(capture) = inner.capture.clone() else {
            debug!("no capture, nothing to composite");
            return Ok(None);
        };
        if inner.effect.is_none() {
            return Ok(None);
        }
        let Some(track) = capture.video_tracks().into_iter().next() else {
            debug!("capture has no video track, passing it through");
            return Ok(None);
        };
        if !self.backend.segmentation_available() {
            return Err(CompositorError::SegmentationUnavailable);
        }

        let id = inner.next_session_id;
        inner.next_session_id += 1;
        inner.set_processing(true, events);
        inner.set_phase(CompositorPhase::Initializing, events);

        let size = FrameSize::resolve(track.reported_size(), self.config.fallback_size());
        let surface = self.backend.create_surface(size)?;
        let video = self.backend.attach_source(&capture)?;
        let mut engine = match self.backend.create_engine(&self.config) {
            Ok(engine) => engine,
            Err(e) => {
                video.detach();
                return Err(e);
            }
        };
        engine.set_options(self.config.model_tier);

        debug!(
            "starting background session {id} ({}) at {}x{}",
            inner.effect, size.width, size.height
        );
        inner.session = Some(Session::new(
            Rc::clone(&self.backend),
            id,
            inner.effect.clone(),
            size,
            video,
            surface,
            engine,
        ));
        Ok(Some(Launch {
            id,
            capture,
            effect: inner.effect.clone(),
        }))
    }

    async fn launch(self: Rc<Self>, launch: Launch<B>) {
        let id = launch.id;
        if let Err(e) = self.bring_up(launch).await {
            self.abort(id, e);
        }
    }

    // Asynchronous part of a session start. After every await the session may
    // have been superseded or torn down; its resources are already released
    // then and the step simply returns.
    async fn bring_up(&self, launch: Launch<B>) -> Result<(), CompositorError> {
        let Launch {
            id,
            capture,
            effect,
        } = launch;

        let backdrop = match &effect {
            BackgroundEffect::None => return Ok(()),
            BackgroundEffect::Blur => Backdrop::Blur {
                radius_px: self.config.blur_radius_px,
            },
            BackgroundEffect::Image { url } => {
                let loading = self.backend.load_image(url);
                Backdrop::Image(loading.await?)
            }
        };
        let Some(parts) = self.parts_of(id) else {
            debug!("background session {id} superseded while loading");
            return Ok(());
        };

        {
            let surface = Rc::clone(&parts.surface);
            let frame_loop = Rc::downgrade(&parts.frame_loop);
            parts
                .engine
                .borrow_mut()
                .on_results(Box::new(move |result| {
                    let live = frame_loop.upgrade().is_some_and(|l| !l.is_stopped());
                    if live {
                        compose_frame(&mut *surface.borrow_mut(), &result, &backdrop);
                    }
                }));
        }

        let initializing = parts.engine.borrow_mut().initialize();
        initializing.await?;
        if !self.is_current(id) {
            return Ok(());
        }

        let output = {
            let surface = parts.surface.borrow();
            self.backend
                .capture_surface(&surface, self.config.capture_fps)?
        };
        for track in capture.audio_tracks() {
            output.add_track(&track.duplicate());
        }
        if !self.publish(id, output) {
            return Ok(());
        }
        // The listener saw the new output and may have torn the session down.
        if !self.is_current(id) {
            return Ok(());
        }

        if !parts.video.is_ready() {
            let ready = parts.video.ready();
            ready.await;
            if !self.is_current(id) {
                return Ok(());
            }
        }
        let playing = parts.video.play();
        playing.await?;

        self.mark_running(id, &parts);
        Ok(())
    }

    // Hands the re-exported stream to the caller. A stream produced for a
    // session that is gone is stopped right away.
    fn publish(&self, id: u64, output: B::Stream) -> bool {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.is_current(id) {
                for track in output.tracks() {
                    track.stop();
                }
                return false;
            }
            inner.replace_output(Some(output), &mut events);
        }
        self.emit(events);
        true
    }

    fn mark_running(&self, id: u64, parts: &SessionParts<B>) {
        let mut events = Vec::new();
        let enabled = {
            let mut inner = self.inner.borrow_mut();
            if !inner.is_current(id) {
                return;
            }
            let enabled = inner.enabled;
            if let Some(session) = inner.session.as_mut() {
                session.running = true;
                info!(
                    "background session {id} running ({}) at {}x{}",
                    session.effect, session.size.width, session.size.height
                );
            }
            let phase = if enabled {
                CompositorPhase::Running
            } else {
                CompositorPhase::Paused
            };
            inner.set_phase(phase, &mut events);
            inner.set_processing(false, &mut events);
            enabled
        };
        if enabled {
            parts.frame_loop.start();
        } else {
            parts.frame_loop.pause();
            parts.video.pause();
        }
        self.emit(events);
    }

    fn abort(&self, id: u64, error: CompositorError) {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.is_current(id) {
                debug!("ignoring failure of superseded session {id}: {error}");
                return;
            }
            error!("Virtual background session {id} aborted: {error}");
            inner.teardown(&mut events);
        }
        events.push(CompositorEvent::Error(error));
        self.emit(events);
    }
}
