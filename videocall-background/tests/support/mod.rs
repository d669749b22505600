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
 */

//! In-memory media backend for compositor tests.
//!
//! Every resource the compositor creates is recorded here so tests can check
//! what is alive, what was stopped and what was drawn. Async work runs on a
//! `LocalPool` that tests advance explicitly, and frame callbacks only fire
//! when a test asks for the next frame.

#![allow(dead_code)]

use futures::channel::oneshot;
use futures::executor::{LocalPool, LocalSpawner};
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use image::{Rgba, RgbaImage};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use videocall_background::backend::{
    CompositeOp, DrawingSurface, FrameSize, MediaBackend, ResultsCallback, SegmentationEngine,
    SegmentationResult, SourceVideo, StreamHandle, TrackHandle,
};
use videocall_background::{
    BackgroundCompositor, CompositorConfig, CompositorError, CompositorEvent, ModelTier,
    RasterSurface,
};

pub const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
pub const BROKEN_URL: &str = "https://example.com/missing.jpg";
pub const OFFICE_URL: &str = "https://example.com/office.jpg";

thread_local! {
    static NEXT_ID: Cell<u64> = const { Cell::new(1) };
}

fn next_id() -> u64 {
    NEXT_ID.with(|id| {
        let value = id.get();
        id.set(value + 1);
        value
    })
}

// ---------------------------------------------------------------------------
// Streams and tracks
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug)]
struct TrackState {
    id: u64,
    kind: TrackKind,
    width: Option<u32>,
    height: Option<u32>,
    origin: Option<u64>,
    stops: Cell<u32>,
}

#[derive(Clone, Debug)]
pub struct MockTrack {
    inner: Rc<TrackState>,
}

impl MockTrack {
    fn build(kind: TrackKind, width: Option<u32>, height: Option<u32>, origin: Option<u64>) -> Self {
        Self {
            inner: Rc::new(TrackState {
                id: next_id(),
                kind,
                width,
                height,
                origin,
                stops: Cell::new(0),
            }),
        }
    }

    pub fn video(width: Option<u32>, height: Option<u32>) -> Self {
        Self::build(TrackKind::Video, width, height, None)
    }

    pub fn audio() -> Self {
        Self::build(TrackKind::Audio, None, None, None)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    /// Id of the track this one was duplicated from.
    pub fn origin(&self) -> Option<u64> {
        self.inner.origin
    }

    pub fn stop_count(&self) -> u32 {
        self.inner.stops.get()
    }
}

impl TrackHandle for MockTrack {
    fn reported_size(&self) -> (Option<u32>, Option<u32>) {
        (self.inner.width, self.inner.height)
    }

    fn duplicate(&self) -> Self {
        Self::build(
            self.inner.kind,
            self.inner.width,
            self.inner.height,
            Some(self.inner.id),
        )
    }

    fn stop(&self) {
        self.inner.stops.set(self.inner.stops.get() + 1);
    }
}

#[derive(Debug)]
struct StreamState {
    id: u64,
    tracks: RefCell<Vec<MockTrack>>,
    capture_fps: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct MockStream {
    inner: Rc<StreamState>,
}

impl MockStream {
    fn build(tracks: Vec<MockTrack>, capture_fps: Option<u32>) -> Self {
        Self {
            inner: Rc::new(StreamState {
                id: next_id(),
                tracks: RefCell::new(tracks),
                capture_fps,
            }),
        }
    }

    pub fn new(tracks: Vec<MockTrack>) -> Self {
        Self::build(tracks, None)
    }

    /// Camera + microphone capture with the given video dimensions.
    pub fn camera(width: u32, height: u32) -> Self {
        Self::new(vec![
            MockTrack::video(Some(width), Some(height)),
            MockTrack::audio(),
        ])
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Frame rate the stream was captured from a surface with, if it was.
    pub fn capture_fps(&self) -> Option<u32> {
        self.inner.capture_fps
    }

    pub fn all_tracks(&self) -> Vec<MockTrack> {
        self.inner.tracks.borrow().clone()
    }

    fn of_kind(&self, kind: TrackKind) -> Vec<MockTrack> {
        self.inner
            .tracks
            .borrow()
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }
}

impl StreamHandle for MockStream {
    type Track = MockTrack;

    fn video_tracks(&self) -> Vec<MockTrack> {
        self.of_kind(TrackKind::Video)
    }

    fn audio_tracks(&self) -> Vec<MockTrack> {
        self.of_kind(TrackKind::Audio)
    }

    fn add_track(&self, track: &MockTrack) {
        self.inner.tracks.borrow_mut().push(track.clone());
    }

    fn same_as(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

// ---------------------------------------------------------------------------
// Source video
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct VideoState {
    pub ready: Cell<bool>,
    pub paused: Cell<bool>,
    pub detached: Cell<bool>,
    pub play_calls: Cell<u32>,
    pub fail_play: Cell<bool>,
    waiters: RefCell<Vec<oneshot::Sender<()>>>,
}

impl VideoState {
    fn make_ready(&self) {
        self.ready.set(true);
        for waiter in self.waiters.borrow_mut().drain(..) {
            let _ = waiter.send(());
        }
    }
}

pub struct MockVideo {
    state: Rc<VideoState>,
}

impl SourceVideo for MockVideo {
    fn is_ready(&self) -> bool {
        self.state.ready.get()
    }

    fn ready(&self) -> LocalBoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel();
        if self.state.ready.get() {
            let _ = tx.send(());
        } else {
            self.state.waiters.borrow_mut().push(tx);
        }
        Box::pin(async move {
            let _ = rx.await;
        })
    }

    fn play(&self) -> LocalBoxFuture<'static, Result<(), CompositorError>> {
        self.state.play_calls.set(self.state.play_calls.get() + 1);
        let result = if self.state.fail_play.get() {
            Err(CompositorError::Playback("NotAllowedError".to_string()))
        } else {
            self.state.paused.set(false);
            Ok(())
        };
        Box::pin(async move { result })
    }

    fn pause(&self) {
        self.state.paused.set(true);
    }

    fn is_paused(&self) -> bool {
        self.state.paused.get()
    }

    // Detaching drops pending readiness waiters, like `emptied` in a browser.
    fn detach(&self) {
        self.state.detached.set(true);
        self.state.waiters.borrow_mut().clear();
    }
}

// ---------------------------------------------------------------------------
// Drawing surface
// ---------------------------------------------------------------------------

/// Raster surface that publishes a copy of its pixels after every
/// `restore`, i.e. after every composed frame.
pub struct MockSurface {
    raster: RasterSurface,
    sink: Rc<BackendState>,
}

impl DrawingSurface for MockSurface {
    type Layer = RgbaImage;
    type Image = RgbaImage;

    fn size(&self) -> FrameSize {
        self.raster.size()
    }

    fn save(&mut self) {
        self.raster.save();
    }

    fn restore(&mut self) {
        self.raster.restore();
        *self.sink.last_composite.borrow_mut() = Some(self.raster.pixels().clone());
        self.sink.composites.set(self.sink.composites.get() + 1);
    }

    fn clear(&mut self) {
        self.raster.clear();
    }

    fn set_composite_op(&mut self, op: CompositeOp) {
        self.raster.set_composite_op(op);
    }

    fn set_blur(&mut self, radius_px: Option<u32>) {
        self.raster.set_blur(radius_px);
    }

    fn draw_layer(&mut self, layer: &RgbaImage) {
        self.raster.draw_layer(layer);
    }

    fn draw_image(&mut self, image: &RgbaImage) {
        self.raster.draw_image(image);
    }
}

// ---------------------------------------------------------------------------
// Segmentation engine
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct EngineState {
    pub id: u64,
    pub closed: Cell<bool>,
    pub initialized: Cell<bool>,
    pub tier: Cell<Option<ModelTier>>,
    pub sent: Cell<u32>,
    pub delivered: Cell<u32>,
    callback: RefCell<Option<ResultsCallback<RgbaImage>>>,
}

impl EngineState {
    pub fn has_callback(&self) -> bool {
        self.callback.borrow().is_some()
    }
}

pub struct MockEngine {
    state: Rc<EngineState>,
    backend: Rc<BackendState>,
}

impl SegmentationEngine for MockEngine {
    type Input = MockVideo;
    type Layer = RgbaImage;

    fn set_options(&mut self, tier: ModelTier) {
        self.state.tier.set(Some(tier));
    }

    fn on_results(&mut self, callback: ResultsCallback<RgbaImage>) {
        *self.state.callback.borrow_mut() = Some(callback);
    }

    fn initialize(&mut self) -> LocalBoxFuture<'static, Result<(), CompositorError>> {
        let state = Rc::clone(&self.state);
        let fail = self.backend.fail_init.get();
        let gate = if self.backend.defer_init.get() {
            let (tx, rx) = oneshot::channel();
            self.backend.pending_inits.borrow_mut().push(tx);
            Some(rx)
        } else {
            None
        };
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.await
                    .map_err(|_| CompositorError::EngineInit("cancelled".to_string()))?;
            }
            if fail {
                return Err(CompositorError::EngineInit("model download failed".to_string()));
            }
            state.initialized.set(true);
            Ok(())
        })
    }

    fn send(&self, _input: &MockVideo) -> LocalBoxFuture<'static, Result<(), CompositorError>> {
        self.state.sent.set(self.state.sent.get() + 1);
        let reject = self.backend.reject_frames.get();
        if reject > 0 {
            self.backend.reject_frames.set(reject - 1);
            return Box::pin(async { Err(CompositorError::Segmentation("frame rejected".to_string())) });
        }
        let state = Rc::clone(&self.state);
        let result = SegmentationResult {
            mask: self.backend.mask.clone(),
            frame: self.backend.frame.clone(),
        };
        Box::pin(async move {
            if state.closed.get() {
                return Ok(());
            }
            if let Some(callback) = state.callback.borrow_mut().as_mut() {
                callback(result);
                state.delivered.set(state.delivered.get() + 1);
            }
            Ok(())
        })
    }

    fn close(&mut self) {
        self.state.closed.set(true);
        self.state.callback.borrow_mut().take();
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

pub struct BackendState {
    spawner: LocalSpawner,
    pub segmentation_available: Cell<bool>,
    pub fail_surface: Cell<bool>,
    pub fail_init: Cell<bool>,
    pub defer_init: Cell<bool>,
    pub defer_images: Cell<bool>,
    pub fail_play: Cell<bool>,
    pub videos_ready: Cell<bool>,
    /// Number of upcoming frame submissions the engine rejects.
    pub reject_frames: Cell<u32>,
    pub mask: RgbaImage,
    pub frame: RgbaImage,
    pub background: RgbaImage,
    pending_inits: RefCell<Vec<oneshot::Sender<()>>>,
    pending_images: RefCell<Vec<oneshot::Sender<()>>>,
    pub engines: RefCell<Vec<Rc<EngineState>>>,
    pub max_live_engines: Cell<usize>,
    pub videos: RefCell<Vec<Rc<VideoState>>>,
    pub surfaces: RefCell<Vec<FrameSize>>,
    pub outputs: RefCell<Vec<MockStream>>,
    frames: RefCell<BTreeMap<u64, Box<dyn FnOnce()>>>,
    next_frame: Cell<u64>,
    pub max_pending_frames: Cell<usize>,
    pub cancelled_frames: Cell<u32>,
    pub last_composite: RefCell<Option<RgbaImage>>,
    pub composites: Cell<u32>,
}

#[derive(Clone)]
pub struct MockBackend {
    pub state: Rc<BackendState>,
}

/// Opaque on the left half, transparent on the right half.
pub fn half_mask(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

impl MockBackend {
    /// Backend whose engine returns `width`x`height` results: a red frame with
    /// the person on the left half. Background images are solid blue.
    pub fn new(spawner: LocalSpawner, width: u32, height: u32) -> Self {
        Self {
            state: Rc::new(BackendState {
                spawner,
                segmentation_available: Cell::new(true),
                fail_surface: Cell::new(false),
                fail_init: Cell::new(false),
                defer_init: Cell::new(false),
                defer_images: Cell::new(false),
                fail_play: Cell::new(false),
                videos_ready: Cell::new(true),
                reject_frames: Cell::new(0),
                mask: half_mask(width, height),
                frame: RgbaImage::from_pixel(width, height, RED),
                background: RgbaImage::from_pixel(width, height, BLUE),
                pending_inits: RefCell::new(Vec::new()),
                pending_images: RefCell::new(Vec::new()),
                engines: RefCell::new(Vec::new()),
                max_live_engines: Cell::new(0),
                videos: RefCell::new(Vec::new()),
                surfaces: RefCell::new(Vec::new()),
                outputs: RefCell::new(Vec::new()),
                frames: RefCell::new(BTreeMap::new()),
                next_frame: Cell::new(1),
                max_pending_frames: Cell::new(0),
                cancelled_frames: Cell::new(0),
                last_composite: RefCell::new(None),
                composites: Cell::new(0),
            }),
        }
    }

    pub fn live_engines(&self) -> usize {
        self.state
            .engines
            .borrow()
            .iter()
            .filter(|e| !e.closed.get())
            .count()
    }

    pub fn engine(&self, index: usize) -> Rc<EngineState> {
        Rc::clone(&self.state.engines.borrow()[index])
    }

    pub fn engine_count(&self) -> usize {
        self.state.engines.borrow().len()
    }

    pub fn video(&self, index: usize) -> Rc<VideoState> {
        Rc::clone(&self.state.videos.borrow()[index])
    }

    pub fn output(&self, index: usize) -> MockStream {
        self.state.outputs.borrow()[index].clone()
    }

    pub fn pending_frames(&self) -> usize {
        self.state.frames.borrow().len()
    }

    pub fn release_inits(&self) {
        for gate in self.state.pending_inits.borrow_mut().drain(..) {
            let _ = gate.send(());
        }
    }

    pub fn release_images(&self) {
        for gate in self.state.pending_images.borrow_mut().drain(..) {
            let _ = gate.send(());
        }
    }

    pub fn make_videos_ready(&self) {
        for video in self.state.videos.borrow().iter() {
            video.make_ready();
        }
    }

    /// Runs every frame callback scheduled so far.
    pub fn fire_frames(&self) {
        let due = std::mem::take(&mut *self.state.frames.borrow_mut());
        for (_, callback) in due {
            callback();
        }
    }

    pub fn last_composite(&self) -> Option<RgbaImage> {
        self.state.last_composite.borrow().clone()
    }
}

impl MediaBackend for MockBackend {
    type Stream = MockStream;
    type Video = MockVideo;
    type Layer = RgbaImage;
    type Image = RgbaImage;
    type Surface = MockSurface;
    type Engine = MockEngine;
    type FrameHandle = u64;

    fn segmentation_available(&self) -> bool {
        self.state.segmentation_available.get()
    }

    fn attach_source(&self, _capture: &MockStream) -> Result<MockVideo, CompositorError> {
        let video = Rc::new(VideoState::default());
        video.ready.set(self.state.videos_ready.get());
        video.paused.set(true);
        video.fail_play.set(self.state.fail_play.get());
        self.state.videos.borrow_mut().push(Rc::clone(&video));
        Ok(MockVideo { state: video })
    }

    fn create_surface(&self, size: FrameSize) -> Result<MockSurface, CompositorError> {
        if self.state.fail_surface.get() {
            return Err(CompositorError::Surface(
                "could not get 2D context from canvas".to_string(),
            ));
        }
        self.state.surfaces.borrow_mut().push(size);
        Ok(MockSurface {
            raster: RasterSurface::new(size),
            sink: Rc::clone(&self.state),
        })
    }

    fn create_engine(&self, _config: &CompositorConfig) -> Result<MockEngine, CompositorError> {
        let engine = Rc::new(EngineState {
            id: next_id(),
            ..EngineState::default()
        });
        self.state.engines.borrow_mut().push(Rc::clone(&engine));
        let live = self.live_engines();
        if live > self.state.max_live_engines.get() {
            self.state.max_live_engines.set(live);
        }
        Ok(MockEngine {
            state: engine,
            backend: Rc::clone(&self.state),
        })
    }

    fn load_image(&self, url: &str) -> LocalBoxFuture<'static, Result<RgbaImage, CompositorError>> {
        let url = url.to_string();
        let image = self.state.background.clone();
        let gate = if self.state.defer_images.get() {
            let (tx, rx) = oneshot::channel();
            self.state.pending_images.borrow_mut().push(tx);
            Some(rx)
        } else {
            None
        };
        Box::pin(async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if url == BROKEN_URL {
                Err(CompositorError::ImageLoad {
                    url,
                    reason: "404".to_string(),
                })
            } else {
                Ok(image)
            }
        })
    }

    fn capture_surface(&self, surface: &MockSurface, fps: u32) -> Result<MockStream, CompositorError> {
        let size = surface.size();
        let stream = MockStream::build(
            vec![MockTrack::video(Some(size.width), Some(size.height))],
            Some(fps),
        );
        self.state.outputs.borrow_mut().push(stream.clone());
        Ok(stream)
    }

    fn request_frame(&self, callback: Box<dyn FnOnce()>) -> u64 {
        let id = self.state.next_frame.get();
        self.state.next_frame.set(id + 1);
        let mut frames = self.state.frames.borrow_mut();
        frames.insert(id, callback);
        if frames.len() > self.state.max_pending_frames.get() {
            self.state.max_pending_frames.set(frames.len());
        }
        id
    }

    fn cancel_frame(&self, handle: u64) {
        if self.state.frames.borrow_mut().remove(&handle).is_some() {
            self.state
                .cancelled_frames
                .set(self.state.cancelled_frames.get() + 1);
        }
    }

    fn spawn_local(&self, future: LocalBoxFuture<'static, ()>) {
        self.state
            .spawner
            .spawn_local(future)
            .expect("local pool is alive");
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub pool: LocalPool,
    pub backend: MockBackend,
    pub compositor: BackgroundCompositor<MockBackend>,
    pub events: Rc<RefCell<Vec<CompositorEvent<MockStream>>>>,
}

impl Harness {
    /// Harness whose engine produces 16x8 results.
    pub fn new() -> Self {
        Self::with_result_size(16, 8)
    }

    pub fn with_result_size(width: u32, height: u32) -> Self {
        Self::build(width, height, CompositorConfig::default())
    }

    pub fn build(width: u32, height: u32, config: CompositorConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let pool = LocalPool::new();
        let backend = MockBackend::new(pool.spawner(), width, height);
        let compositor = BackgroundCompositor::new(backend.clone(), config);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        compositor.set_listener(move |event: &CompositorEvent<MockStream>| {
            sink.borrow_mut().push(event.clone())
        });
        Self {
            pool,
            backend,
            compositor,
            events,
        }
    }

    /// Runs every spawned task until none can make progress.
    pub fn settle(&mut self) {
        self.pool.run_until_stalled();
    }

    /// Fires the scheduled frame callbacks and settles.
    pub fn next_frame(&mut self) {
        self.backend.fire_frames();
        self.settle();
    }

    pub fn take_events(&self) -> Vec<CompositorEvent<MockStream>> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn errors(&self) -> Vec<CompositorError> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                CompositorEvent::Error(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }
}
