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

//! Platform abstraction for the compositor.
//!
//! The compositor only talks to the outside world through the traits in this
//! module: capture streams and their tracks, a playable source video, a 2D
//! drawing surface, the person segmentation model and the host's frame
//! scheduler. The browser implementation lives in [`crate::web`]; tests drive
//! the same state machine with in-memory implementations.

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::config::{CompositorConfig, ModelTier};
use crate::error::CompositorError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Uses the dimensions a track reports, falling back per axis when one is
    /// missing or zero.
    pub fn resolve(reported: (Option<u32>, Option<u32>), fallback: FrameSize) -> Self {
        let (width, height) = reported;
        Self {
            width: width.filter(|w| *w > 0).unwrap_or(fallback.width),
            height: height.filter(|h| *h > 0).unwrap_or(fallback.height),
        }
    }
}

/// Porter-Duff operator used for the next draw call, named after the canvas
/// `globalCompositeOperation` values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompositeOp {
    #[default]
    SourceOver,
    /// Keep the new layer only where the surface already has content.
    SourceIn,
    /// Draw the new layer behind the existing content.
    DestinationOver,
}

impl CompositeOp {
    pub fn as_css(&self) -> &'static str {
        match self {
            CompositeOp::SourceOver => "source-over",
            CompositeOp::SourceIn => "source-in",
            CompositeOp::DestinationOver => "destination-over",
        }
    }
}

/// One segmentation result: the foreground mask and the frame it was computed
/// from.
#[derive(Clone, Debug)]
pub struct SegmentationResult<L> {
    pub mask: L,
    pub frame: L,
}

pub type ResultsCallback<L> = Box<dyn FnMut(SegmentationResult<L>)>;

pub trait TrackHandle: Clone + 'static {
    /// Width and height from the track settings, if the platform reports them.
    fn reported_size(&self) -> (Option<u32>, Option<u32>);

    /// An independent copy of the track that can be stopped separately.
    fn duplicate(&self) -> Self;

    fn stop(&self);
}

pub trait StreamHandle: Clone + 'static {
    type Track: TrackHandle;

    fn video_tracks(&self) -> Vec<Self::Track>;

    fn audio_tracks(&self) -> Vec<Self::Track>;

    fn tracks(&self) -> Vec<Self::Track> {
        let mut tracks = self.video_tracks();
        tracks.extend(self.audio_tracks());
        tracks
    }

    fn add_track(&self, track: &Self::Track);

    /// Identity comparison: two handles to the same underlying stream.
    fn same_as(&self, other: &Self) -> bool;
}

/// A muted, playable element bound to the capture.
pub trait SourceVideo: 'static {
    /// True once enough data is buffered to start playback.
    fn is_ready(&self) -> bool;

    /// Resolves once the element reports metadata or playable data.
    fn ready(&self) -> LocalBoxFuture<'static, ()>;

    fn play(&self) -> LocalBoxFuture<'static, Result<(), CompositorError>>;

    fn pause(&self);

    fn is_paused(&self) -> bool;

    /// Unbinds the capture from the element.
    fn detach(&self);
}

/// An off-screen 2D surface with canvas-like drawing state.
///
/// Every draw call stretches its source over the whole surface.
pub trait DrawingSurface: 'static {
    type Layer;
    type Image;

    fn size(&self) -> FrameSize;

    fn save(&mut self);

    fn restore(&mut self);

    fn clear(&mut self);

    fn set_composite_op(&mut self, op: CompositeOp);

    /// Gaussian blur applied to subsequent draws, `None` to disable.
    fn set_blur(&mut self, radius_px: Option<u32>);

    fn draw_layer(&mut self, layer: &Self::Layer);

    fn draw_image(&mut self, image: &Self::Image);
}

/// The person segmentation model.
pub trait SegmentationEngine: 'static {
    type Input;
    type Layer;

    fn set_options(&mut self, tier: ModelTier);

    /// Registers the callback invoked once per submitted frame.
    fn on_results(&mut self, callback: ResultsCallback<Self::Layer>);

    fn initialize(&mut self) -> LocalBoxFuture<'static, Result<(), CompositorError>>;

    /// Submits one frame. The returned future settles after the results
    /// callback ran for this frame, or with the engine's rejection.
    fn send(&self, input: &Self::Input) -> LocalBoxFuture<'static, Result<(), CompositorError>>;

    fn close(&mut self);
}

/// Factory and scheduler for everything a compositing session needs.
pub trait MediaBackend: 'static {
    type Stream: StreamHandle;
    type Video: SourceVideo;
    type Layer: 'static;
    type Image: 'static;
    type Surface: DrawingSurface<Layer = Self::Layer, Image = Self::Image>;
    type Engine: SegmentationEngine<Input = Self::Video, Layer = Self::Layer>;
    /// Handle of a scheduled frame callback.
    type FrameHandle: 'static;

    fn segmentation_available(&self) -> bool;

    fn attach_source(&self, capture: &Self::Stream) -> Result<Self::Video, CompositorError>;

    fn create_surface(&self, size: FrameSize) -> Result<Self::Surface, CompositorError>;

    fn create_engine(&self, config: &CompositorConfig) -> Result<Self::Engine, CompositorError>;

    fn load_image(&self, url: &str) -> LocalBoxFuture<'static, Result<Self::Image, CompositorError>>;

    /// Captures the surface as a live video stream at `fps`.
    fn capture_surface(
        &self,
        surface: &Self::Surface,
        fps: u32,
    ) -> Result<Self::Stream, CompositorError>;

    /// Runs `callback` before the next repaint.
    fn request_frame(&self, callback: Box<dyn FnOnce()>) -> Self::FrameHandle;

    fn cancel_frame(&self, handle: Self::FrameHandle);

    fn spawn_local(&self, future: LocalBoxFuture<'static, ()>);
}
