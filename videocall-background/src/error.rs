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

//! Error types for the background compositor.

use thiserror::Error;

/// Failures the compositor can run into. None of them is fatal: every one of
/// them ends with the raw capture being shown without an effect.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompositorError {
    /// The segmentation runtime is not loaded in this environment.
    #[error("person segmentation is not available")]
    SegmentationUnavailable,

    #[error("could not attach capture to a video element: {0}")]
    Source(String),

    #[error("could not create drawing surface: {0}")]
    Surface(String),

    #[error("segmentation engine failed to initialize: {0}")]
    EngineInit(String),

    /// A single frame was rejected by the engine.
    #[error("segmentation error: {0}")]
    Segmentation(String),

    #[error("failed to load background image {url}: {reason}")]
    ImageLoad { url: String, reason: String },

    #[error("source video failed to play: {0}")]
    Playback(String),

    #[error("could not capture surface as a stream: {0}")]
    Capture(String),
}
