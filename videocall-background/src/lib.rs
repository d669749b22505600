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

//! This crate provides the virtual background pipeline of the videocall.rs
//! client: it takes the participant's camera capture, runs person segmentation
//! on every frame, composites the person over a blurred copy of the frame or
//! over a replacement image, and hands back a new stream carrying the
//! composited video and the original audio.
//!
//! The pipeline is written against the traits in [`backend`], so the same
//! lifecycle code runs in the browser ([`web`], behind the `wasm` feature) and
//! in native tests, where [`RasterSurface`] does the compositing on the CPU.
//!
//! # Outline of usage
//!
//! ```ignore
//! let compositor = WebCompositor::with_defaults();
//! compositor.set_listener(|event| match event {
//!     CompositorEvent::OutputChanged(stream) => { /* show stream or raw capture */ }
//!     CompositorEvent::ProcessingChanged(busy) => { /* spinner */ }
//!     _ => {}
//! });
//!
//! compositor.apply(Some(camera_stream), BackgroundEffect::Blur);
//! compositor.set_enabled(false); // camera toggled off, session paused
//! compositor.apply(Some(camera_stream), BackgroundEffect::None); // torn down
//! ```
//!
//! Yew apps can use the [`use_virtual_background`] hook (`yew-compat` feature)
//! instead of driving the compositor by hand.

pub mod backend;
mod compositor;
mod config;
mod constants;
mod effect;
mod error;
mod events;
mod raster;

#[cfg(feature = "wasm")]
pub mod web;

#[cfg(feature = "yew-compat")]
mod yew_compat;

pub use compositor::{compose_frame, Backdrop, BackgroundCompositor, FrameLoopStats};
pub use config::{CompositorConfig, ModelTier};
pub use effect::{BackgroundEffect, BackgroundPreset, IMAGE_PRESETS};
pub use error::CompositorError;
pub use events::{CompositorEvent, CompositorListener, CompositorPhase};
pub use raster::RasterSurface;

#[cfg(feature = "wasm")]
pub use web::{WebBackend, WebCompositor};

#[cfg(feature = "yew-compat")]
pub use yew_compat::{use_virtual_background, VirtualBackgroundState};
