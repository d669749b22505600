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

//! Browser implementation of [`MediaBackend`] on `web-sys`.
//!
//! Requires the MediaPipe selfie segmentation script to be loaded by the page;
//! without it [`MediaBackend::segmentation_available`] is false and the
//! compositor passes the capture through untouched.

mod media;
mod segmentation;
mod surface;

pub use media::WebVideo;
pub use segmentation::WebSegmentation;
pub use surface::CanvasSurface;

use futures::future::LocalBoxFuture;
use gloo::render::{request_animation_frame, AnimationFrame};
use js_sys::Reflect;
use wasm_bindgen::JsValue;
use web_sys::{HtmlImageElement, MediaStream};

use crate::backend::{FrameSize, MediaBackend};
use crate::compositor::BackgroundCompositor;
use crate::config::CompositorConfig;
use crate::error::CompositorError;

pub type WebCompositor = BackgroundCompositor<WebBackend>;

impl WebCompositor {
    pub fn with_defaults() -> Self {
        BackgroundCompositor::new(WebBackend, CompositorConfig::default())
    }
}

pub(crate) fn js_error(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    Reflect::get(value, &JsValue::from_str("message"))
        .ok()
        .and_then(|message| message.as_string())
        .unwrap_or_else(|| format!("{value:?}"))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WebBackend;

impl MediaBackend for WebBackend {
    type Stream = MediaStream;
    type Video = WebVideo;
    type Layer = JsValue;
    type Image = HtmlImageElement;
    type Surface = CanvasSurface;
    type Engine = WebSegmentation;
    type FrameHandle = AnimationFrame;

    fn segmentation_available(&self) -> bool {
        segmentation::is_available()
    }

    fn attach_source(&self, capture: &MediaStream) -> Result<WebVideo, CompositorError> {
        WebVideo::attach(capture)
    }

    fn create_surface(&self, size: FrameSize) -> Result<CanvasSurface, CompositorError> {
        CanvasSurface::new(size)
    }

    fn create_engine(&self, config: &CompositorConfig) -> Result<WebSegmentation, CompositorError> {
        WebSegmentation::new(config)
    }

    fn load_image(
        &self,
        url: &str,
    ) -> LocalBoxFuture<'static, Result<HtmlImageElement, CompositorError>> {
        media::load_image(url)
    }

    fn capture_surface(
        &self,
        surface: &CanvasSurface,
        fps: u32,
    ) -> Result<MediaStream, CompositorError> {
        surface.capture_stream(fps)
    }

    fn request_frame(&self, callback: Box<dyn FnOnce()>) -> AnimationFrame {
        request_animation_frame(move |_timestamp| callback())
    }

    // Dropping the handle calls cancelAnimationFrame.
    fn cancel_frame(&self, handle: AnimationFrame) {
        drop(handle);
    }

    fn spawn_local(&self, future: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(future);
    }
}
