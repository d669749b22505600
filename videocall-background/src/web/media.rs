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

//! Streams, tracks, the source video element and background image loading.

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use gloo::events::EventListener;
use js_sys::{Function, Object, Reflect};
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{HtmlImageElement, HtmlVideoElement, MediaStream, MediaStreamTrack};

use super::js_error;
use crate::backend::{SourceVideo, StreamHandle, TrackHandle};
use crate::constants::HAVE_FUTURE_DATA;
use crate::error::CompositorError;

fn settings_dimension(settings: &JsValue, key: &str) -> Option<u32> {
    Reflect::get(settings, &JsValue::from_str(key))
        .ok()
        .and_then(|value| value.as_f64())
        .filter(|value| *value > 0.0)
        .map(|value| value as u32)
}

impl TrackHandle for MediaStreamTrack {
    fn reported_size(&self) -> (Option<u32>, Option<u32>) {
        let settings: JsValue = self.get_settings().into();
        (
            settings_dimension(&settings, "width"),
            settings_dimension(&settings, "height"),
        )
    }

    fn duplicate(&self) -> Self {
        // MediaStreamTrack.clone() collides with Clone::clone, call it by name.
        Reflect::get(self, &JsValue::from_str("clone"))
            .and_then(|clone| clone.dyn_into::<Function>().map_err(JsValue::from))
            .and_then(|clone| clone.call0(self))
            .map(|track| track.unchecked_into::<MediaStreamTrack>())
            .unwrap_or_else(|e| {
                log::warn!("could not clone track {}: {}", self.id(), js_error(&e));
                self.clone()
            })
    }

    fn stop(&self) {
        MediaStreamTrack::stop(self);
    }
}

fn collect_tracks(tracks: js_sys::Array) -> Vec<MediaStreamTrack> {
    tracks
        .iter()
        .map(|track| track.unchecked_into::<MediaStreamTrack>())
        .collect()
}

impl StreamHandle for MediaStream {
    type Track = MediaStreamTrack;

    fn video_tracks(&self) -> Vec<MediaStreamTrack> {
        collect_tracks(self.get_video_tracks())
    }

    fn audio_tracks(&self) -> Vec<MediaStreamTrack> {
        collect_tracks(self.get_audio_tracks())
    }

    fn tracks(&self) -> Vec<MediaStreamTrack> {
        collect_tracks(self.get_tracks())
    }

    fn add_track(&self, track: &MediaStreamTrack) {
        MediaStream::add_track(self, track);
    }

    fn same_as(&self, other: &Self) -> bool {
        Object::is(self, other)
    }
}

/// Off-DOM `<video>` element playing the capture, muted.
pub struct WebVideo {
    element: HtmlVideoElement,
}

impl WebVideo {
    pub(super) fn attach(capture: &MediaStream) -> Result<Self, CompositorError> {
        let element = gloo_utils::document()
            .create_element("video")
            .map_err(|e| CompositorError::Source(js_error(&e)))?
            .dyn_into::<HtmlVideoElement>()
            .map_err(|_| CompositorError::Source("not a video element".to_string()))?;
        element.set_muted(true);
        if let Err(e) = element.set_attribute("playsinline", "") {
            debug!("could not mark source video playsinline: {}", js_error(&e));
        }
        element.set_src_object(Some(capture));
        Ok(Self { element })
    }

    pub fn element(&self) -> &HtmlVideoElement {
        &self.element
    }
}

impl SourceVideo for WebVideo {
    fn is_ready(&self) -> bool {
        self.element.ready_state() >= HAVE_FUTURE_DATA
    }

    fn ready(&self) -> LocalBoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel::<()>();
        let tx = Rc::new(RefCell::new(Some(tx)));
        // `emptied` fires when the element is detached, so a torn-down
        // session does not wait forever.
        let listeners: Vec<EventListener> = ["loadedmetadata", "canplay", "emptied", "error"]
            .into_iter()
            .map(|event| {
                let tx = Rc::clone(&tx);
                EventListener::once(&self.element, event, move |_| {
                    if let Some(tx) = tx.borrow_mut().take() {
                        let _ = tx.send(());
                    }
                })
            })
            .collect();
        Box::pin(async move {
            let _ = rx.await;
            drop(listeners);
        })
    }

    fn play(&self) -> LocalBoxFuture<'static, Result<(), CompositorError>> {
        let started = self.element.play();
        Box::pin(async move {
            let promise = started.map_err(|e| CompositorError::Playback(js_error(&e)))?;
            JsFuture::from(promise)
                .await
                .map(|_| ())
                .map_err(|e| CompositorError::Playback(js_error(&e)))
        })
    }

    fn pause(&self) {
        if let Err(e) = self.element.pause() {
            debug!("source video pause threw: {}", js_error(&e));
        }
    }

    fn is_paused(&self) -> bool {
        self.element.paused()
    }

    fn detach(&self) {
        self.element.set_src_object(None);
    }
}

/// Loads a cross-origin image and resolves once it is decoded.
pub(super) fn load_image(url: &str) -> LocalBoxFuture<'static, Result<HtmlImageElement, CompositorError>> {
    let url = url.to_string();
    let image = match HtmlImageElement::new() {
        Ok(image) => image,
        Err(e) => {
            let reason = js_error(&e);
            return Box::pin(async move { Err(CompositorError::ImageLoad { url, reason }) });
        }
    };
    image.set_cross_origin(Some("anonymous"));

    let (tx, rx) = oneshot::channel::<bool>();
    let tx = Rc::new(RefCell::new(Some(tx)));
    let listeners: Vec<EventListener> = [("load", true), ("error", false)]
        .into_iter()
        .map(|(event, loaded)| {
            let tx = Rc::clone(&tx);
            EventListener::once(&image, event, move |_| {
                if let Some(tx) = tx.borrow_mut().take() {
                    let _ = tx.send(loaded);
                }
            })
        })
        .collect();
    image.set_src(&url);

    Box::pin(async move {
        let loaded = rx.await.unwrap_or(false);
        drop(listeners);
        if loaded {
            Ok(image)
        } else {
            Err(CompositorError::ImageLoad {
                url,
                reason: "the image could not be fetched or decoded".to_string(),
            })
        }
    })
}
