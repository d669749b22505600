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

//! Bindings to the MediaPipe `SelfieSegmentation` runtime.
//!
//! The runtime is loaded by the host page (a `<script>` tag pointing at the
//! CDN) and exposed as `window.SelfieSegmentation`; its model files are
//! resolved through the `locateFile` hook against
//! [`CompositorConfig::model_base_url`](crate::CompositorConfig).

use futures::future::LocalBoxFuture;
use js_sys::{Array, Function, Object, Promise, Reflect};
use log::debug;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use super::js_error;
use super::media::WebVideo;
use crate::backend::{ResultsCallback, SegmentationEngine, SegmentationResult};
use crate::config::{CompositorConfig, ModelTier};
use crate::error::CompositorError;

const GLOBAL_NAME: &str = "SelfieSegmentation";

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(extends = Object)]
    type SelfieSegmentation;

    #[wasm_bindgen(method, js_name = setOptions)]
    fn set_options(this: &SelfieSegmentation, options: &JsValue);

    #[wasm_bindgen(method, js_name = onResults)]
    fn on_results(this: &SelfieSegmentation, listener: &Function);

    #[wasm_bindgen(method, catch)]
    fn initialize(this: &SelfieSegmentation) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch)]
    fn send(this: &SelfieSegmentation, inputs: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch)]
    fn close(this: &SelfieSegmentation) -> Result<Promise, JsValue>;
}

fn constructor() -> Option<Function> {
    let window = gloo_utils::window();
    Reflect::get(&window, &JsValue::from_str(GLOBAL_NAME))
        .ok()
        .and_then(|ctor| ctor.dyn_into::<Function>().ok())
}

pub(super) fn is_available() -> bool {
    constructor().is_some()
}

fn settle(
    promise: Result<Promise, JsValue>,
    into_error: fn(String) -> CompositorError,
) -> LocalBoxFuture<'static, Result<(), CompositorError>> {
    Box::pin(async move {
        let promise = promise.map_err(|e| into_error(js_error(&e)))?;
        JsFuture::from(promise)
            .await
            .map(|_| ())
            .map_err(|e| into_error(js_error(&e)))
    })
}

/// One `SelfieSegmentation` instance.
///
/// The closures handed to JavaScript are owned here and live exactly as long
/// as the instance.
pub struct WebSegmentation {
    inner: SelfieSegmentation,
    _locate_file: Closure<dyn Fn(String) -> String>,
    on_results: Option<Closure<dyn FnMut(JsValue)>>,
    closed: bool,
}

impl WebSegmentation {
    pub(super) fn new(config: &CompositorConfig) -> Result<Self, CompositorError> {
        let ctor = constructor().ok_or(CompositorError::SegmentationUnavailable)?;

        let locate_config = config.clone();
        let locate_file = Closure::<dyn Fn(String) -> String>::new(move |file: String| {
            locate_config.locate_model_file(&file)
        });
        let init = Object::new();
        Reflect::set(
            &init,
            &JsValue::from_str("locateFile"),
            locate_file.as_ref(),
        )
        .map_err(|e| CompositorError::EngineInit(js_error(&e)))?;

        let inner = Reflect::construct(&ctor, &Array::of1(&init))
            .map_err(|e| CompositorError::EngineInit(js_error(&e)))?
            .unchecked_into::<SelfieSegmentation>();

        Ok(Self {
            inner,
            _locate_file: locate_file,
            on_results: None,
            closed: false,
        })
    }
}

impl SegmentationEngine for WebSegmentation {
    type Input = WebVideo;
    type Layer = JsValue;

    fn set_options(&mut self, tier: ModelTier) {
        let options = Object::new();
        let _ = Reflect::set(
            &options,
            &JsValue::from_str("modelSelection"),
            &JsValue::from(tier.model_selection()),
        );
        self.inner.set_options(&options);
    }

    fn on_results(&mut self, mut callback: ResultsCallback<JsValue>) {
        let listener = Closure::<dyn FnMut(JsValue)>::new(move |results: JsValue| {
            let mask = Reflect::get(&results, &JsValue::from_str("segmentationMask"));
            let frame = Reflect::get(&results, &JsValue::from_str("image"));
            match (mask, frame) {
                (Ok(mask), Ok(frame)) if !mask.is_undefined() && !frame.is_undefined() => {
                    callback(SegmentationResult { mask, frame })
                }
                _ => debug!("segmentation results without mask or image"),
            }
        });
        self.inner.on_results(listener.as_ref().unchecked_ref());
        self.on_results = Some(listener);
    }

    fn initialize(&mut self) -> LocalBoxFuture<'static, Result<(), CompositorError>> {
        settle(self.inner.initialize(), CompositorError::EngineInit)
    }

    fn send(&self, input: &WebVideo) -> LocalBoxFuture<'static, Result<(), CompositorError>> {
        let inputs = Object::new();
        if let Err(e) = Reflect::set(&inputs, &JsValue::from_str("image"), input.element()) {
            let reason = js_error(&e);
            return Box::pin(async move { Err(CompositorError::Segmentation(reason)) });
        }
        settle(self.inner.send(&inputs), CompositorError::Segmentation)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Results of a send still in flight land in a no-op.
        self.inner.on_results(&Function::new_no_args(""));
        if let Err(e) = self.inner.close() {
            debug!("SelfieSegmentation.close threw: {}", js_error(&e));
        }
    }
}
