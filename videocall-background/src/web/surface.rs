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

use js_sys::{Object, Reflect};
use log::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement, MediaStream};

use super::js_error;
use crate::backend::{CompositeOp, DrawingSurface, FrameSize};
use crate::error::CompositorError;

#[wasm_bindgen]
extern "C" {
    // The segmentation results can be an ImageBitmap, a canvas or a video
    // element depending on the runtime, so drawImage is bound loosely here.
    #[wasm_bindgen(extends = Object)]
    type LooseContext2d;

    #[wasm_bindgen(method, catch, js_name = drawImage)]
    fn draw_image(
        this: &LooseContext2d,
        image: &JsValue,
        dx: f64,
        dy: f64,
        dw: f64,
        dh: f64,
    ) -> Result<(), JsValue>;
}

/// Off-screen `<canvas>` with its 2D context.
pub struct CanvasSurface {
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
    size: FrameSize,
}

impl CanvasSurface {
    pub(super) fn new(size: FrameSize) -> Result<Self, CompositorError> {
        let canvas = gloo_utils::document()
            .create_element("canvas")
            .map_err(|e| CompositorError::Surface(js_error(&e)))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| CompositorError::Surface("not a canvas element".to_string()))?;
        canvas.set_width(size.width);
        canvas.set_height(size.height);

        let options = Object::new();
        Reflect::set(
            &options,
            &JsValue::from_str("willReadFrequently"),
            &JsValue::TRUE,
        )
        .map_err(|e| CompositorError::Surface(js_error(&e)))?;
        let context = canvas
            .get_context_with_context_options("2d", &options)
            .map_err(|e| CompositorError::Surface(js_error(&e)))?
            .ok_or_else(|| {
                CompositorError::Surface("could not get 2D context from canvas".to_string())
            })?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| CompositorError::Surface("unexpected context type".to_string()))?;

        Ok(Self {
            canvas,
            context,
            size,
        })
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }

    pub(super) fn capture_stream(&self, fps: u32) -> Result<MediaStream, CompositorError> {
        self.canvas
            .capture_stream_with_frame_request_rate(fps as f64)
            .map_err(|e| CompositorError::Capture(js_error(&e)))
    }

    fn stretch(&self, source: &JsValue) {
        let context = self.context.unchecked_ref::<LooseContext2d>();
        if let Err(e) = context.draw_image(
            source,
            0.0,
            0.0,
            self.size.width as f64,
            self.size.height as f64,
        ) {
            warn!("drawImage failed: {}", js_error(&e));
        }
    }
}

impl DrawingSurface for CanvasSurface {
    type Layer = JsValue;
    type Image = HtmlImageElement;

    fn size(&self) -> FrameSize {
        self.size
    }

    fn save(&mut self) {
        self.context.save();
    }

    fn restore(&mut self) {
        self.context.restore();
    }

    fn clear(&mut self) {
        self.context
            .clear_rect(0.0, 0.0, self.size.width as f64, self.size.height as f64);
    }

    fn set_composite_op(&mut self, op: CompositeOp) {
        let _ = self.context.set_global_composite_operation(op.as_css());
    }

    fn set_blur(&mut self, radius_px: Option<u32>) {
        match radius_px {
            Some(radius) => self.context.set_filter(&format!("blur({radius}px)")),
            None => self.context.set_filter("none"),
        }
    }

    fn draw_layer(&mut self, layer: &JsValue) {
        self.stretch(layer);
    }

    fn draw_image(&mut self, image: &HtmlImageElement) {
        self.stretch(image);
    }
}
