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

//! CPU implementation of [`DrawingSurface`] on top of `image::RgbaImage`.
//!
//! Follows the canvas 2D semantics the compositor relies on: sources are
//! stretched over the whole surface, the blur filter is applied to the source
//! before it is composited, and `save`/`restore` cover the composite operator
//! and the filter.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use std::borrow::Cow;

use crate::backend::{CompositeOp, DrawingSurface, FrameSize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct DrawState {
    op: CompositeOp,
    blur: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct RasterSurface {
    pixels: RgbaImage,
    state: DrawState,
    saved: Vec<DrawState>,
}

impl RasterSurface {
    pub fn new(size: FrameSize) -> Self {
        Self {
            pixels: RgbaImage::new(size.width, size.height),
            state: DrawState::default(),
            saved: Vec::new(),
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    fn draw(&mut self, source: &RgbaImage) {
        let (width, height) = self.pixels.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        let fitted: Cow<RgbaImage> = if source.dimensions() == (width, height) {
            Cow::Borrowed(source)
        } else {
            Cow::Owned(imageops::resize(source, width, height, FilterType::Triangle))
        };
        let filtered = match self.state.blur {
            // CSS blur radius is the gaussian standard deviation.
            Some(radius) if radius > 0 => Cow::Owned(imageops::blur(&*fitted, radius as f32)),
            _ => fitted,
        };
        let op = self.state.op;
        for (dst, src) in self.pixels.pixels_mut().zip(filtered.pixels()) {
            *dst = blend(op, *src, *dst);
        }
    }
}

impl DrawingSurface for RasterSurface {
    type Layer = RgbaImage;
    type Image = RgbaImage;

    fn size(&self) -> FrameSize {
        let (width, height) = self.pixels.dimensions();
        FrameSize::new(width, height)
    }

    fn save(&mut self) {
        self.saved.push(self.state);
    }

    fn restore(&mut self) {
        if let Some(state) = self.saved.pop() {
            self.state = state;
        }
    }

    fn clear(&mut self) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    fn set_composite_op(&mut self, op: CompositeOp) {
        self.state.op = op;
    }

    fn set_blur(&mut self, radius_px: Option<u32>) {
        self.state.blur = radius_px;
    }

    fn draw_layer(&mut self, layer: &RgbaImage) {
        self.draw(layer);
    }

    fn draw_image(&mut self, image: &RgbaImage) {
        self.draw(image);
    }
}

// Porter-Duff on straight alpha: out = src * Fa + dst * Fb, computed on
// premultiplied values and divided back out.
fn blend(op: CompositeOp, src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let (fa, fb) = match op {
        CompositeOp::SourceOver => (1.0, 1.0 - sa),
        CompositeOp::SourceIn => (da, 0.0),
        CompositeOp::DestinationOver => (1.0 - da, 1.0),
    };
    let alpha = sa * fa + da * fb;
    if alpha <= f32::EPSILON {
        return Rgba([0, 0, 0, 0]);
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let premultiplied = src[c] as f32 * sa * fa + dst[c] as f32 * da * fb;
        out[c] = (premultiplied / alpha).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (alpha * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}
