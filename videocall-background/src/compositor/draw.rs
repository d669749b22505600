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

use crate::backend::{CompositeOp, DrawingSurface, SegmentationResult};

/// What gets drawn behind the segmented subject.
#[derive(Clone, Debug, PartialEq)]
pub enum Backdrop<I> {
    /// The frame itself, blurred by `radius_px`.
    Blur { radius_px: u32 },
    /// A pre-loaded image stretched over the surface.
    Image(I),
}

/// Draws one segmentation result onto `surface`.
///
/// The mask is drawn first and used as a stencil for the frame (`source-in`),
/// then the backdrop is slid underneath the isolated subject
/// (`destination-over`).
pub fn compose_frame<S: DrawingSurface>(
    surface: &mut S,
    result: &SegmentationResult<S::Layer>,
    backdrop: &Backdrop<S::Image>,
) {
    surface.save();
    surface.clear();

    surface.draw_layer(&result.mask);

    surface.set_composite_op(CompositeOp::SourceIn);
    surface.draw_layer(&result.frame);

    surface.set_composite_op(CompositeOp::DestinationOver);
    match backdrop {
        Backdrop::Blur { radius_px } => {
            surface.set_blur(Some(*radius_px));
            surface.draw_layer(&result.frame);
        }
        Backdrop::Image(image) => surface.draw_image(image),
    }

    surface.restore();
}
