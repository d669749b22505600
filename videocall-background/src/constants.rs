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

// Fallback surface size when the camera track does not report its settings.
pub const VIDEO_WIDTH: u32 = 1280u32;
pub const VIDEO_HEIGHT: u32 = 720u32;

// CSS pixels, applied as `blur(10px)` to the background copy of the frame.
pub const BLUR_RADIUS_PX: u32 = 10u32;

pub const CAPTURE_FPS: u32 = 30u32;

// HTMLMediaElement.readyState
pub const HAVE_FUTURE_DATA: u16 = 3u16;

// This is read at compile time, please restart if you change this value.
pub static SEGMENTATION_MODEL_BASE_URL: &str = match std::option_env!("SEGMENTATION_MODEL_BASE_URL") {
    Some(url) => url,
    None => "https://cdn.jsdelivr.net/npm/@mediapipe/selfie_segmentation/",
};
