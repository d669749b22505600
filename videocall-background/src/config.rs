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

//! Runtime configuration for the background compositor.

use serde::{Deserialize, Serialize};

use crate::backend::FrameSize;
use crate::constants::{
    BLUR_RADIUS_PX, CAPTURE_FPS, SEGMENTATION_MODEL_BASE_URL, VIDEO_HEIGHT, VIDEO_WIDTH,
};

/// Speed/quality tier of the person segmentation model.
///
/// Maps onto MediaPipe's `modelSelection` option: the `General` model works on
/// square 256x256 input, the `Landscape` model on 144x256 and is faster.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    General,
    #[default]
    Landscape,
}

impl ModelTier {
    pub fn model_selection(&self) -> u8 {
        match self {
            ModelTier::General => 0,
            ModelTier::Landscape => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    pub fallback_width: u32,
    pub fallback_height: u32,
    pub blur_radius_px: u32,
    pub capture_fps: u32,
    pub model_tier: ModelTier,
    /// Base location the segmentation runtime fetches its model files from.
    pub model_base_url: String,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            fallback_width: VIDEO_WIDTH,
            fallback_height: VIDEO_HEIGHT,
            blur_radius_px: BLUR_RADIUS_PX,
            capture_fps: CAPTURE_FPS,
            model_tier: ModelTier::default(),
            model_base_url: SEGMENTATION_MODEL_BASE_URL.to_string(),
        }
    }
}

impl CompositorConfig {
    pub fn fallback_size(&self) -> FrameSize {
        FrameSize::new(self.fallback_width, self.fallback_height)
    }

    /// Resolves the URL of a single model asset, as requested by the
    /// segmentation runtime's `locateFile` hook.
    pub fn locate_model_file(&self, file: &str) -> String {
        if self.model_base_url.ends_with('/') {
            format!("{}{file}", self.model_base_url)
        } else {
            format!("{}/{file}", self.model_base_url)
        }
    }
}
