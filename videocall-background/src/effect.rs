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

//! The user's virtual background selection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Virtual background mode chosen in the UI.
///
/// Serialized as `{"type": "none"}`, `{"type": "blur"}` or
/// `{"type": "image", "url": "..."}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackgroundEffect {
    #[default]
    None,
    Blur,
    Image {
        url: String,
    },
}

impl BackgroundEffect {
    pub fn image(url: impl Into<String>) -> Self {
        BackgroundEffect::Image { url: url.into() }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, BackgroundEffect::None)
    }

    pub fn image_url(&self) -> Option<&str> {
        match self {
            BackgroundEffect::Image { url } => Some(url),
            _ => None,
        }
    }

    /// Every choice offered by the background picker: none, blur and the
    /// built-in images.
    pub fn presets() -> Vec<BackgroundEffect> {
        let mut presets = vec![BackgroundEffect::None, BackgroundEffect::Blur];
        presets.extend(IMAGE_PRESETS.iter().map(BackgroundPreset::effect));
        presets
    }
}

impl fmt::Display for BackgroundEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackgroundEffect::None => write!(f, "none"),
            BackgroundEffect::Blur => write!(f, "blur"),
            BackgroundEffect::Image { url } => write!(f, "image({url})"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackgroundPreset {
    pub name: &'static str,
    pub url: &'static str,
}

impl BackgroundPreset {
    pub fn effect(&self) -> BackgroundEffect {
        BackgroundEffect::image(self.url)
    }
}

pub const IMAGE_PRESETS: [BackgroundPreset; 3] = [
    BackgroundPreset {
        name: "Office",
        url: "https://images.pexels.com/photos/1209843/pexels-photo-1209843.jpeg?auto=compress&cs=tinysrgb&w=1260&h=750&dpr=1",
    },
    BackgroundPreset {
        name: "Cafe",
        url: "https://images.pexels.com/photos/1684151/pexels-photo-1684151.jpeg?auto=compress&cs=tinysrgb&w=1260&h=750&dpr=1",
    },
    BackgroundPreset {
        name: "Abstract",
        url: "https://images.pexels.com/photos/2110951/pexels-photo-2110951.jpeg?auto=compress&cs=tinysrgb&w=1260&h=750&dpr=1",
    },
];
