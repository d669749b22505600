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

//! Yew binding: [`use_virtual_background`] wires a [`WebCompositor`] into a
//! function component.

use web_sys::MediaStream;
use yew::prelude::*;

use crate::effect::BackgroundEffect;
use crate::events::CompositorEvent;
use crate::web::WebCompositor;

#[derive(Clone, Debug, PartialEq)]
pub struct VirtualBackgroundState {
    /// The processed stream; `None` means show the raw capture.
    pub processed_stream: Option<MediaStream>,
    pub is_processing: bool,
}

/// Applies `effect` to `stream` for as long as the component is mounted.
///
/// The compositor is created on mount and dropped on unmount, which tears down
/// any running session. A change of `stream` or `effect` starts a new session;
/// `video_enabled` pauses and resumes the current one.
#[hook]
pub fn use_virtual_background(
    stream: Option<MediaStream>,
    effect: BackgroundEffect,
    video_enabled: bool,
) -> VirtualBackgroundState {
    let processed_stream = use_state(|| None::<MediaStream>);
    let is_processing = use_state(|| false);
    let compositor = use_mut_ref(|| None::<WebCompositor>);

    {
        let compositor = compositor.clone();
        let processed_stream = processed_stream.clone();
        let is_processing = is_processing.clone();
        use_effect_with((), move |_| {
            let instance = WebCompositor::with_defaults();
            instance.set_listener(move |event| match event {
                CompositorEvent::OutputChanged(output) => processed_stream.set(output.clone()),
                CompositorEvent::ProcessingChanged(busy) => is_processing.set(*busy),
                CompositorEvent::Error(e) => log::error!("virtual background: {e}"),
                CompositorEvent::PhaseChanged(_) => {}
            });
            *compositor.borrow_mut() = Some(instance);
            move || {
                let instance = compositor.borrow_mut().take();
                drop(instance);
            }
        });
    }

    {
        let compositor = compositor.clone();
        use_effect_with((stream, effect), move |(stream, effect)| {
            if let Some(instance) = compositor.borrow().as_ref() {
                instance.apply(stream.clone(), effect.clone());
            }
        });
    }

    {
        let compositor = compositor.clone();
        use_effect_with(video_enabled, move |enabled| {
            if let Some(instance) = compositor.borrow().as_ref() {
                instance.set_enabled(*enabled);
            }
        });
    }

    VirtualBackgroundState {
        processed_stream: (*processed_stream).clone(),
        is_processing: *is_processing,
    }
}
