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

//! Events emitted by the compositor so UI code can follow its state without
//! polling.

use serde::Serialize;
use std::rc::Rc;

use crate::error::CompositorError;

/// Lifecycle of the compositor's current session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum CompositorPhase {
    /// No session was ever started.
    #[default]
    Idle,
    /// Loading the background, initializing the model, waiting for playback.
    Initializing,
    Running,
    /// Running, but the upstream video is disabled: no frames are submitted.
    Paused,
    /// The last session was torn down.
    Stopped,
}

impl CompositorPhase {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CompositorPhase::Initializing | CompositorPhase::Running | CompositorPhase::Paused
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CompositorEvent<S> {
    PhaseChanged(CompositorPhase),
    /// The busy indicator shown while a session is coming up.
    ProcessingChanged(bool),
    /// A new processed stream was published, or `None` when the caller should
    /// fall back to the raw capture.
    OutputChanged(Option<S>),
    Error(CompositorError),
}

pub type CompositorListener<S> = Rc<dyn Fn(&CompositorEvent<S>)>;
