// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types surfaced by the bus and the frame loop.
//!
//! Only API misuse and lifecycle violations are reported here. Failures of
//! individual listeners are contained by the dispatcher and show up in the
//! [`DispatchReport`](crate::DispatchReport) of the pass instead.

use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`Bus`](crate::Bus) operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// A binding or trigger named an empty (or blank) event.
    #[error("event name must not be empty")]
    EmptyEventName,

    /// The frame loop was asked to run at zero ticks per second.
    #[error("invalid tick rate: {0} ticks per second")]
    InvalidTickRate(u32),

    /// The frame loop was given a zero tick interval.
    #[error("invalid tick interval: {0:?}")]
    InvalidTickInterval(Duration),

    /// A [`BusConfig`](crate::BusConfig) failed to parse or validate.
    #[error("invalid bus configuration: {0}")]
    InvalidConfig(String),

    /// `start_loop` was called while a loop is running or paused.
    #[error("frame loop is already running")]
    AlreadyRunning,

    /// A loop control operation was called before any loop was started.
    #[error("frame loop has not been started")]
    NotStarted,

    /// A loop control operation was called after `stop()`.
    #[error("frame loop has been stopped; reset the bus before starting a new one")]
    Stopped,

    /// A frame step was requested from inside that same thread's frame dispatch.
    #[error("a frame is already being dispatched on this thread")]
    FrameInProgress,

    /// `flush()` could not merge some entries because their event is still
    /// being dispatched. They are merged when that pass completes.
    #[error("{deferred} pending change(s) wait for an active dispatch pass to complete")]
    DispatchInProgress {
        /// Number of pending entries left in the queue.
        deferred: usize,
    },

    /// A worker thread could not be spawned.
    #[error("failed to spawn {what} thread: {source}")]
    Spawn {
        /// Which worker was being spawned.
        what: &'static str,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_descriptive() {
        assert_eq!(
            BusError::InvalidTickRate(0).to_string(),
            "invalid tick rate: 0 ticks per second"
        );
        assert_eq!(
            BusError::DispatchInProgress { deferred: 2 }.to_string(),
            "2 pending change(s) wait for an active dispatch pass to complete"
        );
        assert!(BusError::Stopped.to_string().contains("reset"));
    }

    #[test]
    fn spawn_error_keeps_its_source() {
        use std::error::Error as _;

        let err = BusError::Spawn {
            what: "frame loop",
            source: std::io::Error::other("no threads left"),
        };
        assert!(err.to_string().starts_with("failed to spawn frame loop thread"));
        assert!(err.source().is_some());
    }
}
