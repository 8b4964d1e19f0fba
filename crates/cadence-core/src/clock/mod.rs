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

//! Frame timing: the elapsed-frame counter and the background frame loop.
//!
//! The loop runs on its own thread and asks its frame driver to step one
//! frame per tick. After each tick it publishes the new frame count on a
//! single-slot channel that never blocks the loop.

mod frame;
mod scheduler;

pub use self::scheduler::{FrameSignals, RunState};

pub(crate) use self::frame::{FrameClock, FrameStep};
pub(crate) use self::scheduler::FrameScheduler;

use crate::error::Result;

/// Something that can dispatch one frame. Implemented by the bus core.
pub(crate) trait FrameDriver: Send + Sync + 'static {
    /// Dispatches the frame event once and advances the frame counter.
    fn step_frame(&self) -> Result<FrameStep>;
}
