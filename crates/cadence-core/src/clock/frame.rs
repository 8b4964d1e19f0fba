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

//! The elapsed-frame counter.

use crate::error::{BusError, Result};
use crate::event::DispatchReport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// Outcome of one frame step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameStep {
    /// Frames completed once this step finished.
    pub(crate) frames_elapsed: u64,
    /// What the frame event's dispatch pass did.
    pub(crate) report: DispatchReport,
}

/// Counts completed frames and serializes frame steps.
///
/// The counter is incremented strictly after the frame event's dispatch
/// completes, so listeners see the number of frames completed before the
/// current one.
pub(crate) struct FrameClock {
    frames: AtomicU64,
    gate: Mutex<()>,
    stepping: Mutex<Option<ThreadId>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FrameClock {
    pub(crate) fn new() -> Self {
        Self {
            frames: AtomicU64::new(0),
            gate: Mutex::new(()),
            stepping: Mutex::new(None),
        }
    }

    pub(crate) fn frames_elapsed(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Runs one frame: `dispatch` receives the pre-increment frame count.
    ///
    /// Steps from different threads run one after the other. A step requested
    /// by a listener of the frame being dispatched on the same thread is
    /// refused with [`BusError::FrameInProgress`].
    pub(crate) fn step<F>(&self, dispatch: F) -> Result<FrameStep>
    where
        F: FnOnce(u64) -> DispatchReport,
    {
        let current = thread::current().id();
        if *lock(&self.stepping) == Some(current) {
            return Err(BusError::FrameInProgress);
        }

        let _gate = lock(&self.gate);
        *lock(&self.stepping) = Some(current);
        let report = dispatch(self.frames.load(Ordering::Acquire));
        let frames_elapsed = self.frames.fetch_add(1, Ordering::AcqRel) + 1;
        *lock(&self.stepping) = None;

        Ok(FrameStep {
            frames_elapsed,
            report,
        })
    }

    pub(crate) fn reset(&self) {
        self.frames.store(0, Ordering::Release);
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
