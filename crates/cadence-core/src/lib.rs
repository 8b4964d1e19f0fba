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

//! # Cadence Core
//!
//! Event dispatch core for interactive real-time applications.
//!
//! The crate routes named events with arbitrary payloads to registered
//! listeners, in priority order, and drives a periodic frame event from a
//! background frame loop. Listeners may bind and unbind other listeners (or
//! themselves) while a dispatch pass is running; such changes are staged in a
//! pending queue and merged once the pass is over.
//!
//! The entry point is [`Bus`]. Buses are explicitly constructed and passed by
//! reference, so several independent buses (one per window, one per test)
//! can live in the same process.

#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod event;

pub use clock::{FrameSignals, RunState};
pub use config::BusConfig;
pub use error::{BusError, Result};
pub use event::{
    typed, BindingHandle, Bus, Callback, Completion, DispatchReport, Payload, Response, ScopeId,
    ScopeRegistry, ENTER_FRAME,
};
