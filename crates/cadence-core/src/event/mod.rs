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

//! Named events, their listeners, and the machinery that routes one to the other.
//!
//! Listeners are stored in a binding table keyed by event name and
//! kept sorted by priority (highest first) and then registration order.
//! A dispatch pass iterates an immutable snapshot of that ordering; any
//! binding or unbinding that targets a name with an active pass is staged in
//! the pending queue and merged when the last pass on that name
//! finishes. The [`Bus`] composes the table with the frame loop.

mod bus;
mod dispatch;
mod listener;
mod pending;
mod scope;
mod table;
mod worker;

pub use self::bus::{Bus, Completion};
pub use self::dispatch::DispatchReport;
pub use self::listener::{typed, Callback, Payload, Response};
pub use self::scope::{ScopeId, ScopeRegistry};
pub use self::table::BindingHandle;

/// Default name of the reserved event dispatched once per frame tick.
///
/// The payload of this event is the `u64` number of frames completed before
/// the one being dispatched.
pub const ENTER_FRAME: &str = "EnterFrame";
