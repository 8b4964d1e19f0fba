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

//! Listener callbacks and the continuation codes they return.

use super::scope::ScopeId;
use std::any::{type_name, Any};
use std::sync::Arc;

/// The payload handed to listeners. Any `'static` thread-safe value works.
pub type Payload = dyn Any + Send + Sync;

/// A listener callback.
///
/// It receives the scope of its own registration and the payload of the
/// event being dispatched.
pub type Callback = Arc<dyn Fn(ScopeId, &Payload) -> Response + Send + Sync>;

/// What a listener asks the dispatcher to do after it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Response {
    /// Nothing special; keep delivering.
    #[default]
    Continue,
    /// The listener failed. The failure is logged and counted, delivery goes on.
    Error,
    /// Remove this registration. It will not be invoked again.
    UnbindSingle,
    /// Remove every registration of this event held by the listener's scope.
    UnbindEvent,
    /// Skip the remaining, lower-priority listeners of this pass.
    StopPropagation,
}

/// Adapts a listener that expects a concrete payload type.
///
/// If an event arrives with a payload of another type, the mismatch is
/// logged and the listener answers [`Response::Error`] without running.
///
/// ```
/// use cadence_core::{typed, Bus, Response, ScopeId};
///
/// let bus = Bus::new();
/// bus.global_bind(
///     "KeyDown",
///     typed(|_scope, key: &char| {
///         assert_eq!(*key, 'w');
///         Response::Continue
///     }),
/// )
/// .unwrap();
/// let report = bus.trigger_sync("KeyDown", ScopeId::GLOBAL, 'w').unwrap();
/// assert_eq!(report.invoked, 1);
/// ```
pub fn typed<T, F>(listener: F) -> impl Fn(ScopeId, &Payload) -> Response + Send + Sync + 'static
where
    T: Any,
    F: Fn(ScopeId, &T) -> Response + Send + Sync + 'static,
{
    move |scope: ScopeId, payload: &Payload| match payload.downcast_ref::<T>() {
        Some(value) => listener(scope, value),
        None => {
            log::error!(
                "Listener for scope {} expected a `{}` payload; got another type.",
                scope,
                type_name::<T>()
            );
            Response::Error
        }
    }
}
