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

//! Delivery of one event to every matching registration.

use super::listener::{Payload, Response};
use super::scope::ScopeId;
use super::table::BindingTable;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Aggregated outcome of one dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    /// Listeners that were called, including the ones that failed.
    pub invoked: usize,
    /// Listeners that returned [`Response::Error`] or panicked.
    pub failed: usize,
    /// Listeners that asked to be unbound.
    pub unbound: usize,
    /// True if a listener stopped propagation before the end of the sequence.
    pub stopped: bool,
}

impl DispatchReport {
    /// Returns true if no listener failed during the pass.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Runs dispatch passes against a [`BindingTable`].
pub(crate) struct Dispatcher<'a> {
    table: &'a BindingTable,
}

impl<'a> Dispatcher<'a> {
    pub(crate) fn new(table: &'a BindingTable) -> Self {
        Self { table }
    }

    /// Delivers `payload` to every registration of `name` that matches `target`.
    ///
    /// The pass iterates the snapshot taken when it began. Bindings made while
    /// it runs are staged and show up on the next pass; unbindings are staged
    /// too, but an unbound registration is skipped from then on. A listener
    /// that panics is logged and skipped, and delivery goes on.
    pub(crate) fn dispatch(&self, name: &str, target: ScopeId, payload: &Payload) -> DispatchReport {
        let pass = self.table.begin_pass(name);
        let mut report = DispatchReport::default();

        for registration in pass.snapshot() {
            if !registration.scope.matches(target) || self.table.is_retired(registration) {
                continue;
            }

            report.invoked += 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                (registration.callback)(registration.scope, payload)
            }));

            match outcome {
                Ok(Response::Continue) => {}
                Ok(Response::Error) => {
                    report.failed += 1;
                    log::warn!(
                        "Listener {} for '{}' (scope {}) reported an error.",
                        registration.id,
                        name,
                        registration.scope
                    );
                }
                Ok(Response::UnbindSingle) => {
                    report.unbound += 1;
                    self.table.unbind(&registration.handle());
                }
                Ok(Response::UnbindEvent) => {
                    report.unbound += 1;
                    self.table.unbind_event(name, registration.scope);
                }
                Ok(Response::StopPropagation) => {
                    report.stopped = true;
                    break;
                }
                Err(panic) => {
                    report.failed += 1;
                    log::error!(
                        "Listener {} for '{}' (scope {}) panicked: {}",
                        registration.id,
                        name,
                        registration.scope,
                        panic_message(panic.as_ref())
                    );
                }
            }
        }

        log::trace!("Dispatched '{}' to scope {}: {:?}", name, target, report);
        report
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
