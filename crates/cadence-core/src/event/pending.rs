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

//! Staging area for bindings and unbindings that target an event with an
//! active dispatch pass.

use super::scope::ScopeId;
use super::table::Registration;
use std::sync::Arc;

/// What a pending removal takes out of one event's sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemovalTarget {
    /// A single registration, by id.
    Binding(u64),
    /// Every registration held by a scope.
    Scope(ScopeId),
}

#[derive(Debug, Clone)]
pub(crate) struct Removal {
    pub(crate) name: Arc<str>,
    pub(crate) target: RemovalTarget,
}

impl Removal {
    fn covers(&self, registration: &Registration) -> bool {
        *self.name == *registration.name
            && match self.target {
                RemovalTarget::Binding(id) => id == registration.id,
                RemovalTarget::Scope(scope) => scope == registration.scope,
            }
    }
}

/// Pending additions and removals, in the order they were requested.
///
/// A removal that matches a still-pending addition cancels it on the spot,
/// so at merge time removals only ever concern registrations already in the
/// table, and every addition left in the queue is meant to survive.
#[derive(Default)]
pub(crate) struct PendingQueue {
    additions: Vec<Registration>,
    removals: Vec<Removal>,
}

impl PendingQueue {
    pub(crate) fn push_addition(&mut self, registration: Registration) {
        self.additions.push(registration);
    }

    pub(crate) fn push_removal(&mut self, removal: Removal) {
        self.additions.retain(|r| !removal.covers(r));
        self.removals.push(removal);
    }

    /// Returns true if `registration` has been unbound but not merged out yet.
    pub(crate) fn is_retired(&self, registration: &Registration) -> bool {
        self.removals.iter().any(|r| r.covers(registration))
    }

    /// Takes every entry for `name`, leaving the others queued.
    pub(crate) fn drain_name(&mut self, name: &str) -> (Vec<Removal>, Vec<Registration>) {
        let (removals, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.removals)
            .into_iter()
            .partition(|r| &*r.name == name);
        self.removals = kept;

        let (additions, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.additions)
            .into_iter()
            .partition(|r| &*r.name == name);
        self.additions = kept;

        (removals, additions)
    }

    /// Event names that have at least one pending entry, without duplicates.
    pub(crate) fn names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = Vec::new();
        let all = self
            .removals
            .iter()
            .map(|r| &r.name)
            .chain(self.additions.iter().map(|r| &r.name));
        for name in all {
            if !names.iter().any(|n| n == name) {
                names.push(Arc::clone(name));
            }
        }
        names
    }

    pub(crate) fn len(&self) -> usize {
        self.additions.len() + self.removals.len()
    }

    pub(crate) fn clear(&mut self) {
        self.additions.clear();
        self.removals.clear();
    }
}

/// Applies drained removals to `sequence`.
pub(crate) fn apply_removals(sequence: &mut Vec<Registration>, removals: &[Removal]) -> usize {
    let before = sequence.len();
    sequence.retain(|r| !removals.iter().any(|removal| removal.covers(r)));
    before - sequence.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Payload, Response};

    fn registration(id: u64, name: &str, scope: u64) -> Registration {
        Registration {
            id,
            name: Arc::from(name),
            scope: ScopeId(scope),
            priority: 0,
            callback: Arc::new(|_: ScopeId, _: &Payload| Response::Continue),
        }
    }

    fn removal(name: &str, target: RemovalTarget) -> Removal {
        Removal {
            name: Arc::from(name),
            target,
        }
    }

    #[test]
    fn removal_cancels_matching_pending_addition() {
        let mut queue = PendingQueue::default();
        queue.push_addition(registration(1, "Enter", 3));
        queue.push_addition(registration(2, "Enter", 4));
        queue.push_removal(removal("Enter", RemovalTarget::Binding(1)));

        let (removals, additions) = queue.drain_name("Enter");
        assert_eq!(removals.len(), 1);
        assert_eq!(additions.len(), 1);
        assert_eq!(additions[0].id, 2);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn addition_after_scope_removal_survives() {
        let mut queue = PendingQueue::default();
        queue.push_removal(removal("Enter", RemovalTarget::Scope(ScopeId(3))));
        queue.push_addition(registration(5, "Enter", 3));

        let (_, additions) = queue.drain_name("Enter");
        assert_eq!(additions.len(), 1);
    }

    #[test]
    fn drain_leaves_other_names_queued() {
        let mut queue = PendingQueue::default();
        queue.push_addition(registration(1, "Enter", 0));
        queue.push_addition(registration(2, "KeyDown", 0));
        queue.push_removal(removal("KeyDown", RemovalTarget::Binding(9)));

        let names = queue.names();
        assert_eq!(names.len(), 2);

        let (removals, additions) = queue.drain_name("Enter");
        assert!(removals.is_empty());
        assert_eq!(additions.len(), 1);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn retired_registrations_are_reported() {
        let mut queue = PendingQueue::default();
        queue.push_removal(removal("Enter", RemovalTarget::Scope(ScopeId(7))));

        assert!(queue.is_retired(&registration(1, "Enter", 7)));
        assert!(!queue.is_retired(&registration(1, "Enter", 8)));
        assert!(!queue.is_retired(&registration(1, "Exit", 7)));
    }

    #[test]
    fn apply_removals_counts_what_it_removed() {
        let mut sequence = vec![
            registration(1, "Enter", 1),
            registration(2, "Enter", 2),
            registration(3, "Enter", 2),
        ];
        let removed = apply_removals(
            &mut sequence,
            &[removal("Enter", RemovalTarget::Scope(ScopeId(2)))],
        );
        assert_eq!(removed, 2);
        assert_eq!(sequence.len(), 1);
    }
}
