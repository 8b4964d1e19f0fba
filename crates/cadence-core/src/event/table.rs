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

//! The binding table: event name to priority-ordered registrations.

use super::listener::Callback;
use super::pending::{apply_removals, PendingQueue, Removal, RemovalTarget};
use super::scope::ScopeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One listener's subscription, owned by the table once installed.
#[derive(Clone)]
pub(crate) struct Registration {
    /// Unique, monotonically increasing. Doubles as the registration order.
    pub(crate) id: u64,
    pub(crate) name: Arc<str>,
    pub(crate) scope: ScopeId,
    pub(crate) priority: i32,
    pub(crate) callback: Callback,
}

impl Registration {
    pub(crate) fn handle(&self) -> BindingHandle {
        BindingHandle {
            id: self.id,
            name: Arc::clone(&self.name),
            scope: self.scope,
        }
    }

    /// Delivery order: higher priority first, then first registered first.
    fn delivered_before(&self, other: &Registration) -> bool {
        self.priority > other.priority || (self.priority == other.priority && self.id < other.id)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Identifies one registration so it can be unbound later.
///
/// Unbinding a handle twice, or after a reset, does nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingHandle {
    id: u64,
    name: Arc<str>,
    scope: ScopeId,
}

impl BindingHandle {
    /// The event this registration listens to.
    pub fn event(&self) -> &str {
        &self.name
    }

    /// The scope the registration was made for.
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// The registration id. Ids grow with registration order.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// An immutable, ordered view of one event's registrations.
pub(crate) type Snapshot = Arc<Vec<Registration>>;

#[derive(Default)]
struct TableState {
    bindings: HashMap<Arc<str>, Snapshot>,
    /// Number of dispatch passes currently iterating each name.
    active: HashMap<Arc<str>, usize>,
    pending: PendingQueue,
}

impl TableState {
    fn intern(&self, name: &str) -> Arc<str> {
        if let Some((key, _)) = self.bindings.get_key_value(name) {
            return Arc::clone(key);
        }
        if let Some((key, _)) = self.active.get_key_value(name) {
            return Arc::clone(key);
        }
        Arc::from(name)
    }

    fn is_active(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    fn insert(&mut self, registration: Registration) {
        if self.is_active(&registration.name) {
            log::debug!(
                "BindingTable: '{}' is being dispatched, deferring binding {}",
                registration.name,
                registration.id
            );
            self.pending.push_addition(registration);
            return;
        }
        let key = Arc::clone(&registration.name);
        // make_mut copies the sequence if a dispatch pass still holds it.
        let sequence = Arc::make_mut(self.bindings.entry(key).or_default());
        insert_sorted(sequence, registration);
    }

    fn remove(&mut self, removal: Removal) -> usize {
        if self.is_active(&removal.name) {
            log::debug!(
                "BindingTable: '{}' is being dispatched, deferring removal of {:?}",
                removal.name,
                removal.target
            );
            self.pending.push_removal(removal);
            return 0;
        }
        let Some(sequence) = self.bindings.get_mut(&*removal.name) else {
            return 0;
        };
        let removed = apply_removals(Arc::make_mut(sequence), std::slice::from_ref(&removal));
        if sequence.is_empty() {
            self.bindings.remove(&*removal.name);
        }
        removed
    }

    fn remove_scope(&mut self, scope: ScopeId) {
        let mut names: Vec<Arc<str>> = self.bindings.keys().cloned().collect();
        for name in self.pending.names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        for name in names {
            self.remove(Removal {
                name,
                target: RemovalTarget::Scope(scope),
            });
        }
    }

    /// Folds the pending entries of `name` into its sequence.
    fn merge(&mut self, name: &str) -> usize {
        let (removals, additions) = self.pending.drain_name(name);
        if removals.is_empty() && additions.is_empty() {
            return 0;
        }
        let merged = removals.len() + additions.len();
        let key = additions
            .first()
            .map(|r| Arc::clone(&r.name))
            .unwrap_or_else(|| self.intern(name));
        let sequence = Arc::make_mut(self.bindings.entry(key).or_default());
        apply_removals(sequence, &removals);
        for registration in additions {
            insert_sorted(sequence, registration);
        }
        if sequence.is_empty() {
            self.bindings.remove(name);
        }
        log::debug!("BindingTable: merged {} pending change(s) into '{}'", merged, name);
        merged
    }
}

fn insert_sorted(sequence: &mut Vec<Registration>, registration: Registration) {
    let at = sequence.partition_point(|existing| existing.delivered_before(&registration));
    sequence.insert(at, registration);
}

/// Result of a [`BindingTable::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct FlushOutcome {
    pub(crate) merged: usize,
    pub(crate) deferred: usize,
}

/// Thread-safe mapping from event name to an ordered sequence of registrations.
///
/// Readers (dispatch passes) only clone an `Arc` under the read lock and then
/// iterate without holding any lock, so listeners are free to call back into
/// the table. Writers copy a sequence on write when a pass still holds it.
pub(crate) struct BindingTable {
    state: RwLock<TableState>,
    next_id: AtomicU64,
}

impl BindingTable {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(TableState::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TableState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TableState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn registration(
        &self,
        state: &TableState,
        name: &str,
        scope: ScopeId,
        priority: i32,
        callback: Callback,
    ) -> Registration {
        Registration {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: state.intern(name),
            scope,
            priority,
            callback,
        }
    }

    /// Installs a registration, or queues it if `name` is being dispatched.
    pub(crate) fn bind(
        &self,
        name: &str,
        scope: ScopeId,
        priority: i32,
        callback: Callback,
    ) -> BindingHandle {
        let mut state = self.write();
        let registration = self.registration(&state, name, scope, priority, callback);
        let handle = registration.handle();
        log::trace!(
            "BindingTable: bound '{}' for scope {} (priority={}, id={})",
            name,
            scope,
            priority,
            handle.id
        );
        state.insert(registration);
        handle
    }

    pub(crate) fn unbind(&self, handle: &BindingHandle) {
        let removed = self.write().remove(Removal {
            name: Arc::clone(&handle.name),
            target: RemovalTarget::Binding(handle.id),
        });
        log::trace!(
            "BindingTable: unbind '{}' id={} removed {}",
            handle.name,
            handle.id,
            removed
        );
    }

    /// Removes every registration `scope` holds for `name`.
    pub(crate) fn unbind_event(&self, name: &str, scope: ScopeId) {
        let mut state = self.write();
        let name = state.intern(name);
        state.remove(Removal {
            name,
            target: RemovalTarget::Scope(scope),
        });
    }

    /// Removes every registration `scope` holds, across all names.
    pub(crate) fn unbind_all(&self, scope: ScopeId) {
        log::trace!("BindingTable: unbinding everything held by scope {}", scope);
        self.write().remove_scope(scope);
    }

    /// Replaces everything `scope` holds with `bindings`, under one lock.
    pub(crate) fn rebind(
        &self,
        scope: ScopeId,
        bindings: Vec<(String, Callback)>,
    ) -> Vec<BindingHandle> {
        let mut state = self.write();
        state.remove_scope(scope);
        bindings
            .into_iter()
            .map(|(name, callback)| {
                let registration = self.registration(&state, &name, scope, 0, callback);
                let handle = registration.handle();
                state.insert(registration);
                handle
            })
            .collect()
    }

    /// The current stable sequence for `name`, in delivery order.
    pub(crate) fn lookup(&self, name: &str) -> Snapshot {
        self.read().bindings.get(name).cloned().unwrap_or_default()
    }

    /// Handles of the registrations of `name`, in delivery order.
    pub(crate) fn handles(&self, name: &str) -> Vec<BindingHandle> {
        self.lookup(name).iter().map(Registration::handle).collect()
    }

    /// Marks a pass over `name` as started and returns its snapshot.
    ///
    /// The pass ends when the returned guard is dropped.
    pub(crate) fn begin_pass(&self, name: &str) -> PassGuard<'_> {
        let mut state = self.write();
        let key = state.intern(name);
        *state.active.entry(Arc::clone(&key)).or_insert(0) += 1;
        let snapshot = state.bindings.get(name).cloned().unwrap_or_default();
        PassGuard {
            table: self,
            name: key,
            snapshot,
        }
    }

    fn end_pass(&self, name: &str) {
        let mut state = self.write();
        let finished = match state.active.get_mut(name) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            _ => true,
        };
        if finished {
            state.active.remove(name);
            state.merge(name);
        }
    }

    /// True if `registration` was unbound while its event was being dispatched.
    pub(crate) fn is_retired(&self, registration: &Registration) -> bool {
        self.read().pending.is_retired(registration)
    }

    /// Merges pending entries of every name that has no active pass.
    pub(crate) fn flush(&self) -> FlushOutcome {
        let mut state = self.write();
        let mut merged = 0;
        for name in state.pending.names() {
            if !state.is_active(&name) {
                merged += state.merge(&name);
            }
        }
        FlushOutcome {
            merged,
            deferred: state.pending.len(),
        }
    }

    pub(crate) fn listener_count(&self, name: &str) -> usize {
        self.read().bindings.get(name).map_or(0, |s| s.len())
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.read().pending.len()
    }

    /// Drops every registration and pending entry. Passes in flight keep
    /// their snapshots and unwind normally.
    pub(crate) fn clear(&self) {
        let mut state = self.write();
        state.bindings.clear();
        state.pending.clear();
    }
}

impl Default for BindingTable {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII marker for an active dispatch pass over one event name.
pub(crate) struct PassGuard<'a> {
    table: &'a BindingTable,
    name: Arc<str>,
    snapshot: Snapshot,
}

impl PassGuard<'_> {
    pub(crate) fn snapshot(&self) -> &[Registration] {
        &self.snapshot
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.table.end_pass(&self.name);
    }
}
