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

//! Scope identifiers and the registry that hands them out to entities.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Identifies the logical subscriber a registration or trigger is narrowed to.
///
/// [`ScopeId::GLOBAL`] (zero) is the unscoped value: a global registration
/// hears the event whatever scope it is triggered with, and a global trigger
/// reaches every registration of the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ScopeId(pub u64);

impl ScopeId {
    /// The global, unscoped value.
    pub const GLOBAL: ScopeId = ScopeId(0);

    /// Returns true for [`ScopeId::GLOBAL`].
    #[inline]
    pub fn is_global(self) -> bool {
        self == Self::GLOBAL
    }

    /// Whether a registration held by `self` hears an event triggered for `target`.
    #[inline]
    pub fn matches(self, target: ScopeId) -> bool {
        self.is_global() || target.is_global() || self == target
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            write!(f, "global")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

type Entity = Arc<dyn Any + Send + Sync>;

/// Allocates scope ids for entities and remembers which entity owns each one.
///
/// Listeners receive only a [`ScopeId`]; they use the registry to get back to
/// the entity the scope stands for.
pub struct ScopeRegistry {
    next: AtomicU64,
    entities: RwLock<HashMap<ScopeId, Entity>>,
}

impl ScopeRegistry {
    /// Creates an empty registry. The first id handed out is `#1`.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Allocates a fresh, non-global scope for `entity`.
    pub fn next_id<E: Any + Send + Sync>(&self, entity: Arc<E>) -> ScopeId {
        let scope = ScopeId(self.next.fetch_add(1, Ordering::Relaxed));
        self.entities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scope, entity);
        log::trace!("ScopeRegistry: allocated scope {}", scope);
        scope
    }

    /// Returns the entity that owns `scope`, if any.
    pub fn get(&self, scope: ScopeId) -> Option<Entity> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&scope)
            .cloned()
    }

    /// Returns the entity that owns `scope` if it is a `T`.
    pub fn get_as<T: Any + Send + Sync>(&self, scope: ScopeId) -> Option<Arc<T>> {
        self.get(scope)?.downcast::<T>().ok()
    }

    /// Returns true if `scope` is currently allocated.
    pub fn contains(&self, scope: ScopeId) -> bool {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&scope)
    }

    /// Forgets `scope`, returning its entity. Its id is never reused.
    pub fn remove(&self, scope: ScopeId) -> Option<Entity> {
        self.entities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&scope)
    }

    /// Returns the number of live scopes.
    pub fn len(&self) -> usize {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no scope is allocated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entity and restarts ids at `#1`.
    pub fn clear(&self) {
        let mut entities = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        entities.clear();
        self.next.store(1, Ordering::Relaxed);
    }
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("live", &self.len())
            .field("next", &self.next.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Player {
        name: &'static str,
    }

    #[test]
    fn test_scope_matching_rules() {
        let a = ScopeId(1);
        let b = ScopeId(2);
        assert!(ScopeId::GLOBAL.matches(a));
        assert!(a.matches(ScopeId::GLOBAL));
        assert!(a.matches(a));
        assert!(!a.matches(b));
    }

    #[test]
    fn test_ids_are_unique_and_non_global() {
        let registry = ScopeRegistry::new();
        let a = registry.next_id(Arc::new(Player { name: "a" }));
        let b = registry.next_id(Arc::new(Player { name: "b" }));
        assert_ne!(a, b);
        assert!(!a.is_global());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_typed_lookup() {
        let registry = ScopeRegistry::new();
        let scope = registry.next_id(Arc::new(Player { name: "hero" }));

        let player = registry.get_as::<Player>(scope).expect("player is registered");
        assert_eq!(player.name, "hero");
        assert!(registry.get_as::<String>(scope).is_none());
        assert!(registry.get(ScopeId(99)).is_none());
    }

    #[test]
    fn test_remove_and_clear() {
        let registry = ScopeRegistry::new();
        let a = registry.next_id(Arc::new(1u8));
        let b = registry.next_id(Arc::new(2u8));

        assert!(registry.remove(a).is_some());
        assert!(!registry.contains(a));
        assert!(registry.contains(b));

        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.next_id(Arc::new(3u8)), ScopeId(1));
    }

    #[test]
    fn test_display() {
        assert_eq!(ScopeId::GLOBAL.to_string(), "global");
        assert_eq!(ScopeId(12).to_string(), "#12");
    }
}
