//! Format hint store with read-time retirement and per-key write serialization.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tracing::debug;

use super::{
    backend::{HintBackend, MemoryBackend},
    hint::{FormatHint, HintKey},
};
use crate::{
    error::{HintStoreError, Result},
    path::JsonPath,
};

/// Shared store of learned content paths.
///
/// Reads go straight to the backend. Every read-modify-write for a key runs
/// under that key's lock, so two exchanges finishing together for the same
/// provider/model never lose a counter update. Share one store between
/// sessions with an `Arc`.
#[derive(Debug)]
pub struct FormatHintStore {
    backend: Arc<dyn HintBackend>,
    /// One entry per key touched since it was last removed; bounded by the
    /// number of stored keys plus keys with an operation in flight.
    key_locks: Mutex<HashMap<HintKey, Arc<Mutex<()>>>>,
}

impl Default for FormatHintStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl FormatHintStore {
    /// Creates a store over an arbitrary backend.
    pub fn new(backend: Arc<dyn HintBackend>) -> Self {
        Self {
            backend,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a store over a fresh [`MemoryBackend`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    fn key_lock(&self, key: &HintKey) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .key_locks
            .lock()
            .map_err(|_| HintStoreError::poisoned("hint key table"))?;
        Ok(Arc::clone(locks.entry(key.clone()).or_default()))
    }

    fn with_key_lock<T>(&self, key: &HintKey, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self.key_lock(key)?;
        let _guard = lock
            .lock()
            .map_err(|_| HintStoreError::poisoned("hint key lock"))?;
        f()
    }

    /// Drops the key's lock entry unless another caller still holds it.
    fn release_key_lock(&self, key: &HintKey) -> Result<()> {
        let mut locks = self
            .key_locks
            .lock()
            .map_err(|_| HintStoreError::poisoned("hint key table"))?;
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
        Ok(())
    }

    /// Best active hint for a provider/model.
    ///
    /// An exact model match wins over the provider-wide hint; retired hints
    /// are skipped at both levels.
    pub fn find(&self, provider_id: &str, model_id: Option<&str>) -> Result<Option<FormatHint>> {
        let key = HintKey::new(provider_id, model_id);
        if key.model_id.is_some() {
            if let Some(hint) = self.backend.get(&key)? {
                if !hint.should_retire() {
                    return Ok(Some(hint));
                }
                debug!(key = %key, failures = hint.failure_count, "skipping retired hint");
            }
        }
        match self.backend.get(&key.provider_wide())? {
            Some(hint) if !hint.should_retire() => Ok(Some(hint)),
            Some(hint) => {
                debug!(key = %hint.key(), failures = hint.failure_count, "skipping retired hint");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// The stored hint under exactly this key, retired or not.
    pub fn get(&self, provider_id: &str, model_id: Option<&str>) -> Result<Option<FormatHint>> {
        self.backend.get(&HintKey::new(provider_id, model_id))
    }

    /// Upserts `hint` under its own key.
    pub fn save(&self, hint: &FormatHint) -> Result<()> {
        let key = hint.key();
        self.with_key_lock(&key, || self.backend.put(hint))?;
        debug!(key = %key, path = %hint.content_path, "saved format hint");
        Ok(())
    }

    /// Records a successful extraction and returns the updated hint.
    ///
    /// Counters are applied to the stored record, not to the possibly stale
    /// `hint` snapshot. If the stored record now points somewhere else (or
    /// was removed) the update is returned but not persisted.
    pub fn record_success(&self, hint: &FormatHint) -> Result<FormatHint> {
        self.record(hint, FormatHint::with_success)
    }

    /// Records a failed extraction and returns the updated hint.
    pub fn record_failure(&self, hint: &FormatHint) -> Result<FormatHint> {
        self.record(hint, FormatHint::with_failure)
    }

    fn record(&self, hint: &FormatHint, bump: fn(&FormatHint) -> FormatHint) -> Result<FormatHint> {
        let key = hint.key();
        self.with_key_lock(&key, || match self.backend.get(&key)? {
            Some(stored) if stored.content_path == hint.content_path => {
                let updated = bump(&stored);
                self.backend.put(&updated)?;
                debug!(
                    key = %key,
                    successes = updated.success_count,
                    failures = updated.failure_count,
                    "updated hint counters"
                );
                Ok(updated)
            }
            _ => Ok(bump(hint)),
        })
    }

    /// Makes `path` the hint for a provider/model.
    ///
    /// Counts a success on an existing hint at the same path, replaces a hint
    /// at a different path, and creates one otherwise. Runs as a single
    /// atomic step under the key lock.
    pub fn promote(&self, provider_id: &str, model_id: Option<&str>, path: &JsonPath) -> Result<FormatHint> {
        let key = HintKey::new(provider_id, model_id);
        self.with_key_lock(&key, || {
            let hint = match self.backend.get(&key)? {
                Some(stored) if &stored.content_path == path => stored.with_success(),
                _ => FormatHint::new(provider_id, model_id, path.clone()).with_success(),
            };
            self.backend.put(&hint)?;
            debug!(key = %key, path = %path, successes = hint.success_count, "promoted hint");
            Ok(hint)
        })
    }

    /// Deletes the hint under exactly this key.
    pub fn remove(&self, provider_id: &str, model_id: Option<&str>) -> Result<bool> {
        let key = HintKey::new(provider_id, model_id);
        let removed = self.with_key_lock(&key, || self.backend.delete(&key))?;
        self.release_key_lock(&key)?;
        if removed {
            debug!(key = %key, "removed format hint");
        }
        Ok(removed)
    }

    /// Every stored hint for a provider, including retired ones.
    pub fn list(&self, provider_id: &str) -> Result<Vec<FormatHint>> {
        self.backend.list(provider_id)
    }

    /// Zeroes the counters of a stored hint, giving a retired hint another
    /// chance. Returns `None` when nothing is stored under the key.
    pub fn reset(&self, provider_id: &str, model_id: Option<&str>) -> Result<Option<FormatHint>> {
        let key = HintKey::new(provider_id, model_id);
        self.with_key_lock(&key, || {
            let Some(stored) = self.backend.get(&key)? else {
                return Ok(None);
            };
            let reset = stored.reset();
            self.backend.put(&reset)?;
            debug!(key = %key, "reset hint counters");
            Ok(Some(reset))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn path(s: &str) -> JsonPath {
        s.parse().unwrap()
    }

    fn retired(provider: &str, model: Option<&str>, p: &str) -> FormatHint {
        FormatHint {
            failure_count: 6,
            ..FormatHint::new(provider, model, path(p))
        }
    }

    #[test]
    fn test_find_prefers_exact_model() {
        let store = FormatHintStore::in_memory();
        store.save(&FormatHint::new("acme", None, path("wide"))).unwrap();
        store.save(&FormatHint::new("acme", Some("m1"), path("exact"))).unwrap();

        let found = store.find("acme", Some("m1")).unwrap().unwrap();
        assert_eq!(found.content_path, path("exact"));
        let fallback = store.find("acme", Some("m2")).unwrap().unwrap();
        assert_eq!(fallback.content_path, path("wide"));
        assert!(store.find("other", Some("m1")).unwrap().is_none());
    }

    #[test]
    fn test_find_skips_retired() {
        let store = FormatHintStore::in_memory();
        store.save(&retired("acme", Some("m1"), "exact")).unwrap();
        store.save(&FormatHint::new("acme", None, path("wide"))).unwrap();
        let found = store.find("acme", Some("m1")).unwrap().unwrap();
        assert_eq!(found.content_path, path("wide"));

        store.save(&retired("acme", None, "wide")).unwrap();
        assert!(store.find("acme", Some("m1")).unwrap().is_none());
        // Still inspectable.
        assert!(store.get("acme", Some("m1")).unwrap().is_some());
        assert_eq!(store.list("acme").unwrap().len(), 2);
    }

    #[test]
    fn test_reset_revives_retired_hint() {
        let store = FormatHintStore::in_memory();
        store.save(&retired("acme", None, "wide")).unwrap();
        assert!(store.find("acme", None).unwrap().is_none());
        let reset = store.reset("acme", None).unwrap().unwrap();
        assert_eq!(reset.failure_count, 0);
        assert!(store.find("acme", None).unwrap().is_some());
        assert!(store.reset("missing", None).unwrap().is_none());
    }

    #[test]
    fn test_record_updates_stored_counts() {
        let store = FormatHintStore::in_memory();
        let hint = FormatHint::new("acme", None, path("a"));
        store.save(&hint).unwrap();

        store.record_success(&hint).unwrap();
        // Stale snapshot still increments the stored record.
        let updated = store.record_failure(&hint).unwrap();
        assert_eq!((updated.success_count, updated.failure_count), (1, 1));
        let stored = store.get("acme", None).unwrap().unwrap();
        assert_eq!(stored, updated);
    }

    #[test]
    fn test_record_on_replaced_hint_is_not_persisted() {
        let store = FormatHintStore::in_memory();
        let old = FormatHint::new("acme", None, path("old"));
        store.save(&FormatHint::new("acme", None, path("new"))).unwrap();
        let updated = store.record_failure(&old).unwrap();
        assert_eq!(updated.failure_count, 1);
        let stored = store.get("acme", None).unwrap().unwrap();
        assert_eq!(stored.content_path, path("new"));
        assert_eq!(stored.failure_count, 0);
    }

    #[test]
    fn test_promote_creates_then_updates() {
        let store = FormatHintStore::in_memory();
        store.promote("acme", Some("m1"), &path("data.reply")).unwrap();
        let second = store.promote("acme", Some("m1"), &path("data.reply")).unwrap();
        assert_eq!(second.success_count, 2);
        assert_eq!(store.list("acme").unwrap().len(), 1);

        let replaced = store.promote("acme", Some("m1"), &path("data.text")).unwrap();
        assert_eq!(replaced.success_count, 1);
        assert_eq!(replaced.content_path, path("data.text"));
        assert_eq!(store.list("acme").unwrap().len(), 1);
    }

    #[test]
    fn test_remove() {
        let store = FormatHintStore::in_memory();
        store.save(&FormatHint::new("acme", None, path("a"))).unwrap();
        assert!(store.remove("acme", None).unwrap());
        assert!(!store.remove("acme", None).unwrap());
    }

    #[test]
    fn test_remove_releases_key_lock() {
        let store = FormatHintStore::in_memory();
        for i in 0..50 {
            let model = format!("m{i}");
            let hint = FormatHint::new("acme", Some(&model), path("a"));
            store.save(&hint).unwrap();
            store.record_success(&hint).unwrap();
            store.remove("acme", Some(&model)).unwrap();
        }
        assert!(store.key_locks.lock().unwrap().is_empty());

        store.save(&FormatHint::new("acme", None, path("a"))).unwrap();
        assert_eq!(store.key_locks.lock().unwrap().len(), 1);
        assert!(store.remove("acme", None).unwrap());
        assert!(store.key_locks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let store = Arc::new(FormatHintStore::in_memory());
        let hint = FormatHint::new("acme", Some("m1"), path("a"));
        store.save(&hint).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let hint = hint.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        store.record_success(&hint).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get("acme", Some("m1")).unwrap().unwrap().success_count, 200);
    }
}
