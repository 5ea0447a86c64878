//! In-memory registry of active locks.
//!
//! Two tables: exact-path resource locks and subtree (depth-infinity)
//! collection locks. Both live behind one mutex whose guard spans each
//! whole scan-and-mutate, so two concurrent `try_lock` callers can never
//! both observe "no conflict" and both insert.
//!
//! Expiry is lazy: expired entries are evicted whenever a scan encounters
//! them and are never returned or counted as conflicts. No timers run.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::lock::{Lock, LockDepth, LockScope};
use crate::path::is_within;

#[derive(Debug, Default)]
struct Tables {
    resource: HashMap<String, Lock>,
    collection: Vec<Lock>,
}

/// The per-session lock registry. Discarded when the session ends; locks
/// do not survive session loss.
#[derive(Debug, Default)]
pub struct LockTable {
    inner: Mutex<Tables>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most specific applicable lock for `path`: the exact resource
    /// entry if one is live, otherwise the first live collection lock
    /// whose subtree contains `path`.
    pub fn get_lock(&self, path: &str) -> Option<Lock> {
        let now = chrono::Utc::now().timestamp();
        let mut tables = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(found) = tables.resource.get(path) {
            if found.is_expired(now) {
                tables.resource.remove(path);
            } else {
                return Some(found.clone());
            }
        }

        tables.collection.retain(|lock| !lock.is_expired(now));
        tables
            .collection
            .iter()
            .find(|lock| is_within(&lock.path, path))
            .cloned()
    }

    /// Try to register `lock`, non-blocking. `false` means another live
    /// lock is in the way and nothing was registered.
    ///
    /// A depth-infinity request conflicts with any live lock at or under
    /// its path when either side is exclusive. A single-resource request
    /// only consults the exact-path entry; enclosing collection locks are
    /// not considered here, and callers wanting subtree exclusivity check
    /// `get_lock` before calling in.
    pub fn try_lock(&self, lock: Lock) -> bool {
        let now = chrono::Utc::now().timestamp();
        let mut tables = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        match lock.depth {
            LockDepth::Infinity => {
                tables.resource.retain(|_, held| !held.is_expired(now));
                tables.collection.retain(|held| !held.is_expired(now));

                let conflict = tables
                    .resource
                    .values()
                    .chain(tables.collection.iter())
                    .any(|held| {
                        is_within(&lock.path, &held.path)
                            && (held.scope == LockScope::Exclusive
                                || lock.scope == LockScope::Exclusive)
                    });
                if conflict {
                    debug!("subtree lock on {} refused", lock.path);
                    return false;
                }

                debug!("subtree lock on {} registered for {}", lock.path, lock.owner);
                tables.collection.push(lock);
                true
            }
            LockDepth::Item => match tables.resource.entry(lock.path.clone()) {
                Entry::Occupied(mut occupied) => {
                    if occupied.get().is_expired(now) {
                        debug!("resource lock on {} replaced expired entry", lock.path);
                        occupied.insert(lock);
                        true
                    } else {
                        debug!("resource lock on {} refused, already held", lock.path);
                        false
                    }
                }
                Entry::Vacant(vacant) => {
                    debug!("resource lock on {} registered for {}", lock.path, lock.owner);
                    vacant.insert(lock);
                    true
                }
            },
        }
    }

    /// Drop the resource entry at `path` and any collection entries whose
    /// path equals `path` exactly. A subtree lock is only removable via its
    /// own root path, never via a descendant. Idempotent.
    pub fn unlock(&self, path: &str) {
        let mut tables = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        tables.resource.remove(path);
        tables.collection.retain(|lock| lock.path != path);
    }
}
