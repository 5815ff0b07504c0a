//! # Connection Registry
//!
//! The set of connections that are currently eligible to receive broadcasts.
//! It is the only shared mutable state in the relay, so every access goes
//! through a single mutex and every critical section is one structural step
//! (insert, remove or copy). The lock is never held across an `.await`:
//! readers take a [`snapshot`](Registry::snapshot) and do their I/O on the copy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::core::connection::{Connection, ConnectionHandle, ConnectionId};

type Members<C> = HashMap<ConnectionId, Arc<ConnectionHandle<C>>>;

pub struct Registry<C> {
    members: Mutex<Members<C>>,
}

impl<C: Connection> Registry<C> {
    pub fn new() -> Self {
        Self {
            members: Mutex::new(HashMap::new()),
        }
    }

    // A panic while holding the lock cannot leave the map half-mutated, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Members<C>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts `handle`. Returns `false` (and changes nothing) when a member
    /// with the same id is already present.
    pub fn add(&self, handle: Arc<ConnectionHandle<C>>) -> bool {
        let id = handle.id();
        let mut members = self.lock();
        if members.contains_key(&id) {
            return false;
        }
        members.insert(id, handle);
        debug!("Registry: added {} ({} members)", id, members.len());
        true
    }

    /// Removes the member with `id`. Absent ids are not an error.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle<C>>> {
        let mut members = self.lock();
        let removed = members.remove(&id);
        if removed.is_some() {
            debug!("Registry: removed {} ({} members)", id, members.len());
        }
        removed
    }

    /// Point-in-time copy of the current members, in no particular order.
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle<C>>> {
        self.lock().values().cloned().collect()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// # Release
    ///
    /// One-shot cleanup of a connection: deregisters it and closes its
    /// outbound half. Any number of tasks may call this for the same handle;
    /// only the first call does the work and returns `true`.
    pub async fn release(&self, handle: &Arc<ConnectionHandle<C>>) -> bool {
        if !handle.mark_released() {
            return false;
        }
        self.remove(handle.id());
        handle.connection().close().await;
        info!("Client {} ({}) released", handle.id(), handle.peer());
        true
    }

    /// Synchronous half of [`release`](Registry::release) for contexts that
    /// cannot await (drop guards). The caller is responsible for closing the
    /// connection when this returns `true`.
    pub(crate) fn release_now(&self, handle: &Arc<ConnectionHandle<C>>) -> bool {
        if !handle.mark_released() {
            return false;
        }
        self.remove(handle.id());
        true
    }
}

impl<C: Connection> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}
