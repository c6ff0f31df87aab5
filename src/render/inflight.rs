//! Per-fingerprint in-flight tracking.
//!
//! When enabled, the first request for a fingerprint becomes the leader and
//! renders; concurrent requests for the same fingerprint wait for the leader
//! to finish and then re-check the cache. The map lock is only held to claim
//! or release a slot, never during a render.

use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use super::fingerprint::Fingerprint;

#[derive(Debug, Default)]
struct Slot {
    done: Mutex<bool>,
    cond: Condvar,
}

/// Outcome of trying to claim a fingerprint.
pub enum Claim<'a> {
    /// Caller owns the render; the slot is released when the guard drops.
    Leader(LeaderGuard<'a>),
    /// Another request rendered this fingerprint while the caller waited.
    Waited,
}

#[derive(Debug, Default)]
pub struct InFlight {
    slots: Mutex<HashMap<Fingerprint, Arc<Slot>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Become the leader for `fingerprint`, or block until the current leader finishes.
    pub fn claim(&self, fingerprint: &Fingerprint) -> Claim<'_> {
        let existing = {
            let mut slots = lock(&self.slots);
            match slots.get(fingerprint) {
                Some(slot) => Arc::clone(slot),
                None => {
                    slots.insert(fingerprint.clone(), Arc::new(Slot::default()));
                    return Claim::Leader(LeaderGuard {
                        owner: self,
                        fingerprint: fingerprint.clone(),
                    });
                }
            }
        };

        debug!("Render {} already in flight, waiting", fingerprint);
        let mut done = lock(&existing.done);
        while !*done {
            done = existing
                .cond
                .wait(done)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        Claim::Waited
    }

    /// Number of fingerprints currently being rendered.
    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, fingerprint: &Fingerprint) {
        let slot = lock(&self.slots).remove(fingerprint);
        if let Some(slot) = slot {
            *lock(&slot.done) = true;
            slot.cond.notify_all();
        }
    }
}

/// Held by the leader for the duration of its render.
pub struct LeaderGuard<'a> {
    owner: &'a InFlight,
    fingerprint: Fingerprint,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        self.owner.release(&self.fingerprint);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
