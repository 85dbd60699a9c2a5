//! Per-key gate for read-modify-write patches.
//!
//! Two patches on the same record must not interleave their read and write,
//! or one of them loses its update. The gate hands out one async lock per
//! [`CompositeId`]; slots exist only while someone holds or waits on them.
//!
//! A patch holds exactly one key at a time, so there is no lock ordering to
//! get wrong.

use parking_lot::Mutex;
use relstore_codec::CompositeId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

/// Single-flight gate keyed by record.
#[derive(Debug, Default)]
pub struct KeyGate {
    slots: Mutex<HashMap<CompositeId, Slot>>,
}

/// Exclusive hold on one key. Released on drop.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    gate: &'a KeyGate,
    id: CompositeId,
    slot: Slot,
    held: Option<OwnedMutexGuard<()>>,
}

impl KeyGate {
    /// Creates an empty gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no one else holds `id`, then takes it.
    pub async fn acquire(&self, id: &CompositeId) -> KeyGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(id.clone()).or_default())
        };
        let held = Arc::clone(&slot).lock_owned().await;
        KeyGuard {
            gate: self,
            id: id.clone(),
            slot,
            held: Some(held),
        }
    }

    /// Number of keys currently held or waited on.
    #[must_use]
    pub fn active_keys(&self) -> usize {
        self.slots.lock().len()
    }
}

impl KeyGuard<'_> {
    /// The key this guard holds.
    #[must_use]
    pub fn id(&self) -> &CompositeId {
        &self.id
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        let mut slots = self.gate.slots.lock();
        // One reference in the map, one here: nobody else is waiting.
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.id);
        }
    }
}
