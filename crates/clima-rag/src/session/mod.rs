//! Sticky per-conversation capacity.
//!
//! Once a capacity has been calculated for a conversation, short follow-ups
//! ("e 220v?") keep searching at that capacity until the slot expires. Every
//! read slides the expiry forward.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Every this many writes, expired slots of other conversations are swept.
const PURGE_EVERY_WRITES: u64 = 64;

#[async_trait]
pub trait CapacitySlotStore: Send + Sync {
    /// Current value, refreshing the expiry on hit.
    async fn get(&self, conversation_id: &str) -> Result<Option<u32>>;

    async fn set(&self, conversation_id: &str, capacity: u32, ttl: Duration) -> Result<()>;

    async fn clear(&self, conversation_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
struct CapacitySlot {
    capacity: u32,
    ttl: ChronoDuration,
    expires_at: DateTime<Utc>,
}

/// In-process slot store. Single-node only. Expired entries go away on their
/// next read or in the periodic sweep run from `set`.
#[derive(Debug, Default)]
pub struct MemorySlotStore {
    slots: DashMap<String, CapacitySlot>,
    writes: AtomicU64,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every expired slot. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.expires_at > now);
        before - self.slots.len()
    }

    fn get_at(&self, conversation_id: &str, now: DateTime<Utc>) -> Option<u32> {
        let mut expired = false;
        let value = match self.slots.get_mut(conversation_id) {
            Some(mut slot) if slot.expires_at > now => {
                slot.expires_at = now + slot.ttl;
                Some(slot.capacity)
            }
            Some(_) => {
                expired = true;
                None
            }
            None => None,
        };
        if expired {
            self.slots
                .remove_if(conversation_id, |_, slot| slot.expires_at <= now);
        }
        value
    }

    fn set_at(&self, conversation_id: &str, capacity: u32, ttl: Duration, now: DateTime<Utc>) {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::minutes(20));
        self.slots.insert(
            conversation_id.to_string(),
            CapacitySlot {
                capacity,
                ttl,
                expires_at: now + ttl,
            },
        );
    }
}

#[async_trait]
impl CapacitySlotStore for MemorySlotStore {
    async fn get(&self, conversation_id: &str) -> Result<Option<u32>> {
        Ok(self.get_at(conversation_id, Utc::now()))
    }

    async fn set(&self, conversation_id: &str, capacity: u32, ttl: Duration) -> Result<()> {
        if capacity == 0 {
            self.slots.remove(conversation_id);
        } else {
            self.set_at(conversation_id, capacity, ttl, Utc::now());
        }

        if self.writes.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY_WRITES == PURGE_EVERY_WRITES - 1 {
            let removed = self.purge_expired();
            if removed > 0 {
                tracing::debug!(removed = removed, remaining = self.slots.len(), "Expired capacity slots purged");
            }
        }
        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        self.slots.remove(conversation_id);
        Ok(())
    }
}
