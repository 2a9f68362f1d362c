//! Storage accountant
//!
//! Per-user byte and competition-entry counters. Checks and increments
//! happen under the same map shard lock, so concurrent uploads by one user
//! can never overshoot a quota between the check and the add.
//!
//! Reservations release themselves when dropped unless committed: an upload
//! that fails after reserving (bad decode, full disk) gives its bytes back.

use crate::error::QuotaError;
use crate::types::UserId;
use dashmap::DashMap;
use tracing::{debug, warn};

/// Byte and entry-slot counters for every user
#[derive(Debug, Default)]
pub struct StorageAccountant {
    bytes: DashMap<UserId, u64>,
    entries: DashMap<UserId, u32>,
}

impl StorageAccountant {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently counted against `user`
    #[must_use]
    pub fn usage(&self, user: UserId) -> u64 {
        self.bytes.get(&user).map_or(0, |v| *v)
    }

    /// Entry slots currently taken by `user`
    #[must_use]
    pub fn entries_used(&self, user: UserId) -> u32 {
        self.entries.get(&user).map_or(0, |v| *v)
    }

    /// Load a known usage figure (e.g. from the user store at startup)
    pub fn seed(&self, user: UserId, bytes: u64) {
        self.bytes.insert(user, bytes);
    }

    /// Load a known entry count
    pub fn seed_entries(&self, user: UserId, used: u32) {
        self.entries.insert(user, used);
    }

    /// Atomically count `bytes` against `user` if it fits in `quota`
    ///
    /// # Errors
    /// [`QuotaError::StorageExceeded`] if `used + bytes > quota`
    pub fn reserve(&self, user: UserId, bytes: u64, quota: u64) -> Result<Reservation<'_>, QuotaError> {
        let mut used = self.bytes.entry(user).or_insert(0);
        let total = used.saturating_add(bytes);
        if total > quota {
            warn!(user = %user, used = *used, requested = bytes, quota, "storage quota exceeded");
            return Err(QuotaError::StorageExceeded {
                used: *used,
                requested: bytes,
                quota,
            });
        }
        *used = total;
        debug!(user = %user, used = total, quota, "reserved storage");
        Ok(Reservation {
            accountant: self,
            user,
            bytes,
            entries: 0,
            committed: false,
        })
    }

    /// Give back bytes; never goes below zero
    pub fn release(&self, user: UserId, bytes: u64) {
        if let Some(mut used) = self.bytes.get_mut(&user) {
            *used = used.saturating_sub(bytes);
            debug!(user = %user, used = *used, released = bytes, "released storage");
        }
    }

    /// Atomically take one entry slot if fewer than `slots` are in use
    ///
    /// # Errors
    /// [`QuotaError::NoEntrySlots`] when every slot is taken
    pub fn reserve_entry(&self, user: UserId, slots: u32) -> Result<Reservation<'_>, QuotaError> {
        let mut used = self.entries.entry(user).or_insert(0);
        if *used >= slots {
            return Err(QuotaError::NoEntrySlots { slots });
        }
        *used += 1;
        Ok(Reservation {
            accountant: self,
            user,
            bytes: 0,
            entries: 1,
            committed: false,
        })
    }

    /// Free one entry slot; never goes below zero
    pub fn release_entry(&self, user: UserId) {
        if let Some(mut used) = self.entries.get_mut(&user) {
            *used = used.saturating_sub(1);
        }
    }
}

/// Bytes or entry slots held for an upload in flight
///
/// Dropping an uncommitted reservation returns what it holds.
#[derive(Debug)]
#[must_use = "an uncommitted reservation is released when dropped"]
pub struct Reservation<'a> {
    accountant: &'a StorageAccountant,
    user: UserId,
    bytes: u64,
    entries: u32,
    committed: bool,
}

impl Reservation<'_> {
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Keep the reservation; the upload succeeded
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if self.bytes > 0 {
            self.accountant.release(self.user, self.bytes);
        }
        for _ in 0..self.entries {
            self.accountant.release_entry(self.user);
        }
    }
}
