//! Purchase ledger: who bought which photo

use crate::types::{PhotoId, UserId};
use dashmap::DashMap;
use std::collections::BTreeSet;

#[derive(Debug, Default)]
pub struct PurchaseLedger {
    by_buyer: DashMap<UserId, BTreeSet<PhotoId>>,
}

impl PurchaseLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a purchase; `false` if the buyer already had it
    pub fn grant(&self, buyer: UserId, photo: PhotoId) -> bool {
        self.by_buyer.entry(buyer).or_default().insert(photo)
    }

    #[must_use]
    pub fn has_purchased(&self, buyer: UserId, photo: PhotoId) -> bool {
        self.by_buyer
            .get(&buyer)
            .is_some_and(|photos| photos.contains(&photo))
    }

    /// A buyer's purchases, oldest photo id first
    #[must_use]
    pub fn purchases_of(&self, buyer: UserId) -> Vec<PhotoId> {
        self.by_buyer
            .get(&buyer)
            .map(|photos| photos.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop every grant for a deleted photo
    pub fn forget_photo(&self, photo: PhotoId) {
        for mut photos in self.by_buyer.iter_mut() {
            photos.remove(&photo);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_is_idempotent() {
        let ledger = PurchaseLedger::new();
        let photo = PhotoId::new();
        assert!(ledger.grant(UserId(1), photo));
        assert!(!ledger.grant(UserId(1), photo));
        assert!(ledger.has_purchased(UserId(1), photo));
        assert!(!ledger.has_purchased(UserId(2), photo));
        assert_eq!(ledger.purchases_of(UserId(1)), vec![photo]);
    }

    #[test]
    fn forgetting_a_photo_revokes_it_everywhere() {
        let ledger = PurchaseLedger::new();
        let photo = PhotoId::new();
        ledger.grant(UserId(1), photo);
        ledger.grant(UserId(2), photo);
        ledger.forget_photo(photo);
        assert!(!ledger.has_purchased(UserId(1), photo));
        assert!(ledger.purchases_of(UserId(2)).is_empty());
    }
}
