//! Entitlement resolver
//!
//! Decides at read time which artifact of a photo a viewer receives.

use crate::purchases::PurchaseLedger;
use crate::types::{PhotoRecord, Quality, Viewer};
use clickscape_artifact::ArtifactVariant;
use serde::{Deserialize, Serialize};

/// The artifact a viewer may receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub variant: ArtifactVariant,
    pub quality: Quality,
}

impl Entitlement {
    const ORIGINAL: Self = Self {
        variant: ArtifactVariant::Original,
        quality: Quality::High,
    };
    const PROCESSED: Self = Self {
        variant: ArtifactVariant::Processed,
        quality: Quality::Web,
    };
}

/// Original for premium viewers, the owner and buyers, when one was kept;
/// the processed copy otherwise
#[must_use]
pub fn resolve(viewer: &Viewer, photo: &PhotoRecord, purchases: &PurchaseLedger) -> Entitlement {
    if photo.original.is_none() {
        return Entitlement::PROCESSED;
    }
    // a plan without a user is not an account
    let entitled = viewer.user.is_some_and(|user| {
        viewer.plan.is_premium()
            || photo.is_owned_by(user)
            || purchases.has_purchased(user, photo.id)
    });
    if entitled {
        Entitlement::ORIGINAL
    } else {
        Entitlement::PROCESSED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PhotoId, StoredArtifact, UserId};
    use chrono::Utc;
    use clickscape_artifact::{ContentHash, FileExt};
    use clickscape_plan::Plan;

    fn stored(variant: ArtifactVariant) -> StoredArtifact {
        StoredArtifact {
            variant,
            key: "k.jpg".into(),
            url: "/uploads/k.jpg".into(),
            ext: FileExt::parse("jpg"),
            bytes: 1,
            hash: ContentHash::compute(b"k"),
        }
    }

    fn photo(owner: u64, with_original: bool) -> PhotoRecord {
        PhotoRecord {
            id: PhotoId::new(),
            owner: UserId(owner),
            title: "t".into(),
            category: String::new(),
            tags: Vec::new(),
            price: 5.0,
            royalty_percent: 0.15,
            watermark: !with_original,
            processed: stored(ArtifactVariant::Processed),
            original: with_original.then(|| stored(ArtifactVariant::Original)),
            bytes_size: 1,
            competition_entry: false,
            created_at: Utc::now(),
        }
    }

    fn viewer(id: u64, plan: Plan) -> Viewer {
        Viewer {
            user: Some(UserId(id)),
            plan,
        }
    }

    #[test]
    fn premium_viewer_gets_original() {
        let ledger = PurchaseLedger::new();
        let e = resolve(&viewer(2, Plan::Premium), &photo(1, true), &ledger);
        assert_eq!(e, Entitlement::ORIGINAL);
        assert_eq!(e.quality.as_str(), "high");
    }

    #[test]
    fn free_viewer_gets_processed() {
        let ledger = PurchaseLedger::new();
        let e = resolve(&viewer(2, Plan::Free), &photo(1, true), &ledger);
        assert_eq!(e, Entitlement::PROCESSED);
        assert_eq!(e.quality.as_str(), "web");
        assert_eq!(
            resolve(&Viewer::anonymous(), &photo(1, true), &ledger),
            Entitlement::PROCESSED
        );
    }

    #[test]
    fn premium_plan_without_user_resolves_as_free() {
        let ledger = PurchaseLedger::new();
        let unsigned = Viewer {
            user: None,
            plan: Plan::Premium,
        };
        assert_eq!(resolve(&unsigned, &photo(1, true), &ledger), Entitlement::PROCESSED);
    }

    #[test]
    fn owner_and_buyer_get_original() {
        let ledger = PurchaseLedger::new();
        let p = photo(1, true);
        assert_eq!(resolve(&viewer(1, Plan::Free), &p, &ledger), Entitlement::ORIGINAL);

        ledger.grant(UserId(3), p.id);
        assert_eq!(resolve(&viewer(3, Plan::Free), &p, &ledger), Entitlement::ORIGINAL);
    }

    #[test]
    fn no_original_means_processed_for_everyone() {
        let ledger = PurchaseLedger::new();
        let p = photo(1, false);
        assert_eq!(resolve(&viewer(1, Plan::Premium), &p, &ledger), Entitlement::PROCESSED);
    }
}
