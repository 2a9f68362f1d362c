//! Rule resolution: plan and participation state to upload limits
//!
//! [`RuleResolver`] is built once from a [`PlanConfig`] and hands out the
//! precomputed [`UploadRules`] for each plan.

use crate::config::PlanConfig;
use crate::error::PlanError;
use crate::plan::{CompetitionTier, Participation, Plan};
use clickscape_artifact::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Everything the gate and the derivation engine need to know about a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRules {
    pub plan: Plan,
    /// Accepted extensions (lowercase, dotted)
    pub allowed_extensions: BTreeSet<FileExt>,
    /// Per-file size limit
    pub max_file_bytes: u64,
    /// Files per upload request
    pub batch_limit: usize,
    /// Bytes of retained originals the user may hold
    pub storage_quota_bytes: u64,
    /// Processed copy must carry the watermark
    pub watermark: bool,
    /// Keep the raw upload as an original artifact (and meter it)
    pub retain_original: bool,
    /// May list photos for sale
    pub marketplace: bool,
}

impl UploadRules {
    #[inline]
    #[must_use]
    pub fn allows(&self, ext: &FileExt) -> bool {
        self.allowed_extensions.contains(ext)
    }

    /// Allowed extensions, sorted and comma-joined
    #[must_use]
    pub fn allowed_list(&self) -> String {
        self.allowed_extensions
            .iter()
            .map(FileExt::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Per-file limit in whole MiB
    #[inline]
    #[must_use]
    pub fn max_file_mb(&self) -> u64 {
        self.max_file_bytes / (1024 * 1024)
    }

    /// Whether uploads under these rules count against the storage quota
    #[inline]
    #[must_use]
    pub fn is_metered(&self) -> bool {
        self.retain_original
    }
}

/// Maps plans and participations to rules
#[derive(Debug, Clone)]
pub struct RuleResolver {
    config: PlanConfig,
    free: UploadRules,
    premium: UploadRules,
}

impl RuleResolver {
    /// Build a resolver, validating the config first
    ///
    /// # Errors
    /// Returns error if the config is inconsistent
    pub fn new(config: PlanConfig) -> Result<Self, PlanError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: PlanConfig) -> Self {
        let free_exts: BTreeSet<FileExt> = config
            .free_extensions
            .iter()
            .map(|e| FileExt::parse(e))
            .filter(|e| !e.is_empty())
            .collect();
        let mut premium_exts = free_exts.clone();
        premium_exts.extend(
            config
                .premium_extra_extensions
                .iter()
                .map(|e| FileExt::parse(e))
                .filter(|e| !e.is_empty()),
        );

        let free = UploadRules {
            plan: Plan::Free,
            allowed_extensions: free_exts,
            max_file_bytes: config.free_max_bytes(),
            batch_limit: config.free_batch_limit,
            storage_quota_bytes: 0,
            watermark: true,
            retain_original: false,
            marketplace: false,
        };
        let premium = UploadRules {
            plan: Plan::Premium,
            allowed_extensions: premium_exts,
            max_file_bytes: config.premium_max_bytes(),
            batch_limit: config.premium_batch_limit,
            storage_quota_bytes: config.premium_quota_bytes(),
            watermark: false,
            retain_original: true,
            marketplace: true,
        };

        Self {
            config,
            free,
            premium,
        }
    }

    /// Rules for a plan
    #[must_use]
    pub fn rules_for(&self, plan: Plan) -> &UploadRules {
        debug!(plan = %plan, "resolving upload rules");
        match plan {
            Plan::Free => &self.free,
            Plan::Premium => &self.premium,
        }
    }

    /// Storage quota for a plan. Free keeps no originals, so it has none.
    #[must_use]
    pub fn storage_quota_bytes(&self, plan: Plan) -> u64 {
        self.rules_for(plan).storage_quota_bytes
    }

    /// Competition entries a participation allows
    ///
    /// Unpaid participations allow none.
    #[must_use]
    pub fn entry_slots(&self, participation: &Participation) -> u32 {
        if !participation.entry_paid {
            return 0;
        }
        let base = match participation.tier {
            CompetitionTier::Enthusiast => self.config.enthusiast_base_entries,
            CompetitionTier::CreatorPlus => self.config.creator_plus_base_entries,
        };
        base.saturating_add(participation.addon_slots)
    }

    #[must_use]
    pub fn config(&self) -> &PlanConfig {
        &self.config
    }
}

impl Default for RuleResolver {
    fn default() -> Self {
        Self::build(PlanConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn free_rules() {
        let resolver = RuleResolver::default();
        let rules = resolver.rules_for(Plan::Free);
        assert_eq!(rules.allowed_list(), ".jpeg, .jpg, .png");
        assert_eq!(rules.max_file_mb(), 3);
        assert_eq!(rules.batch_limit, 1);
        assert!(rules.watermark);
        assert!(!rules.retain_original);
        assert!(!rules.is_metered());
        assert_eq!(resolver.storage_quota_bytes(Plan::Free), 0);
    }

    #[test]
    fn premium_rules() {
        let resolver = RuleResolver::default();
        let rules = resolver.rules_for(Plan::Premium);
        for ext in [".jpg", ".png", ".tif", ".tiff", ".raw", ".psd"] {
            assert!(rules.allows(&FileExt::parse(ext)), "{ext} should be allowed");
        }
        assert_eq!(rules.max_file_mb(), 25);
        assert_eq!(rules.batch_limit, 10);
        assert!(!rules.watermark);
        assert!(rules.retain_original);
        assert!(rules.marketplace);
        assert_eq!(
            resolver.storage_quota_bytes(Plan::Premium),
            10_240 * 1024 * 1024
        );
    }

    #[test]
    fn default_matches_new_from_default_config() {
        let built = RuleResolver::new(PlanConfig::default()).unwrap();
        let default = RuleResolver::default();
        assert_eq!(built.rules_for(Plan::Free), default.rules_for(Plan::Free));
        assert_eq!(built.rules_for(Plan::Premium), default.rules_for(Plan::Premium));
    }

    #[test]
    fn configured_extensions_are_normalised() {
        let mut config = PlanConfig::default();
        config.free_extensions = vec!["JPG".into(), ".Png".into(), String::new()];
        config.premium_extra_extensions = vec!["heic".into()];
        let resolver = RuleResolver::new(config).unwrap();
        assert_eq!(resolver.rules_for(Plan::Free).allowed_list(), ".jpg, .png");
        assert!(resolver
            .rules_for(Plan::Premium)
            .allows(&FileExt::parse(".heic")));
    }

    #[test]
    fn entry_slots_require_payment() {
        let resolver = RuleResolver::default();
        let unpaid = Participation::new(CompetitionTier::CreatorPlus).with_addon_slots(3);
        assert_eq!(resolver.entry_slots(&unpaid), 0);

        let enthusiast = Participation::new(CompetitionTier::Enthusiast)
            .paid()
            .with_addon_slots(2);
        assert_eq!(resolver.entry_slots(&enthusiast), 3);

        let creator = Participation::new(CompetitionTier::CreatorPlus).paid();
        assert_eq!(resolver.entry_slots(&creator), 5);
    }

    proptest! {
        #[test]
        fn prop_premium_never_stricter_than_free(
            free_mb in 1u64..64,
            extra_mb in 0u64..64,
            free_batch in 1usize..8,
            extra_batch in 0usize..8,
            quota_mb in 0u64..100_000,
        ) {
            let config = PlanConfig::default()
                .with_max_upload_mb(free_mb, free_mb + extra_mb)
                .with_batch_limits(free_batch, free_batch + extra_batch)
                .with_premium_quota_mb(quota_mb);
            let resolver = RuleResolver::new(config).unwrap();
            let free = resolver.rules_for(Plan::Free);
            let premium = resolver.rules_for(Plan::Premium);

            prop_assert!(premium.allowed_extensions.is_superset(&free.allowed_extensions));
            prop_assert!(premium.max_file_bytes >= free.max_file_bytes);
            prop_assert!(premium.batch_limit >= free.batch_limit);
            prop_assert!(premium.storage_quota_bytes >= free.storage_quota_bytes);
        }
    }
}
