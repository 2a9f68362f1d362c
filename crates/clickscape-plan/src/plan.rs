//! Subscription plans and competition participation

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Subscription tier
///
/// Anything that is not recognisably `premium` is treated as `free`, so a
/// missing or corrupt plan column can never unlock premium behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    #[default]
    Free,
    Premium,
}

impl Plan {
    /// Parse a stored plan name. Unknown values resolve to [`Plan::Free`].
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "premium" => Self::Premium,
            _ => Self::Free,
        }
    }

    /// Plan of an optional stored value
    #[must_use]
    pub fn from_stored(value: Option<&str>) -> Self {
        value.map_or(Self::Free, Self::parse)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_premium(self) -> bool {
        matches!(self, Self::Premium)
    }
}

impl Display for Plan {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paid competition tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionTier {
    /// Entry-fee tier, extra entries bought as add-on slots
    Enthusiast,
    /// Professional tier
    CreatorPlus,
}

impl CompetitionTier {
    /// Parse a tier name; `None` for anything unrecognised
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "enthusiast" => Some(Self::Enthusiast),
            "creator_plus" => Some(Self::CreatorPlus),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enthusiast => "enthusiast",
            Self::CreatorPlus => "creator_plus",
        }
    }
}

impl Display for CompetitionTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's competition enrolment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participation {
    pub tier: CompetitionTier,
    /// Entry fee settled
    pub entry_paid: bool,
    /// Extra entries bought on top of the tier's base allowance
    pub addon_slots: u32,
}

impl Participation {
    #[must_use]
    pub fn new(tier: CompetitionTier) -> Self {
        Self {
            tier,
            entry_paid: false,
            addon_slots: 0,
        }
    }

    #[must_use]
    pub fn paid(mut self) -> Self {
        self.entry_paid = true;
        self
    }

    #[must_use]
    pub fn with_addon_slots(mut self, slots: u32) -> Self {
        self.addon_slots = slots;
        self
    }
}
