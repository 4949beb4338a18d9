use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// What a new paid event does to a subject already holding a higher-ranked plan.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DowngradePolicy {
    /// Overwrite unconditionally; the most recent paid action wins.
    #[default]
    LatestEventWins,
    /// Keep an unexpired lifetime entitlement when a lower-ranked purchase arrives.
    PreserveLifetime,
}

impl DowngradePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DowngradePolicy::LatestEventWins => "latest-wins",
            DowngradePolicy::PreserveLifetime => "preserve-lifetime",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "latest-wins" => Some(DowngradePolicy::LatestEventWins),
            "preserve-lifetime" => Some(DowngradePolicy::PreserveLifetime),
            _ => None,
        }
    }
}

impl Display for DowngradePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
