use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// How often a plan renews. `None` covers both free and lifetime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BillingCadence {
    None,
    Monthly,
    Annual,
}

impl BillingCadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCadence::None => "none",
            BillingCadence::Monthly => "monthly",
            BillingCadence::Annual => "annual",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "none" => Some(BillingCadence::None),
            "monthly" => Some(BillingCadence::Monthly),
            "annual" => Some(BillingCadence::Annual),
            _ => None,
        }
    }

    /// Entitlement window granted by one paid event, if the cadence expires at all.
    pub fn period_days(&self) -> Option<i64> {
        match self {
            BillingCadence::None => None,
            BillingCadence::Monthly => Some(30),
            BillingCadence::Annual => Some(365),
        }
    }
}

impl Display for BillingCadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
