use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Fixed set of plan identifiers known to the service.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    #[default]
    Free,
    Monthly,
    Annual,
    Lifetime,
}

impl PlanId {
    /// Every plan id, in ascending rank order.
    pub const ALL: [PlanId; 4] = [
        PlanId::Free,
        PlanId::Monthly,
        PlanId::Annual,
        PlanId::Lifetime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanId::Free => "free",
            PlanId::Monthly => "monthly",
            PlanId::Annual => "annual",
            PlanId::Lifetime => "lifetime",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "free" => Some(PlanId::Free),
            "monthly" => Some(PlanId::Monthly),
            "annual" => Some(PlanId::Annual),
            "lifetime" => Some(PlanId::Lifetime),
            _ => None,
        }
    }

    /// Total order used for upgrade/downgrade comparisons.
    pub fn rank(&self) -> u8 {
        match self {
            PlanId::Free => 0,
            PlanId::Monthly => 1,
            PlanId::Annual => 2,
            PlanId::Lifetime => 3,
        }
    }
}

impl Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
