use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::enums::plan_ids::PlanId;

/// Durable record of the plan a subject currently holds.
///
/// `expires_at` is present exactly for time-limited cadences; free and lifetime
/// carry `None`. A record whose expiry has elapsed is never rewritten by
/// readers, it simply reads as free through [`EntitlementRecord::effective_plan`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntitlementRecord {
    pub subject_id: String,
    pub plan: PlanId,
    pub expires_at: Option<DateTime<Utc>>,
    /// Billing event that produced this record.
    pub source_event_id: String,
    pub updated_at: DateTime<Utc>,
}

impl EntitlementRecord {
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }

    /// The plan this record grants at `now`, accounting for lazy expiry.
    pub fn effective_plan(&self, now: DateTime<Utc>) -> PlanId {
        if self.is_lapsed(now) {
            PlanId::Free
        } else {
            self.plan
        }
    }
}
