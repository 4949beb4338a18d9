use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::entities::entitlements::EntitlementRecord;

#[async_trait]
#[automock]
pub trait EntitlementRepository {
    async fn find_entitlement_by_subject_id(
        &self,
        subject_id: &str,
    ) -> Result<Option<EntitlementRecord>>;

    async fn has_processed_event(&self, event_id: &str) -> Result<bool>;

    /// Stores the record and marks its source event processed as one durable unit.
    /// Either both survive a restart or neither does.
    async fn commit_entitlement_with_event(&self, record: EntitlementRecord) -> Result<()>;

    /// Marks an event processed without touching any record. Used when a policy
    /// decision consumes the event instead of applying it.
    async fn mark_event_processed(&self, event_id: &str) -> Result<()>;
}
