use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, warn};

use domain::{
    repositories::entitlements::EntitlementRepository,
    value_objects::{enums::plan_ids::PlanId, plans::PlanCatalog},
};

use crate::usecases::role_projector::RoleStoreGateway;

/// Resolves the effective plan for a subject: entitlement record first, role
/// store inspection as fallback. Degrades to free rather than erroring, so
/// callers always get an answer.
pub struct PlanResolver<R, G>
where
    R: EntitlementRepository + Send + Sync + 'static,
    G: RoleStoreGateway + Send + Sync + 'static,
{
    entitlement_repo: Arc<R>,
    role_gateway: Arc<G>,
    catalog: Arc<PlanCatalog>,
    role_lookup_timeout: Duration,
}

impl<R, G> PlanResolver<R, G>
where
    R: EntitlementRepository + Send + Sync + 'static,
    G: RoleStoreGateway + Send + Sync + 'static,
{
    pub fn new(
        entitlement_repo: Arc<R>,
        role_gateway: Arc<G>,
        catalog: Arc<PlanCatalog>,
        role_lookup_timeout: Duration,
    ) -> Self {
        Self {
            entitlement_repo,
            role_gateway,
            catalog,
            role_lookup_timeout,
        }
    }

    pub async fn resolve_effective_plan(&self, subject_id: &str) -> PlanId {
        match self
            .entitlement_repo
            .find_entitlement_by_subject_id(subject_id)
            .await
        {
            Ok(Some(record)) => {
                // An existing record is authoritative even when lapsed; the
                // role store is only consulted for subjects without one.
                let plan = record.effective_plan(Utc::now());
                debug!(
                    %subject_id,
                    plan = %plan,
                    "plan_resolver: resolved from entitlement record"
                );
                plan
            }
            Ok(None) => {
                debug!(%subject_id, "plan_resolver: no record, inspecting role store");
                self.plan_from_roles(subject_id).await
            }
            Err(err) => {
                warn!(
                    %subject_id,
                    db_error = ?err,
                    "plan_resolver: entitlement lookup failed, inspecting role store"
                );
                self.plan_from_roles(subject_id).await
            }
        }
    }

    async fn plan_from_roles(&self, subject_id: &str) -> PlanId {
        let lookup = self.role_gateway.list_member_role_ids(subject_id);
        match timeout(self.role_lookup_timeout, lookup).await {
            Ok(Ok(role_ids)) => {
                let plan = self.catalog.highest_plan_for_roles(&role_ids);
                debug!(
                    %subject_id,
                    plan = %plan,
                    held_roles = role_ids.len(),
                    "plan_resolver: resolved from role store"
                );
                plan
            }
            Ok(Err(err)) => {
                warn!(
                    %subject_id,
                    error = ?err,
                    "plan_resolver: role lookup failed, answering free"
                );
                PlanId::Free
            }
            Err(_) => {
                warn!(
                    %subject_id,
                    timeout_ms = self.role_lookup_timeout.as_millis() as u64,
                    "plan_resolver: role lookup timed out, answering free"
                );
                PlanId::Free
            }
        }
    }
}
