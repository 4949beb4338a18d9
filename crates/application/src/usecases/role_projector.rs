use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use domain::value_objects::{
    enums::plan_ids::PlanId,
    plans::PlanCatalog,
    role_sync::{RoleDelta, RoleOperation, RoleSyncFailure},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleStoreGateway: Send + Sync {
    /// Current role membership snapshot. An unknown member reads as no roles.
    async fn list_member_role_ids(&self, subject_id: &str) -> AnyResult<Vec<String>>;

    async fn grant_role(&self, subject_id: &str, role_id: &str) -> AnyResult<()>;

    async fn revoke_role(&self, subject_id: &str, role_id: &str) -> AnyResult<()>;
}

#[derive(Debug, Error)]
pub enum RoleSyncError {
    /// The role store could not even be read; nothing was mutated.
    #[error("role store unavailable: {0}")]
    Unavailable(anyhow::Error),
    /// Some mutations failed after every delta entry was attempted.
    #[error("role sync incomplete: {} operation(s) failed", .failures.len())]
    PartialFailure { failures: Vec<RoleSyncFailure> },
}

/// Projects a subject's desired plan onto the external role store.
///
/// Applying the same desired plan against an already-correct role set performs
/// zero mutations, so retries converge.
pub struct RoleProjector<G>
where
    G: RoleStoreGateway + Send + Sync + 'static,
{
    role_gateway: Arc<G>,
    catalog: Arc<PlanCatalog>,
}

impl<G> RoleProjector<G>
where
    G: RoleStoreGateway + Send + Sync + 'static,
{
    pub fn new(role_gateway: Arc<G>, catalog: Arc<PlanCatalog>) -> Self {
        Self {
            role_gateway,
            catalog,
        }
    }

    /// Grant the desired plan's role if missing, revoke every other plan-mapped
    /// role currently held. Revokes list in ascending plan-rank order.
    fn compute_role_delta(&self, current_role_ids: &[String], desired_plan: PlanId) -> RoleDelta {
        let desired_role = self.catalog.role_id(desired_plan);

        let grant = desired_role
            .filter(|role| !current_role_ids.iter().any(|held| held == role))
            .map(str::to_string);

        let mut revoke = Vec::new();
        for plan in PlanId::ALL {
            if plan == desired_plan {
                continue;
            }
            if let Some(role) = self.catalog.role_id(plan) {
                if current_role_ids.iter().any(|held| held == role) {
                    revoke.push(role.to_string());
                }
            }
        }

        RoleDelta { grant, revoke }
    }

    pub async fn apply(
        &self,
        subject_id: &str,
        desired_plan: PlanId,
    ) -> Result<RoleDelta, RoleSyncError> {
        let current_role_ids = self
            .role_gateway
            .list_member_role_ids(subject_id)
            .await
            .map_err(|err| {
                error!(
                    %subject_id,
                    plan = %desired_plan,
                    error = ?err,
                    "role_projector: failed to read current roles"
                );
                RoleSyncError::Unavailable(err)
            })?;

        if desired_plan != PlanId::Free && self.catalog.role_id(desired_plan).is_none() {
            warn!(
                %subject_id,
                plan = %desired_plan,
                "role_projector: no role configured for plan; skipping grant"
            );
        }

        let delta = self.compute_role_delta(&current_role_ids, desired_plan);
        if delta.is_empty() {
            debug!(
                %subject_id,
                plan = %desired_plan,
                "role_projector: roles already converged"
            );
            return Ok(delta);
        }

        // Every delta entry is attempted even when an earlier one fails.
        let mut failures = Vec::new();
        for role_id in &delta.revoke {
            if let Err(err) = self.role_gateway.revoke_role(subject_id, role_id).await {
                warn!(
                    %subject_id,
                    role_id = %role_id,
                    error = ?err,
                    "role_projector: revoke failed"
                );
                failures.push(RoleSyncFailure {
                    operation: RoleOperation::Revoke,
                    role_id: role_id.clone(),
                    error: err.to_string(),
                });
            }
        }

        if let Some(role_id) = &delta.grant {
            if let Err(err) = self.role_gateway.grant_role(subject_id, role_id).await {
                warn!(
                    %subject_id,
                    role_id = %role_id,
                    error = ?err,
                    "role_projector: grant failed"
                );
                failures.push(RoleSyncFailure {
                    operation: RoleOperation::Grant,
                    role_id: role_id.clone(),
                    error: err.to_string(),
                });
            }
        }

        if !failures.is_empty() {
            return Err(RoleSyncError::PartialFailure { failures });
        }

        info!(
            %subject_id,
            plan = %desired_plan,
            granted = delta.grant.is_some(),
            revoked = delta.revoke.len(),
            "role_projector: role delta applied"
        );

        Ok(delta)
    }
}
