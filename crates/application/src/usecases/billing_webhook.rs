use std::sync::Arc;

use anyhow::Result as AnyResult;
use chrono::{DateTime, Duration, TimeZone, Utc};
use thiserror::Error;
use tracing::{error, info, warn};

use domain::{
    entities::entitlements::EntitlementRecord,
    repositories::entitlements::EntitlementRepository,
    value_objects::{
        billing_events::BillingEvent,
        enums::{downgrade_policies::DowngradePolicy, plan_ids::PlanId},
        plans::PlanCatalog,
    },
};

use crate::{
    alerts::{AlertDispatcher, RoleSyncAlert},
    subject_locks::SubjectLocks,
    usecases::role_projector::{RoleProjector, RoleStoreGateway, RoleSyncError},
};

/// The only event type that changes entitlements; everything else is
/// acknowledged untouched.
const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[cfg_attr(test, mockall::automock)]
pub trait BillingWebhookVerifier: Send + Sync {
    /// Checks the provider signature over the raw payload and parses the event.
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> AnyResult<BillingEvent>;
}

#[derive(Debug, Error)]
pub enum BillingWebhookError {
    /// Delivery did not carry a valid provider signature; the payload is untrusted.
    #[error("webhook signature verification failed")]
    InvalidSignature,
    /// The entitlement store could not record the event. The provider should
    /// redeliver.
    #[error("entitlement store unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

impl BillingWebhookError {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            BillingWebhookError::InvalidSignature => StatusCode::BAD_REQUEST,
            BillingWebhookError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Terminal dispositions acknowledged with 200. Redelivering an event that
/// ended in any of these cannot change the stored state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Entitlement recorded; role projection result rides along.
    Applied {
        subject_id: String,
        plan: PlanId,
        role_sync: RoleSyncStatus,
    },
    /// Event id seen before, nothing re-applied.
    AlreadyProcessed { event_id: String },
    /// An event type the reconciler does not act on.
    IgnoredEventType { event_type: String },
    /// Authentic but unusable payload. Deliberately left unprocessed so a
    /// corrected redelivery under the same id can still apply.
    MalformedEvent { reason: &'static str },
    /// The downgrade policy kept the existing entitlement instead.
    SkippedByPolicy {
        subject_id: String,
        kept_plan: PlanId,
    },
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied { .. } => "applied",
            WebhookOutcome::AlreadyProcessed { .. } => "already_processed",
            WebhookOutcome::IgnoredEventType { .. } => "ignored",
            WebhookOutcome::MalformedEvent { .. } => "malformed",
            WebhookOutcome::SkippedByPolicy { .. } => "skipped_by_policy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleSyncStatus {
    Synced,
    /// Entitlement recorded but the role store did not fully converge.
    /// Reconciliation happens on the next event or manual re-sync.
    Failed { detail: String },
}

pub type UseCaseResult<T> = std::result::Result<T, BillingWebhookError>;

pub struct BillingWebhookUseCase<R, G, V>
where
    R: EntitlementRepository + Send + Sync + 'static,
    G: RoleStoreGateway + Send + Sync + 'static,
    V: BillingWebhookVerifier + Send + Sync + 'static,
{
    entitlement_repo: Arc<R>,
    role_projector: Arc<RoleProjector<G>>,
    verifier: Arc<V>,
    catalog: Arc<PlanCatalog>,
    subject_locks: SubjectLocks,
    downgrade_policy: DowngradePolicy,
    alerts: Option<AlertDispatcher>,
}

impl<R, G, V> BillingWebhookUseCase<R, G, V>
where
    R: EntitlementRepository + Send + Sync + 'static,
    G: RoleStoreGateway + Send + Sync + 'static,
    V: BillingWebhookVerifier + Send + Sync + 'static,
{
    pub fn new(
        entitlement_repo: Arc<R>,
        role_projector: Arc<RoleProjector<G>>,
        verifier: Arc<V>,
        catalog: Arc<PlanCatalog>,
        downgrade_policy: DowngradePolicy,
        alerts: Option<AlertDispatcher>,
    ) -> Self {
        Self {
            entitlement_repo,
            role_projector,
            verifier,
            catalog,
            subject_locks: SubjectLocks::new(),
            downgrade_policy,
            alerts,
        }
    }

    pub async fn handle_stripe_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> UseCaseResult<WebhookOutcome> {
        let event = self
            .verifier
            .verify_webhook_signature(payload, signature)
            .map_err(|err| {
                let rejection = BillingWebhookError::InvalidSignature;
                warn!(
                    error = %err,
                    status = rejection.status_code().as_u16(),
                    "stripe webhook verification failed"
                );
                rejection
            })?;

        info!(event_type = %event.event_type, "billing_webhook: stripe webhook verified");

        if event.event_type != CHECKOUT_COMPLETED {
            info!(
                event_type = %event.event_type,
                "billing_webhook: acknowledging unhandled event type"
            );
            return Ok(WebhookOutcome::IgnoredEventType {
                event_type: event.event_type,
            });
        }

        let Some(event_id) = event.event_id.clone() else {
            return Ok(Self::malformed("event is missing an id"));
        };
        let Some(checkout) = event.checkout.clone() else {
            return Ok(Self::malformed("completed checkout carries no session"));
        };
        let Some(subject_id) = checkout.subject_id else {
            return Ok(Self::malformed("checkout metadata is missing the subject id"));
        };
        let Some(requested_plan) = checkout.requested_plan else {
            return Ok(Self::malformed("checkout metadata is missing the plan"));
        };
        let Some(plan) = PlanId::from_str(&requested_plan) else {
            return Ok(Self::malformed("checkout metadata names an unknown plan"));
        };
        if plan == PlanId::Free {
            return Ok(Self::malformed("free plan cannot be purchased"));
        }

        // All checks and writes for one subject run under its lock, so
        // concurrent deliveries for the same subject apply one at a time.
        let _guard = self.subject_locks.acquire(&subject_id).await;

        match self.entitlement_repo.has_processed_event(&event_id).await {
            Ok(false) => {}
            Ok(true) => {
                info!(
                    %event_id,
                    %subject_id,
                    "billing_webhook: duplicate delivery already applied"
                );
                return Ok(WebhookOutcome::AlreadyProcessed { event_id });
            }
            Err(err) => {
                error!(
                    %event_id,
                    db_error = ?err,
                    "billing_webhook: failed to check processed events"
                );
                return Err(BillingWebhookError::Unavailable(err));
            }
        }

        if self.downgrade_policy == DowngradePolicy::PreserveLifetime && plan != PlanId::Lifetime {
            if let Some(kept) = self.preserve_lifetime(&subject_id, &event_id).await? {
                return Ok(kept);
            }
        }

        let observed_at = event
            .created
            .and_then(timestamp_to_datetime)
            .unwrap_or_else(Utc::now);

        let expires_at = match self.catalog.get(plan).cadence.period_days() {
            Some(days) => match observed_at.checked_add_signed(Duration::days(days)) {
                Some(until) => Some(until),
                None => return Ok(Self::malformed("entitlement expiry out of range")),
            },
            None => None,
        };

        let record = EntitlementRecord {
            subject_id: subject_id.clone(),
            plan,
            expires_at,
            source_event_id: event_id.clone(),
            updated_at: Utc::now(),
        };

        if let Err(err) = self
            .entitlement_repo
            .commit_entitlement_with_event(record)
            .await
        {
            error!(
                %subject_id,
                %event_id,
                db_error = ?err,
                "billing_webhook: failed to store entitlement"
            );
            return Err(BillingWebhookError::Unavailable(err));
        }

        info!(
            %subject_id,
            %event_id,
            plan = %plan,
            "billing_webhook: entitlement recorded"
        );

        // The entitlement above is the source of truth and is never rolled
        // back when role projection fails.
        let role_sync = match self.role_projector.apply(&subject_id, plan).await {
            Ok(_) => RoleSyncStatus::Synced,
            Err(err) => {
                error!(
                    %subject_id,
                    %event_id,
                    plan = %plan,
                    error = %err,
                    "billing_webhook: role projection did not converge"
                );
                self.alert_role_sync(&subject_id, plan, &event_id, &err);
                RoleSyncStatus::Failed {
                    detail: err.to_string(),
                }
            }
        };

        Ok(WebhookOutcome::Applied {
            subject_id,
            plan,
            role_sync,
        })
    }

    /// Consumes the event without applying it when the subject already holds a
    /// live lifetime entitlement. Returns the outcome to acknowledge with, or
    /// `None` when the event should apply normally.
    async fn preserve_lifetime(
        &self,
        subject_id: &str,
        event_id: &str,
    ) -> UseCaseResult<Option<WebhookOutcome>> {
        let existing = self
            .entitlement_repo
            .find_entitlement_by_subject_id(subject_id)
            .await
            .map_err(|err| {
                error!(
                    %subject_id,
                    db_error = ?err,
                    "billing_webhook: failed to load entitlement for policy check"
                );
                BillingWebhookError::Unavailable(err)
            })?;

        let holds_lifetime = existing
            .is_some_and(|record| record.effective_plan(Utc::now()) == PlanId::Lifetime);
        if !holds_lifetime {
            return Ok(None);
        }

        self.entitlement_repo
            .mark_event_processed(event_id)
            .await
            .map_err(|err| {
                error!(
                    %event_id,
                    db_error = ?err,
                    "billing_webhook: failed to mark skipped event processed"
                );
                BillingWebhookError::Unavailable(err)
            })?;

        info!(
            %subject_id,
            %event_id,
            "billing_webhook: downgrade policy kept lifetime entitlement"
        );

        Ok(Some(WebhookOutcome::SkippedByPolicy {
            subject_id: subject_id.to_string(),
            kept_plan: PlanId::Lifetime,
        }))
    }

    fn alert_role_sync(
        &self,
        subject_id: &str,
        desired_plan: PlanId,
        event_id: &str,
        err: &RoleSyncError,
    ) {
        let Some(alerts) = &self.alerts else {
            return;
        };
        let failures = match err {
            RoleSyncError::PartialFailure { failures } => failures.clone(),
            RoleSyncError::Unavailable(_) => Vec::new(),
        };
        alerts.try_dispatch(RoleSyncAlert {
            subject_id: subject_id.to_string(),
            desired_plan,
            source_event_id: event_id.to_string(),
            detail: err.to_string(),
            failures,
        });
    }

    fn malformed(reason: &'static str) -> WebhookOutcome {
        warn!(reason, "billing_webhook: malformed event left unprocessed");
        WebhookOutcome::MalformedEvent { reason }
    }
}

fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use domain::{
        repositories::entitlements::MockEntitlementRepository,
        value_objects::{billing_events::CheckoutSummary, plans::PlanRoleMap},
    };
    use mockall::predicate::eq;

    use crate::usecases::role_projector::MockRoleStoreGateway;

    const CREATED_AT: i64 = 1_700_000_000;

    fn catalog() -> Arc<PlanCatalog> {
        Arc::new(PlanCatalog::new(PlanRoleMap {
            monthly: Some("role-monthly".to_string()),
            annual: Some("role-annual".to_string()),
            lifetime: Some("role-lifetime".to_string()),
        }))
    }

    fn checkout_event(event_id: &str, subject_id: &str, plan: &str) -> BillingEvent {
        BillingEvent {
            event_id: Some(event_id.to_string()),
            event_type: CHECKOUT_COMPLETED.to_string(),
            created: Some(CREATED_AT),
            checkout: Some(CheckoutSummary {
                subject_id: Some(subject_id.to_string()),
                requested_plan: Some(plan.to_string()),
            }),
        }
    }

    fn verifier_returning(event: BillingEvent) -> MockBillingWebhookVerifier {
        let mut verifier = MockBillingWebhookVerifier::new();
        verifier
            .expect_verify_webhook_signature()
            .returning(move |_, _| Ok(event.clone()));
        verifier
    }

    fn usecase(
        repo: MockEntitlementRepository,
        gateway: MockRoleStoreGateway,
        verifier: MockBillingWebhookVerifier,
        policy: DowngradePolicy,
    ) -> BillingWebhookUseCase<
        MockEntitlementRepository,
        MockRoleStoreGateway,
        MockBillingWebhookVerifier,
    > {
        let catalog = catalog();
        let projector = Arc::new(RoleProjector::new(Arc::new(gateway), catalog.clone()));
        BillingWebhookUseCase::new(
            Arc::new(repo),
            projector,
            Arc::new(verifier),
            catalog,
            policy,
            None,
        )
    }

    fn created_at() -> DateTime<Utc> {
        timestamp_to_datetime(CREATED_AT).unwrap()
    }

    #[tokio::test]
    async fn applies_checkout_and_grants_role() {
        let mut repo = MockEntitlementRepository::new();
        repo.expect_has_processed_event()
            .with(eq("evt-1"))
            .returning(|_| Box::pin(async { Ok(false) }));
        repo.expect_commit_entitlement_with_event()
            .withf(|record| {
                record.subject_id == "u1"
                    && record.plan == PlanId::Monthly
                    && record.expires_at == Some(created_at() + Duration::days(30))
                    && record.source_event_id == "evt-1"
            })
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));

        let mut gateway = MockRoleStoreGateway::new();
        gateway
            .expect_list_member_role_ids()
            .with(eq("u1"))
            .returning(|_| Ok(Vec::new()));
        gateway
            .expect_grant_role()
            .with(eq("u1"), eq("role-monthly"))
            .times(1)
            .returning(|_, _| Ok(()));

        let usecase = usecase(
            repo,
            gateway,
            verifier_returning(checkout_event("evt-1", "u1", "monthly")),
            DowngradePolicy::LatestEventWins,
        );

        let outcome = usecase.handle_stripe_webhook(b"{}", "sig").await.unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Applied {
                subject_id: "u1".to_string(),
                plan: PlanId::Monthly,
                role_sync: RoleSyncStatus::Synced,
            }
        );
    }

    #[tokio::test]
    async fn annual_plan_expires_a_year_out() {
        let mut repo = MockEntitlementRepository::new();
        repo.expect_has_processed_event()
            .returning(|_| Box::pin(async { Ok(false) }));
        repo.expect_commit_entitlement_with_event()
            .withf(|record| record.expires_at == Some(created_at() + Duration::days(365)))
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));

        let mut gateway = MockRoleStoreGateway::new();
        gateway
            .expect_list_member_role_ids()
            .returning(|_| Ok(Vec::new()));
        gateway.expect_grant_role().returning(|_, _| Ok(()));

        let usecase = usecase(
            repo,
            gateway,
            verifier_returning(checkout_event("evt-2", "u1", "annual")),
            DowngradePolicy::LatestEventWins,
        );

        let outcome = usecase.handle_stripe_webhook(b"{}", "sig").await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Applied { .. }));
    }

    #[tokio::test]
    async fn lifetime_plan_never_expires() {
        let mut repo = MockEntitlementRepository::new();
        repo.expect_has_processed_event()
            .returning(|_| Box::pin(async { Ok(false) }));
        repo.expect_commit_entitlement_with_event()
            .withf(|record| record.plan == PlanId::Lifetime && record.expires_at.is_none())
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));

        let mut gateway = MockRoleStoreGateway::new();
        gateway
            .expect_list_member_role_ids()
            .returning(|_| Ok(Vec::new()));
        gateway
            .expect_grant_role()
            .with(eq("u1"), eq("role-lifetime"))
            .times(1)
            .returning(|_, _| Ok(()));

        let usecase = usecase(
            repo,
            gateway,
            verifier_returning(checkout_event("evt-3", "u1", "lifetime")),
            DowngradePolicy::LatestEventWins,
        );

        let outcome = usecase.handle_stripe_webhook(b"{}", "sig").await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Applied { .. }));
    }

    #[tokio::test]
    async fn missing_created_falls_back_to_observation_time() {
        let mut event = checkout_event("evt-4", "u1", "monthly");
        event.created = None;

        let mut repo = MockEntitlementRepository::new();
        repo.expect_has_processed_event()
            .returning(|_| Box::pin(async { Ok(false) }));
        repo.expect_commit_entitlement_with_event()
            .withf(|record| {
                let expected = Utc::now() + Duration::days(30);
                let drift = (expected - record.expires_at.unwrap()).num_seconds().abs();
                drift <= 5
            })
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));

        let mut gateway = MockRoleStoreGateway::new();
        gateway
            .expect_list_member_role_ids()
            .returning(|_| Ok(Vec::new()));
        gateway.expect_grant_role().returning(|_, _| Ok(()));

        let usecase = usecase(
            repo,
            gateway,
            verifier_returning(event),
            DowngradePolicy::LatestEventWins,
        );

        let outcome = usecase.handle_stripe_webhook(b"{}", "sig").await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Applied { .. }));
    }

    #[tokio::test]
    async fn duplicate_event_is_acknowledged_without_reapplying() {
        let mut repo = MockEntitlementRepository::new();
        repo.expect_has_processed_event()
            .with(eq("evt-1"))
            .returning(|_| Box::pin(async { Ok(true) }));

        let usecase = usecase(
            repo,
            MockRoleStoreGateway::new(),
            verifier_returning(checkout_event("evt-1", "u1", "monthly")),
            DowngradePolicy::LatestEventWins,
        );

        let outcome = usecase.handle_stripe_webhook(b"{}", "sig").await.unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::AlreadyProcessed {
                event_id: "evt-1".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn unhandled_event_type_is_acknowledged_untouched() {
        let mut event = checkout_event("evt-1", "u1", "monthly");
        event.event_type = "invoice.payment_succeeded".to_string();

        let usecase = usecase(
            MockEntitlementRepository::new(),
            MockRoleStoreGateway::new(),
            verifier_returning(event),
            DowngradePolicy::LatestEventWins,
        );

        let outcome = usecase.handle_stripe_webhook(b"{}", "sig").await.unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::IgnoredEventType {
                event_type: "invoice.payment_succeeded".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn bad_signature_is_rejected() {
        let mut verifier = MockBillingWebhookVerifier::new();
        verifier
            .expect_verify_webhook_signature()
            .returning(|_, _| Err(anyhow!("signature mismatch")));

        let usecase = usecase(
            MockEntitlementRepository::new(),
            MockRoleStoreGateway::new(),
            verifier,
            DowngradePolicy::LatestEventWins,
        );

        let err = usecase
            .handle_stripe_webhook(b"{}", "bad")
            .await
            .unwrap_err();
        assert!(matches!(err, BillingWebhookError::InvalidSignature));
        assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_event_id_is_malformed() {
        let mut event = checkout_event("evt-1", "u1", "monthly");
        event.event_id = None;

        // No repository expectations: a malformed event must not be marked
        // processed, so a corrected redelivery can still apply.
        let usecase = usecase(
            MockEntitlementRepository::new(),
            MockRoleStoreGateway::new(),
            verifier_returning(event),
            DowngradePolicy::LatestEventWins,
        );

        let outcome = usecase.handle_stripe_webhook(b"{}", "sig").await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::MalformedEvent { .. }));
    }

    #[tokio::test]
    async fn missing_subject_is_malformed() {
        let mut event = checkout_event("evt-1", "u1", "monthly");
        event.checkout.as_mut().unwrap().subject_id = None;

        let usecase = usecase(
            MockEntitlementRepository::new(),
            MockRoleStoreGateway::new(),
            verifier_returning(event),
            DowngradePolicy::LatestEventWins,
        );

        let outcome = usecase.handle_stripe_webhook(b"{}", "sig").await.unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::MalformedEvent {
                reason: "checkout metadata is missing the subject id",
            }
        );
    }

    #[tokio::test]
    async fn unknown_plan_is_malformed() {
        let usecase = usecase(
            MockEntitlementRepository::new(),
            MockRoleStoreGateway::new(),
            verifier_returning(checkout_event("evt-1", "u1", "gold")),
            DowngradePolicy::LatestEventWins,
        );

        let outcome = usecase.handle_stripe_webhook(b"{}", "sig").await.unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::MalformedEvent {
                reason: "checkout metadata names an unknown plan",
            }
        );
    }

    #[tokio::test]
    async fn free_plan_purchase_is_malformed() {
        let usecase = usecase(
            MockEntitlementRepository::new(),
            MockRoleStoreGateway::new(),
            verifier_returning(checkout_event("evt-1", "u1", "free")),
            DowngradePolicy::LatestEventWins,
        );

        let outcome = usecase.handle_stripe_webhook(b"{}", "sig").await.unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::MalformedEvent {
                reason: "free plan cannot be purchased",
            }
        );
    }

    #[tokio::test]
    async fn store_failure_asks_for_redelivery() {
        let mut repo = MockEntitlementRepository::new();
        repo.expect_has_processed_event()
            .returning(|_| Box::pin(async { Ok(false) }));
        repo.expect_commit_entitlement_with_event()
            .returning(|_| Box::pin(async { Err(anyhow!("disk full")) }));

        // Role projection must not run when the entitlement was never stored.
        let usecase = usecase(
            repo,
            MockRoleStoreGateway::new(),
            verifier_returning(checkout_event("evt-1", "u1", "monthly")),
            DowngradePolicy::LatestEventWins,
        );

        let err = usecase
            .handle_stripe_webhook(b"{}", "sig")
            .await
            .unwrap_err();
        assert!(matches!(err, BillingWebhookError::Unavailable(_)));
        assert_eq!(err.status_code(), http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn processed_check_failure_asks_for_redelivery() {
        let mut repo = MockEntitlementRepository::new();
        repo.expect_has_processed_event()
            .returning(|_| Box::pin(async { Err(anyhow!("read failed")) }));

        let usecase = usecase(
            repo,
            MockRoleStoreGateway::new(),
            verifier_returning(checkout_event("evt-1", "u1", "monthly")),
            DowngradePolicy::LatestEventWins,
        );

        let err = usecase
            .handle_stripe_webhook(b"{}", "sig")
            .await
            .unwrap_err();
        assert!(matches!(err, BillingWebhookError::Unavailable(_)));
    }

    #[tokio::test]
    async fn role_sync_failure_still_records_the_entitlement() {
        let mut repo = MockEntitlementRepository::new();
        repo.expect_has_processed_event()
            .returning(|_| Box::pin(async { Ok(false) }));
        repo.expect_commit_entitlement_with_event()
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));

        let mut gateway = MockRoleStoreGateway::new();
        gateway
            .expect_list_member_role_ids()
            .returning(|_| Ok(Vec::new()));
        gateway
            .expect_grant_role()
            .returning(|_, _| Err(anyhow!("missing permission")));

        let usecase = usecase(
            repo,
            gateway,
            verifier_returning(checkout_event("evt-1", "u1", "monthly")),
            DowngradePolicy::LatestEventWins,
        );

        let outcome = usecase.handle_stripe_webhook(b"{}", "sig").await.unwrap();
        match outcome {
            WebhookOutcome::Applied { role_sync, .. } => {
                assert!(matches!(role_sync, RoleSyncStatus::Failed { .. }));
            }
            other => panic!("expected applied outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn preserve_lifetime_policy_skips_downgrades() {
        let lifetime = EntitlementRecord {
            subject_id: "u1".to_string(),
            plan: PlanId::Lifetime,
            expires_at: None,
            source_event_id: "evt-0".to_string(),
            updated_at: Utc::now(),
        };

        let mut repo = MockEntitlementRepository::new();
        repo.expect_has_processed_event()
            .returning(|_| Box::pin(async { Ok(false) }));
        repo.expect_find_entitlement_by_subject_id()
            .with(eq("u1"))
            .returning(move |_| {
                let record = lifetime.clone();
                Box::pin(async move { Ok(Some(record)) })
            });
        repo.expect_mark_event_processed()
            .with(eq("evt-1"))
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));

        let usecase = usecase(
            repo,
            MockRoleStoreGateway::new(),
            verifier_returning(checkout_event("evt-1", "u1", "monthly")),
            DowngradePolicy::PreserveLifetime,
        );

        let outcome = usecase.handle_stripe_webhook(b"{}", "sig").await.unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::SkippedByPolicy {
                subject_id: "u1".to_string(),
                kept_plan: PlanId::Lifetime,
            }
        );
    }

    #[tokio::test]
    async fn preserve_lifetime_policy_lets_other_changes_through() {
        let monthly = EntitlementRecord {
            subject_id: "u1".to_string(),
            plan: PlanId::Monthly,
            expires_at: Some(Utc::now() + Duration::days(10)),
            source_event_id: "evt-0".to_string(),
            updated_at: Utc::now(),
        };

        let mut repo = MockEntitlementRepository::new();
        repo.expect_has_processed_event()
            .returning(|_| Box::pin(async { Ok(false) }));
        repo.expect_find_entitlement_by_subject_id()
            .returning(move |_| {
                let record = monthly.clone();
                Box::pin(async move { Ok(Some(record)) })
            });
        repo.expect_commit_entitlement_with_event()
            .withf(|record| record.plan == PlanId::Annual)
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));

        let mut gateway = MockRoleStoreGateway::new();
        gateway
            .expect_list_member_role_ids()
            .returning(|_| Ok(vec!["role-monthly".to_string()]));
        gateway
            .expect_revoke_role()
            .with(eq("u1"), eq("role-monthly"))
            .times(1)
            .returning(|_, _| Ok(()));
        gateway
            .expect_grant_role()
            .with(eq("u1"), eq("role-annual"))
            .times(1)
            .returning(|_, _| Ok(()));

        let usecase = usecase(
            repo,
            gateway,
            verifier_returning(checkout_event("evt-1", "u1", "annual")),
            DowngradePolicy::PreserveLifetime,
        );

        let outcome = usecase.handle_stripe_webhook(b"{}", "sig").await.unwrap();
        assert!(matches!(
            outcome,
            WebhookOutcome::Applied {
                plan: PlanId::Annual,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn lapsed_lifetime_record_does_not_block_downgrades() {
        let lapsed = EntitlementRecord {
            subject_id: "u1".to_string(),
            plan: PlanId::Lifetime,
            expires_at: Some(Utc::now() - Duration::days(1)),
            source_event_id: "evt-0".to_string(),
            updated_at: Utc::now(),
        };

        let mut repo = MockEntitlementRepository::new();
        repo.expect_has_processed_event()
            .returning(|_| Box::pin(async { Ok(false) }));
        repo.expect_find_entitlement_by_subject_id()
            .returning(move |_| {
                let record = lapsed.clone();
                Box::pin(async move { Ok(Some(record)) })
            });
        repo.expect_commit_entitlement_with_event()
            .withf(|record| record.plan == PlanId::Monthly)
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));

        let mut gateway = MockRoleStoreGateway::new();
        gateway
            .expect_list_member_role_ids()
            .returning(|_| Ok(Vec::new()));
        gateway.expect_grant_role().returning(|_, _| Ok(()));

        let usecase = usecase(
            repo,
            gateway,
            verifier_returning(checkout_event("evt-1", "u1", "monthly")),
            DowngradePolicy::PreserveLifetime,
        );

        let outcome = usecase.handle_stripe_webhook(b"{}", "sig").await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Applied { .. }));
    }
}
