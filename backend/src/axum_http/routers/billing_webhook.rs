use std::sync::Arc;

use application::usecases::{
    billing_webhook::{BillingWebhookError, BillingWebhookUseCase, BillingWebhookVerifier, WebhookOutcome},
    role_projector::RoleStoreGateway,
};
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use domain::repositories::entitlements::EntitlementRepository;
use tracing::{error, info};

pub fn routes<R, G, V>(usecase: Arc<BillingWebhookUseCase<R, G, V>>) -> Router
where
    R: EntitlementRepository + Send + Sync + 'static,
    G: RoleStoreGateway + Send + Sync + 'static,
    V: BillingWebhookVerifier + Send + Sync + 'static,
{
    Router::new()
        .route("/webhooks/stripe", post(stripe_webhook))
        .with_state(usecase)
}

pub async fn stripe_webhook<R, G, V>(
    State(usecase): State<Arc<BillingWebhookUseCase<R, G, V>>>,
    headers: HeaderMap,
    payload: Bytes,
) -> Response
where
    R: EntitlementRepository + Send + Sync + 'static,
    G: RoleStoreGateway + Send + Sync + 'static,
    V: BillingWebhookVerifier + Send + Sync + 'static,
{
    info!(
        payload_bytes = payload.len(),
        "billing_webhook: stripe event received"
    );

    // A missing header verifies against nothing and is rejected like a bad one.
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    match usecase.handle_stripe_webhook(&payload, signature).await {
        Ok(outcome) => success_response(outcome),
        Err(err) => map_error(err),
    }
}

fn success_response(outcome: WebhookOutcome) -> Response {
    info!(
        outcome = outcome.label(),
        "billing_webhook: stripe event acknowledged"
    );
    (StatusCode::OK, outcome.label()).into_response()
}

fn map_error(err: BillingWebhookError) -> Response {
    let status = err.status_code();
    error!(
        status = status.as_u16(),
        error = %err,
        "billing_webhook: stripe webhook failed"
    );
    (status, err.to_string()).into_response()
}
