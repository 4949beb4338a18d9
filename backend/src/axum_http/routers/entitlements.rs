use std::sync::Arc;

use application::usecases::{plan_resolver::PlanResolver, role_projector::RoleStoreGateway};
use axum::{
    Json, Router,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::get,
};
use domain::repositories::entitlements::EntitlementRepository;
use serde_json::json;
use tracing::info;

pub fn routes<R, G>(resolver: Arc<PlanResolver<R, G>>) -> Router
where
    R: EntitlementRepository + Send + Sync + 'static,
    G: RoleStoreGateway + Send + Sync + 'static,
{
    Router::new()
        .route("/:subject_id/plan", get(resolve_plan))
        .with_state(resolver)
}

pub async fn resolve_plan<R, G>(
    State(resolver): State<Arc<PlanResolver<R, G>>>,
    Path(subject_id): Path<String>,
) -> Response
where
    R: EntitlementRepository + Send + Sync + 'static,
    G: RoleStoreGateway + Send + Sync + 'static,
{
    let plan = resolver.resolve_effective_plan(&subject_id).await;
    info!(%subject_id, plan = plan.as_str(), "entitlements: plan resolved");
    Json(json!({ "plan": plan.as_str() })).into_response()
}
