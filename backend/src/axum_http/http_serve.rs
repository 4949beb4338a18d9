use crate::{
    axum_http::{default_routers, routers},
    config::config_model::DotEnvyConfig,
};
use anyhow::Result;
use application::usecases::{
    billing_webhook::{BillingWebhookUseCase, BillingWebhookVerifier},
    plan_resolver::PlanResolver,
    role_projector::RoleStoreGateway,
};
use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::get,
};
use domain::repositories::entitlements::EntitlementRepository;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

pub async fn start<R, G, V>(
    config: Arc<DotEnvyConfig>,
    webhook_usecase: Arc<BillingWebhookUseCase<R, G, V>>,
    plan_resolver: Arc<PlanResolver<R, G>>,
) -> Result<()>
where
    R: EntitlementRepository + Send + Sync + 'static,
    G: RoleStoreGateway + Send + Sync + 'static,
    V: BillingWebhookVerifier + Send + Sync + 'static,
{
    let app = Router::new()
        .fallback(default_routers::not_found)
        .nest(
            "/api/v1/billing",
            routers::billing_webhook::routes(webhook_usecase),
        )
        .nest(
            "/api/v1/entitlements",
            routers::entitlements::routes(plan_resolver),
        )
        .route("/api/v1/health-check", get(default_routers::health_check))
        .layer(TimeoutLayer::new(Duration::from_secs(config.server.timeout)))
        .layer(RequestBodyLimitLayer::new(
            (config.server.body_limit * 1024 * 1024).try_into()?,
        ))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr).await?;

    info!("Server is running on port {}", config.server.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
    };

    // Docker and K8s stop containers with SIGTERM (Unix only).
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM signal handler");
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
