use anyhow::Result;
use application::alerts::{AlertDispatcher, AlertSink};
use application::usecases::{
    billing_webhook::BillingWebhookUseCase, plan_resolver::PlanResolver,
    role_projector::RoleProjector,
};
use backend::axum_http::http_serve;
use backend::config::config_loader;
use backend::observability;
use domain::value_objects::plans::{PlanCatalog, PlanRoleMap};
use infra::alerts::discord_webhook::DiscordWebhookAlertSink;
use infra::billing::stripe_webhook::StripeWebhookVerifier;
use infra::db::json_store::JsonEntitlementStore;
use infra::identity::discord_client::DiscordRoleClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("Backend exited with error: {}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    observability::init_observability()?;

    let dotenvy_env = Arc::new(config_loader::load()?);
    info!("ENV has been loaded");

    let entitlement_store =
        Arc::new(JsonEntitlementStore::open(dotenvy_env.entitlements.db_path.as_str()).await?);
    info!(
        path = %dotenvy_env.entitlements.db_path,
        "Entitlement store has been opened"
    );

    let catalog = Arc::new(PlanCatalog::new(PlanRoleMap {
        monthly: dotenvy_env.discord.monthly_role_id.clone(),
        annual: dotenvy_env.discord.annual_role_id.clone(),
        lifetime: dotenvy_env.discord.lifetime_role_id.clone(),
    }));

    let role_client = Arc::new(DiscordRoleClient::new(
        &dotenvy_env.discord.api_base,
        dotenvy_env.discord.bot_token.clone(),
        dotenvy_env.discord.guild_id.clone(),
    ));

    let role_projector = Arc::new(RoleProjector::new(
        Arc::clone(&role_client),
        Arc::clone(&catalog),
    ));

    let alerts = ops_alert_dispatcher(dotenvy_env.alerts.ops_webhook_url.as_deref());

    let verifier = Arc::new(StripeWebhookVerifier::new(
        dotenvy_env.stripe.webhook_secret.clone(),
    ));

    let webhook_usecase = Arc::new(BillingWebhookUseCase::new(
        Arc::clone(&entitlement_store),
        role_projector,
        verifier,
        Arc::clone(&catalog),
        dotenvy_env.entitlements.downgrade_policy,
        alerts,
    ));

    let plan_resolver = Arc::new(PlanResolver::new(
        Arc::clone(&entitlement_store),
        Arc::clone(&role_client),
        Arc::clone(&catalog),
        Duration::from_millis(dotenvy_env.entitlements.role_lookup_timeout_ms),
    ));

    http_serve::start(Arc::clone(&dotenvy_env), webhook_usecase, plan_resolver).await?;

    Ok(())
}

fn ops_alert_dispatcher(raw_url: Option<&str>) -> Option<AlertDispatcher> {
    let raw_url = raw_url?;
    match Url::parse(raw_url) {
        Ok(webhook_url) => {
            info!("Role sync alerts will be sent to the ops webhook");
            let sink: Arc<dyn AlertSink> = Arc::new(DiscordWebhookAlertSink::new(webhook_url));
            Some(AlertDispatcher::new(vec![sink]))
        }
        Err(err) => {
            warn!(
                error = %err,
                "OPS_ALERT_WEBHOOK_URL is invalid, role sync alerts are disabled"
            );
            None
        }
    }
}
