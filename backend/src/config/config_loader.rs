use anyhow::{Context, Result};
use domain::value_objects::enums::downgrade_policies::DowngradePolicy;
use tracing::warn;

use super::config_model::{Alerts, Discord, DotEnvyConfig, Entitlements, Server, Stripe};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let server = Server {
        port: std::env::var("SERVER_PORT")
            .expect("SERVER_PORT is invalid")
            .parse()?,
        body_limit: std::env::var("SERVER_BODY_LIMIT")
            .expect("SERVER_BODY_LIMIT is invalid")
            .parse()?,
        timeout: std::env::var("SERVER_TIMEOUT")
            .expect("SERVER_TIMEOUT is invalid")
            .parse()?,
    };

    let stripe = Stripe {
        webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
            .expect("STRIPE_WEBHOOK_SECRET is invalid"),
    };

    let discord = Discord {
        bot_token: std::env::var("DISCORD_BOT_TOKEN").expect("DISCORD_BOT_TOKEN is invalid"),
        guild_id: std::env::var("DISCORD_GUILD_ID").expect("DISCORD_GUILD_ID is invalid"),
        api_base: std::env::var("DISCORD_API_BASE")
            .unwrap_or_else(|_| "https://discord.com/api/v10".to_string()),
        monthly_role_id: optional_env("DISCORD_MONTHLY_ROLE_ID"),
        annual_role_id: optional_env("DISCORD_ANNUAL_ROLE_ID"),
        lifetime_role_id: optional_env("DISCORD_LIFETIME_ROLE_ID"),
    };

    let downgrade_policy_raw =
        std::env::var("DOWNGRADE_POLICY").unwrap_or_else(|_| "latest-wins".to_string());
    let downgrade_policy = DowngradePolicy::from_str(&downgrade_policy_raw).unwrap_or_else(|| {
        warn!(
            value = %downgrade_policy_raw,
            "config: DOWNGRADE_POLICY is not recognized, falling back to latest-wins"
        );
        DowngradePolicy::default()
    });

    let entitlements = Entitlements {
        db_path: std::env::var("ENTITLEMENT_DB_PATH")
            .unwrap_or_else(|_| "entitlements.json".to_string()),
        downgrade_policy,
        role_lookup_timeout_ms: std::env::var("ROLE_LOOKUP_TIMEOUT_MS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .context("ROLE_LOOKUP_TIMEOUT_MS is invalid")?,
    };

    let alerts = Alerts {
        ops_webhook_url: optional_env("OPS_ALERT_WEBHOOK_URL"),
    };

    Ok(DotEnvyConfig {
        server,
        stripe,
        discord,
        entitlements,
        alerts,
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|v| {
        let trimmed = v.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}
