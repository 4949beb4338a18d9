use domain::value_objects::enums::downgrade_policies::DowngradePolicy;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub server: Server,
    pub stripe: Stripe,
    pub discord: Discord,
    pub entitlements: Entitlements,
    pub alerts: Alerts,
}

#[derive(Debug, Clone)]
pub struct Server {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Stripe {
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct Discord {
    pub bot_token: String,
    pub guild_id: String,
    pub api_base: String,
    pub monthly_role_id: Option<String>,
    pub annual_role_id: Option<String>,
    pub lifetime_role_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Entitlements {
    pub db_path: String,
    pub downgrade_policy: DowngradePolicy,
    pub role_lookup_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Alerts {
    pub ops_webhook_url: Option<String>,
}
