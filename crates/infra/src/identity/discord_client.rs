use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tracing::error;

use application::usecases::role_projector::RoleStoreGateway;

/// REST client for the guild that entitlement roles live in.
pub struct DiscordRoleClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    guild_id: String,
}

#[derive(Debug, Deserialize)]
struct GuildMember {
    #[serde(default)]
    roles: Vec<String>,
}

impl DiscordRoleClient {
    pub fn new(api_base: &str, bot_token: String, guild_id: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("reqwest client must build");

        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
            guild_id,
        }
    }

    fn member_url(&self, subject_id: &str) -> String {
        format!(
            "{}/guilds/{}/members/{}",
            self.api_base, self.guild_id, subject_id
        )
    }

    fn role_url(&self, subject_id: &str, role_id: &str) -> String {
        format!(
            "{}/guilds/{}/members/{}/roles/{}",
            self.api_base, self.guild_id, subject_id, role_id
        )
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        error!(
            status = %status,
            response_body = %body,
            context = %context,
            "discord api request failed"
        );

        anyhow::bail!("Discord API request failed: {} (status {})", context, status);
    }
}

#[async_trait]
impl RoleStoreGateway for DiscordRoleClient {
    async fn list_member_role_ids(&self, subject_id: &str) -> Result<Vec<String>> {
        let resp = self
            .http
            .get(self.member_url(subject_id))
            .header(AUTHORIZATION, self.auth_header())
            .send()
            .await?;

        // A subject who never joined the guild holds no roles.
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let resp = Self::ensure_success(resp, "fetch guild member").await?;
        let member: GuildMember = resp.json().await.context("decode guild member")?;
        Ok(member.roles)
    }

    async fn grant_role(&self, subject_id: &str, role_id: &str) -> Result<()> {
        let resp = self
            .http
            .put(self.role_url(subject_id, role_id))
            .header(AUTHORIZATION, self.auth_header())
            .send()
            .await?;
        Self::ensure_success(resp, "grant guild role").await?;

        Ok(())
    }

    async fn revoke_role(&self, subject_id: &str, role_id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.role_url(subject_id, role_id))
            .header(AUTHORIZATION, self.auth_header())
            .send()
            .await?;
        Self::ensure_success(resp, "revoke guild role").await?;

        Ok(())
    }
}
