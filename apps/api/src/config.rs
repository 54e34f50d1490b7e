use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Required variables fail startup; integration secrets are optional so a
/// local instance can run without the external directory or webhook senders.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    /// Subscription directory endpoint. When unset, plan membership is read
    /// from the locally stored `plan_type` kept current by the billing webhook.
    pub entitlements_url: Option<String>,
    pub entitlements_api_key: Option<String>,
    /// Shared secret the voice transport sends with webhook calls. Also
    /// decides billing authority: when set, call-end webhooks own the minute
    /// deduction and the client completion path records usage only.
    pub voice_webhook_secret: Option<String>,
    pub billing_webhook_secret: Option<String>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            entitlements_url: optional_env("ENTITLEMENTS_URL"),
            entitlements_api_key: optional_env("ENTITLEMENTS_API_KEY"),
            voice_webhook_secret: optional_env("VOICE_WEBHOOK_SECRET"),
            billing_webhook_secret: optional_env("BILLING_WEBHOOK_SECRET"),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// True when call-end webhooks are the billing authority.
    pub fn webhook_billing_enabled(&self) -> bool {
        self.voice_webhook_secret.is_some()
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
