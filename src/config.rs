use anyhow::Context;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_POLL_SCHEDULE: &str = "0 */5 * * * *";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{}'", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub provider_api_url: String,
    pub provider_api_token: String,
    pub webhook_secret: String,
    pub sender_name: String,
    pub poll_schedule: String,
    pub poll_batch_size: u32,
    pub provider_timeout_secs: u64,
    pub keepalive_secs: u64,
    pub cors_allowed_origins: Option<String>,
    pub log_format: LogFormat,
    pub log_request_body: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let config = Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("SERVER_PORT must be a port number")?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            provider_api_url: env::var("PROVIDER_API_URL")
                .context("PROVIDER_API_URL is required")?,
            provider_api_token: env::var("PROVIDER_API_TOKEN")
                .context("PROVIDER_API_TOKEN is required")?,
            webhook_secret: env::var("WEBHOOK_SECRET").context("WEBHOOK_SECRET is required")?,
            sender_name: env::var("SENDER_NAME").context("SENDER_NAME is required")?,
            poll_schedule: env::var("POLL_SCHEDULE")
                .unwrap_or_else(|_| DEFAULT_POLL_SCHEDULE.to_string()),
            poll_batch_size: env::var("POLL_BATCH_SIZE")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("POLL_BATCH_SIZE must be a positive integer")?,
            provider_timeout_secs: env::var("PROVIDER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .context("PROVIDER_TIMEOUT_SECS must be a number of seconds")?,
            keepalive_secs: env::var("KEEPALIVE_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .context("KEEPALIVE_SECS must be a number of seconds")?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS").ok(),
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .parse()?,
            log_request_body: env::var("LOG_REQUEST_BODY")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("DATABASE_URL is empty");
        }
        if self.webhook_secret.trim().is_empty() {
            anyhow::bail!("WEBHOOK_SECRET is empty");
        }
        if self.sender_name.trim().is_empty() {
            anyhow::bail!("SENDER_NAME is empty");
        }
        if self.server_port == 0 {
            anyhow::bail!("SERVER_PORT must be greater than 0");
        }
        if self.provider_timeout_secs == 0 || self.keepalive_secs == 0 {
            anyhow::bail!("PROVIDER_TIMEOUT_SECS and KEEPALIVE_SECS must be greater than 0");
        }
        if self.poll_batch_size == 0 {
            anyhow::bail!("POLL_BATCH_SIZE must be greater than 0");
        }

        url::Url::parse(&self.provider_api_url).context("PROVIDER_API_URL is not a valid URL")?;
        self.schedule()?;

        Ok(())
    }

    pub fn schedule(&self) -> anyhow::Result<cron::Schedule> {
        cron::Schedule::from_str(&self.poll_schedule)
            .map_err(|e| anyhow::anyhow!("POLL_SCHEDULE '{}' is invalid: {}", self.poll_schedule, e))
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        server_port: 3000,
        database_url: "postgres://localhost:5432/tracker".to_string(),
        provider_api_url: "https://provider.example.com".to_string(),
        provider_api_token: "token".to_string(),
        webhook_secret: "whsec_test".to_string(),
        sender_name: "Acme Payroll".to_string(),
        poll_schedule: DEFAULT_POLL_SCHEDULE.to_string(),
        poll_batch_size: 20,
        provider_timeout_secs: 15,
        keepalive_secs: 15,
        cors_allowed_origins: None,
        log_format: LogFormat::Pretty,
        log_request_body: false,
    }
}
