use std::time::Duration;

use clap::Parser;

use crate::live_scores::ProviderSettings;

/// Normalized live-score API over several upstream providers
#[derive(Parser, Debug, Clone)]
#[command(name = "livescore-hub", version, about)]
pub struct Config {
    /// HTTP API listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// SportMonks API token (enables the SportMonks provider)
    #[arg(long, env = "SPORTMONKS_API_KEY")]
    pub sportmonks_api_key: Option<String>,

    /// SportMonks base URL override
    #[arg(long, env = "SPORTMONKS_API_URL")]
    pub sportmonks_api_url: Option<String>,

    /// API-Football key (enables the API-Football provider)
    #[arg(long, env = "API_FOOTBALL_KEY")]
    pub api_football_key: Option<String>,

    /// TheSportsDB key; the free tier is used when no provider is configured
    #[arg(long, env = "THESPORTSDB_API_KEY")]
    pub thesportsdb_api_key: Option<String>,

    /// Restrict TheSportsDB live scores to one sport (e.g. football)
    #[arg(long, env = "THESPORTSDB_LIVE_SPORT")]
    pub thesportsdb_live_sport: Option<String>,

    /// Longest a request may wait for a rate-limit slot, in seconds
    #[arg(long, env = "RATE_LIMIT_MAX_WAIT_SECS", default_value = "120")]
    pub rate_limit_max_wait_secs: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rate_limit_max_wait_secs == 0 {
            anyhow::bail!("rate_limit_max_wait_secs must be positive");
        }
        if let Some(url) = self
            .sportmonks_api_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
        {
            url::Url::parse(url)
                .map_err(|e| anyhow::anyhow!("SPORTMONKS_API_URL is not a valid URL: {}", e))?;
        }
        Ok(())
    }

    pub fn rate_limit_max_wait(&self) -> Duration {
        Duration::from_secs(self.rate_limit_max_wait_secs)
    }

    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            sportmonks_api_key: self.sportmonks_api_key.clone(),
            sportmonks_api_url: self.sportmonks_api_url.clone(),
            api_football_key: self.api_football_key.clone(),
            thesportsdb_api_key: self.thesportsdb_api_key.clone(),
            thesportsdb_live_sport: self.thesportsdb_live_sport.clone(),
        }
        .normalized()
    }
}
