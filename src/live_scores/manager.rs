//! Primary/fallback execution across configured score providers.
//!
//! The manager is the error boundary of this crate: every provider failure
//! is logged and absorbed, and a total outage resolves to a valid empty
//! result instead of an error.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use super::api_football::ApiFootball;
use super::error::ProviderResult;
use super::models::{
    League, Match, MatchFilters, PaginatedResponse, Pagination, ProviderHealth, Sport,
};
use super::provider::ScoreProvider;
use super::rate_limiter::RateLimiterRegistry;
use super::sportmonks::SportMonks;
use super::thesportsdb::TheSportsDB;

/// Which providers to build, read once at start-up from [`Config`](crate::config::Config).
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub sportmonks_api_key: Option<String>,
    pub sportmonks_api_url: Option<String>,
    pub api_football_key: Option<String>,
    pub thesportsdb_api_key: Option<String>,
    pub thesportsdb_live_sport: Option<String>,
}

impl ProviderSettings {
    /// Trim every value; blank ones count as unset.
    pub fn normalized(self) -> Self {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        ProviderSettings {
            sportmonks_api_key: clean(self.sportmonks_api_key),
            sportmonks_api_url: clean(self.sportmonks_api_url),
            api_football_key: clean(self.api_football_key),
            thesportsdb_api_key: clean(self.thesportsdb_api_key),
            thesportsdb_live_sport: clean(self.thesportsdb_live_sport),
        }
    }
}

pub struct ProviderManager {
    providers: Vec<Arc<dyn ScoreProvider>>,
    primary: Option<usize>,
}

impl ProviderManager {
    pub fn new() -> Self {
        ProviderManager {
            providers: Vec::new(),
            primary: None,
        }
    }

    /// Build every configured provider. Priority for primary is SportMonks,
    /// then API-Football, then TheSportsDB; with nothing configured the
    /// free-tier TheSportsDB is used so there is always one provider.
    pub fn initialize(
        settings: &ProviderSettings,
        limiters: &RateLimiterRegistry,
    ) -> ProviderResult<Self> {
        let settings = settings.clone().normalized();
        let mut manager = ProviderManager::new();

        if let Some(key) = settings.sportmonks_api_key.as_deref() {
            let provider = SportMonks::new(key, settings.sportmonks_api_url.as_deref(), limiters)?;
            manager.add_provider(Arc::new(provider), false);
        }
        if let Some(key) = settings.api_football_key.as_deref() {
            manager.add_provider(Arc::new(ApiFootball::new(key, None, limiters)?), false);
        }
        let live_sport = settings.thesportsdb_live_sport.as_deref();
        if let Some(key) = settings.thesportsdb_api_key.as_deref() {
            let provider = TheSportsDB::new(Some(key), None, limiters)?.with_live_sport(live_sport);
            manager.add_provider(Arc::new(provider), false);
        }
        if manager.providers.is_empty() {
            warn!("No score provider API keys configured, using TheSportsDB free tier");
            let provider = TheSportsDB::new(None, None, limiters)?.with_live_sport(live_sport);
            manager.add_provider(Arc::new(provider), false);
        }

        info!(
            "Score providers: {:?} (primary: {})",
            manager.provider_names(),
            manager.primary_name().unwrap_or("none")
        );
        Ok(manager)
    }

    /// Register a provider. The first one registered, or any flagged
    /// `is_primary`, becomes primary.
    pub fn add_provider(&mut self, provider: Arc<dyn ScoreProvider>, is_primary: bool) {
        info!("Registered score provider {}", provider.name());
        self.providers.push(provider);
        if is_primary || self.primary.is_none() {
            self.primary = Some(self.providers.len() - 1);
        }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn primary_name(&self) -> Option<&str> {
        self.primary.map(|i| self.providers[i].name())
    }

    /// Primary first, then the others in registration order.
    fn ordered(&self) -> impl Iterator<Item = &Arc<dyn ScoreProvider>> {
        let primary = self.primary;
        primary
            .map(|i| &self.providers[i])
            .into_iter()
            .chain(
                self.providers
                    .iter()
                    .enumerate()
                    .filter(move |(i, _)| Some(*i) != primary)
                    .map(|(_, p)| p),
            )
    }

    /// Run `call` against each provider in turn until one succeeds.
    ///
    /// Attempts are sequential. Failures are logged and never returned;
    /// `default` comes back when every provider fails.
    pub async fn execute_with_fallback<T, F, Fut>(&self, operation: &str, default: T, call: F) -> T
    where
        F: Fn(Arc<dyn ScoreProvider>) -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        for provider in self.ordered() {
            match call(Arc::clone(provider)).await {
                Ok(value) => return value,
                Err(e) => warn!(
                    "Provider '{}' failed {}: {}, trying next",
                    provider.name(),
                    operation,
                    e
                ),
            }
        }
        if !self.providers.is_empty() {
            warn!("All score providers failed {}, returning default", operation);
        }
        default
    }

    pub async fn get_live_matches(
        &self,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> PaginatedResponse<Match> {
        self.execute_with_fallback(
            "get_live_matches",
            PaginatedResponse::empty(pagination),
            |p| async move { p.get_live_matches(filters, pagination).await },
        )
        .await
    }

    pub async fn get_scheduled_matches(
        &self,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> PaginatedResponse<Match> {
        self.execute_with_fallback(
            "get_scheduled_matches",
            PaginatedResponse::empty(pagination),
            |p| async move { p.get_scheduled_matches(filters, pagination).await },
        )
        .await
    }

    pub async fn get_finished_matches(
        &self,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> PaginatedResponse<Match> {
        self.execute_with_fallback(
            "get_finished_matches",
            PaginatedResponse::empty(pagination),
            |p| async move { p.get_finished_matches(filters, pagination).await },
        )
        .await
    }

    pub async fn get_match_by_id(&self, external_id: &str) -> Option<Match> {
        self.execute_with_fallback("get_match_by_id", None, |p| async move {
            p.get_match_by_id(external_id).await
        })
        .await
    }

    pub async fn search_matches(
        &self,
        query: &str,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> PaginatedResponse<Match> {
        self.execute_with_fallback(
            "search_matches",
            PaginatedResponse::empty(pagination),
            |p| async move { p.search_matches(query, filters, pagination).await },
        )
        .await
    }

    pub async fn get_sports(&self) -> Vec<Sport> {
        self.execute_with_fallback("get_sports", Vec::new(), |p| async move {
            p.get_sports().await
        })
        .await
    }

    pub async fn get_leagues(&self, sport: &str) -> Vec<League> {
        self.execute_with_fallback("get_leagues", Vec::new(), |p| async move {
            p.get_leagues(sport).await
        })
        .await
    }

    /// Health-check every provider concurrently.
    pub async fn get_health_status(&self) -> Vec<ProviderHealth> {
        let checks = self.providers.iter().enumerate().map(|(i, p)| async move {
            ProviderHealth {
                provider: p.name().to_string(),
                healthy: p.check_health().await,
                is_primary: self.primary == Some(i),
                rate_limit: p.rate_limit_info(),
            }
        });
        futures_util::future::join_all(checks).await
    }
}

impl Default for ProviderManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::live_scores::test_support::sample_match;
    use crate::live_scores::{paginate, MatchStatus, ProviderError, RateLimitInfo};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory provider that either serves fixed matches or always fails.
    pub(crate) struct FakeProvider {
        name: &'static str,
        fail: bool,
        matches: Vec<Match>,
        pub calls: AtomicUsize,
    }

    impl FakeProvider {
        pub(crate) fn ok(name: &'static str, matches: Vec<Match>) -> Self {
            FakeProvider {
                name,
                fail: false,
                matches,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing(name: &'static str) -> Self {
            FakeProvider {
                name,
                fail: true,
                matches: vec![],
                calls: AtomicUsize::new(0),
            }
        }

        fn attempt<T>(&self, value: T) -> ProviderResult<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ProviderError::Timeout {
                    provider: self.name.to_string(),
                    after: Duration::from_secs(10),
                })
            } else {
                Ok(value)
            }
        }

        fn page(
            &self,
            filters: &MatchFilters,
            pagination: Pagination,
        ) -> ProviderResult<PaginatedResponse<Match>> {
            self.attempt(paginate(filters.apply(self.matches.clone()), pagination))
        }
    }

    #[async_trait]
    impl ScoreProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn get_live_matches(
            &self,
            filters: &MatchFilters,
            pagination: Pagination,
        ) -> ProviderResult<PaginatedResponse<Match>> {
            self.page(filters, pagination)
        }

        async fn get_scheduled_matches(
            &self,
            filters: &MatchFilters,
            pagination: Pagination,
        ) -> ProviderResult<PaginatedResponse<Match>> {
            self.page(filters, pagination)
        }

        async fn get_finished_matches(
            &self,
            filters: &MatchFilters,
            pagination: Pagination,
        ) -> ProviderResult<PaginatedResponse<Match>> {
            self.page(filters, pagination)
        }

        async fn get_match_by_id(&self, external_id: &str) -> ProviderResult<Option<Match>> {
            let found = self
                .matches
                .iter()
                .find(|m| m.external_id == external_id)
                .cloned();
            self.attempt(found)
        }

        async fn search_matches(
            &self,
            query: &str,
            filters: &MatchFilters,
            pagination: Pagination,
        ) -> ProviderResult<PaginatedResponse<Match>> {
            let hits = self
                .matches
                .iter()
                .filter(|m| crate::live_scores::matches_query(m, query))
                .cloned()
                .collect();
            self.attempt(paginate(filters.apply(hits), pagination))
        }

        async fn get_sports(&self) -> ProviderResult<Vec<Sport>> {
            self.attempt(vec![Sport {
                id: "football".into(),
                name: format!("Football ({})", self.name),
            }])
        }

        async fn get_leagues(&self, _sport: &str) -> ProviderResult<Vec<League>> {
            self.attempt(vec![])
        }

        fn rate_limit_info(&self) -> RateLimitInfo {
            RateLimitInfo {
                provider: self.name.to_string(),
                max_requests: 10,
                window_ms: 60_000,
                remaining: 10,
                reset_in_ms: None,
            }
        }
    }

    fn arsenal() -> Match {
        sample_match("1", "Arsenal", "Chelsea", "Premier League", MatchStatus::Live)
    }

    #[tokio::test]
    async fn test_fallback_to_secondary() {
        let primary = Arc::new(FakeProvider::failing("primary"));
        let secondary = Arc::new(FakeProvider::ok("secondary", vec![arsenal()]));
        let mut manager = ProviderManager::new();
        manager.add_provider(primary.clone(), true);
        manager.add_provider(secondary.clone(), false);

        let page = manager
            .get_live_matches(&MatchFilters::default(), Pagination::default())
            .await;
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].home_team, "Arsenal");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_total_outage_returns_empty_page() {
        let mut manager = ProviderManager::new();
        manager.add_provider(Arc::new(FakeProvider::failing("a")), false);
        manager.add_provider(Arc::new(FakeProvider::failing("b")), false);

        let page = manager
            .get_live_matches(&MatchFilters::default(), Pagination::default())
            .await;
        assert_eq!(page, PaginatedResponse::empty(Pagination { page: 1, limit: 20 }));
        assert!(manager.get_match_by_id("1").await.is_none());
        assert!(manager.get_sports().await.is_empty());
        assert!(manager.get_leagues("football").await.is_empty());
    }

    #[tokio::test]
    async fn test_primary_is_tried_first_and_short_circuits() {
        let first = Arc::new(FakeProvider::ok("first", vec![]));
        let second = Arc::new(FakeProvider::ok("second", vec![arsenal()]));
        let mut manager = ProviderManager::new();
        manager.add_provider(first.clone(), false);
        manager.add_provider(second.clone(), true);
        assert_eq!(manager.primary_name(), Some("second"));

        let sports = manager.get_sports().await;
        assert_eq!(sports[0].name, "Football (second)");
        assert_eq!(first.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_first_registered_becomes_primary() {
        let mut manager = ProviderManager::new();
        manager.add_provider(Arc::new(FakeProvider::ok("a", vec![])), false);
        manager.add_provider(Arc::new(FakeProvider::ok("b", vec![])), false);
        assert_eq!(manager.primary_name(), Some("a"));
        assert_eq!(manager.provider_names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_fallback_order_follows_registration() {
        let mut manager = ProviderManager::new();
        manager.add_provider(Arc::new(FakeProvider::failing("a")), false);
        manager.add_provider(Arc::new(FakeProvider::ok("b", vec![])), false);
        manager.add_provider(Arc::new(FakeProvider::ok("c", vec![])), false);
        let sports = manager.get_sports().await;
        assert_eq!(sports[0].name, "Football (b)");
    }

    #[tokio::test]
    async fn test_no_providers_yields_default() {
        let manager = ProviderManager::new();
        let page = manager
            .search_matches("arsenal", &MatchFilters::default(), Pagination::default())
            .await;
        assert!(page.data.is_empty());
    }

    #[tokio::test]
    async fn test_match_by_id_and_search_fall_back() {
        let mut manager = ProviderManager::new();
        manager.add_provider(Arc::new(FakeProvider::failing("down")), false);
        manager.add_provider(Arc::new(FakeProvider::ok("up", vec![arsenal()])), false);

        assert_eq!(manager.get_match_by_id("1").await.unwrap().away_team, "Chelsea");
        let hits = manager
            .search_matches("chel", &MatchFilters::default(), Pagination::default())
            .await;
        assert_eq!(hits.pagination.total, 1);
    }

    #[tokio::test]
    async fn test_health_status_covers_every_provider() {
        let mut manager = ProviderManager::new();
        manager.add_provider(Arc::new(FakeProvider::failing("down")), false);
        manager.add_provider(Arc::new(FakeProvider::ok("up", vec![])), false);

        let health = manager.get_health_status().await;
        assert_eq!(health.len(), 2);
        assert!(!health[0].healthy);
        assert!(health[0].is_primary);
        assert!(health[1].healthy);
        assert_eq!(health[1].rate_limit.provider, "up");
    }

    #[test]
    fn test_settings_treat_blank_as_absent() {
        let settings = ProviderSettings {
            sportmonks_api_key: Some(" tok ".into()),
            sportmonks_api_url: Some("".into()),
            api_football_key: None,
            thesportsdb_api_key: Some("\t".into()),
            thesportsdb_live_sport: Some(" ".into()),
        }
        .normalized();
        assert_eq!(settings.sportmonks_api_key.as_deref(), Some("tok"));
        assert_eq!(settings.sportmonks_api_url, None);
        assert_eq!(settings.thesportsdb_api_key, None);
        assert_eq!(settings.thesportsdb_live_sport, None);
    }

    #[test]
    fn test_initialize_priority_order() {
        let registry = RateLimiterRegistry::default();
        let settings = ProviderSettings {
            sportmonks_api_key: Some("sm".into()),
            sportmonks_api_url: None,
            api_football_key: Some("af".into()),
            thesportsdb_api_key: Some("  ".into()),
            thesportsdb_live_sport: None,
        };
        let manager = ProviderManager::initialize(&settings, &registry).unwrap();
        assert_eq!(manager.provider_names(), vec!["SportMonks", "API-Football"]);
        assert_eq!(manager.primary_name(), Some("SportMonks"));
    }

    #[test]
    fn test_initialize_falls_back_to_free_tier() {
        let registry = RateLimiterRegistry::default();
        let manager = ProviderManager::initialize(&ProviderSettings::default(), &registry).unwrap();
        assert_eq!(manager.provider_names(), vec!["TheSportsDB"]);
        assert_eq!(manager.primary_name(), Some("TheSportsDB"));
    }
}
