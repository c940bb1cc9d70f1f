use async_trait::async_trait;

use super::error::ProviderResult;
use super::models::{
    League, Match, MatchFilters, PaginatedResponse, Pagination, RateLimitInfo, Sport,
};

/// Trait that every live-score provider must implement.
///
/// Implementations map one upstream API into [`Match`] and return errors
/// rather than swallowing them; fallback is the manager's job.
#[async_trait]
pub trait ScoreProvider: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    async fn get_live_matches(
        &self,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> ProviderResult<PaginatedResponse<Match>>;

    async fn get_scheduled_matches(
        &self,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> ProviderResult<PaginatedResponse<Match>>;

    async fn get_finished_matches(
        &self,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> ProviderResult<PaginatedResponse<Match>>;

    /// `Ok(None)` when the provider has no match with this ID.
    async fn get_match_by_id(&self, external_id: &str) -> ProviderResult<Option<Match>>;

    async fn search_matches(
        &self,
        query: &str,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> ProviderResult<PaginatedResponse<Match>>;

    async fn get_sports(&self) -> ProviderResult<Vec<Sport>>;

    async fn get_leagues(&self, sport: &str) -> ProviderResult<Vec<League>>;

    /// Cheap liveness check. Any error counts as unhealthy.
    async fn check_health(&self) -> bool {
        self.get_sports().await.is_ok()
    }

    fn rate_limit_info(&self) -> RateLimitInfo;
}
