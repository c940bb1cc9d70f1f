use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::live_scores::{
    MatchFilters, MatchStatus, Pagination, ProviderHealth, ProviderManager, DEFAULT_PAGE_LIMIT,
};

/// Build the Axum router for the JSON API.
pub fn router(manager: Arc<ProviderManager>) -> Router {
    Router::new()
        .route("/api/matches/live", get(live_handler))
        .route("/api/matches/scheduled", get(scheduled_handler))
        .route("/api/matches/finished", get(finished_handler))
        .route("/api/matches/search", get(search_handler))
        .route("/api/matches/:id", get(match_handler))
        .route("/api/sports", get(sports_handler))
        .route("/api/sports/:sport/leagues", get(leagues_handler))
        .route("/api/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(manager)
}

/// Query string shared by the match-list endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchQuery {
    pub q: Option<String>,
    pub league: Option<String>,
    pub team: Option<String>,
    pub status: Option<MatchStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl MatchQuery {
    fn filters(&self) -> MatchFilters {
        MatchFilters {
            league: self.league.clone(),
            team: self.team.clone(),
            status: self.status,
            date_from: self.date_from,
            date_to: self.date_to,
        }
    }

    fn pagination(&self) -> Pagination {
        Pagination::new(
            self.page.unwrap_or(1),
            self.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    primary: Option<String>,
    providers: Vec<ProviderHealth>,
}

/// GET /api/matches/live
async fn live_handler(
    State(manager): State<Arc<ProviderManager>>,
    Query(query): Query<MatchQuery>,
) -> impl IntoResponse {
    Json(
        manager
            .get_live_matches(&query.filters(), query.pagination())
            .await,
    )
}

/// GET /api/matches/scheduled?dateFrom=2024-03-01&dateTo=2024-03-03
async fn scheduled_handler(
    State(manager): State<Arc<ProviderManager>>,
    Query(query): Query<MatchQuery>,
) -> impl IntoResponse {
    Json(
        manager
            .get_scheduled_matches(&query.filters(), query.pagination())
            .await,
    )
}

/// GET /api/matches/finished
async fn finished_handler(
    State(manager): State<Arc<ProviderManager>>,
    Query(query): Query<MatchQuery>,
) -> impl IntoResponse {
    Json(
        manager
            .get_finished_matches(&query.filters(), query.pagination())
            .await,
    )
}

/// GET /api/matches/search?q=arsenal
async fn search_handler(
    State(manager): State<Arc<ProviderManager>>,
    Query(query): Query<MatchQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let q = query.q.as_deref().map(str::trim).unwrap_or_default();
    if q.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query parameter 'q' is required".into()));
    }
    let page = manager
        .search_matches(q, &query.filters(), query.pagination())
        .await;
    Ok(Json(page))
}

/// GET /api/matches/:id
async fn match_handler(
    State(manager): State<Arc<ProviderManager>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    manager
        .get_match_by_id(&id)
        .await
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("match {} not found", id)))
}

async fn sports_handler(State(manager): State<Arc<ProviderManager>>) -> impl IntoResponse {
    Json(manager.get_sports().await)
}

async fn leagues_handler(
    State(manager): State<Arc<ProviderManager>>,
    Path(sport): Path<String>,
) -> impl IntoResponse {
    Json(manager.get_leagues(&sport).await)
}

/// GET /api/health
async fn health_handler(State(manager): State<Arc<ProviderManager>>) -> impl IntoResponse {
    Json(HealthResponse {
        primary: manager.primary_name().map(str::to_string),
        providers: manager.get_health_status().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live_scores::manager::tests::FakeProvider;
    use crate::live_scores::test_support::{sample_match, spawn_stub};
    use serde_json::Value;

    async fn serve(manager: ProviderManager) -> String {
        spawn_stub(router(Arc::new(manager))).await
    }

    fn manager_with_matches() -> ProviderManager {
        let mut manager = ProviderManager::new();
        manager.add_provider(Arc::new(FakeProvider::failing("down")), true);
        manager.add_provider(
            Arc::new(FakeProvider::ok(
                "up",
                vec![
                    sample_match("1", "Arsenal", "Chelsea", "Premier League", MatchStatus::Live),
                    sample_match("2", "Inter", "Milan", "Serie A", MatchStatus::Live),
                ],
            )),
            false,
        );
        manager
    }

    #[tokio::test]
    async fn test_live_matches_with_filters() {
        let base = serve(manager_with_matches()).await;
        let body: Value = reqwest::get(format!("{}/api/matches/live?league=serie&limit=5", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["homeTeam"], "Inter");
        assert_eq!(body["pagination"]["limit"], 5);
        assert_eq!(body["pagination"]["hasMore"], false);
    }

    #[tokio::test]
    async fn test_outage_returns_empty_page() {
        let mut manager = ProviderManager::new();
        manager.add_provider(Arc::new(FakeProvider::failing("down")), false);
        let base = serve(manager).await;

        let resp = reqwest::get(format!("{}/api/matches/finished", base))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["data"], serde_json::json!([]));
        assert_eq!(body["pagination"]["page"], 1);
        assert_eq!(body["pagination"]["limit"], 20);
        assert_eq!(body["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn test_match_by_id_and_not_found() {
        let base = serve(manager_with_matches()).await;

        let found: Value = reqwest::get(format!("{}/api/matches/1", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(found["awayTeam"], "Chelsea");

        let missing = reqwest::get(format!("{}/api/matches/999", base))
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let base = serve(manager_with_matches()).await;

        let blank = reqwest::get(format!("{}/api/matches/search?q=%20", base))
            .await
            .unwrap();
        assert_eq!(blank.status(), 400);

        let body: Value = reqwest::get(format!("{}/api/matches/search?q=milan", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["pagination"]["total"], 1);
    }

    #[tokio::test]
    async fn test_health_reports_primary() {
        let base = serve(manager_with_matches()).await;
        let body: Value = reqwest::get(format!("{}/api/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["primary"], "down");
        let providers = body["providers"].as_array().unwrap();
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0]["healthy"], false);
        assert_eq!(providers[1]["healthy"], true);
        assert_eq!(providers[1]["isPrimary"], false);
    }
}
