//! Shared fixtures for provider tests.

use axum::Router;
use chrono::{TimeZone, Utc};

use super::models::{Match, MatchStatus};

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn sample_match(id: &str, home: &str, away: &str, league: &str, status: MatchStatus) -> Match {
    Match {
        external_id: id.into(),
        sport: "football".into(),
        league: league.into(),
        league_country: None,
        league_logo: None,
        home_team: home.into(),
        away_team: away.into(),
        home_team_logo: None,
        away_team_logo: None,
        home_score: 0,
        away_score: 0,
        status,
        scheduled_at: Utc.with_ymd_and_hms(2024, 3, 2, 15, 0, 0).unwrap(),
        venue: None,
        minute: None,
        period: None,
        odds: None,
        statistics: None,
        events: vec![],
    }
}
