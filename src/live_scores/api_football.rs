//! API-Football (api-sports.io v3) adapter.
//!
//! Docs: <https://www.api-football.com/documentation-v3>
//!
//! Football only. Live fixtures come from `/fixtures?live=all`; scheduled
//! and finished fixtures are fetched one day at a time with a status filter,
//! since the date-range form of `/fixtures` requires a league and season.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;

use super::error::{build_url, ProviderError, ProviderResult};
use super::http::HttpFetcher;
use super::models::{
    League, Match, MatchEvent, MatchEventKind, MatchFilters, MatchStatistics, MatchStatus,
    PaginatedResponse, Pagination, RateLimitInfo, Sport, StatPair, TeamSide,
};
use super::provider::ScoreProvider;
use super::rate_limiter::RateLimiterRegistry;
use super::{date_window, days_in_window, matches_query, paginate, WindowKind};

const BASE_URL: &str = "https://v3.football.api-sports.io";
const API_HOST: &str = "v3.football.api-sports.io";
const PROVIDER_NAME: &str = "API-Football";
const REQUESTS_PER_WINDOW: u32 = 30;
const RATE_WINDOW: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const SCHEDULED_STATUSES: &str = "TBD-NS";
const FINISHED_STATUSES: &str = "FT-AET-PEN";

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default = "Vec::new")]
    response: Vec<T>,
    /// `[]` on success, an object keyed by field on failure
    #[serde(default)]
    errors: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FixtureItem {
    fixture: FixtureInfo,
    league: LeagueInfo,
    teams: Teams,
    goals: Goals,
    #[serde(default)]
    events: Vec<EventItem>,
    #[serde(default)]
    statistics: Vec<TeamStatistics>,
}

#[derive(Debug, Clone, Deserialize)]
struct FixtureInfo {
    id: u64,
    date: String,
    #[serde(default)]
    venue: Option<Venue>,
    status: FixtureStatus,
}

#[derive(Debug, Clone, Deserialize)]
struct Venue {
    name: Option<String>,
    city: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FixtureStatus {
    short: String,
    elapsed: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct LeagueInfo {
    name: String,
    country: Option<String>,
    logo: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Teams {
    home: TeamInfo,
    away: TeamInfo,
}

#[derive(Debug, Clone, Deserialize)]
struct TeamInfo {
    id: Option<i64>,
    name: String,
    logo: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Goals {
    home: Option<i64>,
    away: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct EventItem {
    time: EventTime,
    team: TeamRef,
    #[serde(default)]
    player: Option<NamedRef>,
    #[serde(rename = "type")]
    kind: String,
    detail: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EventTime {
    elapsed: Option<i64>,
    extra: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct TeamRef {
    id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct NamedRef {
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TeamStatistics {
    team: TeamRef,
    statistics: Vec<StatEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct StatEntry {
    #[serde(rename = "type")]
    kind: String,
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct LeagueItem {
    league: LeagueRef,
    country: Option<CountryRef>,
}

#[derive(Debug, Deserialize)]
struct LeagueRef {
    id: i64,
    name: String,
    logo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CountryRef {
    name: Option<String>,
}

// ── Adapter ──────────────────────────────────────────────────────────────────

pub struct ApiFootball {
    fetcher: HttpFetcher,
    api_key: String,
    base_url: String,
}

impl ApiFootball {
    pub fn new(
        api_key: &str,
        base_url: Option<&str>,
        limiters: &RateLimiterRegistry,
    ) -> ProviderResult<Self> {
        let limiter = limiters.get_or_create(PROVIDER_NAME, REQUESTS_PER_WINDOW, RATE_WINDOW);
        Ok(ApiFootball {
            fetcher: HttpFetcher::new(PROVIDER_NAME, limiter, REQUEST_TIMEOUT)?,
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or(BASE_URL).to_string(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> ProviderResult<T> {
        let url = build_url(PROVIDER_NAME, &self.base_url, path, params)?;
        self.fetcher
            .fetch_json(
                url,
                &[("x-rapidapi-key", self.api_key.as_str()), ("x-rapidapi-host", API_HOST)],
            )
            .await
    }

    async fn fetch_fixtures(&self, params: &[(&str, String)]) -> ProviderResult<Vec<Match>> {
        let body: ApiResponse<FixtureItem> = self.get("/fixtures", params).await?;
        check_errors(&body.errors)?;
        Ok(body.response.iter().filter_map(transform_fixture).collect())
    }

    async fn fetch_days(&self, days: &[NaiveDate], statuses: Option<&str>) -> ProviderResult<Vec<Match>> {
        let mut all = Vec::new();
        for day in days {
            let mut params = vec![("date", day.format("%Y-%m-%d").to_string())];
            if let Some(s) = statuses {
                params.push(("status", s.to_string()));
            }
            all.extend(self.fetch_fixtures(&params).await?);
        }
        Ok(all)
    }

    async fn fetch_window(
        &self,
        kind: WindowKind,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> ProviderResult<PaginatedResponse<Match>> {
        let (from, to) = date_window(kind, filters, Utc::now().date_naive());
        let statuses = match kind {
            WindowKind::Scheduled => SCHEDULED_STATUSES,
            WindowKind::Finished => FINISHED_STATUSES,
        };
        let mut matches = self.fetch_days(&days_in_window(from, to), Some(statuses)).await?;
        match kind {
            WindowKind::Scheduled => matches.sort_by_key(|m| m.scheduled_at),
            WindowKind::Finished => matches.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at)),
        }
        Ok(paginate(filters.apply(matches), pagination))
    }
}

#[async_trait]
impl ScoreProvider for ApiFootball {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn get_live_matches(
        &self,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> ProviderResult<PaginatedResponse<Match>> {
        let matches = self.fetch_fixtures(&[("live", "all".to_string())]).await?;
        debug!("{} live fixtures from {}", matches.len(), PROVIDER_NAME);
        Ok(paginate(filters.apply(matches), pagination))
    }

    async fn get_scheduled_matches(
        &self,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> ProviderResult<PaginatedResponse<Match>> {
        self.fetch_window(WindowKind::Scheduled, filters, pagination).await
    }

    async fn get_finished_matches(
        &self,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> ProviderResult<PaginatedResponse<Match>> {
        self.fetch_window(WindowKind::Finished, filters, pagination).await
    }

    async fn get_match_by_id(&self, external_id: &str) -> ProviderResult<Option<Match>> {
        let matches = self.fetch_fixtures(&[("id", external_id.to_string())]).await?;
        Ok(matches.into_iter().next())
    }

    async fn search_matches(
        &self,
        query: &str,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> ProviderResult<PaginatedResponse<Match>> {
        let (from, to) = date_window(WindowKind::Scheduled, filters, Utc::now().date_naive());
        let matches: Vec<Match> = self
            .fetch_days(&days_in_window(from, to), None)
            .await?
            .into_iter()
            .filter(|m| matches_query(m, query))
            .collect();
        Ok(paginate(filters.apply(matches), pagination))
    }

    async fn get_sports(&self) -> ProviderResult<Vec<Sport>> {
        Ok(vec![Sport {
            id: "football".to_string(),
            name: "Football".to_string(),
        }])
    }

    async fn get_leagues(&self, sport: &str) -> ProviderResult<Vec<League>> {
        if !is_football(sport) {
            return Ok(vec![]);
        }
        let body: ApiResponse<LeagueItem> = self
            .get("/leagues", &[("current", "true".to_string())])
            .await?;
        check_errors(&body.errors)?;
        Ok(body
            .response
            .into_iter()
            .map(|item| League {
                id: item.league.id.to_string(),
                name: item.league.name,
                country: item.country.and_then(|c| c.name),
                logo: item.league.logo,
            })
            .collect())
    }

    /// `/status` costs no quota and fails on a bad key.
    async fn check_health(&self) -> bool {
        match self.get::<serde_json::Value>("/status", &[]).await {
            Ok(body) => check_errors(&body["errors"]).is_ok(),
            Err(e) => {
                debug!("{} health check failed: {}", PROVIDER_NAME, e);
                false
            }
        }
    }

    fn rate_limit_info(&self) -> RateLimitInfo {
        self.fetcher.limiter().info()
    }
}

// ── Transform ────────────────────────────────────────────────────────────────

fn is_football(sport: &str) -> bool {
    matches!(sport.to_lowercase().as_str(), "football" | "soccer")
}

/// API-Football reports auth and quota problems with HTTP 200 and a
/// non-empty `errors` field.
fn check_errors(errors: &serde_json::Value) -> ProviderResult<()> {
    let has_errors = match errors {
        serde_json::Value::Null => false,
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
        _ => true,
    };
    if has_errors {
        return Err(ProviderError::Decode {
            provider: PROVIDER_NAME.to_string(),
            message: format!("upstream reported errors: {}", errors),
        });
    }
    Ok(())
}

/// Map API-Football short status codes. Unknown codes are `Scheduled`.
pub(crate) fn map_status(short: &str) -> MatchStatus {
    match short {
        "TBD" | "NS" => MatchStatus::Scheduled,
        "1H" | "HT" | "2H" | "ET" | "BT" | "P" | "SUSP" | "INT" | "LIVE" => MatchStatus::Live,
        "FT" | "AET" | "PEN" | "AWD" | "WO" => MatchStatus::Finished,
        "PST" => MatchStatus::Postponed,
        "CANC" | "ABD" => MatchStatus::Cancelled,
        _ => MatchStatus::Scheduled,
    }
}

fn non_negative(v: Option<i64>) -> u32 {
    v.map(|n| n.clamp(0, u32::MAX as i64) as u32).unwrap_or(0)
}

pub(crate) fn transform_fixture(item: &FixtureItem) -> Option<Match> {
    let scheduled_at = DateTime::parse_from_rfc3339(&item.fixture.date)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| debug!("Skipping fixture {}: bad date: {}", item.fixture.id, e))
        .ok()?;
    let status = map_status(&item.fixture.status.short);
    let live = status == MatchStatus::Live;

    let venue = item.fixture.venue.as_ref().and_then(|v| match (&v.name, &v.city) {
        (Some(name), Some(city)) => Some(format!("{}, {}", name, city)),
        (Some(name), None) => Some(name.clone()),
        _ => None,
    });

    let statistics = transform_statistics(item);

    Some(Match {
        external_id: item.fixture.id.to_string(),
        sport: "football".to_string(),
        league: item.league.name.clone(),
        league_country: item.league.country.clone(),
        league_logo: item.league.logo.clone(),
        home_team: item.teams.home.name.clone(),
        away_team: item.teams.away.name.clone(),
        home_team_logo: item.teams.home.logo.clone(),
        away_team_logo: item.teams.away.logo.clone(),
        home_score: non_negative(item.goals.home),
        away_score: non_negative(item.goals.away),
        status,
        scheduled_at,
        venue,
        minute: if live {
            item.fixture.status.elapsed.map(|m| non_negative(Some(m)))
        } else {
            None
        },
        period: live.then(|| item.fixture.status.short.clone()),
        odds: None,
        statistics: (!statistics.is_empty()).then_some(statistics),
        events: item.events.iter().filter_map(|e| transform_event(e, &item.teams)).collect(),
    })
}

fn transform_event(ev: &EventItem, teams: &Teams) -> Option<MatchEvent> {
    let team = match ev.team.id {
        Some(id) if Some(id) == teams.home.id => TeamSide::Home,
        Some(id) if Some(id) == teams.away.id => TeamSide::Away,
        _ => return None,
    };
    let detail = ev.detail.as_deref().unwrap_or("");
    let kind = match (ev.kind.as_str(), detail) {
        ("Goal", "Own Goal") => MatchEventKind::OwnGoal,
        ("Goal", "Penalty") => MatchEventKind::Penalty,
        ("Goal", "Missed Penalty") => MatchEventKind::MissedPenalty,
        ("Goal", _) => MatchEventKind::Goal,
        ("Card", "Yellow Card") => MatchEventKind::YellowCard,
        ("Card", _) => MatchEventKind::RedCard,
        ("subst", _) => MatchEventKind::Substitution,
        ("Var", _) => MatchEventKind::Var,
        _ => MatchEventKind::Other,
    };
    let minute = ev
        .time
        .elapsed
        .map(|m| non_negative(Some(m + ev.time.extra.unwrap_or(0))));

    Some(MatchEvent {
        kind,
        team,
        minute,
        player: ev.player.as_ref().and_then(|p| p.name.clone()),
        description: ev.detail.clone(),
    })
}

/// Parse `55%`, `"12"`, `12` or `null`.
fn stat_value(v: &serde_json::Value) -> Option<u32> {
    match v {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as u32),
        serde_json::Value::String(s) => s.trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

fn transform_statistics(item: &FixtureItem) -> MatchStatistics {
    let by_team = |team_id: Option<i64>, fallback: usize| {
        item.statistics
            .iter()
            .find(|s| s.team.id.is_some() && s.team.id == team_id)
            .or_else(|| item.statistics.get(fallback))
    };
    let (Some(home), Some(away)) = (by_team(item.teams.home.id, 0), by_team(item.teams.away.id, 1))
    else {
        return MatchStatistics::default();
    };

    let pair = |kind: &str| {
        let find = |side: &TeamStatistics| {
            side.statistics
                .iter()
                .find(|s| s.kind == kind)
                .and_then(|s| stat_value(&s.value))
        };
        match (find(home), find(away)) {
            (None, None) => None,
            (h, a) => Some(StatPair {
                home: h.unwrap_or(0),
                away: a.unwrap_or(0),
            }),
        }
    };

    MatchStatistics {
        possession: pair("Ball Possession"),
        shots: pair("Total Shots"),
        shots_on_target: pair("Shots on Goal"),
        corners: pair("Corner Kicks"),
        fouls: pair("Fouls"),
        yellow_cards: pair("Yellow Cards"),
        red_cards: pair("Red Cards"),
    }
}
