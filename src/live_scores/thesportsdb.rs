use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use tracing::debug;

use super::error::{build_url, ProviderResult};
use super::http::HttpFetcher;
use super::models::{
    League, Match, MatchFilters, MatchStatus, PaginatedResponse, Pagination, RateLimitInfo, Sport,
};
use super::provider::ScoreProvider;
use super::rate_limiter::RateLimiterRegistry;
use super::{date_window, days_in_window, paginate, parse_score_value, WindowKind};

const BASE_URL: &str = "https://www.thesportsdb.com/api/v1/json";
const PROVIDER_NAME: &str = "TheSportsDB";
/// TheSportsDB's public free-tier key
pub const FREE_API_KEY: &str = "3";
const REQUESTS_PER_WINDOW: u32 = 30;
const RATE_WINDOW: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Live-score provider backed by TheSportsDB v1 API.
/// Docs: <https://www.thesportsdb.com/api.php>
///
/// Multi-sport. The API key travels as a path segment and payload fields are
/// loosely typed (scores arrive as strings, numbers or null), so responses
/// are read as untyped JSON.
pub struct TheSportsDB {
    fetcher: HttpFetcher,
    api_key: String,
    /// Base URL for overriding in tests
    base_url: String,
    /// Sent as `s=` on livescore.php when set
    live_sport: Option<String>,
}

impl TheSportsDB {
    pub fn new(
        api_key: Option<&str>,
        base_url: Option<&str>,
        limiters: &RateLimiterRegistry,
    ) -> ProviderResult<Self> {
        let limiter = limiters.get_or_create(PROVIDER_NAME, REQUESTS_PER_WINDOW, RATE_WINDOW);
        let api_key = api_key.unwrap_or(FREE_API_KEY);
        let mut fetcher = HttpFetcher::new(PROVIDER_NAME, limiter, REQUEST_TIMEOUT)?;
        if api_key != FREE_API_KEY {
            fetcher = fetcher.with_secret(api_key);
        }
        Ok(TheSportsDB {
            fetcher,
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or(BASE_URL).to_string(),
            live_sport: None,
        })
    }

    /// Restrict live scores to one sport, e.g. `football` or `ice_hockey`.
    pub fn with_live_sport(mut self, sport: Option<&str>) -> Self {
        self.live_sport = sport.map(sport_param);
        self
    }

    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> ProviderResult<Value> {
        let path = format!("{}/{}", self.api_key, endpoint);
        let url = build_url(PROVIDER_NAME, &self.base_url, &path, params)?;
        self.fetcher.fetch_json(url, &[]).await
    }

    async fn fetch_window(
        &self,
        kind: WindowKind,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> ProviderResult<PaginatedResponse<Match>> {
        let (from, to) = date_window(kind, filters, Utc::now().date_naive());
        let wanted = match kind {
            WindowKind::Scheduled => MatchStatus::Scheduled,
            WindowKind::Finished => MatchStatus::Finished,
        };

        let mut matches = Vec::new();
        for day in days_in_window(from, to) {
            let raw = self
                .get("eventsday.php", &[("d", day.format("%Y-%m-%d").to_string())])
                .await?;
            matches.extend(
                parse_events(&raw, "events")
                    .into_iter()
                    .filter(|m| m.status == wanted),
            );
        }
        match kind {
            WindowKind::Scheduled => matches.sort_by_key(|m| m.scheduled_at),
            WindowKind::Finished => matches.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at)),
        }
        Ok(paginate(filters.apply(matches), pagination))
    }
}

#[async_trait]
impl ScoreProvider for TheSportsDB {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn get_live_matches(
        &self,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> ProviderResult<PaginatedResponse<Match>> {
        // Real live scores need a paid key; the free tier returns today's
        // events, which are filtered down to the in-progress ones.
        let params: Vec<(&str, String)> =
            self.live_sport.iter().map(|s| ("s", s.clone())).collect();
        let raw = self.get("livescore.php", &params).await?;
        let matches: Vec<Match> = parse_events(&raw, "events")
            .into_iter()
            .filter(|m| m.status == MatchStatus::Live)
            .collect();
        debug!("{} live events from {}", matches.len(), PROVIDER_NAME);
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
        let raw = self
            .get("lookupevent.php", &[("id", external_id.to_string())])
            .await?;
        Ok(parse_events(&raw, "events").into_iter().next())
    }

    async fn search_matches(
        &self,
        query: &str,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> ProviderResult<PaginatedResponse<Match>> {
        // searchevents.php expects underscores between words, e.g. Arsenal_vs_Chelsea
        let term = query.split_whitespace().collect::<Vec<_>>().join("_");
        if term.is_empty() {
            return Ok(PaginatedResponse::empty(pagination));
        }
        let raw = self.get("searchevents.php", &[("e", term)]).await?;
        Ok(paginate(filters.apply(parse_events(&raw, "event")), pagination))
    }

    async fn get_sports(&self) -> ProviderResult<Vec<Sport>> {
        let raw = self.get("all_sports.php", &[]).await?;
        Ok(raw["sports"]
            .as_array()
            .map(|sports| {
                sports
                    .iter()
                    .filter_map(|s| {
                        Some(Sport {
                            id: json_string(&s["idSport"])?,
                            name: s["strSport"].as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_leagues(&self, sport: &str) -> ProviderResult<Vec<League>> {
        let raw = self
            .get("search_all_leagues.php", &[("s", sport_param(sport))])
            .await?;
        // This endpoint lists leagues under a key named "countries".
        Ok(raw["countries"]
            .as_array()
            .map(|leagues| {
                leagues
                    .iter()
                    .filter_map(|l| {
                        Some(League {
                            id: json_string(&l["idLeague"])?,
                            name: l["strLeague"].as_str()?.to_string(),
                            country: non_empty(&l["strCountry"]),
                            logo: non_empty(&l["strBadge"]),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn rate_limit_info(&self) -> RateLimitInfo {
        self.fetcher.limiter().info()
    }
}

/// TheSportsDB sport names are title case ("Soccer", "Ice Hockey").
fn sport_param(sport: &str) -> String {
    let lower = sport.trim().to_lowercase();
    if lower == "football" {
        return "Soccer".to_string();
    }
    lower
        .split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn status_from_str(s: &str) -> MatchStatus {
    let s = s.trim().to_lowercase();
    if s.parse::<u32>().is_ok() || s.ends_with('\'') {
        // bare minute like "67" or "67'"
        return MatchStatus::Live;
    }
    match s.as_str() {
        "" | "ns" | "not started" | "tbd" | "time to be defined" => MatchStatus::Scheduled,
        "1h" | "2h" | "ht" | "halftime" | "half time" | "et" | "p" | "bt" | "live"
        | "in progress" | "first half" | "second half" => MatchStatus::Live,
        "ft" | "match finished" | "finished" | "aet" | "pen" | "aot" | "after over time" => {
            MatchStatus::Finished
        }
        "pst" | "postponed" => MatchStatus::Postponed,
        "canc" | "cancelled" | "canceled" | "abd" | "abandoned" => MatchStatus::Cancelled,
        _ => MatchStatus::Scheduled,
    }
}

fn json_string(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::to_string)
        .or_else(|| v.as_u64().map(|n| n.to_string()))
}

fn non_empty(v: &Value) -> Option<String> {
    v.as_str().filter(|s| !s.trim().is_empty()).map(str::to_string)
}

fn parse_kickoff(ev: &Value) -> Option<DateTime<Utc>> {
    if let Some(ts) = ev["strTimestamp"].as_str() {
        if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S") {
            return Some(naive.and_utc());
        }
    }
    let date = NaiveDate::parse_from_str(ev["dateEvent"].as_str()?, "%Y-%m-%d").ok()?;
    let time = ev["strTime"]
        .as_str()
        .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M:%S").ok())
        .unwrap_or(NaiveTime::MIN);
    Some(date.and_time(time).and_utc())
}

/// Read the events array under `key` ("events" for most endpoints, "event"
/// for search). A null array means "no results".
pub(crate) fn parse_events(raw: &Value, key: &str) -> Vec<Match> {
    let events = match raw[key].as_array() {
        Some(a) => a,
        None => return vec![],
    };
    events.iter().filter_map(transform_event).collect()
}

pub(crate) fn transform_event(ev: &Value) -> Option<Match> {
    let external_id = json_string(&ev["idEvent"])?;
    let home_team = ev["strHomeTeam"].as_str()?.to_string();
    let away_team = ev["strAwayTeam"].as_str()?.to_string();
    let scheduled_at = parse_kickoff(ev)?;

    let status = status_from_str(ev["strStatus"].as_str().unwrap_or(""));
    let progress = ev["strProgress"]
        .as_str()
        .or_else(|| ev["intProgress"].as_str())
        .map(|p| p.trim().trim_end_matches('\''));
    let minute = match status {
        MatchStatus::Live => progress.and_then(|p| p.parse::<u32>().ok()).or_else(|| {
            ev["strStatus"]
                .as_str()
                .and_then(|s| s.trim().trim_end_matches('\'').parse().ok())
        }),
        _ => None,
    };
    let period = match status {
        MatchStatus::Live => non_empty(&ev["strStatus"]),
        _ => None,
    };

    Some(Match {
        external_id,
        sport: ev["strSport"].as_str().unwrap_or("Soccer").to_lowercase(),
        league: ev["strLeague"].as_str().unwrap_or("Unknown").to_string(),
        league_country: non_empty(&ev["strCountry"]),
        league_logo: non_empty(&ev["strLeagueBadge"]),
        home_team,
        away_team,
        home_team_logo: non_empty(&ev["strHomeTeamBadge"]),
        away_team_logo: non_empty(&ev["strAwayTeamBadge"]),
        home_score: parse_score_value(&ev["intHomeScore"]),
        away_score: parse_score_value(&ev["intAwayScore"]),
        status,
        scheduled_at,
        venue: non_empty(&ev["strVenue"]),
        minute,
        period,
        odds: None,
        statistics: None,
        events: vec![],
    })
}
