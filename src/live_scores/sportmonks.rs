//! SportMonks Football API v3 adapter.
//!
//! Docs: <https://docs.sportmonks.com/football>
//!
//! Fixtures carry their teams as an unordered `participants` array and their
//! scores as a flat list of typed score records, so side attribution and
//! score selection both go through small helpers below.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::error::{build_url, push_segment, ProviderError, ProviderResult};
use super::http::HttpFetcher;
use super::models::{
    League, Match, MatchEvent, MatchEventKind, MatchFilters, MatchStatistics, MatchStatus, Odds,
    PaginatedResponse, Pagination, RateLimitInfo, Sport, StatPair, TeamSide,
};
use super::provider::ScoreProvider;
use super::rate_limiter::RateLimiterRegistry;
use super::{date_window, paginate, WindowKind};

pub const BASE_URL: &str = "https://api.sportmonks.com/v3/football";
const PROVIDER_NAME: &str = "SportMonks";
const REQUESTS_PER_WINDOW: u32 = 50;
const RATE_WINDOW: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const FIXTURE_INCLUDES: &str = "participants;scores;state;league.country;venue;events";
const DETAIL_INCLUDES: &str =
    "participants;scores;state;league.country;venue;events;statistics;odds";

/// Upstream page size for `/fixtures/between`.
const UPSTREAM_PER_PAGE: u32 = 50;
/// Upstream pages followed before giving up on the rest of a window.
const MAX_UPSTREAM_PAGES: u32 = 5;

/// Score type id for the running / full-time score.
const SCORE_TYPE_CURRENT: i64 = 1525;
/// Odds market id for the 1X2 fulltime result.
const MARKET_FULLTIME_RESULT: i64 = 1;

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    pagination: Option<UpstreamPagination>,
}

#[derive(Debug, Deserialize)]
struct SingleResponse<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct UpstreamPagination {
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Fixture {
    id: u64,
    starting_at: Option<String>,
    starting_at_timestamp: Option<i64>,
    state_id: Option<i64>,
    #[serde(default)]
    state: Option<State>,
    #[serde(default)]
    league: Option<LeagueData>,
    #[serde(default)]
    venue: Option<VenueData>,
    #[serde(default)]
    participants: Vec<Participant>,
    #[serde(default)]
    scores: Vec<Score>,
    #[serde(default)]
    events: Vec<Event>,
    #[serde(default)]
    statistics: Vec<Statistic>,
    #[serde(default)]
    odds: Vec<OddsEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct State {
    id: i64,
    short_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LeagueData {
    name: String,
    image_path: Option<String>,
    #[serde(default)]
    country: Option<CountryData>,
}

#[derive(Debug, Clone, Deserialize)]
struct CountryData {
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct VenueData {
    name: Option<String>,
    city_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Participant {
    id: i64,
    name: String,
    image_path: Option<String>,
    #[serde(default)]
    meta: Option<ParticipantMeta>,
}

#[derive(Debug, Clone, Deserialize)]
struct ParticipantMeta {
    location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Score {
    type_id: Option<i64>,
    participant_id: Option<i64>,
    score: ScoreValue,
}

#[derive(Debug, Clone, Deserialize)]
struct ScoreValue {
    goals: Option<i64>,
    participant: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Event {
    type_id: Option<i64>,
    participant_id: Option<i64>,
    minute: Option<i64>,
    extra_minute: Option<i64>,
    player_name: Option<String>,
    info: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Statistic {
    type_id: i64,
    participant_id: Option<i64>,
    location: Option<String>,
    data: StatisticData,
}

#[derive(Debug, Clone, Deserialize)]
struct StatisticData {
    value: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct OddsEntry {
    market_id: Option<i64>,
    label: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LeagueListItem {
    id: i64,
    name: String,
    image_path: Option<String>,
    #[serde(default)]
    country: Option<CountryData>,
}

// ── Adapter ──────────────────────────────────────────────────────────────────

pub struct SportMonks {
    fetcher: HttpFetcher,
    api_token: String,
    base_url: String,
}

impl SportMonks {
    pub fn new(
        api_token: &str,
        base_url: Option<&str>,
        limiters: &RateLimiterRegistry,
    ) -> ProviderResult<Self> {
        let limiter = limiters.get_or_create(PROVIDER_NAME, REQUESTS_PER_WINDOW, RATE_WINDOW);
        Ok(SportMonks {
            fetcher: HttpFetcher::new(PROVIDER_NAME, limiter, REQUEST_TIMEOUT)?,
            api_token: api_token.to_string(),
            base_url: base_url.unwrap_or(BASE_URL).to_string(),
        })
    }

    fn url(&self, path: &str, extra: &[(&str, String)]) -> ProviderResult<Url> {
        let mut params = vec![("api_token", self.api_token.clone())];
        params.extend(extra.iter().cloned());
        build_url(PROVIDER_NAME, &self.base_url, path, &params)
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&str, String)],
    ) -> ProviderResult<T> {
        self.fetcher.fetch_json(self.url(path, extra)?, &[]).await
    }

    /// Fixtures under `path`, optionally narrowed by one caller-supplied
    /// path segment.
    async fn fetch_list(&self, path: &str, segment: Option<&str>) -> ProviderResult<Vec<Match>> {
        let mut url = self.url(path, &[("include", FIXTURE_INCLUDES.to_string())])?;
        if let Some(segment) = segment {
            url = push_segment(PROVIDER_NAME, url, segment)?;
        }
        let body: ListResponse<Fixture> = self.fetcher.fetch_json(url, &[]).await?;
        Ok(body.data.iter().filter_map(transform_fixture).collect())
    }

    /// Walk `/fixtures/between` page by page, up to [`MAX_UPSTREAM_PAGES`].
    async fn fetch_between(&self, kind: WindowKind, filters: &MatchFilters) -> ProviderResult<Vec<Match>> {
        let (from, to) = date_window(kind, filters, Utc::now().date_naive());
        let path = format!(
            "/fixtures/between/{}/{}",
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let mut all = Vec::new();
        for page in 1..=MAX_UPSTREAM_PAGES {
            let params = [
                ("include", FIXTURE_INCLUDES.to_string()),
                ("per_page", UPSTREAM_PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            let body: ListResponse<Fixture> = self.get(&path, &params).await?;
            all.extend(body.data.iter().filter_map(transform_fixture));
            if !body.pagination.map_or(false, |p| p.has_more) {
                break;
            }
            if page == MAX_UPSTREAM_PAGES {
                debug!("{}: window {} truncated at {} pages", PROVIDER_NAME, path, page);
            }
        }
        Ok(all)
    }

    async fn fetch_window(
        &self,
        kind: WindowKind,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> ProviderResult<PaginatedResponse<Match>> {
        let mut matches: Vec<Match> = self
            .fetch_between(kind, filters)
            .await?
            .into_iter()
            .filter(|m| match kind {
                WindowKind::Scheduled => m.status == MatchStatus::Scheduled,
                WindowKind::Finished => m.status == MatchStatus::Finished,
            })
            .collect();
        match kind {
            WindowKind::Scheduled => matches.sort_by_key(|m| m.scheduled_at),
            WindowKind::Finished => matches.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at)),
        }
        Ok(paginate(filters.apply(matches), pagination))
    }
}

#[async_trait]
impl ScoreProvider for SportMonks {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn get_live_matches(
        &self,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> ProviderResult<PaginatedResponse<Match>> {
        let matches = self.fetch_list("/livescores/inplay", None).await?;
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
        let url = push_segment(
            PROVIDER_NAME,
            self.url("/fixtures", &[("include", DETAIL_INCLUDES.to_string())])?,
            external_id,
        )?;
        let body: SingleResponse<Fixture> = match self.fetcher.fetch_json(url, &[]).await {
            Ok(body) => body,
            Err(ProviderError::Http { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(body.data.as_ref().and_then(transform_fixture))
    }

    async fn search_matches(
        &self,
        query: &str,
        filters: &MatchFilters,
        pagination: Pagination,
    ) -> ProviderResult<PaginatedResponse<Match>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(PaginatedResponse::empty(pagination));
        }
        let matches = self.fetch_list("/fixtures/search", Some(query)).await?;
        Ok(paginate(filters.apply(matches), pagination))
    }

    async fn get_sports(&self) -> ProviderResult<Vec<Sport>> {
        Ok(vec![Sport {
            id: "football".to_string(),
            name: "Football".to_string(),
        }])
    }

    async fn get_leagues(&self, sport: &str) -> ProviderResult<Vec<League>> {
        if !matches!(sport.to_lowercase().as_str(), "football" | "soccer") {
            return Ok(vec![]);
        }
        let body: ListResponse<LeagueListItem> =
            self.get("/leagues", &[("include", "country".to_string())]).await?;
        Ok(body
            .data
            .into_iter()
            .map(|l| League {
                id: l.id.to_string(),
                name: l.name,
                country: l.country.and_then(|c| c.name),
                logo: l.image_path,
            })
            .collect())
    }

    async fn check_health(&self) -> bool {
        self.get::<serde_json::Value>("/leagues", &[("per_page", "1".to_string())])
            .await
            .is_ok()
    }

    fn rate_limit_info(&self) -> RateLimitInfo {
        self.fetcher.limiter().info()
    }
}

// ── Transform ────────────────────────────────────────────────────────────────

/// Map SportMonks fixture state ids. Unknown ids are `Scheduled`.
pub(crate) fn map_state(state_id: i64) -> MatchStatus {
    match state_id {
        // NS, TBA, DELAYED, AWAITING_UPDATES, PENDING
        1 | 13 | 16 | 19 | 26 => MatchStatus::Scheduled,
        // 1ST_HALF, HT, BREAK, ET, PENALTIES, INTERRUPTED, ET_BREAK, 2ND_HALF, PEN_BREAK
        2 | 3 | 4 | 6 | 9 | 18 | 21 | 22 | 25 => MatchStatus::Live,
        // FT, AET, FT_PEN, WO, AWARDED
        5 | 7 | 8 | 14 | 17 => MatchStatus::Finished,
        // POSTPONED, SUSPENDED
        10 | 11 => MatchStatus::Postponed,
        // CANCELLED, ABANDONED, DELETED
        12 | 15 | 20 => MatchStatus::Cancelled,
        _ => MatchStatus::Scheduled,
    }
}

/// Resolve (home, away): explicit `meta.location` first, array order second.
fn split_sides(participants: &[Participant]) -> (Option<&Participant>, Option<&Participant>) {
    let by_location = |loc: &str| {
        participants.iter().find(|p| {
            p.meta
                .as_ref()
                .and_then(|m| m.location.as_deref())
                .is_some_and(|l| l.eq_ignore_ascii_case(loc))
        })
    };
    let home = by_location("home").or_else(|| participants.first());
    let away = by_location("away").or_else(|| {
        participants
            .iter()
            .find(|p| home.map_or(true, |h| h.id != p.id))
    });
    (home, away)
}

/// The participant's CURRENT score, else its first score record, else 0.
fn pick_score(scores: &[Score], participant: Option<&Participant>, side: &str) -> u32 {
    let belongs = |s: &&Score| match (s.participant_id, participant) {
        (Some(pid), Some(p)) => pid == p.id,
        _ => s.score.participant.as_deref() == Some(side),
    };
    scores
        .iter()
        .filter(belongs)
        .find(|s| s.type_id == Some(SCORE_TYPE_CURRENT))
        .or_else(|| scores.iter().find(belongs))
        .and_then(|s| s.score.goals)
        .map(|g| g.clamp(0, u32::MAX as i64) as u32)
        .unwrap_or(0)
}

fn parse_kickoff(fixture: &Fixture) -> Option<DateTime<Utc>> {
    if let Some(ts) = fixture.starting_at_timestamp {
        return DateTime::from_timestamp(ts, 0);
    }
    let raw = fixture.starting_at.as_deref()?;
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|n| n.and_utc())
}

pub(crate) fn transform_fixture(fixture: &Fixture) -> Option<Match> {
    let Some(scheduled_at) = parse_kickoff(fixture) else {
        debug!("Skipping SportMonks fixture {}: no kickoff time", fixture.id);
        return None;
    };
    let (home, away) = split_sides(&fixture.participants);
    let (home, away) = (home?, away?);

    let state_id = fixture
        .state
        .as_ref()
        .map(|s| s.id)
        .or(fixture.state_id)
        .unwrap_or(0);
    let status = map_state(state_id);
    let live = status == MatchStatus::Live;

    let events: Vec<MatchEvent> = fixture
        .events
        .iter()
        .filter_map(|e| transform_event(e, home.id, away.id))
        .collect();

    let minute = if live {
        events.iter().filter_map(|e| e.minute).max()
    } else {
        None
    };

    let statistics = transform_statistics(&fixture.statistics, home.id, away.id);

    Some(Match {
        external_id: fixture.id.to_string(),
        sport: "football".to_string(),
        league: fixture
            .league
            .as_ref()
            .map(|l| l.name.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        league_country: fixture
            .league
            .as_ref()
            .and_then(|l| l.country.as_ref())
            .and_then(|c| c.name.clone()),
        league_logo: fixture.league.as_ref().and_then(|l| l.image_path.clone()),
        home_team: home.name.clone(),
        away_team: away.name.clone(),
        home_team_logo: home.image_path.clone(),
        away_team_logo: away.image_path.clone(),
        home_score: pick_score(&fixture.scores, Some(home), "home"),
        away_score: pick_score(&fixture.scores, Some(away), "away"),
        status,
        scheduled_at,
        venue: fixture.venue.as_ref().and_then(|v| match (&v.name, &v.city_name) {
            (Some(n), Some(c)) => Some(format!("{}, {}", n, c)),
            (Some(n), None) => Some(n.clone()),
            _ => None,
        }),
        minute,
        period: if live {
            fixture.state.as_ref().and_then(|s| s.short_name.clone())
        } else {
            None
        },
        odds: transform_odds(&fixture.odds),
        statistics: (!statistics.is_empty()).then_some(statistics),
        events,
    })
}

fn transform_event(ev: &Event, home_id: i64, away_id: i64) -> Option<MatchEvent> {
    let team = match ev.participant_id? {
        id if id == home_id => TeamSide::Home,
        id if id == away_id => TeamSide::Away,
        _ => return None,
    };
    let kind = match ev.type_id.unwrap_or(0) {
        14 => MatchEventKind::Goal,
        15 => MatchEventKind::OwnGoal,
        16 => MatchEventKind::Penalty,
        17 => MatchEventKind::MissedPenalty,
        18 => MatchEventKind::Substitution,
        19 => MatchEventKind::YellowCard,
        20 | 21 => MatchEventKind::RedCard,
        10 => MatchEventKind::Var,
        _ => MatchEventKind::Other,
    };
    Some(MatchEvent {
        kind,
        team,
        minute: ev
            .minute
            .map(|m| (m + ev.extra_minute.unwrap_or(0)).clamp(0, u32::MAX as i64) as u32),
        player: ev.player_name.clone(),
        description: ev.info.clone(),
    })
}

fn transform_statistics(stats: &[Statistic], home_id: i64, away_id: i64) -> MatchStatistics {
    let side_of = |s: &Statistic| match (s.participant_id, s.location.as_deref()) {
        (Some(id), _) if id == home_id => Some(TeamSide::Home),
        (Some(id), _) if id == away_id => Some(TeamSide::Away),
        (_, Some("home")) => Some(TeamSide::Home),
        (_, Some("away")) => Some(TeamSide::Away),
        _ => None,
    };
    let pair = |type_id: i64| {
        let mut home = None;
        let mut away = None;
        for s in stats.iter().filter(|s| s.type_id == type_id) {
            let v = s.data.value.map(|v| v.max(0.0).round() as u32);
            match side_of(s) {
                Some(TeamSide::Home) => home = home.or(v),
                Some(TeamSide::Away) => away = away.or(v),
                None => {}
            }
        }
        match (home, away) {
            (None, None) => None,
            (h, a) => Some(StatPair {
                home: h.unwrap_or(0),
                away: a.unwrap_or(0),
            }),
        }
    };
    MatchStatistics {
        possession: pair(45),
        shots: pair(42),
        shots_on_target: pair(86),
        corners: pair(34),
        fouls: pair(56),
        yellow_cards: pair(84),
        red_cards: pair(83),
    }
}

fn transform_odds(odds: &[OddsEntry]) -> Option<Odds> {
    let price = |label: &str| {
        odds.iter()
            .filter(|o| o.market_id == Some(MARKET_FULLTIME_RESULT))
            .find(|o| o.label.as_deref().is_some_and(|l| l.eq_ignore_ascii_case(label)))
            .and_then(|o| o.value.as_deref())
            .and_then(|v| v.parse::<f64>().ok())
    };
    Some(Odds {
        home: price("home").or_else(|| price("1"))?,
        draw: price("draw").or_else(|| price("x")),
        away: price("away").or_else(|| price("2"))?,
    })
}
