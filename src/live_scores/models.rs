use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A match normalized from any provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    /// Provider-specific ID, unique within that provider
    pub external_id: String,
    pub sport: String,
    pub league: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub league_country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub league_logo: Option<String>,
    pub home_team: String,
    pub away_team: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_team_logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_team_logo: Option<String>,
    pub home_score: u32,
    pub away_score: u32,
    pub status: MatchStatus,
    pub scheduled_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    /// Elapsed minute while the match is live
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minute: Option<u32>,
    /// Provider's period label, e.g. "1H", "HT"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub odds: Option<Odds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<MatchStatistics>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<MatchEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    Postponed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Live => "live",
            MatchStatus::Finished => "finished",
            MatchStatus::Postponed => "postponed",
            MatchStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decimal 1X2 odds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Odds {
    pub home: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draw: Option<f64>,
    pub away: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatPair {
    pub home: u32,
    pub away: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStatistics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub possession: Option<StatPair>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shots: Option<StatPair>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shots_on_target: Option<StatPair>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corners: Option<StatPair>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fouls: Option<StatPair>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yellow_cards: Option<StatPair>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub red_cards: Option<StatPair>,
}

impl MatchStatistics {
    pub fn is_empty(&self) -> bool {
        *self == MatchStatistics::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamSide {
    Home,
    Away,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchEventKind {
    Goal,
    OwnGoal,
    Penalty,
    MissedPenalty,
    YellowCard,
    RedCard,
    Substitution,
    Var,
    Other,
}

/// A single in-match event. Derived per request, never persisted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEvent {
    #[serde(rename = "type")]
    pub kind: MatchEventKind,
    pub team: TeamSide,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minute: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sport {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct League {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

/// Client-side filters applied after the upstream fetch.
///
/// `date_from` / `date_to` are the exception: they pick the upstream window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchFilters {
    /// Case-insensitive substring of the league name
    pub league: Option<String>,
    /// Case-insensitive substring of either team name
    pub team: Option<String>,
    pub status: Option<MatchStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    /// Normalizes page to at least 1 and clamps limit into `1..=MAX_PAGE_LIMIT`.
    pub fn new(page: u32, limit: u32) -> Self {
        Pagination {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub total_pages: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn empty(pagination: Pagination) -> Self {
        PaginatedResponse {
            data: Vec::new(),
            pagination: PaginationMeta {
                page: pagination.page,
                limit: pagination.limit,
                total: 0,
                total_pages: 0,
                has_more: false,
            },
        }
    }
}

/// Snapshot of a provider's rate limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub provider: String,
    pub max_requests: u32,
    pub window_ms: u64,
    pub remaining: u32,
    /// Milliseconds until the current window resets; absent when idle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_in_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub provider: String,
    pub healthy: bool,
    pub is_primary: bool,
    pub rate_limit: RateLimitInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&MatchStatus::Postponed).unwrap();
        assert_eq!(json, "\"postponed\"");
        let back: MatchStatus = serde_json::from_str("\"live\"").unwrap();
        assert_eq!(back, MatchStatus::Live);
    }

    #[test]
    fn test_pagination_normalizes() {
        assert_eq!(Pagination::new(0, 0), Pagination { page: 1, limit: 1 });
        assert_eq!(Pagination::new(3, 500).limit, MAX_PAGE_LIMIT);
    }

    #[test]
    fn test_empty_response_shape() {
        let empty: PaginatedResponse<Match> = PaginatedResponse::empty(Pagination::default());
        let json = serde_json::to_value(&empty).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "data": [],
                "pagination": {
                    "page": 1, "limit": 20, "total": 0, "totalPages": 0, "hasMore": false
                }
            })
        );
    }

    #[test]
    fn test_event_kind_serializes_as_type() {
        let ev = MatchEvent {
            kind: MatchEventKind::YellowCard,
            team: TeamSide::Away,
            minute: Some(33),
            player: None,
            description: None,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "yellow_card");
        assert_eq!(json["team"], "away");
    }
}
