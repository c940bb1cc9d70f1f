pub mod api_football;
pub mod error;
pub mod http;
pub mod manager;
pub mod models;
pub mod provider;
pub mod rate_limiter;
pub mod sportmonks;
pub mod thesportsdb;

#[cfg(test)]
pub(crate) mod test_support;

pub use api_football::ApiFootball;
pub use error::{ProviderError, ProviderResult};
pub use manager::{ProviderManager, ProviderSettings};
pub use models::*;
pub use provider::ScoreProvider;
pub use rate_limiter::{RateLimiter, RateLimiterRegistry};
pub use sportmonks::SportMonks;
pub use thesportsdb::TheSportsDB;

use chrono::{Duration as ChronoDuration, NaiveDate};

/// Days fetched ahead for scheduled matches / behind for finished ones when
/// no date filter is given.
pub const DEFAULT_WINDOW_DAYS: i64 = 3;

/// Longest date range any adapter will walk upstream.
pub const MAX_WINDOW_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Scheduled,
    Finished,
}

impl MatchFilters {
    /// Apply the client-side filters (league, team, status).
    pub fn apply(&self, matches: Vec<Match>) -> Vec<Match> {
        let league = self.league.as_deref().map(str::to_lowercase);
        let team = self.team.as_deref().map(str::to_lowercase);

        matches
            .into_iter()
            .filter(|m| {
                league
                    .as_deref()
                    .map_or(true, |l| m.league.to_lowercase().contains(l))
            })
            .filter(|m| {
                team.as_deref().map_or(true, |t| {
                    m.home_team.to_lowercase().contains(t) || m.away_team.to_lowercase().contains(t)
                })
            })
            .filter(|m| self.status.map_or(true, |s| m.status == s))
            .collect()
    }
}

/// Slice an already-filtered result set into one page.
pub fn paginate<T>(items: Vec<T>, pagination: Pagination) -> PaginatedResponse<T> {
    let Pagination { page, limit } = Pagination::new(pagination.page, pagination.limit);
    let total = items.len();
    let limit_usize = limit as usize;
    let start = (page as usize - 1).saturating_mul(limit_usize);

    let data: Vec<T> = items.into_iter().skip(start).take(limit_usize).collect();

    PaginatedResponse {
        data,
        pagination: PaginationMeta {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit_usize),
            has_more: (page as usize).saturating_mul(limit_usize) < total,
        },
    }
}

/// Inclusive date range an adapter should fetch upstream.
///
/// Explicit filter dates win; missing ends default around `today`. The span
/// is capped at [`MAX_WINDOW_DAYS`] and a reversed range is swapped.
pub fn date_window(kind: WindowKind, filters: &MatchFilters, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let span = ChronoDuration::days(DEFAULT_WINDOW_DAYS);
    let (default_from, default_to) = match kind {
        WindowKind::Scheduled => (today, shift(today, span)),
        WindowKind::Finished => (shift(today, -span), today),
    };

    let (mut from, mut to) = match (filters.date_from, filters.date_to) {
        (Some(f), Some(t)) => (f, t),
        (Some(f), None) => (f, shift(f, span)),
        (None, Some(t)) => (shift(t, -span), t),
        (None, None) => (default_from, default_to),
    };
    if from > to {
        std::mem::swap(&mut from, &mut to);
    }
    let max_span = ChronoDuration::days(MAX_WINDOW_DAYS - 1);
    if to.signed_duration_since(from) > max_span {
        to = shift(from, max_span);
    }
    (from, to)
}

/// Move a date by `delta`, saturating at the representable range.
fn shift(date: NaiveDate, delta: ChronoDuration) -> NaiveDate {
    date.checked_add_signed(delta).unwrap_or(if delta < ChronoDuration::zero() {
        NaiveDate::MIN
    } else {
        NaiveDate::MAX
    })
}

/// Every day in an inclusive range.
pub fn days_in_window(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    from.iter_days().take_while(|d| *d <= to).collect()
}

/// Case-insensitive match of a free-text query against teams and league.
pub fn matches_query(m: &Match, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return true;
    }
    m.home_team.to_lowercase().contains(&q)
        || m.away_team.to_lowercase().contains(&q)
        || m.league.to_lowercase().contains(&q)
}

/// Read a score that may be a number, a numeric string or null.
/// Anything missing, unparsable or negative becomes 0.
pub fn parse_score_value(value: &serde_json::Value) -> u32 {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
        .map(|v| v.clamp(0, u32::MAX as i64) as u32)
        .unwrap_or(0)
}
