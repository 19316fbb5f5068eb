//! Bounded in-memory aggregation over engagement events.
//!
//! The handlers scan at most `ANALYTICS_MAX_EVENTS` events from the document store and
//! hand them to the pure functions below; reports say whether the scan was truncated.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::models::EngagementEvent;

/// Event type counted as a completion in engagement rollups.
pub const CONTENT_COMPLETE: &str = "content_complete";

pub const MIN_FUNNEL_STEPS: usize = 2;
pub const MAX_FUNNEL_STEPS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Interval {
    #[default]
    Day,
    /// ISO weeks, starting on Monday.
    Week,
}

impl Interval {
    fn step(&self) -> Duration {
        match self {
            Interval::Day => Duration::days(1),
            Interval::Week => Duration::days(7),
        }
    }

    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Interval::Day => date,
            Interval::Week => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct TrendPoint {
    #[ts(type = "string")]
    pub bucket_start: NaiveDate,
    pub count: u64,
    pub unique_users: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct TrendSeries {
    pub event_type: String,
    pub total: u64,
    pub points: Vec<TrendPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct TrendReport {
    pub interval: Interval,
    #[ts(type = "string")]
    pub start: NaiveDate,
    #[ts(type = "string")]
    pub end: NaiveDate,
    pub total_events: u64,
    pub series: Vec<TrendSeries>,
    /// The event scan hit its limit; counts are a lower bound.
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct FunnelStep {
    pub event_type: String,
    pub users: u64,
    pub conversion_from_previous: f64,
    pub conversion_from_start: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct FunnelReport {
    pub window_days: u32,
    pub steps: Vec<FunnelStep>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq, Default)]
#[ts(export)]
pub struct UserEngagement {
    pub user_id: String,
    pub total_events: u64,
    pub events_by_type: BTreeMap<String, u64>,
    pub active_days: u32,
    pub longest_streak_days: u32,
    pub total_duration_seconds: u64,
    pub distinct_content: u64,
    pub completions: u64,
    #[ts(type = "string | null")]
    pub first_event_at: Option<DateTime<Utc>>,
    #[ts(type = "string | null")]
    pub last_event_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct UserEngagementReport {
    pub window_days: u32,
    pub engagement: UserEngagement,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct EngagementLeaderboard {
    pub window_days: u32,
    pub users: Vec<UserEngagement>,
    pub truncated: bool,
}

/// trend
///
/// Counts events per type per bucket over `[start, end]` (inclusive dates). Every series
/// has one point per bucket, zero-filled, so the UI can plot them directly. Events
/// outside the range are ignored. Series are ordered by event type.
pub fn trend(
    events: &[EngagementEvent],
    start: NaiveDate,
    end: NaiveDate,
    interval: Interval,
) -> Vec<TrendSeries> {
    let mut buckets: Vec<NaiveDate> = Vec::new();
    let mut cursor = interval.bucket_start(start);
    while cursor <= end {
        buckets.push(cursor);
        cursor += interval.step();
    }

    // (event_type, bucket) -> (count, users)
    let mut cells: HashMap<(&str, NaiveDate), (u64, HashSet<&str>)> = HashMap::new();
    let mut types: BTreeSet<&str> = BTreeSet::new();
    for e in events {
        let date = e.occurred_at.date_naive();
        if date < start || date > end {
            continue;
        }
        types.insert(e.event_type.as_str());
        let cell = cells
            .entry((e.event_type.as_str(), interval.bucket_start(date)))
            .or_default();
        cell.0 += 1;
        cell.1.insert(e.user_id.as_str());
    }

    types
        .into_iter()
        .map(|event_type| {
            let points: Vec<TrendPoint> = buckets
                .iter()
                .map(|bucket| {
                    let (count, users) = cells
                        .get(&(event_type, *bucket))
                        .map(|(c, u)| (*c, u.len() as u64))
                        .unwrap_or((0, 0));
                    TrendPoint {
                        bucket_start: *bucket,
                        count,
                        unique_users: users,
                    }
                })
                .collect();
            TrendSeries {
                event_type: event_type.to_string(),
                total: points.iter().map(|p| p.count).sum(),
                points,
            }
        })
        .collect()
}

/// funnel
///
/// Ordered conversion funnel. A user reaches step `i` when an event of type `steps[i]`
/// occurs at or after the moment they reached step `i - 1`; step 0 is reached by the
/// earliest event of type `steps[0]`. An event counts towards one step only, so a step
/// listed twice needs two events. Conversions are 0.0 when the denominator is 0.
pub fn funnel(events: &[EngagementEvent], steps: &[String]) -> Vec<FunnelStep> {
    let mut per_user: HashMap<&str, Vec<&EngagementEvent>> = HashMap::new();
    for e in events {
        if steps.contains(&e.event_type) {
            per_user.entry(e.user_id.as_str()).or_default().push(e);
        }
    }

    let mut reached = vec![0u64; steps.len()];
    for user_events in per_user.values_mut() {
        user_events.sort_by_key(|e| e.occurred_at);
        let mut since: Option<DateTime<Utc>> = None;
        let mut used = vec![false; user_events.len()];
        for (i, step) in steps.iter().enumerate() {
            // Each event satisfies at most one step, so a repeated step needs another event.
            let hit = user_events.iter().enumerate().position(|(j, e)| {
                !used[j] && &e.event_type == step && since.is_none_or(|t| e.occurred_at >= t)
            });
            match hit {
                Some(j) => {
                    used[j] = true;
                    reached[i] += 1;
                    since = Some(user_events[j].occurred_at);
                }
                None => break,
            }
        }
    }

    let start = reached.first().copied().unwrap_or(0);
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let previous = if i == 0 { start } else { reached[i - 1] };
            FunnelStep {
                event_type: step.clone(),
                users: reached[i],
                conversion_from_previous: ratio(reached[i], previous),
                conversion_from_start: ratio(reached[i], start),
            }
        })
        .collect()
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// user_rollup
///
/// Per-user engagement summary. Only events belonging to `user_id` are counted.
pub fn user_rollup(user_id: &str, events: &[EngagementEvent]) -> UserEngagement {
    let mine: Vec<&EngagementEvent> = events.iter().filter(|e| e.user_id == user_id).collect();
    rollup(user_id, &mine)
}

fn rollup(user_id: &str, events: &[&EngagementEvent]) -> UserEngagement {
    let mut summary = UserEngagement {
        user_id: user_id.to_string(),
        ..UserEngagement::default()
    };
    let mut days: BTreeSet<NaiveDate> = BTreeSet::new();
    let mut content: HashSet<&str> = HashSet::new();

    for e in events {
        summary.total_events += 1;
        *summary.events_by_type.entry(e.event_type.clone()).or_default() += 1;
        summary.total_duration_seconds += u64::from(e.duration_seconds.unwrap_or(0));
        if e.event_type == CONTENT_COMPLETE {
            summary.completions += 1;
        }
        if let Some(id) = e.content_id.as_deref() {
            content.insert(id);
        }
        days.insert(e.occurred_at.date_naive());
        summary.first_event_at = Some(match summary.first_event_at {
            Some(t) if t <= e.occurred_at => t,
            _ => e.occurred_at,
        });
        summary.last_event_at = Some(match summary.last_event_at {
            Some(t) if t >= e.occurred_at => t,
            _ => e.occurred_at,
        });
    }

    summary.active_days = days.len() as u32;
    summary.longest_streak_days = longest_streak(&days);
    summary.distinct_content = content.len() as u64;
    summary
}

/// Longest run of consecutive calendar days in a sorted set.
pub fn longest_streak(days: &BTreeSet<NaiveDate>) -> u32 {
    let mut best = 0;
    let mut current = 0;
    let mut previous: Option<NaiveDate> = None;
    for day in days {
        current = match previous {
            Some(p) if *day - p == Duration::days(1) => current + 1,
            _ => 1,
        };
        best = best.max(current);
        previous = Some(*day);
    }
    best
}

/// top_users
///
/// Rollups for every user present in `events`, most events first (ties by user id),
/// cut to `limit`.
pub fn top_users(events: &[EngagementEvent], limit: usize) -> Vec<UserEngagement> {
    let mut per_user: HashMap<&str, Vec<&EngagementEvent>> = HashMap::new();
    for e in events {
        per_user.entry(e.user_id.as_str()).or_default().push(e);
    }
    let mut rollups: Vec<UserEngagement> = per_user
        .into_iter()
        .map(|(user_id, evs)| rollup(user_id, &evs))
        .collect();
    rollups.sort_by(|a, b| {
        b.total_events
            .cmp(&a.total_events)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    rollups.truncate(limit);
    rollups
}

/// window
///
/// The inclusive date range covering the last `days` days up to `now`, and the instant
/// the event scan should start from.
pub fn window(now: DateTime<Utc>, days: u32) -> (NaiveDate, NaiveDate, DateTime<Utc>) {
    let end = now.date_naive();
    let start = end - Duration::days(i64::from(days.max(1)) - 1);
    let since = start
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
        .unwrap_or(now);
    (start, end, since)
}
