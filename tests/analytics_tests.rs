mod common;

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use wellness_admin::{
    analytics::{self, Interval},
    models::EngagementEvent,
};

use common::event;

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
}

fn with_content(mut e: EngagementEvent, content: &str, seconds: u32) -> EngagementEvent {
    e.content_id = Some(content.to_string());
    e.duration_seconds = Some(seconds);
    e
}

#[test]
fn test_week_buckets_start_on_monday() {
    // 2025-03-03 is a Monday.
    assert_eq!(Interval::Week.bucket_start(date(3)), date(3));
    assert_eq!(Interval::Week.bucket_start(date(9)), date(3));
    assert_eq!(Interval::Week.bucket_start(date(10)), date(10));
    assert_eq!(Interval::Day.bucket_start(date(9)), date(9));
}

#[test]
fn test_daily_trend_is_zero_filled() {
    let events = vec![
        event("e1", "u1", "app_open", at(3, 10)),
        event("e2", "u1", "app_open", at(3, 12)),
        event("e3", "u2", "app_open", at(5, 9)),
        event("e4", "u2", "content_view", at(4, 9)),
        event(
            "e5",
            "u1",
            "app_open",
            Utc.with_ymd_and_hms(2025, 2, 20, 9, 0, 0).unwrap(),
        ),
    ];

    let series = analytics::trend(&events, date(3), date(5), Interval::Day);

    assert_eq!(series.len(), 2);
    assert_eq!(series[0].event_type, "app_open");
    assert_eq!(series[0].total, 3);
    let counts: Vec<u64> = series[0].points.iter().map(|p| p.count).collect();
    assert_eq!(counts, vec![2, 0, 1]);
    let uniques: Vec<u64> = series[0].points.iter().map(|p| p.unique_users).collect();
    assert_eq!(uniques, vec![1, 0, 1]);

    assert_eq!(series[1].event_type, "content_view");
    let counts: Vec<u64> = series[1].points.iter().map(|p| p.count).collect();
    assert_eq!(counts, vec![0, 1, 0]);
    assert_eq!(series[1].points[0].bucket_start, date(3));
}

#[test]
fn test_weekly_trend_ignores_events_before_start() {
    let events = vec![
        event("e1", "u1", "app_open", at(4, 10)),
        event("e2", "u1", "app_open", at(6, 10)),
        event("e3", "u2", "app_open", at(11, 10)),
    ];

    let series = analytics::trend(&events, date(5), date(12), Interval::Week);

    assert_eq!(series.len(), 1);
    let buckets: Vec<NaiveDate> = series[0].points.iter().map(|p| p.bucket_start).collect();
    assert_eq!(buckets, vec![date(3), date(10)]);
    let counts: Vec<u64> = series[0].points.iter().map(|p| p.count).collect();
    assert_eq!(counts, vec![1, 1]);
}

#[test]
fn test_trend_without_events() {
    assert!(analytics::trend(&[], date(1), date(7), Interval::Day).is_empty());
}

#[test]
fn test_ordered_funnel() {
    let steps: Vec<String> = ["app_open", "content_view", "content_complete"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let events = vec![
        // u1 completes the funnel.
        event("a1", "u1", "app_open", at(3, 8)),
        event("a2", "u1", "content_view", at(3, 9)),
        event("a3", "u1", "content_complete", at(3, 10)),
        // u2 viewed before opening the app: only the first step counts.
        event("b1", "u2", "content_view", at(3, 8)),
        event("b2", "u2", "app_open", at(3, 9)),
        // u3 skipped the middle step.
        event("c1", "u3", "app_open", at(4, 8)),
        event("c2", "u3", "content_complete", at(4, 9)),
        // u4 never entered the funnel.
        event("d1", "u4", "content_view", at(4, 8)),
    ];

    let report = analytics::funnel(&events, &steps);

    let users: Vec<u64> = report.iter().map(|s| s.users).collect();
    assert_eq!(users, vec![3, 1, 1]);
    assert_eq!(report[0].conversion_from_previous, 1.0);
    assert!((report[1].conversion_from_previous - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(report[2].conversion_from_previous, 1.0);
    assert!((report[2].conversion_from_start - 1.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_repeated_funnel_steps_need_separate_events() {
    let steps: Vec<String> = ["content_view", "content_view", "content_complete"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let events = vec![
        // One view cannot count twice.
        event("a1", "u1", "content_view", at(5, 8)),
        event("a2", "u1", "content_complete", at(5, 9)),
        // Two views, then a completion.
        event("b1", "u2", "content_view", at(5, 8)),
        event("b2", "u2", "content_view", at(5, 8)),
        event("b3", "u2", "content_complete", at(5, 10)),
    ];

    let report = analytics::funnel(&events, &steps);

    let users: Vec<u64> = report.iter().map(|s| s.users).collect();
    assert_eq!(users, vec![2, 1, 1]);
    assert_eq!(report[1].conversion_from_previous, 0.5);
}

#[test]
fn test_funnel_without_events_has_zero_conversion() {
    let steps = vec!["app_open".to_string(), "subscription_start".to_string()];
    let report = analytics::funnel(&[], &steps);

    assert_eq!(report.len(), 2);
    assert!(report.iter().all(|s| s.users == 0));
    assert!(report.iter().all(|s| s.conversion_from_start == 0.0));
}

#[test]
fn test_user_rollup() {
    let events = vec![
        event("e1", "u1", "app_open", at(1, 8)),
        with_content(event("e2", "u1", "content_view", at(1, 9)), "c1", 300),
        with_content(event("e3", "u1", "content_complete", at(2, 9)), "c1", 600),
        with_content(event("e4", "u1", "content_view", at(4, 9)), "c2", 0),
        event("x1", "u2", "app_open", at(2, 9)),
    ];

    let summary = analytics::user_rollup("u1", &events);

    assert_eq!(summary.user_id, "u1");
    assert_eq!(summary.total_events, 4);
    assert_eq!(summary.events_by_type.get("content_view"), Some(&2));
    assert_eq!(summary.events_by_type.get("app_open"), Some(&1));
    assert_eq!(summary.active_days, 3);
    assert_eq!(summary.longest_streak_days, 2);
    assert_eq!(summary.total_duration_seconds, 900);
    assert_eq!(summary.distinct_content, 2);
    assert_eq!(summary.completions, 1);
    assert_eq!(summary.first_event_at, Some(at(1, 8)));
    assert_eq!(summary.last_event_at, Some(at(4, 9)));
}

#[test]
fn test_rollup_of_inactive_user() {
    let summary = analytics::user_rollup("ghost", &[event("e1", "u1", "app_open", at(1, 8))]);
    assert_eq!(summary.total_events, 0);
    assert_eq!(summary.longest_streak_days, 0);
    assert_eq!(summary.first_event_at, None);
}

#[test]
fn test_longest_streak() {
    let days: BTreeSet<NaiveDate> = [1, 2, 3, 5, 6, 9].into_iter().map(date).collect();
    assert_eq!(analytics::longest_streak(&days), 3);
    assert_eq!(analytics::longest_streak(&BTreeSet::new()), 0);
}

#[test]
fn test_top_users_ordering_and_limit() {
    let events = vec![
        event("1", "u2", "app_open", at(1, 8)),
        event("2", "u2", "app_open", at(2, 8)),
        event("3", "u2", "app_open", at(3, 8)),
        event("4", "u1", "app_open", at(1, 8)),
        event("5", "u1", "content_view", at(1, 9)),
        event("6", "u1", "content_view", at(2, 9)),
        event("7", "u3", "app_open", at(1, 8)),
    ];

    let top = analytics::top_users(&events, 2);

    let ids: Vec<&str> = top.iter().map(|u| u.user_id.as_str()).collect();
    assert_eq!(ids, vec!["u1", "u2"]);
    assert_eq!(top[0].total_events, 3);
}

#[test]
fn test_window() {
    let now = at(10, 15);
    let (start, end, since) = analytics::window(now, 7);
    assert_eq!(start, date(4));
    assert_eq!(end, date(10));
    assert_eq!(since, at(4, 0));

    let (start, end, _) = analytics::window(now, 0);
    assert_eq!(start, end);
}
