//! Property tests for the event fold

use chrono::{Duration, Local, TimeZone};
use notemate_analytics::analytics::{apply_event, checkpoint_due, AggregateState, AnalyticsEvent};
use proptest::prelude::*;
use serde_json::json;

fn event_strategy() -> impl Strategy<Value = AnalyticsEvent> {
    let endpoint = prop::sample::select(vec!["/api/ai/text", "/api/ai/audio", "/api/notes"]);
    let kind = prop::sample::select(vec!["text", "audio", "ppt", "notes", ""]);
    let ip = prop::sample::select(vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);

    prop_oneof![
        (endpoint.clone(), ip).prop_map(|(endpoint, ip)| AnalyticsEvent::from_parts(
            "request_start",
            json!({"endpoint": endpoint, "method": "GET", "ip": ip})
        )),
        (endpoint.clone(), 0u32..20_000, kind.clone()).prop_map(|(endpoint, ms, kind)| {
            AnalyticsEvent::from_parts(
                "request_success",
                json!({"endpoint": endpoint, "responseTime": ms, "type": kind}),
            )
        }),
        (endpoint, 400u16..600).prop_map(|(endpoint, status)| AnalyticsEvent::from_parts(
            "request_error",
            json!({"endpoint": endpoint, "errorType": format!("HTTP_{}", status)})
        )),
        kind.prop_map(|kind| AnalyticsEvent::from_parts("print", json!({"type": kind}))),
        Just(AnalyticsEvent::from_parts("admin_login", json!({"username": "admin"}))),
    ]
}

proptest! {
    #[test]
    fn test_counters_never_decrease(
        events in prop::collection::vec((event_strategy(), 0i64..180), 1..60)
    ) {
        let start = Local.with_ymd_and_hms(2026, 6, 3, 22, 0, 0).unwrap();
        let mut state = AggregateState::new(start.into());
        let mut now = start;

        for (event, minutes) in events {
            let before = state.clone();
            now += Duration::minutes(minutes);
            apply_event(&mut state, &event, now);

            prop_assert_eq!(state.total_requests, before.total_requests + 1);
            prop_assert!(state.successful_requests >= before.successful_requests);
            prop_assert!(state.failed_requests >= before.failed_requests);
            prop_assert!(state.prints_total >= before.prints_total);
            prop_assert!(state.successful_requests + state.failed_requests <= state.total_requests);
            prop_assert!(state.response_time_stats.count >= before.response_time_stats.count);

            for (key, count) in &before.requests_by_endpoint {
                prop_assert!(state.requests_by_endpoint[key] >= *count);
            }
            for (day, stats) in &before.daily_stats {
                let after = &state.daily_stats[day];
                prop_assert!(after.requests >= stats.requests);
                prop_assert!(after.unique_user_count >= stats.unique_user_count);
                prop_assert_eq!(after.unique_user_count, after.unique_users.len() as u64);
            }

            if let Some(min) = state.response_time_stats.min {
                prop_assert!(min <= state.response_time_stats.average);
                prop_assert!(state.response_time_stats.average <= state.response_time_stats.max);
            }
        }
    }

    #[test]
    fn test_checkpoints_follow_interval(n in 1u64..200, interval in 1u64..25) {
        let mut state = AggregateState::default();
        state.total_requests = n;
        prop_assert_eq!(checkpoint_due(&state, interval), n % interval == 0);
    }
}
