//! Event recorder: folds one event into the aggregate
//!
//! The fold is free of I/O and takes the wall-clock time explicitly, so the
//! service decides when to persist and tests decide what "now" is.

use chrono::{DateTime, Local, Utc};

use super::events::AnalyticsEvent;
use super::models::{day_key, format_fixed, hour_key, increment, AggregateState};

/// Apply `event`, observed at `now`, to `state`.
pub fn apply_event(state: &mut AggregateState, event: &AnalyticsEvent, now: DateTime<Local>) {
    let now_utc = now.with_timezone(&Utc);

    state.total_requests += 1;
    state.last_updated = now_utc;
    state.system_info.uptime = (now_utc - state.system_info.start_time)
        .num_milliseconds()
        .max(0) as u64;

    let today = day_key(&now);
    let hour = hour_key(&now);

    // Buckets are created even for events that do not touch them.
    state.hourly_stats.entry(hour.clone()).or_default();
    state.daily_stats.entry(today.clone()).or_default();

    match event {
        AnalyticsEvent::RequestStart {
            endpoint,
            method,
            user_agent,
            ip,
        } => {
            if let Some(bucket) = state.hourly_stats.get_mut(&hour) {
                bucket.requests += 1;
            }
            let daily = state.daily_stats.entry(today.clone()).or_default();
            daily.requests += 1;

            if let Some(endpoint) = endpoint {
                increment(&mut daily.top_endpoints, endpoint);
                increment(&mut state.requests_by_endpoint, endpoint);
            }
            if let Some(ip) = ip {
                daily.unique_users.insert(ip.clone());
                increment(&mut state.ip_addresses, ip);
            }
            if let Some(method) = method {
                increment(&mut state.requests_by_method, method);
            }
            if let Some(user_agent) = user_agent {
                increment(&mut state.user_agents, user_agent);
            }
        }
        AnalyticsEvent::RequestSuccess {
            endpoint,
            response_time,
            content_type,
        } => {
            state.successful_requests += 1;

            if let Some(ms) = *response_time {
                state.response_time_stats.record(ms);
                if let Some(endpoint) = endpoint {
                    state
                        .performance_metrics
                        .slowest_endpoints
                        .entry(endpoint.clone())
                        .or_default()
                        .record(ms);
                }
            }

            if let Some(kind) = content_type {
                increment(&mut state.requests_by_type, kind);
                increment(&mut state.popular_features, kind);
            }
        }
        AnalyticsEvent::RequestError {
            endpoint,
            error_type,
            ..
        } => {
            state.failed_requests += 1;
            if let Some(bucket) = state.hourly_stats.get_mut(&hour) {
                bucket.errors += 1;
            }
            state.daily_stats.entry(today.clone()).or_default().errors += 1;

            if let Some(error_type) = error_type {
                increment(&mut state.errors_by_type, error_type);
            }
            if let Some(endpoint) = endpoint {
                state
                    .performance_metrics
                    .error_rates
                    .entry(endpoint.clone())
                    .or_default()
                    .record_error();
            }
        }
        AnalyticsEvent::Print { content_type } => {
            state.prints_total += 1;
            state.daily_stats.entry(today.clone()).or_default().prints += 1;

            if let Some(kind) = content_type {
                increment(&mut state.prints_by_type, kind);
            }
        }
        AnalyticsEvent::Custom { .. } => {}
    }

    // The day's success rate mirrors the global ratio, not the day's own.
    let success_rate = format_fixed(state.success_rate(), 2);
    let daily = state.daily_stats.entry(today).or_default();
    daily.success_rate = success_rate;
    daily.refresh_unique_user_count();
}

/// Whether the aggregate should be checkpointed after the latest event.
pub fn checkpoint_due(state: &AggregateState, interval: u64) -> bool {
    interval > 0 && state.total_requests > 0 && state.total_requests % interval == 0
}
