//! Insight reporter: read-only views over the aggregate
//!
//! Every view is computed on demand from a borrowed aggregate and an explicit
//! `now`; nothing here mutates or caches state.

use chrono::{DateTime, Duration, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::models::{
    date_key, format_fixed, hour_key, hour_of_key, AggregateState, Counters, DailyStats,
    HourlyStats,
};
use super::recommendations::{generate_recommendations, Recommendation};

const DASHBOARD_AGENT_WIDTH: usize = 50;
const ACTIVITY_AGENT_WIDTH: usize = 80;

/// Composed admin dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub overview: Overview,
    pub charts: Charts,
    pub insights: Insights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: String,
    pub average_response_time: u64,
    pub total_prints: u64,
    pub uptime: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Charts {
    pub last_7_days: Vec<DailyPoint>,
    pub last_24_hours: Vec<HourlyPoint>,
    pub requests_by_type: Vec<TypeCount>,
    pub requests_by_method: Vec<MethodCount>,
    pub prints_by_type: Vec<TypeCount>,
    pub errors_by_type: Vec<TypeCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub date: String,
    pub requests: u64,
    pub errors: u64,
    pub prints: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPoint {
    pub hour: u32,
    pub requests: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCount {
    pub method: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub top_endpoints: Vec<EndpointCount>,
    pub slowest_endpoints: Vec<EndpointTiming>,
    pub top_user_agents: Vec<AgentCount>,
    pub popular_features: Vec<FeatureCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointCount {
    pub endpoint: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointTiming {
    pub endpoint: String,
    pub average_time: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCount {
    pub agent: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCount {
    pub feature: String,
    pub count: u64,
}

/// Window for the user activity series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    Last24Hours,
    Last7Days,
}

impl Timeframe {
    /// `"24h"` selects the hourly view; anything else the 7-day view.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "24h" => Self::Last24Hours,
            _ => Self::Last7Days,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    pub overview: ActivityOverview,
    pub activity: Vec<ActivityPoint>,
    pub top_user_agents: Vec<UserAgentCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityOverview {
    pub unique_users: u64,
    /// Sessions are not tracked; always zero.
    pub total_sessions: u64,
    pub average_requests_per_user: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityPoint {
    pub period: Period,
    pub requests: u64,
    pub errors: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prints: Option<u64>,
}

/// Hour of day for the hourly view, day key for the daily view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Period {
    Hour(u32),
    Day(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAgentCount {
    pub user_agent: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessInsights {
    pub feature_adoption: FeatureAdoption,
    pub user_engagement: UserEngagement,
    pub recommendations: Vec<Recommendation>,
    pub trends: Trends,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureAdoption {
    pub total_usage: u64,
    pub most_popular: Option<PopularFeature>,
    pub breakdown: Vec<TypeCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularFeature {
    pub feature: String,
    pub usage: u64,
    pub percentage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEngagement {
    pub print_rate: String,
    pub error_rate: String,
    pub average_response_time: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trends {
    pub daily_growth: f64,
    pub popular_times: Vec<HourCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourCount {
    pub hour: u32,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: String,
    pub uptime: UptimeInfo,
    pub memory: MemoryUsage,
    pub requests: RequestSummary,
    pub performance: PerformanceSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptimeInfo {
    pub seconds: u64,
    pub formatted: String,
}

/// Resident and virtual memory of this process, in MB.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub rss_mb: u64,
    pub virtual_mb: u64,
}

impl MemoryUsage {
    /// Sample the current process. Zeroes when the platform cannot tell.
    pub fn current() -> Self {
        use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

        let Ok(pid) = sysinfo::get_current_pid() else {
            return Self::default();
        };

        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );

        system
            .process(pid)
            .map(|process| Self {
                rss_mb: process.memory() / 1024 / 1024,
                virtual_mb: process.virtual_memory() / 1024 / 1024,
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub success_rate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub average_response_time: u64,
    pub min_response_time: f64,
    pub max_response_time: f64,
}

/// Build the admin dashboard.
pub fn dashboard(state: &AggregateState, now: DateTime<Local>) -> Dashboard {
    let mut top_endpoints = ranked(&state.requests_by_endpoint);
    top_endpoints.truncate(10);

    let mut slowest: Vec<(&String, f64)> = state
        .performance_metrics
        .slowest_endpoints
        .iter()
        .map(|(endpoint, stats)| (endpoint, stats.average))
        .collect();
    slowest.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let mut top_agents = ranked(&state.user_agents);
    top_agents.truncate(5);

    Dashboard {
        overview: Overview {
            total_requests: state.total_requests,
            successful_requests: state.successful_requests,
            failed_requests: state.failed_requests,
            success_rate: percent(state.successful_requests, state.total_requests, 2),
            average_response_time: rounded_ms(state.response_time_stats.average),
            total_prints: state.prints_total,
            uptime: state.system_info.uptime,
        },
        charts: Charts {
            last_7_days: daily_series(&state.daily_stats, now)
                .into_iter()
                .map(|(date, day)| DailyPoint {
                    date,
                    requests: day.requests,
                    errors: day.errors,
                    prints: day.prints,
                })
                .collect(),
            last_24_hours: hourly_series(&state.hourly_stats, now)
                .into_iter()
                .map(|(hour, bucket)| HourlyPoint {
                    hour,
                    requests: bucket.requests,
                    errors: bucket.errors,
                })
                .collect(),
            requests_by_type: type_counts(&state.requests_by_type),
            requests_by_method: state
                .requests_by_method
                .iter()
                .map(|(method, count)| MethodCount {
                    method: method.clone(),
                    count: *count,
                })
                .collect(),
            prints_by_type: type_counts(&state.prints_by_type),
            errors_by_type: type_counts(&state.errors_by_type),
        },
        insights: Insights {
            top_endpoints: top_endpoints
                .into_iter()
                .map(|(endpoint, count)| EndpointCount { endpoint, count })
                .collect(),
            slowest_endpoints: slowest
                .into_iter()
                .take(5)
                .map(|(endpoint, average)| EndpointTiming {
                    endpoint: endpoint.clone(),
                    average_time: rounded_ms(average),
                })
                .collect(),
            top_user_agents: top_agents
                .into_iter()
                .map(|(agent, count)| AgentCount {
                    agent: format!("{}...", truncate_agent(&agent, DASHBOARD_AGENT_WIDTH)),
                    count,
                })
                .collect(),
            popular_features: ranked(&state.popular_features)
                .into_iter()
                .map(|(feature, count)| FeatureCount { feature, count })
                .collect(),
        },
    }
}

/// Build the user activity view for `timeframe`.
pub fn user_activity(
    state: &AggregateState,
    timeframe: Timeframe,
    now: DateTime<Local>,
) -> UserActivity {
    let unique_users = state.ip_addresses.len() as u64;
    let average_requests_per_user = if unique_users > 0 {
        (state.total_requests as f64 / unique_users as f64).round() as u64
    } else {
        0
    };

    let activity = match timeframe {
        Timeframe::Last24Hours => hourly_series(&state.hourly_stats, now)
            .into_iter()
            .map(|(hour, bucket)| ActivityPoint {
                period: Period::Hour(hour),
                requests: bucket.requests,
                errors: bucket.errors,
                prints: None,
            })
            .collect(),
        Timeframe::Last7Days => daily_series(&state.daily_stats, now)
            .into_iter()
            .map(|(date, day)| ActivityPoint {
                period: Period::Day(date),
                requests: day.requests,
                errors: day.errors,
                prints: Some(day.prints),
            })
            .collect(),
    };

    let mut top_agents = ranked(&state.user_agents);
    top_agents.truncate(10);

    UserActivity {
        overview: ActivityOverview {
            unique_users,
            total_sessions: 0,
            average_requests_per_user,
        },
        activity,
        top_user_agents: top_agents
            .into_iter()
            .map(|(agent, count)| {
                let user_agent = if agent.chars().count() > ACTIVITY_AGENT_WIDTH {
                    format!("{}...", truncate_agent(&agent, ACTIVITY_AGENT_WIDTH))
                } else {
                    agent
                };
                UserAgentCount { user_agent, count }
            })
            .collect(),
    }
}

/// Build feature adoption, engagement, recommendations and trends.
pub fn business_insights(state: &AggregateState) -> BusinessInsights {
    let total_usage = state.total_feature_usage();

    let most_popular = if total_usage > 0 {
        ranked(&state.requests_by_type)
            .into_iter()
            .next()
            .map(|(feature, usage)| PopularFeature {
                percentage: percent(usage, total_usage, 1),
                feature,
                usage,
            })
    } else {
        None
    };

    BusinessInsights {
        feature_adoption: FeatureAdoption {
            total_usage,
            most_popular,
            breakdown: type_counts(&state.requests_by_type),
        },
        user_engagement: UserEngagement {
            print_rate: percent(state.prints_total, state.total_requests, 2),
            error_rate: percent(state.failed_requests, state.total_requests, 2),
            average_response_time: rounded_ms(state.response_time_stats.average),
        },
        recommendations: generate_recommendations(state),
        trends: Trends {
            daily_growth: growth_trend(&state.daily_stats),
            popular_times: popular_times(&state.hourly_stats),
        },
    }
}

/// Build the system health view. `memory` is sampled by the caller.
pub fn system_health(
    state: &AggregateState,
    memory: MemoryUsage,
    now: DateTime<Local>,
) -> SystemHealth {
    let uptime_seconds = (now.with_timezone(&Utc) - state.system_info.start_time)
        .num_seconds()
        .max(0) as u64;
    let stats = &state.response_time_stats;

    SystemHealth {
        status: "healthy".to_string(),
        uptime: UptimeInfo {
            seconds: uptime_seconds,
            formatted: format_uptime(uptime_seconds),
        },
        memory,
        requests: RequestSummary {
            total: state.total_requests,
            successful: state.successful_requests,
            failed: state.failed_requests,
            success_rate: percent(state.successful_requests, state.total_requests, 2),
        },
        performance: PerformanceSummary {
            average_response_time: rounded_ms(stats.average),
            min_response_time: stats.min.unwrap_or(0.0),
            max_response_time: stats.max,
        },
    }
}

/// Day-over-day request growth between the two latest recorded days, in
/// percent with one decimal.
pub fn growth_trend(daily_stats: &BTreeMap<String, DailyStats>) -> f64 {
    let mut latest = daily_stats.values().rev();
    let (Some(recent), Some(previous)) = (latest.next(), latest.next()) else {
        return 0.0;
    };

    if previous.requests == 0 {
        return if recent.requests > 0 { 100.0 } else { 0.0 };
    }

    let growth =
        (recent.requests as f64 - previous.requests as f64) / previous.requests as f64 * 100.0;
    (growth * 10.0).round() / 10.0
}

/// The three busiest hours of day, summed over every recorded day.
pub fn popular_times(hourly_stats: &BTreeMap<String, HourlyStats>) -> Vec<HourCount> {
    let mut by_hour: BTreeMap<u32, u64> = BTreeMap::new();
    for (key, bucket) in hourly_stats {
        if let Some(hour) = hour_of_key(key) {
            *by_hour.entry(hour).or_insert(0) += bucket.requests;
        }
    }

    let mut hours: Vec<(u32, u64)> = by_hour.into_iter().collect();
    hours.sort_by(|a, b| b.1.cmp(&a.1));
    hours
        .into_iter()
        .take(3)
        .map(|(hour, count)| HourCount { hour, count })
        .collect()
}

/// First `width` characters of `text`.
pub fn truncate_agent(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

/// Format seconds as `"{days}d {hours}h {minutes}m"`.
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    format!("{}d {}h {}m", days, hours, minutes)
}

/// Trailing seven days, oldest first, zero-filled.
fn daily_series(
    daily_stats: &BTreeMap<String, DailyStats>,
    now: DateTime<Local>,
) -> Vec<(String, DailyStats)> {
    let today = now.date_naive();
    (0..7)
        .rev()
        .map(|days_ago| {
            let key = date_key(today - Duration::days(days_ago));
            let day = daily_stats.get(&key).cloned().unwrap_or_default();
            (key, day)
        })
        .collect()
}

/// Trailing twenty-four hours, oldest first, zero-filled.
fn hourly_series(
    hourly_stats: &BTreeMap<String, HourlyStats>,
    now: DateTime<Local>,
) -> Vec<(u32, HourlyStats)> {
    (0..24)
        .rev()
        .map(|hours_ago| {
            let at = now - Duration::hours(hours_ago);
            let bucket = hourly_stats.get(&hour_key(&at)).cloned().unwrap_or_default();
            (at.hour(), bucket)
        })
        .collect()
}

/// Counters sorted by count descending; equal counts keep first-seen order.
fn ranked(counters: &Counters) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = counters
        .iter()
        .map(|(key, count)| (key.clone(), *count))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries
}

fn type_counts(counters: &Counters) -> Vec<TypeCount> {
    counters
        .iter()
        .map(|(kind, count)| TypeCount {
            kind: kind.clone(),
            count: *count,
        })
        .collect()
}

fn percent(part: u64, whole: u64, decimals: usize) -> String {
    if whole == 0 {
        return "0".to_string();
    }
    format_fixed(part as f64 / whole as f64 * 100.0, decimals)
}

fn rounded_ms(ms: f64) -> u64 {
    if ms.is_finite() && ms > 0.0 {
        ms.round() as u64
    } else {
        0
    }
}
