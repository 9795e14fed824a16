//! Data models for the request analytics aggregate

use chrono::{DateTime, Local, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// HTTP methods counted from the first event onwards.
pub const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH"];

/// Content kinds the note generator accepts.
pub const CONTENT_KINDS: &[&str] = &["text", "audio", "video", "image", "ppt", "notes"];

/// Content kinds that can be printed or exported.
pub const PRINTABLE_KINDS: &[&str] = &["notes", "ppt", "audio", "video", "image"];

/// Named counters in first-seen order. Rankings break ties by this order,
/// and it is kept across snapshot round-trips.
pub type Counters = IndexMap<String, u64>;

pub(crate) fn increment(counters: &mut Counters, key: &str) {
    *counters.entry(key.to_string()).or_insert(0) += 1;
}

fn seeded(keys: &[&str]) -> Counters {
    keys.iter().map(|k| (k.to_string(), 0)).collect()
}

/// Process-wide aggregate of every recorded event.
///
/// Missing fields in a loaded snapshot fall back to their defaults, so older
/// snapshots merge cleanly over a fresh aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AggregateState {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub requests_by_endpoint: Counters,
    pub requests_by_method: Counters,
    pub requests_by_type: Counters,
    pub response_time_stats: ResponseTimeStats,
    pub prints_by_type: Counters,
    pub prints_total: u64,
    pub daily_stats: BTreeMap<String, DailyStats>,
    pub hourly_stats: BTreeMap<String, HourlyStats>,
    pub user_agents: Counters,
    pub ip_addresses: Counters,
    pub errors_by_type: Counters,
    pub popular_features: Counters,
    pub performance_metrics: PerformanceMetrics,
    pub last_updated: DateTime<Utc>,
    pub system_info: SystemInfo,
}

impl AggregateState {
    /// Create an empty aggregate for a process started at `start_time`.
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            requests_by_endpoint: Counters::new(),
            requests_by_method: seeded(HTTP_METHODS),
            requests_by_type: seeded(CONTENT_KINDS),
            response_time_stats: ResponseTimeStats::default(),
            prints_by_type: seeded(PRINTABLE_KINDS),
            prints_total: 0,
            daily_stats: BTreeMap::new(),
            hourly_stats: BTreeMap::new(),
            user_agents: Counters::new(),
            ip_addresses: Counters::new(),
            errors_by_type: Counters::new(),
            popular_features: Counters::new(),
            performance_metrics: PerformanceMetrics::default(),
            last_updated: start_time,
            system_info: SystemInfo {
                start_time,
                uptime: 0,
            },
        }
    }

    /// Sum of per-kind request counts.
    pub fn total_feature_usage(&self) -> u64 {
        self.requests_by_type.values().sum()
    }

    /// Global failure percentage, zero before the first event.
    pub fn error_rate(&self) -> f64 {
        ratio_percent(self.failed_requests, self.total_requests)
    }

    pub fn print_rate(&self) -> f64 {
        ratio_percent(self.prints_total, self.total_requests)
    }

    pub fn success_rate(&self) -> f64 {
        ratio_percent(self.successful_requests, self.total_requests)
    }
}

impl Default for AggregateState {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

pub(crate) fn ratio_percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Format `value` with `decimals` fraction digits, rounding halves away from
/// zero (`3.125` becomes `"3.13"`, where `{:.2}` alone gives `"3.12"`).
pub fn format_fixed(value: f64, decimals: usize) -> String {
    let factor = 10f64.powi(decimals as i32);
    format!("{:.*}", decimals, (value * factor).round() / factor)
}

/// Running latency aggregate in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseTimeStats {
    #[serde(alias = "total")]
    pub sum: f64,
    pub count: u64,
    pub average: f64,
    /// `None` until the first sample arrives.
    pub min: Option<f64>,
    pub max: f64,
}

impl ResponseTimeStats {
    pub fn record(&mut self, sample_ms: f64) {
        self.sum += sample_ms;
        self.count += 1;
        self.average = self.sum / self.count as f64;
        self.min = Some(self.min.map_or(sample_ms, |min| min.min(sample_ms)));
        self.max = self.max.max(sample_ms);
    }
}

/// Per-endpoint latency aggregate. No minimum is tracked per endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointLatency {
    #[serde(alias = "total")]
    pub sum: f64,
    pub count: u64,
    pub average: f64,
    pub max: f64,
}

impl EndpointLatency {
    pub fn record(&mut self, sample_ms: f64) {
        self.sum += sample_ms;
        self.count += 1;
        self.average = self.sum / self.count as f64;
        self.max = self.max.max(sample_ms);
    }
}

/// Per-endpoint error rate. Only error observations feed it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointErrorRate {
    pub total: u64,
    pub errors: u64,
    pub rate: f64,
}

impl EndpointErrorRate {
    pub fn record_error(&mut self) {
        self.errors += 1;
        self.total += 1;
        self.rate = ratio_percent(self.errors, self.total);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub slowest_endpoints: IndexMap<String, EndpointLatency>,
    pub error_rates: IndexMap<String, EndpointErrorRate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemInfo {
    pub start_time: DateTime<Utc>,
    /// Milliseconds since `start_time` as of the latest event.
    pub uptime: u64,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            start_time: Utc::now(),
            uptime: 0,
        }
    }
}

/// Counters for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredDailyStats")]
pub struct DailyStats {
    pub requests: u64,
    pub prints: u64,
    pub errors: u64,
    /// Global success percentage at the time of the day's latest event.
    pub success_rate: String,
    pub avg_response_time: f64,
    /// Distinct client IPs seen that day, written as a sorted list.
    pub unique_users: BTreeSet<String>,
    pub unique_user_count: u64,
    pub top_endpoints: Counters,
}

impl Default for DailyStats {
    fn default() -> Self {
        Self {
            requests: 0,
            prints: 0,
            errors: 0,
            success_rate: "0".to_string(),
            avg_response_time: 0.0,
            unique_users: BTreeSet::new(),
            unique_user_count: 0,
            top_endpoints: Counters::new(),
        }
    }
}

impl DailyStats {
    /// Refresh the derived visitor count. The count never moves backwards,
    /// which keeps counts carried over from count-only snapshots.
    pub fn refresh_unique_user_count(&mut self) {
        self.unique_user_count = self.unique_user_count.max(self.unique_users.len() as u64);
    }
}

/// On-disk shape of [`DailyStats`], accepting older snapshots where the
/// visitor set had already been reduced to a number and the success rate was
/// still numeric.
#[derive(Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StoredDailyStats {
    requests: u64,
    prints: u64,
    errors: u64,
    success_rate: StoredRate,
    avg_response_time: f64,
    unique_users: StoredVisitors,
    unique_user_count: Option<u64>,
    top_endpoints: Counters,
}

impl Default for StoredDailyStats {
    fn default() -> Self {
        Self {
            requests: 0,
            prints: 0,
            errors: 0,
            success_rate: StoredRate::Number(0.0),
            avg_response_time: 0.0,
            unique_users: StoredVisitors::Count(0),
            unique_user_count: None,
            top_endpoints: Counters::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRate {
    Text(String),
    Number(f64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredVisitors {
    Members(BTreeSet<String>),
    Count(u64),
}

impl From<StoredDailyStats> for DailyStats {
    fn from(stored: StoredDailyStats) -> Self {
        let success_rate = match stored.success_rate {
            StoredRate::Text(text) => text,
            StoredRate::Number(n) if n == 0.0 => "0".to_string(),
            StoredRate::Number(n) => format_fixed(n, 2),
        };

        let (unique_users, legacy_count) = match stored.unique_users {
            StoredVisitors::Members(members) => (members, 0),
            StoredVisitors::Count(count) => (BTreeSet::new(), count),
        };

        let mut stats = Self {
            requests: stored.requests,
            prints: stored.prints,
            errors: stored.errors,
            success_rate,
            avg_response_time: stored.avg_response_time,
            unique_users,
            unique_user_count: stored.unique_user_count.unwrap_or(legacy_count),
            top_endpoints: stored.top_endpoints,
        };
        stats.refresh_unique_user_count();
        stats
    }
}

/// Counters for one clock hour of one day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HourlyStats {
    pub requests: u64,
    pub errors: u64,
    pub avg_response_time: f64,
}

/// Key of the daily bucket containing `now`, e.g. `2026-10-18`.
pub fn day_key(now: &DateTime<Local>) -> String {
    date_key(now.date_naive())
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Key of the hourly bucket containing `now`, e.g. `2026-10-18 14:00`.
pub fn hour_key(now: &DateTime<Local>) -> String {
    now.format("%Y-%m-%d %H:00").to_string()
}

/// Hour of day encoded in an hourly bucket key.
pub fn hour_of_key(key: &str) -> Option<u32> {
    let (_, clock) = key.rsplit_once(' ')?;
    let (hour, _) = clock.split_once(':')?;
    hour.parse().ok().filter(|h| *h < 24)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_state_is_seeded() {
        let state = AggregateState::default();

        assert_eq!(state.total_requests, 0);
        assert_eq!(state.requests_by_method.len(), 5);
        assert_eq!(state.requests_by_method.get("PATCH"), Some(&0));
        assert_eq!(state.requests_by_type.len(), 6);
        assert_eq!(state.prints_by_type.len(), 5);
        assert!(!state.prints_by_type.contains_key("text"));
        assert_eq!(state.response_time_stats.min, None);
        assert_eq!(state.error_rate(), 0.0);
    }

    #[test]
    fn test_bucket_keys() {
        let now = Local.with_ymd_and_hms(2026, 6, 3, 9, 41, 7).unwrap();

        assert_eq!(day_key(&now), "2026-06-03");
        assert_eq!(hour_key(&now), "2026-06-03 09:00");
        assert_eq!(hour_of_key(&hour_key(&now)), Some(9));
        assert_eq!(hour_of_key("garbage"), None);
        assert_eq!(hour_of_key("2026-06-03 31:00"), None);
    }

    #[test]
    fn test_response_time_stats_tracks_extremes() {
        let mut stats = ResponseTimeStats::default();
        stats.record(120.0);
        stats.record(50.0);
        stats.record(300.0);

        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, Some(50.0));
        assert_eq!(stats.max, 300.0);
        assert!((stats.average - 156.666).abs() < 0.01);
    }

    #[test]
    fn test_format_fixed_rounds_halves_up() {
        assert_eq!(format_fixed(100.0 / 32.0, 2), "3.13");
        assert_eq!(format_fixed(100.0 / 16.0, 1), "6.3");
        assert_eq!(format_fixed(2.5, 0), "3");
        assert_eq!(format_fixed(25.0, 2), "25.00");
        assert_eq!(format_fixed(200.0 / 3.0, 2), "66.67");
    }

    #[test]
    fn test_counters_keep_first_seen_order() {
        let mut state = AggregateState::default();
        increment(&mut state.requests_by_endpoint, "/zeta");
        increment(&mut state.requests_by_endpoint, "/alpha");
        increment(&mut state.requests_by_endpoint, "/zeta");

        let keys: Vec<&str> = state.requests_by_endpoint.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["/zeta", "/alpha"]);

        let methods: Vec<&str> = state.requests_by_method.keys().map(String::as_str).collect();
        assert_eq!(methods, vec!["GET", "POST", "PUT", "DELETE", "PATCH"]);

        let json = serde_json::to_string(&state).unwrap();
        let back: AggregateState = serde_json::from_str(&json).unwrap();
        let keys: Vec<&str> = back.requests_by_endpoint.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["/zeta", "/alpha"]);
        let kinds: Vec<&str> = back.requests_by_type.keys().map(String::as_str).collect();
        assert_eq!(kinds, vec!["text", "audio", "video", "image", "ppt", "notes"]);
    }

    #[test]
    fn test_endpoint_error_rate() {
        let mut rate = EndpointErrorRate::default();
        rate.record_error();
        rate.record_error();

        assert_eq!(rate.errors, 2);
        assert_eq!(rate.total, 2);
        assert_eq!(rate.rate, 100.0);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let state: AggregateState =
            serde_json::from_str(r#"{"totalRequests": 42, "failedRequests": 3}"#).unwrap();

        assert_eq!(state.total_requests, 42);
        assert_eq!(state.failed_requests, 3);
        assert_eq!(state.requests_by_method.len(), 5);
        assert!(state.daily_stats.is_empty());
    }

    #[test]
    fn test_loads_count_only_daily_snapshot() {
        let json = r#"{
            "responseTimeStats": {"total": 300, "count": 2, "average": 150,
                                  "min": null, "max": 200},
            "dailyStats": {
                "2026-06-03": {"requests": 4, "prints": 0, "errors": 1, "successRate": 0,
                               "avgResponseTime": 0, "uniqueUsers": 3, "topEndpoints": {}}
            }
        }"#;
        let state: AggregateState = serde_json::from_str(json).unwrap();

        assert_eq!(state.response_time_stats.sum, 300.0);
        assert_eq!(state.response_time_stats.min, None);

        let day = &state.daily_stats["2026-06-03"];
        assert_eq!(day.requests, 4);
        assert_eq!(day.success_rate, "0");
        assert!(day.unique_users.is_empty());
        assert_eq!(day.unique_user_count, 3);
    }

    #[test]
    fn test_visitor_set_written_as_sorted_list() {
        let mut day = DailyStats::default();
        day.unique_users.insert("10.0.0.2".to_string());
        day.unique_users.insert("10.0.0.1".to_string());
        day.refresh_unique_user_count();

        let value = serde_json::to_value(&day).unwrap();
        assert_eq!(value["uniqueUsers"], serde_json::json!(["10.0.0.1", "10.0.0.2"]));
        assert_eq!(value["uniqueUserCount"], 2);

        let back: DailyStats = serde_json::from_value(value).unwrap();
        assert_eq!(back, day);
    }
}
