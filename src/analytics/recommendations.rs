//! Threshold-based recommendations derived from the aggregate

use serde::{Deserialize, Serialize};

use super::models::{format_fixed, AggregateState};

/// Error rate (percent) above which a high-priority recommendation is raised.
pub const ERROR_RATE_THRESHOLD: f64 = 5.0;

/// Average latency (ms) above which a medium-priority recommendation is raised.
pub const SLOW_RESPONSE_THRESHOLD_MS: f64 = 5000.0;

/// Share of total feature usage below which a content kind is underused.
pub const UNDERUSED_SHARE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub category: RecommendationCategory,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationCategory {
    Performance,
    Business,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Evaluate every rule in order and return those that apply.
pub fn generate_recommendations(state: &AggregateState) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    let error_rate = state.error_rate();
    if error_rate > ERROR_RATE_THRESHOLD {
        recommendations.push(Recommendation {
            category: RecommendationCategory::Performance,
            priority: Priority::High,
            title: "High Error Rate Detected".to_string(),
            description: format!(
                "Current error rate is {}%. Consider investigating and fixing common errors.",
                format_fixed(error_rate, 1)
            ),
            action: "Review error logs and improve error handling".to_string(),
        });
    }

    let average_ms = state.response_time_stats.average;
    if average_ms > SLOW_RESPONSE_THRESHOLD_MS {
        recommendations.push(Recommendation {
            category: RecommendationCategory::Performance,
            priority: Priority::Medium,
            title: "Slow Response Times".to_string(),
            description: format!(
                "Average response time is {}ms. Consider optimizing performance.",
                average_ms.round()
            ),
            action: "Optimize API endpoints and consider caching".to_string(),
        });
    }

    let total_usage = state.total_feature_usage() as f64;
    let underused: Vec<&str> = state
        .requests_by_type
        .iter()
        .filter(|(_, count)| (**count as f64) < total_usage * UNDERUSED_SHARE)
        .map(|(kind, _)| kind.as_str())
        .collect();

    if !underused.is_empty() {
        recommendations.push(Recommendation {
            category: RecommendationCategory::Business,
            priority: Priority::Low,
            title: "Underutilized Features".to_string(),
            description: format!(
                "Features like {} have low usage. Consider promoting them.",
                underused.join(", ")
            ),
            action: "Improve feature visibility and user education".to_string(),
        });
    }

    recommendations
}
