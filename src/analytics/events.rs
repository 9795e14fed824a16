//! Events fed to the analytics recorder
//!
//! Each variant carries only the fields its update reads. Callers on the loose
//! JSON boundary (the `/track` endpoint) go through [`AnalyticsEvent::from_parts`],
//! which never fails: absent, empty or mistyped fields simply become `None`.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum AnalyticsEvent {
    RequestStart {
        endpoint: Option<String>,
        method: Option<String>,
        user_agent: Option<String>,
        ip: Option<String>,
    },
    RequestSuccess {
        endpoint: Option<String>,
        /// Latency in milliseconds.
        response_time: Option<f64>,
        /// Content kind of the request (text, audio, ...).
        content_type: Option<String>,
    },
    RequestError {
        endpoint: Option<String>,
        /// Error classification such as `HTTP_500`.
        error_type: Option<String>,
        response_time: Option<f64>,
    },
    Print {
        content_type: Option<String>,
    },
    /// Admin-defined event; counted but otherwise not interpreted.
    Custom { name: String, details: Value },
}

impl AnalyticsEvent {
    /// Build an event from its wire name and free-form details.
    pub fn from_parts(event_type: &str, details: Value) -> Self {
        match event_type {
            "request_start" => Self::RequestStart {
                endpoint: text_field(&details, "endpoint"),
                method: text_field(&details, "method"),
                user_agent: text_field(&details, "userAgent"),
                ip: text_field(&details, "ip"),
            },
            "request_success" => Self::RequestSuccess {
                endpoint: text_field(&details, "endpoint"),
                response_time: latency_field(&details, "responseTime"),
                content_type: text_field(&details, "type"),
            },
            "request_error" => Self::RequestError {
                endpoint: text_field(&details, "endpoint"),
                error_type: text_field(&details, "errorType"),
                response_time: latency_field(&details, "responseTime"),
            },
            "print" => Self::Print {
                content_type: text_field(&details, "type"),
            },
            other => Self::Custom {
                name: other.to_string(),
                details,
            },
        }
    }

    /// Wire name of the event.
    pub fn kind(&self) -> &str {
        match self {
            Self::RequestStart { .. } => "request_start",
            Self::RequestSuccess { .. } => "request_success",
            Self::RequestError { .. } => "request_error",
            Self::Print { .. } => "print",
            Self::Custom { name, .. } => name,
        }
    }
}

fn text_field(details: &Value, key: &str) -> Option<String> {
    details
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn latency_field(details: &Value, key: &str) -> Option<f64> {
    details
        .get(key)
        .and_then(Value::as_f64)
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_start_from_parts() {
        let event = AnalyticsEvent::from_parts(
            "request_start",
            json!({
                "endpoint": "/api/ai/text",
                "method": "POST",
                "userAgent": "Mozilla/5.0",
                "ip": "10.0.0.7"
            }),
        );

        assert_eq!(
            event,
            AnalyticsEvent::RequestStart {
                endpoint: Some("/api/ai/text".to_string()),
                method: Some("POST".to_string()),
                user_agent: Some("Mozilla/5.0".to_string()),
                ip: Some("10.0.0.7".to_string()),
            }
        );
        assert_eq!(event.kind(), "request_start");
    }

    #[test]
    fn test_success_reads_type_and_latency() {
        let event = AnalyticsEvent::from_parts(
            "request_success",
            json!({"endpoint": "/api/ai/audio", "responseTime": 812, "type": "audio"}),
        );

        assert_eq!(
            event,
            AnalyticsEvent::RequestSuccess {
                endpoint: Some("/api/ai/audio".to_string()),
                response_time: Some(812.0),
                content_type: Some("audio".to_string()),
            }
        );
    }

    #[test]
    fn test_malformed_details_are_tolerated() {
        let event = AnalyticsEvent::from_parts(
            "request_error",
            json!({"endpoint": 17, "errorType": "", "responseTime": "slow"}),
        );

        assert_eq!(
            event,
            AnalyticsEvent::RequestError {
                endpoint: None,
                error_type: None,
                response_time: None,
            }
        );

        let event = AnalyticsEvent::from_parts("print", Value::Null);
        assert_eq!(event, AnalyticsEvent::Print { content_type: None });
    }

    #[test]
    fn test_negative_latency_is_dropped() {
        let event = AnalyticsEvent::from_parts("request_success", json!({"responseTime": -4}));
        assert!(matches!(
            event,
            AnalyticsEvent::RequestSuccess {
                response_time: None,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_types_pass_through() {
        let details = json!({"adminId": 1, "username": "admin", "role": "super_admin"});
        let event = AnalyticsEvent::from_parts("admin_login", details.clone());

        assert_eq!(event.kind(), "admin_login");
        assert_eq!(
            event,
            AnalyticsEvent::Custom {
                name: "admin_login".to_string(),
                details,
            }
        );
    }
}
