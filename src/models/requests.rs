//! Request DTOs for the operational API
//!
//! Defines the structure of incoming request bodies and query strings.

use serde::Deserialize;

/// Longest accepted invalidation pattern.
const MAX_PATTERN_LEN: usize = 256;

/// Request body for `POST /cache/invalidate`
///
/// Exactly one of `tags` or `pattern` must be given.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvalidateRequest {
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub pattern: Option<String>,
}

impl InvalidateRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        match (&self.tags, &self.pattern) {
            (Some(_), Some(_)) => Some("Give either tags or pattern, not both".to_string()),
            (None, None) => Some("One of tags or pattern is required".to_string()),
            (Some(tags), None) if tags.iter().all(|t| t.trim().is_empty()) => {
                Some("Tags cannot be empty".to_string())
            }
            (None, Some(pattern)) if pattern.trim().is_empty() => {
                Some("Pattern cannot be empty".to_string())
            }
            (None, Some(pattern)) if pattern.len() > MAX_PATTERN_LEN => Some(format!(
                "Pattern exceeds maximum length of {} characters",
                MAX_PATTERN_LEN
            )),
            _ => None,
        }
    }
}

/// Query string of the usage report endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageQuery {
    /// Days to look back (default 30)
    pub days_back: Option<u32>,
    /// Number of top endpoints to list (default 10)
    pub limit: Option<usize>,
}

impl UsageQuery {
    pub fn days_back(&self) -> u32 {
        self.days_back.unwrap_or(30)
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(10).min(100)
    }
}

/// Query string of `GET /budget/:service/status`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusQuery {
    /// `daily` or `monthly` (default daily)
    pub period: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_request_tags() {
        let req: InvalidateRequest = serde_json::from_str(r#"{"tags": ["post", "user"]}"#).unwrap();
        assert_eq!(req.tags.as_deref().map(<[String]>::len), Some(2));
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_invalidate_request_pattern() {
        let req: InvalidateRequest = serde_json::from_str(r#"{"pattern": "post:*"}"#).unwrap();
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_invalidate_request_needs_exactly_one() {
        let neither: InvalidateRequest = serde_json::from_str("{}").unwrap();
        assert!(neither.validate().is_some());

        let both: InvalidateRequest =
            serde_json::from_str(r#"{"tags": ["post"], "pattern": "post:*"}"#).unwrap();
        assert!(both.validate().is_some());
    }

    #[test]
    fn test_invalidate_request_blank_values() {
        let blank_tags = InvalidateRequest {
            tags: Some(vec![" ".to_string()]),
            pattern: None,
        };
        assert!(blank_tags.validate().is_some());

        let long_pattern = InvalidateRequest {
            tags: None,
            pattern: Some("a".repeat(MAX_PATTERN_LEN + 1)),
        };
        assert!(long_pattern.validate().is_some());
    }

    #[test]
    fn test_usage_query_defaults() {
        let query = UsageQuery::default();
        assert_eq!(query.days_back(), 30);
        assert_eq!(query.limit(), 10);

        let capped = UsageQuery {
            days_back: Some(7),
            limit: Some(1000),
        };
        assert_eq!(capped.days_back(), 7);
        assert_eq!(capped.limit(), 100);
    }
}
