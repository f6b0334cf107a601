// crates/client/src/config.rs
//! Client configuration: server location, timeouts and tracker cadence.

use std::str::FromStr;
use std::time::Duration;

use opwatch_types::OperationId;
use tracing::warn;

use crate::error::ClientError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8181";

/// Path templates for the operation endpoints. `{id}` is replaced with the
/// URL-encoded operation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub stream: String,
    pub event_log: String,
    pub step_history: String,
    pub cancel: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            stream: "/api/agent-work-orders/{id}/logs/stream".into(),
            event_log: "/api/agent-work-orders/{id}/logs".into(),
            step_history: "/api/agent-work-orders/{id}/steps".into(),
            cancel: "/api/agent-work-orders/{id}/cancel".into(),
        }
    }
}

impl Endpoints {
    pub fn render(template: &str, id: &OperationId) -> String {
        template.replace("{id}", &urlencoding::encode(id.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Applies to request/response calls only, never the push channel.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Elapsed-time projection cadence.
    pub tick_interval: Duration,
    /// How long an unsubscribed operation keeps answering queries.
    pub grace_period: Duration,
    /// Page size for the historical event log fetch.
    pub event_log_limit: usize,
    /// Upper bound on log pages read per operation.
    pub event_log_max_pages: usize,
    pub endpoints: Endpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            request_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
            tick_interval: Duration::from_secs(1),
            grace_period: Duration::from_secs(5),
            event_log_limit: 500,
            event_log_max_pages: 20,
            endpoints: Endpoints::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `OPWATCH_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("OPWATCH_BASE_URL").filter(|u| !u.trim().is_empty()) {
            config.base_url = url.trim().to_string();
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "OPWATCH_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "OPWATCH_TICK_MS").filter(|ms| *ms > 0) {
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "OPWATCH_GRACE_SECS") {
            config.grace_period = Duration::from_secs(secs);
        }
        config
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Absolute URL for an endpoint template.
    pub fn url(&self, template: &str, id: &OperationId) -> Result<reqwest::Url, ClientError> {
        let base = self.base_url.trim_end_matches('/');
        let raw = format!("{base}{}", Endpoints::render(template, id));
        reqwest::Url::parse(&raw).map_err(|e| ClientError::InvalidUrl(format!("{raw}: {e}")))
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring invalid environment value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8181");
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.event_log_limit, 500);
        assert_eq!(config.event_log_max_pages, 20);
    }

    #[test]
    fn test_env_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("OPWATCH_BASE_URL", "http://archon:9000/"),
            ("OPWATCH_TICK_MS", "250"),
            ("OPWATCH_GRACE_SECS", "0"),
        ]));
        assert_eq!(config.base_url, "http://archon:9000/");
        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.grace_period, Duration::ZERO);
    }

    #[test]
    fn test_invalid_env_values_fall_back() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("OPWATCH_REQUEST_TIMEOUT_SECS", "soon"),
            ("OPWATCH_TICK_MS", "0"),
        ]));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.tick_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_url_renders_and_encodes_id() {
        let config = ClientConfig::default().with_base_url("http://localhost:8181/");
        let url = config
            .url(&config.endpoints.stream, &OperationId::from("wo 1/2"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8181/api/agent-work-orders/wo%201%2F2/logs/stream"
        );
    }

    #[test]
    fn test_bad_base_url_is_invalid_url_error() {
        let config = ClientConfig::default().with_base_url("not a url");
        let err = config
            .url(&config.endpoints.cancel, &OperationId::from("wo-1"))
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl(_)));
    }
}
