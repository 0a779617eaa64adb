//! Test plan configuration: schema, defaults, and validation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Scheme used to reach the target API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain HTTP
    Http,
    /// HTTP over TLS
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
        }
    }
}

/// HTTP method a route is exercised with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    /// GET request
    Get,
    /// POST request
    Post,
    /// PATCH request
    Patch,
}

impl HttpMethod {
    /// Uppercase method name as sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How route jobs are scheduled relative to one another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One route at a time, in plan order, stopping at the first failure
    Sequential,
    /// All enabled routes at once, reports collected in completion order
    Concurrent,
}

/// Location of the target API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiTarget {
    /// URL scheme
    pub protocol: Protocol,
    /// Host name or address
    pub host: String,
    /// Optional port appended to the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl ApiTarget {
    /// Base URL shared by all route and token-refresh requests
    pub fn base_url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.protocol, self.host, port),
            None => format!("{}://{}", self.protocol, self.host),
        }
    }
}

/// Periodic token refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenPolicy {
    /// Whether the refresh loop runs at all
    pub enabled: bool,
    /// Path of the refresh endpoint, appended to the API base URL
    pub refresh_path: String,
    /// Milliseconds between refresh attempts
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

fn default_refresh_interval_ms() -> u64 {
    30_000
}

/// One configured endpoint plus its load parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteSpec {
    /// Disabled routes are skipped without producing a report
    pub enabled: bool,
    /// HTTP method
    pub method: HttpMethod,
    /// Request path, appended to the API base URL
    pub path: String,
    /// Per-request timeout in milliseconds, 0 disables the timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Total number of requests to send
    pub max_requests: u64,
    /// Wall-clock cap on the job in seconds
    pub max_duration_seconds: u64,
    /// Number of simultaneous connections
    pub concurrency: usize,
    /// Request rate across all connections
    pub requests_per_second: u32,
    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// JSON body sent with POST and PATCH requests
    #[serde(default)]
    pub body: serde_json::Map<String, serde_json::Value>,
    /// Cookie strings sent with every request
    #[serde(default)]
    pub cookies: Vec<String>,
    /// Value of the content-type header
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_timeout_ms() -> u64 {
    3_000
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

/// On-disk plan document, prior to validation
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanFile {
    api: ApiTarget,
    mode: ExecutionMode,
    #[serde(default)]
    token: Option<TokenPolicy>,
    routes: Vec<RouteSpec>,
}

/// Validated, immutable description of one load-test run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestPlan {
    /// Base URL every route path and the token refresh path are appended to
    pub api_base_url: String,
    /// Scheduling mode for route jobs
    pub execution_mode: ExecutionMode,
    /// Routes in plan order
    pub routes: Vec<RouteSpec>,
    /// Token refresh policy, absent means no token handling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_policy: Option<TokenPolicy>,
}

impl TestPlan {
    /// Loads and validates a JSON plan file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parses and validates a JSON plan document
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let file: PlanFile = serde_json::from_str(raw)?;
        if file.api.host.trim().is_empty() {
            return Err(ConfigError::InvalidApi("host must not be empty".into()));
        }
        let plan = TestPlan {
            api_base_url: file.api.base_url(),
            execution_mode: file.mode,
            routes: file.routes,
            token_policy: file.token,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Checks the invariants the orchestrator relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.is_empty() {
            return Err(ConfigError::InvalidApi("base URL must not be empty".into()));
        }

        if self.routes.is_empty() {
            return Err(ConfigError::InvalidPlan(
                "plan must contain at least one route".into(),
            ));
        }

        for route in &self.routes {
            validate_route(route)?;
        }

        if let Some(policy) = &self.token_policy {
            if policy.enabled {
                if !policy.refresh_path.starts_with('/') {
                    return Err(ConfigError::InvalidTokenPolicy(
                        "refresh_path must start with '/'".into(),
                    ));
                }
                if policy.refresh_interval_ms == 0 {
                    return Err(ConfigError::InvalidTokenPolicy(
                        "refresh_interval_ms must be at least 1".into(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Routes that will actually run
    pub fn enabled_routes(&self) -> impl Iterator<Item = &RouteSpec> {
        self.routes.iter().filter(|route| route.enabled)
    }
}

fn validate_route(route: &RouteSpec) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidRoute {
        path: route.path.clone(),
        reason: reason.into(),
    };

    if !route.path.starts_with('/') {
        return Err(invalid("path must start with '/'"));
    }
    if route.max_requests == 0 {
        return Err(invalid("max_requests must be at least 1"));
    }
    if route.max_duration_seconds == 0 {
        return Err(invalid("max_duration_seconds must be at least 1"));
    }
    if route.concurrency == 0 {
        return Err(invalid("concurrency must be at least 1"));
    }
    if route.requests_per_second == 0 {
        return Err(invalid("requests_per_second must be at least 1"));
    }

    Ok(())
}

/// Plan loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Plan file could not be read
    #[error("failed to read plan file {path}: {source}")]
    Io {
        /// Path of the file that failed to load
        path: String,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Plan document is not valid JSON or does not match the schema
    #[error("failed to parse plan: {0}")]
    Parse(#[from] serde_json::Error),

    /// Invalid API target
    #[error("invalid api target: {0}")]
    InvalidApi(String),

    /// Invalid token policy
    #[error("invalid token policy: {0}")]
    InvalidTokenPolicy(String),

    /// A route failed validation
    #[error("invalid route `{path}`: {reason}")]
    InvalidRoute {
        /// Path of the offending route
        path: String,
        /// Which invariant was violated
        reason: String,
    },

    /// Plan-level structural problem
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// A required orchestrator collaborator was not supplied
    #[error("missing component: {0}")]
    MissingComponent(String),

    /// A default collaborator could not be constructed
    #[error("failed to initialize {component}: {reason}")]
    InitFailed {
        /// Which collaborator failed
        component: String,
        /// Underlying failure
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan_json() -> String {
        r#"{
            "api": { "protocol": "http", "host": "localhost", "port": 8080 },
            "mode": "sequential",
            "routes": [
                {
                    "enabled": true,
                    "method": "get",
                    "path": "/ping",
                    "max_requests": 100,
                    "max_duration_seconds": 10,
                    "concurrency": 4,
                    "requests_per_second": 50
                }
            ]
        }"#
        .to_string()
    }

    fn sample_route() -> RouteSpec {
        RouteSpec {
            enabled: true,
            method: HttpMethod::Get,
            path: "/ping".to_string(),
            timeout_ms: 3_000,
            max_requests: 100,
            max_duration_seconds: 10,
            concurrency: 4,
            requests_per_second: 50,
            headers: BTreeMap::new(),
            body: serde_json::Map::new(),
            cookies: Vec::new(),
            content_type: "text/plain".to_string(),
        }
    }

    #[test]
    fn test_parse_applies_defaults() {
        let plan = TestPlan::from_json(&sample_plan_json()).unwrap();
        assert_eq!(plan.api_base_url, "http://localhost:8080");
        assert_eq!(plan.execution_mode, ExecutionMode::Sequential);
        assert!(plan.token_policy.is_none());

        let route = &plan.routes[0];
        assert_eq!(route.timeout_ms, 3_000);
        assert_eq!(route.content_type, "text/plain");
        assert!(route.headers.is_empty());
        assert!(route.body.is_empty());
        assert!(route.cookies.is_empty());
    }

    #[test]
    fn test_base_url_without_port() {
        let target = ApiTarget {
            protocol: Protocol::Https,
            host: "api.example.com".to_string(),
            port: None,
        };
        assert_eq!(target.base_url(), "https://api.example.com");
    }

    #[test]
    fn test_rejects_unknown_method() {
        let raw = sample_plan_json().replace("\"get\"", "\"delete\"");
        assert!(matches!(
            TestPlan::from_json(&raw),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_empty_routes() {
        let plan = TestPlan {
            api_base_url: "http://localhost".to_string(),
            execution_mode: ExecutionMode::Sequential,
            routes: Vec::new(),
            token_policy: None,
        };
        assert!(matches!(
            plan.validate(),
            Err(ConfigError::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_rejects_blank_host() {
        let raw = sample_plan_json().replace("\"localhost\"", "\"  \"");
        assert!(matches!(
            TestPlan::from_json(&raw),
            Err(ConfigError::InvalidApi(_))
        ));
    }

    #[test]
    fn test_rejects_empty_base_url() {
        let plan = TestPlan {
            api_base_url: String::new(),
            execution_mode: ExecutionMode::Sequential,
            routes: vec![sample_route()],
            token_policy: None,
        };
        assert!(matches!(
            plan.validate(),
            Err(ConfigError::InvalidApi(_))
        ));
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut route = sample_route();
        route.concurrency = 0;
        let err = validate_route(&route).unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_rejects_relative_path() {
        let mut route = sample_route();
        route.path = "ping".to_string();
        assert!(validate_route(&route).is_err());
    }

    #[test]
    fn test_rejects_enabled_token_policy_without_path() {
        let plan = TestPlan {
            api_base_url: "http://localhost".to_string(),
            execution_mode: ExecutionMode::Sequential,
            routes: vec![sample_route()],
            token_policy: Some(TokenPolicy {
                enabled: true,
                refresh_path: String::new(),
                refresh_interval_ms: 1_000,
            }),
        };
        assert!(matches!(
            plan.validate(),
            Err(ConfigError::InvalidTokenPolicy(_))
        ));
    }

    #[test]
    fn test_disabled_token_policy_skips_checks() {
        let plan = TestPlan {
            api_base_url: "http://localhost".to_string(),
            execution_mode: ExecutionMode::Concurrent,
            routes: vec![sample_route()],
            token_policy: Some(TokenPolicy {
                enabled: false,
                refresh_path: String::new(),
                refresh_interval_ms: 1_000,
            }),
        };
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_token_interval_defaults() {
        let raw = r#"{ "enabled": true, "refresh_path": "/auth/token" }"#;
        let policy: TokenPolicy = serde_json::from_str(raw).unwrap();
        assert_eq!(policy.refresh_interval_ms, 30_000);
    }

    #[test]
    fn test_enabled_routes_filters_disabled() {
        let mut disabled = sample_route();
        disabled.enabled = false;
        disabled.path = "/other".to_string();
        let plan = TestPlan {
            api_base_url: "http://localhost".to_string(),
            execution_mode: ExecutionMode::Sequential,
            routes: vec![sample_route(), disabled],
            token_policy: None,
        };
        let paths: Vec<_> = plan.enabled_routes().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/ping"]);
    }
}
