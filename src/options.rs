//! Resolved request options and the route-to-options builder

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{HttpMethod, RouteSpec};

/// Header name the refreshed token is injected under
pub const AUTH_HEADER: &str = "authorization";

/// Fully resolved parameters for one load job
///
/// Carries everything a load engine needs: the absolute URL plus the
/// route's load parameters, with the auth token already merged into the
/// header map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Absolute request URL
    pub url: String,
    /// HTTP method
    pub method: HttpMethod,
    /// Per-request timeout in milliseconds, 0 disables the timeout
    pub timeout_ms: u64,
    /// Total number of requests to send
    pub max_requests: u64,
    /// Wall-clock cap on the job in seconds
    pub max_duration_seconds: u64,
    /// Number of simultaneous connections
    pub concurrency: usize,
    /// Request rate across all connections
    pub requests_per_second: u32,
    /// Request headers, including any injected token
    pub headers: BTreeMap<String, String>,
    /// JSON body sent with POST and PATCH requests
    pub body: serde_json::Map<String, serde_json::Value>,
    /// Cookie strings joined into a single cookie header
    pub cookies: Vec<String>,
    /// Value of the content-type header
    pub content_type: String,
}

/// Resolves a route against the API base URL and the current token.
///
/// Pure: the route and token are only read. When a token is present it is
/// injected as a bearer authorization header into a copy of the route's
/// header map, replacing any configured authorization header.
pub fn build_options(route: &RouteSpec, api_base_url: &str, token: Option<&str>) -> LoadOptions {
    let mut headers = route.headers.clone();
    if let Some(token) = token {
        headers.retain(|name, _| !name.eq_ignore_ascii_case(AUTH_HEADER));
        headers.insert(AUTH_HEADER.to_string(), format!("Bearer {}", token));
    }

    LoadOptions {
        url: format!("{}{}", api_base_url, route.path),
        method: route.method,
        timeout_ms: route.timeout_ms,
        max_requests: route.max_requests,
        max_duration_seconds: route.max_duration_seconds,
        concurrency: route.concurrency,
        requests_per_second: route.requests_per_second,
        headers,
        body: route.body.clone(),
        cookies: route.cookies.clone(),
        content_type: route.content_type.clone(),
    }
}
