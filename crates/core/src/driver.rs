//! Collaborator interfaces: browser driver, session provider and HTTP client
//!
//! The engine only ever calls these from inside scoped steps or the artifact
//! store. Concrete implementations live outside this crate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Browser automation driver for one session
pub trait BrowserDriver {
    /// Navigate the current page to a URL
    fn navigate(&mut self, url: &str) -> Result<()>;

    /// Perform an action against the element matching a CSS selector
    fn interact(&mut self, selector: &str, action: &Action) -> Result<()>;

    /// Capture the viewport as encoded image bytes (PNG)
    fn screenshot(&mut self) -> Result<Vec<u8>>;

    /// End the session. Called exactly once per test run.
    fn close(&mut self) -> Result<()>;
}

/// Acquires a fresh browser session at the start of each test run
pub trait SessionProvider {
    fn open_session(&mut self) -> Result<Box<dyn BrowserDriver>>;
}

impl<F> SessionProvider for F
where
    F: FnMut() -> Result<Box<dyn BrowserDriver>>,
{
    fn open_session(&mut self) -> Result<Box<dyn BrowserDriver>> {
        self()
    }
}

/// HTTP client used by API steps
pub trait HttpClient {
    fn execute(&mut self, request: &ApiRequest) -> Result<ApiResponse>;

    /// Drop any transient state (pooled connections, cookies, pending bodies).
    fn reset(&mut self);
}

/// Element interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Click,
    Fill(String),
    Clear,
    Press(String),
}

impl Action {
    pub fn verb(&self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::Fill(_) => "fill",
            Action::Clear => "clear",
            Action::Press(_) => "press",
        }
    }
}

/// Outgoing HTTP request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl ApiRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new("PUT", url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new("DELETE", url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a JSON body and the matching content type
    pub fn json(self, value: &serde_json::Value) -> Self {
        self.header("Content-Type", "application/json")
            .body(value.to_string())
    }
}

/// HTTP response as seen by the test
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_json_request_sets_content_type() {
        let request = ApiRequest::post("/events").json(&serde_json::json!({"name": "kata"}));
        assert_eq!(request.method, "POST");
        assert_eq!(request.headers.get("Content-Type").map(String::as_str), Some("application/json"));
        assert_eq!(request.body.as_deref(), Some(r#"{"name":"kata"}"#));
    }

    #[test]
    fn test_method_is_uppercased() {
        assert_eq!(ApiRequest::new("patch", "/x").method, "PATCH");
    }

    #[test_case(200, true)]
    #[test_case(204, true)]
    #[test_case(302, false)]
    #[test_case(404, false)]
    fn test_success_is_2xx(status: u16, expected: bool) {
        let response = ApiResponse {
            status,
            ..Default::default()
        };
        assert_eq!(response.is_success(), expected);
    }
}
