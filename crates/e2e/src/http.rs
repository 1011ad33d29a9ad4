//! Blocking HTTP client for API steps

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::{Client, Request};
use reqwest::Method;
use storyline_core::{ApiRequest, ApiResponse, Error, HttpClient, Result};
use tracing::{debug, warn};

use crate::error::E2eResult;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// `HttpClient` backed by `reqwest::blocking`
pub struct ReqwestClient {
    client: Client,
    base_url: Option<String>,
    timeout: Duration,
}

impl ReqwestClient {
    pub fn new() -> E2eResult<Self> {
        Ok(Self {
            client: build_client(DEFAULT_TIMEOUT)?,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Resolve relative request URLs against `base_url`
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> E2eResult<Self> {
        self.client = build_client(timeout)?;
        self.timeout = timeout;
        Ok(self)
    }

    pub fn resolve(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) => join_url(base, url),
            None => url.to_string(),
        }
    }

    /// Translate an engine request into a reqwest request
    pub fn build_request(&self, request: &ApiRequest) -> Result<Request> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::Http(format!("invalid method: {}", request.method)))?;

        let mut builder = self.client.request(method, self.resolve(&request.url));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        builder.build().map_err(|e| Error::Http(e.to_string()))
    }
}

impl HttpClient for ReqwestClient {
    fn execute(&mut self, request: &ApiRequest) -> Result<ApiResponse> {
        let built = self.build_request(request)?;
        let response = self
            .client
            .execute(built)
            .map_err(|e| Error::Http(format!("{} {}: {}", request.method, request.url, e)))?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
            .collect();
        let body = response.text().map_err(|e| Error::Http(e.to_string()))?;

        Ok(ApiResponse { status, headers, body })
    }

    fn reset(&mut self) {
        match build_client(self.timeout) {
            Ok(client) => {
                debug!("HTTP client rebuilt");
                self.client = client;
            }
            Err(e) => warn!("HTTP client could not be rebuilt, keeping the old one: {}", e),
        }
    }
}

fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().timeout(timeout).build()
}

/// Join a possibly relative URL onto a base URL
pub(crate) fn join_url(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("http://localhost:8080", "/api/events", "http://localhost:8080/api/events")]
    #[test_case("http://localhost:8080/", "api/events", "http://localhost:8080/api/events")]
    #[test_case("http://localhost:8080", "https://other.host/x", "https://other.host/x")]
    fn test_join_url(base: &str, url: &str, expected: &str) {
        assert_eq!(join_url(base, url), expected);
    }

    #[test]
    fn test_build_request_resolves_and_copies_fields() {
        let client = ReqwestClient::new().unwrap().with_base_url("http://localhost:8080");
        let request = ApiRequest::post("/api/events")
            .header("X-Authorization", "Bearer token")
            .json(&serde_json::json!({"name": "Spring Open"}));

        let built = client.build_request(&request).unwrap();
        assert_eq!(built.method(), Method::POST);
        assert_eq!(built.url().as_str(), "http://localhost:8080/api/events");
        assert_eq!(built.headers()["x-authorization"], "Bearer token");
        assert_eq!(built.headers()["content-type"], "application/json");
        assert_eq!(
            built.body().and_then(|b| b.as_bytes()),
            Some(br#"{"name":"Spring Open"}"#.as_slice())
        );
    }

    #[test]
    fn test_invalid_method_is_rejected() {
        let client = ReqwestClient::new().unwrap();
        let request = ApiRequest::new("NOT A METHOD", "http://localhost/");
        assert!(matches!(client.build_request(&request), Err(Error::Http(_))));
    }

    #[test]
    fn test_reset_keeps_client_usable() {
        let mut client = ReqwestClient::new().unwrap().with_base_url("http://localhost:1");
        client.reset();
        assert!(client.build_request(&ApiRequest::get("/health")).is_ok());
    }
}
