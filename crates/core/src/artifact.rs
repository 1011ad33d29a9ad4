//! Artifact store: screenshots and HTTP call records

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::driver::{ApiRequest, ApiResponse, BrowserDriver};
use crate::model::{ApiCallRecord, Artifact, Screenshot};

/// Process-wide screenshot sequence. Keeps filenames unique even for equal
/// labels captured within the same millisecond.
static SCREENSHOT_SEQ: AtomicU64 = AtomicU64::new(0);

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static slug pattern"));

const REDACTED: &str = "***";

/// Lowercase, dash-separated form of a label, safe for filenames
pub fn slugify(label: &str) -> String {
    let lowered = label.to_ascii_lowercase();
    let slug = NON_ALNUM.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "step".to_string()
    } else {
        slug.to_string()
    }
}

/// Next unique screenshot filename for a label
pub fn screenshot_filename(label: &str, unix_millis: i64) -> String {
    let seq = SCREENSHOT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}.png", slugify(label), unix_millis, seq)
}

/// Creates artifact records for the step tree
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    /// Lowercased header names whose values are masked in API records
    redact_headers: Vec<String>,
}

impl ArtifactStore {
    pub fn new(redact_headers: &[String]) -> Self {
        Self {
            redact_headers: redact_headers.iter().map(|h| h.to_ascii_lowercase()).collect(),
        }
    }

    /// Capture the browser viewport.
    ///
    /// Capture is best effort: a driver failure is logged and yields `None`
    /// so the enclosing step is unaffected.
    pub fn capture_screenshot(&self, driver: &mut dyn BrowserDriver, label: &str) -> Option<Artifact> {
        let bytes = match driver.screenshot() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Screenshot '{}' skipped: {}", label, e);
                return None;
            }
        };

        let timestamp = Utc::now();
        let filename = screenshot_filename(label, timestamp.timestamp_millis());
        debug!("Captured screenshot {} ({} bytes)", filename, bytes.len());

        Some(Artifact::Screenshot(Screenshot {
            sha256: hash_bytes(&bytes),
            dimensions: image_dimensions(&bytes),
            filename,
            bytes,
            timestamp,
        }))
    }

    /// Turn a completed request/response pair into an artifact
    pub fn record_api_call(&self, request: &ApiRequest, response: &ApiResponse, duration_ms: u64) -> Artifact {
        Artifact::ApiCall(ApiCallRecord {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: self.redact(&request.headers),
            request_body: request.body.clone(),
            status: response.status,
            response_body: response.body.clone(),
            duration_ms,
        })
    }

    fn redact(&self, headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| {
                if self.redact_headers.contains(&name.to_ascii_lowercase()) {
                    (name.clone(), REDACTED.to_string())
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect()
    }
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new(&crate::config::ApiConfig::default().redact_headers)
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
