//! W3C WebDriver browser automation

use std::str::FromStr;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::blocking::Client;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use storyline_core::{Action, BrowserDriver, Error, Result, SessionProvider};
use tracing::{debug, info};

use crate::error::E2eResult;
use crate::http::join_url;

/// Key under which W3C WebDriver returns element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52f-4a7ab3372c2d";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }

    /// `browserName` capability understood by the matching driver
    fn browser_name(&self) -> &'static str {
        match self {
            Browser::Chromium => "chrome",
            Browser::Firefox => "firefox",
            Browser::Webkit => "safari",
        }
    }
}

impl FromStr for Browser {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(format!("unknown browser: {other}")),
        }
    }
}

/// WebDriver configuration
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// WebDriver server, e.g. chromedriver or a Selenium grid
    pub endpoint: String,

    /// Base URL of the application under test
    pub base_url: String,

    pub browser: Browser,

    pub headless: bool,

    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Per-command timeout
    pub command_timeout: Duration,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:4444".to_string(),
            base_url: "http://127.0.0.1:8080".to_string(),
            browser: Browser::default(),
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            command_timeout: Duration::from_secs(30),
        }
    }
}

impl WebDriverConfig {
    /// New-session payload for the configured browser
    pub fn capabilities(&self) -> Value {
        let (w, h) = (self.viewport_width, self.viewport_height);
        let mut always_match = json!({ "browserName": self.browser.browser_name() });

        match self.browser {
            Browser::Chromium => {
                let mut args = vec![format!("--window-size={w},{h}")];
                if self.headless {
                    args.push("--headless=new".to_string());
                }
                always_match["goog:chromeOptions"] = json!({ "args": args });
            }
            Browser::Firefox => {
                let mut args = vec![format!("--width={w}"), format!("--height={h}")];
                if self.headless {
                    args.push("-headless".to_string());
                }
                always_match["moz:firefoxOptions"] = json!({ "args": args });
            }
            Browser::Webkit => {}
        }

        json!({ "capabilities": { "alwaysMatch": always_match } })
    }
}

/// Opens one WebDriver session per test run
pub struct WebDriverProvider {
    config: WebDriverConfig,
    client: Client,
}

impl WebDriverProvider {
    pub fn new(config: WebDriverConfig) -> E2eResult<Self> {
        let client = Client::builder().timeout(config.command_timeout).build()?;
        Ok(Self { config, client })
    }
}

impl SessionProvider for WebDriverProvider {
    fn open_session(&mut self) -> Result<Box<dyn BrowserDriver>> {
        let endpoint = self.config.endpoint.trim_end_matches('/').to_string();
        info!("Opening {} session at {}", self.config.browser.as_str(), endpoint);

        let response = self
            .client
            .post(format!("{endpoint}/session"))
            .json(&self.config.capabilities())
            .send()
            .map_err(|e| Error::SessionStartup(e.to_string()))?;
        let body: Value = response.json().map_err(|e| Error::SessionStartup(e.to_string()))?;

        if let Some(message) = protocol_error(&body) {
            return Err(Error::SessionStartup(message));
        }
        let session_id = body["value"]["sessionId"]
            .as_str()
            .ok_or_else(|| Error::SessionStartup("response carried no sessionId".to_string()))?
            .to_string();
        debug!("WebDriver session {} opened", session_id);

        Ok(Box::new(WebDriverSession {
            client: self.client.clone(),
            session_url: format!("{endpoint}/session/{session_id}"),
            base_url: self.config.base_url.clone(),
        }))
    }
}

/// One live WebDriver session
pub struct WebDriverSession {
    client: Client,
    session_url: String,
    base_url: String,
}

impl WebDriverSession {
    fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let mut request = self.client.request(method, format!("{}{}", self.session_url, path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().map_err(|e| Error::Browser(e.to_string()))?;
        let payload: Value = response.json().map_err(|e| Error::Browser(e.to_string()))?;

        match protocol_error(&payload) {
            Some(message) => Err(Error::Browser(message)),
            None => Ok(payload["value"].clone()),
        }
    }

    fn find_element(&self, selector: &str) -> Result<String> {
        let value = self.command(
            Method::POST,
            "/element",
            Some(json!({ "using": "css selector", "value": selector })),
        )?;
        element_id(&value).ok_or_else(|| Error::Browser(format!("no element reference for {selector}")))
    }

    fn perform(&self, selector: &str, action: &Action) -> Result<()> {
        let element = format!("/element/{}", self.find_element(selector)?);
        match action {
            Action::Click => self.command(Method::POST, &format!("{element}/click"), Some(json!({})))?,
            Action::Clear => self.command(Method::POST, &format!("{element}/clear"), Some(json!({})))?,
            Action::Fill(text) => {
                self.command(Method::POST, &format!("{element}/clear"), Some(json!({})))?;
                self.command(Method::POST, &format!("{element}/value"), Some(json!({ "text": text })))?
            }
            Action::Press(key) => self.command(
                Method::POST,
                &format!("{element}/value"),
                Some(json!({ "text": key_code(key) })),
            )?,
        };
        Ok(())
    }
}

impl BrowserDriver for WebDriverSession {
    fn navigate(&mut self, url: &str) -> Result<()> {
        let target = join_url(&self.base_url, url);
        debug!("navigate {}", target);
        self.command(Method::POST, "/url", Some(json!({ "url": target })))?;
        Ok(())
    }

    fn interact(&mut self, selector: &str, action: &Action) -> Result<()> {
        debug!("{} {}", action.verb(), selector);
        self.perform(selector, action).map_err(|e| Error::Interaction {
            selector: selector.to_string(),
            reason: e.to_string(),
        })
    }

    fn screenshot(&mut self) -> Result<Vec<u8>> {
        let value = self
            .command(Method::GET, "/screenshot", None)
            .map_err(|e| Error::Screenshot(e.to_string()))?;
        let encoded = value
            .as_str()
            .ok_or_else(|| Error::Screenshot("screenshot value is not a string".to_string()))?;
        STANDARD.decode(encoded).map_err(|e| Error::Screenshot(e.to_string()))
    }

    fn close(&mut self) -> Result<()> {
        self.command(Method::DELETE, "", None)?;
        Ok(())
    }
}

/// `error: message` from a W3C error payload
fn protocol_error(payload: &Value) -> Option<String> {
    let error = payload["value"]["error"].as_str()?;
    let message = payload["value"]["message"].as_str().unwrap_or("");
    Some(format!("{error}: {message}"))
}

fn element_id(value: &Value) -> Option<String> {
    value[ELEMENT_KEY].as_str().map(str::to_string)
}

/// WebDriver key codepoints for named keys; anything else is typed as text
fn key_code(key: &str) -> String {
    let code = match key {
        "Enter" => '\u{E007}',
        "Tab" => '\u{E004}',
        "Escape" => '\u{E00C}',
        "Backspace" => '\u{E003}',
        "Delete" => '\u{E017}',
        "ArrowUp" => '\u{E013}',
        "ArrowDown" => '\u{E015}',
        "ArrowLeft" => '\u{E012}',
        "ArrowRight" => '\u{E014}',
        _ => return key.to_string(),
    };
    code.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_chromium_capabilities() {
        let config = WebDriverConfig::default();
        let caps = config.capabilities();
        let always = &caps["capabilities"]["alwaysMatch"];
        assert_eq!(always["browserName"], "chrome");
        let args: Vec<&str> = always["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(args, vec!["--window-size=1280,720", "--headless=new"]);
    }

    #[test]
    fn test_firefox_headed_capabilities() {
        let config = WebDriverConfig {
            browser: Browser::Firefox,
            headless: false,
            ..Default::default()
        };
        let caps = config.capabilities();
        let args = &caps["capabilities"]["alwaysMatch"]["moz:firefoxOptions"]["args"];
        assert_eq!(args.as_array().unwrap().len(), 2);
    }

    #[test_case("chromium", Browser::Chromium)]
    #[test_case("Firefox", Browser::Firefox)]
    #[test_case("safari", Browser::Webkit)]
    fn test_browser_from_str(input: &str, expected: Browser) {
        assert_eq!(input.parse::<Browser>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_browser_is_rejected() {
        assert!("netscape".parse::<Browser>().is_err());
    }

    #[test]
    fn test_protocol_error_is_extracted() {
        let payload = json!({"value": {"error": "no such element", "message": "#missing", "stacktrace": ""}});
        assert_eq!(protocol_error(&payload).as_deref(), Some("no such element: #missing"));
        assert!(protocol_error(&json!({"value": null})).is_none());
    }

    #[test]
    fn test_element_reference_is_read() {
        let value = json!({ ELEMENT_KEY: "abc-123" });
        assert_eq!(element_id(&value).as_deref(), Some("abc-123"));
        assert!(element_id(&json!({})).is_none());
    }

    #[test_case("Enter", "\u{E007}")]
    #[test_case("Tab", "\u{E004}")]
    #[test_case("x", "x")]
    fn test_key_code(key: &str, expected: &str) {
        assert_eq!(key_code(key), expected);
    }

    #[test]
    fn test_unreachable_endpoint_is_startup_error() {
        let mut provider = WebDriverProvider::new(WebDriverConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            command_timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(provider.open_session(), Err(Error::SessionStartup(_))));
    }
}
