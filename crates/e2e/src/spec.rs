//! Declarative YAML test specification

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use storyline_core::{ApiRequest, TestMeta};

use crate::error::{E2eError, E2eResult};

/// A complete test specification parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique name for this test
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// User story the test narrates
    #[serde(default)]
    pub story: Option<String>,

    #[serde(default)]
    pub feature: Option<String>,

    /// Tags for filtering tests
    #[serde(default)]
    pub tags: Vec<String>,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,
}

/// A single step in a test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a URL (relative to base)
    Navigate { url: String },

    /// Click an element
    Click { selector: String },

    /// Fill an input field, replacing its content
    Fill { selector: String, value: String },

    /// Press a key inside an element
    Press { selector: String, key: String },

    /// Take a screenshot
    Screenshot { name: String },

    /// Call the API and check the response without stopping the test
    Request {
        #[serde(default = "default_method")]
        method: String,
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default)]
        json: Option<serde_json::Value>,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        expect_status: Option<u16>,
        #[serde(default)]
        expect_body_contains: Option<String>,
    },

    /// Nested steps reported under one description
    Group { description: String, steps: Vec<TestStep> },

    /// Log a message (for debugging)
    Log { message: String },
}

fn default_method() -> String {
    "GET".to_string()
}

impl TestStep {
    /// Step description as it appears in the report
    pub fn describe(&self) -> String {
        match self {
            TestStep::Navigate { url } => format!("navigate to {url}"),
            TestStep::Click { selector } => format!("click {selector}"),
            TestStep::Fill { selector, value } => format!("fill {selector} with '{value}'"),
            TestStep::Press { selector, key } => format!("press {key} in {selector}"),
            TestStep::Screenshot { name } => format!("screenshot {name}"),
            TestStep::Request { method, url, .. } => format!("{} {}", method.to_ascii_uppercase(), url),
            TestStep::Group { description, .. } => description.clone(),
            TestStep::Log { message } => message.clone(),
        }
    }

    /// Engine request for a `request` step
    pub fn api_request(&self) -> Option<ApiRequest> {
        let TestStep::Request {
            method,
            url,
            headers,
            json,
            body,
            ..
        } = self
        else {
            return None;
        };

        let mut request = ApiRequest::new(method.as_str(), url.as_str());
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(json) = json {
            request = request.json(json);
        } else if let Some(body) = body {
            request = request.body(body.as_str());
        }
        Some(request)
    }
}

impl TestSpec {
    /// Parse a test spec from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a test spec from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all test specs from a directory, in path order
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let spec = Self::from_file(entry.path())?;
            specs.push(spec);
        }

        Ok(specs)
    }

    /// Filter specs by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    /// Report metadata for this spec
    pub fn meta(&self) -> TestMeta {
        let title = if self.description.is_empty() {
            self.name.clone()
        } else {
            self.description.clone()
        };
        let mut meta = TestMeta::new(title).with_id(self.name.as_str());
        meta.story = self.story.clone();
        meta.feature = self.feature.clone();
        meta.tags = self.tags.clone();
        meta
    }

    fn validate(&self) -> E2eResult<()> {
        if self.steps.is_empty() {
            return Err(E2eError::SpecParse(format!("'{}' has no steps", self.name)));
        }
        if let Some(description) = empty_group(&self.steps) {
            return Err(E2eError::SpecParse(format!(
                "'{}': group '{}' has no steps",
                self.name, description
            )));
        }
        Ok(())
    }
}

fn empty_group(steps: &[TestStep]) -> Option<&str> {
    steps.iter().find_map(|step| match step {
        TestStep::Group { description, steps } if steps.is_empty() => Some(description.as_str()),
        TestStep::Group { steps, .. } => empty_group(steps),
        _ => None,
    })
}
