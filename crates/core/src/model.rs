//! Step, artifact and test-run data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::artifact::slugify;

/// Lifecycle of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotStarted,
    Running,
    Passed,
    Failed,
    Aborted,
}

impl StepStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, StepStatus::Passed | StepStatus::Failed | StepStatus::Aborted)
    }
}

/// How a step or run came to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The body returned an error value
    Error,
    /// The body panicked
    Panic,
    /// One or more non-fatal assertions failed
    Assertion,
    /// Unwound because a nested step panicked
    Aborted,
}

/// Message and optional trace describing a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl FailureDetail {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            trace: None,
        }
    }

    /// Build a detail from an error value. The `Debug` rendering is kept as
    /// the trace when it carries more than the `Display` message.
    pub fn from_error<E: fmt::Display + fmt::Debug + ?Sized>(err: &E) -> Self {
        let message = err.to_string();
        let debug = format!("{err:?}");
        Self {
            kind: FailureKind::Error,
            trace: (debug != message).then_some(debug),
            message,
        }
    }
}

/// A named unit of narration with its own outcome and children
#[derive(Debug, Clone)]
pub struct Step {
    pub description: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Children in the order they were opened
    pub children: Vec<Step>,
    /// Artifacts in capture order
    pub artifacts: Vec<Artifact>,
    pub failure: Option<FailureDetail>,
}

impl Step {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: StepStatus::NotStarted,
            started_at: None,
            finished_at: None,
            children: Vec::new(),
            artifacts: Vec::new(),
            failure: None,
        }
    }

    pub(crate) fn start(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn finish(&mut self, status: StepStatus, failure: Option<FailureDetail>) {
        self.status = status;
        self.failure = failure;
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> u64 {
        elapsed_ms(self.started_at, self.finished_at)
    }

    pub fn screenshots(&self) -> impl Iterator<Item = &Screenshot> {
        self.artifacts.iter().filter_map(|artifact| match artifact {
            Artifact::Screenshot(shot) => Some(shot),
            Artifact::ApiCall(_) => None,
        })
    }

    pub fn api_calls(&self) -> impl Iterator<Item = &ApiCallRecord> {
        self.artifacts.iter().filter_map(|artifact| match artifact {
            Artifact::ApiCall(record) => Some(record),
            Artifact::Screenshot(_) => None,
        })
    }

    /// Depth-first search by description
    pub fn find(&self, description: &str) -> Option<&Step> {
        if self.description == description {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(description))
    }
}

/// Evidence attached to a step
#[derive(Debug, Clone)]
pub enum Artifact {
    Screenshot(Screenshot),
    ApiCall(ApiCallRecord),
}

#[derive(Debug, Clone)]
pub struct Screenshot {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    /// Hex SHA-256 of `bytes`
    pub sha256: String,
    /// Pixel size, when the bytes decode as an image
    pub dimensions: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallRecord {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    pub status: u16,
    pub response_body: String,
    pub duration_ms: u64,
}

/// Story/feature metadata identifying one test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMeta {
    /// Stable identifier; also names the report file
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub story: Option<String>,
    #[serde(default)]
    pub feature: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TestMeta {
    /// Metadata whose id is the slugified title
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: slugify(&title),
            title,
            story: None,
            feature: None,
            tags: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn story(mut self, story: impl Into<String>) -> Self {
        self.story = Some(story.into());
        self
    }

    pub fn feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestRunStatus {
    Running,
    Passed,
    Failed,
}

/// One complete execution of a test
#[derive(Debug, Clone)]
pub struct TestRun {
    /// Unique per execution
    pub run_id: Uuid,
    pub meta: TestMeta,
    pub status: TestRunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<Step>,
    pub failure: Option<FailureDetail>,
}

impl TestRun {
    pub(crate) fn start(meta: TestMeta) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            meta,
            status: TestRunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            steps: Vec::new(),
            failure: None,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        elapsed_ms(Some(self.started_at), self.finished_at)
    }

    /// Depth-first search across all top-level steps
    pub fn find_step(&self, description: &str) -> Option<&Step> {
        self.steps.iter().find_map(|step| step.find(description))
    }
}

fn elapsed_ms(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> u64 {
    match (start, end) {
        (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as u64,
        _ => 0,
    }
}
