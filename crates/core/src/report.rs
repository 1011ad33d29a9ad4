//! JSON report files, one per test run

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifact::slugify;
use crate::config::StorylineConfig;
use crate::error::Result;
use crate::model::{ApiCallRecord, FailureDetail, Step, StepStatus, TestRun, TestRunStatus};

/// Result vocabulary understood by the HTML aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportResult {
    Success,
    Failure,
    Pending,
    Skipped,
}

impl From<TestRunStatus> for ReportResult {
    fn from(status: TestRunStatus) -> Self {
        match status {
            TestRunStatus::Running => ReportResult::Pending,
            TestRunStatus::Passed => ReportResult::Success,
            TestRunStatus::Failed => ReportResult::Failure,
        }
    }
}

impl From<StepStatus> for ReportResult {
    fn from(status: StepStatus) -> Self {
        match status {
            StepStatus::NotStarted => ReportResult::Skipped,
            StepStatus::Running => ReportResult::Pending,
            StepStatus::Passed => ReportResult::Success,
            StepStatus::Failed | StepStatus::Aborted => ReportResult::Failure,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub run_id: String,
    pub test_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub start_time: String,
    /// Milliseconds
    pub duration: u64,
    pub result: ReportResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_failure_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_failure_trace: Option<String>,
    pub test_steps: Vec<StepReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    /// 1-based, depth-first
    pub number: usize,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    pub duration: u64,
    pub result: ReportResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub screenshots: Vec<ScreenshotRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest_query: Option<ApiCallRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<FailureDetail>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StepReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotRef {
    pub screenshot: String,
    pub time_stamp: i64,
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl TestReport {
    pub fn from_run(run: &TestRun) -> Self {
        let mut number = 0;
        Self {
            run_id: run.run_id.to_string(),
            test_id: run.meta.id.clone(),
            title: run.meta.title.clone(),
            story: run.meta.story.clone(),
            feature: run.meta.feature.clone(),
            tags: run.meta.tags.clone(),
            start_time: run.started_at.to_rfc3339(),
            duration: run.duration_ms(),
            result: run.status.into(),
            test_failure_message: run.failure.as_ref().map(|f| f.message.clone()),
            test_failure_trace: run.failure.as_ref().and_then(|f| f.trace.clone()),
            test_steps: run.steps.iter().map(|step| step_report(step, &mut number)).collect(),
        }
    }
}

fn step_report(step: &Step, number: &mut usize) -> StepReport {
    *number += 1;
    let own_number = *number;
    let screenshots: Vec<ScreenshotRef> = step
        .screenshots()
        .map(|shot| ScreenshotRef {
            screenshot: shot.filename.clone(),
            time_stamp: shot.timestamp.timestamp_millis(),
            sha256: shot.sha256.clone(),
            width: shot.dimensions.map(|(w, _)| w),
            height: shot.dimensions.map(|(_, h)| h),
        })
        .collect();

    StepReport {
        number: own_number,
        description: step.description.clone(),
        start_time: step.started_at.map(|t| t.to_rfc3339()),
        duration: step.duration_ms(),
        result: step.status.into(),
        screenshot: screenshots.first().map(|s| s.screenshot.clone()),
        screenshots,
        rest_query: step.api_calls().next().cloned(),
        exception: step.failure.clone(),
        children: step.children.iter().map(|child| step_report(child, number)).collect(),
    }
}

/// Persists completed test runs
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
    persist_screenshots: bool,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            persist_screenshots: true,
        }
    }

    pub fn from_config(config: &StorylineConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            persist_screenshots: config.screenshots.persist,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Deterministic report location for a test id
    pub fn report_path(&self, test_id: &str) -> PathBuf {
        self.output_dir.join(format!("{}.json", slugify(test_id)))
    }

    /// Write a run, logging instead of failing on error
    pub fn write(&self, run: &TestRun) -> Option<PathBuf> {
        match self.try_write(run) {
            Ok(path) => {
                info!("Report written to: {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Report for '{}' was not written: {}", run.meta.title, e);
                None
            }
        }
    }

    /// Write a run, replacing any earlier report for the same test id
    pub fn try_write(&self, run: &TestRun) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.report_path(&run.meta.id);
        let json = serde_json::to_string_pretty(&TestReport::from_run(run))?;
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, json)?;
        std::fs::rename(&staging, &path)?;

        if self.persist_screenshots {
            for step in &run.steps {
                self.write_screenshots(step);
            }
        }
        Ok(path)
    }

    fn write_screenshots(&self, step: &Step) {
        for shot in step.screenshots() {
            let path = self.output_dir.join(&shot.filename);
            if let Err(e) = std::fs::write(&path, &shot.bytes) {
                warn!("Screenshot {} was not written: {}", path.display(), e);
            }
        }
        for child in &step.children {
            self.write_screenshots(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Artifact, FailureKind, Screenshot, TestMeta};
    use test_case::test_case;

    fn sample_run() -> TestRun {
        let mut run = TestRun::start(TestMeta::new("Create Event").story("Tournaments"));
        let mut parent = Step::new("open form");
        parent.start();
        parent.artifacts.push(Artifact::Screenshot(Screenshot {
            filename: "open-form-before-1-0.png".to_string(),
            bytes: vec![1, 2, 3],
            timestamp: chrono::Utc::now(),
            sha256: "abc".to_string(),
            dimensions: Some((10, 20)),
        }));
        let mut child = Step::new("submit");
        child.start();
        child.finish(
            StepStatus::Failed,
            Some(FailureDetail::new(FailureKind::Assertion, "1 assertion failure(s)")),
        );
        parent.children.push(child);
        parent.finish(StepStatus::Passed, None);
        let mut sibling = Step::new("logout");
        sibling.start();
        sibling.finish(StepStatus::Aborted, None);
        run.steps = vec![parent, sibling];
        run.status = TestRunStatus::Failed;
        run.failure = Some(FailureDetail::new(FailureKind::Assertion, "1 assertion failure(s)"));
        run.finished_at = Some(chrono::Utc::now());
        run
    }

    #[test_case(StepStatus::NotStarted, ReportResult::Skipped)]
    #[test_case(StepStatus::Running, ReportResult::Pending)]
    #[test_case(StepStatus::Passed, ReportResult::Success)]
    #[test_case(StepStatus::Failed, ReportResult::Failure)]
    #[test_case(StepStatus::Aborted, ReportResult::Failure)]
    fn test_step_status_mapping(status: StepStatus, expected: ReportResult) {
        assert_eq!(ReportResult::from(status), expected);
    }

    #[test]
    fn test_report_numbers_steps_depth_first() {
        let report = TestReport::from_run(&sample_run());
        assert_eq!(report.result, ReportResult::Failure);
        assert_eq!(report.test_steps[0].number, 1);
        assert_eq!(report.test_steps[0].children[0].number, 2);
        assert_eq!(report.test_steps[1].number, 3);
        assert_eq!(report.test_steps[0].screenshot.as_deref(), Some("open-form-before-1-0.png"));
        assert_eq!(report.test_steps[0].screenshots[0].width, Some(10));
    }

    #[test]
    fn test_report_uses_aggregator_field_names() {
        let value = serde_json::to_value(TestReport::from_run(&sample_run())).unwrap();
        assert_eq!(value["title"], "Create Event");
        assert_eq!(value["result"], "FAILURE");
        assert!(value["duration"].is_u64());
        assert_eq!(value["testSteps"][0]["description"], "open form");
        assert_eq!(value["testSteps"][0]["screenshot"], "open-form-before-1-0.png");
        assert!(value["testSteps"][1].get("restQuery").is_none());
    }

    #[test]
    fn test_write_overwrites_and_persists_screenshots() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path());
        let run = sample_run();

        let first = writer.try_write(&run).unwrap();
        let second = writer.try_write(&run).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, dir.path().join("create-event.json"));
        assert!(!dir.path().join("create-event.json.tmp").exists());
        assert_eq!(std::fs::read(dir.path().join("open-form-before-1-0.png")).unwrap(), vec![1, 2, 3]);

        let parsed: TestReport = serde_json::from_str(&std::fs::read_to_string(&first).unwrap()).unwrap();
        assert_eq!(parsed.title, "Create Event");
        assert_eq!(parsed.test_steps.len(), 2);
    }

    #[test]
    fn test_write_failure_is_logged_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let writer = ReportWriter::new(&blocker);
        assert!(writer.write(&sample_run()).is_none());
    }
}
