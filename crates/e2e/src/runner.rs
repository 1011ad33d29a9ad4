//! Main test runner that executes YAML specs through the reporting engine

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use storyline_core::{Action, Orchestrator, ReportWriter, RunContext};
use tracing::{debug, error, info};

use crate::error::{E2eError, E2eResult};
use crate::spec::{TestSpec, TestStep};

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub report_path: Option<PathBuf>,
}

/// Result of running all tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn from_results(results: Vec<TestResult>, duration_ms: u64) -> Self {
        let passed = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
            duration_ms,
            results,
        }
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub specs_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            specs_dir: PathBuf::from("crates/e2e/specs"),
            output_dir: PathBuf::from("target/storyline"),
        }
    }
}

/// Main E2E test runner
pub struct TestRunner {
    orchestrator: Orchestrator,

    /// Test specs directory
    specs_dir: PathBuf,

    /// Output directory for the suite summary
    output_dir: PathBuf,
}

impl TestRunner {
    pub fn new(orchestrator: Orchestrator, config: RunnerConfig) -> Self {
        Self {
            orchestrator,
            specs_dir: config.specs_dir,
            output_dir: config.output_dir,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Run all tests in the specs directory
    pub fn run_all(&mut self) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.specs_dir)?;
        Ok(self.run_specs(&specs))
    }

    /// Run tests matching a tag
    pub fn run_tagged(&mut self, tag: &str) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.specs_dir)?;
        let filtered: Vec<TestSpec> = TestSpec::filter_by_tag(&specs, tag).into_iter().cloned().collect();
        Ok(self.run_specs(&filtered))
    }

    /// Run a specific test by name
    pub fn run_test(&mut self, name: &str) -> E2eResult<TestResult> {
        let specs = TestSpec::load_all(&self.specs_dir)?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::TestNotFound(name.to_string()))?;

        Ok(self.run_spec(&spec))
    }

    /// Run a list of test specs; a failing spec never stops the suite
    pub fn run_specs(&mut self, specs: &[TestSpec]) -> TestSuiteResult {
        let start = Instant::now();
        info!("Running {} test(s)...", specs.len());

        let mut results = Vec::with_capacity(specs.len());
        for spec in specs {
            let result = self.run_spec(spec);
            if result.success {
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                let reason = result.error.as_deref().and_then(|e| e.lines().next()).unwrap_or("unknown error");
                error!("✗ {} - {}", result.name, reason);
            }
            results.push(result);
        }

        let suite = TestSuiteResult::from_results(results, start.elapsed().as_millis() as u64);
        info!("");
        info!(
            "Test Results: {} passed, {} failed ({} ms)",
            suite.passed, suite.failed, suite.duration_ms
        );
        suite
    }

    /// Run a single test spec
    pub fn run_spec(&mut self, spec: &TestSpec) -> TestResult {
        let start = Instant::now();
        debug!("Running test: {}", spec.name);

        let meta = spec.meta();
        let report_path = ReportWriter::from_config(self.orchestrator.config()).report_path(&meta.id);
        let outcome = self.orchestrator.run(meta, |ctx| {
            for step in &spec.steps {
                execute_step(ctx, step)?;
            }
            Ok::<_, E2eError>(())
        });
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(outcome) => TestResult {
                name: spec.name.clone(),
                success: outcome.passed(),
                duration_ms,
                error: outcome.failure,
                report_path: outcome.report_path,
            },
            Err(e) => TestResult {
                name: spec.name.clone(),
                success: false,
                duration_ms,
                error: Some(self.failure_message(&e)),
                report_path: self.orchestrator.last_run().and(Some(report_path)).filter(|p| p.exists()),
            },
        }
    }

    /// Full failure text for a run whose body returned an error
    fn failure_message(&self, err: &E2eError) -> String {
        self.orchestrator
            .last_run()
            .and_then(|run| run.failure.as_ref())
            .map(|failure| failure.message.clone())
            .unwrap_or_else(|| err.to_string())
    }

    /// Write the suite summary as JSON
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        write_summary(&self.output_dir, results)
    }
}

fn write_summary(output_dir: &Path, results: &TestSuiteResult) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let path = output_dir.join("summary.json");
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}

fn execute_step(ctx: &mut RunContext<'_>, step: &TestStep) -> E2eResult<()> {
    let description = step.describe();
    match step {
        TestStep::Navigate { url } => ctx.ui_step(description, |ctx| {
            ctx.browser().navigate(url)?;
            Ok::<_, E2eError>(())
        }),
        TestStep::Click { selector } => interact(ctx, description, selector, Action::Click),
        TestStep::Fill { selector, value } => interact(ctx, description, selector, Action::Fill(value.clone())),
        TestStep::Press { selector, key } => interact(ctx, description, selector, Action::Press(key.clone())),
        TestStep::Screenshot { name } => ctx.step(description, |ctx| {
            ctx.capture(name);
            Ok::<_, E2eError>(())
        }),
        TestStep::Request {
            expect_status,
            expect_body_contains,
            ..
        } => {
            let Some(request) = step.api_request() else {
                return Ok(());
            };
            ctx.api_step(description.clone(), |ctx| {
                let response = ctx.send(&request)?;
                if let Some(status) = expect_status {
                    ctx.check_eq(*status, response.status, format!("status of {description}"));
                }
                if let Some(needle) = expect_body_contains {
                    ctx.check(
                        response.body.contains(needle.as_str()),
                        format!("response of {description} contains '{needle}'"),
                    );
                }
                Ok::<_, E2eError>(())
            })
        }
        TestStep::Group { steps, .. } => ctx.step(description, |ctx| {
            for nested in steps {
                execute_step(ctx, nested)?;
            }
            Ok::<_, E2eError>(())
        }),
        TestStep::Log { message } => {
            info!("{}", message);
            Ok(())
        }
    }
}

fn interact(ctx: &mut RunContext<'_>, description: String, selector: &str, action: Action) -> E2eResult<()> {
    ctx.ui_step(description, |ctx| {
        ctx.browser().interact(selector, &action)?;
        Ok::<_, E2eError>(())
    })
}
