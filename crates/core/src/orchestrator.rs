//! Test run orchestration: session, step tree, verdict and cleanup

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::aggregator::{compose_message, FailureAggregator};
use crate::artifact::ArtifactStore;
use crate::assertion::AssertionChannel;
use crate::config::StorylineConfig;
use crate::context::RunContext;
use crate::driver::{HttpClient, SessionProvider};
use crate::error::Error;
use crate::model::{FailureDetail, FailureKind, TestMeta, TestRun, TestRunStatus};
use crate::report::ReportWriter;
use crate::tree::{panic_message, StepTree};

/// Verdict of a test run whose body returned normally
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    pub status: TestRunStatus,
    /// Aggregated assertion message when the run failed
    pub failure: Option<String>,
    pub report_path: Option<PathBuf>,
}

impl<T> Outcome<T> {
    pub fn passed(&self) -> bool {
        self.status == TestRunStatus::Passed
    }

    /// Return the body's value, panicking with the aggregated failure
    /// message if any assertion failed. Meant for use inside `#[test]`.
    #[track_caller]
    pub fn assert_passed(self) -> T {
        if let Some(failure) = &self.failure {
            panic!("test run failed:\n{failure}");
        }
        self.value
    }
}

/// Owns the step tree and everything one test run needs
pub struct Orchestrator {
    provider: Box<dyn SessionProvider>,
    http: Option<Box<dyn HttpClient>>,
    store: ArtifactStore,
    writer: ReportWriter,
    channel: AssertionChannel,
    tree: StepTree,
    config: StorylineConfig,
    last_run: Option<TestRun>,
}

impl Orchestrator {
    /// Create an orchestrator with default configuration
    pub fn new(provider: impl SessionProvider + 'static) -> Self {
        Self::with_config(provider, StorylineConfig::default())
    }

    /// Create an orchestrator with custom configuration
    pub fn with_config(provider: impl SessionProvider + 'static, config: StorylineConfig) -> Self {
        Self {
            provider: Box::new(provider),
            http: None,
            store: ArtifactStore::new(&config.api.redact_headers),
            writer: ReportWriter::from_config(&config),
            channel: AssertionChannel::default(),
            tree: StepTree::new(),
            config,
            last_run: None,
        }
    }

    /// Attach the HTTP client used by API steps
    pub fn with_http_client(mut self, client: impl HttpClient + 'static) -> Self {
        self.http = Some(Box::new(client));
        self
    }

    pub fn config(&self) -> &StorylineConfig {
        &self.config
    }

    /// The assertion channel, for registering additional listeners
    pub fn assertions(&mut self) -> &mut AssertionChannel {
        &mut self.channel
    }

    pub fn step_tree(&self) -> &StepTree {
        &self.tree
    }

    /// The most recently completed run
    pub fn last_run(&self) -> Option<&TestRun> {
        self.last_run.as_ref()
    }

    /// Execute one test run.
    ///
    /// Acquires a browser session, opens the run, and executes `body` with a
    /// [`RunContext`]. Whatever the body does, the run is then written out,
    /// the session is closed exactly once and the step tree is reset. An
    /// error returned by the body is passed back unchanged after cleanup; a
    /// panic resumes after cleanup.
    pub fn run<T, E, F>(&mut self, meta: TestMeta, body: F) -> Result<Outcome<T>, E>
    where
        F: FnOnce(&mut RunContext<'_>) -> Result<T, E>,
        E: fmt::Display + fmt::Debug + From<Error>,
    {
        self.last_run = None;
        let mut session = match self.provider.open_session() {
            Ok(session) => session,
            Err(e) => {
                error!("Browser session for '{}' failed to start: {}", meta.title, e);
                return Err(E::from(e));
            }
        };

        self.tree.begin(meta);
        let aggregator = FailureAggregator::new();
        let listener = self.channel.register(aggregator.listener());

        let outcome = {
            let mut ctx = RunContext::new(
                &mut self.tree,
                &self.store,
                &mut *session,
                self.http.as_deref_mut(),
                &mut self.channel,
                self.config.screenshots.capture,
            );
            panic::catch_unwind(AssertUnwindSafe(|| body(&mut ctx)))
        };

        self.channel.deregister(listener);
        let assertion_message = compose_message(&aggregator.take());
        let failure = match &outcome {
            Ok(Ok(_)) => assertion_message.map(|message| FailureDetail::new(FailureKind::Assertion, message)),
            Ok(Err(err)) => Some(with_assertions(FailureDetail::from_error(err), assertion_message)),
            Err(payload) => Some(with_assertions(
                FailureDetail::new(FailureKind::Panic, panic_message(&**payload)),
                assertion_message,
            )),
        };
        let status = if failure.is_some() {
            TestRunStatus::Failed
        } else {
            TestRunStatus::Passed
        };
        let failure_message = failure.as_ref().map(|f| f.message.clone());

        let run = self.tree.finish(status, failure);
        let writer = &self.writer;
        let report_path = run.as_ref().and_then(|run| {
            panic::catch_unwind(AssertUnwindSafe(|| writer.write(run))).unwrap_or_else(|payload| {
                warn!("Writing report for '{}' panicked: {}", run.meta.title, panic_message(&*payload));
                None
            })
        });
        match panic::catch_unwind(AssertUnwindSafe(|| session.close())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Closing browser session failed: {}", e),
            Err(payload) => warn!("Closing browser session panicked: {}", panic_message(&*payload)),
        }
        drop(session);
        self.tree.reset();

        if let Some(run) = &run {
            log_summary(run);
        }
        self.last_run = run;

        match outcome {
            Ok(Ok(value)) => Ok(Outcome {
                value,
                status,
                failure: failure_message,
                report_path,
            }),
            Ok(Err(err)) => Err(err),
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("has_http_client", &self.http.is_some())
            .field("tree", &self.tree)
            .finish()
    }
}

fn with_assertions(mut detail: FailureDetail, assertion_message: Option<String>) -> FailureDetail {
    if let Some(message) = assertion_message {
        detail.message = format!("{}\n\n{}", detail.message, message);
    }
    detail
}

fn log_summary(run: &TestRun) {
    match &run.failure {
        None => info!("✓ {} ({} ms)", run.meta.title, run.duration_ms()),
        Some(failure) => {
            error!("✗ {} ({} ms)", run.meta.title, run.duration_ms());
            for line in failure.message.lines() {
                error!("    {}", line);
            }
        }
    }
}
