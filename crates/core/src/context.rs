//! Run context handed to a test body
//!
//! A [`RunContext`] borrows the step tree, the artifact store, the browser
//! session, the optional HTTP client and the assertion channel for the
//! duration of one test run. Every step it opens goes through
//! [`run_step`], so the stack stays balanced whatever the body does.

use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::time::Instant;

use tracing::debug;

use crate::aggregator::FailureEntry;
use crate::artifact::ArtifactStore;
use crate::assertion::{AssertionChannel, AssertionEvent, AssertionValue};
use crate::driver::{ApiRequest, ApiResponse, BrowserDriver, HttpClient};
use crate::error::{Error, Result};
use crate::tree::{run_step, StepScope, StepTree};

pub struct RunContext<'r> {
    tree: &'r mut StepTree,
    store: &'r ArtifactStore,
    browser: &'r mut (dyn BrowserDriver + 'static),
    http: Option<&'r mut (dyn HttpClient + 'static)>,
    channel: &'r mut AssertionChannel,
    capture_screenshots: bool,
    /// Number of enclosing `api_step` scopes
    api_depth: usize,
}

impl<'r> RunContext<'r> {
    pub(crate) fn new(
        tree: &'r mut StepTree,
        store: &'r ArtifactStore,
        browser: &'r mut (dyn BrowserDriver + 'static),
        http: Option<&'r mut (dyn HttpClient + 'static)>,
        channel: &'r mut AssertionChannel,
        capture_screenshots: bool,
    ) -> Self {
        Self {
            tree,
            store,
            browser,
            http,
            channel,
            capture_screenshots,
            api_depth: 0,
        }
    }

    /// Read-only view of the live step tree
    pub fn tree(&self) -> &StepTree {
        &*self.tree
    }

    /// The browser session of this run
    pub fn browser(&mut self) -> &mut dyn BrowserDriver {
        &mut *self.browser
    }

    /// Run `body` as a nested step
    pub fn step<T, E, F>(&mut self, description: impl Into<String>, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Self) -> std::result::Result<T, E>,
        E: fmt::Display + fmt::Debug,
    {
        run_step(self, description, body)
    }

    /// Run a browser action as a step with a screenshot before and after.
    ///
    /// Both screenshots land on this step, in capture order. The "after"
    /// screenshot is taken whether the action succeeded or returned an error.
    pub fn ui_step<T, E, F>(&mut self, description: impl Into<String>, action: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Self) -> std::result::Result<T, E>,
        E: fmt::Display + fmt::Debug,
    {
        let description = description.into();
        let label = description.clone();
        run_step(self, description, move |ctx| {
            ctx.capture(&format!("{label} before"));
            let result = action(ctx);
            ctx.capture(&format!("{label} after"));
            result
        })
    }

    /// Run an HTTP interaction as a step.
    ///
    /// The client is reset exactly once after `call`, including when it
    /// returns an error or panics.
    pub fn api_step<T, E, F>(&mut self, description: impl Into<String>, call: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Self) -> std::result::Result<T, E>,
        E: fmt::Display + fmt::Debug,
    {
        run_step(self, description, |ctx| {
            ctx.api_depth += 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| call(ctx)));
            ctx.api_depth -= 1;
            ctx.reset_http();
            match outcome {
                Ok(result) => result,
                Err(payload) => panic::resume_unwind(payload),
            }
        })
    }

    /// Execute a request and record the exchange on the innermost step.
    ///
    /// Only available inside [`api_step`](Self::api_step), whose exit resets
    /// the client; anywhere else this returns [`Error::NotInApiStep`].
    pub fn send(&mut self, request: &ApiRequest) -> Result<ApiResponse> {
        if self.api_depth == 0 {
            return Err(Error::NotInApiStep);
        }
        let client = self.http.as_deref_mut().ok_or(Error::NoHttpClient)?;

        let started = Instant::now();
        let response = client.execute(request)?;
        let duration_ms = started.elapsed().as_millis() as u64;
        debug!("{} {} -> {} ({} ms)", request.method, request.url, response.status, duration_ms);

        let artifact = self.store.record_api_call(request, &response, duration_ms);
        self.tree.attach(artifact);
        Ok(response)
    }

    /// Best-effort screenshot onto the innermost step; returns whether one
    /// was attached
    pub fn capture(&mut self, label: &str) -> bool {
        if !self.capture_screenshots {
            return false;
        }
        match self.store.capture_screenshot(&mut *self.browser, label) {
            Some(artifact) => {
                self.tree.attach(artifact);
                true
            }
            None => false,
        }
    }

    /// Non-fatal check of a condition
    #[track_caller]
    pub fn check(&mut self, condition: bool, description: impl Into<String>) -> bool {
        let event = if condition {
            AssertionEvent::pass(description)
        } else {
            AssertionEvent::fail(description)
        };
        self.report(event.location(caller()));
        condition
    }

    /// Non-fatal equality check recording both values
    #[track_caller]
    pub fn check_eq<V>(&mut self, expected: V, actual: V, description: impl Into<String>) -> bool
    where
        V: PartialEq + fmt::Debug,
    {
        let passed = expected == actual;
        let event = if passed {
            AssertionEvent::pass(description)
        } else {
            AssertionEvent::fail(description)
        };
        self.report(
            event
                .expected(format!("{expected:?}"))
                .actual(AssertionValue::Text(format!("{actual:?}")))
                .location(caller()),
        );
        passed
    }

    /// Non-fatal check that a result is `Ok`; an error is recorded with its
    /// full trace
    #[track_caller]
    pub fn check_ok<V, Er>(&mut self, result: &std::result::Result<V, Er>, description: impl Into<String>) -> bool
    where
        Er: fmt::Display + fmt::Debug,
    {
        let event = match result {
            Ok(_) => AssertionEvent::pass(description),
            Err(err) => AssertionEvent::error(description)
                .expected("Ok")
                .actual(AssertionValue::Error {
                    message: err.to_string(),
                    trace: format!("{err:?}"),
                }),
        };
        self.report(event.location(caller()));
        result.is_ok()
    }

    /// Publish an assertion event to the channel; failures are also noted
    /// against the innermost open step
    pub fn report(&mut self, event: AssertionEvent) {
        self.channel.report(&event);
        if event.is_failure() {
            self.tree.record_assertion_failure(FailureEntry::from(&event));
        }
    }

    fn reset_http(&mut self) {
        if let Some(client) = self.http.as_deref_mut() {
            client.reset();
        }
    }
}

impl StepScope for RunContext<'_> {
    fn step_tree(&mut self) -> &mut StepTree {
        &mut *self.tree
    }
}

#[track_caller]
fn caller() -> String {
    let location = Location::caller();
    format!("{}:{}:{}", location.file(), location.line(), location.column())
}
