//! Step tree: the live stack of open steps for the active test run
//!
//! Steps are opened and closed only through [`run_step`], which always
//! balances the push with a pop, on returned errors and on panics alike.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tracing::{error, info, warn};

use crate::aggregator::{compose_message, FailureEntry};
use crate::model::{Artifact, FailureDetail, FailureKind, Step, StepStatus, TestMeta, TestRun, TestRunStatus};

/// Anything that can lend the step tree to a scoped step
pub trait StepScope {
    fn step_tree(&mut self) -> &mut StepTree;
}

/// Open path and completed steps of the active test run
#[derive(Debug)]
pub struct StepTree {
    run: Option<TestRun>,
    stack: Vec<OpenStep>,
    /// Payload address of a panic a closed child is propagating
    unwinding: Option<usize>,
}

#[derive(Debug)]
struct OpenStep {
    step: Step,
    assertion_failures: Vec<FailureEntry>,
}

/// How a step body ended
enum Exit {
    Returned,
    Errored(FailureDetail),
    Panicked { message: String, from_child: bool },
}

impl StepTree {
    pub(crate) fn new() -> Self {
        Self {
            run: None,
            stack: Vec::new(),
            unwinding: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.run.is_some()
    }

    /// Current nesting level; zero outside any step
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Descriptions from the outermost to the innermost open step
    pub fn active_path(&self) -> Vec<&str> {
        self.stack.iter().map(|open| open.step.description.as_str()).collect()
    }

    /// The run in progress, with its completed top-level steps
    pub fn current_run(&self) -> Option<&TestRun> {
        self.run.as_ref()
    }

    pub(crate) fn begin(&mut self, meta: TestMeta) {
        if self.run.is_some() || !self.stack.is_empty() {
            warn!("Discarding unfinished test run before starting '{}'", meta.title);
            self.reset();
        }
        info!("▶ Test run: {}", meta.title);
        self.run = Some(TestRun::start(meta));
    }

    /// Close the active run with its verdict and return it, leaving the
    /// tree empty
    pub(crate) fn finish(&mut self, status: TestRunStatus, failure: Option<FailureDetail>) -> Option<TestRun> {
        debug_assert!(self.stack.is_empty(), "run finished with open steps");
        let mut run = self.run.take()?;
        self.stack.clear();
        run.status = status;
        run.failure = failure;
        run.finished_at = Some(chrono::Utc::now());
        Some(run)
    }

    pub(crate) fn reset(&mut self) {
        self.stack.clear();
        self.run = None;
        self.unwinding = None;
    }

    /// Attach an artifact to the innermost open step
    pub(crate) fn attach(&mut self, artifact: Artifact) {
        match self.stack.last_mut() {
            Some(open) => open.step.artifacts.push(artifact),
            None => warn!("Artifact captured outside any step was dropped"),
        }
    }

    /// Note a failed assertion against the innermost open step
    pub(crate) fn record_assertion_failure(&mut self, entry: FailureEntry) {
        if let Some(open) = self.stack.last_mut() {
            open.assertion_failures.push(entry);
        }
    }

    fn open(&mut self, description: String) {
        debug_assert!(self.run.is_some(), "step opened outside a test run");
        info!("{}▶ {}", indent(self.stack.len()), description);
        self.unwinding = None;

        let mut step = Step::new(description);
        step.start();
        self.stack.push(OpenStep {
            step,
            assertion_failures: Vec::new(),
        });
    }

    fn close(&mut self, exit: Exit) {
        self.unwinding = None;
        let Some(OpenStep { mut step, assertion_failures }) = self.stack.pop() else {
            warn!("Step close requested with no open step");
            return;
        };

        let assertion_message = compose_message(&assertion_failures);
        let (status, failure) = match exit {
            Exit::Returned => match assertion_message {
                Some(message) => (StepStatus::Failed, Some(FailureDetail::new(FailureKind::Assertion, message))),
                None => (StepStatus::Passed, None),
            },
            Exit::Errored(mut detail) => {
                if let Some(message) = assertion_message {
                    detail.message = format!("{}\n{}", detail.message, message);
                }
                (StepStatus::Failed, Some(detail))
            }
            Exit::Panicked { message, from_child } => match step.children.last() {
                Some(child) if from_child => (
                    StepStatus::Aborted,
                    Some(FailureDetail::new(
                        FailureKind::Aborted,
                        format!("aborted by panic in '{}': {}", child.description, message),
                    )),
                ),
                _ => (StepStatus::Failed, Some(FailureDetail::new(FailureKind::Panic, message))),
            },
        };
        step.finish(status, failure);
        self.narrate_close(&step);

        if let Some(parent) = self.stack.last_mut() {
            parent.step.children.push(step);
        } else if let Some(run) = self.run.as_mut() {
            run.steps.push(step);
        } else {
            warn!("Step '{}' closed outside an active run was dropped", step.description);
        }
    }

    fn narrate_close(&self, step: &Step) {
        let pad = indent(self.stack.len());
        let reason = step
            .failure
            .as_ref()
            .and_then(|f| f.message.lines().next())
            .unwrap_or("");
        match step.status {
            StepStatus::Passed => info!("{}✓ {} ({} ms)", pad, step.description, step.duration_ms()),
            StepStatus::Aborted => warn!("{}↯ {} - {}", pad, step.description, reason),
            _ => error!("{}✗ {} - {}", pad, step.description, reason),
        }
    }
}

impl StepScope for StepTree {
    fn step_tree(&mut self) -> &mut StepTree {
        self
    }
}

/// Scoped step execution.
///
/// Opens a step under the innermost open step (or at the top level of the
/// run), runs `body`, then closes the step: `Passed` on `Ok`, `Failed` on
/// `Err` or panic. The step is always popped before the error is returned or
/// the panic resumes, and the error value reaches the caller unchanged.
pub fn run_step<S, T, E, F>(scope: &mut S, description: impl Into<String>, body: F) -> Result<T, E>
where
    S: StepScope + ?Sized,
    F: FnOnce(&mut S) -> Result<T, E>,
    E: fmt::Display + fmt::Debug,
{
    scope.step_tree().open(description.into());
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(scope)));
    let tree = scope.step_tree();
    match outcome {
        Ok(Ok(value)) => {
            tree.close(Exit::Returned);
            Ok(value)
        }
        Ok(Err(err)) => {
            tree.close(Exit::Errored(FailureDetail::from_error(&err)));
            Err(err)
        }
        Err(payload) => {
            let address = payload_address(&*payload);
            let from_child = tree.unwinding == Some(address);
            tree.close(Exit::Panicked {
                message: panic_message(&*payload),
                from_child,
            });
            tree.unwinding = Some(address);
            panic::resume_unwind(payload)
        }
    }
}

/// Identity of a panic payload as it is resumed through nested steps
fn payload_address(payload: &(dyn Any + Send)) -> usize {
    payload as *const (dyn Any + Send) as *const () as usize
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Screenshot;

    fn active_tree() -> StepTree {
        let mut tree = StepTree::new();
        tree.begin(TestMeta::new("tree test"));
        tree
    }

    fn finish(tree: &mut StepTree) -> TestRun {
        tree.finish(TestRunStatus::Passed, None).expect("active run")
    }

    fn screenshot(name: &str) -> Artifact {
        Artifact::Screenshot(Screenshot {
            filename: name.to_string(),
            bytes: Vec::new(),
            timestamp: chrono::Utc::now(),
            sha256: String::new(),
            dimensions: None,
        })
    }

    #[test]
    fn test_tree_mirrors_call_nesting() {
        let mut tree = active_tree();

        let result: Result<(), String> = run_step(&mut tree, "a", |tree| {
            run_step(tree, "a.1", |tree| {
                assert_eq!(tree.active_path(), vec!["a", "a.1"]);
                run_step(tree, "a.1.x", |_| Ok::<(), String>(()))
            })?;
            run_step(tree, "a.2", |tree| {
                assert_eq!(tree.depth(), 2);
                Ok(())
            })
        });
        assert!(result.is_ok());
        run_step(&mut tree, "b", |_| Ok::<_, String>(())).unwrap();
        assert_eq!(tree.depth(), 0);

        let run = finish(&mut tree);
        let shape: Vec<(&str, Vec<&str>)> = run
            .steps
            .iter()
            .map(|s| (s.description.as_str(), s.children.iter().map(|c| c.description.as_str()).collect()))
            .collect();
        assert_eq!(shape, vec![("a", vec!["a.1", "a.2"]), ("b", vec![])]);
        assert_eq!(run.steps[0].children[0].children[0].description, "a.1.x");
        assert!(run.steps.iter().all(|s| s.status == StepStatus::Passed));
    }

    #[test]
    fn test_returned_error_fails_step_and_is_passed_through() {
        let mut tree = active_tree();

        let result: Result<u32, String> = run_step(&mut tree, "outer", |tree| {
            run_step(tree, "inner", |_| Err("element not found".to_string()))
        });

        assert_eq!(result, Err("element not found".to_string()));
        assert_eq!(tree.depth(), 0);
        let run = finish(&mut tree);
        let outer = &run.steps[0];
        assert_eq!(outer.status, StepStatus::Failed);
        assert_eq!(outer.children[0].status, StepStatus::Failed);
        assert_eq!(outer.children[0].failure.as_ref().unwrap().message, "element not found");
    }

    #[test]
    fn test_panic_fails_innermost_and_aborts_ancestors() {
        let mut tree = active_tree();

        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), String> = run_step(&mut tree, "outer", |tree| {
                run_step(tree, "inner", |_| -> Result<(), String> { panic!("selector vanished") })
            });
        }));

        assert!(caught.is_err());
        assert_eq!(tree.depth(), 0);
        let run = finish(&mut tree);
        let outer = &run.steps[0];
        let inner = &outer.children[0];
        assert_eq!(inner.status, StepStatus::Failed);
        assert_eq!(inner.failure.as_ref().unwrap().kind, FailureKind::Panic);
        assert_eq!(inner.failure.as_ref().unwrap().message, "selector vanished");
        assert_eq!(outer.status, StepStatus::Aborted);
        assert!(outer.failure.as_ref().unwrap().message.contains("'inner'"));
    }

    #[test]
    fn test_own_panic_after_catching_child_panic_is_not_aborted() {
        let mut tree = active_tree();

        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), String> = run_step(&mut tree, "outer", |tree| {
                let child = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_step(tree, "flaky", |_| -> Result<(), String> { panic!("first attempt") })
                }));
                assert!(child.is_err());
                panic!("gave up retrying")
            });
        }));

        assert!(caught.is_err());
        let run = finish(&mut tree);
        let outer = &run.steps[0];
        assert_eq!(outer.children[0].status, StepStatus::Failed);
        assert_eq!(outer.status, StepStatus::Failed);
        let detail = outer.failure.as_ref().unwrap();
        assert_eq!(detail.kind, FailureKind::Panic);
        assert_eq!(detail.message, "gave up retrying");
    }

    #[test]
    fn test_assertion_failure_fails_only_innermost_step() {
        let mut tree = active_tree();

        run_step(&mut tree, "parent", |tree| {
            run_step(tree, "child", |tree| {
                tree.record_assertion_failure(FailureEntry {
                    message: "total".into(),
                    expected: Some("5".into()),
                    actual: None,
                    location: None,
                });
                Ok::<_, String>(())
            })
        })
        .unwrap();

        let run = finish(&mut tree);
        let parent = &run.steps[0];
        assert_eq!(parent.status, StepStatus::Passed);
        assert_eq!(parent.children[0].status, StepStatus::Failed);
        let detail = parent.children[0].failure.as_ref().unwrap();
        assert_eq!(detail.kind, FailureKind::Assertion);
        assert!(detail.message.contains("expected: 5"));
    }

    #[test]
    fn test_artifacts_attach_to_innermost_step_in_order() {
        let mut tree = active_tree();

        run_step(&mut tree, "outer", |tree| {
            tree.attach(screenshot("first.png"));
            run_step(tree, "inner", |tree| {
                tree.attach(screenshot("inner.png"));
                Ok::<_, String>(())
            })?;
            tree.attach(screenshot("last.png"));
            Ok::<_, String>(())
        })
        .unwrap();

        let run = finish(&mut tree);
        let names: Vec<&str> = run.steps[0].screenshots().map(|s| s.filename.as_str()).collect();
        assert_eq!(names, vec!["first.png", "last.png"]);
        assert_eq!(run.steps[0].children[0].screenshots().count(), 1);
    }

    #[test]
    fn test_finish_resets_tree() {
        let mut tree = active_tree();
        assert!(tree.is_active());
        let run = finish(&mut tree);
        assert_eq!(run.status, TestRunStatus::Passed);
        assert!(!tree.is_active());
        assert!(tree.current_run().is_none());
        assert!(tree.finish(TestRunStatus::Passed, None).is_none());
    }

    #[test]
    fn test_begin_discards_stale_run() {
        let mut tree = active_tree();
        tree.begin(TestMeta::new("second"));
        assert_eq!(tree.current_run().unwrap().meta.title, "second");
    }
}
