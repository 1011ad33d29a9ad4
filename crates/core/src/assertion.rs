//! Assertion report channel
//!
//! Every assertion made through a [`RunContext`](crate::RunContext) is
//! reported here once. The channel always forwards to its default sink and
//! additionally fans out to any registered listeners, so observers never
//! replace the default bookkeeping.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionKind {
    Pass,
    Fail,
    Error,
}

/// Expected or actual value carried by an assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionValue {
    Text(String),
    /// An error observed in place of a value, with its full trace
    Error { message: String, trace: String },
}

impl fmt::Display for AssertionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertionValue::Text(text) => f.write_str(text),
            AssertionValue::Error { message, .. } => write!(f, "error: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionEvent {
    pub kind: AssertionKind,
    pub message: String,
    #[serde(default)]
    pub expected: Option<String>,
    #[serde(default)]
    pub actual: Option<AssertionValue>,
    /// `file:line:col` of the asserting call
    #[serde(default)]
    pub location: Option<String>,
}

impl AssertionEvent {
    pub fn pass(message: impl Into<String>) -> Self {
        Self::new(AssertionKind::Pass, message)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(AssertionKind::Fail, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(AssertionKind::Error, message)
    }

    fn new(kind: AssertionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            expected: None,
            actual: None,
            location: None,
        }
    }

    pub fn expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn actual(mut self, actual: AssertionValue) -> Self {
        self.actual = Some(actual);
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        self.kind != AssertionKind::Pass
    }
}

/// Observer of assertion events
pub trait AssertionListener {
    fn on_assertion(&mut self, event: &AssertionEvent);
}

/// Handle returned by [`AssertionChannel::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Default sink: narrates assertions to the log
#[derive(Debug, Default)]
pub struct TracingForwarder;

impl AssertionListener for TracingForwarder {
    fn on_assertion(&mut self, event: &AssertionEvent) {
        match event.kind {
            AssertionKind::Pass => debug!("assert ok: {}", event.message),
            AssertionKind::Fail | AssertionKind::Error => {
                let expected = event.expected.as_deref().unwrap_or("-");
                let actual = event.actual.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".to_string());
                error!(
                    "assert {:?}: {} (expected: {}, actual: {}) at {}",
                    event.kind,
                    event.message,
                    expected,
                    actual,
                    event.location.as_deref().unwrap_or("unknown")
                );
            }
        }
    }
}

pub struct AssertionChannel {
    default_sink: Box<dyn AssertionListener>,
    listeners: Vec<(ListenerId, Box<dyn AssertionListener>)>,
    next_id: u64,
}

impl AssertionChannel {
    /// Channel with a custom default sink
    pub fn with_sink(default_sink: Box<dyn AssertionListener>) -> Self {
        Self {
            default_sink,
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    pub fn register(&mut self, listener: Box<dyn AssertionListener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn deregister(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver an event to the default sink, then to every listener in
    /// registration order
    pub fn report(&mut self, event: &AssertionEvent) {
        self.default_sink.on_assertion(event);
        for (_, listener) in &mut self.listeners {
            listener.on_assertion(event);
        }
    }
}

impl Default for AssertionChannel {
    fn default() -> Self {
        Self::with_sink(Box::new(TracingForwarder))
    }
}

impl fmt::Debug for AssertionChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssertionChannel")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
