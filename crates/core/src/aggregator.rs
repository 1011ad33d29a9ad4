//! Failure aggregation across one test run

use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::assertion::{AssertionEvent, AssertionListener, AssertionValue};

/// One failing or erroring assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<AssertionValue>,
    pub location: Option<String>,
}

impl From<&AssertionEvent> for FailureEntry {
    fn from(event: &AssertionEvent) -> Self {
        Self {
            message: event.message.clone(),
            expected: event.expected.clone(),
            actual: event.actual.clone(),
            location: event.location.clone(),
        }
    }
}

/// Collects assertion failures while registered on an assertion channel.
///
/// Clones share one record, so the orchestrator keeps a handle while the
/// channel owns the registered copy.
#[derive(Debug, Clone, Default)]
pub struct FailureAggregator {
    record: Arc<Mutex<Vec<FailureEntry>>>,
}

impl FailureAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A listener feeding this aggregator's record
    pub fn listener(&self) -> Box<dyn AssertionListener> {
        Box::new(self.clone())
    }

    pub fn len(&self) -> usize {
        self.record.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.lock().is_empty()
    }

    pub fn entries(&self) -> Vec<FailureEntry> {
        self.record.lock().clone()
    }

    /// Drain the record, leaving it empty for the next run
    pub fn take(&self) -> Vec<FailureEntry> {
        std::mem::take(&mut *self.record.lock())
    }
}

impl AssertionListener for FailureAggregator {
    fn on_assertion(&mut self, event: &AssertionEvent) {
        if event.is_failure() {
            self.record.lock().push(FailureEntry::from(event));
        }
    }
}

/// Compose one message enumerating every failure, or `None` when empty
pub fn compose_message(entries: &[FailureEntry]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }

    let mut out = format!("{} assertion failure(s):", entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let _ = write!(out, "\n{}) {}", index + 1, entry.message);
        if let Some(expected) = &entry.expected {
            let _ = write!(out, "\n   expected: {expected}");
        }
        if let Some(actual) = &entry.actual {
            let _ = write!(out, "\n   actual: {actual}");
        }
        if let Some(location) = &entry.location {
            let _ = write!(out, "\n   at: {location}");
        }
        if let Some(AssertionValue::Error { trace, .. }) = &entry.actual {
            out.push_str("\n   trace:");
            for line in trace.lines() {
                let _ = write!(out, "\n     {line}");
            }
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_failures_are_recorded() {
        let aggregator = FailureAggregator::new();
        let mut listener = aggregator.listener();

        listener.on_assertion(&AssertionEvent::pass("fine"));
        listener.on_assertion(&AssertionEvent::fail("bad").expected("5").actual(AssertionValue::Text("4".into())));
        listener.on_assertion(&AssertionEvent::error("worse"));

        assert_eq!(aggregator.len(), 2);
        let seen: Vec<String> = aggregator.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(seen, vec!["bad", "worse"]);
        assert_eq!(aggregator.len(), 2);
        let taken = aggregator.take();
        assert_eq!(taken[0].message, "bad");
        assert!(aggregator.is_empty());
    }

    #[test]
    fn test_compose_empty_is_none() {
        assert_eq!(compose_message(&[]), None);
    }

    #[test]
    fn test_compose_enumerates_each_failure() {
        let entries = vec![
            FailureEntry {
                message: "status code".into(),
                expected: Some("200".into()),
                actual: Some(AssertionValue::Text("500".into())),
                location: Some("tests/api.rs:10:5".into()),
            },
            FailureEntry {
                message: "body parses".into(),
                expected: None,
                actual: Some(AssertionValue::Error {
                    message: "EOF while parsing".into(),
                    trace: "Error(\"EOF while parsing\", line: 1)\ncaused by: eof".into(),
                }),
                location: None,
            },
        ];

        let message = compose_message(&entries).unwrap();
        assert!(message.starts_with("2 assertion failure(s):"));
        assert!(message.contains("1) status code\n   expected: 200\n   actual: 500\n   at: tests/api.rs:10:5"));
        assert!(message.contains("2) body parses\n   actual: error: EOF while parsing"));
        assert!(message.contains("   trace:\n     Error(\"EOF while parsing\", line: 1)\n     caused by: eof"));
    }
}
