//! Storyline core reporting engine
//!
//! This crate tracks a narrated test as a tree of scoped steps and turns the
//! finished tree into a JSON report:
//! - Opens and closes steps only through scoped execution
//! - Attaches screenshots and HTTP call records to the innermost open step
//! - Aggregates non-fatal assertion failures into one verdict
//! - Releases the browser session and resets all state on every exit path
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  run(meta, body)                                            │
//! │    ├── SessionProvider::open_session() -> BrowserDriver     │
//! │    ├── StepTree::begin(meta)                                │
//! │    ├── AssertionChannel::register(FailureAggregator)        │
//! │    ├── body(&mut RunContext)                                │
//! │    │     ├── step / ui_step / api_step  (scoped)            │
//! │    │     ├── capture / send  -> ArtifactStore -> Artifact   │
//! │    │     └── check / check_eq / check_ok                    │
//! │    └── finally                                              │
//! │          ├── ReportWriter::write(TestRun)                   │
//! │          ├── BrowserDriver::close()                         │
//! │          └── StepTree reset, listener deregistered          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod aggregator;
pub mod artifact;
pub mod assertion;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod report;
pub mod tree;

pub use aggregator::FailureAggregator;
pub use artifact::{slugify, ArtifactStore};
pub use assertion::{AssertionChannel, AssertionEvent, AssertionKind, AssertionListener, AssertionValue};
pub use config::StorylineConfig;
pub use context::RunContext;
pub use driver::{Action, ApiRequest, ApiResponse, BrowserDriver, HttpClient, SessionProvider};
pub use error::{Error, Result};
pub use model::{Artifact, Step, StepStatus, TestMeta, TestRun, TestRunStatus};
pub use orchestrator::{Orchestrator, Outcome};
pub use report::ReportWriter;
pub use tree::{run_step, StepScope, StepTree};
