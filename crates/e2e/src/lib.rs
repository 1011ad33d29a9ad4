//! Storyline E2E Test Framework
//!
//! This crate drives the Storyline reporting engine from declarative specs:
//! - Talks to a browser through any W3C WebDriver endpoint
//! - Executes API steps with a blocking reqwest client
//! - Parses declarative YAML test specs
//! - Writes one JSON report per spec plus a suite summary
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── Orchestrator (storyline-core)                        │
//! │    │     ├── WebDriverProvider -> WebDriverSession          │
//! │    │     └── ReqwestClient                                  │
//! │    ├── run_spec(spec: TestSpec) -> TestResult               │
//! │    └── write_results(TestSuiteResult) -> summary.json       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestSpec (YAML)                                            │
//! │    ├── name, description, story?, feature?, tags            │
//! │    └── steps: [TestStep]                                    │
//! │          ├── navigate { url }                               │
//! │          ├── click { selector }                             │
//! │          ├── fill { selector, value }                       │
//! │          ├── press { selector, key }                        │
//! │          ├── screenshot { name }                            │
//! │          ├── request { method, url, json?, expect_status? } │
//! │          ├── group { description, steps }                   │
//! │          └── log { message }                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod cli;
pub mod error;
pub mod http;
pub mod runner;
pub mod spec;
pub mod webdriver;

pub use error::{E2eError, E2eResult};
pub use http::ReqwestClient;
pub use runner::TestRunner;
pub use spec::{TestSpec, TestStep};
pub use webdriver::{WebDriverConfig, WebDriverProvider};
