//! E2E test harness entry point
//!
//! This file is the test binary that runs E2E tests from YAML specs.
//! Run with: cargo test --package storyline-e2e --test e2e -- --endpoint http://127.0.0.1:4444

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use storyline_core::{Orchestrator, StorylineConfig};
use storyline_e2e::cli::HarnessArgs;
use storyline_e2e::runner::{RunnerConfig, TestSuiteResult};
use storyline_e2e::webdriver::Browser;
use storyline_e2e::{ReqwestClient, TestRunner, WebDriverConfig, WebDriverProvider};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = HarnessArgs::parse();

    match run(args) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn run(args: HarnessArgs) -> anyhow::Result<bool> {
    let Some(endpoint) = args.endpoint else {
        tracing::warn!("No WebDriver endpoint configured (--endpoint or STORYLINE_WEBDRIVER), skipping E2E suite");
        return Ok(true);
    };

    let mut config = StorylineConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(output) = args.output {
        config.output_dir = output;
    }

    let browser: Browser = args.browser.parse().map_err(anyhow::Error::msg)?;
    let provider = WebDriverProvider::new(WebDriverConfig {
        endpoint,
        base_url: args.base_url.clone(),
        browser,
        headless: args.headless,
        viewport_width: args.viewport_width,
        viewport_height: args.viewport_height,
        ..Default::default()
    })?;
    let http = ReqwestClient::new()?.with_base_url(args.base_url);

    let runner_config = RunnerConfig {
        specs_dir: args.specs,
        output_dir: config.output_dir.clone(),
    };
    let orchestrator = Orchestrator::with_config(provider, config).with_http_client(http);
    let mut runner = TestRunner::new(orchestrator, runner_config);

    let results = if let Some(name) = args.name {
        let result = runner.run_test(&name)?;
        let duration_ms = result.duration_ms;
        TestSuiteResult::from_results(vec![result], duration_ms)
    } else if let Some(tag) = args.tag {
        runner.run_tagged(&tag)?
    } else {
        runner.run_all()?
    };

    runner.write_results(&results)?;

    Ok(results.failed == 0)
}
