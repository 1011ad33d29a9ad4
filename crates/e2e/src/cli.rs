//! Command-line arguments of the E2E harness binary

use std::path::PathBuf;

use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(name = "storyline-e2e")]
#[command(about = "YAML-driven E2E runner for Storyline")]
pub struct HarnessArgs {
    /// Path to test specs directory
    #[arg(short, long, default_value = "specs")]
    pub specs: PathBuf,

    /// Run only tests matching this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Run only a specific test by name
    #[arg(short, long)]
    pub name: Option<String>,

    /// WebDriver endpoint; the suite is skipped when none is given
    #[arg(long, env = "STORYLINE_WEBDRIVER")]
    pub endpoint: Option<String>,

    /// Base URL of the application under test
    #[arg(long, env = "STORYLINE_BASE_URL", default_value = "http://127.0.0.1:8080")]
    pub base_url: String,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long, default_value = "chromium")]
    pub browser: String,

    /// Run in headless mode (`--headless false` shows the browser)
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub headless: bool,

    /// Viewport width
    #[arg(long, default_value = "1280")]
    pub viewport_width: u32,

    /// Viewport height
    #[arg(long, default_value = "720")]
    pub viewport_height: u32,

    /// Engine configuration file
    #[arg(short, long, default_value = "storyline.toml")]
    pub config: PathBuf,

    /// Output directory for reports (overrides the configuration file)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
