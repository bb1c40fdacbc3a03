//! vizcheck: run declarative browser specs against the demo pages
//!
//! Exit status is 0 when every spec passes, 1 when any spec fails and 2 when
//! the run itself could not complete.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vizcheck_e2e::playwright::Browser;
use vizcheck_e2e::spec::TestSpec;
use vizcheck_e2e::{RunnerConfig, TestRunner};

#[derive(Parser, Debug)]
#[command(name = "vizcheck")]
#[command(about = "Browser E2E runner for the demo visualizers")]
struct Args {
    /// Path to the runner configuration file
    #[arg(short, long, default_value = "vizcheck.toml", env = "VIZCHECK_CONFIG")]
    config: PathBuf,

    /// Path to test specs directory
    #[arg(short, long)]
    specs: Option<PathBuf>,

    /// Run only tests matching this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only a specific test by name
    #[arg(short, long)]
    name: Option<String>,

    /// Use an already running fixture server instead of spawning one
    #[arg(long, env = "VIZCHECK_BASE_URL")]
    base_url: Option<String>,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long)]
    browser: Option<Browser>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Output directory for results
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// List the specs that would run, then exit
    #[arg(long)]
    list: bool,
}

impl Args {
    /// Command-line flags win over the configuration file
    fn apply(&self, config: &mut RunnerConfig) {
        if let Some(specs) = &self.specs {
            config.paths.specs_dir = specs.clone();
        }
        if let Some(output) = &self.output {
            config.paths.output_dir = output.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(base_url.clone());
            config.server.enabled = false;
        }
        if let Some(browser) = self.browser {
            config.browser.browser = browser;
        }
        if self.headed {
            config.browser.headless = false;
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(async_main(args)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn async_main(args: Args) -> anyhow::Result<bool> {
    let mut config = RunnerConfig::load(&args.config)?;
    args.apply(&mut config);
    config.validate()?;

    if args.list {
        let specs = TestSpec::load_all(&config.paths.specs_dir)?;
        for spec in &specs {
            if args.tag.as_ref().map_or(true, |tag| spec.tags.contains(tag)) {
                println!("{}\t{}", spec.name, spec.tags.join(","));
            }
        }
        return Ok(true);
    }

    let mut runner = TestRunner::with_config(config);

    let results = if let Some(name) = &args.name {
        runner.run_test(name).await?
    } else if let Some(tag) = &args.tag {
        runner.run_tagged(tag).await?
    } else {
        runner.run_all().await?
    };

    let path = runner.write_results(&results)?;
    runner.stop_server()?;

    info!(
        "{}/{} passed, report at {}",
        results.passed,
        results.total,
        path.display()
    );

    Ok(results.failed == 0)
}
