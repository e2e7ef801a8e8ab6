//! Command-line host for autocall
//!
//! `autocall run` drives a redial run against the simulated phone and prints
//! status changes as they happen; `autocall check-config` validates a
//! configuration file and prints the effective settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use autocall::redial::{RedialEvent, RunOutcome};
use autocall::watcher::TerminationPolicy;
use autocall::{log_welcome, setup_logging, Autocall, AutocallConfig, LoggingConfig, PhoneScript};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_stream::StreamExt;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(author, version, about = "Redial a number until it connects", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides the configuration and AUTOCALL_LOG)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Log span enter and exit
    #[arg(long, global = true)]
    log_spans: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a redial sequence against the simulated phone
    Run(RunArgs),
    /// Validate the configuration and print the effective settings
    CheckConfig,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Number to dial
    #[arg(short, long)]
    number: Option<String>,

    /// Maximum number of attempts
    #[arg(short, long)]
    max_attempts: Option<u32>,

    /// Seconds before an unanswered call needs a manual hang-up
    #[arg(short, long)]
    ring_timeout: Option<u32>,

    /// Call-screen termination policy
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Delay for the deferred policy
    #[arg(long, default_value = "20")]
    defer_secs: u64,

    /// Simulated far end answers on this attempt
    #[arg(long)]
    answer_on: Option<u32>,

    /// Seconds an unanswered simulated call rings
    #[arg(long, default_value = "5")]
    ring_for: u64,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    Immediate,
    Deferred,
    Observe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.log_spans {
        config.logging.spans = true;
    }

    match cli.command {
        Command::Run(args) => run(config, args).await,
        Command::CheckConfig => check_config(config),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AutocallConfig> {
    let mut config = match path {
        Some(path) => AutocallConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AutocallConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("applying environment overrides")?;
    Ok(config)
}

fn check_config(config: AutocallConfig) -> anyhow::Result<()> {
    config.validate()?;
    println!("{}", toml::to_string_pretty(&config)?);
    println!("# configuration OK");
    Ok(())
}

async fn run(mut config: AutocallConfig, args: RunArgs) -> anyhow::Result<()> {
    if let Some(number) = args.number {
        config.redial.target_number = Some(number);
    }
    if let Some(max_attempts) = args.max_attempts {
        config.redial.max_attempts = max_attempts;
    }
    if let Some(ring_timeout) = args.ring_timeout {
        config.redial.ring_timeout_secs = ring_timeout;
    }
    match args.policy {
        Some(PolicyArg::Immediate) => config.watcher.policy = TerminationPolicy::Immediate,
        Some(PolicyArg::Deferred) => {
            config.watcher.policy = TerminationPolicy::deferred(Duration::from_secs(args.defer_secs))
        }
        Some(PolicyArg::Observe) => config.watcher.policy = TerminationPolicy::ObserveOnly,
        None => {}
    }
    config.validate()?;

    let logging = LoggingConfig::from_settings(&config.logging)?;
    setup_logging(logging.clone())?;
    log_welcome(&logging, autocall::VERSION);

    let retry = config.retry_config().context("a target number is required")?;
    let mut script = PhoneScript::default().with_ring_for(Duration::from_secs(args.ring_for));
    script.answer_on_attempt = args.answer_on;

    let (app, phone) = Autocall::builder(config).build_simulated(script)?;
    if let Some(capability) = app.missing_capability() {
        println!("notice: {} is unavailable; calls are not ended automatically", capability);
    }

    let mut events = app.orchestrator().events();
    let json = args.json;
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => print_event(&event, json),
                Err(e) => warn!("Event stream lagged: {}", e),
            }
        }
    });

    let report = tokio::select! {
        report = app.run(retry) => Some(report?),
        _ = tokio::signal::ctrl_c() => {
            app.stop().await?;
            None
        }
    };

    let stats = app.watcher().stats();
    app.shutdown().await?;
    printer.abort();

    match report {
        Some(report) => {
            let verdict = match report.outcome {
                RunOutcome::Connected => "connected",
                RunOutcome::LimitReached => "gave up",
                RunOutcome::Cancelled => "cancelled",
            };
            println!("{} after {} dial(s)", verdict, report.dials_placed);
        }
        None => println!("cancelled"),
    }
    println!(
        "call screen: {} detection(s), {} ended by the watcher",
        stats.detections,
        phone.ended_by_click()
    );
    Ok(())
}

fn print_event(event: &RedialEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to encode event: {}", e),
        }
        return;
    }

    match event {
        RedialEvent::RunStarted {
            target_number,
            max_attempts,
            ..
        } => println!("calling {} (up to {} attempts)", target_number, max_attempts),
        RedialEvent::StatusChanged { status, .. } => println!("status: {}", status),
        RedialEvent::Notice { message, .. } => println!("notice: {}", message),
        RedialEvent::DialPlaced { .. } | RedialEvent::RunFinished { .. } => {}
    }
}
