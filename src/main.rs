use anyhow::{Context, Result};
use concourse_kit::cli::commands::{GenerateCommand, InitCommand, SetCommand, TestCommand};
use concourse_kit::cli::output::*;
use concourse_kit::cli::{Cli, Command};
use concourse_kit::core::settings::{self, Settings};
use concourse_kit::execution::{checks, ExecutionEngine, ExecutionEvent, Mode, SetOutcome};
use concourse_kit::fly::{FlyClient, FlyClientConfig};
use concourse_kit::EnvironmentRequest;
use indicatif::ProgressBar;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Exit status after Ctrl-C stopped a run
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.default_log_filter()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set logging subscriber")?;

    // Execute command
    let result = match &cli.command {
        Command::Init(cmd) => init(cmd),
        Command::GeneratePipeline(cmd) => generate_pipeline(cmd, &cli),
        Command::TestPipeline(cmd) => test_pipeline(cmd, &cli),
        Command::SetPipeline(cmd) => set_pipeline(cmd, &cli).await,
    };

    match result {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {}", CROSS, style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    Settings::load(&cli.settings).context("Failed to load settings")
}

fn init(cmd: &InitCommand) -> Result<bool> {
    let path = settings::init(&cmd.dir)?;
    println!(
        "{} Initialized concourse-kit in {}",
        CHECK,
        style(path.display()).bold()
    );
    Ok(true)
}

fn generate_pipeline(cmd: &GenerateCommand, cli: &Cli) -> Result<bool> {
    let settings = load_settings(cli)?;
    let fly = FlyClient::new(FlyClientConfig::new().with_binary(cli.fly.clone()));
    let engine = ExecutionEngine::new(fly, settings);

    let path = engine.generate_pipeline(&cmd.name, cmd.environment())?;
    println!(
        "{} Generated {} for {} at {}",
        CHECK,
        style(&cmd.name).bold(),
        style(cmd.environment()).cyan(),
        style(path.display()).dim()
    );
    Ok(true)
}

fn test_pipeline(cmd: &TestCommand, cli: &Cli) -> Result<bool> {
    let settings = load_settings(cli)?;
    let reports = match &cmd.name {
        Some(name) => vec![checks::run_checks(name, &settings)?],
        None => checks::run_all_checks(&settings)?,
    };

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else if reports.is_empty() {
        println!("{} No pipeline checks found", INFO);
    } else {
        for report in &reports {
            println!("{}", format_check_report(report));
        }
    }
    Ok(reports.iter().all(|r| r.is_success()))
}

async fn set_pipeline(cmd: &SetCommand, cli: &Cli) -> Result<bool> {
    let settings = load_settings(cli)?;
    let fly = FlyClient::new(FlyClientConfig::new().with_binary(cli.fly.clone()));
    let (interrupt, cancelled) = listen_for_interrupt();
    let mut engine = ExecutionEngine::new(fly, settings).with_interrupt(interrupt);
    if cmd.yes {
        engine = engine.with_preflight_delay(Duration::ZERO);
    }

    // Set up event handler for console output
    if !cmd.json {
        let spinner: Arc<Mutex<Option<ProgressBar>>> = Arc::new(Mutex::new(None));
        engine.add_event_handler(move |event| match &event {
            ExecutionEvent::PreflightStarted { delay, pipelines } => {
                let message = format!(
                    "Setting {} pipelines in {}s, press Ctrl-C to abort",
                    pipelines,
                    delay.as_secs()
                );
                if let Ok(mut slot) = spinner.lock() {
                    *slot = Some(create_spinner(message));
                }
            }
            ExecutionEvent::PreflightFinished { cancelled } => {
                if let Some(bar) = spinner.lock().ok().and_then(|mut slot| slot.take()) {
                    if *cancelled {
                        bar.abandon_with_message("Aborted");
                    } else {
                        bar.finish_and_clear();
                    }
                }
            }
            other => {
                if let Some(line) = format_execution_event(other) {
                    println!("{}", line);
                }
            }
        });
    }

    let mode = if cmd.plan { Mode::Plan } else { Mode::Apply };
    let request = EnvironmentRequest::parse(&cmd.env);
    let report = match &cmd.name {
        Some(name) => engine.set_pipeline(name, &request, mode).await?,
        None => match engine.set_all_pipelines(&request, mode, cancelled.notified()).await? {
            SetOutcome::Completed(report) => report,
            SetOutcome::Aborted => {
                println!("{} Aborted, no pipeline was set", WARN);
                return Ok(true);
            }
        },
    };

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("\n{}", format_set_summary(&report, mode));
    }
    if report.interrupted {
        std::process::exit(INTERRUPTED_EXIT_CODE);
    }
    Ok(report.is_success())
}

/// Keep Ctrl-C handled for the whole run
///
/// The first Ctrl-C cancels the pre-flight delay, or else stops the engine
/// after the pair in progress. A second one exits at once.
fn listen_for_interrupt() -> (Arc<AtomicBool>, Arc<Notify>) {
    let interrupt = Arc::new(AtomicBool::new(false));
    let cancelled = Arc::new(Notify::new());
    let (flag, notify) = (interrupt.clone(), cancelled.clone());
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if flag.swap(true, Ordering::SeqCst) {
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
            notify.notify_one();
        }
    });
    (interrupt, cancelled)
}
