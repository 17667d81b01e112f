//! Reference launcher built on the pipewright core.
//!
//! Wires the default managers onto a service locator, runs the validation
//! gate, evaluates the script with the JSON reference evaluator, and exits
//! `0` on job success / `1` on failure.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pipewright::context::{
    EnvironmentStore, ParameterStore, PipelineContext, ServiceLocator, WorkspaceManager,
};
use pipewright::event_bus::{ConsoleSink, PipelineEventBus};
use pipewright::interfaces::{ConfigurationLoader, EngineConfig, JsonConfigLoader, JsonEvaluator};
use pipewright::logging::{ConsoleConsumer, LoggingCore};
use pipewright::runtime::{JobLauncher, RunnerConfig};
use pipewright::secrets::SecretStore;
use pipewright::steps::StepRegistry;

#[derive(Debug, Parser)]
#[command(name = "pipewright", version, about = "Run a pipeline script")]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Pipeline script to execute
    #[arg(short = 's', long = "script")]
    script: PathBuf,

    /// Verbose engine diagnostics
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "pipewright=debug"
    } else {
        "pipewright=warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<EngineConfig, ExitCode> {
    match &cli.config {
        Some(path) => JsonConfigLoader.load(path).map_err(|err| {
            eprintln!("{err}");
            ExitCode::FAILURE
        }),
        None => Ok(EngineConfig::default()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let services = Arc::new(ServiceLocator::new());
    let env = Arc::new(EnvironmentStore::new());
    services.register(Arc::clone(&env));
    services.register(Arc::new(ParameterStore::new()));
    services.register(Arc::new(SecretStore::new(env)));

    let logging = Arc::new(LoggingCore::new(config.log_config()));
    logging.add_consumer(Arc::new(ConsoleConsumer));
    services.register(Arc::clone(&logging));

    let console = if cli.verbose {
        ConsoleSink::default().verbose()
    } else {
        ConsoleSink::default()
    };
    let bus = Arc::new(PipelineEventBus::with_sink(console));
    bus.listen_for_events();
    services.register(Arc::clone(&bus));

    let workspace_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match WorkspaceManager::local(workspace_root) {
        Ok(manager) => services.register(Arc::new(manager)),
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    }

    let script_name = cli.script.display().to_string();
    let ctx = Arc::new(PipelineContext::new(script_name, services));

    let registry = Arc::new(StepRegistry::with_builtins());
    // The JSON evaluator consumes already-evaluated descriptions; the DSL
    // validation gate applies upstream, where the textual script lives.
    let launcher = JobLauncher::new(registry)
        .without_validation()
        .with_config(RunnerConfig {
            limits: config.limits,
            monitor: config.monitor_config(),
        });

    let result = launcher
        .launch_script(&JsonEvaluator, &cli.script, Arc::clone(&ctx))
        .await;

    for stage in &result.stages {
        println!(
            "{:<24} {:<10} {:>6} ms{}",
            stage.name,
            stage.status,
            stage.duration_ms,
            stage
                .error
                .as_deref()
                .map(|e| format!("  {e}"))
                .unwrap_or_default()
        );
    }

    logging
        .shutdown(std::time::Duration::from_secs(2))
        .await;
    bus.stop_listener().await;

    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
