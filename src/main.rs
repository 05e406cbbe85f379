use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use elchbot::application::errors::BotError;
use elchbot::application::lifecycle::CancelToken;
use elchbot::application::worker::{run_in_thread, Worker};
use elchbot::infrastructure::adapters::console::{stdin_lines, Console, Renderer};
use elchbot::infrastructure::channel::local_endpoints;
use elchbot::infrastructure::channel::process::{stdio_endpoints, WorkerExit, WorkerProcess};
use elchbot::infrastructure::config::Config;
use elchbot::infrastructure::logging::{worker_subscriber, LogLevel};

#[derive(Parser)]
#[command(name = "elchbot")]
#[command(about = "Chat bot with hot-reloadable command modules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the operator console and the bot
    Run {
        /// Run the worker on a thread instead of a child process
        #[arg(long)]
        in_process: bool,
    },
    /// Chat-connection worker, spawned by `run`
    #[command(hide = true)]
    Worker,
    /// Show version
    Version,
    /// Print a default config
    InitConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { in_process } => {
            init_console_tracing();
            run_console(&cli.config, in_process)
        }
        Commands::Worker => run_worker(&cli.config),
        Commands::Version => {
            println!("elchbot v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::InitConfig => init_config(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

fn init_console_tracing() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
}

/// Config file plus environment, checked for everything the worker needs
fn load_config(path: &Path) -> Result<Config, BotError> {
    let config = Config::load_with_env(path)?;
    config.validate()?;
    Ok(config)
}

fn run_console(config_path: &Path, in_process: bool) -> Result<(), BotError> {
    let config = load_config(config_path)?;
    let grace = config.console.shutdown_grace();
    let runtime = tokio::runtime::Runtime::new()?;

    let result = runtime.block_on(async {
        if in_process {
            let (console_side, worker_side) = local_endpoints();
            let worker = std::thread::Builder::new()
                .name("elchbot-worker".into())
                .spawn(move || run_in_thread(config, worker_side))?;

            Console::new(console_side, Renderer::stdout(), grace)
                .run(stdin_lines())
                .await?;

            let joined = tokio::time::timeout(grace, tokio::task::spawn_blocking(move || worker.join())).await;
            match joined {
                Ok(Ok(Ok(result))) => result,
                Ok(_) => Err(BotError::Internal("worker thread panicked".into())),
                Err(_) => {
                    tracing::warn!("Worker thread did not stop within {:?}", grace);
                    Ok(())
                }
            }
        } else {
            let program = std::env::current_exe()?;
            let args: Vec<OsString> = vec![
                "--config".into(),
                config_path.as_os_str().to_owned(),
                "worker".into(),
            ];
            let (process, console_side) = WorkerProcess::spawn(&program, &args)?;

            Console::new(console_side, Renderer::stdout(), grace)
                .run(stdin_lines())
                .await?;

            match process.wait_or_kill(grace).await? {
                WorkerExit::Exited(status) if !status.success() => {
                    Err(BotError::Internal(format!("worker exited with {}", status)))
                }
                WorkerExit::Exited(_) => Ok(()),
                WorkerExit::Killed => Ok(()),
            }
        }
    });

    // the stdin reader thread may still be blocked on a read
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

fn run_worker(config_path: &Path) -> Result<(), BotError> {
    let config = load_config(config_path)?;
    let grace = config.console.shutdown_grace();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async move {
        let (endpoints, bridge) = stdio_endpoints();
        if tracing::subscriber::set_global_default(worker_subscriber(endpoints.logs.clone())).is_err() {
            endpoints.logs.warning("Tracing was already initialised");
        }

        let result = match Worker::open(config, endpoints.logs.clone()) {
            Ok(worker) => worker.run(endpoints.commands, CancelToken::new()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            endpoints.logs.log(LogLevel::Fatal, format!("Worker failed: {}", e));
        }
        bridge.finish(grace).await;
        result
    });

    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

fn init_config() -> Result<(), BotError> {
    let yaml = serde_yaml::to_string(&Config::example())
        .map_err(|e| BotError::Internal(format!("Failed to render config: {}", e)))?;
    println!("{}", yaml);
    println!("# Save this to config.yaml and fill in the credentials.");
    Ok(())
}
