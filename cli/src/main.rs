use clap::{Parser, Subcommand};
use lapcounter_cli::commands;
use lapcounter_cli::readline;
use lapcounter_cli::render::TerminalRenderer;
use lapcounter_core::service::{self, ServiceHandle};
use lapcounter_core::{ConfigStore, LapSession};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;

/// Initialize logging, writing to LAPCOUNTER_LOG_PATH if set, otherwise stderr.
/// Returns the log file in use, if any.
fn init_logging() -> Option<PathBuf> {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    if let Ok(path) = std::env::var("LAPCOUNTER_LOG_PATH") {
        if let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_ansi(false)
                .with_writer(file)
                .init();
            return Some(PathBuf::from(path));
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
    None
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let log_path = init_logging();

    let config = ConfigStore::Confy.load();
    let last_directory = config.log_directory.clone();
    let mut session = LapSession::new(config);
    // Our own log may live in the watched directory.
    if let Some(path) = &log_path {
        session.exclude_path(path);
    }
    let (handle, task) = service::spawn(session, ConfigStore::Confy, TerminalRenderer);

    // Pick up where the last session left off
    if let Some(dir) = last_directory {
        commands::select_directory(&handle, &dir).await;
    }

    loop {
        let Some(line) = readline()? else {
            commands::exit(&handle).await;
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match respond(line, &handle).await {
            Ok(quit) => {
                if quit {
                    break;
                }
            }
            Err(err) => {
                write!(std::io::stdout(), "{err}").map_err(|e| e.to_string())?;
                std::io::stdout().flush().map_err(|e| e.to_string())?;
            }
        }
    }

    task.await.map_err(|e| e.to_string())?;
    Ok(())
}

#[derive(Parser)]
#[command(version, about = "lap counter")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a directory containing cardName.txt
    Dir {
        #[arg(short, long)]
        path: String,
    },
    /// Count punches with this control code
    Filter {
        #[arg(short, long)]
        code: String,
    },
    /// Laps per stage
    Divisor {
        #[arg(short, long, allow_hyphen_values = true)]
        n: String,
    },
    Show,
    Config,
    Stop,
    Exit,
}

async fn respond(line: &str, handle: &ServiceHandle) -> Result<bool, String> {
    let mut args = shlex::split(line).ok_or("error: Invalid quoting")?;
    args.insert(0, "lapcounter".to_string());
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;

    match &cli.command {
        Some(Commands::Dir { path }) => commands::select_directory(handle, path).await,
        Some(Commands::Filter { code }) => commands::set_filter_code(handle, code).await,
        Some(Commands::Divisor { n }) => commands::set_stage_divisor(handle, n).await,
        Some(Commands::Show) => commands::show(handle).await,
        Some(Commands::Config) => commands::show_status(handle).await,
        Some(Commands::Stop) => commands::stop(handle).await,
        Some(Commands::Exit) => {
            commands::exit(handle).await;
            return Ok(true);
        }
        None => {}
    }
    Ok(false)
}
