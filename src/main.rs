//! Burrow CLI: load `burrow.toml`, then run a single routine, evaluate one
//! scheduler tick, or serve the scheduler live until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use burrow::{App, BurrowError, Settings};
use burrow_core::CancellationToken;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "burrow", about = "Scheduled data collection and LLM synthesis into Markdown reports")]
struct Cli {
    #[arg(long, global = true, default_value = "burrow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs one named routine immediately, ignoring its schedule.
    Run { routine: String },
    /// Evaluates every routine once and runs whichever are due, then exits.
    Once,
    /// Evaluates every routine on a fixed tick until interrupted (Ctrl-C).
    Serve {
        #[arg(long, default_value_t = 60)]
        tick_secs: u64,
    },
    /// Parses and validates every routine file without running anything.
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "burrow exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), BurrowError> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config).unwrap_or_else(|e| {
        tracing::warn!(error = %e, path = %cli.config.display(), "failed to load config; using defaults");
        Settings::default()
    });

    match cli.command {
        Command::Run { routine } => {
            let app = App::build(settings)?;
            let ctx = ctx_with_ctrl_c();
            let report = app.run_once(&ctx, &routine).await?;
            println!("{}", report.dir.display());
            Ok(())
        }
        Command::Once => {
            let app = App::build(settings)?;
            let ctx = ctx_with_ctrl_c();
            app.scheduler.tick_once(&ctx).await?;
            Ok(())
        }
        Command::Serve { tick_secs } => {
            let app = App::build(settings)?;
            let ctx = ctx_with_ctrl_c();
            app.scheduler.run_live(&ctx, Duration::from_secs(tick_secs)).await?;
            Ok(())
        }
        Command::Validate => {
            let routines = burrow_routine::load_dir(&settings.paths.routines_dir)?;
            for routine in &routines {
                tracing::info!(routine = %routine.name, sources = routine.sources.len(), "routine is valid");
            }
            println!("{} routine(s) valid", routines.len());
            Ok(())
        }
    }
}

/// A token that cancels itself the moment Ctrl-C is received, threaded
/// through every suspension point down to individual HTTP/LLM calls
/// (spec.md §5 "Context propagation").
fn ctx_with_ctrl_c() -> CancellationToken {
    let ctx = CancellationToken::new();
    let signal_ctx = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_ctx.cancel();
        }
    });
    ctx
}
