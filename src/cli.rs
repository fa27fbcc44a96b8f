//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_audit_adapter::{self, CsvAuditAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::replay_venue::ReplayVenue;
use crate::adapters::scheduled_strategy::ScheduledStrategy;
use crate::domain::config_validation::{AppConfig, DEFAULT_LOG_FILTER, load_app_config};
use crate::domain::error::TradecheckError;
use crate::domain::record::RecordKind;
use crate::domain::session::{Session, SessionSummary};

#[derive(Parser, Debug)]
#[command(
    name = "tradecheck",
    about = "Strategy session runner with signal/order reconciliation audit"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a session from CSV history and write the audit trail
    Replay {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Summarise an audit directory
    Inspect {
        #[arg(short, long)]
        dir: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Replay { config } => run_replay(&config),
        Command::Validate { config } => run_validate(&config),
        Command::Inspect { dir } => run_inspect(&dir),
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `filter`.
pub fn init_logging(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    // A subscriber may already be installed (tests, repeated calls).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn load_config(path: &Path) -> Result<AppConfig, TradecheckError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    load_app_config(&adapter)
}

fn fail(err: &TradecheckError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

fn run_replay(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    init_logging(&config.log_filter);

    match replay(&config) {
        Ok(summary) => {
            print_summary(&summary);
            println!("audit written to {}", config.audit.dir.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

/// Runs a full replay session as configured.
pub fn replay(config: &AppConfig) -> Result<SessionSummary, TradecheckError> {
    let mut strategy = ScheduledStrategy::from_csv(&config.replay.signals)?;
    let venue = ReplayVenue::open(&config.session, &config.replay)?;
    let audit = CsvAuditAdapter::open(&config.audit.dir)?;

    let mut session = Session::new(config.session.clone(), venue, audit);
    session.run(&mut strategy)
}

fn print_summary(summary: &SessionSummary) {
    println!("cycles:           {}", summary.cycles);
    println!("failed cycles:    {}", summary.failed_cycles);
    println!("orders:           {}", summary.orders);
    println!("matched:          {}", summary.matched);
    println!("mismatched:       {}", summary.mismatched);
    println!("pending signals:  {}", summary.pending_signals);
}

fn run_validate(config_path: &Path) -> ExitCode {
    match load_config(config_path) {
        Ok(config) => {
            println!("Configuration is valid.");
            println!("  symbol:    {}", config.session.symbol);
            println!("  gateway:   {}", config.audit.gateway_name);
            println!("  audit dir: {}", config.audit.dir.display());
            println!("  data dir:  {}", config.replay.data_dir.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_inspect(dir: &Path) -> ExitCode {
    init_logging(DEFAULT_LOG_FILTER);
    let inspection = match csv_audit_adapter::inspect(dir) {
        Ok(i) => i,
        Err(e) => return fail(&e),
    };

    for kind in RecordKind::ALL {
        println!("{:<18} {}", kind.file_name(), inspection.rows_for(kind));
    }
    println!("MATCHED:           {}", inspection.matched);
    println!("MISMATCH:          {}", inspection.mismatched);
    println!("failed cycles:     {}", inspection.failed_cycles);
    ExitCode::SUCCESS
}
