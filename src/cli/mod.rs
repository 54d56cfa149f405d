use std::fs::File;
use std::io::{stdin, stdout, Read};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::task::JoinSet;

use crate::application::{AppError, LedgerConfig, LedgerService};
use crate::domain::{format_points, Balance, Points, UserId};
use crate::io::{Exporter, Importer};

/// Pointledger - per-user point balances with an append-only history
#[derive(Parser)]
#[command(name = "pointledger")]
#[command(about = "Per-user point ledger with serialized charge/use operations")]
#[command(version)]
pub struct Cli {
    /// Give up on a mutation after waiting this long for its user's lock
    #[arg(long, global = true)]
    pub lock_timeout_ms: Option<u64>,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply a CSV batch of operations (user_id,kind,amount) and print the result
    Replay {
        /// Input file (stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Also print the committed history
        #[arg(long)]
        history: bool,
    },

    /// Fire concurrent charges and verify no update was lost
    Stress {
        /// Number of distinct users
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
        users: u64,

        /// Concurrent charges per user
        #[arg(long, default_value_t = 100)]
        tasks: usize,

        /// Points per charge
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(i64).range(1..))]
        amount: Points,

        /// Upper bound on charges in flight at once
        #[arg(long, default_value_t = 1024, value_parser = clap::value_parser!(u32).range(1..))]
        max_in_flight: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Csv,
    Json,
}

impl Cli {
    fn config(&self) -> LedgerConfig {
        LedgerConfig {
            lock_timeout_ms: self.lock_timeout_ms,
        }
    }

    pub async fn run(self) -> Result<()> {
        let service = Arc::new(LedgerService::new(self.config()));

        match self.command {
            Commands::Replay {
                input,
                format,
                history,
            } => run_replay_command(service, input.as_deref(), format, history).await,
            Commands::Stress {
                users,
                tasks,
                amount,
                max_in_flight,
            } => run_stress_command(service, users, tasks, amount, max_in_flight as usize).await,
        }
    }
}

async fn run_replay_command(
    service: Arc<LedgerService>,
    input: Option<&str>,
    format: OutputFormat,
    show_history: bool,
) -> Result<()> {
    let reader: Box<dyn Read> = match input {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("Failed to open input file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdin()),
    };

    let importer = Importer::new(Arc::clone(&service));
    let (parsed, result) = importer.import_csv(reader).await?;

    eprintln!("Replay complete");
    eprintln!("  Applied:   {}", result.applied);
    eprintln!("  Rejected:  {}", result.rejected.len());
    eprintln!("  Malformed: {}", parsed.errors.len());

    let exporter = Exporter::new(&service);
    match format {
        OutputFormat::Json => {
            exporter.snapshot_json(stdout())?;
            println!();
        }
        OutputFormat::Csv => {
            exporter.balances_csv(stdout())?;
            if show_history {
                println!();
                exporter.history_csv(stdout())?;
            }
        }
        OutputFormat::Table => {
            print_balances_table(&service);
            if show_history {
                println!();
                print_history_table(&service);
            }
        }
    }

    if !result.rejected.is_empty() {
        eprintln!("\nRejected operations:");
        for rejection in result.rejected.iter().take(10) {
            eprintln!(
                "  Line {}: {} {} for user {}: {}",
                rejection.operation.line,
                rejection.operation.kind,
                format_points(rejection.operation.amount),
                rejection.operation.user_id,
                rejection.error
            );
        }
        if result.rejected.len() > 10 {
            eprintln!("  ... and {} more", result.rejected.len() - 10);
        }
    }

    Ok(())
}

fn print_balances_table(service: &LedgerService) {
    let balances = service.list_balances();
    if balances.is_empty() {
        println!("No balances.");
        return;
    }

    println!("{:<10} {:>16} {:<25}", "USER", "BALANCE", "UPDATED");
    println!("{}", "-".repeat(53));
    for balance in balances {
        println!(
            "{:<10} {:>16} {:<25}",
            balance.user_id,
            format_points(balance.amount),
            balance.updated_at.format("%Y-%m-%d %H:%M:%S%.6f")
        );
    }
}

fn print_history_table(service: &LedgerService) {
    let entries = service.list_history();
    if entries.is_empty() {
        println!("No history.");
        return;
    }

    println!(
        "{:<8} {:<10} {:<8} {:>16} {:<25}",
        "ID", "USER", "KIND", "AMOUNT", "TIMESTAMP"
    );
    println!("{}", "-".repeat(71));
    for entry in entries {
        println!(
            "{:<8} {:<10} {:<8} {:>16} {:<25}",
            entry.id,
            entry.user_id,
            entry.kind,
            format_points(entry.amount),
            entry.timestamp.format("%Y-%m-%d %H:%M:%S%.6f")
        );
    }
}

async fn run_stress_command(
    service: Arc<LedgerService>,
    users: u64,
    tasks: usize,
    amount: Points,
    max_in_flight: usize,
) -> Result<()> {
    let total = total_operations(users, tasks)?;
    let started = Instant::now();
    let mut set = JoinSet::new();
    let mut failures = 0usize;

    for user_id in 1..=users {
        for _ in 0..tasks {
            if set.len() >= max_in_flight {
                if let Some(joined) = set.join_next().await {
                    failures += record_charge(joined)?;
                }
            }
            let service = Arc::clone(&service);
            set.spawn(async move { service.charge(user_id, amount).await });
        }
    }
    while let Some(joined) = set.join_next().await {
        failures += record_charge(joined)?;
    }
    let elapsed = started.elapsed();

    let violations = verify_stress_outcome(&service, users, tasks, amount, failures);

    println!(
        "{} charges over {} users in {:.2?} ({} failed)",
        total, users, elapsed, failures
    );
    print_throughput(total, elapsed);

    if !violations.is_empty() {
        for violation in &violations {
            eprintln!("  {}", violation);
        }
        anyhow::bail!("{} invariant violation(s)", violations.len());
    }

    println!("All invariants hold.");
    Ok(())
}

/// Number of charges a stress run issues, refusing sizes that do not fit.
fn total_operations(users: u64, tasks: usize) -> Result<usize> {
    usize::try_from(users)
        .ok()
        .and_then(|users| users.checked_mul(tasks))
        .with_context(|| format!("{} users x {} tasks is too many charges", users, tasks))
}

/// Returns 1 for a charge the ledger refused, 0 for a committed one.
fn record_charge(
    joined: std::result::Result<std::result::Result<Balance, AppError>, tokio::task::JoinError>,
) -> Result<usize> {
    match joined.context("Charge task failed")? {
        Ok(_) => Ok(0),
        Err(e) => {
            tracing::warn!("{}", e);
            Ok(1)
        }
    }
}

fn verify_stress_outcome(
    service: &LedgerService,
    users: UserId,
    tasks: usize,
    amount: Points,
    failures: usize,
) -> Vec<String> {
    let mut violations = Vec::new();
    let expected = Points::try_from(tasks)
        .ok()
        .and_then(|tasks| amount.checked_mul(tasks));

    for user_id in 1..=users {
        let snapshot = service.snapshot(user_id);
        if failures == 0 {
            if Some(snapshot.balance.amount) != expected {
                violations.push(format!(
                    "user {}: balance {} but expected {:?}",
                    user_id, snapshot.balance.amount, expected
                ));
            }
            if snapshot.history.len() != tasks {
                violations.push(format!(
                    "user {}: {} history entries but {} charges",
                    user_id,
                    snapshot.history.len(),
                    tasks
                ));
            }
        }

        let report = service.verify_user(user_id);
        violations.extend(
            report
                .issues
                .into_iter()
                .map(|issue| format!("user {}: {}", user_id, issue)),
        );
    }

    let lingering = service.locks().active_users();
    if lingering > 0 {
        violations.push(format!("{} user lock(s) still registered", lingering));
    }

    violations
}

fn print_throughput(operations: usize, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        println!("  ~{:.0} ops/s", operations as f64 / secs);
    }
}
