//! A simple CLI for the unit scoreboard.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::too_many_lines)]

mod poll;
mod render;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use scoreboard_common::client_api_sync::BackendClient;
use scoreboard_common::clock::{Clock, SystemClock};
use scoreboard_common::position_tracker::PositionChangeTracker;
use scoreboard_common::ranking::RankCache;
use scoreboard_common::session::{Session, SessionStore};
use scoreboard_common::task_visibility::{archived_ids_to_fetch, check_new_submission, partition};
use scoreboard_common::{CLIENT_VERSION, NewSubmission, UnitRecord};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// The base URL of the data service
    #[arg(
        long,
        global = true,
        default_value = "http://localhost:54321",
        env = "SCOREBOARD_API_BASE"
    )]
    api_base: String,

    /// The public API key of the data service
    #[arg(
        long,
        global = true,
        default_value = "",
        env = "SCOREBOARD_API_KEY",
        hide_env_values = true
    )]
    api_key: String,

    /// Where the login is stored between runs
    #[arg(
        long,
        global = true,
        default_value = ".scoreboard/session.json",
        env = "SCOREBOARD_SESSION_FILE"
    )]
    session_file: PathBuf,

    /// How many times to try each request before giving up
    #[arg(long, global = true, default_value_t = 3, env = "SCOREBOARD_MAX_RETRIES")]
    max_retries: u32,

    /// Suppress all output
    #[arg(short, long, global = true, env = "SCOREBOARD_QUIET")]
    quiet: bool,

    /// Show additional output
    #[arg(short, long, global = true, env = "SCOREBOARD_VERBOSE")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the unit leaderboard
    Leaderboard {
        /// Keep refreshing until interrupted
        #[arg(short, long, env = "SCOREBOARD_REPEAT")]
        repeat: bool,

        /// Seconds between refreshes
        #[arg(long, default_value_t = 30, env = "SCOREBOARD_INTERVAL")]
        interval: u64,
    },
    /// Show the tasks available to, pending for and completed by a unit
    Tasks {
        /// The unit id, defaults to the logged in unit
        #[arg(long, env = "SCOREBOARD_UNIT")]
        unit: Option<String>,
    },
    /// Submit a task for admin review
    Submit {
        /// The task id
        task: String,

        /// Link to the evidence
        #[arg(long)]
        proof_url: Option<String>,

        /// The unit id, defaults to the logged in unit
        #[arg(long, env = "SCOREBOARD_UNIT")]
        unit: Option<String>,
    },
    /// Log in as a unit
    LoginUnit {
        /// The unit name
        name: String,

        #[arg(long, env = "SCOREBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Log in as the administrator
    LoginAdmin {
        #[arg(long, env = "SCOREBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored login
    Logout,
    /// Show the stored login
    Whoami,
}

fn init_logger(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Run a blocking data-service call off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("Background request panicked")?
}

/// Pick the unit from the command line, falling back to the stored unit login.
fn resolve_unit(unit: Option<String>, sessions: &SessionStore) -> Result<String> {
    if let Some(unit) = unit {
        return Ok(unit);
    }
    match sessions.load()? {
        Some(Session::Unit { unit_id, .. }) => Ok(unit_id),
        Some(Session::Admin { .. }) => {
            bail!("Logged in as admin: pass --unit to pick a unit")
        }
        None => bail!("No unit given: pass --unit or log in with `scoreboard login-unit`"),
    }
}

/// Poll the units table and print the ranking, marking fresh moves.
async fn run_leaderboard(
    cli: &Cli,
    backend: &BackendClient,
    clock: Arc<dyn Clock>,
    repeat: bool,
    interval: u64,
) -> Result<()> {
    let mut tracker = PositionChangeTracker::new(clock);
    let mut rankings = RankCache::new();

    let outcome = poll::poll_until(
        || {
            let backend = backend.clone();
            blocking(move || backend.get_units())
        },
        |units: Vec<UnitRecord>| {
            let ranked = rankings.resolve(&units);
            tracker.observe(ranked);
            if !cli.quiet {
                println!("{}", render::format_leaderboard(ranked, &tracker));
            }
            if cli.verbose {
                println!(
                    "Position changes: {}",
                    serde_json::to_string_pretty(&tracker.changes())?
                );
            }
            Ok(())
        },
        poll::interrupted(),
        repeat,
        Duration::from_secs(interval.max(1)),
    )
    .await;

    tracker.dispose();
    outcome
}

async fn run_tasks(cli: &Cli, backend: &BackendClient, sessions: &SessionStore, unit: Option<String>) -> Result<()> {
    let unit_id = resolve_unit(unit, sessions)?;
    let backend = backend.clone();

    let board = blocking(move || {
        let mut tasks = backend.get_tasks()?;
        let submissions = backend.get_submissions_for_unit(&unit_id)?;

        // Completed history can point at tasks that have been archived since
        let archived = archived_ids_to_fetch(&tasks, &submissions);
        if !archived.is_empty() {
            log::debug!("Fetching {} archived tasks for history", archived.len());
            tasks.extend(backend.get_tasks_by_ids(&archived)?);
        }
        Ok(partition(&tasks, &submissions, &unit_id))
    })
    .await?;

    if cli.verbose {
        println!("Task board: {}", serde_json::to_string_pretty(&board)?);
    } else if !cli.quiet {
        print!("{}", render::format_task_board(&board));
    }
    Ok(())
}

async fn run_submit(
    cli: &Cli,
    backend: &BackendClient,
    sessions: &SessionStore,
    task_id: String,
    proof_url: Option<String>,
    unit: Option<String>,
) -> Result<()> {
    let unit_id = resolve_unit(unit, sessions)?;
    let backend = backend.clone();

    let record = blocking(move || {
        let task = backend
            .get_tasks_by_ids(std::slice::from_ref(&task_id))?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Task {task_id} not found"))?;
        let submissions = backend.get_submissions_for_unit(&unit_id)?;
        check_new_submission(&task, &unit_id, &submissions)?;

        backend.insert_submission(&NewSubmission {
            task_id: task.id,
            unit_id,
            proof_url,
        })
    })
    .await?;

    if !cli.quiet {
        println!(
            "Submitted task {} for review (submission {}).",
            record.task_id, record.id
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    // Values from a local .env file act as defaults for the environment
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let cli = Cli::parse();

    // Set up logger
    init_logger(&cli);
    log::debug!(
        "Scoreboard client v{CLIENT_VERSION} using {} with session file {}",
        cli.api_base,
        cli.session_file.display()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let outcome = runtime.block_on(run(&cli));

    // A request abandoned on Ctrl-C must not hold up the exit
    runtime.shutdown_timeout(Duration::from_millis(500));
    outcome
}

async fn run(cli: &Cli) -> Result<()> {
    let backend = BackendClient::new(cli.api_base.clone(), cli.api_key.clone(), cli.max_retries);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sessions = SessionStore::new(cli.session_file.clone(), Arc::clone(&clock));

    match &cli.command {
        Command::Leaderboard { repeat, interval } => {
            run_leaderboard(cli, &backend, clock, *repeat, *interval).await
        }
        Command::Tasks { unit } => run_tasks(cli, &backend, &sessions, unit.clone()).await,
        Command::Submit {
            task,
            proof_url,
            unit,
        } => {
            run_submit(
                cli,
                &backend,
                &sessions,
                task.clone(),
                proof_url.clone(),
                unit.clone(),
            )
            .await
        }
        Command::LoginUnit { name, password } => {
            let login = {
                let backend = backend.clone();
                let (name, password) = (name.clone(), password.clone());
                blocking(move || backend.authenticate_unit(&name, &password)).await?
            };
            let Some(login) = login else {
                bail!("Unit name or password was rejected");
            };
            sessions.save(&Session::unit(&login.id, &login.name, clock.as_ref()))?;
            if !cli.quiet {
                println!("Logged in as unit {} ({}).", login.name, login.id);
            }
            Ok(())
        }
        Command::LoginAdmin { password } => {
            let accepted = {
                let backend = backend.clone();
                let password = password.clone();
                blocking(move || backend.authenticate_admin(&password)).await?
            };
            if !accepted {
                bail!("Admin password was rejected");
            }
            sessions.save(&Session::admin(clock.as_ref()))?;
            if !cli.quiet {
                println!("Logged in as admin.");
            }
            Ok(())
        }
        Command::Logout => sessions.clear(),
        Command::Whoami => {
            match sessions.load()? {
                Some(Session::Admin { expires_at }) => {
                    println!("Admin, session valid until {expires_at}.");
                }
                Some(Session::Unit {
                    unit_id,
                    unit_name,
                    expires_at,
                }) => {
                    println!("Unit {unit_name} ({unit_id}), session valid until {expires_at}.");
                }
                None => println!("Not logged in."),
            }
            Ok(())
        }
    }
}
