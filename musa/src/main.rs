//! musa - banana-farm assistant
//!
//! Command-line front end: guest and signed-in image analysis, plantings,
//! and task completion.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Store: $XDG_DATA_HOME/musa/musa.db (~/.local/share/musa/musa.db)
//! - Config: $XDG_CONFIG_HOME/musa/config.toml (~/.config/musa/config.toml)
//! - Logs: $XDG_STATE_HOME/musa/musa.log (~/.local/state/musa/musa.log)

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use musa_core::analysis::{AnalysisSession, ImageUpload, SubmissionState, Submitter};
use musa_core::device::get_or_create_device_id;
use musa_core::stage::{Actionability, StageKey};
use musa_core::{
    AnalysisCategory, BackendClient, Config, GuestUsageTracker, LocalStore, NewPlanting, Planting,
    Role, Session, Task, TaskBoard, GUEST_ATTEMPT_LIMIT,
};

#[derive(Parser)]
#[command(name = "musa")]
#[command(about = "Banana-farm assistant")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print this profile's guest device id
    Device,

    /// Store a session token
    Login {
        /// Bearer token issued by the backend
        #[arg(long)]
        token: String,

        #[arg(long)]
        user_id: String,

        /// ADMIN or FARMER
        #[arg(long, default_value = "FARMER")]
        role: String,
    },

    /// Forget the stored session (the device id is kept)
    Logout,

    /// Show who is signed in
    Whoami,

    /// Show guest usage for this device
    Usage {
        #[arg(short, long, default_value = "disease")]
        category: AnalysisCategory,
    },

    /// Analyze a banana plant image
    Analyze {
        image: PathBuf,

        /// disease or variety
        #[arg(short, long, default_value = "disease")]
        category: AnalysisCategory,
    },

    /// Manage plantings
    Plantings {
        #[command(subcommand)]
        command: PlantingsCommand,
    },

    /// List and complete planting tasks
    Tasks {
        #[command(subcommand)]
        command: TasksCommand,
    },
}

#[derive(Subcommand)]
enum PlantingsCommand {
    /// List plantings
    List {
        /// Only plantings that are not finished
        #[arg(short, long)]
        active: bool,
    },

    /// Show a planting with its tasks grouped by stage
    Show { id: i64 },

    /// Create a planting
    Create {
        /// Plot identifier, e.g. North-2
        #[arg(long)]
        plot: String,

        /// YYYY-MM-DD
        #[arg(long)]
        planting_date: NaiveDate,

        #[arg(long)]
        plants: u32,

        #[arg(long)]
        variety: String,
    },
}

#[derive(Subcommand)]
enum TasksCommand {
    /// List a planting's tasks; tasks of later stages are locked
    List { planting_id: i64 },

    /// Mark a task completed
    Complete { planting_id: i64, task_id: i64 },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging (to file, stdout is for command output)
    let log_guard =
        musa_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let result = run(args.command, &config);

    if let Err(err) = &result {
        tracing::error!(error = %format!("{:#}", err), "Command failed");
        match err.downcast_ref::<musa_core::Error>() {
            Some(core) => eprintln!("{}", core.user_message()),
            None => eprintln!("Error: {:#}", err),
        }
        drop(log_guard);
        std::process::exit(1);
    }

    Ok(())
}

fn run(command: Command, config: &Config) -> Result<()> {
    let store_path = Config::store_path();
    tracing::debug!(path = %store_path.display(), "Opening local store");
    let store = LocalStore::open(&store_path).context("failed to open local store")?;

    match command {
        Command::Device => cmd_device(&store),
        Command::Login {
            token,
            user_id,
            role,
        } => cmd_login(&store, token, user_id, &role),
        Command::Logout => cmd_logout(&store),
        Command::Whoami => cmd_whoami(&store),
        Command::Usage { category } => block_on(cmd_usage(config, &store, category)),
        Command::Analyze { image, category } => {
            block_on(cmd_analyze(config, &store, image, category))
        }
        Command::Plantings { command } => block_on(cmd_plantings(config, &store, command)),
        Command::Tasks { command } => block_on(cmd_tasks(config, &store, command)),
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create runtime")?;
    runtime.block_on(future)
}

fn backend_client(config: &Config) -> Result<BackendClient> {
    let url = config.backend.require_url()?;
    Ok(BackendClient::new(url, config.backend.timeout_secs)?)
}

fn proxy_client(config: &Config) -> Result<BackendClient> {
    Ok(BackendClient::new(
        &config.proxy.url,
        config.proxy.timeout_secs,
    )?)
}

// ============================================
// Identity and session
// ============================================

fn cmd_device(store: &LocalStore) -> Result<()> {
    let device = get_or_create_device_id(store)?;
    println!("{}", device);
    Ok(())
}

fn cmd_login(store: &LocalStore, token: String, user_id: String, role: &str) -> Result<()> {
    let role: Role = role.parse().unwrap_or(Role::Farmer);
    let session = Session::new(token, user_id, role);
    session.save(store)?;
    println!("Signed in as {} ({})", session.user_id, session.role);
    Ok(())
}

fn cmd_logout(store: &LocalStore) -> Result<()> {
    Session::clear(store)?;
    println!("Signed out");
    Ok(())
}

fn cmd_whoami(store: &LocalStore) -> Result<()> {
    let device = get_or_create_device_id(store)?;
    match Session::load(store)? {
        Some(session) => {
            println!("User:   {}", session.user_id);
            println!("Role:   {}", session.role);
        }
        None => println!("Not signed in"),
    }
    println!("Device: {}", device);
    println!(
        "Logs:   {}.*",
        musa_core::logging::log_file_path().display()
    );
    Ok(())
}

// ============================================
// Analysis
// ============================================

async fn cmd_usage(config: &Config, store: &LocalStore, category: AnalysisCategory) -> Result<()> {
    if Session::load(store)?.is_some() {
        println!("Signed in: no guest limits apply");
        return Ok(());
    }

    let device = get_or_create_device_id(store)?;
    let tracker = GuestUsageTracker::new(backend_client(config)?);
    let usage = tracker.check_usage(&device, category).await;
    let limited = tracker.check_limit(&device, category).await;

    println!("Device:    {}", device);
    println!("Category:  {}", category);
    println!("Attempts:  {}/{}", usage.attempts, GUEST_ATTEMPT_LIMIT);
    println!("Remaining: {}", usage.remaining());
    if limited || usage.limit_reached || usage.requires_signup {
        println!();
        println!("{}", signup_prompt());
    }
    Ok(())
}

async fn cmd_analyze(
    config: &Config,
    store: &LocalStore,
    image: PathBuf,
    category: AnalysisCategory,
) -> Result<()> {
    let upload = ImageUpload::from_path(&image)
        .with_context(|| format!("failed to read {}", image.display()))?;

    // Guests call the backend directly; signed-in requests go through the proxy.
    let (submitter, client) = match Session::load(store)? {
        Some(session) => (Submitter::User(session), proxy_client(config)?),
        None => (
            Submitter::Guest(get_or_create_device_id(store)?),
            backend_client(config)?,
        ),
    };

    let mut session = AnalysisSession::new(category, submitter);
    if session.is_guest() {
        session
            .refresh_usage(&GuestUsageTracker::new(client.clone()))
            .await;
    }

    let state = session.submit(&client, &upload).await.clone();
    match state {
        SubmissionState::Success(result) => {
            for line in result.summary_lines() {
                println!("{}", line);
            }
            if session.is_guest() {
                println!("Free analyses remaining: {}", session.remaining_attempts());
            }
            if session.show_signup_modal {
                println!();
                println!("{}", signup_prompt());
            }
            Ok(())
        }
        SubmissionState::Limited => Err(musa_core::Error::LimitReached.into()),
        SubmissionState::Error(message) => Err(anyhow::anyhow!(message)),
        SubmissionState::Idle | SubmissionState::Submitting => {
            Err(anyhow::anyhow!("analysis did not finish"))
        }
    }
}

fn signup_prompt() -> &'static str {
    "You have used all free analyses. Sign up to keep going: musa login --token <token> --user-id <id>"
}

// ============================================
// Plantings and tasks
// ============================================

async fn cmd_plantings(
    config: &Config,
    store: &LocalStore,
    command: PlantingsCommand,
) -> Result<()> {
    let session = Session::require(store)?;
    let client = proxy_client(config)?;

    match command {
        PlantingsCommand::List { active } => {
            let plantings = client.plantings(&session, active).await?;
            if plantings.is_empty() {
                println!("No plantings found.");
                return Ok(());
            }
            println!(
                "{:<6} {:<16} {:<14} {:<18} {:>8}",
                "ID", "PLOT", "VARIETY", "STAGE", "PROGRESS"
            );
            for planting in &plantings {
                println!(
                    "{:<6} {:<16} {:<14} {:<18} {:>7}%",
                    planting.id,
                    planting.plot_identifier,
                    planting.banana_variety,
                    planting.current_stage.label(),
                    planting.progress_percentage
                );
            }
            Ok(())
        }
        PlantingsCommand::Show { id } => {
            let board = TaskBoard::load(&client, &session, id).await?;
            print_planting_header(board.planting());
            print_tasks(&board, Actionability::All);
            Ok(())
        }
        PlantingsCommand::Create {
            plot,
            planting_date,
            plants,
            variety,
        } => {
            let new_planting = NewPlanting {
                plot_identifier: plot,
                planting_date,
                number_of_plants: plants,
                banana_variety: variety,
            };
            let planting = client.create_planting(&new_planting, &session).await?;
            println!(
                "Created planting {} on plot {} ({})",
                planting.id,
                planting.plot_identifier,
                planting.current_stage.label()
            );
            Ok(())
        }
    }
}

async fn cmd_tasks(config: &Config, store: &LocalStore, command: TasksCommand) -> Result<()> {
    // Checked before any request so nothing is sent without a token.
    let session = Session::require(store)?;
    let client = proxy_client(config)?;

    match command {
        TasksCommand::List { planting_id } => {
            let board = TaskBoard::load(&client, &session, planting_id).await?;
            print_planting_header(board.planting());
            print_tasks(&board, Actionability::UpToCurrentStage);
            Ok(())
        }
        TasksCommand::Complete {
            planting_id,
            task_id,
        } => {
            let mut board = TaskBoard::load(&client, &session, planting_id)
                .await?
                .with_refetch(config.tasks.refetch_after_complete);

            let report = board.complete_task(&client, Some(&session), task_id).await?;

            println!("Task {} completed", report.task_id);
            println!("Progress: {}%", report.progress_percentage);
            for notice in board.take_notices() {
                println!("{}", notice);
            }
            Ok(())
        }
    }
}

fn print_planting_header(planting: &Planting) {
    println!("Planting {} - plot {}", planting.id, planting.plot_identifier);
    println!("Variety:  {}", planting.banana_variety);
    println!("Plants:   {}", planting.number_of_plants);
    if let Some(date) = planting.planting_date {
        println!("Planted:  {}", date);
    }
    if let Some(date) = planting.expected_harvest_date {
        println!("Harvest:  {}", date);
    }
    println!("Stage:    {}", planting.current_stage.label());
    println!(
        "Progress: {}% ({}/{} tasks)",
        planting.progress_percentage, planting.completed_tasks_count, planting.total_tasks_count
    );
}

fn print_tasks(board: &TaskBoard, actionability: Actionability) {
    for (key, tasks) in board.groups() {
        println!();
        match key {
            StageKey::Stage(stage) if stage == board.current_stage() => {
                println!("{} (current)", stage.label())
            }
            StageKey::Stage(stage) => println!("{}", stage.label()),
            StageKey::Unassigned => println!("Other"),
        }
        for task in tasks {
            println!("  {}", task_line(board, task, actionability));
        }
    }
}

fn task_line(board: &TaskBoard, task: &Task, actionability: Actionability) -> String {
    let mark = if task.is_completed() {
        "[x]"
    } else if board.is_actionable(task, actionability) {
        "[ ]"
    } else {
        "[-]"
    };
    let due = task
        .due_date
        .map(|d| format!(", due {}", d))
        .unwrap_or_default();
    format!(
        "{} #{} {} ({}{})",
        mark,
        task.id,
        task.description,
        task.priority.as_str(),
        due
    )
}
