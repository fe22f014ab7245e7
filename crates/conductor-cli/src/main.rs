use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use conductor_core::config::ConductorConfig;
use conductor_engine::{ExecutionEngine, Orchestrator, Poller};
use conductor_schtasks::SchtasksAdapter;
use conductor_store::{DependencySpec, TaskDefinition, TaskStatus, TaskStore};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "conductor", about = "Task scheduling and execution engine")]
struct Cli {
    /// Path to the config file (overrides CONDUCTOR_CONFIG).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Define a task, or replace an existing definition of the same name.
    Add {
        name: String,
        #[arg(long = "type", default_value = "task")]
        task_type: String,
        #[arg(long)]
        command: String,
        /// Schedule expression; omit for a manual-only task.
        #[arg(long)]
        schedule: Option<String>,
        #[arg(long, default_value_t = conductor_core::config::DEFAULT_TIMEOUT_SECS)]
        timeout: u64,
        #[arg(long, default_value_t = 0)]
        retries: u32,
        #[arg(long, default_value_t = conductor_core::config::DEFAULT_RETRY_DELAY_SECS)]
        retry_delay: u64,
        /// Dependency spec "kind:value", repeatable (task:, file:, url:, cmd:).
        #[arg(long = "dep")]
        deps: Vec<String>,
    },
    /// Remove a task: unregister it from the scheduler, then delete the
    /// definition and its result history.
    Remove { name: String },
    /// List task definitions.
    List {
        #[arg(long)]
        all: bool,
    },
    /// Register a task's schedule with the external scheduler.
    Schedule { name: String },
    /// Register every enabled task that has a schedule.
    ScheduleAll,
    /// Unregister a task from the external scheduler.
    Unschedule { name: String },
    /// Change a task's schedule and/or command, keeping the scheduler in sync.
    Update {
        name: String,
        #[arg(long)]
        schedule: Option<String>,
        #[arg(long)]
        command: Option<String>,
    },
    /// Run a task now. This is also the entry point the external scheduler
    /// invokes when a registered trigger fires.
    Execute { name: String },
    /// List entries currently registered with the external scheduler.
    ListScheduled,
    /// Show recent results for a task, newest first.
    History {
        name: String,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Re-enable a disabled task.
    Enable { name: String },
    /// Disable a task without deleting it.
    Disable { name: String },
    /// Check whether a schedule expression is supported.
    Validate { expr: String },
    /// Run the portable polling fallback until interrupted.
    Poller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conductor=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: explicit flag > CONDUCTOR_CONFIG env > ~/.conductor/conductor.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("CONDUCTOR_CONFIG").ok());
    let config = ConductorConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        ConductorConfig::default()
    });

    ensure_parent_dir(&config.database.path);
    let store = Arc::new(
        TaskStore::open(&config.database.path)
            .with_context(|| format!("opening database at {}", config.database.path))?,
    );
    let adapter = Arc::new(SchtasksAdapter::new(&config.scheduler));
    let orchestrator = Orchestrator::new(Arc::clone(&store), adapter);

    match cli.command {
        Command::Add {
            name,
            task_type,
            command,
            schedule,
            timeout,
            retries,
            retry_delay,
            deps,
        } => {
            if let Some(expr) = schedule.as_deref() {
                let (ok, detail) = conductor_schedule::validate(expr);
                if !ok {
                    anyhow::bail!("unsupported schedule {expr:?}: {detail}");
                }
            }
            let mut def = TaskDefinition::new(&name, &task_type, &command);
            def.schedule = schedule;
            def.timeout_secs = timeout;
            def.retry_count = retries;
            def.retry_delay_secs = retry_delay;
            def.dependencies = deps.into_iter().map(DependencySpec::from).collect();
            store.add_task(&def)?;
            info!(task = %name, "task saved");
        }
        Command::Remove { name } => {
            orchestrator.unschedule(&name).await?;
            if store.delete_task(&name)? {
                info!(task = %name, "task deleted");
            } else {
                warn!(task = %name, "no such task");
            }
        }
        Command::List { all } => {
            for def in store.list_tasks(!all)? {
                let schedule = def.schedule.as_deref().unwrap_or("manual");
                let state = if def.enabled { "" } else { " (disabled)" };
                println!("{:<24} {:<10} {}{}", def.name, def.task_type, schedule, state);
            }
        }
        Command::Schedule { name } => {
            if !orchestrator.schedule(&name).await? {
                std::process::exit(1);
            }
            println!("scheduled {name}");
        }
        Command::ScheduleAll => {
            let mut failed = false;
            for (name, ok) in orchestrator.schedule_all().await? {
                println!("{} {}", if ok { "scheduled" } else { "FAILED" }, name);
                failed |= !ok;
            }
            if failed {
                std::process::exit(1);
            }
        }
        Command::Unschedule { name } => {
            orchestrator.unschedule(&name).await?;
            println!("unscheduled {name}");
        }
        Command::Update {
            name,
            schedule,
            command,
        } => {
            orchestrator
                .update(&name, schedule.as_deref(), command.as_deref())
                .await?;
            println!("updated {name}");
        }
        Command::Execute { name } => {
            let result = orchestrator.execute(&name).await?;
            match result.status {
                TaskStatus::Success => println!("{name}: SUCCESS"),
                status => {
                    eprintln!("{name}: {status} — {}", result.error);
                    std::process::exit(1);
                }
            }
        }
        Command::ListScheduled => {
            for entry in orchestrator.list_scheduled().await {
                println!(
                    "{:<32} {:<12} {}",
                    entry.conductor_name().unwrap_or(&entry.task_name),
                    entry.status.as_deref().unwrap_or("-"),
                    entry.next_run_time.as_deref().unwrap_or("-"),
                );
            }
        }
        Command::History { name, limit } => {
            for r in store.history(&name, limit)? {
                let end = r
                    .end_time
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:<10} attempt={} start={} end={} exit={:?}",
                    r.status.to_string(),
                    r.retry_count,
                    r.start_time.to_rfc3339(),
                    end,
                    r.exit_code,
                );
            }
        }
        Command::Enable { name } => set_enabled(&orchestrator, &name, true).await?,
        Command::Disable { name } => set_enabled(&orchestrator, &name, false).await?,
        Command::Validate { expr } => {
            let (ok, detail) = conductor_schedule::validate(&expr);
            println!("{detail}");
            if !ok {
                std::process::exit(1);
            }
        }
        Command::Poller => {
            let engine = Arc::new(ExecutionEngine::new(Arc::clone(&store)));
            let poller = Poller::new(engine, config.poller.clone());
            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            let handle = tokio::spawn(poller.run(shutdown_rx));
            tokio::signal::ctrl_c().await?;
            info!("interrupt received, stopping poller");
            let _ = shutdown_tx.send(true);
            let _ = handle.await;
        }
    }

    Ok(())
}

/// Flip the enabled flag in the store and mirror it to the external
/// scheduler when the task is registered there.
async fn set_enabled(orchestrator: &Orchestrator, name: &str, enabled: bool) -> anyhow::Result<()> {
    let store = orchestrator.store();
    let mut def = store.require_task(name)?;
    def.enabled = enabled;
    store.add_task(&def)?;
    if def.schedule.is_some() {
        if enabled {
            orchestrator.schedule(name).await?;
        } else {
            orchestrator.unschedule(name).await?;
        }
    }
    info!(task = %name, enabled, "task state changed");
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
}
