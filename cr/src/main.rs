//! ChatRelay - CLI entry point
//!
//! Each invocation opens the session store, serves one command through the
//! session router and stops the actors before exiting.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use colored::*;
use eyre::{Context, Result};
use sessionstore::{KvStore, MemoryStore, SqliteStore};
use tracing::{debug, info, warn};

use chatrelay::chat::{ChatError, ChatRequest, ChatService, PlanOutcome};
use chatrelay::cli::{Cli, Command, OutputFormat, PlanCommand, get_log_path};
use chatrelay::config::{Config, StorageBackend};
use chatrelay::domain::{Message, Plan, Role};
use chatrelay::instrument::TracingHook;
use chatrelay::llm::create_client;
use chatrelay::router::SessionRouter;
use chatrelay::session::SessionError;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<dyn KvStore>> {
    debug!(backend = ?config.storage.backend, "open_store: called");
    match config.storage.backend {
        StorageBackend::Sqlite => {
            let store = SqliteStore::open(&config.storage.path)
                .context(format!("Failed to open session store at {}", config.storage.path.display()))?;
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; sessions are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn build_router(config: &Config) -> Result<SessionRouter> {
    let store = open_store(config)?;
    Ok(SessionRouter::new(store, &config.session).with_hook(Arc::new(TracingHook)))
}

fn build_chat(config: &Config) -> Result<ChatService> {
    config.validate()?;
    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    Ok(ChatService::new(
        build_router(config)?,
        llm,
        config.chat.clone(),
        config.llm.max_tokens,
    ))
}

/// Log the full chat failure and hand the user a short message
fn chat_failure(action: &str, err: ChatError) -> eyre::Report {
    warn!(error = %err, "{} failed", action);
    eyre::eyre!(err.user_message())
}

fn session_failure(action: &str, err: SessionError) -> eyre::Report {
    warn!(error = %err, "{} failed", action);
    eyre::eyre!("{} failed: {}", action, err.user_message())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(format!("Logs are written to: {}", get_log_path().display()));
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::NewSession => cmd_new_session(),
        Command::Chat { session, message, debug } => cmd_chat(&config, session, message, debug).await,
        Command::History { session, format } => cmd_history(&config, &session, format).await,
        Command::Clear { session } => cmd_clear(&config, &session).await,
        Command::Plan { command } => match command {
            PlanCommand::Show { session, format } => cmd_plan_show(&config, &session, format).await,
            PlanCommand::Generate { session, goal } => cmd_plan_generate(&config, &session, &goal).await,
            PlanCommand::Set { session, file } => cmd_plan_set(&config, &session, &file).await,
            PlanCommand::Step { session, step_id, undo } => cmd_plan_step(&config, &session, &step_id, !undo).await,
        },
    }
}

fn cmd_new_session() -> Result<()> {
    let id = uuid::Uuid::now_v7();
    info!(session = %id, "New session id issued");
    println!("{}", id);
    Ok(())
}

async fn cmd_chat(config: &Config, session: String, message: String, debug: bool) -> Result<()> {
    let chat = build_chat(config)?;
    let result = chat
        .send(ChatRequest {
            session_id: session,
            message,
            debug,
        })
        .await;
    chat.router().shutdown().await;

    let response = result.map_err(|e| chat_failure("Chat request", e))?;
    println!("{}", response.reply);
    if let Some(metrics) = response.debug {
        println!(
            "{}",
            format!(
                "total {}ms | read {}ms | model {}ms | write {}ms | {} messages in context",
                metrics.total_ms, metrics.do_read_ms, metrics.ai_ms, metrics.do_write_ms, metrics.history_count
            )
            .dimmed()
        );
    }
    Ok(())
}

async fn cmd_history(config: &Config, session: &str, format: OutputFormat) -> Result<()> {
    let router = build_router(config)?;
    let result = router.history(session).await;
    router.shutdown().await;
    let messages = result.map_err(|e| session_failure("Reading history", e))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&messages)?),
        OutputFormat::Text => {
            if messages.is_empty() {
                println!("{}", "No messages".dimmed());
            }
            for message in &messages {
                print_message(message);
            }
        }
    }
    Ok(())
}

async fn cmd_clear(config: &Config, session: &str) -> Result<()> {
    let router = build_router(config)?;
    let result = router.clear(session).await;
    router.shutdown().await;
    result.map_err(|e| session_failure("Clearing session", e))?;

    println!("{} Cleared session: {}", "✓".green(), session.cyan());
    Ok(())
}

async fn cmd_plan_show(config: &Config, session: &str, format: OutputFormat) -> Result<()> {
    let router = build_router(config)?;
    let result = router.plan(session).await;
    router.shutdown().await;
    let plan = result.map_err(|e| session_failure("Reading plan", e))?;

    match (format, plan) {
        (OutputFormat::Json, plan) => println!("{}", serde_json::to_string_pretty(&plan)?),
        (OutputFormat::Text, Some(plan)) => print_plan(&plan),
        (OutputFormat::Text, None) => println!("{}", "No plan".dimmed()),
    }
    Ok(())
}

async fn cmd_plan_generate(config: &Config, session: &str, goal: &str) -> Result<()> {
    let chat = build_chat(config)?;
    let result = chat.generate_plan(session, goal).await;
    chat.router().shutdown().await;

    match result.map_err(|e| chat_failure("Plan request", e))? {
        PlanOutcome::Created(plan) => print_plan(&plan),
        PlanOutcome::Rejected { reply } => println!("{} {}", "✗".red(), reply),
    }
    Ok(())
}

async fn cmd_plan_set(config: &Config, session: &str, file: &Path) -> Result<()> {
    let raw = if file == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read plan from stdin")?;
        buf
    } else {
        fs::read_to_string(file).context(format!("Failed to read {}", file.display()))?
    };
    let plan: Plan = serde_json::from_str(&raw).context("Plan file is not a valid plan")?;

    let router = build_router(config)?;
    let result = router.set_plan(session, plan).await;
    router.shutdown().await;

    print_plan(&result.map_err(|e| session_failure("Storing plan", e))?);
    Ok(())
}

async fn cmd_plan_step(config: &Config, session: &str, step_id: &str, done: bool) -> Result<()> {
    let router = build_router(config)?;
    let result = router.update_step(session, step_id, done).await;
    router.shutdown().await;

    match result.map_err(|e| session_failure("Updating step", e))? {
        None => println!("{}", "No plan".dimmed()),
        Some(plan) => {
            if plan.step(step_id).is_none() {
                println!("{} No step '{}' in plan", "!".yellow(), step_id);
            }
            print_plan(&plan);
        }
    }
    Ok(())
}

fn print_message(message: &Message) {
    let role = match message.role {
        Role::System => message.role.as_str().yellow(),
        Role::User => message.role.as_str().cyan(),
        Role::Assistant => message.role.as_str().green(),
    };
    let timestamp = message
        .timestamp
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    println!("{} {}: {}", timestamp.dimmed(), role.bold(), message.content);
}

fn print_plan(plan: &Plan) {
    println!(
        "{} ({}/{} done)",
        plan.title.bold(),
        plan.completed(),
        plan.steps.len()
    );
    for step in &plan.steps {
        let mark = if step.done { "[x]".green() } else { "[ ]".normal() };
        println!("  {} {} {}", mark, step.id.dimmed(), step.text);
    }
}
