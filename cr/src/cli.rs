//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// ChatRelay - durable chat sessions in front of a text model
#[derive(Parser)]
#[command(
    name = "cr",
    about = "Relay chat messages to a model and keep per-session history and plans",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a fresh session id
    NewSession,

    /// Send one message and print the model's reply
    Chat {
        /// Session id
        session: String,

        /// Message text
        message: String,

        /// Print timing metrics after the reply
        #[arg(short, long)]
        debug: bool,
    },

    /// Show a session's message history
    History {
        /// Session id
        session: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Drop a session's history and plan
    Clear {
        /// Session id
        session: String,
    },

    /// Inspect or change a session's plan
    Plan {
        #[command(subcommand)]
        command: PlanCommand,
    },
}

/// Plan subcommands
#[derive(Debug, Subcommand)]
pub enum PlanCommand {
    /// Show the current plan
    Show {
        /// Session id
        session: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Ask the model for a plan toward a goal
    Generate {
        /// Session id
        session: String,

        /// What the plan should achieve
        goal: String,
    },

    /// Replace the plan with one read from a JSON file ("-" for stdin)
    Set {
        /// Session id
        session: String,

        /// JSON file holding {"title": ..., "steps": [...]}
        file: PathBuf,
    },

    /// Mark a step done (or not done with --undo)
    Step {
        /// Session id
        session: String,

        /// Step id
        step_id: String,

        /// Mark the step not done
        #[arg(long)]
        undo: bool,
    },
}

/// Output format for history/plan commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use text or json", s)),
        }
    }
}

/// Where the binary writes its log file
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chatrelay")
        .join("logs")
        .join("chatrelay.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_chat() {
        let cli = Cli::try_parse_from(["cr", "chat", "abc", "hello there", "--debug"]).unwrap();
        match cli.command {
            Command::Chat { session, message, debug } => {
                assert_eq!(session, "abc");
                assert_eq!(message, "hello there");
                assert!(debug);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_plan_step_with_globals() {
        let cli = Cli::try_parse_from(["cr", "plan", "step", "abc", "2", "--undo", "-l", "debug"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Plan {
                command: PlanCommand::Step { session, step_id, undo },
            } => {
                assert_eq!(session, "abc");
                assert_eq!(step_id, "2");
                assert!(undo);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("plain".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("table".parse::<OutputFormat>().is_err());
    }
}
