//! Command-line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::notifier::{MailerKind, DEFAULT_SENDMAIL};
use crate::telemetry::LogFormat;

/// Summarises issue-tracker tasks with a language model, on demand or on a
/// schedule.
#[derive(Debug, Parser)]
#[command(name = "taskdigest", version, about)]
pub struct Cli {
    /// JSON file holding settings and sync results.
    #[arg(long, env = "TASKDIGEST_STORE", default_value = "taskdigest.json", global = true)]
    pub store: PathBuf,

    /// Name used to prefix notification subjects.
    #[arg(long, env = "TASKDIGEST_SITE_NAME", default_value = "Task Digest", global = true)]
    pub site_name: String,

    /// Notification recipient when no address is configured in settings.
    #[arg(long, env = "TASKDIGEST_ADMIN_EMAIL", global = true)]
    pub admin_email: Option<String>,

    /// Issue-tracker API root.
    #[arg(long, env = "TASKDIGEST_TRACKER_URL", default_value = bugherd::DEFAULT_BASE_URL, global = true)]
    pub tracker_url: String,

    /// Completion API root.
    #[arg(long, env = "TASKDIGEST_COMPLETION_URL", default_value = llm::DEFAULT_BASE_URL, global = true)]
    pub completion_url: String,

    /// Completion model.
    #[arg(long, env = "TASKDIGEST_MODEL", default_value = llm::DEFAULT_MODEL, global = true)]
    pub model: String,

    /// Output-length bound sent with each completion request.
    #[arg(long, env = "TASKDIGEST_MAX_TOKENS", default_value_t = llm::DEFAULT_MAX_TOKENS, global = true)]
    pub max_tokens: u32,

    /// Console log format.
    #[arg(long, value_enum, env = "TASKDIGEST_LOG_FORMAT", default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Notification transport.
    #[arg(long, value_enum, env = "TASKDIGEST_MAILER", default_value_t = MailerKind::Log, global = true)]
    pub mailer: MailerKind,

    /// sendmail-compatible binary used by the sendmail transport.
    #[arg(long, env = "TASKDIGEST_SENDMAIL", default_value = DEFAULT_SENDMAIL, global = true)]
    pub sendmail_path: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register the configured schedule and run syncs until Ctrl-C.
    Daemon {
        /// How often to pick up schedule changes made by other commands.
        #[arg(long, env = "TASKDIGEST_RECONCILE_SECS", default_value_t = 60)]
        reconcile_secs: u64,
    },

    /// Summarise the default project and store the result.
    Run,

    /// Summarise one project with optional filters. Nothing is stored.
    Summarize {
        /// Project id; defaults to the configured default project.
        #[arg(long)]
        project: Option<String>,

        /// Keep only tasks with exactly this status.
        #[arg(long, default_value = "")]
        status: String,

        /// Keep only tasks assigned to this user id (0 for any).
        #[arg(long, default_value_t = 0)]
        user: u64,

        /// Keep only tasks whose description contains this text.
        #[arg(long, default_value = "")]
        keyword: String,
    },

    /// Queue an immediate sync and process it.
    Trigger,

    /// Print schedule, timing and stored results as JSON.
    Status,

    /// Cancel schedules and delete stored results.
    Clear,

    /// Inspect or change settings.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

/// Settings subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print all settings with API keys blanked.
    Show,

    /// Print one setting as JSON.
    Get {
        /// Setting key.
        key: String,
    },

    /// Change one setting. VALUE is parsed as JSON, falling back to text.
    Set {
        /// Setting key.
        key: String,
        /// New value.
        value: String,
    },

    /// Add or replace a project.
    AddProject {
        /// Tracker project id.
        #[arg(long)]
        id: String,
        /// Display name.
        #[arg(long)]
        name: String,
        /// Optional description.
        #[arg(long)]
        description: Option<String>,
        /// Store the project as inactive.
        #[arg(long)]
        inactive: bool,
    },

    /// Remove a project.
    RemoveProject {
        /// Tracker project id.
        id: String,
    },

    /// List the accepted schedule tokens.
    Schedules,

    /// Write settings (API keys blanked) to a file or stdout.
    Export {
        /// Destination file; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Apply settings from an exported file. API keys are never imported.
    Import {
        /// Source file.
        file: PathBuf,
    },

    /// Delete all stored settings.
    Reset,
}
