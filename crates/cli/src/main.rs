//! `taskdigest` entry point.
//!
//! This binary is the composition root for the whole workspace:
//!
//! 1. **Parse arguments** with `clap`; every flag also reads a
//!    `TASKDIGEST_*` environment variable.
//! 2. **Wire observability** with `tracing-subscriber` (text or JSON on
//!    stderr) and an optional OpenTelemetry OTLP exporter.
//! 3. **Construct infrastructure**: the JSON file store, the tokio trigger
//!    host, the mail transport and the orchestrator factory, injected into
//!    [`orchestrator::SyncScheduler`].
//! 4. **Dispatch** the selected command. `daemon` runs the trigger event
//!    loop until Ctrl-C; every other command runs once and exits.

mod args;
mod commands;
mod factory;
mod notifier;
mod telemetry;

use std::sync::Arc;

use clap::Parser;
use pipeline::SettingsStore;
use store::JsonFileStore;

use crate::args::Cli;
use crate::commands::App;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let store = Arc::new(JsonFileStore::new(&cli.store));

    // Logging is not up yet, so an unreadable store just means default verbosity.
    let debug_mode = store
        .load()
        .await
        .map(|settings| settings.debug_mode)
        .unwrap_or(false);
    let telemetry = telemetry::init(cli.log_format, debug_mode)?;
    tracing::debug!(store = %cli.store.display(), "Starting");

    let app = App::new(&cli, store);
    let result = app.execute(cli.command).await;

    if let Err(error) = &result {
        tracing::error!(error = %format!("{error:#}"), "Command failed");
    }
    telemetry.shutdown();
    result
}
