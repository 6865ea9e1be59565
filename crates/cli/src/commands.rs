//! Command handlers over a fully wired scheduler.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use listener::{TokioTriggerHost, TriggerReceiver};
use llm::OpenAiConfig;
use orchestrator::{SchedulerConfig, SchedulerPorts, SyncScheduler};
use pipeline::{
    IntervalSchedules, Notifier, ProjectDraft, ProjectId, Settings, SettingsStore, SyncLock,
    SyncStateStore, TaskFilter, TriggerHost, SCHEDULE_OPTIONS, SETTING_KEYS,
};
use serde_json::{Map, Value};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::args::{Cli, Command, ConfigCommand};
use crate::factory::LiveOrchestratorFactory;
use crate::notifier::{LogNotifier, MailerKind, SendmailNotifier};

/// Composition root: every port wired to its concrete adapter.
pub struct App {
    settings: Arc<dyn SettingsStore>,
    triggers: Arc<TokioTriggerHost>,
    events: TriggerReceiver,
    scheduler: SyncScheduler,
}

impl App {
    /// Wires the adapters selected by `cli` around `store`.
    pub fn new<S>(cli: &Cli, store: Arc<S>) -> Self
    where
        S: SettingsStore + SyncStateStore + SyncLock + 'static,
    {
        let (host, events) =
            TokioTriggerHost::new(SyncScheduler::custom_intervals(IntervalSchedules::builtin()));
        let triggers = Arc::new(host);

        let notifier: Arc<dyn Notifier> = match cli.mailer {
            MailerKind::Log => Arc::new(LogNotifier),
            MailerKind::Sendmail => Arc::new(SendmailNotifier::new(&cli.sendmail_path)),
        };

        let completion = OpenAiConfig::default()
            .with_base_url(cli.completion_url.as_str())
            .with_model(cli.model.as_str())
            .with_max_tokens(cli.max_tokens);
        let factory = LiveOrchestratorFactory::new(cli.tracker_url.as_str(), completion);

        let scheduler = SyncScheduler::new(
            SchedulerPorts {
                settings: store.clone(),
                state: store.clone(),
                lock: store.clone(),
                triggers: triggers.clone(),
                notifier,
                factory: Arc::new(factory),
            },
            SchedulerConfig {
                site_name: cli.site_name.clone(),
                admin_email: cli.admin_email.clone(),
            },
        );

        Self {
            settings: store,
            triggers,
            events,
            scheduler,
        }
    }

    /// Runs `command` to completion.
    pub async fn execute(self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Daemon { reconcile_secs } => {
                self.daemon(Duration::from_secs(reconcile_secs.max(1)))
                    .await
            }
            Command::Run => self.run_default().await,
            Command::Summarize {
                project,
                status,
                user,
                keyword,
            } => {
                self.summarize(project, TaskFilter::from_parts(&status, user, &keyword))
                    .await
            }
            Command::Trigger => self.trigger().await,
            Command::Status => self.status().await,
            Command::Clear => {
                self.scheduler.clear_all_schedules().await?;
                println!("Schedules and sync results cleared.");
                Ok(())
            }
            Command::Config { action } => self.config(action).await,
        }
    }

    // -----------------------------------------------------------------------
    // Sync commands
    // -----------------------------------------------------------------------

    async fn daemon(mut self, reconcile_every: Duration) -> anyhow::Result<()> {
        let ctrl_c = async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(%error, "Cannot listen for Ctrl-C");
            }
            info!("Received Ctrl-C; shutting down");
        };
        self.serve(ctrl_c, reconcile_every).await
    }

    /// Owns the sync trigger until `shutdown` completes.
    ///
    /// Every firing, and every `reconcile_every`, first checks the shared
    /// schedule record so that `clear` and `config set` from other
    /// invocations take effect here.
    async fn serve(
        &mut self,
        shutdown: impl Future<Output = ()>,
        reconcile_every: Duration,
    ) -> anyhow::Result<()> {
        self.scheduler
            .setup_schedules()
            .await
            .context("failed to set up schedules")?;
        info!(next_sync = ?self.scheduler.next_sync_time().await?, "Daemon started");

        tokio::pin!(shutdown);
        let mut reconcile = tokio::time::interval(reconcile_every);
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.events.next_event() => {
                    let Some(event) = event else { break };
                    if &event.name != self.scheduler.trigger_name() {
                        warn!(trigger = %event.name, "Ignoring unknown trigger");
                        continue;
                    }
                    match self.scheduler.reconcile_schedule().await {
                        Ok(true) => {
                            info!(fired_at = %event.fired_at, "Sync trigger fired");
                            self.scheduler.run_sync().await;
                        }
                        Ok(false) => debug!(fired_at = %event.fired_at, "Dropping stale firing"),
                        Err(error) => warn!(%error, "Schedule check failed; skipping this firing"),
                    }
                }
                _ = reconcile.tick() => {
                    if let Err(error) = self.scheduler.reconcile_schedule().await {
                        warn!(%error, "Schedule check failed");
                    }
                }
                () = &mut shutdown => break,
            }
        }

        self.scheduler
            .release_schedule()
            .await
            .context("failed to release the schedule")
    }

    async fn run_default(&self) -> anyhow::Result<()> {
        match self.scheduler.run_default().await? {
            Some(summary) => println!("{summary}"),
            None => println!("No default project configured."),
        }
        Ok(())
    }

    async fn summarize(&self, project: Option<String>, filter: TaskFilter) -> anyhow::Result<()> {
        let project = match project {
            Some(raw) => ProjectId::new(raw),
            None => self.settings.load().await?.default_project_id(),
        };
        let Some(project) = project else {
            bail!("no project given and no default project configured");
        };

        println!("{}", self.scheduler.run_filtered(&project, &filter).await?);
        Ok(())
    }

    async fn trigger(mut self) -> anyhow::Result<()> {
        self.scheduler.trigger_manual_sync()?;
        println!("Manual sync triggered.");

        if self.events.next_event().await.is_some() {
            self.scheduler.run_sync().await;
        }
        match self.scheduler.last_sync_time().await? {
            Some(at) => println!("Last sync completed {}.", at.to_display_string()),
            None => println!("No sync has completed yet."),
        }
        Ok(())
    }

    async fn status(&self) -> anyhow::Result<()> {
        let status = self.scheduler.sync_status().await?;
        println!("{}", serde_json::to_string_pretty(&status)?);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Settings commands
    // -----------------------------------------------------------------------

    async fn config(&self, action: ConfigCommand) -> anyhow::Result<()> {
        let mut settings = self.settings.load().await?;

        match action {
            ConfigCommand::Show => println!("{}", settings.export()),
            ConfigCommand::Get { key } => {
                let Some(value) = settings.get(&key) else {
                    bail!("unknown setting '{key}'");
                };
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            ConfigCommand::Set { key, value } => {
                apply_setting(&mut settings, &key, &value)?;
                self.settings.save(&settings).await?;
                println!("Updated {key}.");
            }
            ConfigCommand::AddProject {
                id,
                name,
                description,
                inactive,
            } => {
                let project = settings.add_project(ProjectDraft {
                    id,
                    name,
                    description,
                    active: Some(!inactive),
                })?;
                println!("Saved project {} ({}).", project.id, project.name);
                self.settings.save(&settings).await?;
            }
            ConfigCommand::RemoveProject { id } => {
                let removed = ProjectId::new(id.as_str())
                    .is_some_and(|project| settings.remove_project(&project));
                if !removed {
                    bail!("project '{id}' is not configured");
                }
                self.settings.save(&settings).await?;
                println!("Removed project {id}.");
            }
            ConfigCommand::Schedules => {
                for (token, label) in SCHEDULE_OPTIONS {
                    println!("{token:<16} {label}");
                }
                let builtin = IntervalSchedules::builtin();
                for (token, spec) in self.triggers.intervals().iter() {
                    if !builtin.contains(token) {
                        println!("{token:<16} {}", spec.display);
                    }
                }
            }
            ConfigCommand::Export { output } => {
                let exported = settings.export();
                match output {
                    Some(path) => {
                        tokio::fs::write(&path, exported)
                            .await
                            .with_context(|| format!("failed to write {}", path.display()))?;
                        println!("Settings exported to {}.", path.display());
                    }
                    None => println!("{exported}"),
                }
            }
            ConfigCommand::Import { file } => {
                let text = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("failed to read {}", file.display()))?;
                settings.import(&text)?;
                self.settings.save(&settings).await?;
                println!("{}", settings.export());
            }
            ConfigCommand::Reset => {
                self.settings.delete().await?;
                println!("Settings reset to defaults.");
            }
        }
        Ok(())
    }
}

/// Applies one `key = raw` change through the same sanitising rules as the
/// settings form.
pub fn apply_setting(settings: &mut Settings, key: &str, raw: &str) -> anyhow::Result<()> {
    if !SETTING_KEYS.contains(&key) {
        bail!("unknown setting '{key}'");
    }
    if key == "projects" {
        bail!("use `config add-project` / `config remove-project` to change projects");
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    let mut input = Map::new();
    input.insert(key.to_string(), value);

    let validated = Settings::validate(&input);
    if validated.is_empty() {
        bail!("value '{raw}' is not valid for '{key}'");
    }
    settings.update(validated)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::ScheduleToken;
    use store::{JsonFileStore, MemoryStore};

    fn parse(args: &[&str]) -> Cli {
        <Cli as clap::Parser>::try_parse_from(args.iter().copied()).expect("parse")
    }

    #[test]
    fn test_apply_setting_coerces_like_the_settings_form() {
        let mut settings = Settings::default();

        apply_setting(&mut settings, "max_tasks_per_sync", "-25").expect("number");
        apply_setting(&mut settings, "debug_mode", "true").expect("flag");
        apply_setting(&mut settings, "sync_schedule", "fifteen_minutes").expect("schedule");
        apply_setting(&mut settings, "default_project_id", "  p9 ").expect("text");

        assert_eq!(settings.max_tasks_per_sync, 25);
        assert!(settings.debug_mode);
        assert_eq!(settings.sync_schedule, ScheduleToken::parse("fifteen_minutes"));
        assert_eq!(settings.default_project_id, "p9");
    }

    #[test]
    fn test_apply_setting_rejects_invalid_input() {
        let mut settings = Settings::default();

        assert!(apply_setting(&mut settings, "colour", "red").is_err());
        assert!(apply_setting(&mut settings, "sync_schedule", "fortnightly").is_err());
        assert!(apply_setting(&mut settings, "notification_email", "not-an-address").is_err());
        assert!(apply_setting(&mut settings, "projects", "{}").is_err());
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn test_config_commands_persist_to_the_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("taskdigest.json");
        let cli = parse(&["taskdigest", "status"]);

        let app = App::new(&cli, Arc::new(JsonFileStore::new(&path)));
        app.config(ConfigCommand::AddProject {
            id: "alpha".to_string(),
            name: "Alpha".to_string(),
            description: None,
            inactive: false,
        })
        .await
        .expect("add project");
        app.config(ConfigCommand::Set {
            key: "sync_schedule".to_string(),
            value: "weekly".to_string(),
        })
        .await
        .expect("set");

        let stored = JsonFileStore::new(&path).load().await.expect("load");
        assert_eq!(stored.sync_schedule, ScheduleToken::Weekly);
        assert_eq!(
            stored.sync_targets(),
            vec![ProjectId::new("alpha").expect("id")]
        );
    }

    #[tokio::test]
    async fn test_schedule_is_shared_between_invocations_on_one_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("taskdigest.json");
        let cli = parse(&["taskdigest", "status"]);
        let owner = App::new(&cli, Arc::new(JsonFileStore::new(&path)));
        let other = App::new(&cli, Arc::new(JsonFileStore::new(&path)));

        owner
            .config(ConfigCommand::Set {
                key: "sync_schedule".to_string(),
                value: "daily".to_string(),
            })
            .await
            .expect("set");
        owner.scheduler.setup_schedules().await.expect("setup");

        let status = other.scheduler.sync_status().await.expect("status");
        assert!(status.is_scheduled);
        assert!(status.next_sync.is_some());

        other.execute(Command::Clear).await.expect("clear");

        assert!(!owner.scheduler.reconcile_schedule().await.expect("reconcile"));
        assert!(owner
            .triggers
            .next_scheduled(owner.scheduler.trigger_name())
            .is_none());
        let status = owner.scheduler.sync_status().await.expect("status");
        assert!(!status.is_scheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_daemon_follows_schedule_changes_made_elsewhere() {
        let store = Arc::new(MemoryStore::with_settings(Settings {
            sync_schedule: ScheduleToken::Daily,
            ..Settings::default()
        }));
        let mut app = App::new(&parse(&["taskdigest", "daemon"]), store.clone());
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();

        let elsewhere = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let record = store.load_state().await.expect("state").trigger;
            assert!(record.and_then(|r| r.next_run).is_some());

            store
                .save(&Settings {
                    sync_schedule: ScheduleToken::Disabled,
                    ..Settings::default()
                })
                .await
                .expect("save");
            tokio::time::sleep(Duration::from_secs(61)).await;

            let record = store
                .load_state()
                .await
                .expect("state")
                .trigger
                .expect("record");
            assert_eq!(record.schedule, ScheduleToken::Disabled);
            assert_eq!(record.next_run, None);
            let _ = stop.send(());
        };
        let shutdown = async {
            let _ = stopped.await;
        };

        let (served, ()) = tokio::join!(
            app.serve(shutdown, Duration::from_secs(60)),
            elsewhere
        );

        served.expect("serve");
        assert!(app
            .triggers
            .next_scheduled(app.scheduler.trigger_name())
            .is_none());
    }
}
