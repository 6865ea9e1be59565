//! Recurring sync scheduler.
//!
//! [`SyncScheduler`] is a service object holding only injected port handles.
//! It owns one named trigger ([`TriggerName::sync`]) whose state is either
//! "nothing registered" or "registered at the configured interval".
//!
//! A firing ([`SyncScheduler::run_sync`]) never returns an error: anything
//! that goes wrong is logged and, when notifications are enabled, reported
//! by message. The trigger host never observes a failure.
//!
//! ## Shared schedule record
//!
//! The trigger host lives inside one process, so the registration is also
//! written to the sync state as a [`TriggerRecord`]. Other processes read
//! the next run time from it, and clearing the state removes it. The process
//! that owns the host calls [`SyncScheduler::reconcile_schedule`] before each
//! firing and on a timer: a missing record cancels the local trigger, and a
//! record whose schedule no longer matches the settings is re-registered.
//!
//! ## Overlapping runs
//!
//! A sync needs both the in-process guard and the shared [`SyncLock`], so
//! two syncs never overlap even when they start in different processes.

use std::sync::Arc;

use pipeline::{
    IntervalSchedules, IntervalSpec, LockGuard, Notifier, ProjectId, Settings, SettingsStore,
    StoreError, SyncError, SyncLock, SyncResult, SyncRunId, SyncState, SyncStateStore,
    SyncStatus, TaskFilter, Timestamp, TriggerHost, TriggerName, TriggerRecord, FIFTEEN_MINUTES,
    THIRTY_MINUTES,
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};

use crate::{Notification, OrchestratorFactory, SyncOrchestrator};

/// Port handles the scheduler works through.
#[derive(Clone)]
pub struct SchedulerPorts {
    /// Configuration store, read fresh on every call.
    pub settings: Arc<dyn SettingsStore>,
    /// Result history, last-sync time and the shared schedule record.
    pub state: Arc<dyn SyncStateStore>,
    /// Excludes syncs started by other processes.
    pub lock: Arc<dyn SyncLock>,
    /// Host trigger facility.
    pub triggers: Arc<dyn TriggerHost>,
    /// Outbound notification channel.
    pub notifier: Arc<dyn Notifier>,
    /// Builds the per-firing orchestrator.
    pub factory: Arc<dyn OrchestratorFactory>,
}

/// Host-level facts the scheduler reports with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Prefix for notification subjects.
    pub site_name: String,
    /// Recipient used when no notification address is configured.
    pub admin_email: Option<String>,
}

/// Drives the sync pipeline from the recurring trigger.
pub struct SyncScheduler {
    ports: SchedulerPorts,
    config: SchedulerConfig,
    trigger: TriggerName,
    running: Mutex<()>,
}

/// Held for the duration of one sync.
struct RunPermit<'a> {
    _local: MutexGuard<'a, ()>,
    _shared: LockGuard,
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("config", &self.config)
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

impl SyncScheduler {
    /// Creates a scheduler over `ports`.
    pub fn new(ports: SchedulerPorts, config: SchedulerConfig) -> Self {
        Self {
            ports,
            config,
            trigger: TriggerName::sync(),
            running: Mutex::new(()),
        }
    }

    /// Name of the trigger this scheduler registers.
    pub fn trigger_name(&self) -> &TriggerName {
        &self.trigger
    }

    /// Adds the fifteen- and thirty-minute recurrences to `intervals`.
    ///
    /// Existing entries with the same token are kept as they are.
    pub fn custom_intervals(mut intervals: IntervalSchedules) -> IntervalSchedules {
        intervals.insert_if_absent(FIFTEEN_MINUTES, IntervalSpec::new(15 * 60, "Every 15 Minutes"));
        intervals.insert_if_absent(THIRTY_MINUTES, IntervalSpec::new(30 * 60, "Every 30 Minutes"));
        intervals
    }

    // -----------------------------------------------------------------------
    // Trigger lifecycle
    // -----------------------------------------------------------------------

    /// Brings the trigger registration in line with the configured schedule.
    ///
    /// Any existing registration is cleared first. Unless the schedule is
    /// disabled, the periodic trigger is then registered with its first
    /// firing at the current time. The outcome is written to the shared
    /// schedule record, including when registration fails.
    #[instrument(skip(self))]
    pub async fn setup_schedules(&self) -> Result<(), SyncError> {
        let settings = self.ports.settings.load().await?;
        let triggers = &self.ports.triggers;

        if triggers.next_scheduled(&self.trigger).is_some() {
            debug!(trigger = %self.trigger, "Clearing existing registration");
            triggers.clear(&self.trigger);
        }

        let schedule = settings.sync_schedule;
        let registered = if schedule.is_disabled() {
            info!("Scheduled sync disabled");
            Ok(())
        } else if triggers.next_scheduled(&self.trigger).is_none() {
            triggers
                .register_periodic(&self.trigger, schedule.as_str(), Timestamp::now())
                .inspect(|_| info!(schedule = %schedule, "Scheduled sync registered"))
        } else {
            Ok(())
        };

        let record = TriggerRecord {
            schedule,
            registered_at: Timestamp::now(),
            next_run: triggers.next_scheduled(&self.trigger),
        };
        self.ports
            .state
            .update_state(Box::new(move |state: &mut SyncState| {
                state.trigger = Some(record);
            }))
            .await?;

        registered.map_err(SyncError::from)
    }

    /// Applies changes made by other processes to the local trigger.
    ///
    /// Returns `true` when the local trigger is still registered for the
    /// configured schedule, i.e. when a firing that just arrived should run.
    ///
    /// * No shared record (the schedule was cleared): the local trigger is
    ///   cancelled and stays cancelled until [`Self::setup_schedules`] runs
    ///   again.
    /// * Configured schedule differs from the record: the trigger is
    ///   registered again and `false` is returned; the new registration
    ///   fires on its own.
    /// * Otherwise the record's next run time is refreshed.
    #[instrument(skip(self))]
    pub async fn reconcile_schedule(&self) -> Result<bool, SyncError> {
        let triggers = &self.ports.triggers;
        let state = self.ports.state.load_state().await?;

        let Some(record) = state.trigger else {
            if triggers.next_scheduled(&self.trigger).is_some() {
                info!("Schedule cleared elsewhere; cancelling local trigger");
                triggers.clear(&self.trigger);
            }
            return Ok(false);
        };

        let settings = self.ports.settings.load().await?;
        if record.schedule != settings.sync_schedule {
            info!(
                from = %record.schedule,
                to = %settings.sync_schedule,
                "Configured schedule changed; registering again"
            );
            self.setup_schedules().await?;
            return Ok(false);
        }

        let next_run = triggers.next_scheduled(&self.trigger);
        if next_run != record.next_run {
            self.ports
                .state
                .update_state(Box::new(move |state: &mut SyncState| {
                    if let Some(record) = state.trigger.as_mut() {
                        record.next_run = next_run;
                    }
                }))
                .await?;
        }
        Ok(next_run.is_some())
    }

    /// Cancels the local trigger and marks the shared record as having no
    /// pending run. Called when the owning process stops.
    pub async fn release_schedule(&self) -> Result<(), SyncError> {
        self.ports.triggers.clear(&self.trigger);
        self.ports
            .state
            .update_state(Box::new(|state: &mut SyncState| {
                if let Some(record) = state.trigger.as_mut() {
                    record.next_run = None;
                }
            }))
            .await?;
        debug!("Schedule released");
        Ok(())
    }

    /// Queues one immediate firing of the sync trigger.
    ///
    /// Succeeds once the firing is queued. The outcome of the sync itself is
    /// only reported through logs and notifications.
    pub fn trigger_manual_sync(&self) -> Result<(), SyncError> {
        self.ports
            .triggers
            .register_one_shot(&self.trigger, Timestamp::now())?;
        info!("Manual sync queued");
        Ok(())
    }

    /// Cancels every pending firing and deletes all stored results, the
    /// last-sync time and the shared schedule record.
    pub async fn clear_all_schedules(&self) -> Result<(), SyncError> {
        self.ports.triggers.clear(&self.trigger);
        self.ports.state.clear_state().await?;
        info!("Schedules and sync results cleared");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Firing
    // -----------------------------------------------------------------------

    /// Runs one scheduled sync over every target project.
    ///
    /// Aborts without side effects when no tracker key is configured, when
    /// settings cannot be read, or when another sync is already running here
    /// or in another process.
    #[instrument(skip(self), fields(run_id = %SyncRunId::new_random()))]
    pub async fn run_sync(&self) {
        let _permit = match self.begin_run().await {
            Ok(Some(permit)) => permit,
            Ok(None) => {
                warn!("Sync already in progress; skipping this firing");
                return;
            }
            Err(error) => {
                error!(%error, "Run lock unavailable; skipping scheduled sync");
                return;
            }
        };

        let settings = match self.ports.settings.load().await {
            Ok(settings) => settings,
            Err(error) => {
                error!(%error, "Settings unavailable; skipping scheduled sync");
                return;
            }
        };

        if settings.bugherd_api_key().is_none() {
            error!("Tracker API key not configured; skipping scheduled sync");
            return;
        }

        let notification = match self.sync_targets(&settings).await {
            Ok(synced) => {
                info!(projects = synced, "Scheduled sync completed");
                let next_sync = self.next_sync_time().await.unwrap_or_else(|error| {
                    warn!(%error, "Next sync time unavailable");
                    None
                });
                Notification::success(&self.config.site_name, Timestamp::now(), next_sync)
            }
            Err(error) => {
                error!(%error, "Scheduled sync failed");
                Notification::failure(&self.config.site_name, &error.to_string())
            }
        };

        self.notify(&settings, notification).await;
    }

    async fn begin_run(&self) -> Result<Option<RunPermit<'_>>, StoreError> {
        let Ok(local) = self.running.try_lock() else {
            return Ok(None);
        };
        let permit = self
            .ports
            .lock
            .try_acquire()
            .await?
            .map(|shared| RunPermit {
                _local: local,
                _shared: shared,
            });
        Ok(permit)
    }

    async fn sync_targets(&self, settings: &Settings) -> Result<usize, SyncError> {
        let orchestrator = self.ports.factory.build(settings);
        let targets = settings.sync_targets();

        for project in &targets {
            self.sync_project(&orchestrator, project, settings.debug_mode)
                .await?;
        }

        let finished = Timestamp::now();
        self.ports
            .state
            .update_state(Box::new(move |state: &mut SyncState| {
                state.last_sync = Some(finished);
            }))
            .await?;
        Ok(targets.len())
    }

    #[instrument(skip_all, fields(project = %project))]
    async fn sync_project(
        &self,
        orchestrator: &SyncOrchestrator,
        project: &ProjectId,
        debug_mode: bool,
    ) -> Result<(), SyncError> {
        let summary = orchestrator.run_filtered(project, &TaskFilter::new()).await;
        let state = self.append_result(project, summary).await?;

        if debug_mode {
            if let Some(latest) = state.results.get(project).and_then(|h| h.latest()) {
                debug!(summary = %latest.summary, "Synced project");
            }
        }
        Ok(())
    }

    /// Appends one result to the stored history of `project` in a single
    /// store update.
    async fn append_result(
        &self,
        project: &ProjectId,
        summary: String,
    ) -> Result<SyncState, StoreError> {
        let project = project.clone();
        let result = SyncResult {
            summary,
            timestamp: Timestamp::now(),
        };
        self.ports
            .state
            .update_state(Box::new(move |state: &mut SyncState| {
                state.record(&project, result);
            }))
            .await
    }

    async fn notify(&self, settings: &Settings, notification: Notification) {
        let Some(recipient) = settings.notification_recipient(self.config.admin_email.as_deref())
        else {
            debug!("Notifications disabled or no recipient; not sending");
            return;
        };
        self.ports
            .notifier
            .send(&recipient, &notification.subject, &notification.body)
            .await;
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// When the trigger will next fire.
    ///
    /// Falls back to the shared schedule record when the trigger is owned by
    /// another process.
    pub async fn next_sync_time(&self) -> Result<Option<Timestamp>, SyncError> {
        if let Some(next) = self.ports.triggers.next_scheduled(&self.trigger) {
            return Ok(Some(next));
        }
        let state = self.ports.state.load_state().await?;
        Ok(persisted_next_run(&state))
    }

    /// When the last scheduled sync completed.
    pub async fn last_sync_time(&self) -> Result<Option<Timestamp>, SyncError> {
        Ok(self.ports.state.load_state().await?.last_sync)
    }

    /// Schedule, timing and full result history. Has no side effects.
    pub async fn sync_status(&self) -> Result<SyncStatus, SyncError> {
        let settings = self.ports.settings.load().await?;
        let state = self.ports.state.load_state().await?;
        let next_sync = self
            .ports
            .triggers
            .next_scheduled(&self.trigger)
            .or_else(|| persisted_next_run(&state));
        let schedule_display = settings
            .sync_schedule
            .label(&self.ports.triggers.intervals());

        Ok(SyncStatus {
            schedule: settings.sync_schedule,
            schedule_display,
            last_sync: state.last_sync,
            next_sync,
            is_scheduled: next_sync.is_some(),
            sync_results: state.results,
        })
    }

    // -----------------------------------------------------------------------
    // On-demand runs
    // -----------------------------------------------------------------------

    /// Unfiltered sync of the default project, appended to its history.
    ///
    /// `Ok(None)` when no default project is configured, and
    /// [`SyncError::InProgress`] while any other sync holds the run lock.
    pub async fn run_default(&self) -> Result<Option<String>, SyncError> {
        let Some(_permit) = self.begin_run().await? else {
            return Err(SyncError::InProgress);
        };
        let settings = self.ports.settings.load().await?;
        let orchestrator = self.ports.factory.build(&settings);

        let summary = orchestrator
            .run(|project, summary| async move {
                self.append_result(&project, summary).await.map(drop)
            })
            .await?;
        Ok(summary)
    }

    /// Filtered summary of `project`. Nothing is stored.
    pub async fn run_filtered(
        &self,
        project: &ProjectId,
        filter: &TaskFilter,
    ) -> Result<String, SyncError> {
        let settings = self.ports.settings.load().await?;
        let orchestrator = self.ports.factory.build(&settings);
        Ok(orchestrator.run_filtered(project, filter).await)
    }
}

fn persisted_next_run(state: &SyncState) -> Option<Timestamp> {
    state.trigger.as_ref().and_then(|record| record.next_run)
}
