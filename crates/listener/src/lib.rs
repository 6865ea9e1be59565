//! Trigger event source infrastructure.
//!
//! Implements [`pipeline::TriggerHost`] with [`TokioTriggerHost`]: every
//! registration becomes a tokio task that sleeps until its firing time and
//! then emits a [`TriggerEvent`] on a channel. The composition root drains
//! the paired [`TriggerReceiver`] and dispatches each event to the
//! scheduler, one at a time.
//!
//! ```text
//!  register_periodic / register_one_shot
//!            │
//!            ▼
//!   ┌──────────────────┐   TriggerEvent   ┌──────────────────┐
//!   │ TokioTriggerHost │ ───────────────► │ TriggerReceiver  │ ──► scheduler
//!   │  (timer tasks)   │   mpsc channel   │  (event loop)    │
//!   └──────────────────┘                  └──────────────────┘
//! ```
//!
//! Registrations are held in memory only. A restarted process re-registers
//! from stored settings, and the scheduler persists its own record of the
//! registration for other processes to read.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Timer mechanics and task lifetimes live here. The
//! [`pipeline`] crate sees only [`pipeline::TriggerHost`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use pipeline::{IntervalSchedules, Timestamp, TriggerError, TriggerHost, TriggerName};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// One firing of a registered trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    /// Name the trigger was registered under.
    pub name: TriggerName,
    /// Wall-clock time of the firing.
    pub fired_at: Timestamp,
}

/// Receiving half of a [`TokioTriggerHost`].
#[derive(Debug)]
pub struct TriggerReceiver {
    events: mpsc::UnboundedReceiver<TriggerEvent>,
}

impl TriggerReceiver {
    /// Waits for the next firing. Returns `None` once the host is dropped.
    pub async fn next_event(&mut self) -> Option<TriggerEvent> {
        self.events.recv().await
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

type SharedNextRun = Arc<Mutex<Option<Timestamp>>>;

#[derive(Debug)]
struct Job {
    next_run: SharedNextRun,
    handle: JoinHandle<()>,
}

impl Job {
    fn next_run(&self) -> Option<Timestamp> {
        *lock(&self.next_run)
    }
}

/// In-process trigger host backed by tokio timers.
///
/// Registration must happen inside a tokio runtime. Dropping the host
/// cancels every pending firing.
#[derive(Debug)]
pub struct TokioTriggerHost {
    intervals: IntervalSchedules,
    jobs: Mutex<HashMap<TriggerName, Vec<Job>>>,
    events: mpsc::UnboundedSender<TriggerEvent>,
}

impl TokioTriggerHost {
    /// Creates a host that understands `intervals`, plus the receiver its
    /// firings are delivered to.
    pub fn new(intervals: IntervalSchedules) -> (Self, TriggerReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        let host = Self {
            intervals,
            jobs: Mutex::new(HashMap::new()),
            events,
        };
        (host, TriggerReceiver { events: receiver })
    }

    #[cfg(test)]
    fn pending(&self, name: &TriggerName) -> usize {
        lock(&self.jobs)
            .get(name)
            .map(|jobs| jobs.iter().filter(|job| job.next_run().is_some()).count())
            .unwrap_or(0)
    }

    fn spawn(
        &self,
        name: &TriggerName,
        first_run: Timestamp,
        period: Option<u64>,
    ) -> Result<(), TriggerError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            TriggerError::Unavailable {
                message: e.to_string(),
            }
        })?;

        let next_run: SharedNextRun = Arc::new(Mutex::new(Some(first_run)));
        let handle = runtime.spawn(run_job(
            name.clone(),
            first_run,
            period,
            Arc::clone(&next_run),
            self.events.clone(),
        ));

        let mut jobs = lock(&self.jobs);
        let entry = jobs.entry(name.clone()).or_default();
        entry.retain(|job| job.next_run().is_some());
        entry.push(Job { next_run, handle });
        Ok(())
    }
}

impl TriggerHost for TokioTriggerHost {
    fn register_periodic(
        &self,
        name: &TriggerName,
        interval: &str,
        first_run: Timestamp,
    ) -> Result<(), TriggerError> {
        let spec = self
            .intervals
            .get(interval)
            .ok_or_else(|| TriggerError::UnknownInterval {
                interval: interval.to_string(),
            })?;

        info!(trigger = %name, interval, first_run = %first_run, "Registering periodic trigger");
        self.spawn(name, first_run, Some(spec.interval_secs.max(1)))
    }

    fn register_one_shot(&self, name: &TriggerName, at: Timestamp) -> Result<(), TriggerError> {
        info!(trigger = %name, at = %at, "Registering one-shot trigger");
        self.spawn(name, at, None)
    }

    fn clear(&self, name: &TriggerName) {
        if let Some(jobs) = lock(&self.jobs).remove(name) {
            debug!(trigger = %name, count = jobs.len(), "Clearing trigger");
            for job in jobs {
                job.handle.abort();
            }
        }
    }

    fn next_scheduled(&self, name: &TriggerName) -> Option<Timestamp> {
        lock(&self.jobs)
            .get(name)?
            .iter()
            .filter_map(Job::next_run)
            .min()
    }

    fn intervals(&self) -> IntervalSchedules {
        self.intervals.clone()
    }
}

impl Drop for TokioTriggerHost {
    fn drop(&mut self) {
        for jobs in lock(&self.jobs).values() {
            for job in jobs {
                job.handle.abort();
            }
        }
    }
}

async fn run_job(
    name: TriggerName,
    first_run: Timestamp,
    period: Option<u64>,
    next_run: SharedNextRun,
    events: mpsc::UnboundedSender<TriggerEvent>,
) {
    let mut deadline = Instant::now() + first_run.duration_until();
    let mut scheduled = first_run;

    loop {
        tokio::time::sleep_until(deadline).await;

        *lock(&next_run) = period.map(|secs| scheduled.plus_secs(secs));

        let event = TriggerEvent {
            name: name.clone(),
            fired_at: Timestamp::now(),
        };
        if events.send(event).is_err() {
            debug!(trigger = %name, "Receiver dropped; stopping trigger");
            *lock(&next_run) = None;
            return;
        }

        let Some(secs) = period else {
            return;
        };
        deadline += Duration::from_secs(secs);
        scheduled = scheduled.plus_secs(secs);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger() -> TriggerName {
        TriggerName::new("taskdigest_sync").expect("name")
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_trigger_fires_repeatedly() {
        let (host, mut receiver) = TokioTriggerHost::new(IntervalSchedules::builtin());
        let start = Timestamp::now();

        host.register_periodic(&trigger(), "hourly", start)
            .expect("register");

        for _ in 0..3 {
            let event = receiver.next_event().await.expect("event");
            assert_eq!(event.name, trigger());
        }
        let next = host.next_scheduled(&trigger()).expect("still scheduled");
        assert_eq!(next, start.plus_secs(3 * 3_600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_fires_once_then_unschedules() {
        let (host, mut receiver) = TokioTriggerHost::new(IntervalSchedules::builtin());
        let at = Timestamp::now().plus_secs(30);

        host.register_one_shot(&trigger(), at).expect("register");
        assert_eq!(host.next_scheduled(&trigger()), Some(at));

        receiver.next_event().await.expect("event");

        assert_eq!(host.next_scheduled(&trigger()), None);
        assert_eq!(host.pending(&trigger()), 0);
        let again = tokio::time::timeout(Duration::from_secs(3_600), receiver.next_event()).await;
        assert!(again.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_every_registration_under_a_name() {
        let (host, mut receiver) = TokioTriggerHost::new(IntervalSchedules::builtin());
        let later = Timestamp::now().plus_secs(60);

        host.register_periodic(&trigger(), "daily", later).expect("periodic");
        host.register_one_shot(&trigger(), later).expect("one-shot");
        assert_eq!(host.pending(&trigger()), 2);

        host.clear(&trigger());

        assert_eq!(host.next_scheduled(&trigger()), None);
        let fired = tokio::time::timeout(Duration::from_secs(120), receiver.next_event()).await;
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn test_unknown_interval_is_rejected() {
        let (host, _receiver) = TokioTriggerHost::new(IntervalSchedules::builtin());

        let result = host.register_periodic(&trigger(), "fortnightly", Timestamp::now());

        assert_eq!(
            result,
            Err(TriggerError::UnknownInterval {
                interval: "fortnightly".to_string()
            })
        );
        assert_eq!(host.next_scheduled(&trigger()), None);
    }

    #[test]
    fn test_registration_outside_a_runtime_is_unavailable() {
        let (host, _receiver) = TokioTriggerHost::new(IntervalSchedules::builtin());

        assert!(matches!(
            host.register_one_shot(&trigger(), Timestamp::now()),
            Err(TriggerError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_next_scheduled_is_the_earliest_pending_firing() {
        let (host, _receiver) = TokioTriggerHost::new(IntervalSchedules::builtin());
        let soon = Timestamp::now().plus_secs(600);
        let later = Timestamp::now().plus_secs(86_400);

        host.register_periodic(&trigger(), "daily", later).expect("periodic");
        host.register_one_shot(&trigger(), soon).expect("one-shot");

        assert_eq!(host.next_scheduled(&trigger()), Some(soon));
    }
}
