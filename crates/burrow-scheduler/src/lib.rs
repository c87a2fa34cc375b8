//! C9: scheduler (spec.md §4.7).
//!
//! A single-threaded control loop with a pluggable clock. Each tick reloads
//! the routine list, evaluates [`due`] for each one, fires due routines as
//! background tasks guarded by an inflight set, and persists
//! `{routine -> today's date}` on success.

mod state;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use burrow_core::{CancellationToken, Routine};
use burrow_executor::PipelineExecutor;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

pub use state::SchedulerState;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("routine load error: {0}")]
    Routine(#[from] burrow_routine::RoutineError),
}

/// `due(now, schedule, tz, last_run_date)` (spec.md §4.7).
///
/// Returns `true` iff `schedule` is a valid `HH:MM` (single-digit hour
/// accepted, surrounding quotes stripped), `tz` is a valid IANA timezone,
/// the local time in `tz` at `now` is at or past `HH:MM` on its calendar
/// day, and `last_run_date` (a `YYYY-MM-DD` string) is not that same day.
/// An invalid schedule or timezone is never due; the caller logs that case.
#[must_use]
pub fn due(now: DateTime<Utc>, schedule: &str, tz: &str, last_run_date: Option<&str>) -> bool {
    let Some(fire_time) = parse_schedule(schedule) else {
        return false;
    };
    let Ok(zone) = tz.parse::<Tz>() else {
        return false;
    };

    let local_now = now.with_timezone(&zone);
    if local_now.time() < fire_time {
        return false;
    }

    let today = local_now.date_naive().format("%Y-%m-%d").to_string();
    last_run_date != Some(today.as_str())
}

fn parse_schedule(schedule: &str) -> Option<NaiveTime> {
    let trimmed = schedule.trim().trim_matches('"').trim_matches('\'');
    let (h, m) = trimmed.split_once(':')?;
    let hour: u32 = h.trim().parse().ok()?;
    let minute: u32 = m.trim().parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn resolve_tz(tz: &str) -> Tz {
    tz.parse().unwrap_or(chrono_tz::UTC)
}

/// Drives routine execution off a state file and a routines directory,
/// both reloaded on every tick.
pub struct Scheduler {
    routines_dir: PathBuf,
    state_path: PathBuf,
    executor: Arc<PipelineExecutor>,
    inflight: Arc<Mutex<HashSet<String>>>,
    state: Arc<Mutex<SchedulerState>>,
}

impl Scheduler {
    pub fn new(
        routines_dir: impl Into<PathBuf>,
        state_path: impl Into<PathBuf>,
        executor: Arc<PipelineExecutor>,
    ) -> Result<Self, SchedulerError> {
        let state_path = state_path.into();
        let state = SchedulerState::load(&state_path)?;
        Ok(Self {
            routines_dir: routines_dir.into(),
            state_path,
            executor,
            inflight: Arc::new(Mutex::new(HashSet::new())),
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Runs exactly one evaluation pass over the current routine list,
    /// firing every due routine and waiting for all of them to finish
    /// before returning (spec.md §4.7 "Once mode").
    pub async fn tick_once(&self, ctx: &CancellationToken) -> Result<(), SchedulerError> {
        let routines = burrow_routine::load_dir(&self.routines_dir)?;
        let now = Utc::now();
        let mut fired = Vec::new();

        for routine in routines {
            if routine.schedule.trim().is_empty() {
                continue;
            }
            if parse_schedule(&routine.schedule).is_none() || routine.timezone.parse::<Tz>().is_err() {
                warn!(routine = %routine.name, schedule = %routine.schedule, timezone = %routine.timezone, "invalid schedule; routine will never fire");
                continue;
            }

            let mut inflight = self.inflight.lock().await;
            if inflight.contains(&routine.name) {
                debug!(routine = %routine.name, "routine already inflight; skipping this tick");
                continue;
            }

            let last_run = {
                let state = self.state.lock().await;
                state.last_run.get(&routine.name).cloned()
            };
            if !due(now, &routine.schedule, &routine.timezone, last_run.as_deref()) {
                continue;
            }

            inflight.insert(routine.name.clone());
            drop(inflight);
            fired.push(self.fire(ctx.clone(), routine));
        }

        for handle in fired {
            let _ = handle.await;
        }
        Ok(())
    }

    /// Loops on a fixed tick interval until `ctx` is cancelled (spec.md
    /// §4.7 "Live mode").
    pub async fn run_live(&self, ctx: &CancellationToken, tick_interval: Duration) -> Result<(), SchedulerError> {
        loop {
            tokio::select! {
                () = ctx.cancelled() => return Ok(()),
                () = tokio::time::sleep(tick_interval) => {}
            }
            if ctx.is_cancelled() {
                return Ok(());
            }
            self.tick_once(ctx).await?;
        }
    }

    /// Spawns one routine run. Completion removes the inflight entry and
    /// persists state; failure removes the entry without persisting, so the
    /// next tick retries (spec.md §4.7 "In-flight guard").
    fn fire(&self, ctx: CancellationToken, routine: Routine) -> tokio::task::JoinHandle<()> {
        let executor = self.executor.clone();
        let inflight = self.inflight.clone();
        let state = self.state.clone();
        let state_path = self.state_path.clone();

        tokio::spawn(async move {
            let name = routine.name.clone();
            let result = executor.run(&ctx, &routine).await;

            match result {
                Ok(_) => {
                    let today = Utc::now()
                        .with_timezone(&resolve_tz(&routine.timezone))
                        .date_naive()
                        .format("%Y-%m-%d")
                        .to_string();
                    let mut guard = state.lock().await;
                    guard.last_run.insert(name.clone(), today);
                    if let Err(e) = guard.save(&state_path) {
                        error!(routine = %name, error = %e, "failed to persist scheduler state");
                    }
                }
                Err(e) => {
                    warn!(routine = %name, error = %e, "routine run failed; will retry next tick");
                }
            }

            inflight.lock().await.remove(&name);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use burrow_core::traits::{Service, ServiceError, SynthesisError, Synthesizer};
    use burrow_core::FetchResult;
    use burrow_executor::SynthesizerResolver;
    use burrow_report::ReportStore;
    use burrow_service::ServiceRegistry;
    use std::collections::BTreeMap;
    use std::time::Duration as StdDuration;

    struct DelayedService {
        delay: StdDuration,
    }

    #[async_trait]
    impl Service for DelayedService {
        fn name(&self) -> &str {
            "news"
        }
        async fn execute(
            &self,
            _ctx: &CancellationToken,
            tool: &str,
            _params: &BTreeMap<String, String>,
        ) -> Result<FetchResult, ServiceError> {
            tokio::time::sleep(self.delay).await;
            Ok(FetchResult::ok("news", tool, b"data".to_vec(), "http://x"))
        }
    }

    struct EchoSynthesizer;

    #[async_trait]
    impl Synthesizer for EchoSynthesizer {
        async fn synthesize(
            &self,
            _ctx: &CancellationToken,
            title: &str,
            _system: &str,
            _results: &[FetchResult],
        ) -> Result<String, SynthesisError> {
            Ok(format!("# {title}\n"))
        }
    }

    struct FixedResolver;
    impl SynthesizerResolver for FixedResolver {
        fn resolve(&self, _routine: &Routine) -> Arc<dyn Synthesizer> {
            Arc::new(EchoSynthesizer)
        }
    }

    fn write_routine(dir: &std::path::Path, filename: &str, schedule: &str) {
        let yaml = format!(
            "schedule: \"{schedule}\"\ntimezone: UTC\nreport:\n  title: Test Report\nsources:\n  - service: news\n    tool: search\n"
        );
        std::fs::write(dir.join(filename), yaml).unwrap();
    }

    fn scheduler(routines_dir: &std::path::Path, state_path: &std::path::Path) -> Scheduler {
        let registry = ServiceRegistry::default();
        registry
            .register(Arc::new(DelayedService { delay: StdDuration::from_millis(10) }))
            .unwrap();
        let report_store = Arc::new(ReportStore::new(routines_dir.join("reports")));
        let executor = Arc::new(PipelineExecutor::new(Arc::new(registry), report_store, Arc::new(FixedResolver)));
        Scheduler::new(routines_dir, state_path, executor).unwrap()
    }

    #[test]
    fn due_is_true_when_past_fire_time_and_not_yet_run_today() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
        assert!(due(now, "09:00", "UTC", None));
        assert!(due(now, "09:00", "UTC", Some("2024-05-31")));
    }

    #[test]
    fn due_is_false_before_fire_time() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();
        assert!(!due(now, "09:00", "UTC", None));
    }

    #[test]
    fn due_is_false_when_already_run_today() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
        assert!(!due(now, "09:00", "UTC", Some("2024-06-01")));
    }

    #[test]
    fn due_accepts_single_digit_hour_and_quoted_schedule() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
        assert!(due(now, "9:00", "UTC", None));
        assert!(due(now, "\"9:00\"", "UTC", None));
    }

    #[test]
    fn due_is_false_for_an_invalid_schedule_or_timezone() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
        assert!(!due(now, "not-a-time", "UTC", None));
        assert!(!due(now, "09:00", "Not/AZone", None));
    }

    #[tokio::test]
    async fn a_due_routine_fires_and_persists_todays_date() {
        let routines_dir = tempfile::tempdir().unwrap();
        let state_path = routines_dir.path().join("state.json");
        write_routine(routines_dir.path(), "daily.yaml", "00:00");
        let sched = scheduler(routines_dir.path(), &state_path);

        sched.tick_once(&CancellationToken::new()).await.unwrap();

        let state = SchedulerState::load(&state_path).unwrap();
        assert!(state.last_run.contains_key("daily"));
    }

    #[tokio::test]
    async fn a_routine_already_run_today_is_not_fired_again() {
        let routines_dir = tempfile::tempdir().unwrap();
        let state_path = routines_dir.path().join("state.json");
        write_routine(routines_dir.path(), "daily.yaml", "00:00");
        let sched = scheduler(routines_dir.path(), &state_path);

        sched.tick_once(&CancellationToken::new()).await.unwrap();
        let reports_before = std::fs::read_dir(routines_dir.path().join("reports")).unwrap().count();

        sched.tick_once(&CancellationToken::new()).await.unwrap();
        let reports_after = std::fs::read_dir(routines_dir.path().join("reports")).unwrap().count();

        assert_eq!(reports_before, reports_after, "a routine already run today must not fire a second time");
    }

    #[tokio::test]
    async fn two_concurrently_completing_routines_both_persist_their_date() {
        let routines_dir = tempfile::tempdir().unwrap();
        let state_path = routines_dir.path().join("state.json");
        write_routine(routines_dir.path(), "alpha.yaml", "00:00");
        write_routine(routines_dir.path(), "beta.yaml", "00:00");
        let sched = scheduler(routines_dir.path(), &state_path);

        sched.tick_once(&CancellationToken::new()).await.unwrap();

        let state = SchedulerState::load(&state_path).unwrap();
        assert!(state.last_run.contains_key("alpha"));
        assert!(state.last_run.contains_key("beta"));
    }
}
