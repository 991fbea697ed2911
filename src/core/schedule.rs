//! Daily run scheduling and the run lock
//!
//! Schedules use the five-field cron syntax restricted to a fixed time of day
//! (`"M H * * *"`), evaluated in UTC. Each scheduled run is spawned as its own
//! task; a run that overlaps the previous one is rejected by [`RunLock`].

use crate::domain::{ReportError, Result};
use chrono::{DateTime, NaiveTime, Utc};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::task::{JoinError, JoinSet};

/// A daily cron schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    time: NaiveTime,
}

impl Schedule {
    /// Midnight UTC
    pub fn daily_midnight() -> Self {
        Self {
            time: NaiveTime::MIN,
        }
    }

    /// Time of day the run fires
    pub fn time(&self) -> NaiveTime {
        self.time
    }

    /// First fire time strictly after `now`
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive().and_time(self.time).and_utc();
        if today > now {
            today
        } else {
            today + chrono::Duration::days(1)
        }
    }
}

impl FromStr for Schedule {
    type Err = String;

    fn from_str(expr: &str) -> std::result::Result<Self, Self::Err> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, day, month, weekday] = fields.as_slice() else {
            return Err(format!("expected 5 fields, got {}", fields.len()));
        };

        if [day, month, weekday].iter().any(|f| **f != "*") {
            return Err("only daily schedules are supported (day, month and weekday must be '*')"
                .to_string());
        }

        let minute: u32 = minute
            .parse()
            .map_err(|_| format!("invalid minute '{minute}'"))?;
        let hour: u32 = hour.parse().map_err(|_| format!("invalid hour '{hour}'"))?;

        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| format!("time {hour}:{minute} is out of range"))?;

        Ok(Self { time })
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use chrono::Timelike;
        write!(f, "{} {} * * *", self.time.minute(), self.time.hour())
    }
}

/// Rejects overlapping report runs
#[derive(Debug, Default)]
pub struct RunLock {
    inner: Mutex<()>,
}

impl RunLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lock without waiting
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::RunInProgress`] if another run holds it
    pub fn try_acquire(&self) -> Result<MutexGuard<'_, ()>> {
        self.inner.try_lock().map_err(|_| ReportError::RunInProgress)
    }

    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

/// Resolves once the shutdown flag turns `true`; never if the sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Fires `job` at every scheduled time until shutdown
///
/// Each run is spawned so the scheduler keeps its cadence; overlapping runs are
/// expected to fail with [`ReportError::RunInProgress`] and are only logged.
/// On shutdown the scheduler waits for runs still in flight before returning.
pub async fn run_scheduled<F, Fut, T>(job: F, schedule: Schedule, mut shutdown: watch::Receiver<bool>)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let job = Arc::new(job);
    let mut runs: JoinSet<Result<T>> = JoinSet::new();
    tracing::info!(schedule = %schedule, "Scheduler started");

    loop {
        while let Some(finished) = runs.try_join_next() {
            log_run_outcome(finished);
        }

        if *shutdown.borrow() {
            break;
        }

        let now = Utc::now();
        let next = schedule.next_after(now);
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::info!(next_run = %next.to_rfc3339(), wait_secs = wait.as_secs(), "Waiting for next scheduled run");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown_requested(&mut shutdown) => break,
        }

        let job = Arc::clone(&job);
        runs.spawn(async move { job().await });
    }

    if !runs.is_empty() {
        tracing::info!(in_flight = runs.len(), "Waiting for in-flight runs to finish");
    }
    while let Some(finished) = runs.join_next().await {
        log_run_outcome(finished);
    }

    tracing::info!("Scheduler stopped");
}

fn log_run_outcome<T>(finished: std::result::Result<Result<T>, JoinError>) {
    match finished {
        Ok(Ok(_)) => tracing::debug!("Scheduled run finished"),
        Ok(Err(ReportError::RunInProgress)) => {
            tracing::warn!("Skipping scheduled run: previous run still in progress");
        }
        Ok(Err(e)) => crate::log_error_with_context!(e, "Scheduled run failed"),
        Err(e) => tracing::error!(error = %e, "Scheduled run task aborted"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_case::test_case;

    #[test]
    fn test_parse_default() {
        let schedule: Schedule = "0 0 * * *".parse().unwrap();
        assert_eq!(schedule, Schedule::daily_midnight());
        assert_eq!(schedule.to_string(), "0 0 * * *");
    }

    #[test]
    fn test_parse_time_of_day() {
        let schedule: Schedule = "30 6 * * *".parse().unwrap();
        assert_eq!(schedule.time(), NaiveTime::from_hms_opt(6, 30, 0).unwrap());
    }

    #[test_case("0 0 * *" ; "too few fields")]
    #[test_case("0 0 * * * *" ; "too many fields")]
    #[test_case("*/5 0 * * *" ; "step minute")]
    #[test_case("0 24 * * *" ; "hour out of range")]
    #[test_case("60 0 * * *" ; "minute out of range")]
    #[test_case("0 0 1 * *" ; "day of month")]
    #[test_case("0 0 * * MON" ; "weekday")]
    fn test_parse_rejects(expr: &str) {
        assert!(expr.parse::<Schedule>().is_err());
    }

    #[test]
    fn test_next_after() {
        let schedule: Schedule = "30 6 * * *".parse().unwrap();

        let before = Utc.with_ymd_and_hms(2024, 3, 1, 5, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(before),
            Utc.with_ymd_and_hms(2024, 3, 1, 6, 30, 0).unwrap()
        );

        let exactly = Utc.with_ymd_and_hms(2024, 3, 1, 6, 30, 0).unwrap();
        assert_eq!(
            schedule.next_after(exactly),
            Utc.with_ymd_and_hms(2024, 3, 2, 6, 30, 0).unwrap()
        );

        let year_end = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 0).unwrap();
        assert_eq!(
            Schedule::daily_midnight().next_after(year_end),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_run_lock_rejects_overlap() {
        let lock = RunLock::new();
        let guard = lock.try_acquire().unwrap();
        assert!(lock.is_held());
        assert!(matches!(lock.try_acquire(), Err(ReportError::RunInProgress)));

        drop(guard);
        assert!(!lock.is_held());
        assert!(lock.try_acquire().is_ok());
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_shutdown() {
        let (_tx, rx) = watch::channel(true);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        run_scheduled(
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            Schedule::daily_midnight(),
            rx,
        )
        .await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_fires_job() {
        let (tx, rx) = watch::channel(false);
        let tx = Arc::new(tx);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        run_scheduled(
            move || {
                let counter = Arc::clone(&counter);
                let tx = Arc::clone(&tx);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _ = tx.send(true);
                    Ok(())
                }
            },
            Schedule::daily_midnight(),
            rx,
        )
        .await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_waits_for_in_flight_run() {
        let (tx, rx) = watch::channel(false);
        let tx = Arc::new(tx);
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let (started_in_job, finished_in_job) = (Arc::clone(&started), Arc::clone(&finished));

        run_scheduled(
            move || {
                let tx = Arc::clone(&tx);
                let started = Arc::clone(&started_in_job);
                let finished = Arc::clone(&finished_in_job);
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    let _ = tx.send(true);
                    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            Schedule::daily_midnight(),
            rx,
        )
        .await;

        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
