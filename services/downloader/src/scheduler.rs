//! Bounded-parallel fetch scheduler for one station.
//!
//! A single coordinating loop owns every `FetchTask`. Workers and retry
//! timers are spawned tasks that report back over an mpsc channel, so task
//! state is only ever touched by the coordinator. The cancellation boundary
//! is the one piece of state shared with workers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use storage::ObservationSink;
use weather_common::{Station, Window};

use crate::report::{FailedFetch, StationReport, StoredWindow};
use crate::source::{FetchError, FetchOutcome, ObservationSource};
use crate::state::{CancellationBoundary, FetchTask, TaskStatus};

/// Retry policy for `Retryable` outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total fetch attempts per window, the first one included
    pub max_attempts: u32,
    /// Delay before the second attempt (doubles each retry)
    pub base_delay: Duration,
    /// Maximum retry delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Backoff after `attempt` failed attempts: `base * 2^(attempt-1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Maximum windows in flight at once
    pub max_workers: usize,
    pub retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            retry: RetryPolicy::default(),
        }
    }
}

/// What a worker observed for one attempt.
#[derive(Debug)]
enum AttemptResult {
    Stored(u64),
    Retryable(String),
    NoMoreData,
    Fatal(FetchError),
    /// The window fell behind the boundary before its rows were written.
    Cancelled,
}

#[derive(Debug)]
enum Event {
    Completed { index: usize, result: AttemptResult },
    RetryDue { index: usize },
}

/// Fetches windows for a station and streams the rows into a sink.
pub struct FetchScheduler {
    source: Arc<dyn ObservationSource>,
    sink: Arc<dyn ObservationSink>,
    config: SchedulerConfig,
}

impl FetchScheduler {
    pub fn new(
        source: Arc<dyn ObservationSource>,
        sink: Arc<dyn ObservationSink>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            source,
            sink,
            config: SchedulerConfig {
                max_workers: config.max_workers.max(1),
                ..config
            },
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run every window of `station` to a terminal state.
    ///
    /// Windows are dispatched in the order given, which the planner makes
    /// most recent first.
    #[instrument(skip_all, fields(station = %station, windows = windows.len()))]
    pub async fn run_station(&self, station: &Station, windows: Vec<Window>) -> StationReport {
        let boundary = CancellationBoundary::new();
        let mut report = StationReport::new(station.clone());
        let mut tasks: Vec<FetchTask> = windows
            .into_iter()
            .map(|w| FetchTask::new(station.clone(), w))
            .collect();

        let mut ready: VecDeque<usize> = (0..tasks.len()).collect();
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let mut in_flight = 0usize;
        let mut backing_off = 0usize;

        info!(max_workers = self.config.max_workers, "Starting station backfill");

        loop {
            while in_flight < self.config.max_workers {
                let Some(index) = ready.pop_front() else {
                    break;
                };
                let task = &mut tasks[index];
                if boundary.cancels(&task.window) {
                    cancel(task, &mut report);
                    continue;
                }
                task.status = TaskStatus::InFlight;
                task.attempts += 1;
                in_flight += 1;
                debug!(window = %task.window, attempt = task.attempts, "Dispatching window");
                self.spawn_worker(index, task, &boundary, tx.clone());
            }

            if in_flight == 0 && backing_off == 0 && ready.is_empty() {
                break;
            }

            // The coordinator keeps a sender, so the channel never closes here
            let Some(event) = rx.recv().await else {
                break;
            };

            match event {
                Event::RetryDue { index } => {
                    let task = &mut tasks[index];
                    // Already cancelled while backing off
                    if task.status != TaskStatus::Retrying {
                        continue;
                    }
                    backing_off -= 1;
                    if boundary.cancels(&task.window) {
                        cancel(task, &mut report);
                        continue;
                    }
                    task.status = TaskStatus::Pending;
                    let window = task.window;
                    let at = ready.partition_point(|&i| tasks[i].window > window);
                    ready.insert(at, index);
                }
                Event::Completed { index, result } => {
                    in_flight -= 1;
                    let task = &mut tasks[index];

                    match result {
                        AttemptResult::Stored(rows) => {
                            task.status = TaskStatus::Succeeded;
                            debug!(window = %task.window, rows, "Window stored");
                            report.succeeded.push(StoredWindow {
                                window: task.window,
                                rows,
                            });
                        }
                        _ if boundary.cancels(&task.window) => cancel(task, &mut report),
                        AttemptResult::Cancelled => cancel(task, &mut report),
                        AttemptResult::NoMoreData => {
                            task.status = TaskStatus::NoMoreData;
                            boundary.raise(task.window.start);
                            info!(
                                window = %task.window,
                                boundary = %task.window.start,
                                "No earlier data, cancelling older windows"
                            );
                            report.no_more_data.push(task.window);

                            ready.retain(|&i| {
                                let queued = &mut tasks[i];
                                if boundary.cancels(&queued.window) {
                                    cancel(queued, &mut report);
                                    false
                                } else {
                                    true
                                }
                            });

                            for waiting in tasks.iter_mut().filter(|t| {
                                t.status == TaskStatus::Retrying && boundary.cancels(&t.window)
                            }) {
                                backing_off -= 1;
                                cancel(waiting, &mut report);
                            }
                        }
                        AttemptResult::Retryable(reason) => {
                            if task.attempts >= self.config.retry.max_attempts {
                                task.status = TaskStatus::Failed;
                                warn!(
                                    window = %task.window,
                                    attempts = task.attempts,
                                    reason = %reason,
                                    "Retries exhausted"
                                );
                                report.failures.push(failure(task, reason));
                            } else {
                                task.status = TaskStatus::Retrying;
                                backing_off += 1;
                                let delay = self.config.retry.delay_for(task.attempts);
                                debug!(
                                    window = %task.window,
                                    attempt = task.attempts,
                                    delay_ms = delay.as_millis() as u64,
                                    reason = %reason,
                                    "Retrying window"
                                );
                                let tx = tx.clone();
                                tokio::spawn(async move {
                                    tokio::time::sleep(delay).await;
                                    let _ = tx.send(Event::RetryDue { index });
                                });
                            }
                        }
                        AttemptResult::Fatal(e) => {
                            task.status = TaskStatus::Fatal;
                            error!(
                                window = %task.window,
                                attempts = task.attempts,
                                error = %e,
                                "Window fetch failed"
                            );
                            report.failures.push(failure(task, e.to_string()));
                        }
                    }
                }
            }
        }

        report.boundary = boundary.get();
        info!(
            succeeded = report.succeeded.len(),
            no_more_data = report.no_more_data.len(),
            cancelled = report.cancelled.len(),
            failed = report.failures.len(),
            rows = report.rows_written(),
            "Station backfill finished"
        );
        report
    }

    fn spawn_worker(
        &self,
        index: usize,
        task: &FetchTask,
        boundary: &CancellationBoundary,
        tx: mpsc::UnboundedSender<Event>,
    ) {
        let source = self.source.clone();
        let sink = self.sink.clone();
        let station = task.station.clone();
        let window = task.window;
        let boundary = boundary.clone();

        tokio::spawn(async move {
            let attempt = tokio::spawn(run_attempt(source, sink, station, window, boundary));
            let result = match attempt.await {
                Ok(result) => result,
                Err(e) => AttemptResult::Fatal(FetchError::Aborted(e.to_string())),
            };
            let _ = tx.send(Event::Completed { index, result });
        });
    }
}

/// One fetch attempt: check the boundary, fetch, re-check, then upsert.
async fn run_attempt(
    source: Arc<dyn ObservationSource>,
    sink: Arc<dyn ObservationSink>,
    station: Station,
    window: Window,
    boundary: CancellationBoundary,
) -> AttemptResult {
    if boundary.cancels(&window) {
        return AttemptResult::Cancelled;
    }

    match source.fetch(&station, &window).await {
        FetchOutcome::Succeeded(rows) => {
            if boundary.cancels(&window) {
                return AttemptResult::Cancelled;
            }
            match sink.upsert(&station, &rows).await {
                Ok(written) => AttemptResult::Stored(written),
                Err(e) => AttemptResult::Fatal(FetchError::Storage(e.to_string())),
            }
        }
        FetchOutcome::Retryable(reason) => AttemptResult::Retryable(reason),
        FetchOutcome::NoMoreData => AttemptResult::NoMoreData,
        FetchOutcome::Fatal(e) => AttemptResult::Fatal(e),
    }
}

fn cancel(task: &mut FetchTask, report: &mut StationReport) {
    task.status = TaskStatus::Cancelled;
    report.cancelled.push(task.window);
}

fn failure(task: &FetchTask, cause: String) -> FailedFetch {
    FailedFetch {
        station: task.station.clone(),
        window: task.window,
        attempts: task.attempts,
        status: task.status,
        cause,
    }
}
