use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use pricewatch_core::DailySchedule;
use pricewatch_logging::{watch_error, watch_info, watch_warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// "Run in progress" flag shared by every trigger of one scheduler.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    active: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` while another permit is alive.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                active: Arc::clone(&self.active),
            })
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Held for the duration of one run; released on drop, including unwinds.
#[derive(Debug)]
pub struct RunPermit {
    active: Arc<AtomicBool>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Started(JoinHandle<()>),
    /// A previous run was still active.
    Skipped,
}

/// Runs a job at startup and then daily, never two at once.
#[derive(Debug, Clone)]
pub struct Scheduler {
    schedule: DailySchedule,
    run_on_start: bool,
    guard: RunGuard,
}

impl Scheduler {
    pub fn new(schedule: DailySchedule, run_on_start: bool) -> Self {
        Self {
            schedule,
            run_on_start,
            guard: RunGuard::new(),
        }
    }

    pub fn guard(&self) -> &RunGuard {
        &self.guard
    }

    /// Start `job` on its own task unless a run is already in progress.
    ///
    /// A failing run is logged; it never stops the scheduler.
    pub fn trigger<F, Fut, E>(&self, job: &F) -> TriggerOutcome
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let Some(permit) = self.guard.try_acquire() else {
            watch_warn!("Previous price run still in progress; skipping this trigger");
            return TriggerOutcome::Skipped;
        };
        let run = job();
        TriggerOutcome::Started(tokio::spawn(async move {
            let _permit = permit;
            if let Err(err) = run.await {
                watch_error!("Price run failed: {}", err);
            }
        }))
    }

    /// Drive `job` until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run<F, Fut, E>(&self, job: F, mut shutdown: watch::Receiver<bool>)
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        if self.run_on_start {
            self.trigger(&job);
        }

        // Last slot that fired; the next one is always strictly later, even if
        // the wall clock lags behind the timer.
        let mut fired = Local::now();
        loop {
            if *shutdown.borrow() {
                break;
            }
            let now = Local::now();
            let next = self.schedule.next_trigger(&now.max(fired));
            let wait = (next - now).to_std().unwrap_or_default();
            watch_info!("Next price run at {}", next.format("%Y-%m-%d %H:%M:%S %:z"));

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    watch_info!("Running the scheduled price run");
                    fired = next;
                    self.trigger(&job);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        watch_info!("Scheduler stopped");
    }
}
