//! The intake scheduler — a single cooperative control loop.
//!
//! Each tick drains the intake queue, decides whether the mail throttle has
//! expired, then sleeps for a fixed interval. Mail is pulled eagerly on the
//! very first tick so a freshly (re)started daemon honors new mail settings
//! without waiting out a full throttle window. Shutdown arrives on a watch
//! channel and is observed before each collaborator call and during the
//! sleep, so a mid-sleep interrupt exits before the next drain.
//!
//! Collaborator calls run under explicit deadlines; a failed or timed-out
//! call is logged and the loop carries on. Only startup construction
//! failures are fatal, and those happen before this loop exists.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info};

use crate::config::IntakeConfig;
use crate::consumer::Consume;
use crate::mail::MailFetch;

// ── Clock ───────────────────────────────────────────────────────────

/// Wall-clock source. A seam so the timing policy can be tested against a
/// simulated clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ── Scheduler ───────────────────────────────────────────────────────

/// Timing policy, fixed at construction.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Fixed delay between ticks. The sleep does not subtract work time,
    /// so the actual period is `loop_interval` plus whatever the
    /// collaborators spent.
    pub loop_interval: Duration,
    /// Minimum elapsed time between mail pulls.
    pub mail_check_interval: Duration,
    /// Deadline for one consume() batch.
    pub consume_timeout: Duration,
    /// Deadline for one pull() call.
    pub pull_timeout: Duration,
}

impl From<&IntakeConfig> for SchedulerConfig {
    fn from(config: &IntakeConfig) -> Self {
        Self {
            loop_interval: config.loop_interval,
            mail_check_interval: config.mail_check_interval,
            consume_timeout: config.consume_timeout,
            pull_timeout: config.pull_timeout,
        }
    }
}

/// The control loop. Owns both collaborators; nothing else touches the
/// intake queue while a tick is in flight.
pub struct Scheduler<C: Consume, M: MailFetch> {
    config: SchedulerConfig,
    consumer: C,
    fetcher: M,
    clock: Arc<dyn Clock>,
    /// True exactly once, for the very first tick. Cleared the moment a
    /// mail pull is attempted, successful or not.
    first_iteration: bool,
}

impl<C: Consume, M: MailFetch> Scheduler<C, M> {
    pub fn new(config: SchedulerConfig, consumer: C, fetcher: M) -> Self {
        Self {
            config,
            consumer,
            fetcher,
            clock: Arc::new(SystemClock),
            first_iteration: true,
        }
    }

    /// Swap in an alternative clock (used by tests with simulated time).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run until `shutdown` flips to true or its sender goes away.
    ///
    /// Exit is a normal termination, not an error; the collaborators are
    /// responsible for their own resource release.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            loop_interval = ?self.config.loop_interval,
            mail_check_interval = ?self.config.mail_check_interval,
            "Scheduler running"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            self.consume_once().await;

            if *shutdown.borrow() {
                break;
            }
            self.maybe_pull().await;

            debug!("Tick complete");

            tokio::select! {
                () = sleep(self.config.loop_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow_and_update() {
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Drain the intake queue once, bounded by the consume deadline.
    async fn consume_once(&mut self) {
        match timeout(self.config.consume_timeout, self.consumer.consume()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Document consumption failed: {e}"),
            Err(_) => error!(
                deadline = ?self.config.consume_timeout,
                "Document consumption timed out"
            ),
        }
    }

    /// Pull mail if the throttle has expired (or this is the first tick).
    async fn maybe_pull(&mut self) {
        if !self.mail_due() {
            return;
        }
        // Cleared on attempt, not success: a failing mail source waits a
        // full mail_check_interval before the next try.
        self.first_iteration = false;

        match timeout(self.config.pull_timeout, self.fetcher.pull()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Mail pull failed: {e}"),
            Err(_) => error!(deadline = ?self.config.pull_timeout, "Mail pull timed out"),
        }
    }

    /// The throttle decision. Reads the fetcher's own timestamp; the
    /// scheduler never writes it.
    fn mail_due(&self) -> bool {
        if self.first_iteration {
            return true;
        }
        match self.fetcher.last_checked() {
            None => true,
            Some(at) => self
                .clock
                .now()
                .signed_duration_since(at)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= self.config.mail_check_interval),
        }
    }
}
