use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

use crate::services::status_checker::StatusChecker;

/// Periodic driver for a `StatusChecker`.
///
/// The first pass starts after a random delay below one interval so that
/// instances started together do not poll in lockstep. A tick that arrives
/// while the previous pass is still running is skipped, not queued.
pub struct StatusPoll {
    checker: Arc<dyn StatusChecker>,
    period: Duration,
    /// `None` draws a random delay below `period` at start.
    start_delay: Option<Duration>,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    span: Span,
}

/// Clears the running flag when a pass ends, even by panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl StatusPoll {
    /// `period` must be non-zero.
    pub fn new(checker: Arc<dyn StatusChecker>, period: Duration) -> Self {
        Self {
            checker,
            period,
            start_delay: None,
            running: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            span: tracing::info_span!("status_poll"),
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.start_delay = Some(Duration::ZERO);
        self
    }

    /// Start the first pass after exactly `delay` instead of a random one.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    fn start_delay(&self) -> Duration {
        match self.start_delay {
            Some(delay) => delay,
            None => jitter_below(self.period, &mut rand::thread_rng()),
        }
    }

    pub fn start(&self) -> JoinHandle<()> {
        let checker = self.checker.clone();
        let running = self.running.clone();
        let cancel = self.cancel.clone();
        let period = self.period;
        let delay = self.start_delay();
        let span = self.span.clone();

        tracing::info!(
            parent: &self.span,
            "Starting status poll with {:?} interval in {:?}",
            period,
            delay
        );

        tokio::spawn(
            async move {
                if !delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = sleep(delay) => {}
                    }
                }

                // First tick completes immediately
                let mut ticker = interval(period);
                // At most one pass runs at a time, so the latest handle is the only live one
                let mut in_flight: Option<JoinHandle<()>> = None;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            if let Some(pass) = in_flight.take() {
                                tracing::info!("Waiting for the running pass to finish");
                                if let Err(e) = pass.await {
                                    tracing::error!("Status poll pass aborted: {}", e);
                                }
                            }
                            tracing::info!("Status poll stopped");
                            break;
                        }
                        _ = ticker.tick() => {
                            if let Some(pass) = Self::trigger(&checker, &running, span.clone()) {
                                in_flight = Some(pass);
                            }
                        }
                    }
                }
            }
            .instrument(self.span.clone()),
        )
    }

    fn trigger(
        checker: &Arc<dyn StatusChecker>,
        running: &Arc<AtomicBool>,
        span: Span,
    ) -> Option<JoinHandle<()>> {
        if running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Status poll is already running, skipping");
            return None;
        }

        let guard = RunningGuard(running.clone());
        let checker = checker.clone();
        Some(tokio::spawn(
            async move {
                let _guard = guard;
                match checker.update_pending().await {
                    Ok(summary) => {
                        tracing::debug!(?summary, "Status poll pass completed");
                    }
                    Err(e) => {
                        tracing::error!("Error updating pending transactions: {}", e);
                    }
                }
            }
            .instrument(span),
        ))
    }

    /// Cancels future passes. A pass already in flight runs to completion,
    /// and the handle returned by `start` resolves only after it has.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Uniform delay in `[0, period)` at millisecond resolution.
fn jitter_below<R: Rng + ?Sized>(period: Duration, rng: &mut R) -> Duration {
    let period_ms = period.as_millis() as u64;
    if period_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.gen_range(0..period_ms))
}
