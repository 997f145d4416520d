use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::{Engine, ReconcileError, TickOutcome};

/// How often to poll and how hard to retry a failed poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub interval: Duration,
    /// Extra attempts after a failed fetch, within one tick.
    pub max_retries: u32,
    /// First retry delay; doubles per attempt, capped at half the interval.
    pub backoff: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RefreshPolicy {
    fn max_backoff(&self) -> Duration {
        (self.interval / 2).max(self.backoff)
    }
}

/// Periodic authoritative refresh for one engine. Cancelled on `stop` or drop.
pub struct RefreshScheduler {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn spawn(engine: Engine, policy: RefreshPolicy) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_refresher(engine, policy, cancel.clone()));
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Cancel the timer and wait for the task to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Background loop: every `interval`, ask the engine for a tick refresh.
/// The engine itself drops the tick while mutations are pending.
pub async fn run_refresher(engine: Engine, policy: RefreshPolicy, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(policy.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick is immediate; the engine already loads on start.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            closed = refresh_with_retry(&engine, &policy) => {
                if closed {
                    break;
                }
            }
        }
    }
    debug!("refresh scheduler stopped");
}

/// Returns true once the engine has shut down.
async fn refresh_with_retry(engine: &Engine, policy: &RefreshPolicy) -> bool {
    let mut delay = policy.backoff;
    let mut attempt = 0u32;
    loop {
        match engine.tick().await {
            Ok(TickOutcome::Refreshed) => return false,
            Ok(TickOutcome::Suppressed) => {
                debug!("refresh tick suppressed");
                return false;
            }
            Err(ReconcileError::EngineClosed) => return true,
            Err(e) if attempt >= policy.max_retries => {
                warn!("refresh failed after {} attempt(s), waiting for next tick: {e}", attempt + 1);
                return false;
            }
            Err(e) => {
                attempt += 1;
                warn!("refresh failed, retry {attempt}/{} in {delay:?}: {e}", policy.max_retries);
                metrics::counter!(crate::observability::REFRESH_RETRIES_TOTAL).increment(1);
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(policy.max_backoff());
            }
        }
    }
}
