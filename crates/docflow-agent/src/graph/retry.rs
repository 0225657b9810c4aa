use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, warn};

use docflow_core::config::EngineConfig;

use super::node::Handler;
use super::state::RunState;

/// Bounded-attempt policy with a fixed pause between failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_delay())
    }
}

/// Run `handler` for node `name` under `policy`.
///
/// Every attempt appends one timed line to the run log. A failure of the
/// last attempt is recorded as `"<name> failed after <n> tries: <cause>"`
/// in the state's error slot instead of being returned. A state that already
/// carries an error is left untouched.
pub async fn with_retry<C, S>(
    name: &str,
    handler: Handler<C, S>,
    policy: RetryPolicy,
    deps: &C,
    state: &mut S,
) where
    C: Sync,
    S: RunState,
{
    if state.failed() {
        debug!(node = name, "Run already failed, skipping node");
        return;
    }

    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        let started = Instant::now();
        let result = handler(deps, state).await;
        let elapsed_ms = started.elapsed().as_millis();

        match result {
            Ok(()) => {
                state
                    .log_mut()
                    .push(format!("{name} attempt {attempt} [{elapsed_ms}ms]"));
                return;
            }
            Err(e) => {
                state
                    .log_mut()
                    .push(format!("{name} attempt {attempt} failed [{elapsed_ms}ms]"));

                if attempt == attempts {
                    error!(node = name, attempts, error = %e, "Node failed, giving up");
                    state.set_error(format!("{name} failed after {attempts} tries: {e}"));
                    return;
                }

                warn!(
                    node = name,
                    attempt,
                    max_attempts = attempts,
                    delay_ms = policy.delay.as_millis() as u64,
                    error = %e,
                    "Node attempt failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}
