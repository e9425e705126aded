//! Background tasks for the Vyom server.
//!
//! Includes:
//! - Removing expired challenges.
//! - Evicting idle sessions and the per-session state kept beside them.

use crate::AppState;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// What one sweep removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_challenges: usize,
    pub evicted_sessions: Vec<String>,
    pub pruned_locks: usize,
}

/// Runs one sweep.
///
/// Sessions are only evicted when idle for `idle_secs` and holding no live
/// authentication, challenge or parked request. Evicted sessions also lose
/// their conversation history. `idle_secs == 0` disables eviction.
pub fn sweep_once(state: &AppState, idle_secs: u64) -> SweepReport {
    let expired_challenges = state.ledger.sweep_expired_challenges();

    let evicted_sessions = if idle_secs == 0 {
        Vec::new()
    } else {
        state
            .ledger
            .evict_idle(chrono::Duration::seconds(idle_secs as i64))
    };
    for session_id in &evicted_sessions {
        state.orchestrator.narrator().forget(session_id);
    }

    let pruned_locks = state.authenticator.locks().prune();

    SweepReport {
        expired_challenges,
        evicted_sessions,
        pruned_locks,
    }
}

/// Starts the sweep task.
///
/// Runs indefinitely every `interval_secs`. `interval_secs == 0` disables it.
pub async fn start_sweep_task(state: Arc<AppState>, interval_secs: u64, idle_secs: u64) {
    if interval_secs == 0 {
        tracing::warn!("session sweep task disabled (interval=0)");
        return;
    }

    let interval = Duration::from_secs(interval_secs);
    tracing::info!(interval_secs, idle_secs, "starting session sweep task");

    loop {
        sleep(interval).await;

        let report = sweep_once(&state, idle_secs);
        if report.expired_challenges > 0 || !report.evicted_sessions.is_empty() {
            tracing::info!(
                expired_challenges = report.expired_challenges,
                evicted_sessions = report.evicted_sessions.len(),
                pruned_locks = report.pruned_locks,
                "session sweep completed"
            );
        } else {
            tracing::debug!(pruned_locks = report.pruned_locks, "session sweep found nothing to remove");
        }
    }
}
