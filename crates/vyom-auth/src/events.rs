//! Ledger notifications and per-session callbacks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use vyom_types::ChallengeId;

/// Capacity of the event bus before slow subscribers start lagging.
const EVENT_BUS_CAPACITY: usize = 1024;

/// Why a challenge stopped being outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeResolution {
    /// A successful verdict consumed it.
    Verified,
    /// The failure that reached the lockout threshold consumed it.
    LockedOut,
    /// A newer challenge for the same session replaced it.
    Superseded,
    /// Its validity window closed.
    Expired,
}

/// A ledger transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    Authenticated {
        session_id: String,
        method: String,
        #[serde(with = "vyom_types::epoch")]
        expires_at: DateTime<Utc>,
    },
    /// Authentication lapsed and was cleared on read.
    AuthExpired { session_id: String },
    FailedAttempt { session_id: String, attempts: u32 },
    /// The failed-attempt count reached the lockout threshold.
    LockedOut { session_id: String, attempts: u32 },
    ChallengeIssued {
        session_id: String,
        challenge_id: ChallengeId,
        intent_type: String,
    },
    ChallengeResolved {
        session_id: String,
        challenge_id: ChallengeId,
        resolution: ChallengeResolution,
    },
}

impl AuthEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::Authenticated { session_id, .. }
            | Self::AuthExpired { session_id }
            | Self::FailedAttempt { session_id, .. }
            | Self::LockedOut { session_id, .. }
            | Self::ChallengeIssued { session_id, .. }
            | Self::ChallengeResolved { session_id, .. } => session_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticated { .. } => "authenticated",
            Self::AuthExpired { .. } => "auth_expired",
            Self::FailedAttempt { .. } => "failed_attempt",
            Self::LockedOut { .. } => "locked_out",
            Self::ChallengeIssued { .. } => "challenge_issued",
            Self::ChallengeResolved { .. } => "challenge_resolved",
        }
    }
}

/// Broadcast channel carrying every [`AuthEvent`].
#[derive(Debug, Clone)]
pub struct AuthEventBus {
    tx: broadcast::Sender<AuthEvent>,
}

impl AuthEventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { tx }
    }

    /// Publishes without waiting for subscribers.
    pub fn publish(&self, event: AuthEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            tracing::trace!(event = name, "auth event published with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }
}

impl Default for AuthEventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A callback invoked with the session id. An `Err` is logged by the dispatcher.
pub type AuthCallback = Arc<dyn Fn(String) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Wraps an async closure as an [`AuthCallback`].
pub fn auth_callback<F, Fut>(f: F) -> AuthCallback
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    Arc::new(move |session_id: String| -> BoxFuture<'static, Result<(), String>> {
        Box::pin(f(session_id))
    })
}

type CallbackMap = HashMap<String, Vec<AuthCallback>>;

/// Per-session success and failure callbacks.
#[derive(Default)]
pub struct CallbackRegistry {
    success: RwLock<CallbackMap>,
    failure: RwLock<CallbackMap>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_success(&self, session_id: &str, callback: AuthCallback) {
        Self::insert(&self.success, session_id, callback);
    }

    pub fn register_failure(&self, session_id: &str, callback: AuthCallback) {
        Self::insert(&self.failure, session_id, callback);
    }

    pub fn success_callbacks(&self, session_id: &str) -> Vec<AuthCallback> {
        Self::snapshot(&self.success, session_id)
    }

    pub fn failure_callbacks(&self, session_id: &str) -> Vec<AuthCallback> {
        Self::snapshot(&self.failure, session_id)
    }

    /// Drops all callbacks for a session.
    pub fn forget(&self, session_id: &str) {
        for map in [&self.success, &self.failure] {
            map.write().unwrap_or_else(|p| p.into_inner()).remove(session_id);
        }
    }

    fn insert(map: &RwLock<CallbackMap>, session_id: &str, callback: AuthCallback) {
        map.write()
            .unwrap_or_else(|p| p.into_inner())
            .entry(session_id.to_string())
            .or_default()
            .push(callback);
    }

    fn snapshot(map: &RwLock<CallbackMap>, session_id: &str) -> Vec<AuthCallback> {
        map.read()
            .unwrap_or_else(|p| p.into_inner())
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry").finish_non_exhaustive()
    }
}

/// Spawns the task that turns bus events into callback invocations.
///
/// `Authenticated` runs the session's success callbacks and `LockedOut` its
/// failure callbacks, in publish order. Callbacks run one at a time so a
/// session observes its events in order; a failing callback is logged and
/// does not stop the others.
pub fn spawn_callback_dispatcher(
    bus: &AuthEventBus,
    registry: Arc<CallbackRegistry>,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "auth callback dispatcher lagged; events were dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let callbacks = match &event {
                AuthEvent::Authenticated { session_id, .. } => {
                    registry.success_callbacks(session_id)
                }
                AuthEvent::LockedOut { session_id, .. } => registry.failure_callbacks(session_id),
                _ => continue,
            };

            for callback in callbacks {
                let session_id = event.session_id().to_string();
                if let Err(e) = callback(session_id.clone()).await {
                    tracing::warn!(
                        session_id = %session_id,
                        event = event.name(),
                        "auth callback failed: {}",
                        e
                    );
                }
            }
        }
        tracing::debug!("auth callback dispatcher stopped");
    })
}
