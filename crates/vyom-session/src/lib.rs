//! Keyed per-session storage for the Vyom assistant.
//!
//! The authentication ledger and the conversation orchestrator never touch
//! process-global maps; they hold an `Arc<dyn SessionStore>` and an
//! `Arc<dyn ChallengeStore>` so tests can inject fresh stores and a
//! deployment can swap in a distributed backing store.
//!
//! Store implementations must make each `update` call atomic with respect
//! to other calls for the same session id. Calls for different session ids
//! must not serialize on a single global lock.

mod challenges;
mod clock;
mod memory;

pub use challenges::{ChallengeStore, MemoryChallengeStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemorySessionStore;

use vyom_types::SessionState;

/// Session state storage keyed by an opaque session id.
pub trait SessionStore: Send + Sync {
    /// Returns a snapshot of the session, creating it with defaults if absent.
    fn get(&self, session_id: &str) -> SessionState;

    /// Applies `f` to the session atomically, creating it if absent.
    fn update(&self, session_id: &str, f: &mut dyn FnMut(&mut SessionState));

    /// Resets an existing session to defaults. Unknown ids are left absent.
    fn reset(&self, session_id: &str);

    /// Keeps only the sessions for which `keep` returns true.
    ///
    /// Returns the ids that were removed.
    fn retain(&self, keep: &mut dyn FnMut(&str, &SessionState) -> bool) -> Vec<String>;

    /// Number of sessions currently held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Closure-returning convenience over [`SessionStore::update`].
pub trait SessionStoreExt {
    /// Applies `f` atomically and returns its result.
    fn modify<R>(&self, session_id: &str, f: impl FnOnce(&mut SessionState) -> R) -> R;
}

impl<T: SessionStore + ?Sized> SessionStoreExt for T {
    fn modify<R>(&self, session_id: &str, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut f = Some(f);
        let mut out = None;
        self.update(session_id, &mut |state| {
            if let Some(f) = f.take() {
                out = Some(f(state));
            }
        });
        match out {
            Some(value) => value,
            // `update` contractually invokes the closure exactly once.
            None => unreachable!("SessionStore::update did not invoke its closure"),
        }
    }
}
