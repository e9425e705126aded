//! Keyed storage for outstanding challenges.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use vyom_types::{Challenge, ChallengeId};

/// Challenge storage keyed by challenge id. Last write wins per id.
pub trait ChallengeStore: Send + Sync {
    fn store(&self, challenge: Challenge);

    fn get(&self, challenge_id: &str) -> Option<Challenge>;

    /// Removes and returns a challenge.
    fn remove(&self, challenge_id: &str) -> Option<Challenge>;

    /// Removes every challenge whose validity window closed before `now`.
    fn remove_expired(&self, now: DateTime<Utc>) -> Vec<Challenge>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory [`ChallengeStore`].
#[derive(Debug, Default)]
pub struct MemoryChallengeStore {
    challenges: Mutex<HashMap<ChallengeId, Challenge>>,
}

impl MemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChallengeId, Challenge>> {
        match self.challenges.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("challenge store lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl ChallengeStore for MemoryChallengeStore {
    fn store(&self, challenge: Challenge) {
        self.lock().insert(challenge.challenge_id.clone(), challenge);
    }

    fn get(&self, challenge_id: &str) -> Option<Challenge> {
        self.lock().get(challenge_id).cloned()
    }

    fn remove(&self, challenge_id: &str) -> Option<Challenge> {
        self.lock().remove(challenge_id)
    }

    fn remove_expired(&self, now: DateTime<Utc>) -> Vec<Challenge> {
        let mut map = self.lock();
        let expired: Vec<ChallengeId> = map
            .values()
            .filter(|c| c.is_expired(now))
            .map(|c| c.challenge_id.clone())
            .collect();
        expired.iter().filter_map(|id| map.remove(id)).collect()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn store_get_remove() {
        let store = MemoryChallengeStore::new();
        let challenge = Challenge::issue("s1", "dbquery", Utc::now());
        let id = challenge.challenge_id.clone();
        store.store(challenge.clone());

        assert_eq!(store.get(id.as_str()), Some(challenge.clone()));
        assert_eq!(store.remove(id.as_str()), Some(challenge));
        assert_eq!(store.get(id.as_str()), None);
        assert!(store.is_empty());
    }

    #[test]
    fn last_write_wins_per_id() {
        let store = MemoryChallengeStore::new();
        let first = Challenge::issue("s1", "dbquery", Utc::now());
        let mut second = first.clone();
        second.intent_type = "service".into();
        store.store(first.clone());
        store.store(second);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(first.challenge_id.as_str()).map(|c| c.intent_type),
            Some("service".to_string())
        );
    }

    #[test]
    fn remove_expired_keeps_live_challenges() {
        let store = MemoryChallengeStore::new();
        let now = Utc::now();
        let old = Challenge::issue("s1", "dbquery", now - Duration::seconds(300));
        let fresh = Challenge::issue("s2", "dbquery", now);
        store.store(old.clone());
        store.store(fresh.clone());

        let removed = store.remove_expired(now);
        assert_eq!(removed, vec![old]);
        assert!(store.get(fresh.challenge_id.as_str()).is_some());
    }
}
