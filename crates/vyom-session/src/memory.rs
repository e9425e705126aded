//! Sharded in-memory session store.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use vyom_types::SessionState;

use crate::SessionStore;

const DEFAULT_SHARDS: usize = 16;

type Shard = RwLock<HashMap<String, SessionState>>;

/// In-memory [`SessionStore`] split into independently locked shards.
///
/// Uses `std::sync::RwLock`: every acquisition is a brief map operation that
/// never spans an `.await`, so a synchronous lock is safe here.
#[derive(Debug)]
pub struct MemorySessionStore {
    shards: Vec<Shard>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Creates a store with `shards` lock shards (at least one).
    pub fn with_shards(shards: usize) -> Self {
        let count = shards.max(1);
        Self {
            shards: (0..count).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, session_id: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        session_id.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    fn write(shard: &Shard) -> RwLockWriteGuard<'_, HashMap<String, SessionState>> {
        match shard.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // A panicked writer leaves at worst one half-updated session;
                // refusing every later request would be worse.
                tracing::error!("session store shard poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn read(shard: &Shard) -> RwLockReadGuard<'_, HashMap<String, SessionState>> {
        match shard.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("session store shard poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, session_id: &str) -> SessionState {
        let shard = self.shard(session_id);
        if let Some(state) = Self::read(shard).get(session_id) {
            return state.clone();
        }
        Self::write(shard)
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    fn update(&self, session_id: &str, f: &mut dyn FnMut(&mut SessionState)) {
        let mut map = Self::write(self.shard(session_id));
        f(map.entry(session_id.to_string()).or_default());
    }

    fn reset(&self, session_id: &str) {
        let mut map = Self::write(self.shard(session_id));
        if let Some(state) = map.get_mut(session_id) {
            *state = SessionState::default();
        }
    }

    fn retain(&self, keep: &mut dyn FnMut(&str, &SessionState) -> bool) -> Vec<String> {
        let mut removed = Vec::new();
        for shard in &self.shards {
            let mut map = Self::write(shard);
            map.retain(|id, state| {
                let kept = keep(id, state);
                if !kept {
                    removed.push(id.clone());
                }
                kept
            });
        }
        removed
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|s| Self::read(s).len()).sum()
    }
}
