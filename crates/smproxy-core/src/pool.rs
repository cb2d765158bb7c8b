use std::sync::Mutex;

use rand::Rng;

/// The pool cannot hand out a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no credentials in pool")]
pub struct PoolEmpty;

/// Serializable view of the pool, used by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub credentials: Vec<String>,
    pub cursor: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    credentials: Vec<String>,
    cursor: usize,
}

/// Ordered pool of opaque session credentials with a round-robin cursor.
///
/// All mutation goes through these operations; callers share the pool as an
/// `Arc` handle. Each operation is atomic, but a pick-use-rotate sequence
/// spanning multiple operations is not, and neither is persistence of the
/// snapshot: concurrent rotations can interleave their snapshot writes.
#[derive(Debug, Default)]
pub struct CredentialPool {
    state: Mutex<PoolState>,
}

impl CredentialPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore(snapshot: PoolSnapshot) -> Self {
        let mut state = PoolState {
            credentials: snapshot.credentials,
            cursor: snapshot.cursor,
        };
        clamp_cursor(&mut state);
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.lock();
        PoolSnapshot {
            credentials: state.credentials.clone(),
            cursor: state.cursor,
        }
    }

    pub fn list(&self) -> Vec<String> {
        self.lock().credentials.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().credentials.is_empty()
    }

    /// Add credentials, skipping duplicates by exact value. Returns the pool
    /// size afterwards.
    pub fn add(&self, values: impl IntoIterator<Item = String>) -> usize {
        let mut state = self.lock();
        for value in values {
            let value = value.trim().to_string();
            if value.is_empty() || state.credentials.contains(&value) {
                continue;
            }
            state.credentials.push(value);
        }
        state.credentials.len()
    }

    /// Replace the whole pool, resetting the cursor.
    pub fn replace(&self, values: impl IntoIterator<Item = String>) -> usize {
        {
            let mut state = self.lock();
            state.credentials.clear();
            state.cursor = 0;
        }
        self.add(values)
    }

    pub fn remove(&self, value: &str) -> bool {
        let mut state = self.lock();
        let before = state.credentials.len();
        state.credentials.retain(|item| item != value);
        clamp_cursor(&mut state);
        state.credentials.len() != before
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.credentials.clear();
        state.cursor = 0;
    }

    /// Current cursor's credential; advances the cursor modulo pool size.
    pub fn pick_round_robin(&self) -> Option<String> {
        let mut state = self.lock();
        if state.credentials.is_empty() {
            return None;
        }
        let index = state.cursor % state.credentials.len();
        let chosen = state.credentials[index].clone();
        state.cursor = (index + 1) % state.credentials.len();
        Some(chosen)
    }

    /// Uniform random pick. Leaves the round-robin cursor untouched.
    pub fn pick_random(&self) -> Option<String> {
        let state = self.lock();
        if state.credentials.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..state.credentials.len());
        Some(state.credentials[index].clone())
    }

    /// Drop the failed credential (when given) and hand out the next one
    /// round-robin.
    pub fn rotate_after_failure(&self, failed: Option<&str>) -> Result<String, PoolEmpty> {
        if let Some(failed) = failed {
            self.remove(failed);
        }
        self.pick_round_robin().ok_or(PoolEmpty)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn clamp_cursor(state: &mut PoolState) {
    if state.cursor >= state.credentials.len() {
        state.cursor = 0;
    }
}
