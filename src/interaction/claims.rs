use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Settled keys remembered per process. Older keys are forgotten first.
pub const SETTLED_CAPACITY: usize = 4096;

/// Per-message decision guard, keyed by `channel:message_ts`.
///
/// A proposal is decided once. The first run or cancel claims the message;
/// while the claim is held further decisions are refused as in flight, and
/// once it drops the key is settled and refused for good. The set is per
/// process.
#[derive(Debug)]
pub struct RunClaims {
    state: Mutex<ClaimState>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct ClaimState {
    active: HashSet<String>,
    settled: HashSet<String>,
    settled_order: VecDeque<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimRefusal {
    InFlight,
    Settled,
}

#[derive(Debug)]
pub struct RunClaim<'a> {
    claims: &'a RunClaims,
    key: String,
    settle: bool,
}

impl Default for RunClaims {
    fn default() -> Self {
        Self::with_capacity(SETTLED_CAPACITY)
    }
}

impl RunClaims {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(ClaimState::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn try_claim(&self, key: impl Into<String>) -> Result<RunClaim<'_>, ClaimRefusal> {
        let key = key.into();
        let mut state = self.lock();
        if state.settled.contains(&key) {
            return Err(ClaimRefusal::Settled);
        }
        if !state.active.insert(key.clone()) {
            return Err(ClaimRefusal::InFlight);
        }
        Ok(RunClaim {
            claims: self,
            key,
            settle: true,
        })
    }

    /// True while a decision on `key` is being carried out.
    pub fn is_claimed(&self, key: &str) -> bool {
        self.lock().active.contains(key)
    }

    pub fn is_settled(&self, key: &str) -> bool {
        self.lock().settled.contains(key)
    }

    fn lock(&self) -> MutexGuard<'_, ClaimState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn finish(&self, key: &str, settle: bool) {
        let mut state = self.lock();
        state.active.remove(key);
        if !settle || !state.settled.insert(key.to_string()) {
            return;
        }
        state.settled_order.push_back(key.to_string());
        while state.settled_order.len() > self.capacity {
            if let Some(oldest) = state.settled_order.pop_front() {
                state.settled.remove(&oldest);
            }
        }
    }
}

impl RunClaim<'_> {
    /// Releases the message without settling it, for when nothing was shown
    /// or run and the buttons are still live.
    pub fn abandon(mut self) {
        self.settle = false;
    }
}

impl Drop for RunClaim<'_> {
    fn drop(&mut self) {
        self.claims.finish(&self.key, self.settle);
    }
}

pub fn claim_key(channel_id: &str, message_ts: &str) -> String {
    format!("{channel_id}:{message_ts}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_is_refused_in_flight_then_settled_for_good() {
        let claims = RunClaims::default();
        let key = claim_key("C1", "1700.1");
        let first = claims.try_claim(key.clone()).expect("first claim");
        assert_eq!(
            claims.try_claim(key.clone()).err(),
            Some(ClaimRefusal::InFlight)
        );
        assert!(claims.try_claim(claim_key("C1", "1700.2")).is_ok());
        drop(first);
        assert!(!claims.is_claimed(&key));
        assert!(claims.is_settled(&key));
        assert_eq!(claims.try_claim(key).err(), Some(ClaimRefusal::Settled));
    }

    #[test]
    fn abandoned_claim_can_be_taken_again() {
        let claims = RunClaims::default();
        let key = claim_key("C1", "1700.1");
        claims.try_claim(key.clone()).expect("claim").abandon();
        assert!(!claims.is_settled(&key));
        assert!(claims.try_claim(key).is_ok());
    }

    #[test]
    fn settled_keys_are_bounded_oldest_first() {
        let claims = RunClaims::with_capacity(2);
        for ts in ["1", "2", "3"] {
            drop(claims.try_claim(claim_key("C1", ts)).expect("claim"));
        }
        assert!(!claims.is_settled(&claim_key("C1", "1")));
        assert!(claims.is_settled(&claim_key("C1", "2")));
        assert!(claims.is_settled(&claim_key("C1", "3")));
    }
}
