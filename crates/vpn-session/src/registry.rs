//! In-memory registry of connected users.

use std::collections::HashMap;

use parking_lot::Mutex;
use vpn_core::{SessionId, UserId};

/// Connected users and their open session, mirrored to the
/// `vpn_sessions_active` gauge.
#[derive(Debug, Default)]
pub struct ActiveSessions {
    inner: Mutex<HashMap<UserId, SessionId>>,
}

impl ActiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: UserId, session_id: SessionId) {
        let mut map = self.inner.lock();
        map.insert(user_id, session_id);
        vpn_metrics::set_sessions_active(map.len());
    }

    /// Forget `user_id` if `session_id` is still the registered session.
    pub fn remove(&self, user_id: UserId, session_id: SessionId) {
        let mut map = self.inner.lock();
        if map.get(&user_id) == Some(&session_id) {
            map.remove(&user_id);
        }
        vpn_metrics::set_sessions_active(map.len());
    }

    pub fn get(&self, user_id: UserId) -> Option<SessionId> {
        self.inner.lock().get(&user_id).copied()
    }

    /// Replace the registry contents.
    pub fn reset<I: IntoIterator<Item = (UserId, SessionId)>>(&self, entries: I) {
        let mut map = self.inner.lock();
        map.clear();
        map.extend(entries);
        vpn_metrics::set_sessions_active(map.len());
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_ignores_stale_session() {
        let reg = ActiveSessions::new();
        reg.insert(UserId(1), SessionId(10));
        reg.remove(UserId(1), SessionId(9));
        assert_eq!(reg.get(UserId(1)), Some(SessionId(10)));
        reg.remove(UserId(1), SessionId(10));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_reset_replaces_contents() {
        let reg = ActiveSessions::new();
        reg.insert(UserId(1), SessionId(1));
        reg.reset([(UserId(2), SessionId(5)), (UserId(3), SessionId(6))]);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get(UserId(1)), None);
    }
}
