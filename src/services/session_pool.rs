use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::GatewayError;
use crate::services::session::SessionHandle;

/// Thread-safe mapping of session key to live session handle.
///
/// `add` makes the session observable to `get` before it returns, and
/// `delete` makes the key unobservable before it returns. `list` takes a
/// snapshot under the read lock; it may miss sessions added during
/// iteration but never yields stale handles.
#[derive(Default)]
pub struct SessionPool {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionPool {
    pub fn new() -> Self {
        SessionPool::default()
    }

    pub fn add(&self, session: Arc<SessionHandle>) {
        let mut sessions = self.sessions.write().expect("session pool lock poisoned");
        sessions.insert(session.key().to_string(), session);
    }

    pub fn get(&self, key: &str) -> Result<Arc<SessionHandle>, GatewayError> {
        let sessions = self.sessions.read().expect("session pool lock poisoned");
        sessions
            .get(key)
            .cloned()
            .ok_or_else(|| GatewayError::SessionNotFound(key.to_string()))
    }

    /// Deleting an unknown key is a silent no-op; repeated deletes are safe.
    pub fn delete(&self, key: &str) {
        let mut sessions = self.sessions.write().expect("session pool lock poisoned");
        sessions.remove(key);
    }

    pub fn list(&self) -> Vec<Arc<SessionHandle>> {
        let sessions = self.sessions.read().expect("session pool lock poisoned");
        sessions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let sessions = self.sessions.read().expect("session pool lock poisoned");
        sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(key: &str) -> Arc<SessionHandle> {
        let (handle, _rx) = SessionHandle::new(key.to_string(), 1);
        handle
    }

    #[test]
    fn test_add_get_roundtrip() {
        let pool = SessionPool::new();
        let s = handle("hogehoge");
        pool.add(s.clone());

        let got = pool.get("hogehoge").unwrap();
        assert_eq!(got.key(), "hogehoge");
        assert!(Arc::ptr_eq(&got, &s));
    }

    #[test]
    fn test_get_unknown_key() {
        let pool = SessionPool::new();
        match pool.get("nobody") {
            Err(GatewayError::SessionNotFound(key)) => assert_eq!(key, "nobody"),
            other => panic!("unexpected result: {:?}", other.map(|s| s.key().to_string())),
        }
    }

    #[test]
    fn test_delete_then_get() {
        let pool = SessionPool::new();
        pool.add(handle("hogehoge"));
        pool.delete("hogehoge");
        assert!(pool.get("hogehoge").is_err());

        // repeated delete of the same key is safe
        pool.delete("hogehoge");
        pool.delete("hogehoge");
        assert!(pool.is_empty());
    }

    #[test]
    fn test_list_snapshot() {
        let pool = SessionPool::new();
        pool.add(handle("hogehoge"));
        pool.add(handle("fugafuga"));

        let mut keys: Vec<_> = pool
            .list()
            .iter()
            .map(|s| s.key().to_string())
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["fugafuga", "hogehoge"]);
    }

    #[test]
    fn test_concurrent_add_delete() {
        let pool = Arc::new(SessionPool::new());
        let mut joins = Vec::new();
        for i in 0..8 {
            let pool = pool.clone();
            joins.push(std::thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("s-{}-{}", i, j);
                    pool.add(handle(&key));
                    assert!(pool.get(&key).is_ok());
                    pool.delete(&key);
                }
            }));
        }
        for j in joins {
            j.join().unwrap();
        }
        assert!(pool.is_empty());
    }
}
