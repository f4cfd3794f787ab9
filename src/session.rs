//! Session store with lazy idle expiry.
//!
//! Sessions live in a locked map keyed by opaque uuid ids. A session is
//! logically absent once its idle time exceeds the configured timeout, even
//! while still physically stored; the access that observes an expired
//! session deletes it (lazy reclamation), after which it is irrecoverable.
//!
//! Every successful resolution refreshes `last_accessed`, so any read or
//! write extends the idle timer. `add_message` resolves through the same
//! path, which means appends refresh the timer too — that is the chosen
//! policy, not an accident.
//!
//! A single mutex guards the map, so a query resolving a session and an
//! expiry sweep racing on the same id are mutually exclusive: a just-deleted
//! session can never be read as valid. No sweep is scheduled automatically;
//! `cleanup_expired` is invoked on demand and correctness only depends on
//! resolution honoring the timeout at read time.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{ChatMessage, Role, Session, SessionStats};

pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn with_timeout_minutes(minutes: i64) -> Self {
        Self::new(Duration::minutes(minutes))
    }

    /// Create an empty session and return its collision-free id.
    pub fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.sessions.lock().unwrap().insert(
            id.clone(),
            Session {
                id: id.clone(),
                messages: Vec::new(),
                created_at: now,
                last_accessed: now,
            },
        );
        id
    }

    /// Resolve a session under the map lock: expired entries are deleted on
    /// sight, live entries get their idle timer refreshed.
    fn resolve<'a>(
        sessions: &'a mut HashMap<String, Session>,
        id: &str,
        timeout: Duration,
    ) -> Option<&'a mut Session> {
        let expired = match sessions.get(id) {
            Some(session) => Utc::now() - session.last_accessed > timeout,
            None => return None,
        };
        if expired {
            sessions.remove(id);
            return None;
        }
        let session = sessions.get_mut(id)?;
        session.last_accessed = Utc::now();
        Some(session)
    }

    /// Whether `id` names a live session. Refreshes the idle timer on hit;
    /// deletes the session if it is found expired.
    pub fn is_live(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap();
        Self::resolve(&mut sessions, id, self.timeout).is_some()
    }

    /// Snapshot a live session's state.
    pub fn get(&self, id: &str) -> Result<Session> {
        let mut sessions = self.sessions.lock().unwrap();
        Self::resolve(&mut sessions, id, self.timeout)
            .map(|s| s.clone())
            .ok_or_else(|| Error::NotFound(format!("session {id}")))
    }

    /// Append one timestamped turn. Resolves (and therefore refreshes) the
    /// session; unknown or expired ids are a [`Error::NotFound`].
    pub fn add_message(&self, id: &str, role: Role, content: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = Self::resolve(&mut sessions, id, self.timeout)
            .ok_or_else(|| Error::NotFound(format!("session {id}")))?;
        session.messages.push(ChatMessage {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// The most recent `max_messages` turns formatted oldest-first as plain
    /// text, or an empty string for unknown, expired, or empty sessions.
    pub fn conversation_context(&self, id: &str, max_messages: usize) -> String {
        let mut sessions = self.sessions.lock().unwrap();
        let session = match Self::resolve(&mut sessions, id, self.timeout) {
            Some(s) => s,
            None => return String::new(),
        };
        if session.messages.is_empty() {
            return String::new();
        }

        let start = session.messages.len().saturating_sub(max_messages);
        let mut context = String::from("Previous conversation:\n");
        for message in &session.messages[start..] {
            context.push_str(&format!("{}: {}\n", message.role, message.content));
        }
        context
    }

    /// Delete a session outright. Returns whether it existed.
    pub fn reset(&self, id: &str) -> bool {
        self.sessions.lock().unwrap().remove(id).is_some()
    }

    /// Sweep all sessions past their idle timeout; returns the count removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().unwrap();
        let now = Utc::now();
        let before = sessions.len();
        sessions.retain(|_, session| now - session.last_accessed <= self.timeout);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            total_sessions: self.len(),
            timeout_minutes: self.timeout.num_minutes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_lived() -> SessionStore {
        SessionStore::new(Duration::milliseconds(40))
    }

    #[test]
    fn test_create_then_get() {
        let store = SessionStore::with_timeout_minutes(30);
        let id = store.create();
        let session = store.get(&id).unwrap();
        assert_eq!(session.id, id);
        assert!(session.messages.is_empty());
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let store = SessionStore::with_timeout_minutes(30);
        assert!(matches!(store.get("nope"), Err(Error::NotFound(_))));
        assert_eq!(store.conversation_context("nope", 10), "");
    }

    #[test]
    fn test_messages_keep_insertion_order() {
        let store = SessionStore::with_timeout_minutes(30);
        let id = store.create();
        store.add_message(&id, Role::User, "first").unwrap();
        store.add_message(&id, Role::Assistant, "second").unwrap();
        store.add_message(&id, Role::User, "third").unwrap();

        let session = store.get(&id).unwrap();
        let contents: Vec<&str> = session.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_context_window_oldest_first() {
        let store = SessionStore::with_timeout_minutes(30);
        let id = store.create();
        for i in 0..5 {
            store.add_message(&id, Role::User, &format!("q{i}")).unwrap();
        }

        let context = store.conversation_context(&id, 2);
        assert_eq!(context, "Previous conversation:\nuser: q3\nuser: q4\n");
    }

    #[test]
    fn test_empty_session_has_empty_context() {
        let store = SessionStore::with_timeout_minutes(30);
        let id = store.create();
        assert_eq!(store.conversation_context(&id, 10), "");
    }

    #[test]
    fn test_expired_session_deleted_on_access() {
        let store = short_lived();
        let id = store.create();
        std::thread::sleep(std::time::Duration::from_millis(80));

        assert!(matches!(store.get(&id), Err(Error::NotFound(_))));
        // Lazy reclamation: the failed access removed it physically too.
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_access_extends_idle_timer() {
        let store = short_lived();
        let id = store.create();
        for _ in 0..4 {
            std::thread::sleep(std::time::Duration::from_millis(20));
            assert!(store.is_live(&id), "touch within timeout must refresh");
        }
    }

    #[test]
    fn test_cleanup_removes_exactly_the_expired() {
        let store = short_lived();
        let stale = store.create();
        std::thread::sleep(std::time::Duration::from_millis(80));
        let fresh = store.create();

        assert_eq!(store.len(), 2);
        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.is_live(&fresh));
        assert!(!store.is_live(&stale));
    }

    #[test]
    fn test_reset_is_idempotent() {
        let store = SessionStore::with_timeout_minutes(30);
        let id = store.create();
        assert!(store.reset(&id));
        assert!(!store.reset(&id));
    }

    #[test]
    fn test_stats_reports_count_and_timeout() {
        let store = SessionStore::with_timeout_minutes(45);
        store.create();
        store.create();
        let stats = store.stats();
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.timeout_minutes, 45);
    }
}
