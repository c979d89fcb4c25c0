//! Session registry implementation
//!
//! The authoritative set of joined sessions and the names they hold.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::protocol::normalize_username;

use super::entry::{Member, SessionHandle, SessionId};
use super::error::JoinError;

#[derive(Default)]
struct Members {
    /// Joined sessions by handle
    by_id: HashMap<SessionId, Member>,
    /// Inverse index enforcing one session per normalized name
    by_name: HashMap<String, SessionId>,
}

/// Point-in-time view of the registry
#[derive(Debug)]
pub struct Roster {
    /// Sorted names of all joined sessions
    pub users: Vec<String>,
    /// Handles of the same sessions
    pub recipients: Vec<(SessionId, SessionHandle)>,
}

/// Registry of joined sessions
///
/// Both indices sit behind a single `RwLock`, so every join and leave is one
/// atomic step and readers never see a half-committed join. Mutations take
/// the write lock; snapshots and recipient lists take the read lock. The lock
/// is never held while sending to a session.
pub struct SessionRegistry {
    members: RwLock<Members>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            members: RwLock::new(Members::default()),
        }
    }

    /// Claim a display name for a session
    ///
    /// The proposed name is trimmed and lower-cased, then checked for syntax
    /// before the uniqueness lookup. On success the session is registered
    /// and the normalized name is returned.
    pub async fn try_join(
        &self,
        id: SessionId,
        proposed: &str,
        handle: SessionHandle,
    ) -> Result<String, JoinError> {
        let name = normalize_username(proposed)
            .ok_or_else(|| JoinError::InvalidUsername(proposed.to_string()))?;

        let mut members = self.members.write().await;

        if members.by_id.contains_key(&id) {
            return Err(JoinError::AlreadyJoined(id));
        }
        if members.by_name.contains_key(&name) {
            return Err(JoinError::UsernameTaken(name));
        }

        members.by_name.insert(name.clone(), id);
        members.by_id.insert(id, Member::new(name.clone(), handle));

        tracing::debug!(
            session_id = %id,
            username = %name,
            members = members.by_id.len(),
            "Session registered"
        );

        Ok(name)
    }

    /// Remove a session
    ///
    /// Idempotent. Returns the removed member, so when several paths race to
    /// remove the same session exactly one of them gets `Some`.
    pub async fn leave(&self, id: SessionId) -> Option<Member> {
        let mut members = self.members.write().await;

        let member = members.by_id.remove(&id)?;
        members.by_name.remove(&member.name);

        tracing::debug!(
            session_id = %id,
            username = %member.name,
            members = members.by_id.len(),
            "Session unregistered"
        );

        Some(member)
    }

    /// Names of all joined sessions, sorted
    pub async fn snapshot(&self) -> Vec<String> {
        let members = self.members.read().await;
        let mut names: Vec<String> = members.by_name.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Point-in-time list of session handles for fan-out
    pub async fn recipients(&self) -> Vec<(SessionId, SessionHandle)> {
        let members = self.members.read().await;
        members
            .by_id
            .iter()
            .map(|(id, member)| (*id, member.handle.clone()))
            .collect()
    }

    /// Sorted names and fan-out handles, read under one lock
    ///
    /// The presence worker renders each `userlist` from this at delivery
    /// time, so the list a session receives last always matches the
    /// registry after the last join or leave it was published for.
    pub async fn roster(&self) -> Roster {
        let members = self.members.read().await;
        let mut users: Vec<String> = members.by_name.keys().cloned().collect();
        users.sort_unstable();
        let recipients = members
            .by_id
            .iter()
            .map(|(id, member)| (*id, member.handle.clone()))
            .collect();
        Roster { users, recipients }
    }

    /// Check if a session is registered
    pub async fn contains(&self, id: SessionId) -> bool {
        self.members.read().await.by_id.contains_key(&id)
    }

    /// Number of joined sessions
    pub async fn len(&self) -> usize {
        self.members.read().await.by_id.len()
    }

    /// Check if no session is joined
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn handle() -> SessionHandle {
        let (tx, _rx) = mpsc::channel(8);
        SessionHandle::new(tx)
    }

    #[tokio::test]
    async fn test_join_and_snapshot() {
        let registry = SessionRegistry::new();

        let name = registry
            .try_join(SessionId::new(1), "Alice", handle())
            .await
            .unwrap();
        assert_eq!(name, "alice");

        registry
            .try_join(SessionId::new(2), "bob", handle())
            .await
            .unwrap();

        assert_eq!(registry.snapshot().await, vec!["alice", "bob"]);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_name_any_case_rejected() {
        let registry = SessionRegistry::new();
        registry
            .try_join(SessionId::new(1), "alice", handle())
            .await
            .unwrap();

        for attempt in ["alice", "ALICE", " Alice ", "aLiCe"] {
            let result = registry.try_join(SessionId::new(2), attempt, handle()).await;
            assert_eq!(result, Err(JoinError::UsernameTaken("alice".into())));
        }
        assert_eq!(registry.len().await, 1);
        assert!(!registry.contains(SessionId::new(2)).await);
    }

    #[tokio::test]
    async fn test_invalid_name_rejected_before_uniqueness() {
        let registry = SessionRegistry::new();
        registry
            .try_join(SessionId::new(1), "bob", handle())
            .await
            .unwrap();

        // Syntax is checked before the name lookup
        let result = registry.try_join(SessionId::new(2), "bo b", handle()).await;
        assert_eq!(result, Err(JoinError::InvalidUsername("bo b".into())));

        let long = "x".repeat(21);
        for bad in ["", "   ", long.as_str(), "bob!"] {
            let result = registry.try_join(SessionId::new(3), bad, handle()).await;
            assert!(matches!(result, Err(JoinError::InvalidUsername(_))));
        }
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_registry_size_tracks_distinct_joins() {
        let registry = SessionRegistry::new();
        let names = ["ann", "ben", "cat", "dan", "eve", "Ann", "BEN"];
        let mut accepted = 0;

        for (i, name) in names.iter().enumerate() {
            if registry
                .try_join(SessionId::new(i as u64), name, handle())
                .await
                .is_ok()
            {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 5);
        assert_eq!(registry.len().await, accepted);
    }

    #[tokio::test]
    async fn test_session_cannot_join_twice() {
        let registry = SessionRegistry::new();
        let id = SessionId::new(1);
        registry.try_join(id, "alice", handle()).await.unwrap();

        let result = registry.try_join(id, "alicia", handle()).await;
        assert_eq!(result, Err(JoinError::AlreadyJoined(id)));
        assert_eq!(registry.snapshot().await, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_leave_is_idempotent_and_frees_name() {
        let registry = SessionRegistry::new();
        let id = SessionId::new(1);
        registry.try_join(id, "alice", handle()).await.unwrap();

        let removed = registry.leave(id).await.unwrap();
        assert_eq!(removed.name, "alice");
        assert!(registry.leave(id).await.is_none());
        assert!(registry.is_empty().await);

        // Name is free again for a new session
        registry
            .try_join(SessionId::new(2), "Alice", handle())
            .await
            .unwrap();
        assert_eq!(registry.snapshot().await, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_recipients_lists_joined_sessions() {
        let registry = SessionRegistry::new();
        registry
            .try_join(SessionId::new(1), "alice", handle())
            .await
            .unwrap();
        registry
            .try_join(SessionId::new(2), "bob", handle())
            .await
            .unwrap();
        registry.leave(SessionId::new(1)).await;

        let ids: Vec<SessionId> = registry
            .recipients()
            .await
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![SessionId::new(2)]);
    }

    #[tokio::test]
    async fn test_roster_pairs_names_with_handles() {
        let registry = SessionRegistry::new();
        registry
            .try_join(SessionId::new(2), "zoe", handle())
            .await
            .unwrap();
        registry
            .try_join(SessionId::new(1), "Adam", handle())
            .await
            .unwrap();

        let roster = registry.roster().await;
        assert_eq!(roster.users, vec!["adam", "zoe"]);

        let mut ids: Vec<SessionId> = roster.recipients.iter().map(|(id, _)| *id).collect();
        ids.sort();
        assert_eq!(ids, vec![SessionId::new(1), SessionId::new(2)]);
    }

    #[tokio::test]
    async fn test_concurrent_joins_same_name_single_winner() {
        use std::sync::Arc;

        let registry = Arc::new(SessionRegistry::new());
        let mut handles = Vec::new();

        for i in 0..16u64 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry
                    .try_join(SessionId::new(i), "popular", handle())
                    .await
                    .is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(registry.snapshot().await, vec!["popular"]);
    }
}
