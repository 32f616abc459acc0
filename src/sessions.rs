//! Signed-in sessions and their cached role sets.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    query::{QuerySlot, QueryState, RequestToken},
    roles::RoleSet,
};

#[derive(Debug, Clone)]
struct SessionEntry {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    roles: QuerySlot<RoleSet>,
}

/// Role state of a session as seen at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub user_id: Uuid,
    pub roles: QueryState<RoleSet>,
    /// Last successfully loaded roles, even if a later load failed.
    pub known_roles: Option<RoleSet>,
}

/// Sessions opened by sign-in, keyed by the session id carried in the
/// bearer token. A token whose session is not registered here is rejected.
/// Entries past their expiry are removed by [`SessionRegistry::sweep_expired`].
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, session_id: Uuid, user_id: Uuid, expires_at: DateTime<Utc>) {
        let mut sessions = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(
            session_id,
            SessionEntry {
                user_id,
                expires_at,
                roles: QuerySlot::new(),
            },
        );
    }

    pub fn close(&self, session_id: Uuid) -> bool {
        let mut sessions = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(&session_id).is_some()
    }

    #[must_use]
    pub fn contains(&self, session_id: Uuid, user_id: Uuid) -> bool {
        let sessions = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(&session_id)
            .is_some_and(|entry| entry.user_id == user_id)
    }

    #[must_use]
    pub fn snapshot(&self, session_id: Uuid) -> Option<SessionSnapshot> {
        let sessions = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(&session_id).map(|entry| SessionSnapshot {
            user_id: entry.user_id,
            roles: entry.roles.state().clone(),
            known_roles: entry.roles.data().cloned(),
        })
    }

    /// Starts a role load for the session, superseding any in flight.
    /// `None` when the session has been closed.
    pub fn begin_role_load(&self, session_id: Uuid) -> Option<RequestToken> {
        let mut sessions = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get_mut(&session_id)
            .map(|entry| entry.roles.begin())
    }

    /// Publishes a finished role load. Returns `false` when the load was
    /// superseded or the session is gone.
    pub fn complete_role_load(
        &self,
        session_id: Uuid,
        token: RequestToken,
        result: Result<RoleSet, String>,
    ) -> bool {
        let mut sessions = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get_mut(&session_id)
            .is_some_and(|entry| entry.roles.complete(token, result))
    }

    /// Drops a failed role load so the next request retries it.
    pub fn reset_roles(&self, session_id: Uuid) -> bool {
        let mut sessions = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match sessions.get_mut(&session_id) {
            Some(entry) => {
                entry.roles.reset();
                true
            }
            None => false,
        }
    }

    /// Removes sessions that expired at or before `now`, returning their ids.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let mut sessions = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<Uuid> = sessions
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        expired
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forces every session of `user_id` to reload its roles on next use.
    pub fn invalidate_user(&self, user_id: Uuid) -> usize {
        let mut sessions = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut count = 0;
        for entry in sessions.values_mut().filter(|e| e.user_id == user_id) {
            entry.roles.reset();
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::roles::Role;

    fn admin() -> RoleSet {
        [Role::Admin].into_iter().collect()
    }

    fn in_hours(hours: i64) -> DateTime<Utc> {
        Utc::now() + TimeDelta::hours(hours)
    }

    #[test]
    fn open_session_starts_idle() {
        let registry = SessionRegistry::new();
        let (sid, uid) = (Uuid::new_v4(), Uuid::new_v4());
        registry.open(sid, uid, in_hours(1));

        assert!(registry.contains(sid, uid));
        assert!(!registry.contains(sid, Uuid::new_v4()));
        let snap = registry.snapshot(sid).expect("session");
        assert_eq!(snap.roles, QueryState::Idle);
        assert_eq!(snap.known_roles, None);
    }

    #[test]
    fn role_load_round_trip() {
        let registry = SessionRegistry::new();
        let (sid, uid) = (Uuid::new_v4(), Uuid::new_v4());
        registry.open(sid, uid, in_hours(1));

        let token = registry.begin_role_load(sid).expect("open session");
        assert!(registry.snapshot(sid).expect("session").roles.is_loading());

        assert!(registry.complete_role_load(sid, token, Ok(admin())));
        assert_eq!(
            registry.snapshot(sid).expect("session").roles,
            QueryState::Success(admin())
        );
    }

    #[test]
    fn closed_session_ignores_late_load() {
        let registry = SessionRegistry::new();
        let (sid, uid) = (Uuid::new_v4(), Uuid::new_v4());
        registry.open(sid, uid, in_hours(1));
        let token = registry.begin_role_load(sid).expect("open session");

        assert!(registry.close(sid));
        assert!(!registry.complete_role_load(sid, token, Ok(admin())));
        assert!(registry.begin_role_load(sid).is_none());
        assert!(registry.snapshot(sid).is_none());
    }

    #[test]
    fn invalidate_resets_all_sessions_of_user() {
        let registry = SessionRegistry::new();
        let uid = Uuid::new_v4();
        let (a, b, other) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        registry.open(a, uid, in_hours(1));
        registry.open(b, uid, in_hours(1));
        registry.open(other, Uuid::new_v4(), in_hours(1));
        for sid in [a, b, other] {
            let token = registry.begin_role_load(sid).expect("open session");
            registry.complete_role_load(sid, token, Ok(admin()));
        }

        assert_eq!(registry.invalidate_user(uid), 2);
        assert_eq!(registry.snapshot(a).expect("a").roles, QueryState::Idle);
        assert_eq!(registry.snapshot(b).expect("b").roles, QueryState::Idle);
        assert_eq!(
            registry.snapshot(other).expect("other").roles,
            QueryState::Success(admin())
        );
    }

    #[test]
    fn sweep_removes_only_expired_sessions() {
        let registry = SessionRegistry::new();
        let (stale, live) = (Uuid::new_v4(), Uuid::new_v4());
        registry.open(stale, Uuid::new_v4(), in_hours(-1));
        registry.open(live, Uuid::new_v4(), in_hours(1));

        assert_eq!(registry.sweep_expired(Utc::now()), vec![stale]);
        assert_eq!(registry.len(), 1);
        assert!(registry.snapshot(live).is_some());
        assert!(registry.sweep_expired(Utc::now()).is_empty());
    }

    #[test]
    fn reset_after_failed_load_returns_to_idle() {
        let registry = SessionRegistry::new();
        let (sid, uid) = (Uuid::new_v4(), Uuid::new_v4());
        registry.open(sid, uid, in_hours(1));
        let token = registry.begin_role_load(sid).expect("open session");
        registry.complete_role_load(sid, token, Err("db down".into()));

        assert!(registry.reset_roles(sid));
        assert_eq!(registry.snapshot(sid).expect("session").roles, QueryState::Idle);
        assert!(!registry.reset_roles(Uuid::new_v4()));
    }
}
