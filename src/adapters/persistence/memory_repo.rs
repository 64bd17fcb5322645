//! In-process store. Implements the repository ports and `TxManager` without a database.
//!
//! A transaction holds the store's lock for its whole lifetime and works on a private copy of
//! the state; commit publishes the copy, rollback or drop discards it. Transactions are
//! therefore fully serialized. Detached calls take the lock only for the single operation.

use crate::domain::{
    DomainError, PullRequest, PullRequestId, PullRequestStatus, Team, TeamMember, TeamName,
    TeamStats, User, UserId,
};
use crate::ports::{
    PullRequestRepository, Scope, TeamRepository, Transaction, TxManager, UserRepository,
};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    teams: BTreeSet<TeamName>,
    users: BTreeMap<UserId, User>,
    pull_requests: BTreeMap<PullRequestId, PullRequest>,
}

impl MemoryState {
    fn team(&self, name: &TeamName) -> Result<Team, DomainError> {
        if !self.teams.contains(name) {
            return Err(DomainError::TeamNotFound(name.clone()));
        }
        let members = self
            .users
            .values()
            .filter(|u| &u.team_name == name)
            .map(|u| TeamMember {
                id: u.id.clone(),
                username: u.username.clone(),
                is_active: u.is_active,
            })
            .collect();
        Ok(Team {
            name: name.clone(),
            members,
        })
    }
}

struct Pending {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

struct MemoryTx {
    owner: Arc<Mutex<MemoryState>>,
    pending: Mutex<Option<Pending>>,
}

impl MemoryTx {
    async fn take(&self) -> Result<Pending, DomainError> {
        self.pending
            .lock()
            .await
            .take()
            .ok_or_else(|| DomainError::Storage("transaction already finished".into()))
    }
}

#[async_trait::async_trait]
impl Transaction for MemoryTx {
    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn commit(&self) -> Result<(), DomainError> {
        let Pending { mut guard, working } = self.take().await?;
        *guard = working;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DomainError> {
        self.take().await.map(drop)
    }
}

/// In-memory store shared by all repositories.
#[derive(Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against committed state (detached) or the transaction's working copy.
    /// `f` must check before it writes so a failed call leaves no partial change.
    async fn with_state<T>(
        &self,
        scope: &Scope,
        f: impl FnOnce(&mut MemoryState) -> Result<T, DomainError>,
    ) -> Result<T, DomainError> {
        match scope {
            Scope::Detached => {
                let mut state = self.state.lock().await;
                f(&mut state)
            }
            Scope::Tx(tx) => {
                let tx = tx
                    .as_any()
                    .downcast_ref::<MemoryTx>()
                    .filter(|tx| Arc::ptr_eq(&tx.owner, &self.state))
                    .ok_or_else(|| {
                        DomainError::Storage("transaction belongs to another store".into())
                    })?;
                let mut pending = tx.pending.lock().await;
                let pending = pending
                    .as_mut()
                    .ok_or_else(|| DomainError::Storage("transaction already finished".into()))?;
                f(&mut pending.working)
            }
        }
    }
}

#[async_trait::async_trait]
impl TxManager for MemoryStore {
    async fn begin(&self) -> Result<Arc<dyn Transaction>, DomainError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = MemoryState::clone(&guard);
        Ok(Arc::new(MemoryTx {
            owner: Arc::clone(&self.state),
            pending: Mutex::new(Some(Pending { guard, working })),
        }))
    }
}

#[async_trait::async_trait]
impl TeamRepository for MemoryStore {
    async fn create(&self, scope: &Scope, name: &TeamName) -> Result<(), DomainError> {
        self.with_state(scope, |state| {
            if !state.teams.insert(name.clone()) {
                return Err(DomainError::TeamAlreadyExists(name.clone()));
            }
            Ok(())
        })
        .await
    }

    async fn get_by_name(&self, scope: &Scope, name: &TeamName) -> Result<Team, DomainError> {
        self.with_state(scope, |state| state.team(name)).await
    }

    async fn get_by_user_id(&self, scope: &Scope, user_id: &UserId) -> Result<Team, DomainError> {
        self.with_state(scope, |state| {
            let user = state
                .users
                .get(user_id)
                .ok_or_else(|| DomainError::UserNotFound(user_id.clone()))?;
            state.team(&user.team_name)
        })
        .await
    }

    async fn get_stats(&self, scope: &Scope, name: &TeamName) -> Result<TeamStats, DomainError> {
        self.with_state(scope, |state| {
            let team = state.team(name)?;
            let authors: BTreeSet<&UserId> = team.members.iter().map(|m| &m.id).collect();
            let authored: Vec<&PullRequest> = state
                .pull_requests
                .values()
                .filter(|pr| authors.contains(&pr.author_id))
                .collect();

            let merge_millis: Vec<i64> = authored
                .iter()
                .filter(|pr| pr.status == PullRequestStatus::Merged)
                .filter_map(|pr| pr.merged_at.map(|m| (m - pr.created_at).num_milliseconds()))
                .collect();
            let avg_time_to_merge_secs = if merge_millis.is_empty() {
                0
            } else {
                let total: f64 = merge_millis.iter().map(|ms| *ms as f64 / 1000.0).sum();
                (total / merge_millis.len() as f64) as i64
            };

            let open = authored
                .iter()
                .filter(|pr| pr.status == PullRequestStatus::Open)
                .count();
            Ok(TeamStats {
                team_name: name.clone(),
                members_count: team.members.len() as u64,
                active_members_count: team.members.iter().filter(|m| m.is_active).count() as u64,
                total_pull_requests: authored.len() as u64,
                open_pull_requests: open as u64,
                merged_pull_requests: (authored.len() - open) as u64,
                avg_time_to_merge_secs,
            })
        })
        .await
    }
}

#[async_trait::async_trait]
impl UserRepository for MemoryStore {
    async fn upsert_batch(&self, scope: &Scope, users: &[User]) -> Result<(), DomainError> {
        self.with_state(scope, |state| {
            for user in users {
                state.users.insert(user.id.clone(), user.clone());
            }
            Ok(())
        })
        .await
    }

    async fn get_by_id(&self, scope: &Scope, id: &UserId) -> Result<User, DomainError> {
        self.with_state(scope, |state| {
            state
                .users
                .get(id)
                .cloned()
                .ok_or_else(|| DomainError::UserNotFound(id.clone()))
        })
        .await
    }

    async fn update(&self, scope: &Scope, user: &User) -> Result<(), DomainError> {
        self.with_state(scope, |state| match state.users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(DomainError::UserNotFound(user.id.clone())),
        })
        .await
    }
}

#[async_trait::async_trait]
impl PullRequestRepository for MemoryStore {
    async fn create(&self, scope: &Scope, pr: &PullRequest) -> Result<(), DomainError> {
        self.with_state(scope, |state| {
            if state.pull_requests.contains_key(&pr.id) {
                return Err(DomainError::PullRequestExists(pr.id.clone()));
            }
            state.pull_requests.insert(pr.id.clone(), pr.clone());
            Ok(())
        })
        .await
    }

    async fn get_by_id(
        &self,
        scope: &Scope,
        id: &PullRequestId,
    ) -> Result<PullRequest, DomainError> {
        self.with_state(scope, |state| {
            state
                .pull_requests
                .get(id)
                .cloned()
                .ok_or_else(|| DomainError::PullRequestNotFound(id.clone()))
        })
        .await
    }

    async fn list_by_reviewer(
        &self,
        scope: &Scope,
        reviewer_id: &UserId,
    ) -> Result<Vec<PullRequest>, DomainError> {
        self.with_state(scope, |state| {
            let mut prs: Vec<PullRequest> = state
                .pull_requests
                .values()
                .filter(|pr| pr.has_reviewer(reviewer_id))
                .cloned()
                .collect();
            prs.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
            Ok(prs)
        })
        .await
    }

    async fn update(&self, scope: &Scope, pr: &PullRequest) -> Result<(), DomainError> {
        self.with_state(scope, |state| match state.pull_requests.get_mut(&pr.id) {
            Some(existing) => {
                *existing = pr.clone();
                Ok(())
            }
            None => Err(DomainError::PullRequestNotFound(pr.id.clone())),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn user(id: &str, team: &str, active: bool) -> User {
        User {
            id: id.into(),
            username: id.to_string(),
            team_name: team.into(),
            is_active: active,
        }
    }

    #[tokio::test]
    async fn rolled_back_writes_are_invisible() {
        let store = MemoryStore::new();
        let tx = store.begin().await.unwrap();
        let scope = Scope::Tx(Arc::clone(&tx));
        TeamRepository::create(&store, &scope, &"backend".into())
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let err = TeamRepository::get_by_name(&store, &Scope::Detached, &"backend".into())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::TeamNotFound(_)));
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes_and_releases_lock() {
        let store = MemoryStore::new();
        {
            let tx = store.begin().await.unwrap();
            TeamRepository::create(&store, &Scope::Tx(tx), &"backend".into())
                .await
                .unwrap();
        }
        let err = TeamRepository::get_by_name(&store, &Scope::Detached, &"backend".into())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::TeamNotFound(_)));
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = MemoryStore::new();
        let tx = store.begin().await.unwrap();
        let scope = Scope::Tx(Arc::clone(&tx));
        TeamRepository::create(&store, &scope, &"backend".into())
            .await
            .unwrap();
        store
            .upsert_batch(&scope, &[user("u1", "backend", true)])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let team = TeamRepository::get_by_name(&store, &Scope::Detached, &"backend".into())
            .await
            .unwrap();
        assert_eq!(team.members.len(), 1);
        assert!(tx.commit().await.is_err());
    }

    #[tokio::test]
    async fn foreign_transaction_is_rejected() {
        let store = MemoryStore::new();
        let other = MemoryStore::new();
        let tx = other.begin().await.unwrap();
        let err = TeamRepository::create(&store, &Scope::Tx(tx), &"backend".into())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Storage(_)));
    }

    #[tokio::test]
    async fn stats_count_pull_requests_by_team_authors() {
        let store = MemoryStore::new();
        let scope = Scope::Detached;
        TeamRepository::create(&store, &scope, &"backend".into())
            .await
            .unwrap();
        store
            .upsert_batch(
                &scope,
                &[
                    user("a", "backend", true),
                    user("b", "backend", false),
                    user("x", "frontend", true),
                ],
            )
            .await
            .unwrap();

        let created = Utc::now();
        let mut merged = PullRequest::open("pr-1".into(), "m", "a".into(), vec![], created);
        merged.status = PullRequestStatus::Merged;
        merged.merged_at = Some(created + Duration::seconds(90));
        let open = PullRequest::open("pr-2".into(), "o", "b".into(), vec![], created);
        let foreign = PullRequest::open("pr-3".into(), "f", "x".into(), vec![], created);
        for pr in [&merged, &open, &foreign] {
            PullRequestRepository::create(&store, &scope, pr)
                .await
                .unwrap();
        }

        let stats = store.get_stats(&scope, &"backend".into()).await.unwrap();
        assert_eq!(stats.members_count, 2);
        assert_eq!(stats.active_members_count, 1);
        assert_eq!(stats.total_pull_requests, 2);
        assert_eq!(stats.open_pull_requests, 1);
        assert_eq!(stats.merged_pull_requests, 1);
        assert_eq!(stats.avg_time_to_merge_secs, 90);
    }
}
