//! Outbound ports. Application calls into storage.
//!
//! Implemented by persistence adapters. Every repository method takes an explicit [`Scope`]
//! so whether a call participates in a transaction is visible at the call site.

use crate::domain::{
    DomainError, PullRequest, PullRequestId, Team, TeamName, TeamStats, User, UserId,
};
use std::any::Any;
use std::sync::Arc;

/// A live storage transaction, owned by exactly one unit of work.
///
/// Dropping a transaction that was never committed discards its writes.
#[async_trait::async_trait]
pub trait Transaction: Send + Sync {
    /// Lets the owning adapter recover its concrete handle.
    fn as_any(&self) -> &dyn Any;

    async fn commit(&self) -> Result<(), DomainError>;

    async fn rollback(&self) -> Result<(), DomainError>;
}

/// Where a repository call executes.
#[derive(Clone)]
pub enum Scope {
    /// Auto-commit against the base connection source.
    Detached,
    /// Inside the given transaction.
    Tx(Arc<dyn Transaction>),
}

/// Opens storage transactions.
#[async_trait::async_trait]
pub trait TxManager: Send + Sync {
    async fn begin(&self) -> Result<Arc<dyn Transaction>, DomainError>;
}

#[async_trait::async_trait]
pub trait TeamRepository: Send + Sync {
    /// Insert a team name. Fails with `TeamAlreadyExists` on duplicates.
    async fn create(&self, scope: &Scope, name: &TeamName) -> Result<(), DomainError>;

    /// Team with its live membership. Fails with `TeamNotFound`.
    async fn get_by_name(&self, scope: &Scope, name: &TeamName) -> Result<Team, DomainError>;

    /// Team of the given user. Fails with `UserNotFound` or `TeamNotFound`.
    async fn get_by_user_id(&self, scope: &Scope, user_id: &UserId) -> Result<Team, DomainError>;

    /// Aggregate counters for the team and pull requests authored by its members.
    async fn get_stats(&self, scope: &Scope, name: &TeamName) -> Result<TeamStats, DomainError>;
}

#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert-or-overwrite username, team and active flag for each user.
    async fn upsert_batch(&self, scope: &Scope, users: &[User]) -> Result<(), DomainError>;

    async fn get_by_id(&self, scope: &Scope, id: &UserId) -> Result<User, DomainError>;

    /// Fails with `UserNotFound` when no row matches.
    async fn update(&self, scope: &Scope, user: &User) -> Result<(), DomainError>;
}

#[async_trait::async_trait]
pub trait PullRequestRepository: Send + Sync {
    /// Insert a pull request and its reviewers. Fails with `PullRequestExists` on duplicates.
    async fn create(&self, scope: &Scope, pr: &PullRequest) -> Result<(), DomainError>;

    async fn get_by_id(
        &self,
        scope: &Scope,
        id: &PullRequestId,
    ) -> Result<PullRequest, DomainError>;

    /// Pull requests where `reviewer_id` is currently assigned.
    async fn list_by_reviewer(
        &self,
        scope: &Scope,
        reviewer_id: &UserId,
    ) -> Result<Vec<PullRequest>, DomainError>;

    /// Overwrite status, timestamps and the full reviewer list.
    async fn update(&self, scope: &Scope, pr: &PullRequest) -> Result<(), DomainError>;
}
