//! Pull request lifecycle: create with initial reviewers, merge, reassign a reviewer.
//!
//! Every operation runs inside one transaction so the read of the aggregate and its write
//! are serialized by storage against concurrent callers.

use crate::domain::{
    DomainError, PullRequest, PullRequestId, PullRequestStatus, UserId, assign_reviewers,
    reassign_reviewers,
};
use crate::ports::{PullRequestRepository, TeamRepository};
use crate::usecases::transaction::TransactionCoordinator;
use chrono::{DateTime, SubsecRound, Utc};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Current time at millisecond precision, the finest resolution storage keeps.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Injectable random source for reviewer selection.
pub struct RandomSource(Mutex<Box<dyn RngCore + Send>>);

impl RandomSource {
    pub fn new(rng: impl RngCore + Send + 'static) -> Self {
        Self(Mutex::new(Box::new(rng)))
    }

    /// Seeded from OS entropy. Use in production.
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Deterministic sequence for tests and reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    fn with<T>(&self, f: impl FnOnce(&mut dyn RngCore) -> T) -> T {
        let mut rng = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut **rng)
    }
}

pub struct PullRequestService {
    pull_requests: Arc<dyn PullRequestRepository>,
    teams: Arc<dyn TeamRepository>,
    coordinator: Arc<TransactionCoordinator>,
    rng: RandomSource,
}

impl PullRequestService {
    pub fn new(
        pull_requests: Arc<dyn PullRequestRepository>,
        teams: Arc<dyn TeamRepository>,
        coordinator: Arc<TransactionCoordinator>,
        rng: RandomSource,
    ) -> Self {
        Self {
            pull_requests,
            teams,
            coordinator,
            rng,
        }
    }

    /// Open a pull request and assign reviewers from the author's team.
    pub async fn create(
        &self,
        id: PullRequestId,
        name: String,
        author_id: UserId,
    ) -> Result<PullRequest, DomainError> {
        let created_at = now();
        let pr = self
            .coordinator
            .run(|scope| async move {
                let team = self.teams.get_by_user_id(&scope, &author_id).await?;
                let reviewers = self
                    .rng
                    .with(|rng| assign_reviewers(&author_id, &team, rng));
                let pr = PullRequest::open(id, name, author_id, reviewers, created_at);
                self.pull_requests.create(&scope, &pr).await?;
                Ok(pr)
            })
            .await?;

        info!(
            pr_id = %pr.id,
            author = %pr.author_id,
            reviewers = ?pr.assigned_reviewers,
            "pull request created"
        );
        Ok(pr)
    }

    /// Mark the pull request merged. Merging a merged pull request is a no-op.
    pub async fn merge(&self, id: PullRequestId) -> Result<PullRequest, DomainError> {
        self.coordinator
            .run(|scope| async move {
                let mut pr = self.pull_requests.get_by_id(&scope, &id).await?;
                if pr.is_merged() {
                    debug!(pr_id = %pr.id, "already merged; nothing to do");
                    return Ok(pr);
                }

                pr.status = PullRequestStatus::Merged;
                pr.merged_at = Some(now());
                self.pull_requests.update(&scope, &pr).await?;
                info!(pr_id = %pr.id, "pull request merged");
                Ok(pr)
            })
            .await
    }

    /// Replace `old_reviewer_id` with an eligible member of that reviewer's team.
    ///
    /// Returns the updated pull request and the id of the new reviewer.
    pub async fn reassign(
        &self,
        id: PullRequestId,
        old_reviewer_id: UserId,
    ) -> Result<(PullRequest, UserId), DomainError> {
        self.coordinator
            .run(|scope| async move {
                let mut pr = self.pull_requests.get_by_id(&scope, &id).await?;
                if pr.is_merged() {
                    return Err(DomainError::ReassignMergedPullRequest(pr.id));
                }
                if !pr.has_reviewer(&old_reviewer_id) {
                    return Err(DomainError::ReviewerIsNotAssigned {
                        pull_request: pr.id,
                        reviewer: old_reviewer_id,
                    });
                }

                let team = self.teams.get_by_user_id(&scope, &old_reviewer_id).await?;
                let outcome = self.rng.with(|rng| {
                    reassign_reviewers(
                        &pr.author_id,
                        &old_reviewer_id,
                        &pr.assigned_reviewers,
                        &team,
                        rng,
                    )
                })?;

                pr.assigned_reviewers = outcome.reviewers;
                self.pull_requests.update(&scope, &pr).await?;
                info!(
                    pr_id = %pr.id,
                    old = %old_reviewer_id,
                    new = %outcome.replaced_by,
                    "reviewer reassigned"
                );
                Ok((pr, outcome.replaced_by))
            })
            .await
    }
}
