//! User lifecycle: toggle activity, list the pull requests a user reviews.
//!
//! Deactivating a user does not remove them from pull requests they already review.

use crate::domain::{DomainError, PullRequest, User, UserId};
use crate::ports::{PullRequestRepository, Scope, UserRepository};
use std::sync::Arc;
use tracing::info;

pub struct UserService {
    users: Arc<dyn UserRepository>,
    pull_requests: Arc<dyn PullRequestRepository>,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        pull_requests: Arc<dyn PullRequestRepository>,
    ) -> Self {
        Self {
            users,
            pull_requests,
        }
    }

    pub async fn set_is_active(&self, id: &UserId, is_active: bool) -> Result<User, DomainError> {
        let mut user = self.users.get_by_id(&Scope::Detached, id).await?;
        user.is_active = is_active;
        self.users.update(&Scope::Detached, &user).await?;
        info!(user = %user.id, is_active, "user activity updated");
        Ok(user)
    }

    /// Pull requests where `id` is currently an assigned reviewer.
    pub async fn get_reviews(&self, id: &UserId) -> Result<Vec<PullRequest>, DomainError> {
        self.pull_requests
            .list_by_reviewer(&Scope::Detached, id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::memory_repo::MemoryStore;
    use crate::domain::{Team, TeamMember};
    use crate::usecases::{PullRequestService, RandomSource, TeamService, TransactionCoordinator};

    struct Fixture {
        users: UserService,
        prs: PullRequestService,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let coordinator = Arc::new(TransactionCoordinator::new(store.clone()));
        let teams = TeamService::new(store.clone(), store.clone(), Arc::clone(&coordinator));
        teams
            .create(Team {
                name: "backend".into(),
                members: ["author", "r1", "r2"]
                    .into_iter()
                    .map(|id| TeamMember {
                        id: id.into(),
                        username: id.to_string(),
                        is_active: true,
                    })
                    .collect(),
            })
            .await
            .unwrap();
        Fixture {
            users: UserService::new(store.clone(), store.clone()),
            prs: PullRequestService::new(
                store.clone(),
                store.clone(),
                coordinator,
                RandomSource::seeded(21),
            ),
        }
    }

    #[tokio::test]
    async fn set_is_active_persists_flag() {
        let f = fixture().await;
        let user = f.users.set_is_active(&"r1".into(), false).await.unwrap();
        assert!(!user.is_active);
        assert_eq!(user.team_name.as_str(), "backend");

        let again = f.users.set_is_active(&"r1".into(), true).await.unwrap();
        assert!(again.is_active);
    }

    #[tokio::test]
    async fn set_is_active_unknown_user_fails() {
        let f = fixture().await;
        let err = f.users.set_is_active(&"ghost".into(), false).await.unwrap_err();
        assert!(matches!(err, DomainError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn reviews_list_follows_assignment() {
        let f = fixture().await;
        let pr = f
            .prs
            .create("pr-1".into(), "x".into(), "author".into())
            .await
            .unwrap();
        assert_eq!(pr.assigned_reviewers.len(), 2);

        for reviewer in &pr.assigned_reviewers {
            let reviews = f.users.get_reviews(reviewer).await.unwrap();
            assert_eq!(reviews.len(), 1);
            assert_eq!(reviews[0].id, pr.id);
        }
        assert!(f.users.get_reviews(&"author".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deactivated_reviewer_keeps_assignment() {
        let f = fixture().await;
        let pr = f
            .prs
            .create("pr-1".into(), "x".into(), "author".into())
            .await
            .unwrap();
        let reviewer = pr.assigned_reviewers[0].clone();

        f.users.set_is_active(&reviewer, false).await.unwrap();

        let reviews = f.users.get_reviews(&reviewer).await.unwrap();
        assert_eq!(reviews.len(), 1);
    }
}
