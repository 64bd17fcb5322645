//! Team lifecycle: create a team with its members, read it back, team statistics.

use crate::domain::{DomainError, Team, TeamName, TeamStats, User};
use crate::ports::{Scope, TeamRepository, UserRepository};
use crate::usecases::transaction::TransactionCoordinator;
use std::sync::Arc;
use tracing::info;

pub struct TeamService {
    teams: Arc<dyn TeamRepository>,
    users: Arc<dyn UserRepository>,
    coordinator: Arc<TransactionCoordinator>,
}

impl TeamService {
    pub fn new(
        teams: Arc<dyn TeamRepository>,
        users: Arc<dyn UserRepository>,
        coordinator: Arc<TransactionCoordinator>,
    ) -> Self {
        Self {
            teams,
            users,
            coordinator,
        }
    }

    /// Create the team and upsert every member as a user bound to it, atomically.
    ///
    /// Existing users named in `team` are moved into it with the supplied username and
    /// active flag.
    pub async fn create(&self, team: Team) -> Result<Team, DomainError> {
        let team = self
            .coordinator
            .run(|scope| async move {
                self.teams.create(&scope, &team.name).await?;
                let users: Vec<User> = team.members.iter().map(|m| m.to_user(&team.name)).collect();
                self.users.upsert_batch(&scope, &users).await?;
                Ok(team)
            })
            .await?;

        info!(team = %team.name, members = team.members.len(), "team created");
        Ok(team)
    }

    /// Team with its current membership.
    pub async fn get(&self, name: &TeamName) -> Result<Team, DomainError> {
        self.teams.get_by_name(&Scope::Detached, name).await
    }

    pub async fn get_stats(&self, name: &TeamName) -> Result<TeamStats, DomainError> {
        self.teams.get_stats(&Scope::Detached, name).await
    }
}
