//! Implements InputPort. Inquire-based interactive menu over the lifecycle services.
//!
//! Results are printed as pretty JSON. Domain failures are printed with their code and the
//! loop continues; Esc inside an action abandons just that action.

use crate::domain::{DomainError, ErrorKind, Team, TeamMember};
use crate::ports::InputPort;
use crate::usecases::{PullRequestService, TeamService, UserService};
use async_trait::async_trait;
use inquire::{Confirm, InquireError, Select, Text};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
enum TuiError {
    #[error(transparent)]
    Prompt(#[from] InquireError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("invalid input: {0}")]
    Input(String),
    #[error("render failed: {0}")]
    Render(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy)]
enum Action {
    AddTeam,
    GetTeam,
    TeamStats,
    CreatePullRequest,
    MergePullRequest,
    ReassignReviewer,
    SetUserActive,
    UserReviews,
    Quit,
}

impl Action {
    const ALL: [Action; 9] = [
        Action::AddTeam,
        Action::GetTeam,
        Action::TeamStats,
        Action::CreatePullRequest,
        Action::MergePullRequest,
        Action::ReassignReviewer,
        Action::SetUserActive,
        Action::UserReviews,
        Action::Quit,
    ];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::AddTeam => "Add team",
            Action::GetTeam => "Show team",
            Action::TeamStats => "Team stats",
            Action::CreatePullRequest => "Create pull request",
            Action::MergePullRequest => "Merge pull request",
            Action::ReassignReviewer => "Reassign reviewer",
            Action::SetUserActive => "Set user active flag",
            Action::UserReviews => "Pull requests I review",
            Action::Quit => "Quit",
        };
        f.write_str(label)
    }
}

/// Parse `id:username[:inactive]` entries separated by commas.
fn parse_members(input: &str) -> Result<Vec<TeamMember>, String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let (id, username, is_active) = match parts.as_slice() {
                [id, username] => (*id, *username, true),
                [id, username, "inactive"] => (*id, *username, false),
                [id, username, "active"] => (*id, *username, true),
                _ => return Err(format!("expected id:username[:inactive], got '{}'", entry)),
            };
            if id.is_empty() || username.is_empty() {
                return Err(format!("empty id or username in '{}'", entry));
            }
            Ok(TeamMember {
                id: id.into(),
                username: username.to_string(),
                is_active,
            })
        })
        .collect()
}

fn required(prompt: &str) -> Result<String, TuiError> {
    let value = Text::new(prompt).prompt()?;
    let value = value.trim();
    if value.is_empty() {
        return Err(TuiError::Input(format!("{} must not be empty", prompt.trim_end_matches(':'))));
    }
    Ok(value.to_string())
}

fn render(value: &impl Serialize) -> Result<(), TuiError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// TUI adapter. Inquire prompts.
pub struct TuiInputPort {
    pull_requests: Arc<PullRequestService>,
    teams: Arc<TeamService>,
    users: Arc<UserService>,
}

impl TuiInputPort {
    pub fn new(
        pull_requests: Arc<PullRequestService>,
        teams: Arc<TeamService>,
        users: Arc<UserService>,
    ) -> Self {
        Self {
            pull_requests,
            teams,
            users,
        }
    }

    async fn perform(&self, action: Action) -> Result<(), TuiError> {
        match action {
            Action::AddTeam => {
                let name = required("Team name:")?;
                let members = Text::new("Members (id:username[:inactive], comma separated):")
                    .prompt()?;
                let members = parse_members(&members).map_err(TuiError::Input)?;
                let team = self
                    .teams
                    .create(Team {
                        name: name.into(),
                        members,
                    })
                    .await?;
                render(&json!({ "team": team }))
            }
            Action::GetTeam => {
                let name = required("Team name:")?;
                render(&self.teams.get(&name.into()).await?)
            }
            Action::TeamStats => {
                let name = required("Team name:")?;
                render(&self.teams.get_stats(&name.into()).await?)
            }
            Action::CreatePullRequest => {
                let id = required("Pull request id:")?;
                let name = required("Pull request name:")?;
                let author = required("Author id:")?;
                let pr = self
                    .pull_requests
                    .create(id.into(), name, author.into())
                    .await?;
                render(&json!({ "pr": pr }))
            }
            Action::MergePullRequest => {
                let id = required("Pull request id:")?;
                let pr = self.pull_requests.merge(id.into()).await?;
                render(&json!({ "pr": pr }))
            }
            Action::ReassignReviewer => {
                let id = required("Pull request id:")?;
                let old = required("Reviewer to replace:")?;
                let (pr, replaced_by) = self.pull_requests.reassign(id.into(), old.into()).await?;
                render(&json!({ "pr": pr, "replaced_by": replaced_by }))
            }
            Action::SetUserActive => {
                let id = required("User id:")?;
                let is_active = Confirm::new("Active?").with_default(true).prompt()?;
                let user = self.users.set_is_active(&id.into(), is_active).await?;
                render(&json!({ "user": user }))
            }
            Action::UserReviews => {
                let id = required("User id:")?;
                let prs = self.users.get_reviews(&id.clone().into()).await?;
                render(&json!({ "user_id": id, "pull_requests": prs }))
            }
            Action::Quit => Ok(()),
        }
    }
}

#[async_trait]
impl InputPort for TuiInputPort {
    async fn run(&self) -> Result<(), DomainError> {
        loop {
            let action = match Select::new("What next?", Action::ALL.to_vec()).prompt() {
                Ok(action) => action,
                Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "prompt unavailable; leaving interactive mode");
                    break;
                }
            };
            if matches!(action, Action::Quit) {
                break;
            }

            match self.perform(action).await {
                Ok(()) => {}
                Err(TuiError::Prompt(InquireError::OperationCanceled)) => {
                    println!("cancelled");
                }
                Err(TuiError::Prompt(InquireError::OperationInterrupted)) => break,
                Err(TuiError::Domain(e)) => {
                    match e.kind() {
                        ErrorKind::Internal => error!(error = %e, %action, "operation failed"),
                        _ => info!(code = e.code(), %action, "operation rejected"),
                    }
                    println!("{}: {}", e.code(), e);
                }
                Err(e) => println!("{}", e),
            }
        }
        Ok(())
    }
}
