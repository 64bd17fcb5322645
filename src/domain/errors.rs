//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these; no storage error type crosses the port
//! boundary.

use super::entities::{PullRequestId, TeamName, UserId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("team not found: {0}")]
    TeamNotFound(TeamName),

    #[error("team already exists: {0}")]
    TeamAlreadyExists(TeamName),

    #[error("user not found: {0}")]
    UserNotFound(UserId),

    #[error("pull request not found: {0}")]
    PullRequestNotFound(PullRequestId),

    #[error("pull request already exists: {0}")]
    PullRequestExists(PullRequestId),

    #[error("cannot reassign on merged pull request: {0}")]
    ReassignMergedPullRequest(PullRequestId),

    #[error("reviewer {reviewer} is not assigned to {pull_request}")]
    ReviewerIsNotAssigned {
        pull_request: PullRequestId,
        reviewer: UserId,
    },

    #[error("no active replacement candidate available")]
    NoCandidate,

    /// Unclassified storage failure. Never retried by the core.
    #[error("storage error: {0}")]
    Storage(String),

    /// Rollback failed after the unit of work had already failed.
    #[error("rollback error: {rollback} (original: {source})")]
    Rollback {
        rollback: Box<DomainError>,
        source: Box<DomainError>,
    },
}

/// Coarse classification for presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Internal,
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::TeamNotFound(_)
            | DomainError::UserNotFound(_)
            | DomainError::PullRequestNotFound(_) => ErrorKind::NotFound,
            DomainError::TeamAlreadyExists(_)
            | DomainError::PullRequestExists(_)
            | DomainError::ReassignMergedPullRequest(_)
            | DomainError::ReviewerIsNotAssigned { .. }
            | DomainError::NoCandidate => ErrorKind::Conflict,
            DomainError::Storage(_) | DomainError::Rollback { .. } => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::TeamNotFound(_)
            | DomainError::UserNotFound(_)
            | DomainError::PullRequestNotFound(_) => "NOT_FOUND",
            DomainError::TeamAlreadyExists(_) => "TEAM_EXISTS",
            DomainError::PullRequestExists(_) => "PR_EXISTS",
            DomainError::ReassignMergedPullRequest(_) => "PR_MERGED",
            DomainError::ReviewerIsNotAssigned { .. } => "NOT_ASSIGNED",
            DomainError::NoCandidate => "NO_CANDIDATE",
            DomainError::Storage(_) | DomainError::Rollback { .. } => "INTERNAL_SERVER_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_error_shows_both_failures() {
        let err = DomainError::Rollback {
            rollback: Box::new(DomainError::Storage("connection reset".into())),
            source: Box::new(DomainError::NoCandidate),
        };
        let msg = err.to_string();
        assert!(msg.contains("connection reset"));
        assert!(msg.contains("no active replacement candidate"));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn codes_follow_kind() {
        assert_eq!(DomainError::TeamNotFound("t".into()).code(), "NOT_FOUND");
        assert_eq!(DomainError::PullRequestExists("p".into()).code(), "PR_EXISTS");
        assert_eq!(
            DomainError::ReassignMergedPullRequest("p".into()).kind(),
            ErrorKind::Conflict
        );
    }
}
