//! Core domain layer. No external I/O dependencies.
//!
//! Entities, errors, and the reviewer selection rules live here. Dependencies flow inward.

pub mod entities;
pub mod errors;
pub mod reviewers;

pub use entities::{
    MAX_REVIEWERS, PullRequest, PullRequestId, PullRequestStatus, Team, TeamMember, TeamName,
    TeamStats, User, UserId,
};
pub use errors::{DomainError, ErrorKind};
pub use reviewers::{Reassignment, assign_reviewers, reassign_reviewers};
