//! Domain entities. Pure data structures for the core business.
//!
//! No storage types here; adapters map rows into these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on reviewers attached to a single pull request.
pub const MAX_REVIEWERS: usize = 2;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Opaque user identifier.
    UserId
);
string_id!(
    /// Team name; also the team's identity.
    TeamName
);
string_id!(
    /// Opaque pull request identifier.
    PullRequestId
);

/// Membership snapshot as seen inside a [`Team`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    #[serde(rename = "user_id")]
    pub id: UserId,
    pub username: String,
    pub is_active: bool,
}

impl TeamMember {
    /// The persisted user row for this member, bound to `team_name`.
    pub fn to_user(&self, team_name: &TeamName) -> User {
        User {
            id: self.id.clone(),
            username: self.username.clone(),
            team_name: team_name.clone(),
            is_active: self.is_active,
        }
    }
}

/// Team aggregate. `members` is always the full live membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    #[serde(rename = "team_name")]
    pub name: TeamName,
    pub members: Vec<TeamMember>,
}

/// Persisted membership record; one team per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "user_id")]
    pub id: UserId,
    pub username: String,
    pub team_name: TeamName,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PullRequestStatus {
    Open,
    Merged,
}

impl PullRequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PullRequestStatus::Open => "OPEN",
            PullRequestStatus::Merged => "MERGED",
        }
    }

    /// Parse the stored representation. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(PullRequestStatus::Open),
            "MERGED" => Some(PullRequestStatus::Merged),
            _ => None,
        }
    }
}

impl fmt::Display for PullRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pull request aggregate. Status only moves `Open -> Merged`.
///
/// `merged_at` is `Some` exactly when `status == Merged`; `created_at` never changes
/// after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    #[serde(rename = "pull_request_id")]
    pub id: PullRequestId,
    #[serde(rename = "pull_request_name")]
    pub name: String,
    pub author_id: UserId,
    pub status: PullRequestStatus,
    pub assigned_reviewers: Vec<UserId>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "mergedAt", skip_serializing_if = "Option::is_none", default)]
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    /// A freshly opened pull request.
    pub fn open(
        id: PullRequestId,
        name: impl Into<String>,
        author_id: UserId,
        assigned_reviewers: Vec<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            author_id,
            status: PullRequestStatus::Open,
            assigned_reviewers,
            created_at,
            merged_at: None,
        }
    }

    pub fn is_merged(&self) -> bool {
        self.status == PullRequestStatus::Merged
    }

    pub fn has_reviewer(&self, id: &UserId) -> bool {
        self.assigned_reviewers.contains(id)
    }
}

/// Read-only team projection, computed on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStats {
    pub team_name: TeamName,
    pub members_count: u64,
    pub active_members_count: u64,
    #[serde(rename = "total_prs")]
    pub total_pull_requests: u64,
    #[serde(rename = "open_prs")]
    pub open_pull_requests: u64,
    #[serde(rename = "merged_prs")]
    pub merged_pull_requests: u64,
    #[serde(rename = "avg_time_to_merge_seconds")]
    pub avg_time_to_merge_secs: i64,
}
