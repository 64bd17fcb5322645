//! Application use cases. Orchestrate domain logic via ports.

pub mod pull_request_service;
pub mod team_service;
pub mod transaction;
pub mod user_service;

pub use pull_request_service::{PullRequestService, RandomSource};
pub use team_service::TeamService;
pub use transaction::TransactionCoordinator;
pub use user_service::UserService;
