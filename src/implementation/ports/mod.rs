//! Port contracts for session storage.

mod session_repository;

pub use session_repository::{
    SessionRepository, SessionRepositoryError, SessionRepositoryResult,
};
