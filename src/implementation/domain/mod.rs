//! Domain types for sessions and change sets.

mod change_set;
mod error;
mod session;

pub use change_set::{ChangeSet, FileAction, FileChange, parse_change_set};
pub use error::ImplementationDomainError;
pub use session::{PersistedSessionData, Session, SessionId, SessionKind, SessionStatus};
