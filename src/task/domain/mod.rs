//! Domain model for the task lifecycle.
//!
//! A [`Task`] carries three independent status axes (simple evaluation,
//! advanced evaluation, implementation) coupled by one cross-axis guard,
//! [`ensure_implementation_allowed`]. A [`TaskSource`] carries the sync
//! axis. All infrastructure concerns stay outside this boundary.

mod error;
mod evaluation;
mod guard;
mod ids;
mod issue;
mod source;
mod stage;
mod status;
mod task;

pub use error::{ParseStatusError, TaskDomainError};
pub use evaluation::{
    CapabilityFlags, EvaluationKind, EvaluationResult, EvaluationScores, Verdict,
};
pub use guard::{
    AdvancedEvaluationPolicy, BlockReason, ensure_advanced_allowed, ensure_implementation_allowed,
};
pub use ids::{IssueKey, ProjectId, TaskId, TaskSourceId};
pub use issue::{ExternalIssue, IssueProvider, IssueReference, RemoteStatus};
pub use source::{IssueSourceConfig, PersistedTaskSourceData, SyncGuard, TaskSource};
pub use stage::{
    FailureKind, GuardedUpdate, PersistedStageData, StageFailure, StageState, StatusGuard,
};
pub use status::{
    AxisStatus, EvaluationStatus, ImplementationStatus, StageStatus, SyncStatus, TaskAxis,
};
pub use task::{EvaluationAxis, PersistedTaskData, Task};
