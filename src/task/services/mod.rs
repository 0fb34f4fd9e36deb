//! Application services for task lifecycle orchestration.

mod commands;

pub use commands::{
    AxisView, RequestOutcome, SourceStatusView, TaskCommandError, TaskCommandResult,
    TaskCommandService, TaskStatusView,
};
