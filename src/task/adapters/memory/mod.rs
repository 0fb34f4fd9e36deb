//! In-memory task and task-source repositories.

mod source;
mod task;

pub use source::InMemoryTaskSourceRepository;
pub use task::InMemoryTaskRepository;
