//! Pipeline launch, polling and artifact recording services.

mod monitor;
mod recorder;

pub use monitor::{
    LaunchOutcome, MonitorSettings, PipelineError, PipelineMonitor, PipelineResult, PollOutcome,
    TrackOutcome,
};
pub use recorder::{ArtifactRecorder, RecordError, RecordResult};
