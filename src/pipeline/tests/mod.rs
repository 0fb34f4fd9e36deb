//! Unit tests for pipeline executions, monitoring and artifact recording.
