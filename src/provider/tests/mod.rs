//! Unit tests for provider resolution.
