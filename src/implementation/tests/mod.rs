//! Unit tests for sessions and implementation dispatch.
