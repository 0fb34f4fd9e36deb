//! Unit tests for the processing lock.

mod lock_tests;
