//! Unit tests for task source synchronization.

mod synchronizer_tests;
