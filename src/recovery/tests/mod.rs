//! Unit tests for the recovery sweeper.
