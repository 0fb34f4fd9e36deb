//! Unit tests for evaluator parsing and the evaluation gate.
