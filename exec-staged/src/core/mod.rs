//! Deterministic, pure logic shared by the stage engine.
//!
//! Core modules must be free of I/O side effects. They operate on git output
//! that was already captured and return values suitable for tests.

pub mod filter;
pub mod status;
pub mod task;
pub mod version;
