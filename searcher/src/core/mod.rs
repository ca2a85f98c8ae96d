//! Deterministic, pure logic shared by the searcher.
//!
//! Core modules must be free of I/O side effects. They operate on raw agent
//! text and in-memory values and return deterministic outputs suitable for tests.

pub mod backoff;
pub mod extract;
pub mod model;
pub mod payload;
pub mod rounds;
pub mod validate;
