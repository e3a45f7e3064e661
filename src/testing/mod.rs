//! Testing utilities and mock implementations
//!
//! Deterministic stand-ins for the transport and the timer source so the
//! connection lifecycle can be exercised without sockets or real time.

pub mod mocks;

pub use mocks::*;
