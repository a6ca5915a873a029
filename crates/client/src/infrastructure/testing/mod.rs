//! Test-only infrastructure fakes.
//!
//! Available to other crates through the `testing` feature, so integration
//! tests can drive a client without a network.

pub mod memory_connector;

pub use memory_connector::{MemoryConnector, MemoryServer, ServerEnd};
