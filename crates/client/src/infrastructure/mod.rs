//! Infrastructure layer - External adapters

pub mod http_client;
pub mod messaging;
pub mod websocket;

pub use http_client::HttpTaskApi;

// Test-only infrastructure fakes. Available to integration tests and other
// crates through the `testing` feature.
#[cfg(any(test, feature = "testing"))]
pub mod testing;
