//! Outbound ports: services the client calls out to.

pub mod task_api_port;

pub use task_api_port::{ApiError, FuzzerCount, TaskApiPort};

#[cfg(test)]
pub use task_api_port::MockTaskApiPort;
