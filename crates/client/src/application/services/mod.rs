//! Application services.

pub mod task_service;

pub use task_service::{TaskAction, TaskService};
