//! Application state fed by the real-time client and the REST facade.

pub mod dashboard_state;
pub mod task_store;

pub use dashboard_state::DashboardState;
pub use task_store::{TaskStore, TaskStoreState, UpdateApplied};
