//! Application layer: use cases composed from ports and state.

pub mod services;
