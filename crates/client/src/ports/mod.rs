//! Port traits at the edges of the client.

pub mod outbound;
