// Adapters layer: concrete implementations of the domain ports for
// external systems (HTTP endpoints, local filesystem, wall clock).

pub mod http;
pub mod storage;
pub mod time;
