//! V1 API handlers.

mod forwarding;

pub use forwarding::{configure, start, status, stop};
