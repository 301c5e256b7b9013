//! HTTP API route handlers.

pub mod speech;
pub mod system;
