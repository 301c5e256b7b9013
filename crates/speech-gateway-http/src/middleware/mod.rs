//! HTTP middleware: admission control and access logging.

pub mod access_log;
pub mod admission;
