//! Core engines: detection cascade, real-time monitoring, containment.

pub mod config;
pub mod monitor;
pub mod response;
pub mod scanner;
pub mod store;
