//! Infrastructure adapters and runtime bootstrap.

pub mod cms;
pub mod error;
pub mod http;
pub mod realtime;
pub mod telemetry;
