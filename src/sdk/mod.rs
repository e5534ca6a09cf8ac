//! SDK helpers on top of the single-call protocol engine.
//!
//! `MiioClient` binds a device address and token together with transport
//! limits, so callers do not repeat them for every call.
pub mod client;

pub use client::{parse_token, ClientConfig, MiioClient};
