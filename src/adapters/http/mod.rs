//! HTTP adapter for the remote generation and compile service.

pub mod client;

pub use client::{HttpModService, HttpServiceConfig};
