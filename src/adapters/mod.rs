//! Adapters implementing the domain ports.
//!
//! - `sqlite`: persistent build store and pattern repository
//! - `memory`: in-process stores for tests and dry runs
//! - `http`: the remote generation and compile service

pub mod http;
pub mod memory;
pub mod sqlite;
