//! Core library for the KrakenHashes job scheduler — domain types, status
//! state machines, configuration, and the shared error taxonomy used across
//! the store, keyspace, scheduler, and daemon crates.

pub mod config;
pub mod domain;
pub mod error;

pub use error::{KrakenError, KrakenResult};
