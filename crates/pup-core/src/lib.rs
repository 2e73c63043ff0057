//! pup-core - Core library for Puppy Planner
//!
//! Offline-first data layer shared by all Puppy Planner clients: a durable
//! local store mirroring the remote collections, a write-ahead queue for
//! mutations made while disconnected, connectivity-driven sync, and a TTL
//! read-through cache, composed behind one data access facade.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod service;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Collection, Record};
pub use service::DataService;
