//! quill core library: domain types, configuration, access gate, errors.
//!
//! - [`types`]: notes, slugs and sync outcomes
//! - [`config`]: immutable process configuration (`~/.quill/config.yaml` + env)
//! - [`access`]: sender allow-list
//! - [`error`]: [`ConfigError`]

pub mod access;
pub mod config;
pub mod error;
pub mod types;

pub use access::AccessGate;
pub use config::{Author, CollisionPolicy, Config};
pub use error::ConfigError;
pub use types::{Note, SenderId, Slug, SyncResult, SyncStage};
