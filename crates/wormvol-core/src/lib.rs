//! wormvol-core: Core library for wormvol
//!
//! Reconciles Bacula catalog retention with the WORM lock state of volume
//! files on a compliance-locking filesystem (NetApp SnapLock style, where a
//! future access time plus a read-only mode locks a file until that time).
//!
//! # Architecture
//!
//! ```text
//! bconsole → listing parser → value coercion → VolumeRecord
//!                                                   ↓
//!                          file probe → classifier → commit | delete
//! ```
//!
//! # Modules
//!
//! - `console`: Console subprocess gateway with timeout
//! - `listing`: Splits `llist` output into raw key/value records
//! - `value`: Locale-aware coercion of raw values into typed scalars
//! - `volume`: Typed volume records and protection deadline arithmetic
//! - `catalog`: List, status update and delete commands with confirmation checks
//! - `store`: Volume file probing and metadata mutation
//! - `classify`: Commit/delete decision rules
//! - `commit`: WORM commit of a single volume
//! - `delete`: Destruction of a single expired volume
//! - `reconcile`: Plan and execute one pass over the retention pools
//! - `config`: Configuration management
//! - `logging`: Structured logging setup
//!
//! # Safety
//!
//! Every destructive path re-checks the file's lock immediately before
//! acting, and catalog mutations must be confirmed by the director before the
//! filesystem side is touched.

#![forbid(unsafe_code)]

pub mod catalog;
pub mod classify;
pub mod commit;
pub mod config;
pub mod console;
pub mod delete;
pub mod error;
pub mod listing;
pub mod logging;
pub mod reconcile;
pub mod store;
pub mod value;
pub mod volume;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
