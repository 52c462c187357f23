//! # Tasktimer Shared Library
//!
//! Data access and state reconciliation for the task tracker: entity models,
//! the dual-backend storage adapter, the task/subtask/interruption repositories,
//! identity resolution and timer sessions.
//!
//! ## Module Organization
//!
//! - `storage`: `StorageAdapter` contract with PostgreSQL and local blob backends
//! - `db`: PostgreSQL pool and migrations
//! - `models`: Task, Subtask and Interruption types
//! - `repository`: per-entity CRUD, ordering and ownership rules
//! - `tracker`: facade bundling the repositories over one adapter
//! - `timer`: stopwatch sessions with periodic persistence
//! - `auth` / `identity`: auth collaborator and acting-user resolution
//! - `error`: tracker error taxonomy

pub mod auth;
pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod repository;
pub mod storage;
pub mod timer;
pub mod tracker;

/// Current version of the tasktimer shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
