//! `queuectl` is a durable background job queue for shell commands, backed by
//! PostgreSQL.
//!
//! The queue itself lives in the [`queuectl_worker`] crate. This crate holds
//! the pieces shared by the `queuectl` binary: configuration loaded from the
//! environment, database connection setup and logging.

pub mod config;
pub mod db;
pub mod tasks;
pub mod util;
