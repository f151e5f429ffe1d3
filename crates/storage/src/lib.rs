//! Persistence backends for chat threads: a SQLite store for real
//! installs and an in-memory store for hosts and tests.

pub mod memory;
pub mod sqlite;
