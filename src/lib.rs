//! litexplore - query SQLite databases on remote hosts over ssh.
//!
//! The remote `sqlite3` CLI does the work; this crate ships it parameterized
//! scripts through a multiplexed ssh connection and reads its JSON rows back
//! under a row cap and a time budget.

pub mod config;
pub mod error;
pub mod logging;
pub mod query;
pub mod remote;
pub mod schema;
pub mod types;
