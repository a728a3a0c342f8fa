//! atlas-cli - a command-line client for JIRA and Confluence
//!
//! The [`api`] module holds the REST clients and can be used on its own; the
//! remaining modules make up the `atlas` binary.

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod output;
