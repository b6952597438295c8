#![doc = "merge-watch: watches a folder for client documents, converts them to PDF, tracks each client's required file set and merges and mails it once complete."]

//! The heart of the crate is the [`tracker`] module: it resolves arrivals
//! against the [`registry`], drives the [`conversion`] gateway and triggers
//! [`finalize`] exactly once per completed client. Everything that touches
//! the outside world (office suite, PDF merge, mail) sits behind the traits
//! in [`contract`].

pub mod cli;
pub mod config;
pub mod contract;
pub mod conversion;
pub mod converters;
pub mod error;
pub mod event_source;
pub mod finalize;
pub mod load_config;
pub mod mail;
pub mod merge;
pub mod registry;
pub mod service;
pub mod tracker;

pub use cli::{run, Cli, Commands};
