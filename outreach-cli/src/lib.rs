//! outreach CLI library
//!
//! `serve` and `check-smtp` run in-process against the local configuration.
//! Every other command talks to a running server over its HTTP API.

pub mod client;
pub mod commands;

pub use client::ApiClient;
