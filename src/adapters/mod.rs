//! Adapters module - front ends that drive a [`Conversation`](crate::agent::Conversation).
//!
//! # Supported Channels
//!
//! - **CLI** - Interactive command line interface

pub mod cli;

pub use cli::{CliChannel, Interrupt};
