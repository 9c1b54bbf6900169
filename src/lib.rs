//! Orbit - chat assistant for Gmail and Google Calendar
//!
//! This library provides a tool-calling conversation agent with a
//! human-in-the-loop confirmation gate, the Gmail/Calendar tools it drives,
//! Google OAuth token management and a small task scheduler.

pub mod agent;
pub mod adapters;
pub mod auth;
pub mod config;
pub mod error;
pub mod google;
pub mod scheduler;
pub mod tools;
pub mod ui;

pub use error::{Error, Result};
