//! Google REST APIs used by the tools
//!
//! - `gateway`: authenticated JSON requests
//! - `gmail`: message model, MIME decoding, RFC 2822 encoding
//! - `calendar`: event model, date parsing

mod gateway;
pub mod calendar;
pub mod gmail;

pub use gateway::{GoogleApi, Service};

#[cfg(test)]
pub(crate) use gateway::test_support;
