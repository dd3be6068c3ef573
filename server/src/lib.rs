//! # MDM Relay Server Library
//!
//! Request/response relay over an Azure Service Bus queue pair. Requests go out on
//! the request queue tagged with the client's session; replies come back on a
//! session-enabled response queue in any order and are matched to their requests
//! by message ID.
//!
//! ## Modules
//!
//! - [`client`] - Connection lifecycle and the process-wide client
//! - [`correlation`] - Matching replies to requests and buffering the rest
//! - [`transport`] - Queue transports (Service Bus and in-memory)
//! - [`processor`] - Typed request/response round trips
//! - [`requests`] - Request and response types, entities and validation
//! - [`producer`] - Message production to the request queue
//! - [`consumer`] - Session receivers on the response queue
//! - [`model`] - Data models for brokered messages
//! - [`config`] - Connection and processor settings
//! - [`utils`] - Utility functions and helpers
//! - [`common`] - Error types shared across modules

pub mod client;
pub mod common;
pub mod config;
pub mod consumer;
pub mod correlation;
pub mod model;
pub mod processor;
pub mod producer;
pub mod requests;
pub mod transport;
pub mod utils;
