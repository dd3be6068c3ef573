//! # Server Utilities Module
//!
//! Environment variable helpers used when connection settings are not given
//! explicitly.
//!
//! ```no_run
//! use server::utils::env::EnvUtils;
//!
//! let queue = EnvUtils::get_optional_var("SERVICEBUS__REQUEST_QUEUE")
//!     .unwrap_or_else(|| "mdm-requests".to_string());
//! ```

pub mod env;
