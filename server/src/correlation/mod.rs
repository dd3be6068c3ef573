//! # Reply Correlation
//!
//! Replies to every request sent through a connection arrive on one shared
//! session, in no particular order. [`CorrelationEngine`] pulls them one at a time
//! until the awaited ID shows up and parks the rest in a [`PendingReplyBuffer`]
//! where other callers find them.
//!
//! ```no_run
//! use server::correlation::{AwaitOutcome, CorrelationEngine, PendingReplyBuffer, ReplyWaitPolicy};
//! use server::transport::InMemoryTransport;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> server::common::RelayResult<()> {
//! let engine = CorrelationEngine::new(
//!     "session-1",
//!     Arc::new(InMemoryTransport::new()),
//!     Arc::new(PendingReplyBuffer::new()),
//!     ReplyWaitPolicy::Deadline,
//! );
//! match engine.await_reply("message-1", Duration::from_secs(5)).await? {
//!     AwaitOutcome::Matched(reply) => println!("{}", reply.body_data()),
//!     AwaitOutcome::TimedOut => println!("no reply yet"),
//!     AwaitOutcome::NoResponse => println!("session ended"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod engine;

pub use buffer::PendingReplyBuffer;
pub use engine::{AwaitOutcome, CorrelationEngine, ReplyWaitPolicy};
