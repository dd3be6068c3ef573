pub mod errors;

pub use errors::{RelayError, RelayResult};
