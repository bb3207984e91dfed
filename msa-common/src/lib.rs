//! # Musicasua Common Library
//!
//! Shared code for the Musicasua album service including:
//! - Common error type
//! - Configuration file and root folder resolution
//! - Retry policy with exponential backoff
//! - Injectable clock
//! - Server-Sent Events helpers

pub mod config;
pub mod error;
pub mod retry;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
pub use retry::{RetryPolicy, Transient};
pub use time::{Clock, ManualClock, SystemClock};
