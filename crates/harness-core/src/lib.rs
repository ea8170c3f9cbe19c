pub mod client;
pub mod config;
pub mod error;
pub mod harness;
pub mod health;
pub mod latch;
pub mod outcome;
pub mod rate_limiter;
pub mod server;
pub mod stats;
pub mod transport;
pub mod worker;

pub use client::*;
pub use config::*;
pub use error::{HarnessError, Result};
pub use harness::*;
pub use health::*;
pub use latch::*;
pub use outcome::Outcome;
pub use rate_limiter::*;
pub use server::*;
pub use stats::*;
pub use transport::*;
pub use worker::*;
