//! Confirmed navigation and action primitives
//!
//! This crate turns fire-and-forget operations against a remote carousel into
//! operations with proof of effect:
//! - [`RemoteView`]: the black-box seam (jump, step, trigger, polled state)
//! - [`CarouselNavigator`]: single-step advance confirmed by fingerprint change
//! - [`ActionExecutor`]: per-item action confirmed by an indicator change
//! - bounded polling with a fixed interval and explicit timeout
//! - helpers for jobs-style addresses and resource fingerprints

pub mod address;
pub mod errors;
mod executor;
mod navigator;
pub mod remote;
pub mod types;
mod waiting;

#[cfg(test)]
mod test_support;

pub use errors::*;
pub use executor::*;
pub use navigator::*;
pub use remote::*;
pub use types::*;
pub use waiting::*;
