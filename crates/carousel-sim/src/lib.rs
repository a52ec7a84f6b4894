//! Simulated carousel
//!
//! A [`carousel_nav::RemoteView`] that lives in memory. Items are grouped into
//! jobs with jobs-style addresses and CDN-style fingerprints, moves and actions
//! land after configurable latencies, and a processing queue fills with every
//! registered action and drains as it is polled. [`FaultPlan`] injects the
//! failures the driver must survive.

mod config;
mod sim;

pub use config::{FaultPlan, SimConfig};
pub use sim::{SimCarousel, SimStats};
