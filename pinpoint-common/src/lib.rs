//! # Pinpoint Common Library
//!
//! Shared code for the Pinpoint coordinate consensus crates:
//! - Error type
//! - TOML configuration loading
//! - Logging bootstrap
//! - Event types (PinpointEvent enum) and the broadcast EventBus
//! - Clock abstraction for testable time
//! - Geodesy helpers (Haversine distance, decimal precision)

pub mod config;
pub mod error;
pub mod events;
pub mod geo;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
pub use geo::Coordinate;
pub use time::{Clock, ManualClock, SystemClock};
