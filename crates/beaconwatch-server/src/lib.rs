//! # beaconwatch-server
//!
//! HTTP host for the beaconwatch proximity engine.
//!
//! This library provides the API handlers, the shared application state and
//! the notification recorder used by the `beaconwatch-server` binary.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
