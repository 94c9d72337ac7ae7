//! Transactive energy market simulator.
//!
//! Price-responsive thermostats bid into a retail double auction that clears
//! once per market period against a wholesale reference price, in lock-step
//! with an external time-advance bus.

/// Bidding agents and their schedules.
pub mod agents;
pub mod config;
pub mod error;
pub mod io;
/// Bid curves, aggregation, clearing and surplus.
pub mod market;
/// Scheduler, bus, ingestion and metrics.
pub mod sim;
