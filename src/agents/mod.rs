//! Market-participating device controllers.

/// Weekday/weekend setpoint table.
pub mod schedule;
/// Ramp-strategy HVAC thermostat.
pub mod thermostat;
pub mod types;

pub use schedule::DayPartSchedule;
pub use thermostat::ThermostatAgent;
pub use types::{AgentState, BiddingAgent, PriceStats, Reading};
