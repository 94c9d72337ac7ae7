//! Common types and traits for market-participating agents.

use crate::market::curve::Bid;

/// Historical price statistics an agent bids against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceStats {
    /// Mean clearing price ($/kWh).
    pub mean: f64,
    /// Standard deviation of the clearing price ($/kWh).
    pub std_dev: f64,
}

/// One already-parsed external measurement for an agent's device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Indoor air temperature (degF).
    AirTemperature(f64),
    /// Meter voltage magnitude (V).
    Voltage(f64),
    /// Device real-power draw (kW).
    Load(f64),
    /// Whether the device is currently running.
    Running(bool),
}

/// Mutable per-device state, kept across market periods.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentState {
    /// Schedule setpoint before any price response.
    pub basepoint: f64,
    /// Setpoint after the last price response.
    pub setpoint: f64,
    pub last_bid_price: f64,
    pub last_cleared_price: f64,
    /// Last known commitment state of the device.
    pub is_on: bool,
    /// Last known controlled quantity (indoor air temperature for a thermostat).
    pub reading: f64,
    /// Last known positive real-power draw (kW).
    pub load_kw: f64,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            basepoint: 0.0,
            setpoint: 0.0,
            last_bid_price: 0.0,
            last_cleared_price: 0.0,
            is_on: false,
            reading: 78.0,
            load_kw: 3.0,
        }
    }
}

/// Trait defining a device controller that bids into the retail market.
///
/// Every method is a pure update of the agent's own state; nothing here can
/// fail. Malformed measurements are rejected before they become a
/// [`Reading`].
pub trait BiddingAgent {
    /// Unique agent identifier, also the prefix of its published topics.
    fn name(&self) -> &str;

    /// Name of the meter the agent publishes prices to.
    fn meter_name(&self) -> &str;

    /// Thermostat deadband published once at start-up.
    fn deadband(&self) -> f64;

    /// Current agent state.
    fn state(&self) -> &AgentState;

    /// Updates the state from one external measurement.
    fn apply_reading(&mut self, reading: Reading);

    /// Computes this period's bid.
    ///
    /// # Returns
    ///
    /// `None` when the agent does not participate in the market.
    fn formulate_bid(&mut self) -> Option<Bid>;

    /// Records the period's clearing price without acting on it.
    fn inform_cleared_price(&mut self, price: f64);

    /// Adjusts the setpoint to a cleared price.
    ///
    /// # Returns
    ///
    /// `true` if a new setpoint was computed and should be published.
    fn apply_clearing(&mut self, price: f64) -> bool;

    /// Moves the basepoint to the day-part schedule value for the given
    /// wall-clock hour and weekday (Monday = 0).
    ///
    /// # Returns
    ///
    /// `true` only when the basepoint actually moved.
    fn update_schedule(&mut self, hour_of_day: f64, day_of_week: u8) -> bool;
}
