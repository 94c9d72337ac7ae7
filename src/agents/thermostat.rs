//! Price-responsive thermostat agent using the double-ramp strategy.

use tracing::trace;

use super::schedule::DayPartSchedule;
use super::types::{AgentState, BiddingAgent, PriceStats, Reading};
use crate::config::{ControlMode, ControllerConfig};
use crate::market::curve::Bid;

/// Minimum basepoint change reported by [`BiddingAgent::update_schedule`] (degF).
pub const SCHEDULE_TOLERANCE: f64 = 0.1;

/// Bid price for a ramp controller.
///
/// `mean + (reading - basepoint) · ramp · std_dev / temperature_range`,
/// clamped to `[0, price_cap]`. A non-positive range bids the clamped mean.
///
/// # Examples
///
/// ```
/// use transactive_sim::agents::thermostat::ramp_bid_price;
/// use transactive_sim::agents::types::PriceStats;
///
/// let stats = PriceStats { mean: 0.02, std_dev: 0.01 };
/// // two degrees warm on a 4-degree range with slope 2 adds one std dev
/// let p = ramp_bid_price(80.0, 78.0, stats, 2.0, 4.0, 3.78);
/// assert!((p - 0.03).abs() < 1e-12);
/// ```
pub fn ramp_bid_price(
    reading: f64,
    basepoint: f64,
    stats: PriceStats,
    ramp: f64,
    temperature_range: f64,
    price_cap: f64,
) -> f64 {
    let p = if temperature_range > 0.0 {
        stats.mean + (reading - basepoint) * ramp * stats.std_dev / temperature_range
    } else {
        stats.mean
    };
    p.clamp(0.0, price_cap)
}

/// Setpoint offset for a cleared price, clamped to `±offset_limit`.
///
/// Returns `None` when the price statistics carry no spread (`std_dev <= 0`)
/// or the ramp slope is not positive.
pub fn ramp_offset(cleared_price: f64, stats: PriceStats, ramp: f64, temperature_range: f64, offset_limit: f64) -> Option<f64> {
    if stats.std_dev <= 0.0 || ramp <= 0.0 {
        return None;
    }
    let offset = (cleared_price - stats.mean) * temperature_range / ramp / stats.std_dev;
    Some(offset.clamp(-offset_limit, offset_limit))
}

/// HVAC thermostat controller bidding its compressor load.
///
/// The bid price rises as the indoor temperature drifts above the scheduled
/// basepoint; after clearing, the cooling setpoint is moved up when the price
/// is above the mean and down when it is below.
#[derive(Debug, Clone)]
pub struct ThermostatAgent {
    name: String,
    house_name: String,
    meter_name: String,
    control_mode: ControlMode,
    deadband: f64,
    offset_limit: f64,
    ramp: f64,
    price_cap: f64,
    temperature_range: f64,
    schedule: DayPartSchedule,
    stats: PriceStats,
    state: AgentState,
}

impl ThermostatAgent {
    /// Creates an agent from its configuration.
    ///
    /// # Arguments
    ///
    /// * `name` - Agent identifier
    /// * `config` - Controller parameters and day-part schedule
    /// * `stats` - Price statistics of the market the agent bids into
    pub fn new(name: impl Into<String>, config: &ControllerConfig, stats: PriceStats) -> Self {
        Self {
            name: name.into(),
            house_name: config.house_name.clone(),
            meter_name: config.meter_name.clone(),
            control_mode: config.control_mode,
            deadband: config.deadband,
            offset_limit: config.offset_limit,
            ramp: config.ramp,
            price_cap: config.price_cap,
            temperature_range: config.resolved_temperature_range(),
            schedule: config.schedule.clone(),
            stats,
            state: AgentState {
                load_kw: config.rated_kw,
                ..AgentState::default()
            },
        }
    }

    pub fn house_name(&self) -> &str {
        &self.house_name
    }

    pub fn temperature_range(&self) -> f64 {
        self.temperature_range
    }
}

impl BiddingAgent for ThermostatAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn meter_name(&self) -> &str {
        &self.meter_name
    }

    fn deadband(&self) -> f64 {
        self.deadband
    }

    fn state(&self) -> &AgentState {
        &self.state
    }

    fn apply_reading(&mut self, reading: Reading) {
        match reading {
            Reading::AirTemperature(t) => self.state.reading = t,
            // the ramp strategy does not respond to meter voltage
            Reading::Voltage(_) => {}
            // an idle compressor reports zero; keep the last running draw
            Reading::Load(kw) if kw > 0.0 => self.state.load_kw = kw,
            Reading::Load(_) => {}
            Reading::Running(on) => self.state.is_on = on,
        }
    }

    fn formulate_bid(&mut self) -> Option<Bid> {
        if self.control_mode == ControlMode::Disabled {
            return None;
        }
        let price = ramp_bid_price(
            self.state.reading,
            self.state.basepoint,
            self.stats,
            self.ramp,
            self.temperature_range,
            self.price_cap,
        );
        self.state.last_bid_price = price;
        trace!(agent = %self.name, price, quantity = self.state.load_kw, "bid formulated");
        Some(Bid::new(price, self.state.load_kw, self.state.is_on))
    }

    fn inform_cleared_price(&mut self, price: f64) {
        self.state.last_cleared_price = price;
    }

    fn apply_clearing(&mut self, price: f64) -> bool {
        self.state.last_cleared_price = price;
        match ramp_offset(price, self.stats, self.ramp, self.temperature_range, self.offset_limit) {
            Some(offset) => {
                self.state.setpoint = self.state.basepoint + offset;
                true
            }
            None => false,
        }
    }

    fn update_schedule(&mut self, hour_of_day: f64, day_of_week: u8) -> bool {
        let value = self.schedule.setpoint(hour_of_day, day_of_week);
        if (self.state.basepoint - value).abs() > SCHEDULE_TOLERANCE {
            self.state.basepoint = value;
            true
        } else {
            false
        }
    }
}
