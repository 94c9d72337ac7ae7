//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use transactive_sim::agents::{AgentState, BiddingAgent, Reading};
use transactive_sim::config::{ControllerConfig, MarketConfig};
use transactive_sim::market::{Bid, ClearingParams, CurveOrder, PriceCurve};
use transactive_sim::sim::SimConfig;
use time::macros::datetime;

/// Price cap used by the hand-built market scenarios.
pub const CAP: f64 = 20.0;

/// Clearing parameters with the scenario price cap.
pub fn params() -> ClearingParams {
    ClearingParams {
        price_cap: CAP,
        ..ClearingParams::default()
    }
}

/// Builds a descending buyer curve and an ascending seller curve from
/// `(price, quantity)` pairs.
pub fn curves(buys: &[(f64, f64)], sells: &[(f64, f64)]) -> (PriceCurve, PriceCurve) {
    let mut buyer = PriceCurve::new();
    for &(p, q) in buys {
        buyer.add_point(p, q, true);
    }
    let mut seller = PriceCurve::new();
    for &(p, q) in sells {
        seller.add_point(p, q, true);
    }
    buyer.set_order(CurveOrder::Descending);
    seller.set_order(CurveOrder::Ascending);
    (buyer, seller)
}

/// Market with a 300 s period and 5000 kW of reference supply.
pub fn market_config() -> MarketConfig {
    MarketConfig {
        init_price: 0.02,
        init_stdev: 0.01,
        ..MarketConfig::default()
    }
}

/// Ramp controller on meter `m0` with default schedule.
pub fn controller() -> ControllerConfig {
    ControllerConfig {
        house_name: "house".to_string(),
        meter_name: "m0".to_string(),
        ..ControllerConfig::default()
    }
}

/// Run parameters: 300 s periods, 15 s steps, stopping at `time_stop`,
/// starting on a Monday at midnight.
pub fn sim_config(time_stop: u64, with_market: bool) -> SimConfig {
    SimConfig {
        dt: 15,
        period: 300,
        time_stop,
        start: datetime!(2013-07-01 0:00),
        with_market,
    }
}

/// Agent that always submits the same bid and records what it is told.
#[derive(Debug, Clone)]
pub struct FixedAgent {
    name: String,
    meter: String,
    bid: Option<Bid>,
    state: AgentState,
    scheduled: bool,
    pub readings: Vec<Reading>,
    pub informed: Vec<f64>,
    pub cleared: Vec<f64>,
}

impl FixedAgent {
    pub fn new(name: &str, meter: &str, bid: Option<Bid>) -> Self {
        Self {
            name: name.to_string(),
            meter: meter.to_string(),
            bid,
            state: AgentState {
                basepoint: 78.0,
                setpoint: 78.0,
                ..AgentState::default()
            },
            scheduled: false,
            readings: Vec::new(),
            informed: Vec::new(),
            cleared: Vec::new(),
        }
    }
}

impl BiddingAgent for FixedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn meter_name(&self) -> &str {
        &self.meter
    }

    fn deadband(&self) -> f64 {
        2.0
    }

    fn state(&self) -> &AgentState {
        &self.state
    }

    fn apply_reading(&mut self, reading: Reading) {
        self.readings.push(reading);
    }

    fn formulate_bid(&mut self) -> Option<Bid> {
        self.bid
    }

    fn inform_cleared_price(&mut self, price: f64) {
        self.informed.push(price);
    }

    fn apply_clearing(&mut self, price: f64) -> bool {
        self.cleared.push(price);
        self.state.setpoint = self.state.basepoint + 1.0;
        true
    }

    /// Reports a schedule change on the first call only.
    fn update_schedule(&mut self, _hour_of_day: f64, _day_of_week: u8) -> bool {
        !std::mem::replace(&mut self.scheduled, true)
    }
}
