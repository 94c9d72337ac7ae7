//! Core simulation types: run configuration and per-period metrics records.

use std::fmt;

use serde::Serialize;
use time::PrimitiveDateTime;

use crate::config::{ConfigError, ScenarioConfig};
use crate::market::aggregate::AggregatedBid;
use crate::market::auction::ClearingType;
use crate::market::surplus::Surplus;

/// Resolved run parameters for the scheduler.
///
/// # Examples
///
/// ```
/// use transactive_sim::config::ScenarioConfig;
/// use transactive_sim::sim::types::SimConfig;
///
/// let cfg = SimConfig::from_scenario(&ScenarioConfig::baseline()).unwrap();
/// assert_eq!(cfg.time_stop, 48 * 3600);
/// assert_eq!(cfg.periods(), 576);
/// ```
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Bus step (seconds).
    pub dt: u64,
    /// Market period (seconds).
    pub period: u64,
    /// Run ends once a grant reaches this time (seconds).
    pub time_stop: u64,
    /// Wall-clock time at bus time 0.
    pub start: PrimitiveDateTime,
    /// Enter bids and act on prices.
    pub with_market: bool,
}

impl SimConfig {
    /// Resolves the run parameters of a scenario.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` when the start time does not parse.
    pub fn from_scenario(cfg: &ScenarioConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            dt: cfg.simulation.dt,
            period: cfg.market.period,
            time_stop: cfg.simulation.time_stop(),
            start: cfg.simulation.start_datetime()?,
            with_market: cfg.simulation.with_market,
        })
    }

    /// Number of complete market periods in the run.
    pub fn periods(&self) -> u64 {
        if self.period == 0 {
            0
        } else {
            self.time_stop / self.period
        }
    }
}

/// Market outcome of one period, keyed by its clearing time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketMetric {
    /// Clearing deadline (bus seconds).
    pub time: u64,
    pub price: f64,
    pub kind: ClearingType,
    pub quantity: f64,
    pub marginal_quantity: f64,
    pub marginal_fraction: f64,
    pub buyer_count: usize,
    pub seller_count: usize,
    pub lmp: f64,
    pub refload: f64,
    #[serde(flatten)]
    pub surplus: Surplus,
}

impl fmt::Display for MarketMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>6} | {:<7} P={:>8.5} Q={:>8.2} | buyers={:>3} sellers={:>2} | \
             LMP={:.5} ref={:.2} kW | CS={:.4} SS={:.4}",
            self.time,
            self.kind,
            self.price,
            self.quantity,
            self.buyer_count,
            self.seller_count,
            self.lmp,
            self.refload,
            self.surplus.consumer,
            self.surplus.supplier,
        )
    }
}

/// One agent's bid in one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentMetric {
    /// Clearing deadline the bid was made for (bus seconds).
    pub time: u64,
    pub agent: String,
    pub bid_price: f64,
    pub bid_quantity: f64,
}

/// Aggregated buyer curve published in one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateMetric {
    /// Clearing deadline the aggregate was made for (bus seconds).
    pub time: u64,
    #[serde(flatten)]
    pub bid: AggregatedBid,
}

/// Every record collected during a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsLog {
    /// Market identifier used as the record key in exported metrics.
    pub market_name: String,
    /// Quantity unit label.
    pub unit: String,
    /// Start time label written to exported metrics.
    pub start_time: String,
    pub markets: Vec<MarketMetric>,
    pub agents: Vec<AgentMetric>,
    pub aggregates: Vec<AggregateMetric>,
}

impl MetricsLog {
    pub fn new(market_name: &str, unit: &str, start_time: &str) -> Self {
        Self {
            market_name: market_name.to_string(),
            unit: unit.to_string(),
            start_time: start_time.to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_config_from_baseline() {
        let cfg = SimConfig::from_scenario(&ScenarioConfig::baseline());
        let cfg = cfg.ok();
        assert_eq!(cfg.as_ref().map(|c| (c.dt, c.period)), Some((15, 300)));
        assert_eq!(cfg.as_ref().map(|c| c.with_market), Some(true));
    }

    #[test]
    fn sim_config_rejects_bad_start() {
        let mut scenario = ScenarioConfig::baseline();
        scenario.simulation.start_time = "tomorrow".into();
        assert!(SimConfig::from_scenario(&scenario).is_err());
    }

    #[test]
    fn market_metric_display_does_not_panic() {
        let m = MarketMetric {
            time: 300,
            price: 0.0312,
            kind: ClearingType::Buyer,
            quantity: 12.5,
            marginal_quantity: 1.5,
            marginal_fraction: 0.5,
            buyer_count: 9,
            seller_count: 1,
            lmp: 0.03,
            refload: 150.0,
            surplus: Surplus::default(),
        };
        let s = format!("{m}");
        assert!(s.contains("BUYER"));

        let json = serde_json::to_value(&m).unwrap_or_default();
        assert_eq!(json["kind"], 5);
        assert_eq!(json["consumer"], 0.0);
        assert!(json.get("surplus").is_none());
    }
}
