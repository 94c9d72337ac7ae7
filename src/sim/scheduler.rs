//! Phased market loop driven by an external time-advance bus.

use tracing::{debug, info, warn};

use super::bus::{CoSimBus, PubValue};
use super::clock::{Phase, PhaseDeadlines, SimClock};
use super::ingest::{TopicMap, Update, decode};
use super::types::{AgentMetric, AggregateMetric, MarketMetric, MetricsLog, SimConfig};
use crate::agents::types::BiddingAgent;
use crate::error::BusError;
use crate::market::auction::{ClearingType, DoubleAuction, MarketState};
use crate::market::surplus::{Surplus, compute_surplus};

/// Heating setpoint published to every thermostat at start-up (degF).
pub const DEFAULT_HEATING_SETPOINT: f64 = 60.0;

/// Runs one market and its bidding agents in lock-step with a [`CoSimBus`].
///
/// Generic over the bus and the agent type for static dispatch. Each wake
/// ingests the inputs received since the previous grant, applies the
/// time-of-day schedule, then runs every phase whose deadline the grant has
/// reached, in bid, aggregate, clear, adjust order.
pub struct PeriodScheduler<B: CoSimBus, A: BiddingAgent> {
    config: SimConfig,
    bus: B,
    auction: DoubleAuction,
    agents: Vec<A>,
    topics: TopicMap,
    clock: SimClock,
    deadlines: PhaseDeadlines,
    state: MarketState,
    /// Which agents entered a bid into the current period's market.
    bidders: Vec<bool>,
    defaults_published: bool,
    metrics: MetricsLog,
}

impl<B: CoSimBus, A: BiddingAgent> PeriodScheduler<B, A> {
    /// Creates a scheduler at bus time 0.
    ///
    /// # Arguments
    ///
    /// * `config` - Run parameters
    /// * `auction` - The market to clear each period
    /// * `agents` - Bidding agents, processed in this order every phase
    /// * `bus` - Time-advance/pub-sub service
    /// * `metrics` - Empty log carrying the export labels
    pub fn new(config: SimConfig, auction: DoubleAuction, agents: Vec<A>, bus: B, metrics: MetricsLog) -> Self {
        let topics = TopicMap::new(agents.iter().map(|a| a.name()));
        let clock = SimClock::new(config.start);
        let deadlines = PhaseDeadlines::new(config.period, config.dt);
        let bidders = vec![false; agents.len()];
        let state = auction.open_period();
        Self {
            config,
            bus,
            auction,
            agents,
            topics,
            clock,
            deadlines,
            state,
            bidders,
            defaults_published: false,
            metrics,
        }
    }

    /// Runs until a grant reaches the stop time.
    ///
    /// Metrics recorded before an error stay available through
    /// [`PeriodScheduler::metrics`].
    ///
    /// # Errors
    ///
    /// Returns the first `BusError`; the run cannot continue past it.
    pub fn run(&mut self) -> Result<(), BusError> {
        info!(
            market = self.auction.name(),
            agents = self.agents.len(),
            stop = self.config.time_stop,
            with_market = self.config.with_market,
            "run started"
        );
        while self.clock.granted() < self.config.time_stop {
            self.step()?;
        }
        info!(
            periods = self.metrics.markets.len(),
            bids = self.metrics.agents.len(),
            "run finished"
        );
        Ok(())
    }

    /// Requests the next wake time and processes the grant.
    ///
    /// # Returns
    ///
    /// The granted bus time.
    ///
    /// # Errors
    ///
    /// Returns a `BusError` if the bus fails or grants a time earlier than
    /// the previous grant.
    pub fn step(&mut self) -> Result<u64, BusError> {
        let next = self.deadlines.next_wake(self.config.time_stop);
        let granted = self.bus.request_time(next)?;
        let previous = self.clock.granted();
        if granted < previous {
            return Err(BusError::TimeRegression { granted, previous });
        }
        self.clock.advance_to(granted);

        self.ingest();
        self.apply_schedules();
        if !self.defaults_published {
            self.publish_defaults();
            self.defaults_published = true;
        }

        for phase in self.deadlines.due(granted) {
            match phase {
                Phase::Bid => self.collect_bids(),
                Phase::Aggregate => self.aggregate(),
                Phase::Clear => self.clear(),
                Phase::Adjust => self.adjust(),
            }
            self.deadlines.advance(phase);
        }
        Ok(granted)
    }

    fn ingest(&mut self) {
        for (topic, value) in self.bus.updated_inputs() {
            let Some(input) = self.topics.get(&topic) else {
                debug!(%topic, "ignoring unsubscribed topic");
                continue;
            };
            match decode(input, &value) {
                Ok(Update::Lmp(lmp)) => self.auction.set_lmp(lmp),
                Ok(Update::RefLoad(kw)) => self.auction.set_refload(kw),
                Ok(Update::Agent(k, reading)) => {
                    if let Some(agent) = self.agents.get_mut(k) {
                        agent.apply_reading(reading);
                    }
                }
                Err(error) => warn!(%topic, %value, %error, "rejected input; keeping last value"),
            }
        }
    }

    fn apply_schedules(&mut self) {
        let hour = self.clock.hour_of_day();
        let dow = self.clock.day_of_week();
        for agent in &mut self.agents {
            if agent.update_schedule(hour, dow) {
                let topic = format!("{}/cooling_setpoint", agent.name());
                self.bus.publish(&topic, PubValue::Double(agent.state().basepoint));
            }
        }
    }

    fn publish_defaults(&mut self) {
        let mut meters: Vec<&str> = Vec::new();
        for agent in &self.agents {
            let name = agent.name();
            if !meters.contains(&agent.meter_name()) {
                meters.push(agent.meter_name());
                self.bus
                    .publish(&format!("{name}/bill_mode"), PubValue::Text("HOURLY".to_string()));
                self.bus
                    .publish(&format!("{name}/monthly_fee"), PubValue::Double(0.0));
            }
            self.bus.publish(
                &format!("{name}/thermostat_deadband"),
                PubValue::Double(agent.deadband()),
            );
            self.bus.publish(
                &format!("{name}/heating_setpoint"),
                PubValue::Double(DEFAULT_HEATING_SETPOINT),
            );
        }
    }

    fn collect_bids(&mut self) {
        self.state = self.auction.open_period();
        let time = self.deadlines.clear;
        for (agent, entered) in self.agents.iter_mut().zip(&mut self.bidders) {
            *entered = false;
            let Some(bid) = agent.formulate_bid() else {
                continue;
            };
            if self.config.with_market {
                self.state.collect_bid(&bid);
                *entered = true;
            }
            self.metrics.agents.push(AgentMetric {
                time,
                agent: agent.name().to_string(),
                bid_price: bid.price,
                bid_quantity: bid.quantity,
            });
        }
        debug!(
            granted = self.clock.granted(),
            clear_at = time,
            buyers = self.state.buyer.len(),
            unresp = self.state.unresponsive_estimate(),
            "bids collected"
        );
    }

    fn aggregate(&mut self) {
        let bid = self.auction.aggregate_bids(&mut self.state);
        self.bus
            .publish("unresponsive_mw", PubValue::Double(bid.unresponsive_qty));
        self.bus
            .publish("responsive_max_mw", PubValue::Double(bid.responsive_max_qty));
        self.bus.publish("responsive_c2", PubValue::Double(bid.c2));
        self.bus.publish("responsive_c1", PubValue::Double(bid.c1));
        self.bus
            .publish("responsive_deg", PubValue::Int(i64::from(bid.degree)));
        self.metrics.aggregates.push(AggregateMetric {
            time: self.deadlines.clear,
            bid,
        });
        debug!(
            granted = self.clock.granted(),
            unresp_mw = bid.unresponsive_qty,
            resp_max_mw = bid.responsive_max_qty,
            degree = bid.degree,
            c2 = bid.c2,
            c1 = bid.c1,
            "buyer curve aggregated"
        );
    }

    fn clear(&mut self) {
        let time = self.deadlines.clear;
        let metric = if self.config.with_market {
            let clearing = self.auction.clear(&mut self.state);
            let surplus = compute_surplus(
                &self.state.buyer,
                &self.state.seller,
                clearing.price,
                self.auction.params().price_cap,
            );
            self.bus
                .publish("clear_price", PubValue::Double(clearing.price));
            for agent in &mut self.agents {
                agent.inform_cleared_price(clearing.price);
            }
            debug!(
                granted = self.clock.granted(),
                clear_at = time,
                consumer_surplus = surplus.consumer,
                average_consumer_surplus = surplus.average_consumer,
                supplier_surplus = surplus.supplier,
                unresponsive_supplier_surplus = surplus.unresponsive_supplier,
                "surplus computed"
            );
            MarketMetric {
                time,
                price: clearing.price,
                kind: clearing.kind,
                quantity: clearing.quantity,
                marginal_quantity: clearing.marginal_quantity,
                marginal_fraction: clearing.marginal_fraction,
                buyer_count: self.state.buyer.len(),
                seller_count: self.state.seller.len(),
                lmp: self.auction.lmp(),
                refload: self.auction.refload(),
                surplus,
            }
        } else {
            let fallback = self.auction.fallback();
            MarketMetric {
                time,
                price: fallback.price,
                kind: ClearingType::Null,
                quantity: fallback.quantity,
                marginal_quantity: 0.0,
                marginal_fraction: 0.0,
                buyer_count: 0,
                seller_count: 0,
                lmp: self.auction.lmp(),
                refload: self.auction.refload(),
                surplus: Surplus::default(),
            }
        };
        self.metrics.markets.push(metric);
    }

    fn adjust(&mut self) {
        if !self.config.with_market {
            return;
        }
        let price = self.state.clearing.price;
        let mut changed = 0usize;
        for (agent, &entered) in self.agents.iter_mut().zip(&self.bidders) {
            let name = agent.name().to_string();
            self.bus
                .publish(&format!("{name}/price"), PubValue::Double(price));
            if entered && agent.apply_clearing(price) {
                changed += 1;
                self.bus.publish(
                    &format!("{name}/cooling_setpoint"),
                    PubValue::Double(agent.state().setpoint),
                );
            }
        }
        debug!(granted = self.clock.granted(), price, changed, "setpoints adjusted");
    }

    /// Metrics recorded so far.
    pub fn metrics(&self) -> &MetricsLog {
        &self.metrics
    }

    pub fn agents(&self) -> &[A] {
        &self.agents
    }

    pub fn auction(&self) -> &DoubleAuction {
        &self.auction
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Last granted bus time.
    pub fn granted(&self) -> u64 {
        self.clock.granted()
    }

    /// Consumes the scheduler, returning the bus and the metrics.
    pub fn into_parts(self) -> (B, MetricsLog) {
        (self.bus, self.metrics)
    }
}
