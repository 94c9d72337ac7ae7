//! Scheduler runs against the in-memory scripted bus.

mod common;

use common::{FixedAgent, controller, market_config, sim_config};
use transactive_sim::agents::ThermostatAgent;
use transactive_sim::error::BusError;
use transactive_sim::market::{Bid, ClearingType, DoubleAuction};
use transactive_sim::sim::{CoSimBus, MetricsLog, PeriodScheduler, PubValue, ScriptedBus};

fn agents() -> Vec<FixedAgent> {
    vec![
        FixedAgent::new("h1", "m0", Some(Bid::new(0.1, 3.0, true))),
        FixedAgent::new("h2", "m0", Some(Bid::new(0.08, 3.0, true))),
    ]
}

fn feed() -> ScriptedBus {
    ScriptedBus::new()
        .with_input(0, "LMP", "0.05")
        .with_input(0, "refload", "+100+0j kVA")
}

fn scheduler<A: transactive_sim::agents::BiddingAgent>(
    bus: ScriptedBus,
    agents: Vec<A>,
    time_stop: u64,
    with_market: bool,
) -> PeriodScheduler<ScriptedBus, A> {
    let auction = DoubleAuction::new("Market_1", &market_config());
    let metrics = MetricsLog::new("Market_1", "kW", "2013-07-01 00:00:00");
    PeriodScheduler::new(sim_config(time_stop, with_market), auction, agents, bus, metrics)
}

#[test]
fn wakes_at_every_deadline_in_order() {
    let mut s = scheduler(feed(), agents(), 600, true);
    assert_eq!(s.run(), Ok(()));
    assert_eq!(s.bus().requests(), &[270, 300, 570, 600]);
    assert_eq!(s.granted(), 600);

    let times: Vec<u64> = s.metrics().markets.iter().map(|m| m.time).collect();
    assert_eq!(times, [300, 600]);
    let bid_times: Vec<u64> = s.metrics().agents.iter().map(|m| m.time).collect();
    assert_eq!(bid_times, [300, 300, 600, 600]);
    assert_eq!(s.metrics().aggregates.len(), 2);
}

#[test]
fn clears_against_the_reference_seller() {
    let mut s = scheduler(feed(), agents(), 600, true);
    s.run().ok();
    for m in &s.metrics().markets {
        assert_eq!(m.kind, ClearingType::Seller);
        assert_eq!(m.price, 0.05);
        assert_eq!(m.quantity, 100.0);
        assert_eq!(m.buyer_count, 3);
        assert_eq!(m.seller_count, 1);
        assert!((m.surplus.consumer - 0.24).abs() < 1e-9);
    }
    for agent in s.agents() {
        assert_eq!(agent.informed, [0.05, 0.05]);
        assert_eq!(agent.cleared, [0.05, 0.05]);
    }
}

#[test]
fn publishes_defaults_aggregate_and_prices() {
    let mut s = scheduler(feed(), agents(), 600, true);
    s.run().ok();
    let bus = s.bus();

    // one bill per meter, deadband and heating setpoint per agent
    assert_eq!(bus.published().iter().filter(|p| p.topic.ends_with("/bill_mode")).count(), 1);
    assert_eq!(bus.published_to("h1/monthly_fee").count(), 1);
    assert_eq!(bus.published_to("h2/thermostat_deadband").count(), 1);
    let heating: Vec<_> = bus.published_to("h2/heating_setpoint").collect();
    assert_eq!(heating.len(), 1);
    assert_eq!(heating[0].value, PubValue::Double(60.0));

    let deg: Vec<_> = bus.published_to("responsive_deg").collect();
    assert_eq!(deg.len(), 2);
    assert_eq!((deg[0].time, &deg[0].value), (270, &PubValue::Int(1)));
    let unresp = bus.published_to("unresponsive_mw").next().and_then(|p| p.value.as_f64());
    assert!(unresp.is_some_and(|q| (q - 0.094).abs() < 1e-12));

    let prices: Vec<(u64, Option<f64>)> = bus
        .published_to("clear_price")
        .map(|p| (p.time, p.value.as_f64()))
        .collect();
    assert_eq!(prices, [(300, Some(0.05)), (600, Some(0.05))]);
    assert_eq!(bus.published_to("h2/price").count(), 2);

    // schedule at the first tick, then one adjustment per period
    let setpoints: Vec<(u64, Option<f64>)> = bus
        .published_to("h1/cooling_setpoint")
        .map(|p| (p.time, p.value.as_f64()))
        .collect();
    assert_eq!(setpoints, [(270, Some(78.0)), (300, Some(79.0)), (600, Some(79.0))]);
}

#[test]
fn early_grant_runs_no_phase() {
    let mut s = scheduler(feed().with_interrupt(100).with_interrupt(285), agents(), 600, true);
    assert_eq!(s.run(), Ok(()));
    assert_eq!(s.bus().requests(), &[270, 270, 300, 300, 570, 600]);
    assert_eq!(s.metrics().markets.len(), 2);
    // inputs and defaults are handled at the first grant, whatever its time
    let first = &s.bus().published()[0];
    assert_eq!(first.time, 100);
    assert!(s.agents()[0].readings.is_empty());
}

#[test]
fn disconnect_is_fatal_but_keeps_partial_metrics() {
    let mut s = scheduler(feed().with_disconnect_at(570), agents(), 900, true);
    assert_eq!(s.run(), Err(BusError::Disconnected { at: 570 }));
    assert_eq!(s.metrics().markets.len(), 1);
    assert_eq!(s.metrics().agents.len(), 2);
    let (_, metrics) = s.into_parts();
    assert_eq!(metrics.markets[0].time, 300);
}

#[test]
fn no_market_records_bids_and_fallback_only() {
    let mut s = scheduler(feed(), agents(), 600, false);
    assert_eq!(s.run(), Ok(()));
    assert_eq!(s.metrics().agents.len(), 4);
    for m in &s.metrics().markets {
        assert_eq!(m.kind, ClearingType::Null);
        assert_eq!(m.price, market_config().init_price);
        assert_eq!(m.surplus.consumer, 0.0);
    }
    assert_eq!(s.bus().published_to("clear_price").count(), 0);
    assert!(!s.bus().published().iter().any(|p| p.topic.ends_with("/price")));
    for agent in s.agents() {
        assert!(agent.informed.is_empty());
        assert!(agent.cleared.is_empty());
    }
}

#[test]
fn rejected_input_keeps_last_value() {
    let bus = feed()
        .with_input(280, "LMP", "n/a")
        .with_input(280, "refload", "")
        .with_input(280, "unknown#Topic", "1.0");
    let mut s = scheduler(bus, agents(), 600, true);
    assert_eq!(s.run(), Ok(()));
    assert_eq!(s.auction().lmp(), 0.05);
    assert_eq!(s.auction().refload(), 100.0);
    assert_eq!(s.metrics().markets[1].price, 0.05);
}

#[test]
fn agent_readings_are_routed_by_topic() {
    let bus = feed()
        .with_input(0, "h2#Tair", "77.5 degF")
        .with_input(0, "h2#On", "OFF")
        .with_input(0, "h2#Load", "-1.0");
    let mut s = scheduler(bus, agents(), 300, true);
    s.run().ok();
    assert!(s.agents()[0].readings.is_empty());
    // the negative load is rejected at ingestion
    assert_eq!(s.agents()[1].readings.len(), 2);
}

#[test]
fn thermostat_setpoint_follows_cleared_price() {
    let bus = feed()
        .with_input(0, "h1#Tair", "86.0 degF")
        .with_input(0, "h1#On", "ON");
    let auction_stats = DoubleAuction::new("Market_1", &market_config()).stats();
    let agents = vec![ThermostatAgent::new("h1", &controller(), auction_stats)];
    let mut s = scheduler(bus, agents, 300, true);
    assert_eq!(s.run(), Ok(()));

    let bids = &s.metrics().agents;
    assert_eq!(bids.len(), 1);
    // night basepoint 74, twelve degrees warm
    assert!((bids[0].bid_price - 0.08).abs() < 1e-12);

    let setpoints: Vec<Option<f64>> = s
        .bus()
        .published_to("h1/cooling_setpoint")
        .map(|p| p.value.as_f64())
        .collect();
    assert_eq!(setpoints, [Some(74.0), Some(76.0)]);
}

/// Bus that grants a fixed sequence of times regardless of the request.
struct RewindBus {
    grants: Vec<u64>,
}

impl CoSimBus for RewindBus {
    fn request_time(&mut self, next: u64) -> Result<u64, BusError> {
        if self.grants.is_empty() {
            Err(BusError::Timeout { requested: next })
        } else {
            Ok(self.grants.remove(0))
        }
    }

    fn updated_inputs(&mut self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn publish(&mut self, _topic: &str, _value: PubValue) {}
}

#[test]
fn backwards_grant_is_a_time_regression() {
    let auction = DoubleAuction::new("Market_1", &market_config());
    let metrics = MetricsLog::new("Market_1", "kW", "");
    let bus = RewindBus { grants: vec![270, 100] };
    let mut s = PeriodScheduler::new(sim_config(600, true), auction, agents(), bus, metrics);
    assert_eq!(s.step(), Ok(270));
    assert_eq!(
        s.step(),
        Err(BusError::TimeRegression {
            granted: 100,
            previous: 270
        })
    );
}

#[test]
fn missing_grant_times_out() {
    let auction = DoubleAuction::new("Market_1", &market_config());
    let metrics = MetricsLog::new("Market_1", "kW", "");
    let bus = RewindBus { grants: Vec::new() };
    let mut s = PeriodScheduler::new(sim_config(600, true), auction, agents(), bus, metrics);
    assert_eq!(s.run(), Err(BusError::Timeout { requested: 270 }));
    assert!(s.metrics().markets.is_empty());
}
