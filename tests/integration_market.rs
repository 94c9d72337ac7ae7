//! Market clearing scenarios and curve properties through the public API.

mod common;

use approx::assert_abs_diff_eq;
use rstest::rstest;

use common::{CAP, controller, curves, market_config, params};
use transactive_sim::agents::{BiddingAgent, PriceStats, Reading, ThermostatAgent};
use transactive_sim::market::aggregate::QUANTITY_SCALE;
use transactive_sim::market::{
    Bid, ClearingType, CurveOrder, DoubleAuction, PriceCurve, aggregate_bid, clear_curves, compute_surplus,
};

#[test]
fn scenario_a_seller_marginal() {
    let (buyer, seller) = curves(&[(10.0, 5.0)], &[(5.0, 1000.0)]);
    let c = clear_curves(&buyer, &seller, &params());
    assert_eq!(c.kind, ClearingType::Seller);
    assert_eq!(c.quantity, 5.0);
    assert_eq!(c.price, 5.0);
}

#[test]
fn scenario_b_empty_buyer_is_null_below_seller() {
    let (buyer, seller) = curves(&[], &[(5.0, 100.0)]);
    let c = clear_curves(&buyer, &seller, &params());
    assert_eq!(c.kind, ClearingType::Null);
    assert_eq!(c.quantity, 0.0);
    assert_abs_diff_eq!(c.price, 5.0 - params().bid_offset, epsilon = 1e-12);
}

#[test]
fn scenario_c_must_serve_shortfall_fails_at_cap() {
    let (buyer, seller) = curves(&[(CAP, 100.0)], &[(0.03, 50.0)]);
    let c = clear_curves(&buyer, &seller, &params());
    assert_eq!(c.kind, ClearingType::Failure);
    assert_eq!(c.price, CAP);
    assert_eq!(c.unresponsive_buy, 100.0);
}

#[test]
fn scenario_c_through_the_auction() {
    let cfg = transactive_sim::config::MarketConfig {
        max_capacity_reference_bid_quantity: 50.0,
        ..market_config()
    };
    let mut auction = DoubleAuction::new("m", &cfg);
    auction.set_refload(100.0);
    let mut state = auction.open_period();
    auction.aggregate_bids(&mut state);
    let c = auction.clear(&mut state);
    assert_eq!(c.kind, ClearingType::Failure);
    assert_eq!(c.price, cfg.price_cap);
    // a failed period leaves the fallback untouched
    assert_eq!(auction.fallback().price, cfg.init_price);
}

#[test]
fn scenario_d_zero_spread_never_adjusts() {
    let stats = PriceStats {
        mean: 0.02,
        std_dev: 0.0,
    };
    let mut agent = ThermostatAgent::new("hvac", &controller(), stats);
    agent.update_schedule(12.0, 0);
    let before = agent.state().setpoint;
    for price in [0.0, 0.01, 0.02, 0.5, 3.78] {
        assert!(!agent.apply_clearing(price));
        assert_eq!(agent.state().setpoint, before);
    }
}

#[test]
fn scenario_e_schedule_change_reported_once_per_day_part() {
    let mut agent = ThermostatAgent::new("hvac", &controller(), PriceStats { mean: 0.02, std_dev: 0.01 });
    assert!(agent.update_schedule(9.0, 2));
    assert!(!agent.update_schedule(9.5, 2));
    assert!(!agent.update_schedule(16.9, 2));
    assert!(agent.update_schedule(17.0, 2));
}

#[test]
fn single_point_match_is_exact() {
    let (buyer, seller) = curves(&[(0.05, 40.0)], &[(0.05, 40.0)]);
    let c = clear_curves(&buyer, &seller, &params());
    assert_eq!(c.kind, ClearingType::Exact);
    assert_eq!(c.quantity, 40.0);
    assert_eq!(c.price, 0.05);
}

#[rstest]
#[case::buyer_short(&[(0.08, 10.0)], &[(0.03, 50.0)], 10.0)]
#[case::seller_short(&[(0.08, 50.0)], &[(0.03, 10.0)], 10.0)]
#[case::stacked(&[(0.09, 5.0), (0.07, 5.0), (0.02, 5.0)], &[(0.03, 8.0), (0.06, 20.0)], 10.0)]
fn cleared_quantity_never_exceeds_either_side(
    #[case] buys: &[(f64, f64)],
    #[case] sells: &[(f64, f64)],
    #[case] expected: f64,
) {
    let (buyer, seller) = curves(buys, sells);
    let c = clear_curves(&buyer, &seller, &params());
    assert_abs_diff_eq!(c.quantity, expected, epsilon = 1e-12);
    assert!(c.quantity <= buyer.total() && c.quantity <= seller.total());
}

#[test]
fn curve_totals_and_ordering_hold_after_mixed_inserts() {
    let mut curve = PriceCurve::new();
    let points = [(0.05, 3.0, true), (0.01, 2.0, false), (0.09, 1.5, true), (0.05, 4.0, false), (0.0, 0.0, true)];
    for (p, q, on) in points {
        curve.add_point(p, q, on);
    }
    assert_abs_diff_eq!(curve.total(), curve.total_on() + curve.total_off(), epsilon = 1e-12);

    let prices: Vec<f64> = curve.points().iter().map(|pt| pt.price).collect();
    assert!(prices.windows(2).all(|w| w[0] >= w[1]));

    curve.set_order(CurveOrder::Ascending);
    let once = curve.clone();
    curve.set_order(CurveOrder::Ascending);
    assert_eq!(curve, once);
    let prices: Vec<f64> = curve.points().iter().map(|pt| pt.price).collect();
    assert!(prices.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn aggregation_conserves_quantity() {
    let mut curve = PriceCurve::new();
    curve.add_point(3.78, 120.0, true);
    for (k, q) in [2.5, 3.0, 3.5, 4.0, 2.0].into_iter().enumerate() {
        curve.add_point(0.01 + 0.01 * k as f64, q, k % 2 == 0);
    }
    let agg = aggregate_bid(&curve);
    assert_eq!(agg.degree, 2);
    assert_abs_diff_eq!(
        agg.unresponsive_qty + agg.responsive_max_qty,
        curve.total() * QUANTITY_SCALE,
        epsilon = 1e-9
    );
}

#[test]
fn full_period_with_thermostats() {
    let mut auction = DoubleAuction::new("Market_1", &market_config());
    auction.set_lmp(0.025);
    auction.set_refload(100.0);

    let mut agents: Vec<ThermostatAgent> = (0..3)
        .map(|i| ThermostatAgent::new(format!("h{i}"), &controller(), auction.stats()))
        .collect();
    for (i, agent) in agents.iter_mut().enumerate() {
        agent.update_schedule(12.0, 0);
        agent.apply_reading(Reading::AirTemperature(86.0 + 2.0 * i as f64));
        agent.apply_reading(Reading::Running(true));
    }

    let mut state = auction.open_period();
    for agent in &mut agents {
        if let Some(bid) = agent.formulate_bid() {
            state.collect_bid(&bid);
        }
    }
    assert_abs_diff_eq!(state.unresponsive_estimate(), 91.0, epsilon = 1e-12);

    let agg = auction.aggregate_bids(&mut state);
    assert_abs_diff_eq!(agg.unresponsive_qty, 0.091, epsilon = 1e-12);

    let c = auction.clear(&mut state);
    assert_eq!(c.kind, ClearingType::Seller);
    assert_eq!(c.price, 0.025);
    assert_abs_diff_eq!(c.quantity, 100.0, epsilon = 1e-9);
    assert_eq!(auction.fallback().price, 0.025);

    let s = compute_surplus(&state.buyer, &state.seller, c.price, auction.params().price_cap);
    assert!(s.consumer > 0.0);
    assert_eq!(s.supplier, 0.0);

    // the 0.02 mean is below the cleared price, so every setpoint moves up
    for agent in &mut agents {
        assert!(agent.apply_clearing(c.price));
        assert!(agent.state().setpoint > agent.state().basepoint);
    }
}

#[test]
fn zero_price_bid_still_reduces_unresponsive_estimate() {
    let auction = DoubleAuction::new("m", &market_config());
    let mut state = auction.open_period();
    state.add_unresponsive_load(10.0);
    state.collect_bid(&Bid::new(0.0, 3.0, true));
    assert!(state.buyer.is_empty());
    assert_eq!(state.unresponsive_estimate(), 7.0);
}
