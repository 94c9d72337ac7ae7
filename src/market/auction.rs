//! Double-auction clearing of a buyer curve against a seller curve.

use std::fmt;

use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use super::aggregate::{AggregatedBid, aggregate_bid};
use super::curve::{Bid, CurveOrder, CurvePoint, PriceCurve};
use crate::agents::types::PriceStats;
use crate::config::MarketConfig;

/// How a market period settled.
///
/// The numeric codes (`Null = 0` .. `Buyer = 5`) appear in exported metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ClearingType {
    /// Nothing cleared.
    #[default]
    Null = 0,
    /// Must-serve (or must-sell) quantity could not be covered.
    Failure = 1,
    /// Price set between the two marginal bids.
    Price = 2,
    /// Both marginal bids agree on price and quantity.
    Exact = 3,
    /// A seller is marginal; the seller's price binds.
    Seller = 4,
    /// A buyer is marginal; the buyer's price binds.
    Buyer = 5,
}

impl ClearingType {
    /// Numeric code used in metrics output.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ClearingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "NULL",
            Self::Failure => "FAILURE",
            Self::Price => "PRICE",
            Self::Exact => "EXACT",
            Self::Seller => "SELLER",
            Self::Buyer => "BUYER",
        };
        f.pad(s)
    }
}

impl Serialize for ClearingType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Numeric parameters of the clearing algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearingParams {
    /// Maximum buyer price; bids at exactly this price are unresponsive.
    pub price_cap: f64,
    /// Step used to move a price just past a neighbouring bid.
    pub bid_offset: f64,
    /// Interpolation weight between the first seller and first buyer price
    /// when nothing clears.
    pub clearing_scalar: f64,
}

impl Default for ClearingParams {
    fn default() -> Self {
        Self {
            price_cap: 3.78,
            bid_offset: 1e-4,
            clearing_scalar: 0.5,
        }
    }
}

/// Result of clearing one market period.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Clearing {
    pub price: f64,
    pub quantity: f64,
    pub kind: ClearingType,
    /// Quantity of the partially accepted marginal bid(s).
    pub marginal_quantity: f64,
    /// `marginal_quantity` over the total quantity bid at the clearing price.
    pub marginal_fraction: f64,
    pub unresponsive_buy: f64,
    pub responsive_buy: f64,
    pub unresponsive_sell: f64,
    pub responsive_sell: f64,
}

/// Cursor state at the end of the curve walk.
#[derive(Debug)]
struct Walk {
    i: usize,
    j: usize,
    /// Buyer-side marginal price.
    a: f64,
    /// Seller-side marginal price.
    b: f64,
    /// Last step matched both sides at equal quantity.
    check: bool,
    demand: f64,
    supply: f64,
    quantity: f64,
    kind: ClearingType,
}

fn walk(buyer: &PriceCurve, seller: &PriceCurve, price_cap: f64) -> Walk {
    let bp = buyer.points();
    let sp = seller.points();
    let mut w = Walk {
        i: 0,
        j: 0,
        a: price_cap,
        b: -price_cap,
        check: false,
        demand: 0.0,
        supply: 0.0,
        quantity: 0.0,
        kind: ClearingType::Null,
    };

    while w.i < bp.len() && w.j < sp.len() && bp[w.i].price >= sp[w.j].price {
        let buy_quantity = w.demand + bp[w.i].quantity;
        let sell_quantity = w.supply + sp[w.j].quantity;
        if buy_quantity > sell_quantity {
            // seller exhausted; the buyer at i is only partly served
            w.supply = sell_quantity;
            w.quantity = sell_quantity;
            w.a = bp[w.i].price;
            w.b = w.a;
            w.j += 1;
            w.check = false;
            w.kind = ClearingType::Buyer;
        } else if buy_quantity < sell_quantity {
            // buyer exhausted; the seller at j is only partly dispatched
            w.demand = buy_quantity;
            w.quantity = buy_quantity;
            w.a = sp[w.j].price;
            w.b = w.a;
            w.i += 1;
            w.check = false;
            w.kind = ClearingType::Seller;
        } else {
            w.demand = buy_quantity;
            w.supply = buy_quantity;
            w.quantity = buy_quantity;
            w.a = bp[w.i].price;
            w.b = sp[w.j].price;
            w.i += 1;
            w.j += 1;
            w.check = true;
        }
    }
    w
}

/// Type and price after a step that matched both sides at equal quantity.
fn split_outcome(w: &Walk, buyer: &PriceCurve, seller: &PriceCurve) -> (ClearingType, f64) {
    let agreed = if w.a == w.b {
        ClearingType::Exact
    } else {
        ClearingType::Price
    };
    if w.supply == w.demand {
        return (agreed, w.a);
    }

    // quantities disagree: which side's price held at its next tick
    let buyer_held = buyer.price(w.i) == Some(w.a);
    let seller_held = seller.price(w.j) == Some(w.b);
    match (buyer_held, seller_held) {
        (false, false) if w.a == w.b => (ClearingType::Exact, w.a),
        (true, false) => (ClearingType::Buyer, w.a),
        (false, true) => (ClearingType::Seller, w.b),
        (true, true) => (w.kind, w.a),
        (false, false) => (ClearingType::Price, w.a),
    }
}

/// Price for a `Price` clearing, chosen so that no further bid would clear.
fn split_price(w: &Walk, buyer: &PriceCurve, seller: &PriceCurve, params: &ClearingParams) -> f64 {
    let cap = params.price_cap;
    let offset = params.bid_offset;
    let next_buy = buyer.price(w.i);
    let next_sell = seller.price(w.j);
    let avg = (w.a + w.b) / 2.0;
    let d_high = next_buy.unwrap_or(w.a);
    let d_low = next_sell.unwrap_or(w.b);

    if w.a == cap && w.b != -cap {
        match next_buy {
            Some(p) if p > w.b => p + offset,
            _ => w.b,
        }
    } else if w.a != cap && w.b == -cap {
        match next_sell {
            Some(p) if p < w.a => p - offset,
            _ => w.a,
        }
    } else if w.a == cap && w.b == -cap {
        match (next_buy, next_sell) {
            (None, None) => 0.0,
            (Some(p), None) => p + offset,
            (None, Some(p)) => p - offset,
            (Some(_), Some(_)) => (d_high + d_low) / 2.0,
        }
    } else if next_buy == Some(w.a) {
        w.a
    } else if next_sell == Some(w.b) {
        w.b
    } else if next_buy.is_some_and(|p| avg < p) {
        d_high + offset
    } else if next_sell.is_some_and(|p| avg > p) {
        d_low - offset
    } else {
        avg
    }
}

/// Price when at most one side has bids.
fn one_sided_price(buyer: &PriceCurve, seller: &PriceCurve, params: &ClearingParams) -> f64 {
    match (buyer.price(0), seller.price(0)) {
        (None, Some(s)) => s - params.bid_offset,
        (Some(b), None) => b + params.bid_offset,
        (Some(b), Some(s)) => s + (b - s) * params.clearing_scalar,
        (None, None) => 0.0,
    }
}

/// Marginal quantity and fraction on the binding side.
fn marginal(kind: ClearingType, price: f64, quantity: f64, buyer: &PriceCurve, seller: &PriceCurve) -> (f64, f64) {
    let (points, inframarginal): (&[CurvePoint], fn(f64, f64) -> bool) = match kind {
        ClearingType::Buyer => (buyer.points(), |p, c| p > c),
        ClearingType::Seller => (seller.points(), |p, c| p < c),
        _ => return (0.0, 0.0),
    };

    let n = points
        .iter()
        .take_while(|pt| inframarginal(pt.price, price))
        .count();
    let subtotal: f64 = points[..n].iter().map(|pt| pt.quantity).sum();
    let marginal_total: f64 = points[n..]
        .iter()
        .take_while(|pt| pt.price == price)
        .map(|pt| pt.quantity)
        .sum();

    let marginal_quantity = quantity - subtotal;
    let fraction = if marginal_total > 0.0 {
        marginal_quantity / marginal_total
    } else {
        0.0
    };
    (marginal_quantity, fraction)
}

/// Clears a descending buyer curve against an ascending seller curve.
///
/// Always produces a price, a quantity and a [`ClearingType`]; a market that
/// cannot clear is reported as `Null` or `Failure`, never as an error.
///
/// # Arguments
///
/// * `buyer` - Buyer curve in [`CurveOrder::Descending`] order
/// * `seller` - Seller curve in [`CurveOrder::Ascending`] order
/// * `params` - Price cap, nudge offset and interpolation scalar
pub fn clear_curves(buyer: &PriceCurve, seller: &PriceCurve, params: &ClearingParams) -> Clearing {
    debug_assert_eq!(buyer.order(), CurveOrder::Descending);
    debug_assert_eq!(seller.order(), CurveOrder::Ascending);
    let cap = params.price_cap;

    let mut clearing = Clearing::default();
    for pt in buyer.points() {
        if pt.price == cap {
            clearing.unresponsive_buy += pt.quantity;
        } else {
            clearing.responsive_buy += pt.quantity;
        }
    }
    for pt in seller.points() {
        if pt.price == -cap {
            clearing.unresponsive_sell += pt.quantity;
        } else {
            clearing.responsive_sell += pt.quantity;
        }
    }

    if buyer.is_empty() || seller.is_empty() {
        let missing = if seller.is_empty() { "seller" } else { "buyer" };
        warn!(missing, "market fails to clear due to a missing side");
        clearing.price = one_sided_price(buyer, seller, params);
        return clearing;
    }

    let w = walk(buyer, seller, cap);
    let mut kind = w.kind;
    let mut price = 0.0;
    if w.a == w.b {
        price = w.a;
    }
    if w.check {
        (kind, price) = split_outcome(&w, buyer, seller);
        if kind == ClearingType::Price {
            price = split_price(&w, buyer, seller, params);
        }
    }
    let quantity = w.quantity;

    if quantity == 0.0 {
        kind = ClearingType::Null;
        price = match (buyer.price(0), seller.price(0)) {
            (Some(b), Some(s)) if s == cap => b + params.bid_offset,
            (_, Some(s)) if s == -cap => s - params.bid_offset,
            _ => one_sided_price(buyer, seller, params),
        };
    } else if quantity < clearing.unresponsive_buy {
        kind = ClearingType::Failure;
        price = cap;
    } else if quantity < clearing.unresponsive_sell {
        kind = ClearingType::Failure;
        price = -cap;
    } else if quantity == clearing.unresponsive_buy && quantity == clearing.unresponsive_sell {
        // only must-serve volumes cleared
        kind = ClearingType::Price;
        price = 0.0;
    }

    let (marginal_quantity, marginal_fraction) = marginal(kind, price, quantity, buyer, seller);
    Clearing {
        price,
        quantity,
        kind,
        marginal_quantity,
        marginal_fraction,
        ..clearing
    }
}

/// Per-period market state: both curves and the period's outcome.
///
/// Created fresh at the start of each period by [`DoubleAuction::open_period`]
/// and discarded after the outcome is published.
#[derive(Debug, Clone, Default)]
pub struct MarketState {
    pub buyer: PriceCurve,
    pub seller: PriceCurve,
    /// Estimated price-insensitive load: reference load less running bidders.
    unresponsive_estimate: f64,
    pub aggregate: AggregatedBid,
    pub clearing: Clearing,
}

impl MarketState {
    /// Opens a period whose unresponsive load starts at `reference_load` (kW).
    pub fn new(reference_load: f64) -> Self {
        Self {
            unresponsive_estimate: reference_load,
            ..Self::default()
        }
    }

    /// Enters a device bid on the buyer side.
    ///
    /// A running device's quantity is removed from the unresponsive estimate;
    /// only bids with a positive price are placed on the curve.
    pub fn collect_bid(&mut self, bid: &Bid) {
        if bid.is_on {
            self.unresponsive_estimate -= bid.quantity;
        }
        if bid.price > 0.0 {
            self.buyer.add_bid(bid);
        }
    }

    /// Enters a step-wise supplier bid on the seller side.
    pub fn supplier_bid(&mut self, price: f64, quantity: f64) {
        self.seller.add_point(price, quantity, false);
    }

    /// Adds price-insensitive load to the buyer side estimate.
    pub fn add_unresponsive_load(&mut self, quantity: f64) {
        self.unresponsive_estimate += quantity;
    }

    pub fn unresponsive_estimate(&self) -> f64 {
        self.unresponsive_estimate
    }
}

/// Last successfully cleared price and quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fallback {
    pub price: f64,
    pub quantity: f64,
}

/// A single market that collects bids and clears once per period.
///
/// Holds only the reference signals and the fallback outcome across periods;
/// every per-period quantity lives in a [`MarketState`].
#[derive(Debug, Clone)]
pub struct DoubleAuction {
    name: String,
    params: ClearingParams,
    reference_quantity: f64,
    stats: PriceStats,
    lmp: f64,
    refload: f64,
    fallback: Fallback,
}

impl DoubleAuction {
    /// Creates a market from its configuration.
    ///
    /// The reference price and the fallback price start at the configured
    /// mean price.
    pub fn new(name: impl Into<String>, config: &MarketConfig) -> Self {
        Self {
            name: name.into(),
            params: ClearingParams {
                price_cap: config.price_cap,
                bid_offset: config.bid_offset,
                clearing_scalar: config.clearing_scalar,
            },
            reference_quantity: config.max_capacity_reference_bid_quantity,
            stats: PriceStats {
                mean: config.init_price,
                std_dev: config.init_stdev,
            },
            lmp: config.init_price,
            refload: 0.0,
            fallback: Fallback {
                price: config.init_price,
                quantity: 0.0,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &ClearingParams {
        &self.params
    }

    /// Historical price statistics handed to bidding agents.
    pub fn stats(&self) -> PriceStats {
        self.stats
    }

    /// Sets the wholesale reference price ($/kWh).
    pub fn set_lmp(&mut self, lmp: f64) {
        self.lmp = lmp;
    }

    pub fn lmp(&self) -> f64 {
        self.lmp
    }

    /// Sets the measured feeder load (kW).
    pub fn set_refload(&mut self, kw: f64) {
        self.refload = kw;
    }

    pub fn refload(&self) -> f64 {
        self.refload
    }

    /// Last successfully cleared outcome, or the mean price before any.
    pub fn fallback(&self) -> Fallback {
        self.fallback
    }

    /// Starts a new period with empty curves.
    pub fn open_period(&self) -> MarketState {
        MarketState::new(self.refload)
    }

    /// Adds the unresponsive block at the price cap and aggregates the buyer
    /// curve for the wholesale solver.
    pub fn aggregate_bids(&self, state: &mut MarketState) -> AggregatedBid {
        let unresp = state.unresponsive_estimate;
        if unresp > 0.0 {
            state.buyer.add_point(self.params.price_cap, unresp, true);
        } else {
            warn!(
                market = %self.name,
                unresp,
                buy_count = state.buyer.len(),
                buy_total = state.buyer.total(),
                buy_on = state.buyer.total_on(),
                buy_off = state.buyer.total_off(),
                "unresponsive load estimate is not positive"
            );
        }
        state.buyer.set_order(CurveOrder::Descending);
        state.aggregate = aggregate_bid(&state.buyer);
        state.aggregate
    }

    /// Adds the reference seller and clears the period.
    ///
    /// The outcome is stored in `state.clearing` and also returned.
    pub fn clear(&mut self, state: &mut MarketState) -> Clearing {
        if self.reference_quantity > 0.0 {
            state
                .seller
                .add_point(self.lmp, self.reference_quantity, true);
        }
        state.seller.set_order(CurveOrder::Ascending);
        state.buyer.set_order(CurveOrder::Descending);

        let clearing = clear_curves(&state.buyer, &state.seller, &self.params);
        state.clearing = clearing;

        if !matches!(clearing.kind, ClearingType::Null | ClearingType::Failure) {
            self.fallback = Fallback {
                price: clearing.price,
                quantity: clearing.quantity,
            };
        }

        debug!(
            market = %self.name,
            kind = %clearing.kind,
            quantity = clearing.quantity,
            price = clearing.price,
            buy_count = state.buyer.len(),
            buy_unresp = clearing.unresponsive_buy,
            buy_resp = clearing.responsive_buy,
            sell_count = state.seller.len(),
            sell_unresp = clearing.unresponsive_sell,
            sell_resp = clearing.responsive_sell,
            marginal_quantity = clearing.marginal_quantity,
            marginal_fraction = clearing.marginal_fraction,
            lmp = self.lmp,
            refload = self.refload,
            "market cleared"
        );
        clearing
    }
}
