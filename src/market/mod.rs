//! Retail double-auction market: bid curves, aggregation and clearing.

/// Buyer-curve compression for the wholesale solver.
pub mod aggregate;
/// Period clearing and the market that drives it.
pub mod auction;
/// Ordered price/quantity curves.
pub mod curve;
pub mod surplus;

pub use aggregate::{AggregatedBid, aggregate_bid};
pub use auction::{Clearing, ClearingParams, ClearingType, DoubleAuction, Fallback, MarketState, clear_curves};
pub use curve::{Bid, CurveOrder, CurvePoint, PriceCurve};
pub use surplus::{Surplus, compute_surplus};
