//! Compression of the buyer curve into an unresponsive block plus a fitted
//! zero-intercept cost curve, as submitted to the wholesale solver.

use serde::Serialize;

use super::curve::PriceCurve;

/// Scale from $/kWh to $/MWh applied to bid prices before fitting.
pub const PRICE_SCALE: f64 = 1000.0;

/// Scale from kW to MW applied to bid quantities before fitting.
pub const QUANTITY_SCALE: f64 = 0.001;

/// Aggregated demand bid in wholesale units (MW, $/MWh).
///
/// The responsive part is `cost(q) = c2·q² + c1·q` for `0 <= q <= responsive_max_qty`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AggregatedBid {
    /// Quantity bid at the single highest price level (MW).
    pub unresponsive_qty: f64,
    /// Cumulative quantity of all remaining bids (MW).
    pub responsive_max_qty: f64,
    /// Degree of the fitted polynomial: 0, 1 or 2.
    pub degree: u8,
    /// Quadratic coefficient.
    pub c2: f64,
    /// Linear coefficient.
    pub c1: f64,
}

/// Aggregates a buyer curve into an [`AggregatedBid`].
///
/// The curve is read highest price first. All points tied at the top price are
/// the unresponsive block; the remaining points form the responsive block,
/// whose running cost `Σ p·q` is fitted by least squares against running
/// quantity with a zero intercept:
///
/// * no responsive points: degree 0, all coefficients zero
/// * one or two points: degree 1 on `[q]`
/// * three or more points: degree 2 on `[q², q]`
///
/// An empty curve yields `AggregatedBid::default()`.
pub fn aggregate_bid(curve: &PriceCurve) -> AggregatedBid {
    let points: Vec<(f64, f64)> = curve
        .descending()
        .map(|p| (PRICE_SCALE * p.price, QUANTITY_SCALE * p.quantity))
        .collect();

    let Some(&(top_price, _)) = points.first() else {
        return AggregatedBid::default();
    };

    let split = points.iter().take_while(|(p, _)| *p == top_price).count();
    let unresponsive_qty: f64 = points[..split].iter().map(|(_, q)| q).sum();

    let responsive = &points[split..];
    if responsive.is_empty() {
        return AggregatedBid {
            unresponsive_qty,
            ..AggregatedBid::default()
        };
    }

    let mut q_cum = Vec::with_capacity(responsive.len());
    let mut cost_cum = Vec::with_capacity(responsive.len());
    let (mut q_run, mut cost_run) = (0.0, 0.0);
    for &(p, q) in responsive {
        q_run += q;
        cost_run += p * q;
        q_cum.push(q_run);
        cost_cum.push(cost_run);
    }

    let (degree, c2, c1) = if responsive.len() <= 2 {
        (1, 0.0, fit_linear(&q_cum, &cost_cum))
    } else {
        match fit_quadratic(&q_cum, &cost_cum) {
            Some((c2, c1)) => (2, c2, c1),
            None => (1, 0.0, fit_linear(&q_cum, &cost_cum)),
        }
    };

    AggregatedBid {
        unresponsive_qty,
        responsive_max_qty: q_run,
        degree,
        c2,
        c1,
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Least squares of `y ≈ c1·x`.
fn fit_linear(x: &[f64], y: &[f64]) -> f64 {
    let xx = dot(x, x);
    if xx > 0.0 { dot(x, y) / xx } else { 0.0 }
}

/// Least squares of `y ≈ c2·x² + c1·x` via a two-column Gram-Schmidt QR.
///
/// Returns `None` when the columns are numerically dependent.
fn fit_quadratic(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let a: Vec<f64> = x.iter().map(|v| v * v).collect();

    let r11 = dot(&a, &a).sqrt();
    if r11 <= 0.0 {
        return None;
    }
    let qa: Vec<f64> = a.iter().map(|v| v / r11).collect();
    let r12 = dot(&qa, x);
    let residual: Vec<f64> = x.iter().zip(&qa).map(|(b, q)| b - r12 * q).collect();
    let r22 = dot(&residual, &residual).sqrt();
    if r22 <= f64::EPSILON * dot(x, x).sqrt() {
        return None;
    }
    let qb: Vec<f64> = residual.iter().map(|v| v / r22).collect();

    let c1 = dot(&qb, y) / r22;
    let c2 = (dot(&qa, y) - r12 * c1) / r11;
    Some((c2, c1))
}
