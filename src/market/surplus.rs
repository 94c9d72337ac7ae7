//! Consumer and supplier surplus of a cleared period.

use serde::Serialize;
use tracing::warn;

use super::curve::PriceCurve;

/// Surplus figures for one cleared period ($/h at kW quantities).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Surplus {
    /// `Σ (p - P)·q` over responsive buyers priced at or above the clearing price.
    pub consumer: f64,
    /// `consumer` divided by the number of those buyers.
    pub average_consumer: f64,
    /// Supplier surplus earned serving responsive load.
    pub supplier: f64,
    /// Supplier surplus earned serving unresponsive load.
    pub unresponsive_supplier: f64,
}

/// Computes surplus at `price` for a descending buyer curve and an ascending
/// seller curve.
///
/// Every buyer priced at or above `price` is granted. Sellers priced at or
/// below `price` are dispatched in order, serving the granted unresponsive
/// quantity first and the responsive quantity after it.
pub fn compute_surplus(buyer: &PriceCurve, seller: &PriceCurve, price: f64, price_cap: f64) -> Surplus {
    let mut surplus = Surplus::default();
    let mut granted_unresp = 0.0;
    let mut granted_resp = 0.0;
    let mut responsive_count = 0usize;

    for pt in buyer.points().iter().filter(|pt| pt.price >= price) {
        if pt.price == price_cap {
            granted_unresp += pt.quantity;
        } else {
            granted_resp += pt.quantity;
            responsive_count += 1;
            surplus.consumer += (pt.price - price) * pt.quantity;
        }
    }
    if responsive_count > 0 {
        surplus.average_consumer = surplus.consumer / responsive_count as f64;
    }

    for pt in seller.points().iter().filter(|pt| pt.price <= price) {
        let margin = price - pt.price;

        let to_unresp = pt.quantity.min(granted_unresp);
        surplus.unresponsive_supplier += margin * to_unresp;
        granted_unresp -= to_unresp;

        let to_resp = (pt.quantity - to_unresp).min(granted_resp);
        surplus.supplier += margin * to_resp;
        granted_resp -= to_resp;

        if granted_unresp == 0.0 && granted_resp == 0.0 {
            break;
        }
    }

    if granted_resp != 0.0 {
        warn!(excess = granted_resp, "cleared more responsive quantity than supplied");
    }
    surplus
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::market::curve::CurveOrder;

    const CAP: f64 = 3.78;

    fn curves(buys: &[(f64, f64)], sells: &[(f64, f64)]) -> (PriceCurve, PriceCurve) {
        let mut buyer = PriceCurve::new();
        for &(p, q) in buys {
            buyer.add_point(p, q, true);
        }
        let mut seller = PriceCurve::new();
        for &(p, q) in sells {
            seller.add_point(p, q, false);
        }
        seller.set_order(CurveOrder::Ascending);
        (buyer, seller)
    }

    #[test]
    fn consumer_surplus_counts_responsive_buyers_only() {
        let (buyer, seller) = curves(&[(CAP, 10.0), (0.10, 2.0), (0.06, 4.0), (0.02, 5.0)], &[]);
        let s = compute_surplus(&buyer, &seller, 0.05, CAP);
        // (0.10 - 0.05) * 2 + (0.06 - 0.05) * 4
        assert_abs_diff_eq!(s.consumer, 0.14, epsilon = 1e-12);
        assert_abs_diff_eq!(s.average_consumer, 0.07, epsilon = 1e-12);
    }

    #[test]
    fn unresponsive_load_is_served_first() {
        let (buyer, seller) = curves(&[(CAP, 10.0), (0.10, 5.0)], &[(0.02, 12.0), (0.04, 10.0)]);
        let s = compute_surplus(&buyer, &seller, 0.05, CAP);
        // first seller: 10 kW to unresponsive, 2 kW to responsive
        assert_abs_diff_eq!(s.unresponsive_supplier, 0.03 * 10.0, epsilon = 1e-12);
        // remaining 3 kW of responsive load from the second seller
        assert_abs_diff_eq!(s.supplier, 0.03 * 2.0 + 0.01 * 3.0, epsilon = 1e-12);
    }

    #[test]
    fn sellers_above_price_earn_nothing() {
        let (buyer, seller) = curves(&[(0.10, 5.0)], &[(0.20, 10.0)]);
        let s = compute_surplus(&buyer, &seller, 0.05, CAP);
        assert_eq!(s.supplier, 0.0);
        assert_eq!(s.unresponsive_supplier, 0.0);
    }

    #[test]
    fn empty_curves_have_zero_surplus() {
        let s = compute_surplus(&PriceCurve::new(), &PriceCurve::new(), 0.05, CAP);
        assert_eq!(s, Surplus::default());
    }
}
