//! Post-hoc market KPIs computed from recorded period outcomes.

use std::fmt;

use super::types::MarketMetric;
use crate::market::auction::ClearingType;

/// Aggregate indicators over every cleared period of a run.
///
/// Computed after the run from the `MarketMetric` records so the report
/// always agrees with the exported metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketKpi {
    /// Number of recorded periods.
    pub periods: usize,
    /// Mean clearing price ($/kWh).
    pub mean_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    /// Periods per clearing type, indexed by type code.
    pub type_counts: [usize; 6],
    /// Mean cleared quantity (kW).
    pub mean_quantity: f64,
    /// Sum of consumer surplus over all periods.
    pub total_consumer_surplus: f64,
    /// Sum of supplier surplus over all periods.
    pub total_supplier_surplus: f64,
}

impl MarketKpi {
    /// Computes all KPIs from the complete period record.
    ///
    /// An empty record yields all zeros.
    pub fn from_metrics(metrics: &[MarketMetric]) -> Self {
        let mut type_counts = [0usize; 6];
        if metrics.is_empty() {
            return Self {
                periods: 0,
                mean_price: 0.0,
                min_price: 0.0,
                max_price: 0.0,
                type_counts,
                mean_quantity: 0.0,
                total_consumer_surplus: 0.0,
                total_supplier_surplus: 0.0,
            };
        }

        let n = metrics.len() as f64;
        let mut price_sum = 0.0;
        let mut quantity_sum = 0.0;
        let mut min_price = f64::INFINITY;
        let mut max_price = f64::NEG_INFINITY;
        let mut cs = 0.0;
        let mut ss = 0.0;
        for m in metrics {
            price_sum += m.price;
            quantity_sum += m.quantity;
            min_price = min_price.min(m.price);
            max_price = max_price.max(m.price);
            cs += m.surplus.consumer;
            ss += m.surplus.supplier;
            type_counts[usize::from(m.kind.code())] += 1;
        }

        Self {
            periods: metrics.len(),
            mean_price: price_sum / n,
            min_price,
            max_price,
            type_counts,
            mean_quantity: quantity_sum / n,
            total_consumer_surplus: cs,
            total_supplier_surplus: ss,
        }
    }

    /// Number of periods that settled with `kind`.
    pub fn count(&self, kind: ClearingType) -> usize {
        self.type_counts[usize::from(kind.code())]
    }
}

impl fmt::Display for MarketKpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Market KPI Report ---")?;
        writeln!(f, "Periods:               {}", self.periods)?;
        writeln!(
            f,
            "Clearing price:        {:.5} $/kWh (min {:.5}, max {:.5})",
            self.mean_price, self.min_price, self.max_price
        )?;
        writeln!(f, "Mean cleared quantity: {:.2} kW", self.mean_quantity)?;
        writeln!(
            f,
            "Clearing types:        NULL {} | FAILURE {} | PRICE {} | EXACT {} | SELLER {} | BUYER {}",
            self.type_counts[0],
            self.type_counts[1],
            self.type_counts[2],
            self.type_counts[3],
            self.type_counts[4],
            self.type_counts[5]
        )?;
        writeln!(f, "Consumer surplus:      {:.4}", self.total_consumer_surplus)?;
        write!(f, "Supplier surplus:      {:.4}", self.total_supplier_surplus)
    }
}
