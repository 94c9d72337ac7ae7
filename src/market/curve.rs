//! Ordered price/quantity curves used for both sides of the auction.

/// A single price/quantity bid submitted to the market.
///
/// `quantity` is the real power (kW) the bidder would consume (buyer side) or
/// supply (seller side) if it clears; `is_on` is the bidder's current
/// commitment state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bid {
    /// Bid price ($/kWh).
    pub price: f64,
    /// Bid quantity (kW).
    pub quantity: f64,
    /// Whether the bidding device is currently running.
    pub is_on: bool,
}

impl Bid {
    /// Creates a new bid.
    pub fn new(price: f64, quantity: f64, is_on: bool) -> Self {
        Self {
            price,
            quantity,
            is_on,
        }
    }
}

/// Direction of the price ordering of a [`PriceCurve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurveOrder {
    /// Highest price first (buyer convention).
    #[default]
    Descending,
    /// Lowest price first (seller convention).
    Ascending,
}

/// One step of a price curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub price: f64,
    pub quantity: f64,
}

/// An ordered sequence of price/quantity steps with running totals.
///
/// Points are inserted one at a time by scanning for the first position whose
/// price the new price meets or exceeds, so a later bid at an existing price
/// lands *before* earlier bids at that price. This LIFO order inside a price
/// level decides which unit is marginal and is relied upon by the clearing
/// logic.
///
/// # Examples
///
/// ```
/// use transactive_sim::market::curve::{CurveOrder, PriceCurve};
///
/// let mut curve = PriceCurve::new();
/// curve.add_point(0.02, 3.0, true);
/// curve.add_point(0.05, 2.0, false);
/// curve.add_point(0.0, 0.0, true); // zero quantity: ignored
///
/// assert_eq!(curve.len(), 2);
/// assert_eq!(curve.price(0), Some(0.05));
///
/// curve.set_order(CurveOrder::Ascending);
/// assert_eq!(curve.price(0), Some(0.02));
/// assert_eq!(curve.total(), 5.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceCurve {
    points: Vec<CurvePoint>,
    order: CurveOrder,
    total: f64,
    total_on: f64,
    total_off: f64,
}

impl PriceCurve {
    /// Creates an empty curve in descending order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a bid to the curve, keeping the current price order.
    ///
    /// A zero quantity is a no-op: totals are untouched and nothing is
    /// inserted.
    ///
    /// # Arguments
    ///
    /// * `price` - Bid price
    /// * `quantity` - Bid quantity
    /// * `is_on` - Commitment state; selects `total_on` or `total_off`
    pub fn add_point(&mut self, price: f64, quantity: f64, is_on: bool) {
        if quantity == 0.0 {
            return;
        }
        self.total += quantity;
        if is_on {
            self.total_on += quantity;
        } else {
            self.total_off += quantity;
        }

        let len = self.points.len();
        let index = match self.order {
            CurveOrder::Descending => self
                .points
                .iter()
                .position(|p| price >= p.price)
                .unwrap_or(len),
            // mirror image of the descending scan, so reordering later gives
            // the same sequence as if the point had been added before
            CurveOrder::Ascending => {
                len - self
                    .points
                    .iter()
                    .rev()
                    .position(|p| price >= p.price)
                    .unwrap_or(len)
            }
        };
        self.points.insert(index, CurvePoint { price, quantity });
    }

    /// Adds a [`Bid`] to the curve.
    pub fn add_bid(&mut self, bid: &Bid) {
        self.add_point(bid.price, bid.quantity, bid.is_on);
    }

    /// Puts the curve in the requested price order, reversing it in place if
    /// it is currently in the opposite order. Idempotent.
    pub fn set_order(&mut self, order: CurveOrder) {
        if self.order != order {
            self.points.reverse();
            self.order = order;
        }
    }

    /// Current price order.
    pub fn order(&self) -> CurveOrder {
        self.order
    }

    /// Number of points on the curve.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` when no point has been added.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Price of the point at `index`, if any.
    pub fn price(&self, index: usize) -> Option<f64> {
        self.points.get(index).map(|p| p.price)
    }

    /// Quantity of the point at `index`, if any.
    pub fn quantity(&self, index: usize) -> Option<f64> {
        self.points.get(index).map(|p| p.quantity)
    }

    /// All points in the current order.
    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    /// Points in descending price order, regardless of the current order.
    pub fn descending(&self) -> Box<dyn Iterator<Item = &CurvePoint> + '_> {
        match self.order {
            CurveOrder::Descending => Box::new(self.points.iter()),
            CurveOrder::Ascending => Box::new(self.points.iter().rev()),
        }
    }

    /// Sum of all quantities added.
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Sum of quantities added with `is_on == true`.
    pub fn total_on(&self) -> f64 {
        self.total_on
    }

    /// Sum of quantities added with `is_on == false`.
    pub fn total_off(&self) -> f64 {
        self.total_off
    }
}
