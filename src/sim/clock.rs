//! Period deadlines and the wall clock derived from granted bus time.

use time::{Duration, PrimitiveDateTime};

/// Phases of one market period, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Agents formulate bids.
    Bid,
    /// The buyer curve is aggregated and published.
    Aggregate,
    /// The market clears.
    Clear,
    /// Agents adjust their setpoints.
    Adjust,
}

impl Phase {
    /// All phases in the order they are processed within one grant.
    pub const ORDER: [Phase; 4] = [Phase::Bid, Phase::Aggregate, Phase::Clear, Phase::Adjust];
}

/// Absolute deadlines of the current period, in bus seconds.
///
/// For period `P` and step `dt`, bids and aggregation are due at `P - 2·dt`,
/// the external solver runs at `P - dt`, clearing and adjustment are due at
/// `P`. Each deadline moves forward by `P` once its phase has run.
///
/// # Examples
///
/// ```
/// use transactive_sim::sim::clock::{Phase, PhaseDeadlines};
///
/// let mut d = PhaseDeadlines::new(300, 15);
/// assert_eq!(d.next_wake(172_800), 270);
/// assert_eq!(d.due(270), vec![Phase::Bid, Phase::Aggregate]);
///
/// d.advance(Phase::Bid);
/// d.advance(Phase::Aggregate);
/// assert_eq!(d.next_wake(172_800), 300);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseDeadlines {
    period: u64,
    pub bid: u64,
    pub aggregate: u64,
    /// External solver time. Never woken for.
    pub opf: u64,
    pub clear: u64,
    pub adjust: u64,
}

impl PhaseDeadlines {
    /// Deadlines of the first period.
    pub fn new(period: u64, dt: u64) -> Self {
        Self {
            period,
            bid: period.saturating_sub(2 * dt),
            aggregate: period.saturating_sub(2 * dt),
            opf: period.saturating_sub(dt),
            clear: period,
            adjust: period,
        }
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    pub fn deadline(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Bid => self.bid,
            Phase::Aggregate => self.aggregate,
            Phase::Clear => self.clear,
            Phase::Adjust => self.adjust,
        }
    }

    /// Earliest pending deadline, capped at `stop`.
    pub fn next_wake(&self, stop: u64) -> u64 {
        Phase::ORDER
            .iter()
            .map(|&p| self.deadline(p))
            .fold(stop, u64::min)
    }

    /// Phases whose deadline has been reached at `granted`, in processing order.
    pub fn due(&self, granted: u64) -> Vec<Phase> {
        Phase::ORDER
            .into_iter()
            .filter(|&p| granted >= self.deadline(p))
            .collect()
    }

    /// Moves `phase` to the next period.
    pub fn advance(&mut self, phase: Phase) {
        let d = match phase {
            Phase::Bid => &mut self.bid,
            Phase::Aggregate => &mut self.aggregate,
            Phase::Clear => &mut self.clear,
            Phase::Adjust => &mut self.adjust,
        };
        *d += self.period;
        // the solver deadline has no phase of its own and follows clearing
        if phase == Phase::Clear {
            self.opf += self.period;
        }
    }
}

/// Wall clock anchored at the scenario start time.
///
/// Tracks the last granted bus time and derives the hour of day and weekday
/// used by agent schedules.
#[derive(Debug, Clone)]
pub struct SimClock {
    start: PrimitiveDateTime,
    granted: u64,
}

impl SimClock {
    /// Creates a clock at bus time 0.
    pub fn new(start: PrimitiveDateTime) -> Self {
        Self { start, granted: 0 }
    }

    /// Moves the clock to a granted bus time.
    pub fn advance_to(&mut self, granted: u64) {
        self.granted = granted;
    }

    /// Last granted bus time (seconds).
    pub fn granted(&self) -> u64 {
        self.granted
    }

    /// Wall-clock time of the last grant.
    pub fn now(&self) -> PrimitiveDateTime {
        let secs = i64::try_from(self.granted).unwrap_or(i64::MAX);
        self.start.saturating_add(Duration::seconds(secs))
    }

    /// Fractional hour of the day, `0.0 <= h < 24.0`.
    pub fn hour_of_day(&self) -> f64 {
        let now = self.now();
        f64::from(now.hour()) + f64::from(now.minute()) / 60.0 + f64::from(now.second()) / 3600.0
    }

    /// Day of the week, Monday = 0.
    pub fn day_of_week(&self) -> u8 {
        self.now().weekday().number_days_from_monday()
    }
}
