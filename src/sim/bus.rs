//! Time-advance and publish/subscribe interface to the co-simulation bus.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::mem;

use crate::error::BusError;

/// A value published to the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum PubValue {
    Double(f64),
    Int(i64),
    Text(String),
}

impl PubValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for PubValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Double(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A publication recorded together with the bus time it was made at.
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    pub time: u64,
    pub topic: String,
    pub value: PubValue,
}

/// Narrow interface to an external time-advance/pub-sub service.
///
/// The scheduler suspends only inside [`CoSimBus::request_time`]. A bus may
/// grant any time up to the requested one; callers must check which
/// deadlines the grant actually reached.
pub trait CoSimBus {
    /// Requests an advance to `next` seconds and returns the granted time.
    ///
    /// # Errors
    ///
    /// Any `BusError` is fatal: the run cannot continue without a grant.
    fn request_time(&mut self, next: u64) -> Result<u64, BusError>;

    /// Drains the `(topic, value)` pairs received since the previous call.
    fn updated_inputs(&mut self) -> Vec<(String, String)>;

    /// Publishes `value` on `topic` at the current granted time.
    fn publish(&mut self, topic: &str, value: PubValue);
}

/// In-memory bus that delivers canned inputs at chosen virtual times.
///
/// Inputs scheduled at time `t` become visible at the first grant `>= t`.
/// Interrupts make the bus grant an earlier time than requested, as a real
/// federation does when another federate publishes.
///
/// # Examples
///
/// ```
/// use transactive_sim::sim::bus::{CoSimBus, PubValue, ScriptedBus};
///
/// let mut bus = ScriptedBus::new()
///     .with_input(0, "LMP", "0.031")
///     .with_interrupt(100);
///
/// assert_eq!(bus.request_time(270), Ok(100));
/// assert_eq!(bus.updated_inputs(), vec![("LMP".to_string(), "0.031".to_string())]);
/// assert_eq!(bus.request_time(270), Ok(270));
/// assert!(bus.updated_inputs().is_empty());
///
/// bus.publish("clear_price", PubValue::Double(0.03));
/// assert_eq!(bus.published()[0].time, 270);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScriptedBus {
    now: u64,
    inputs: BTreeMap<u64, Vec<(String, String)>>,
    pending: Vec<(String, String)>,
    interrupts: BTreeSet<u64>,
    disconnect_at: Option<u64>,
    requests: Vec<u64>,
    published: Vec<Publication>,
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `value` on `topic` for delivery at `time`.
    pub fn with_input(mut self, time: u64, topic: &str, value: &str) -> Self {
        self.push_input(time, topic, value);
        self
    }

    /// Makes the bus grant `time` to any request that would pass over it.
    pub fn with_interrupt(mut self, time: u64) -> Self {
        self.interrupts.insert(time);
        self
    }

    /// Fails every request for a time at or after `time`.
    pub fn with_disconnect_at(mut self, time: u64) -> Self {
        self.disconnect_at = Some(time);
        self
    }

    /// Schedules `value` on `topic` for delivery at `time`.
    pub fn push_input(&mut self, time: u64, topic: &str, value: &str) {
        self.inputs
            .entry(time)
            .or_default()
            .push((topic.to_string(), value.to_string()));
    }

    /// Every time requested so far, in order.
    pub fn requests(&self) -> &[u64] {
        &self.requests
    }

    /// Every publication so far, in order.
    pub fn published(&self) -> &[Publication] {
        &self.published
    }

    /// Publications on one topic.
    pub fn published_to<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a Publication> + 'a {
        self.published.iter().filter(move |p| p.topic == topic)
    }
}

impl CoSimBus for ScriptedBus {
    fn request_time(&mut self, next: u64) -> Result<u64, BusError> {
        self.requests.push(next);
        if let Some(at) = self.disconnect_at
            && next >= at
        {
            return Err(BusError::Disconnected { at });
        }

        let granted = if next > self.now + 1 {
            self.interrupts
                .range(self.now + 1..next)
                .next()
                .copied()
                .unwrap_or(next)
        } else {
            next
        };

        let later = self.inputs.split_off(&(granted + 1));
        let due = mem::replace(&mut self.inputs, later);
        self.pending.extend(due.into_values().flatten());
        self.now = granted;
        Ok(granted)
    }

    fn updated_inputs(&mut self) -> Vec<(String, String)> {
        mem::take(&mut self.pending)
    }

    fn publish(&mut self, topic: &str, value: PubValue) {
        self.published.push(Publication {
            time: self.now,
            topic: topic.to_string(),
            value,
        });
    }
}
