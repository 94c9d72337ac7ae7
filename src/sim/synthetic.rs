//! Self-contained federate that stands in for the external power-system
//! simulator and wholesale solver.
//!
//! Feeds daily sinusoids with Gaussian noise, formatted the way the external
//! simulators publish them, so the full ingestion path is exercised.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::mem;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::bus::{CoSimBus, PubValue};
use crate::config::FeedConfig;
use crate::error::BusError;

/// Seconds per day.
const DAY_SECS: f64 = 86_400.0;

/// Hour at which the daily signals peak.
const PEAK_HOUR: f64 = 16.0;

/// Reactive share of the reference load.
const REACTIVE_RATIO: f64 = 0.3;

/// Draws Gaussian noise with the Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation; zero or negative yields no noise
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    z0 * std_dev
}

/// Daily shape in `[-1, 1]`, lowest at `PEAK_HOUR - 12` and highest at `PEAK_HOUR`.
fn daily_shape(time: u64) -> f64 {
    let hours = (time as f64 % DAY_SECS) / 3600.0;
    (2.0 * PI * (hours - PEAK_HOUR) / 24.0).cos()
}

/// One simulated house as seen by the feed.
#[derive(Debug, Clone)]
struct House {
    name: String,
    rated_kw: f64,
    /// Last cooling setpoint published by its controller (degF).
    cooling_setpoint: Option<f64>,
    /// Offset of this house's air temperature from the feeder mean (degF).
    bias: f64,
}

/// Deterministic synthetic federate.
///
/// Grants every request exactly and, at each grant, samples the reference
/// price, the reference load and every house's air temperature, voltage,
/// HVAC load and switch state. A house's HVAC runs while its air
/// temperature exceeds the last cooling setpoint published for it.
///
/// # Examples
///
/// ```
/// use transactive_sim::config::FeedConfig;
/// use transactive_sim::sim::bus::CoSimBus;
/// use transactive_sim::sim::synthetic::SyntheticBus;
///
/// let mut bus = SyntheticBus::new(FeedConfig::default(), [("h1", 3.0)], 7);
/// assert_eq!(bus.request_time(270), Ok(270));
/// let inputs = bus.updated_inputs();
/// assert!(inputs.iter().any(|(t, _)| t == "LMP"));
/// assert!(inputs.iter().any(|(t, _)| t == "h1#Tair"));
/// ```
#[derive(Debug, Clone)]
pub struct SyntheticBus {
    feed: FeedConfig,
    houses: Vec<House>,
    index: HashMap<String, usize>,
    rng: StdRng,
    now: u64,
    pending: Vec<(String, String)>,
    publications: usize,
    last_clear_price: Option<f64>,
}

impl SyntheticBus {
    /// Creates a feed for the given `(agent name, rated kW)` pairs.
    pub fn new<'a>(feed: FeedConfig, agents: impl IntoIterator<Item = (&'a str, f64)>, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let houses: Vec<House> = agents
            .into_iter()
            .map(|(name, rated_kw)| House {
                name: name.to_string(),
                rated_kw,
                cooling_setpoint: None,
                bias: gaussian_noise(&mut rng, 1.0),
            })
            .collect();
        let index = houses
            .iter()
            .enumerate()
            .map(|(k, h)| (h.name.clone(), k))
            .collect();
        Self {
            feed,
            houses,
            index,
            rng,
            now: 0,
            pending: Vec::new(),
            publications: 0,
            last_clear_price: None,
        }
    }

    /// Number of values published to this bus.
    pub fn publications(&self) -> usize {
        self.publications
    }

    /// Most recent published clearing price.
    pub fn last_clear_price(&self) -> Option<f64> {
        self.last_clear_price
    }

    /// Last cooling setpoint published for `agent`.
    pub fn cooling_setpoint(&self, agent: &str) -> Option<f64> {
        self.index
            .get(agent)
            .and_then(|&k| self.houses[k].cooling_setpoint)
    }

    fn sample(&mut self, time: u64) {
        let shape = daily_shape(time);
        let f = &self.feed;

        let lmp = f.lmp_mean + f.lmp_swing * shape + gaussian_noise(&mut self.rng, f.lmp_noise);
        let p_kw = f.refload_kw + f.refload_swing_kw * shape + gaussian_noise(&mut self.rng, f.refload_noise_kw);
        let q_kvar = REACTIVE_RATIO * p_kw;
        self.pending.push(("LMP".to_string(), format!("{lmp:.5}")));
        self.pending
            .push(("refload".to_string(), format!("{p_kw:+.3}{q_kvar:+.3}j kVA")));

        let outdoor = f.air_temp_mean + f.air_temp_swing * shape;
        for house in &self.houses {
            let tair = outdoor + house.bias + gaussian_noise(&mut self.rng, f.air_temp_noise);
            let running = house.cooling_setpoint.is_some_and(|sp| tair > sp);
            let load = if running { house.rated_kw } else { 0.0 };
            let v_im = gaussian_noise(&mut self.rng, 0.5);
            let name = &house.name;
            self.pending
                .push((format!("{name}#Tair"), format!("{tair:.2} degF")));
            self.pending
                .push((format!("{name}#V1"), format!("{:+.3}{v_im:+.3}j V", f.voltage)));
            self.pending
                .push((format!("{name}#Load"), format!("{load:.3} kW")));
            self.pending.push((
                format!("{name}#On"),
                if running { "ON" } else { "OFF" }.to_string(),
            ));
        }
    }
}

impl CoSimBus for SyntheticBus {
    fn request_time(&mut self, next: u64) -> Result<u64, BusError> {
        if next < self.now {
            return Err(BusError::TimeRegression {
                granted: next,
                previous: self.now,
            });
        }
        self.now = next;
        self.sample(next);
        Ok(next)
    }

    fn updated_inputs(&mut self) -> Vec<(String, String)> {
        mem::take(&mut self.pending)
    }

    fn publish(&mut self, topic: &str, value: PubValue) {
        self.publications += 1;
        if topic == "clear_price" {
            self.last_clear_price = value.as_f64();
        } else if let Some(agent) = topic.strip_suffix("/cooling_setpoint")
            && let Some(&k) = self.index.get(agent)
        {
            self.houses[k].cooling_setpoint = value.as_f64();
        }
    }
}
