//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use time::PrimitiveDateTime;
use time::macros::format_description;

use crate::agents::schedule::DayPartSchedule;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults. Load from TOML with
/// [`ScenarioConfig::from_toml_file`] or use [`ScenarioConfig::baseline`] for
/// the built-in neighbourhood.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Run length, step size and output naming.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// The single retail market.
    #[serde(default)]
    pub market: MarketConfig,
    /// Thermostat agents in bidding order.
    #[serde(default)]
    pub controllers: IndexMap<String, ControllerConfig>,
    /// Synthetic federate driving the CLI run.
    #[serde(default)]
    pub feed: FeedConfig,
}

/// Simulation timing and global parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Simulated duration (hours, > 0).
    pub hour_stop: f64,
    /// Bus time step (seconds, > 0).
    pub dt: u64,
    /// Wall-clock time at t = 0, `YYYY-MM-DD HH:MM:SS`.
    pub start_time: String,
    /// Enter bids into the market and act on its prices.
    pub with_market: bool,
    /// Seed for the synthetic feed.
    pub seed: u64,
    /// Base name of exported metrics files.
    pub metrics_root: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            hour_stop: 48.0,
            dt: 15,
            start_time: "2013-07-01 00:00:00".to_string(),
            with_market: true,
            seed: 42,
            metrics_root: "baseline".to_string(),
        }
    }
}

impl SimulationConfig {
    /// Simulated duration in whole seconds.
    pub fn time_stop(&self) -> u64 {
        (self.hour_stop * 3600.0).max(0.0) as u64
    }

    /// Parses `start_time`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` when the string does not match
    /// `YYYY-MM-DD HH:MM:SS`.
    pub fn start_datetime(&self) -> Result<PrimitiveDateTime, ConfigError> {
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        PrimitiveDateTime::parse(&self.start_time, format).map_err(|e| {
            ConfigError::new(
                "simulation.start_time",
                format!("cannot parse \"{}\": {e}", self.start_time),
            )
        })
    }
}

/// Retail double-auction parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarketConfig {
    /// Market identifier used as the metrics key.
    pub name: String,
    /// Quantity unit label written to metrics metadata.
    pub unit: String,
    /// Clearing period (seconds).
    pub period: u64,
    /// Price cap ($/kWh); must-serve bids sit exactly here.
    pub price_cap: f64,
    /// Mean clearing price handed to agents and used before the first clearing.
    pub init_price: f64,
    /// Clearing price standard deviation handed to agents.
    pub init_stdev: f64,
    /// Quantity offered by the reference seller at the LMP (kW).
    pub max_capacity_reference_bid_quantity: f64,
    /// Interpolation weight when nothing clears.
    pub clearing_scalar: f64,
    /// Nudge applied past a neighbouring bid.
    pub bid_offset: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            name: "Market_1".to_string(),
            unit: "kW".to_string(),
            period: 300,
            price_cap: 3.78,
            init_price: 0.02078,
            init_stdev: 0.01,
            max_capacity_reference_bid_quantity: 5000.0,
            clearing_scalar: 0.5,
            bid_offset: 1e-4,
        }
    }
}

/// Bidding behaviour of a thermostat agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// Double-ramp price response.
    #[default]
    Ramp,
    /// Follow the schedule only; never bid.
    #[serde(rename = "none")]
    Disabled,
}

/// One thermostat agent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub control_mode: ControlMode,
    /// House whose readings feed this agent.
    pub house_name: String,
    /// Meter receiving the agent's price publications.
    pub meter_name: String,
    /// Bidding period (seconds); must match `market.period`.
    pub period: u64,
    /// Thermostat deadband (degF).
    pub deadband: f64,
    /// Largest setpoint offset from the basepoint (degF).
    pub offset_limit: f64,
    /// Ramp slope (> 0).
    pub ramp: f64,
    /// Highest price the agent will bid ($/kWh).
    pub price_cap: f64,
    /// Temperature range of the ramp; defaults to `|2 · offset_limit|`.
    pub temperature_range: Option<f64>,
    /// Real-power draw assumed until the first positive load reading (kW).
    pub rated_kw: f64,
    pub schedule: DayPartSchedule,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            control_mode: ControlMode::Ramp,
            house_name: String::new(),
            meter_name: String::new(),
            period: 300,
            deadband: 2.0,
            offset_limit: 2.0,
            ramp: 2.0,
            price_cap: 3.78,
            temperature_range: None,
            rated_kw: 3.0,
            schedule: DayPartSchedule::default(),
        }
    }
}

impl ControllerConfig {
    /// Configured temperature range, or `|2 · offset_limit|` when unset.
    pub fn resolved_temperature_range(&self) -> f64 {
        self.temperature_range
            .unwrap_or_else(|| (2.0 * self.offset_limit).abs())
    }
}

/// Synthetic federate parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedConfig {
    /// Mean wholesale price ($/kWh).
    pub lmp_mean: f64,
    /// Daily sinusoidal swing of the wholesale price ($/kWh).
    pub lmp_swing: f64,
    /// Gaussian noise on the wholesale price.
    pub lmp_noise: f64,
    /// Mean feeder load (kW).
    pub refload_kw: f64,
    /// Daily sinusoidal swing of the feeder load (kW).
    pub refload_swing_kw: f64,
    /// Gaussian noise on the feeder load (kW).
    pub refload_noise_kw: f64,
    /// Mean indoor temperature (degF).
    pub air_temp_mean: f64,
    /// Daily swing of the indoor temperature (degF).
    pub air_temp_swing: f64,
    /// Gaussian noise on the indoor temperature (degF).
    pub air_temp_noise: f64,
    /// Nominal meter voltage (V).
    pub voltage: f64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            lmp_mean: 0.02078,
            lmp_swing: 0.008,
            lmp_noise: 0.001,
            refload_kw: 180.0,
            refload_swing_kw: 40.0,
            refload_noise_kw: 2.0,
            air_temp_mean: 79.0,
            air_temp_swing: 3.0,
            air_temp_noise: 0.3,
            voltage: 120.0,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"market.period"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Number of houses in the built-in neighbourhood.
const BASELINE_HOUSES: usize = 8;

/// Builds the preset neighbourhood: two houses per meter, with ramps,
/// offset limits and daytime setpoints spread across the houses.
fn neighbourhood() -> IndexMap<String, ControllerConfig> {
    (0..BASELINE_HOUSES)
        .map(|i| {
            let spread = i as f64 / (BASELINE_HOUSES - 1) as f64;
            let cfg = ControllerConfig {
                house_name: format!("F1_house_A{i}"),
                meter_name: format!("F1_meter_{}", i / 2),
                ramp: 1.5 + 1.5 * spread,
                offset_limit: 2.0 + 2.0 * spread,
                rated_kw: 2.5 + 0.5 * (i % 3) as f64,
                schedule: DayPartSchedule {
                    daylight_set: 82.0 + 4.0 * spread,
                    ..DayPartSchedule::default()
                },
                ..ControllerConfig::default()
            };
            (format!("F1_house_A{i}_hvac"), cfg)
        })
        .collect()
}

impl ScenarioConfig {
    /// Returns the baseline scenario: eight ramp thermostats against an
    /// ample reference supply.
    pub fn baseline() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            market: MarketConfig::default(),
            controllers: neighbourhood(),
            feed: FeedConfig::default(),
        }
    }

    /// Returns the baseline neighbourhood with the market switched off.
    pub fn no_market() -> Self {
        Self {
            simulation: SimulationConfig {
                with_market: false,
                metrics_root: "no_market".to_string(),
                ..SimulationConfig::default()
            },
            ..Self::baseline()
        }
    }

    /// Returns a scenario whose reference supply only sometimes covers the
    /// feeder load, so must-serve failures and buyer-marginal periods occur.
    pub fn tight_supply() -> Self {
        Self {
            simulation: SimulationConfig {
                metrics_root: "tight_supply".to_string(),
                ..SimulationConfig::default()
            },
            market: MarketConfig {
                max_capacity_reference_bid_quantity: 170.0,
                ..MarketConfig::default()
            },
            feed: FeedConfig {
                refload_kw: 175.0,
                ..FeedConfig::default()
            },
            ..Self::baseline()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "no_market", "tight_supply"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "no_market" => Ok(Self::no_market()),
            "tight_supply" => Ok(Self::tight_supply()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;
        let m = &self.market;

        if !(s.hour_stop.is_finite() && s.hour_stop > 0.0) {
            errors.push(ConfigError::new("simulation.hour_stop", "must be > 0"));
        }
        if s.dt == 0 {
            errors.push(ConfigError::new("simulation.dt", "must be > 0"));
        }
        if let Err(e) = s.start_datetime() {
            errors.push(e);
        }
        if m.period == 0 {
            errors.push(ConfigError::new("market.period", "must be > 0"));
        } else if s.dt.saturating_mul(2) >= m.period {
            errors.push(ConfigError::new(
                "market.period",
                format!("must exceed 2 * simulation.dt = {}", s.dt.saturating_mul(2)),
            ));
        }
        if m.price_cap <= 0.0 {
            errors.push(ConfigError::new("market.price_cap", "must be > 0"));
        }
        if m.init_stdev < 0.0 {
            errors.push(ConfigError::new("market.init_stdev", "must be >= 0"));
        }

        for (name, c) in &self.controllers {
            let field = |f: &str| format!("controllers.{name}.{f}");
            if c.period != m.period {
                errors.push(ConfigError::new(
                    field("period"),
                    format!("must equal market.period = {}", m.period),
                ));
            }
            if c.ramp <= 0.0 {
                errors.push(ConfigError::new(field("ramp"), "must be > 0"));
            }
            if c.offset_limit < 0.0 {
                errors.push(ConfigError::new(field("offset_limit"), "must be >= 0"));
            }
            if c.resolved_temperature_range() <= 0.0 {
                errors.push(ConfigError::new(
                    field("temperature_range"),
                    "must be > 0 (set it or a positive offset_limit)",
                ));
            }
            if c.rated_kw <= 0.0 {
                errors.push(ConfigError::new(field("rated_kw"), "must be > 0"));
            }
            if !c.schedule.weekday_breakpoints().windows(2).all(|w| w[0] <= w[1]) {
                errors.push(ConfigError::new(
                    field("schedule"),
                    "weekday breakpoints must be non-decreasing",
                ));
            }
            if c.schedule.weekend_day_start >= c.schedule.weekend_night_start {
                errors.push(ConfigError::new(
                    field("schedule.weekend_day_start"),
                    "must be < schedule.weekend_night_start",
                ));
            }
        }

        errors
    }
}
