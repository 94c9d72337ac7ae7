//! Parsing of external measurement strings into typed readings.
//!
//! Bus values arrive as text, often with unit suffixes (`"78.2 degF"`) or as
//! complex numbers in rectangular (`"+120.1-0.5j V"`) or polar
//! (`"+3.1+25.0d kVA"`) form. Everything is parsed and range-checked here;
//! nothing downstream sees a string or a non-finite number.

use std::collections::HashMap;

use crate::agents::types::Reading;
use crate::error::IngestError;

/// Plausible indoor air temperatures (degF).
const AIR_TEMP_RANGE: (f64, f64) = (-60.0, 150.0);

/// Longest prefix of `tok` that parses as a number, and the rest.
fn leading_number(tok: &str) -> Option<(f64, &str)> {
    let end = tok
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')))
        .unwrap_or(tok.len());
    (1..=end)
        .rev()
        .find_map(|n| tok[..n].parse::<f64>().ok().map(|v| (v, &tok[n..])))
}

fn clean(s: &str) -> Result<&str, IngestError> {
    let t = s.trim().trim_end_matches(';').trim();
    if t.is_empty() {
        Err(IngestError::Empty)
    } else {
        Ok(t)
    }
}

fn finite(v: f64) -> Result<f64, IngestError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(IngestError::NonFinite)
    }
}

/// Parses a real number, ignoring any unit suffix.
///
/// # Examples
///
/// ```
/// use transactive_sim::sim::ingest::parse_number;
///
/// assert_eq!(parse_number("78.25 degF"), Ok(78.25));
/// assert_eq!(parse_number("-3e2;"), Ok(-300.0));
/// assert!(parse_number("degF").is_err());
/// ```
pub fn parse_number(s: &str) -> Result<f64, IngestError> {
    let t = clean(s)?;
    let (v, _) = leading_number(t).ok_or_else(|| IngestError::NotNumeric(s.to_string()))?;
    finite(v)
}

/// Form of a complex value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    Real,
    Rectangular,
    PolarDegrees,
    PolarRadians,
}

/// A parsed complex value with its trailing unit.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Complex<'a> {
    re: f64,
    im: f64,
    unit: &'a str,
}

fn parse_complex(s: &str) -> Result<Complex<'_>, IngestError> {
    let t = clean(s)?;
    let not_numeric = || IngestError::NotNumeric(s.to_string());
    let (a, rest) = leading_number(t).ok_or_else(not_numeric)?;

    let (b, rest) = match leading_number(rest) {
        Some((b, r)) if rest.starts_with(['+', '-']) => (b, r),
        _ => (0.0, rest),
    };
    let (form, unit) = match rest.chars().next() {
        Some('j' | 'i') => (Form::Rectangular, &rest[1..]),
        Some('d') if !rest.starts_with("deg") => (Form::PolarDegrees, &rest[1..]),
        Some('r') => (Form::PolarRadians, &rest[1..]),
        _ => (Form::Real, rest),
    };
    let (re, im) = match form {
        Form::Real | Form::Rectangular => (a, b),
        Form::PolarDegrees => {
            let (sin, cos) = b.to_radians().sin_cos();
            (a * cos, a * sin)
        }
        Form::PolarRadians => {
            let (sin, cos) = b.sin_cos();
            (a * cos, a * sin)
        }
    };
    Ok(Complex {
        re: finite(re)?,
        im: finite(im)?,
        unit: unit.trim(),
    })
}

/// Parses the magnitude of a real or complex value (e.g. a phase voltage).
///
/// # Examples
///
/// ```
/// use transactive_sim::sim::ingest::parse_magnitude;
///
/// assert_eq!(parse_magnitude("+3+4j V"), Ok(5.0));
/// assert_eq!(parse_magnitude("+120.5-30.0d V"), Ok(120.5));
/// ```
pub fn parse_magnitude(s: &str) -> Result<f64, IngestError> {
    let c = parse_complex(s)?;
    Ok(c.re.hypot(c.im))
}

/// Parses a (complex) power and returns its real part in kW.
///
/// Units `kVA`/`kW` are taken as is, `MVA`/`MW` scaled by 1000, and `VA`, `W`
/// or no unit scaled by 1/1000.
pub fn parse_kw(s: &str) -> Result<f64, IngestError> {
    let c = parse_complex(s)?;
    let unit = c.unit.to_ascii_uppercase();
    Ok(if unit.starts_with('K') {
        c.re
    } else if unit.starts_with('M') {
        c.re * 1000.0
    } else {
        c.re / 1000.0
    })
}

/// Parses a device switch state: `OFF` (any case) is off, anything else on.
pub fn parse_switch_state(s: &str) -> Result<bool, IngestError> {
    let t = clean(s)?;
    Ok(!t.eq_ignore_ascii_case("OFF"))
}

/// What a subscribed topic carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Wholesale reference price.
    Lmp,
    /// Measured feeder load.
    RefLoad,
    /// Indoor air temperature of the agent at this index.
    AirTemperature(usize),
    /// Meter voltage of the agent at this index.
    Voltage(usize),
    /// HVAC real-power draw of the agent at this index.
    Load(usize),
    /// HVAC switch state of the agent at this index.
    State(usize),
}

/// A parsed, validated input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Update {
    Lmp(f64),
    RefLoad(f64),
    Agent(usize, Reading),
}

/// Parses `value` as the kind of input `input` carries.
///
/// # Errors
///
/// Returns an `IngestError` for empty, non-numeric, non-finite or
/// out-of-range values.
pub fn decode(input: Input, value: &str) -> Result<Update, IngestError> {
    Ok(match input {
        Input::Lmp => Update::Lmp(parse_magnitude(value)?),
        Input::RefLoad => Update::RefLoad(parse_kw(value)?),
        Input::AirTemperature(k) => {
            let t = parse_number(value)?;
            if !(AIR_TEMP_RANGE.0..=AIR_TEMP_RANGE.1).contains(&t) {
                return Err(IngestError::OutOfRange {
                    what: "air temperature",
                    value: t,
                });
            }
            Update::Agent(k, Reading::AirTemperature(t))
        }
        Input::Voltage(k) => Update::Agent(k, Reading::Voltage(parse_magnitude(value)?)),
        Input::Load(k) => {
            let kw = parse_number(value)?;
            if kw < 0.0 {
                return Err(IngestError::OutOfRange {
                    what: "hvac load",
                    value: kw,
                });
            }
            Update::Agent(k, Reading::Load(kw))
        }
        Input::State(k) => Update::Agent(k, Reading::Running(parse_switch_state(value)?)),
    })
}

/// Subscription table from topic name to input kind.
///
/// Agents subscribe to `<agent>#Tair`, `<agent>#V1`, `<agent>#Load` and
/// `<agent>#On`; the market subscribes to `LMP` and `refload`.
#[derive(Debug, Clone, Default)]
pub struct TopicMap {
    topics: HashMap<String, Input>,
}

impl TopicMap {
    /// Builds the table for agents in the given order.
    pub fn new<'a>(agent_names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut topics = HashMap::from([
            ("LMP".to_string(), Input::Lmp),
            ("refload".to_string(), Input::RefLoad),
        ]);
        for (k, name) in agent_names.into_iter().enumerate() {
            topics.insert(format!("{name}#Tair"), Input::AirTemperature(k));
            topics.insert(format!("{name}#V1"), Input::Voltage(k));
            topics.insert(format!("{name}#Load"), Input::Load(k));
            topics.insert(format!("{name}#On"), Input::State(k));
        }
        Self { topics }
    }

    pub fn get(&self, topic: &str) -> Option<Input> {
        self.topics.get(topic).copied()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::plain("72.5", 72.5)]
    #[case::unit("78.2 degF", 78.2)]
    #[case::glued_unit("3.25kW", 3.25)]
    #[case::signed("+0.031", 0.031)]
    #[case::exponent("1.5e-2 $", 0.015)]
    fn numbers(#[case] s: &str, #[case] expected: f64) {
        assert_abs_diff_eq!(parse_number(s).unwrap_or(f64::NAN), expected, epsilon = 1e-12);
    }

    #[rstest]
    #[case::empty("", IngestError::Empty)]
    #[case::blank("  ;", IngestError::Empty)]
    #[case::letters("warm", IngestError::NotNumeric("warm".into()))]
    #[case::overflow("1e999", IngestError::NonFinite)]
    fn rejected_numbers(#[case] s: &str, #[case] err: IngestError) {
        assert_eq!(parse_number(s), Err(err));
    }

    #[rstest]
    #[case::real("120.0 V", 120.0)]
    #[case::rectangular("+6-8j V", 10.0)]
    #[case::polar_degrees("+240.2+120.0d V", 240.2)]
    #[case::polar_radians("+7.5-1.2r V", 7.5)]
    fn magnitudes(#[case] s: &str, #[case] expected: f64) {
        assert_abs_diff_eq!(parse_magnitude(s).unwrap_or(f64::NAN), expected, epsilon = 1e-9);
    }

    #[rstest]
    #[case::volt_amps("+1500+300j VA", 1.5)]
    #[case::kilo("+2.5+0.5j kVA", 2.5)]
    #[case::mega("+0.2+0.01j MVA", 200.0)]
    #[case::polar("+10.0+60.0d kVA", 5.0)]
    fn kilowatts(#[case] s: &str, #[case] expected: f64) {
        assert_abs_diff_eq!(parse_kw(s).unwrap_or(f64::NAN), expected, epsilon = 1e-9);
    }

    #[test]
    fn switch_states() {
        assert_eq!(parse_switch_state("OFF"), Ok(false));
        assert_eq!(parse_switch_state("off"), Ok(false));
        assert_eq!(parse_switch_state("ON"), Ok(true));
        assert_eq!(parse_switch_state(""), Err(IngestError::Empty));
    }

    #[test]
    fn decode_rejects_out_of_range() {
        assert!(matches!(
            decode(Input::Load(0), "-2.0"),
            Err(IngestError::OutOfRange { .. })
        ));
        assert!(matches!(
            decode(Input::AirTemperature(0), "451 degF"),
            Err(IngestError::OutOfRange { .. })
        ));
    }

    #[test]
    fn decode_routes_to_agent() {
        assert_eq!(
            decode(Input::State(3), "ON"),
            Ok(Update::Agent(3, Reading::Running(true)))
        );
        assert_eq!(decode(Input::RefLoad, "+120000+0j VA"), Ok(Update::RefLoad(120.0)));
    }

    #[test]
    fn topic_map_covers_agents() {
        let map = TopicMap::new(["h0", "h1"]);
        assert_eq!(map.len(), 10);
        assert_eq!(map.get("LMP"), Some(Input::Lmp));
        assert_eq!(map.get("h1#On"), Some(Input::State(1)));
        assert_eq!(map.get("h2#On"), None);
    }
}
