//! Time-of-day setpoint schedule for thermostat agents.

use serde::Deserialize;

/// Weekday four-part and weekend two-part setpoint table.
///
/// Breakpoints are hours of the day; each part runs from its own start to the
/// next part's start. Hours outside every part fall back to the night value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DayPartSchedule {
    pub wakeup_start: f64,
    pub wakeup_set: f64,
    pub daylight_start: f64,
    pub daylight_set: f64,
    pub evening_start: f64,
    pub evening_set: f64,
    pub night_start: f64,
    pub night_set: f64,
    pub weekend_day_start: f64,
    pub weekend_day_set: f64,
    pub weekend_night_start: f64,
    pub weekend_night_set: f64,
}

impl Default for DayPartSchedule {
    fn default() -> Self {
        Self {
            wakeup_start: 6.0,
            wakeup_set: 78.0,
            daylight_start: 8.0,
            daylight_set: 84.0,
            evening_start: 17.0,
            evening_set: 78.0,
            night_start: 23.0,
            night_set: 74.0,
            weekend_day_start: 8.0,
            weekend_day_set: 78.0,
            weekend_night_start: 23.0,
            weekend_night_set: 74.0,
        }
    }
}

impl DayPartSchedule {
    /// Scheduled setpoint at `hour_of_day` on `day_of_week` (Monday = 0;
    /// 5 and 6 are the weekend).
    pub fn setpoint(&self, hour_of_day: f64, day_of_week: u8) -> f64 {
        let h = hour_of_day;
        if day_of_week > 4 {
            if h >= self.weekend_day_start && h < self.weekend_night_start {
                self.weekend_day_set
            } else {
                self.weekend_night_set
            }
        } else if h >= self.wakeup_start && h < self.daylight_start {
            self.wakeup_set
        } else if h >= self.daylight_start && h < self.evening_start {
            self.daylight_set
        } else if h >= self.evening_start && h < self.night_start {
            self.evening_set
        } else {
            self.night_set
        }
    }

    /// Weekday breakpoints in schedule order.
    pub fn weekday_breakpoints(&self) -> [f64; 4] {
        [self.wakeup_start, self.daylight_start, self.evening_start, self.night_start]
    }
}
