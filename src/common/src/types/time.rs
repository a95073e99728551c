// Copyright 2025 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::error::{Error, Result};

/// A UTC instant with nanosecond resolution, counted from the Unix epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn now() -> Self {
        Self(Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX))
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.0)
    }
}

impl std::ops::Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Timestamp) -> Duration {
        Duration(self.0.saturating_sub(rhs.0))
    }
}

impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| Error::parse(format!("not a timestamp: {s}: {e}")))?;
        dt.timestamp_nanos_opt()
            .map(Self)
            .ok_or_else(|| Error::parse(format!("timestamp out of range: {s}")))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.to_datetime().to_rfc3339_opts(SecondsFormat::Nanos, true)
        )
    }
}

/// A signed span of time in nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(i64);

/// Units from nanoseconds up to days, with the factor to nanoseconds.
/// Ordered largest first so printing picks the coarsest exact unit.
const UNITS: &[(&str, i64)] = &[
    ("d", 86_400_000_000_000),
    ("h", 3_600_000_000_000),
    ("min", 60_000_000_000),
    ("s", 1_000_000_000),
    ("ms", 1_000_000),
    ("us", 1_000),
    ("ns", 1),
];

impl Duration {
    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1e9) as i64)
    }
}

impl FromStr for Duration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let split = s
            .find(|c: char| c != '-' && c != '+' && !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| Error::parse(format!("duration without unit: {s}")))?;
        let (number, unit) = s.split_at(split);
        let factor = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, factor)| *factor)
            .ok_or_else(|| Error::parse(format!("unknown duration unit: {unit}")))?;
        if let Ok(count) = number.parse::<i64>() {
            Ok(Self(count.saturating_mul(factor)))
        } else if let Ok(count) = number.parse::<f64>() {
            Ok(Self((count * factor as f64) as i64))
        } else {
            Err(Error::parse(format!("not a duration: {s}")))
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The coarsest unit that divides the value exactly, so that
        // parsing the printed form restores the exact nanosecond count.
        let (name, factor) = UNITS
            .iter()
            .find(|(_, factor)| self.0 % factor == 0)
            .expect("ns always divides");
        write!(f, "{}{}", self.0 / factor, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_round_trip() {
        let ts: Timestamp = "2011-08-12T13:00:36.349948Z".parse().unwrap();
        assert_eq!(ts.to_string().parse::<Timestamp>().unwrap(), ts);
        assert_eq!(ts.as_nanos(), 1_313_154_036_349_948_000);
    }

    #[test]
    fn test_duration_display() {
        assert_eq!(Duration::from_nanos(90_000_000_000).to_string(), "90s");
        assert_eq!(Duration::from_nanos(60_000_000_000).to_string(), "1min");
        assert_eq!(Duration::from_nanos(1_500).to_string(), "1500ns");
        assert_eq!(Duration::from_nanos(-2_000_000_000).to_string(), "-2s");
    }

    #[test]
    fn test_duration_parse() {
        assert_eq!(
            "1.5s".parse::<Duration>().unwrap(),
            Duration::from_nanos(1_500_000_000)
        );
        assert_eq!("250ms".parse::<Duration>().unwrap().as_nanos(), 250_000_000);
        assert!("12".parse::<Duration>().is_err());
        assert!("12fortnights".parse::<Duration>().is_err());
    }
}
