//! UTC instants with nanosecond precision and RFC 3339 text form.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::ValueError;

/// An instant on the UTC time line.
///
/// `nanos` is always below one second; `seconds` counts from the Unix epoch
/// and may be negative.
///
/// ```
/// use meta_values::Timestamp;
///
/// let t: Timestamp = "2024-03-01T12:30:00.25+01:00".parse().unwrap();
/// assert_eq!(t.to_string(), "2024-03-01T11:30:00.25Z");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp {
    seconds: i64,
    nanos: u32,
}

fn rfc3339_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(
            r"^(-?\d{4,})-(\d{2})-(\d{2})[Tt ](\d{2}):(\d{2})(?::(\d{2})(?:\.(\d{1,9}))?)?([Zz]|[+-]\d{2}:\d{2})?$",
        )
        .expect("timestamp regex is valid")
    })
}

const SECONDS_PER_DAY: i64 = 86_400;

impl Timestamp {
    pub const UNIX_EPOCH: Timestamp = Timestamp {
        seconds: 0,
        nanos: 0,
    };

    /// Builds a timestamp, carrying whole seconds out of `nanos`.
    pub fn new(seconds: i64, nanos: u32) -> Self {
        Self {
            seconds: seconds + (nanos / 1_000_000_000) as i64,
            nanos: nanos % 1_000_000_000,
        }
    }

    pub fn from_unix_seconds(seconds: i64) -> Self {
        Self::new(seconds, 0)
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
            Ok(d) => Self::new(d.as_secs() as i64, d.subsec_nanos()),
            Err(e) => {
                let d = e.duration();
                if d.subsec_nanos() == 0 {
                    Self::new(-(d.as_secs() as i64), 0)
                } else {
                    Self::new(-(d.as_secs() as i64) - 1, 1_000_000_000 - d.subsec_nanos())
                }
            }
        }
    }
}

// Howard Hinnant's days-from-civil and its inverse, proleptic Gregorian.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y.rem_euclid(400);
    let m = month as i64;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

fn days_in_month(year: i64, month: u32) -> u32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) => 29,
        2 => 28,
        _ => 31,
    }
}

impl FromStr for Timestamp {
    type Err = ValueError;

    /// Parses RFC 3339. A missing offset is read as UTC.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValueError::InvalidTimestamp(s.to_string());
        let caps = rfc3339_regex().captures(s).ok_or_else(invalid)?;
        let field = |i: usize| -> Result<i64, ValueError> {
            match caps.get(i) {
                Some(m) => m.as_str().parse().map_err(|_| invalid()),
                None => Ok(0),
            }
        };
        let year = field(1)?;
        let month = field(2)? as u32;
        let day = field(3)? as u32;
        let (hour, minute, second) = (field(4)?, field(5)?, field(6)?);
        if !(1..=12).contains(&month)
            || day == 0
            || day > days_in_month(year, month)
            || hour > 23
            || minute > 59
            || second > 59
        {
            return Err(invalid());
        }
        let nanos = match caps.get(7) {
            Some(m) => {
                let frac = m.as_str();
                let padded = format!("{frac:0<9}");
                padded.parse::<u32>().map_err(|_| invalid())?
            }
            None => 0,
        };
        let offset = match caps.get(8).map(|m| m.as_str()) {
            None | Some("Z") | Some("z") => 0,
            Some(o) => {
                let sign = if o.starts_with('-') { -1 } else { 1 };
                let h: i64 = o[1..3].parse().map_err(|_| invalid())?;
                let m: i64 = o[4..6].parse().map_err(|_| invalid())?;
                sign * (h * 3600 + m * 60)
            }
        };
        let days = days_from_civil(year, month, day);
        let seconds = days
            .checked_mul(SECONDS_PER_DAY)
            .and_then(|s| s.checked_add(hour * 3600 + minute * 60 + second - offset))
            .ok_or_else(invalid)?;
        Ok(Self::new(seconds, nanos))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days = self.seconds.div_euclid(SECONDS_PER_DAY);
        let secs = self.seconds.rem_euclid(SECONDS_PER_DAY);
        let (year, month, day) = civil_from_days(days);
        write!(
            f,
            "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}",
            secs / 3600,
            secs % 3600 / 60,
            secs % 60
        )?;
        if self.nanos != 0 {
            let frac = format!("{:09}", self.nanos);
            write!(f, ".{}", frac.trim_end_matches('0'))?;
        }
        f.write_str("Z")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch() {
        let t: Timestamp = "1970-01-01T00:00:00Z".parse().unwrap();
        assert_eq!(t, Timestamp::UNIX_EPOCH);
        assert_eq!(t.to_string(), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_known_instant() {
        let t: Timestamp = "2000-02-29T23:59:59.5Z".parse().unwrap();
        assert_eq!(t.seconds(), 951_868_799);
        assert_eq!(t.nanos(), 500_000_000);
    }

    #[test]
    fn test_local_date_time_is_utc() {
        let a: Timestamp = "2021-06-01T10:00:00".parse().unwrap();
        let b: Timestamp = "2021-06-01T10:00:00Z".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_offset() {
        let a: Timestamp = "2021-06-01T10:00:00-02:30".parse().unwrap();
        assert_eq!(a.to_string(), "2021-06-01T12:30:00Z");
    }

    #[test]
    fn test_before_epoch() {
        let t: Timestamp = "1969-12-31T23:59:59.999999999Z".parse().unwrap();
        assert_eq!(t.seconds(), -1);
        assert_eq!(t.to_string(), "1969-12-31T23:59:59.999999999Z");
    }

    #[test]
    fn test_rejects_invalid_fields() {
        for text in [
            "2021-13-01T00:00:00Z",
            "2021-02-29T00:00:00Z",
            "2021-01-01T24:00:00Z",
            "2021-01-01",
            "yesterday",
        ] {
            assert!(text.parse::<Timestamp>().is_err(), "{text}");
        }
    }

    #[test]
    fn test_display_roundtrip() {
        for seconds in [-86_401, -1, 0, 1, 1_700_000_000, 253_402_300_799] {
            let t = Timestamp::new(seconds, 120_000);
            assert_eq!(t.to_string().parse::<Timestamp>().unwrap(), t);
        }
    }

    #[test]
    fn test_new_normalizes_nanos() {
        assert_eq!(Timestamp::new(1, 1_500_000_000), Timestamp::new(2, 500_000_000));
    }
}
