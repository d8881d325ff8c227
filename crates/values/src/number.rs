//! Numeric payloads: machine integers, floats and exact decimals.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::OnceLock;

use crate::ValueError;

/// A number that remembers how it was written.
///
/// Equality is per variant: `Integer(1)` and `Float(1.0)` are different
/// values. Floats compare by bit pattern so that `Eq` and `Hash` agree.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
}

impl Number {
    pub fn to_f64(&self) -> f64 {
        match *self {
            Number::Integer(i) => i as f64,
            Number::Float(f) => f,
            Number::Decimal(d) => d.to_f64(),
        }
    }

    /// Returns the integer value if the number is integral and fits `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Number::Integer(i) => Some(i),
            Number::Float(f) => {
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                    Some(f as i64)
                } else {
                    None
                }
            }
            Number::Decimal(d) => d.to_i64(),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a == b,
            (Number::Float(a), Number::Float(b)) => a.to_bits() == b.to_bits(),
            (Number::Decimal(a), Number::Decimal(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Number::Integer(i) => i.hash(state),
            Number::Float(f) => f.to_bits().hash(state),
            Number::Decimal(d) => d.hash(state),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(i) => write!(f, "{i}"),
            Number::Float(x) => write!(f, "{x}"),
            Number::Decimal(d) => write!(f, "{d}"),
        }
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Number::Integer(value as i64)
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::Integer(value)
    }
}

impl From<u32> for Number {
    fn from(value: u32) -> Self {
        Number::Integer(value as i64)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Float(value)
    }
}

impl From<Decimal> for Number {
    fn from(value: Decimal) -> Self {
        Number::Decimal(value)
    }
}

/// An exact decimal `unscaled * 10^-scale`.
///
/// The scale is preserved, so `1.50` and `1.5` are distinct values.
///
/// ```
/// use meta_values::Decimal;
///
/// let d: Decimal = "1.50".parse().unwrap();
/// assert_eq!(d, Decimal::new(150, 2));
/// assert_eq!(d.to_string(), "1.50");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    pub unscaled: i128,
    pub scale: i32,
}

fn decimal_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^([+-]?)(\d*)(?:\.(\d*))?(?:[eE]([+-]?\d+))?$")
            .expect("decimal regex is valid")
    })
}

// Scales beyond this are rendered in exponent form.
const MAX_PLAIN_SCALE: i32 = 64;

impl Decimal {
    pub const fn new(unscaled: i128, scale: i32) -> Self {
        Self { unscaled, scale }
    }

    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }

    pub fn to_i64(&self) -> Option<i64> {
        if self.scale > 0 {
            let div = 10i128.checked_pow(self.scale as u32)?;
            if self.unscaled % div != 0 {
                return None;
            }
            i64::try_from(self.unscaled / div).ok()
        } else {
            let mul = 10i128.checked_pow(self.scale.unsigned_abs())?;
            i64::try_from(self.unscaled.checked_mul(mul)?).ok()
        }
    }

    /// Minimal big-endian two's-complement encoding of the unscaled value.
    pub fn unscaled_bytes(&self) -> Vec<u8> {
        let bytes = self.unscaled.to_be_bytes();
        let mut start = 0;
        while start < bytes.len() - 1 {
            let redundant = match bytes[start] {
                0x00 => bytes[start + 1] & 0x80 == 0,
                0xff => bytes[start + 1] & 0x80 != 0,
                _ => false,
            };
            if !redundant {
                break;
            }
            start += 1;
        }
        bytes[start..].to_vec()
    }

    /// Rebuilds a decimal from [`Decimal::unscaled_bytes`] output.
    ///
    /// Returns `None` for empty input or more than 16 bytes.
    pub fn from_unscaled_bytes(bytes: &[u8], scale: i32) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > 16 {
            return None;
        }
        let fill = if bytes[0] & 0x80 != 0 { 0xff } else { 0x00 };
        let mut buf = [fill; 16];
        buf[16 - bytes.len()..].copy_from_slice(bytes);
        Some(Self::new(i128::from_be_bytes(buf), scale))
    }
}

impl FromStr for Decimal {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValueError::InvalidDecimal(s.to_string());
        let caps = decimal_regex().captures(s).ok_or_else(invalid)?;
        let int_part = caps.get(2).map_or("", |m| m.as_str());
        let frac_part = caps.get(3).map_or("", |m| m.as_str());
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        let digits = format!("{int_part}{frac_part}");
        let mut unscaled: i128 = digits.parse().map_err(|_| invalid())?;
        if caps.get(1).is_some_and(|m| m.as_str() == "-") {
            unscaled = -unscaled;
        }
        let exponent: i64 = match caps.get(4) {
            Some(m) => m.as_str().parse().map_err(|_| invalid())?,
            None => 0,
        };
        let scale = i32::try_from(frac_part.len() as i64 - exponent).map_err(|_| invalid())?;
        Ok(Self::new(unscaled, scale))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.unscaled);
        }
        if self.scale < 0 {
            return write!(f, "{}E+{}", self.unscaled, -(self.scale as i64));
        }
        if self.scale > MAX_PLAIN_SCALE {
            return write!(f, "{}E-{}", self.unscaled, self.scale);
        }
        let scale = self.scale as usize;
        let sign = if self.unscaled < 0 { "-" } else { "" };
        let digits = self.unscaled.unsigned_abs().to_string();
        let digits = if digits.len() <= scale {
            format!("{}{digits}", "0".repeat(scale + 1 - digits.len()))
        } else {
            digits
        };
        let (int_part, frac_part) = digits.split_at(digits.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_and_float_differ() {
        assert_ne!(Number::Integer(1), Number::Float(1.0));
        assert_eq!(Number::Float(f64::NAN), Number::Float(f64::NAN));
    }

    #[test]
    fn test_as_i64() {
        assert_eq!(Number::Float(3.0).as_i64(), Some(3));
        assert_eq!(Number::Float(3.5).as_i64(), None);
        assert_eq!(Number::Decimal(Decimal::new(300, 2)).as_i64(), Some(3));
        assert_eq!(Number::Decimal(Decimal::new(301, 2)).as_i64(), None);
        assert_eq!(Number::Decimal(Decimal::new(3, -2)).as_i64(), Some(300));
    }

    #[test]
    fn test_decimal_parse_keeps_scale() {
        assert_eq!("1.50".parse::<Decimal>().unwrap(), Decimal::new(150, 2));
        assert_eq!("-0.05".parse::<Decimal>().unwrap(), Decimal::new(-5, 2));
        assert_eq!("12e3".parse::<Decimal>().unwrap(), Decimal::new(12, -3));
        assert_eq!(".5".parse::<Decimal>().unwrap(), Decimal::new(5, 1));
        assert!("".parse::<Decimal>().is_err());
        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!("abc".parse::<Decimal>().is_err());
    }

    #[test]
    fn test_decimal_display() {
        assert_eq!(Decimal::new(150, 2).to_string(), "1.50");
        assert_eq!(Decimal::new(-5, 2).to_string(), "-0.05");
        assert_eq!(Decimal::new(7, 0).to_string(), "7");
        assert_eq!(Decimal::new(12, -3).to_string(), "12E+3");
        for text in ["1.50", "-0.05", "7", "12E+3", "0.000"] {
            let d: Decimal = text.parse().unwrap();
            assert_eq!(d.to_string().parse::<Decimal>().unwrap(), d);
        }
    }

    #[test]
    fn test_unscaled_bytes_minimal() {
        assert_eq!(Decimal::new(0, 0).unscaled_bytes(), [0x00]);
        assert_eq!(Decimal::new(127, 0).unscaled_bytes(), [0x7f]);
        assert_eq!(Decimal::new(128, 0).unscaled_bytes(), [0x00, 0x80]);
        assert_eq!(Decimal::new(-1, 0).unscaled_bytes(), [0xff]);
        assert_eq!(Decimal::new(-129, 0).unscaled_bytes(), [0xff, 0x7f]);
    }

    #[test]
    fn test_unscaled_bytes_roundtrip_extremes() {
        for unscaled in [0, 1, -1, 255, -256, i128::MAX, i128::MIN] {
            let d = Decimal::new(unscaled, 3);
            let back = Decimal::from_unscaled_bytes(&d.unscaled_bytes(), 3).unwrap();
            assert_eq!(back, d);
        }
        assert_eq!(Decimal::from_unscaled_bytes(&[], 0), None);
        assert_eq!(Decimal::from_unscaled_bytes(&[0; 17], 0), None);
    }
}
