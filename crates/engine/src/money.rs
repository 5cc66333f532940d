use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub},
    str::FromStr,
};

use crate::EngineError;

/// Signed amount represented as **integer cents**.
///
/// Item amounts travel as decimal strings; this type is what the engine uses
/// whenever it has to compute with them (transaction totals) or bring an
/// edited string back to the two fractional digits the backend stores.
///
/// # Examples
///
/// ```rust
/// use engine::Cents;
///
/// let amount = Cents::new(12_34);
/// assert_eq!(amount.cents(), 1234);
/// assert_eq!(amount.to_string(), "12.34");
/// ```
///
/// Parsing accepts `.` or `,` as decimal separator and any number of
/// fractional digits, rounding half away from zero:
///
/// ```rust
/// use engine::Cents;
///
/// assert_eq!("10".parse::<Cents>().unwrap().cents(), 1000);
/// assert_eq!("10,5".parse::<Cents>().unwrap().cents(), 1050);
/// assert_eq!("0.125".parse::<Cents>().unwrap().cents(), 13);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Cents(i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    /// Creates a new amount from integer cents.
    #[must_use]
    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns the raw value in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: Cents) -> Option<Cents> {
        self.0.checked_add(rhs.0).map(Cents)
    }
}

/// Brings an edited amount string to the wire format: exactly two fractional
/// digits. An empty string stays empty (a created item nobody filled in).
pub fn normalize_amount(raw: &str) -> Result<String, EngineError> {
    if raw.trim().is_empty() {
        return Ok(String::new());
    }
    Ok(raw.parse::<Cents>()?.to_string())
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl From<i64> for Cents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Cents> for i64 {
    fn from(value: Cents) -> Self {
        value.0
    }
}

impl Add for Cents {
    type Output = Cents;

    fn add(self, rhs: Cents) -> Self::Output {
        Cents(self.0 + rhs.0)
    }
}

impl AddAssign for Cents {
    fn add_assign(&mut self, rhs: Cents) {
        self.0 += rhs.0;
    }
}

impl Sub for Cents {
    type Output = Cents;

    fn sub(self, rhs: Cents) -> Self::Output {
        Cents(self.0 - rhs.0)
    }
}

impl Neg for Cents {
    type Output = Cents;

    fn neg(self) -> Self::Output {
        Cents(-self.0)
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Cents>>(iter: I) -> Self {
        iter.fold(Cents::ZERO, |acc, value| acc + value)
    }
}

impl FromStr for Cents {
    type Err = EngineError;

    /// Parses a decimal string into cents.
    ///
    /// Accepts `.` or `,` as decimal separator and an optional leading `+`/`-`.
    /// Digits past the second fractional one are rounded half away from zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let empty = || EngineError::InvalidAmount("empty amount".to_string());
        let invalid = || EngineError::InvalidAmount(format!("invalid amount: {s}"));
        let overflow = || EngineError::InvalidAmount("amount too large".to_string());

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(empty());
        }

        let (negative, rest) = if let Some(stripped) = trimmed.strip_prefix('-') {
            (true, stripped)
        } else if let Some(stripped) = trimmed.strip_prefix('+') {
            (false, stripped)
        } else {
            (false, trimmed)
        };

        let rest = rest.trim().replace(',', ".");
        if rest.is_empty() {
            return Err(empty());
        }

        let (whole, frac) = match rest.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (rest.as_str(), ""),
        };

        // ".5" is accepted as half a unit, "." alone is not.
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        let units: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };

        let mut digits = frac.bytes().map(|b| i64::from(b - b'0'));
        let tenths = digits.next().unwrap_or(0);
        let hundredths = digits.next().unwrap_or(0);
        let round_up = digits.next().is_some_and(|d| d >= 5);

        let total = units
            .checked_mul(100)
            .and_then(|v| v.checked_add(tenths * 10 + hundredths + i64::from(round_up)))
            .ok_or_else(overflow)?;

        Ok(Cents(if negative { -total } else { total }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_two_fraction_digits() {
        assert_eq!(Cents::new(0).to_string(), "0.00");
        assert_eq!(Cents::new(1).to_string(), "0.01");
        assert_eq!(Cents::new(10).to_string(), "0.10");
        assert_eq!(Cents::new(2550).to_string(), "25.50");
        assert_eq!(Cents::new(-1050).to_string(), "-10.50");
    }

    #[test]
    fn parse_accepts_dot_or_comma() {
        assert_eq!("10".parse::<Cents>().unwrap().cents(), 1000);
        assert_eq!("10.5".parse::<Cents>().unwrap().cents(), 1050);
        assert_eq!("10,50".parse::<Cents>().unwrap().cents(), 1050);
        assert_eq!("-0.01".parse::<Cents>().unwrap().cents(), -1);
        assert_eq!("+1.00".parse::<Cents>().unwrap().cents(), 100);
        assert_eq!(" 2.30 ".parse::<Cents>().unwrap().cents(), 230);
        assert_eq!(".5".parse::<Cents>().unwrap().cents(), 50);
        assert_eq!("7.".parse::<Cents>().unwrap().cents(), 700);
    }

    #[test]
    fn parse_rounds_extra_digits_half_away_from_zero() {
        assert_eq!("12.345".parse::<Cents>().unwrap().cents(), 1235);
        assert_eq!("12.344".parse::<Cents>().unwrap().cents(), 1234);
        assert_eq!("-0.005".parse::<Cents>().unwrap().cents(), -1);
        assert_eq!("0.999".parse::<Cents>().unwrap().cents(), 100);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<Cents>().is_err());
        assert!("-".parse::<Cents>().is_err());
        assert!(".".parse::<Cents>().is_err());
        assert!("1.2.3".parse::<Cents>().is_err());
        assert!("12a".parse::<Cents>().is_err());
    }

    #[test]
    fn normalize_keeps_empty_and_pads_digits() {
        assert_eq!(normalize_amount("").unwrap(), "");
        assert_eq!(normalize_amount("25.5").unwrap(), "25.50");
        assert_eq!(normalize_amount("3").unwrap(), "3.00");
        assert!(normalize_amount("abc").is_err());
    }

    #[test]
    fn sum_adds_all_values() {
        let total: Cents = [Cents::new(100), Cents::new(-25), Cents::new(5)]
            .into_iter()
            .sum();
        assert_eq!(total, Cents::new(80));
    }
}
