// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

/// A vote share, stored in hundredths of a percent.
///
/// `Percentage::from_hundredths(5550)` is 55.50%. All the seat decisions are
/// taken on this integer representation, which keeps them exact.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Default)]
pub struct Percentage(u32);

impl Percentage {
    pub const ZERO: Percentage = Percentage(0);
    pub const FULL: Percentage = Percentage(10_000);

    pub const fn from_hundredths(hundredths: u32) -> Percentage {
        Percentage(hundredths)
    }

    pub const fn hundredths(&self) -> u32 {
        self.0
    }

    /// Parses a decimal string with at most two decimal places into a signed
    /// number of hundredths. The sign is kept so that callers can tell apart
    /// a negative value (out of range) from text that is not a number.
    pub fn parse_hundredths(raw: &str) -> Result<i64, PercentageParseError> {
        let s = raw.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty())
            || !all_digits(int_part)
            || !all_digits(frac_part)
            || frac_part.len() > 2
            || int_part.len() > 9
        {
            return Err(PercentageParseError {
                raw: raw.to_string(),
            });
        }
        let int_value: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| PercentageParseError {
                raw: raw.to_string(),
            })?
        };
        let frac_value: i64 = match frac_part.len() {
            0 => 0,
            1 => frac_part.parse::<i64>().unwrap_or(0) * 10,
            _ => frac_part.parse::<i64>().unwrap_or(0),
        };
        let value = int_value * 100 + frac_value;
        Ok(if negative { -value } else { value })
    }

    /// `numerator / denominator` as a percentage, rounded half-up.
    /// Returns `None` when the denominator is zero.
    pub fn ratio(numerator: u64, denominator: u64) -> Option<Percentage> {
        if denominator == 0 {
            return None;
        }
        let scaled = (numerator as u128) * 10_000;
        let den = denominator as u128;
        let rounded = (scaled + den / 2) / den;
        Some(Percentage(rounded.min(u32::MAX as u128) as u32))
    }

    pub fn saturating_sub(self, rhs: Percentage) -> Percentage {
        Percentage(self.0.saturating_sub(rhs.0))
    }
}

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Percentage {
    type Err = PercentageParseError;

    /// Only accepts values in `[0, 100]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let h = Percentage::parse_hundredths(s)?;
        if !(0..=(Percentage::FULL.0 as i64)).contains(&h) {
            return Err(PercentageParseError { raw: s.to_string() });
        }
        Ok(Percentage(h as u32))
    }
}

impl std::iter::Sum for Percentage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Percentage(iter.map(|p| p.0).sum())
    }
}

impl AddAssign for Percentage {
    fn add_assign(&mut self, rhs: Percentage) {
        self.0 += rhs.0;
    }
}

impl Add for Percentage {
    type Output = Percentage;
    fn add(self: Percentage, rhs: Percentage) -> Percentage {
        Percentage(self.0 + rhs.0)
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PercentageParseError {
    pub raw: String,
}

impl Error for PercentageParseError {}

impl Display for PercentageParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "not a valid percentage: {:?}", self.raw)
    }
}

/// The two chambers of the legislature.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Chamber {
    /// Proportional representation, D'Hondt with an exclusion threshold.
    Lower,
    /// Two seats for the majority, one for the first minority.
    Upper,
}

impl Chamber {
    pub const ALL: [Chamber; 2] = [Chamber::Lower, Chamber::Upper];

    pub fn code(&self) -> &'static str {
        match self {
            Chamber::Lower => "lower",
            Chamber::Upper => "upper",
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Chamber::Lower => "D'Hondt",
            Chamber::Upper => "Majority 2 + first minority 1",
        }
    }
}

impl Display for Chamber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Chamber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lower" | "diputados" | "deputies" => Ok(Chamber::Lower),
            "upper" | "senadores" | "senators" => Ok(Chamber::Upper),
            x => Err(format!("unknown chamber {:?}", x)),
        }
    }
}

/// The reported share of one list in one district and chamber.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct ListShare {
    pub list_id: String,
    /// Position on the ballot. Lower values win ties.
    pub order: u32,
    pub percentage: Percentage,
}

// ******** Output data structures *********

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SeatAllocation {
    pub list_id: String,
    pub order: u32,
    pub percentage: Percentage,
    pub seats: u32,
    /// Whether the list took part in the distribution of seats.
    pub qualified: bool,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ApportionmentResult {
    pub chamber: Chamber,
    /// The declared number of seats in dispute.
    pub seats: u32,
    /// One entry per input list, sorted with the tiebreak order.
    pub allocations: Vec<SeatAllocation>,
}

impl ApportionmentResult {
    pub fn assigned_seats(&self) -> u32 {
        self.allocations.iter().map(|a| a.seats).sum()
    }

    pub fn seats_for(&self, list_id: &str) -> u32 {
        self.allocations
            .iter()
            .find(|a| a.list_id == list_id)
            .map(|a| a.seats)
            .unwrap_or(0)
    }
}

/// Errors that prevent the algorithm from completing successfully.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ApportionmentErrors {
    DuplicateList(String),
    SharesExceedTotal(Percentage),
    UnsupportedSeatCount { chamber: Chamber, seats: u32 },
    /// Internal defect: the seats handed out do not add up to the declared count.
    SeatCountMismatch {
        chamber: Chamber,
        declared: u32,
        assigned: u32,
    },
}

impl Error for ApportionmentErrors {}

impl Display for ApportionmentErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApportionmentErrors::DuplicateList(id) => write!(f, "list {} appears twice", id),
            ApportionmentErrors::SharesExceedTotal(total) => {
                write!(f, "shares add up to {}%, above 100%", total)
            }
            ApportionmentErrors::UnsupportedSeatCount { chamber, seats } => {
                write!(f, "{} seats cannot be apportioned in the {} chamber", seats, chamber)
            }
            ApportionmentErrors::SeatCountMismatch {
                chamber,
                declared,
                assigned,
            } => write!(
                f,
                "internal error in the {} chamber: {} seats assigned out of {}",
                chamber, assigned, declared
            ),
        }
    }
}

// ********* Configuration **********

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TieBreakMode {
    /// Lower `order` first, then lower list identifier.
    UseListOrder,
    // The permutation is derived from a SHA-256 digest of the seed and the list identifier.
    Random(u32),
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ApportionmentRules {
    pub tiebreak_mode: TieBreakMode,
    /// Lists strictly below this share get no seat in the lower chamber.
    pub lower_threshold: Percentage,
}

impl ApportionmentRules {
    pub const UPPER_SEATS: u32 = 3;
    pub const UPPER_MAJORITY_SEATS: u32 = 2;
    /// Largest lower chamber renewal the engine accepts for one district.
    pub const MAX_LOWER_SEATS: u32 = 1_000;

    pub const DEFAULT_RULES: ApportionmentRules = ApportionmentRules {
        tiebreak_mode: TieBreakMode::UseListOrder,
        lower_threshold: Percentage::from_hundredths(300),
    };
}

impl Default for ApportionmentRules {
    fn default() -> Self {
        ApportionmentRules::DEFAULT_RULES
    }
}
