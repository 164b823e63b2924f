//! Shared domain types
//!
//! A [`ReportingPeriod`] identifies which month's dataset a source file holds.
//! Periods compare as a single `YYYYMM` integer so "2019-09" sorts before
//! "2019-12" regardless of how the text was formatted.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::TercError;

/// Calendar year-month a source file reports on.
///
/// Periods discovered from URLs keep the digits exactly as published, so the
/// month is not range-checked there; such a period simply fails
/// [`ReportingPeriod::first_day`]. Periods parsed from user input with
/// [`FromStr`] must name a real month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReportingPeriod {
    year: u16,
    month: u8,
}

impl ReportingPeriod {
    /// Smallest period any `YYYYMM` token can encode
    pub const MIN: Self = Self { year: 0, month: 0 };

    /// Largest period any `YYYYMM` token can encode
    pub const MAX: Self = Self {
        year: 9999,
        month: 99,
    };

    /// Create a period from a year and a real month (1-12)
    pub fn new(year: u16, month: u8) -> crate::Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(TercError::InvalidPeriod(format!("{:04}-{:02}", year, month)));
        }
        Ok(Self { year, month })
    }

    /// Build a period from a six-digit `YYYYMM` token as found in a URL.
    ///
    /// Returns `None` unless the token is exactly six ASCII digits.
    pub fn from_digits(token: &str) -> Option<Self> {
        if token.len() != 6 || !token.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let year = token[..4].parse().ok()?;
        let month = token[4..].parse().ok()?;
        Some(Self { year, month })
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    /// Single integer used for all period comparisons
    pub fn yyyymm(&self) -> u32 {
        u32::from(self.year) * 100 + u32::from(self.month)
    }

    /// `YYYY-MM-01` text of the period's first day
    pub fn first_day_literal(&self) -> String {
        format!("{}-01", self)
    }

    /// Tolerant cast of [`Self::first_day_literal`] to a date; `None` when the
    /// digits do not form a calendar date.
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.first_day_literal(), "%Y-%m-%d").ok()
    }
}

impl Ord for ReportingPeriod {
    fn cmp(&self, other: &Self) -> Ordering {
        self.yyyymm().cmp(&other.yyyymm())
    }
}

impl PartialOrd for ReportingPeriod {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for ReportingPeriod {
    type Err = TercError;

    /// Parse `YYYY-MM` (or `YYYYMM`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits: String = match trimmed.split_once('-') {
            Some((year, month)) if year.len() == 4 && month.len() == 2 => {
                format!("{}{}", year, month)
            },
            Some(_) => return Err(TercError::InvalidPeriod(s.to_string())),
            None => trimmed.to_string(),
        };

        let period = Self::from_digits(&digits)
            .ok_or_else(|| TercError::InvalidPeriod(s.to_string()))?;
        Self::new(period.year, period.month)
    }
}

impl TryFrom<String> for ReportingPeriod {
    type Error = TercError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReportingPeriod> for String {
    fn from(period: ReportingPeriod) -> Self {
        period.to_string()
    }
}

/// Format of a published source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Csv,
    Spreadsheet,
}

impl FileKind {
    /// Map a link's file extension to its kind
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(FileKind::Csv),
            "xlsx" => Some(FileKind::Spreadsheet),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileKind::Csv => "csv",
            FileKind::Spreadsheet => "xlsx",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for FileKind {
    type Err = TercError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| TercError::UnknownFileKind(s.to_string()))
    }
}

/// A remote file discovered on the portal index page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceFile {
    pub url: String,
    pub kind: FileKind,
    pub period: ReportingPeriod,
}

/// Transformation maturity stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Raw,
    Bronze,
    Silver,
    Gold,
}

impl Layer {
    /// Layers materialized by the transformation stage, in build order
    pub const DERIVED: [Layer; 3] = [Layer::Bronze, Layer::Silver, Layer::Gold];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Raw => "raw",
            Layer::Bronze => "bronze",
            Layer::Silver => "silver",
            Layer::Gold => "gold",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layer {
    type Err = TercError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "raw" => Ok(Layer::Raw),
            "bronze" => Ok(Layer::Bronze),
            "silver" => Ok(Layer::Silver),
            "gold" => Ok(Layer::Gold),
            _ => Err(TercError::UnknownLayer(s.to_string())),
        }
    }
}
