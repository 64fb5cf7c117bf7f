//! Shot naming and ordering
//!
//! A shot name is a 7–9 character identifier: the first 6 characters are a
//! calendar date (`YYMMDD`), the remainder a locally-issued suffix of one to
//! three characters. Suffixes whose first character is `E`–`Z` denote shots
//! originated on this server; numeric suffixes come from remote sync.
//!
//! Shots are sharded on disk into month directories named by the first four
//! characters (`YYMM`).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{ShotError, ShotResult};

/// Maximum suffix length after the date prefix
pub const MAX_SUFFIX_LEN: usize = 3;

/// Validated shot name (`YYMMDD` date + 1–3 character suffix)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShotName {
    raw: String,
}

impl ShotName {
    /// Parse and validate a shot name.
    ///
    /// # Errors
    ///
    /// Returns `ShotError::InvalidName` if the length, date prefix, or
    /// suffix characters are invalid.
    pub fn parse(raw: &str) -> ShotResult<Self> {
        let len = raw.len();
        if !(7..=9).contains(&len) {
            return Err(ShotError::InvalidName(format!(
                "{raw:?}: expected 7-9 characters, got {len}"
            )));
        }
        if !raw.is_ascii() {
            return Err(ShotError::InvalidName(format!("{raw:?}: not ASCII")));
        }
        let (date, suffix) = raw.split_at(6);
        if !date.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ShotError::InvalidName(format!(
                "{raw:?}: date prefix must be 6 digits"
            )));
        }
        let yy: i32 = date[0..2].parse().unwrap_or(0);
        let mm: u32 = date[2..4].parse().unwrap_or(0);
        let dd: u32 = date[4..6].parse().unwrap_or(0);
        if NaiveDate::from_ymd_opt(2000 + yy, mm, dd).is_none() {
            return Err(ShotError::InvalidName(format!(
                "{raw:?}: {date} is not a calendar date"
            )));
        }
        if !suffix
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
        {
            return Err(ShotError::InvalidName(format!(
                "{raw:?}: suffix must be digits or uppercase letters"
            )));
        }
        Ok(Self {
            raw: raw.to_string(),
        })
    }

    /// Full name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `YYMM` month-shard directory name.
    pub fn month_dir(&self) -> &str {
        &self.raw[0..4]
    }

    /// `YYMMDD` day portion.
    pub fn day(&self) -> &str {
        &self.raw[0..6]
    }

    /// Suffix after the date prefix.
    pub fn suffix(&self) -> &str {
        &self.raw[6..]
    }

    /// True when the suffix marks a locally-originated shot (`E`–`Z`).
    ///
    /// Local shots never fall back to the master database: they cannot
    /// exist anywhere else.
    pub fn is_local(&self) -> bool {
        matches!(self.suffix().as_bytes().first(), Some(b'E'..=b'Z'))
    }
}

impl fmt::Display for ShotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ShotName {
    type Err = ShotError;

    fn from_str(s: &str) -> ShotResult<Self> {
        Self::parse(s)
    }
}

impl PartialOrd for ShotName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ShotName {
    /// Ascending shot order: date first, then suffix.
    ///
    /// Suffixes of mixed length compare by length before content, so that
    /// `...2` < `...10` < `...A1` orders numerically where suffixes are
    /// numeric and lexicographically otherwise.
    fn cmp(&self, other: &Self) -> Ordering {
        self.day()
            .cmp(other.day())
            .then(self.suffix().len().cmp(&other.suffix().len()))
            .then(self.suffix().cmp(other.suffix()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_shot() {
        let name = ShotName::parse("240115E01").unwrap();
        assert_eq!(name.day(), "240115");
        assert_eq!(name.month_dir(), "2401");
        assert_eq!(name.suffix(), "E01");
        assert!(name.is_local());
    }

    #[test]
    fn test_parse_remote_shot() {
        let name = ShotName::parse("2401151").unwrap();
        assert_eq!(name.suffix(), "1");
        assert!(!name.is_local());
    }

    #[test]
    fn test_rejects_bad_length() {
        assert!(ShotName::parse("240115").is_err());
        assert!(ShotName::parse("240115E0123").is_err());
    }

    #[test]
    fn test_rejects_bad_date() {
        assert!(ShotName::parse("241315A").is_err());
        assert!(ShotName::parse("24011fA").is_err());
    }

    #[test]
    fn test_rejects_bad_suffix() {
        assert!(ShotName::parse("240115e01").is_err());
        assert!(ShotName::parse("240115-1").is_err());
    }

    #[test]
    fn test_ordering_length_before_lexicographic() {
        let a = ShotName::parse("2401152").unwrap();
        let b = ShotName::parse("24011510").unwrap();
        let c = ShotName::parse("240115A1").unwrap();
        let d = ShotName::parse("240116A1").unwrap();
        assert!(a < b, "shorter suffix orders first");
        assert!(b < c, "same length compares lexicographically");
        assert!(c < d, "date dominates");
    }

    #[test]
    fn test_sorting_mixed_day() {
        let mut shots = vec![
            ShotName::parse("240116A").unwrap(),
            ShotName::parse("24011510").unwrap(),
            ShotName::parse("2401159").unwrap(),
        ];
        shots.sort();
        let raw: Vec<&str> = shots.iter().map(|s| s.as_str()).collect();
        assert_eq!(raw, vec!["2401159", "24011510", "240116A"]);
    }
}
