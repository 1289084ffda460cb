use serde::{Deserialize, Serialize};

/// A calendar month in `YYYY-MM` form. The (carrier, month) aggregate key
/// uses this everywhere; ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// Parse `YYYY-MM`. Rejects out-of-range months and malformed input.
    pub fn parse(s: &str) -> Option<Self> {
        let (y, m) = s.split_once('-')?;
        if y.len() != 4 || m.len() != 2 {
            return None;
        }
        Self::new(y.parse().ok()?, m.parse().ok()?)
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    /// Inclusive range of months from `self` through `end`.
    /// Empty when `end` precedes `self`.
    pub fn through(self, end: Month) -> Vec<Month> {
        let mut months = Vec::new();
        let mut cur = self;
        while cur <= end {
            months.push(cur);
            cur = cur.next();
        }
        months
    }
}

impl std::fmt::Display for Month {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for Month {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Month {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Month::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid month '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        let m = Month::parse("2024-03").unwrap();
        assert_eq!(m, Month { year: 2024, month: 3 });
        assert_eq!(m.to_string(), "2024-03");
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(Month::parse("2024-13").is_none());
        assert!(Month::parse("2024-00").is_none());
        assert!(Month::parse("2024-3").is_none());
        assert!(Month::parse("24-03").is_none());
        assert!(Month::parse("2024/03").is_none());
    }

    #[test]
    fn range_crosses_year_boundary() {
        let months = Month::parse("2023-11").unwrap().through(Month::parse("2024-02").unwrap());
        let rendered: Vec<String> = months.iter().map(Month::to_string).collect();
        assert_eq!(rendered, vec!["2023-11", "2023-12", "2024-01", "2024-02"]);
    }

    #[test]
    fn reversed_range_is_empty() {
        let start = Month::parse("2024-05").unwrap();
        assert!(start.through(Month::parse("2024-04").unwrap()).is_empty());
    }

    #[test]
    fn ordering_is_chronological() {
        assert!(Month::parse("2023-12").unwrap() < Month::parse("2024-01").unwrap());
    }
}
