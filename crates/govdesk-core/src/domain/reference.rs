use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

const DATE_FORMAT: &str = "%Y%m%d";
const DATE_LEN: usize = 8;
const MIN_SEQUENCE_DIGITS: usize = 4;

/// Value object: reference number such as `LA202403150007`
///
/// Layout is `<prefix><YYYYMMDD><sequence>`, the sequence zero-padded to at
/// least four digits and counted per prefix and day. Ordering is by
/// prefix, then date, then numeric sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceNumber(String);

impl ReferenceNumber {
    /// Build a reference number
    pub fn new(prefix: &str, date: NaiveDate, sequence: u32) -> Self {
        Self(format!(
            "{}{}{:0width$}",
            prefix,
            date.format(DATE_FORMAT),
            sequence,
            width = MIN_SEQUENCE_DIGITS
        ))
    }

    /// Borrow as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into prefix, date digits and sequence
    fn parts(&self) -> (&str, &str, u64) {
        let digits_start = self
            .0
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(self.0.len());
        let (prefix, digits) = self.0.split_at(digits_start);
        let date_end = digits.len().min(DATE_LEN);
        let (date, sequence) = digits.split_at(date_end);
        (prefix, date, sequence.parse().unwrap_or(0))
    }
}

impl Ord for ReferenceNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts()
            .cmp(&other.parts())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for ReferenceNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ReferenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
