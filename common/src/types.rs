use crate::error::{PlagueError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Wire/display format for record and file dates.
pub const DATE_FORMAT: &str = "%d-%m-%Y";

/// Number of fixed age brackets used for demographic reporting.
pub const BRACKET_COUNT: usize = 4;

/// Labels for the four fixed age brackets, in ascending order.
pub const BRACKET_LABELS: [&str; BRACKET_COUNT] = ["0-20", "21-40", "41-60", "60+"];

/// Index of the age bracket an age falls into: 0-20, 21-40, 41-60, 60+.
pub fn bracket_of(age: u16) -> usize {
    match age {
        0..=20 => 0,
        21..=40 => 1,
        41..=60 => 2,
        _ => 3,
    }
}

/// Per-disease case counts, one slot per age bracket.
pub type BracketCounts = [u64; BRACKET_COUNT];

/// A single patient admission record owned by one worker's shard.
///
/// `exit_date == None` means the patient is currently admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub record_id: String,
    pub first_name: String,
    pub last_name: String,
    pub disease_id: String,
    pub country: String,
    pub age: u16,
    pub entry_date: NaiveDate,
    pub exit_date: Option<NaiveDate>,
}

impl PatientRecord {
    /// One-line summary in the shape the search-patient query answers with:
    /// `id first last disease age entry exit` (`--` for no exit).
    pub fn summary(&self) -> String {
        let entry = self.entry_date.format(DATE_FORMAT);
        let exit = match self.exit_date {
            Some(d) => d.format(DATE_FORMAT).to_string(),
            None => "--".to_string(),
        };
        format!(
            "{} {} {} {} {} {} {}",
            self.record_id,
            self.first_name,
            self.last_name,
            self.disease_id,
            self.age,
            entry,
            exit
        )
    }
}

/// Parse a `dd-mm-yyyy` date; `-` denotes an unbounded side of a range.
pub fn parse_date_bound(s: &str) -> Result<Option<NaiveDate>> {
    if s == "-" {
        return Ok(None);
    }
    parse_date(s).map(Some)
}

/// Parse a mandatory `dd-mm-yyyy` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| PlagueError::InvalidDate(s.to_string()))
}

/// Render an optional date back to its wire form (`-` when unbounded).
pub fn format_date_bound(d: Option<NaiveDate>) -> String {
    match d {
        Some(d) => d.format(DATE_FORMAT).to_string(),
        None => "-".to_string(),
    }
}
