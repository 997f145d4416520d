use std::collections::HashSet;
use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike, Weekday};

use crate::model::Instrument;

/// First bookable minute of the day.
pub const OPENING: (u32, u32) = (8, 0);
/// Slots end at or before this wall-clock time.
pub const CLOSING: (u32, u32) = (17, 0);
pub const SLOT_MINUTES: i64 = 30;

/// One half-hour slot on a date. Identity is `(date, label)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub label: String,
}

/// `8:00 AM`, `12:30 PM`: hour without padding, minutes padded.
pub fn format_time(t: NaiveTime) -> String {
    let (pm, hour) = t.hour12();
    let suffix = if pm { "PM" } else { "AM" };
    format!("{hour}:{:02} {suffix}", t.minute())
}

pub fn slot_label(start: NaiveTime, end: NaiveTime) -> String {
    format!("{} - {}", format_time(start), format_time(end))
}

/// Ordered slots from opening to closing on `date`.
pub fn slots_for_date(date: NaiveDate) -> Vec<Slot> {
    let (Some(open), Some(close)) = (
        NaiveTime::from_hms_opt(OPENING.0, OPENING.1, 0),
        NaiveTime::from_hms_opt(CLOSING.0, CLOSING.1, 0),
    ) else {
        return Vec::new();
    };
    let step = Duration::minutes(SLOT_MINUTES);

    let mut slots = Vec::new();
    let mut cursor = open;
    while cursor < close {
        let next = cursor + step;
        slots.push(Slot {
            date,
            start: cursor,
            end: next,
            label: slot_label(cursor, next),
        });
        cursor = next;
    }
    slots
}

pub fn slot_labels(date: NaiveDate) -> Vec<String> {
    slots_for_date(date).into_iter().map(|s| s.label).collect()
}

pub fn is_valid_slot(date: NaiveDate, label: &str) -> bool {
    slots_for_date(date).iter().any(|s| s.label == label)
}

/// Look up a slot by its start time written as `HH:MM` (24-hour) or by its full label.
pub fn find_slot(date: NaiveDate, query: &str) -> Option<Slot> {
    let start = NaiveTime::parse_from_str(query, "%H:%M").ok();
    slots_for_date(date)
        .into_iter()
        .find(|s| s.label == query || Some(s.start) == start)
}

/// Friday rolls to Monday; every other day rolls to the next calendar day.
/// Holidays are not considered.
pub fn next_bookable_date(today: NaiveDate) -> NaiveDate {
    let days = if today.weekday() == Weekday::Fri { 3 } else { 1 };
    today + Duration::days(days)
}

// ── Instrument catalog ───────────────────────────────────────────

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    DuplicateName(String),
    Empty,
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(e) => write!(f, "cannot read instrument catalog: {e}"),
            CatalogError::Parse(e) => write!(f, "invalid instrument catalog: {e}"),
            CatalogError::DuplicateName(name) => write!(f, "duplicate instrument name: {name}"),
            CatalogError::Empty => write!(f, "instrument catalog is empty"),
        }
    }
}

impl std::error::Error for CatalogError {}

fn instrument(name: &str, os: Option<&str>, group: Option<&str>, ip: Option<&str>) -> Instrument {
    Instrument {
        name: name.into(),
        os: os.map(Into::into),
        group: group.map(Into::into),
        ip: ip.map(Into::into),
    }
}

/// Built-in fleet used when no catalog file is configured.
pub fn default_instruments() -> Vec<Instrument> {
    vec![
        instrument("MSO46B-Q000024", Some("Linux"), Some("G8"), Some("10.233.67.6")),
        instrument("MSO56-Q100057", Some("Linux"), Some("G8"), Some("10.233.66.244")),
        instrument("MSO58B-PQ010001", Some("Windows"), Some("G8"), Some("10.233.65.193")),
        instrument("MSO54B-PQ010002", Some("Linux"), Some("G8"), Some("10.233.65.195")),
        instrument("DPO71A-KR20007", None, Some("G8"), None),
        instrument("MSO68B-B030015", Some("Windows"), Some("G8"), Some("10.233.67.178")),
        instrument("MSO58B-C067209", None, Some("G8"), None),
        instrument("MSO44B-SGVJ010550", Some("Linux"), None, Some("10.233.67.186")),
    ]
}

pub fn parse_instruments(json: &str) -> Result<Vec<Instrument>, CatalogError> {
    let instruments: Vec<Instrument> = serde_json::from_str(json).map_err(CatalogError::Parse)?;
    validate_instruments(&instruments)?;
    Ok(instruments)
}

pub fn load_instruments(path: &Path) -> Result<Vec<Instrument>, CatalogError> {
    let json = std::fs::read_to_string(path).map_err(CatalogError::Io)?;
    parse_instruments(&json)
}

fn validate_instruments(instruments: &[Instrument]) -> Result<(), CatalogError> {
    if instruments.is_empty() {
        return Err(CatalogError::Empty);
    }
    let mut seen = HashSet::new();
    for inst in instruments {
        if !seen.insert(inst.name.as_str()) {
            return Err(CatalogError::DuplicateName(inst.name.clone()));
        }
    }
    Ok(())
}
