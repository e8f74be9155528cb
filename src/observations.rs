use crate::dates;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four transport modes published on the page.
///
/// Each mode is identified on the page by the trailing CSS class of its
/// traffic item, the `marker` here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportMode {
    Bus,
    Metro,
    Minibus,
    CableCar,
}

impl TransportMode {
    pub const ALL: [TransportMode; 4] = [
        TransportMode::Bus,
        TransportMode::Metro,
        TransportMode::Minibus,
        TransportMode::CableCar,
    ];

    /// Maps a page class marker to a mode, `None` for unrecognized markers.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "bus" => Some(TransportMode::Bus),
            "metro" => Some(TransportMode::Metro),
            "minibus" => Some(TransportMode::Minibus),
            "cable" => Some(TransportMode::CableCar),
            _ => None,
        }
    }

    /// The class marker used on the page, also the dataset column name.
    pub fn marker(self) -> &'static str {
        match self {
            TransportMode::Bus => "bus",
            TransportMode::Metro => "metro",
            TransportMode::Minibus => "minibus",
            TransportMode::CableCar => "cable",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.marker())
    }
}

/// Per-mode ridership counts for one day. `None` means the page had no
/// usable value for that mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeCounts {
    pub bus: Option<u32>,
    pub metro: Option<u32>,
    pub minibus: Option<u32>,
    pub cable: Option<u32>,
}

impl ModeCounts {
    pub fn get(&self, mode: TransportMode) -> Option<u32> {
        match mode {
            TransportMode::Bus => self.bus,
            TransportMode::Metro => self.metro,
            TransportMode::Minibus => self.minibus,
            TransportMode::CableCar => self.cable,
        }
    }

    pub fn set(&mut self, mode: TransportMode, value: Option<u32>) {
        match mode {
            TransportMode::Bus => self.bus = value,
            TransportMode::Metro => self.metro = value,
            TransportMode::Minibus => self.minibus = value,
            TransportMode::CableCar => self.cable = value,
        }
    }

    /// True when no mode carries a count at all.
    pub fn all_missing(&self) -> bool {
        TransportMode::ALL
            .iter()
            .all(|mode| self.get(*mode).is_none())
    }
}

/// One day of ridership data, the unit stored in the dataset.
///
/// The `weekday` is denormalized for human readers but always derived from
/// `date`, never read from the page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Observation {
    #[serde(
        deserialize_with = "dates::deserialize_date",
        serialize_with = "dates::serialize_date"
    )]
    pub date: NaiveDate,
    pub weekday: String,
    pub bus: Option<u32>,
    pub metro: Option<u32>,
    pub minibus: Option<u32>,
    pub cable: Option<u32>,
}

impl Observation {
    pub fn new(date: NaiveDate, counts: ModeCounts) -> Self {
        Observation {
            date,
            weekday: dates::weekday_name(date).to_owned(),
            bus: counts.bus,
            metro: counts.metro,
            minibus: counts.minibus,
            cable: counts.cable,
        }
    }

    /// The canonical `DD.MM.YYYY` key this observation is stored under.
    pub fn date_key(&self) -> String {
        dates::format_canonical(self.date)
    }

    pub fn count(&self, mode: TransportMode) -> Option<u32> {
        match mode {
            TransportMode::Bus => self.bus,
            TransportMode::Metro => self.metro,
            TransportMode::Minibus => self.minibus,
            TransportMode::CableCar => self.cable,
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.date_key(), self.weekday)?;
        for mode in TransportMode::ALL.iter() {
            match self.count(*mode) {
                Some(count) => write!(f, " {} {}", mode, count)?,
                None => write!(f, " {} n/a", mode)?,
            }
        }
        Ok(())
    }
}

#[test]
fn test_mode_markers_round_trip() {
    for mode in TransportMode::ALL.iter() {
        assert_eq!(Some(*mode), TransportMode::from_marker(mode.marker()));
    }
    assert_eq!(None, TransportMode::from_marker("tram"));
    assert_eq!(None, TransportMode::from_marker(""));
}

#[test]
fn test_observation_derives_weekday() {
    let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    let observation = Observation::new(
        date,
        ModeCounts {
            bus: Some(12345),
            metro: None,
            minibus: Some(678),
            cable: None,
        },
    );
    assert_eq!("Thursday", observation.weekday);
    assert_eq!("01.01.2026", observation.date_key());
    assert_eq!(Some(12345), observation.count(TransportMode::Bus));
    assert_eq!(None, observation.count(TransportMode::Metro));
}

#[test]
fn test_all_missing() {
    let mut counts = ModeCounts::default();
    assert!(counts.all_missing());
    counts.set(TransportMode::CableCar, Some(1));
    assert!(!counts.all_missing());
    counts.set(TransportMode::CableCar, None);
    assert!(counts.all_missing());
}
