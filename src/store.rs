//! Durable, append-only persistence for observations.
//!
//! Two interchangeable backends exist: a pretty-printed JSON array, the
//! dataset's native format, and a CSV file for spreadsheet work. Both refuse
//! to append a second observation for a date that is already present and
//! both preserve insertion order.

use crate::error::Error;
use crate::observations::Observation;
use chrono::NaiveDate;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Column order of the CSV backend, also the JSON field order.
pub const CSV_HEADER: [&str; 6] = ["date", "weekday", "bus", "metro", "minibus", "cable"];

pub trait ObservationStore {
    /// Whether an observation for `date` is already recorded.
    fn exists(&self, date: NaiveDate) -> Result<bool, Error>;
    /// Appends an observation, failing with [Error::DuplicateDate] when its
    /// date is already present.
    fn append(&mut self, observation: &Observation) -> Result<(), Error>;
    /// Every stored observation, oldest first.
    fn load_all(&self) -> Result<Vec<Observation>, Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFormat {
    Json,
    Csv,
}

impl StoreFormat {
    /// Guesses a format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            ext if ext.eq_ignore_ascii_case("json") => Some(StoreFormat::Json),
            ext if ext.eq_ignore_ascii_case("csv") => Some(StoreFormat::Csv),
            _ => None,
        }
    }
}

impl FromStr for StoreFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(StoreFormat::Json),
            "csv" => Ok(StoreFormat::Csv),
            _ => Err(format!("unknown store format `{}` (expected json or csv)", s)),
        }
    }
}

impl fmt::Display for StoreFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreFormat::Json => write!(f, "json"),
            StoreFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Opens (creating if needed) a store of the given format.
pub fn open_store(
    format: StoreFormat,
    path: impl Into<PathBuf>,
) -> Result<Box<dyn ObservationStore>, Error> {
    match format {
        StoreFormat::Json => Ok(Box::new(JsonStore::open(path)?)),
        StoreFormat::Csv => Ok(Box::new(CsvStore::open(path)?)),
    }
}

fn ensure_parent(path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// JSON array backend. The whole file is rewritten on every append, through
/// a temporary file so a crash cannot leave a half-written dataset behind.
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let store = JsonStore { path: path.into() };
        if !store.path.exists() {
            ensure_parent(&store.path)?;
            store.write_records(&[])?;
        }
        Ok(store)
    }

    fn file_name(&self) -> String {
        self.path.display().to_string()
    }

    fn write_records(&self, records: &[Observation]) -> Result<(), Error> {
        let tmp = self.path.with_extension("json.tmp");
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut writer, records).map_err(|e| Error::Json {
            file_name: self.file_name(),
            source: e,
        })?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ObservationStore for JsonStore {
    fn exists(&self, date: NaiveDate) -> Result<bool, Error> {
        Ok(self.load_all()?.iter().any(|o| o.date == date))
    }

    fn append(&mut self, observation: &Observation) -> Result<(), Error> {
        let mut records = self.load_all()?;
        if records.iter().any(|o| o.date == observation.date) {
            return Err(Error::DuplicateDate(observation.date_key()));
        }
        records.push(observation.clone());
        self.write_records(&records)
    }

    fn load_all(&self) -> Result<Vec<Observation>, Error> {
        let file = File::open(&self.path)?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::Json {
            file_name: self.file_name(),
            source: e,
        })
    }
}

/// CSV backend. The header row is written once at creation, appends add one
/// row and never rewrite what is already on disk.
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let store = CsvStore { path: path.into() };
        if !store.path.exists() {
            ensure_parent(&store.path)?;
            let mut writer = csv::Writer::from_path(&store.path).map_err(|e| Error::Csv {
                file_name: store.file_name(),
                source: e,
            })?;
            writer
                .write_record(&CSV_HEADER)
                .and_then(|_| writer.flush().map_err(csv::Error::from))
                .map_err(|e| Error::Csv {
                    file_name: store.file_name(),
                    source: e,
                })?;
        }
        Ok(store)
    }

    fn file_name(&self) -> String {
        self.path.display().to_string()
    }
}

impl ObservationStore for CsvStore {
    fn exists(&self, date: NaiveDate) -> Result<bool, Error> {
        Ok(self.load_all()?.iter().any(|o| o.date == date))
    }

    fn append(&mut self, observation: &Observation) -> Result<(), Error> {
        if self.exists(observation.date)? {
            return Err(Error::DuplicateDate(observation.date_key()));
        }
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.serialize(observation).map_err(|e| Error::Csv {
            file_name: self.file_name(),
            source: e,
        })?;
        writer.flush()?;
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Observation>, Error> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Fields)
            .from_path(&self.path)
            .map_err(|e| Error::Csv {
                file_name: self.file_name(),
                source: e,
            })?;
        let mut observations = Vec::new();
        for record in reader.deserialize() {
            let observation: Observation = record.map_err(|e| Error::Csv {
                file_name: self.file_name(),
                source: e,
            })?;
            observations.push(observation);
        }
        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_path() {
        assert_eq!(
            Some(StoreFormat::Json),
            StoreFormat::from_path(Path::new("data/ttc_passengers.json"))
        );
        assert_eq!(
            Some(StoreFormat::Csv),
            StoreFormat::from_path(Path::new("out.CSV"))
        );
        assert_eq!(None, StoreFormat::from_path(Path::new("dataset")));
        assert_eq!(None, StoreFormat::from_path(Path::new("dump.html")));
    }

    #[test]
    fn format_from_str() {
        assert_eq!(Ok(StoreFormat::Json), "json".parse());
        assert_eq!(Ok(StoreFormat::Csv), "CSV".parse());
        assert!("yaml".parse::<StoreFormat>().is_err());
    }
}
