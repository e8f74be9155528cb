use crate::error::Error;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::Serializer;

/// Canonical storage format for observation dates. The formatted string is
/// also the dataset's uniqueness key.
pub const CANONICAL_FORMAT: &str = "%d.%m.%Y";

/// Month names as the page prints them, in calendar order.
pub const GEORGIAN_MONTHS: [&str; 12] = [
    "იანვარი",
    "თებერვალი",
    "მარტი",
    "აპრილი",
    "მაისი",
    "ივნისი",
    "ივლისი",
    "აგვისტო",
    "სექტემბერი",
    "ოქტომბერი",
    "ნოემბერი",
    "დეკემბერი",
];

/// Parses a date label scraped from the page.
///
/// Two grammars are accepted: the numeric `DD.MM.YYYY` form and the localized
/// `<day> <month-name> <year>` form using [GEORGIAN_MONTHS]; either way the
/// year needs four digits, so every accepted date survives a round trip
/// through [format_canonical]. Anything else is an [Error::DateParse]
/// carrying the raw label.
pub fn parse_label(raw: &str) -> Result<NaiveDate, Error> {
    let label = raw.trim();
    NaiveDate::parse_from_str(label, CANONICAL_FORMAT)
        .ok()
        .or_else(|| parse_localized(label))
        // years outside 1000..=9999 do not round-trip through the canonical form
        .filter(|date| (1000..=9999).contains(&date.year()))
        .ok_or_else(|| Error::DateParse {
            label: label.to_owned(),
        })
}

fn parse_localized(label: &str) -> Option<NaiveDate> {
    let mut parts = label.split_whitespace();
    let day: u32 = parts.next()?.parse().ok()?;
    let month = month_number(parts.next()?)?;
    let year: i32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_number(name: &str) -> Option<u32> {
    GEORGIAN_MONTHS
        .iter()
        .position(|month| *month == name)
        .map(|index| index as u32 + 1)
}

/// Formats a date in the canonical `DD.MM.YYYY` form.
pub fn format_canonical(date: NaiveDate) -> String {
    date.format(CANONICAL_FORMAT).to_string()
}

/// Full English weekday name, derived from the date rather than the page.
pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub fn deserialize_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = String::deserialize(deserializer)?;
    NaiveDate::parse_from_str(&s, CANONICAL_FORMAT).map_err(de::Error::custom)
}

pub fn serialize_date<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_canonical(*date))
}

#[test]
fn test_parse_numeric_label() {
    assert_eq!(
        NaiveDate::from_ymd_opt(2025, 3, 5).unwrap(),
        parse_label("05.03.2025").unwrap()
    );
    assert_eq!(
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        parse_label(" 01.01.2026 ").unwrap()
    );
}

#[test]
fn test_parse_localized_label() {
    assert_eq!(
        NaiveDate::from_ymd_opt(2025, 3, 5).unwrap(),
        parse_label("5 მარტი 2025").unwrap()
    );
    assert_eq!(
        NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
        parse_label("31 დეკემბერი 2026").unwrap()
    );
    assert_eq!(
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        parse_label("  1   იანვარი   2026 ").unwrap()
    );
}

#[test]
fn test_reject_malformed_labels() {
    for label in [
        "",
        "yesterday",
        "5 March 2025",
        "31.04.2025",
        "30 თებერვალი 2025",
        "05.03.25",
        "5 მარტი 2025 extra",
    ]
    .iter()
    {
        match parse_label(label) {
            Err(Error::DateParse { label: l }) => assert_eq!(label.trim(), l),
            other => panic!("label {:?} parsed as {:?}", label, other),
        }
    }
}

#[test]
fn test_both_grammars_agree() {
    let numeric = parse_label("05.03.2025").unwrap();
    let localized = parse_label("5 მარტი 2025").unwrap();
    assert_eq!(numeric, localized);
    assert_eq!("05.03.2025", format_canonical(localized));
    assert_eq!(weekday_name(numeric), weekday_name(localized));
}

#[test]
fn test_year_bounds_apply_to_both_grammars() {
    for label in [
        "01.01.1000",
        "1 იანვარი 1000",
        "31.12.9999",
        "31 დეკემბერი 9999",
    ]
    .iter()
    {
        let date = parse_label(label).unwrap();
        assert_eq!(date, parse_label(&format_canonical(date)).unwrap());
    }
    for label in [
        "5 მარტი 5",
        "5 მარტი 999",
        "5 მარტი 10000",
        "05.03.0005",
    ]
    .iter()
    {
        assert!(
            matches!(parse_label(label), Err(Error::DateParse { .. })),
            "label {:?} should not parse",
            label
        );
    }
}

#[test]
fn test_weekday_name() {
    assert_eq!(
        "Thursday",
        weekday_name(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap())
    );
    assert_eq!(
        "Saturday",
        weekday_name(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap())
    );
}

#[test]
fn test_serialize_date() {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Test {
        #[serde(
            deserialize_with = "deserialize_date",
            serialize_with = "serialize_date"
        )]
        date: NaiveDate,
    }
    let data_in = "date\n02.01.2026\n";
    let parsed: Test = csv::Reader::from_reader(data_in.as_bytes())
        .deserialize()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(), parsed.date);

    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.serialize(parsed).unwrap();
    let data_out = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
    assert_eq!(data_in, data_out);
}
