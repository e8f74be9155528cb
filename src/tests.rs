use crate::dom::SnapshotDom;
use crate::error::Error;
use crate::extract::{MetricExtractor, Selectors};
use crate::observations::{ModeCounts, Observation};
use crate::pipeline::{Outcome, Pipeline, PipelineConfig};
use crate::store::{open_store, CsvStore, JsonStore, ObservationStore, StoreFormat, CSV_HEADER};
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

fn tmp_dir(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("ttc_ridership_{}", name));
    let _ = fs::remove_dir_all(&path);
    fs::create_dir_all(&path).expect("impossible to create test directory");
    path
}

fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn quick_config() -> PipelineConfig {
    PipelineConfig {
        settle_delay: Duration::ZERO,
        ..PipelineConfig::default()
    }
}

fn counters_page(date_markup: &str, items: &str) -> String {
    format!(
        "<html><body><footer>{}<div class=\"ttc-trafic\">{}</div></footer></body></html>",
        date_markup, items
    )
}

fn item(classes: &str, value: &str) -> String {
    format!(
        "<div class=\"{}\"><span class=\"ttc-trafic-num\">{}</span></div>",
        classes, value
    )
}

fn recorded(outcome: Outcome) -> Observation {
    match outcome {
        Outcome::Recorded(observation) => observation,
        other => panic!("expected a recorded observation, got {:?}", other),
    }
}

#[test]
fn collect_from_page_fixture() {
    let dir = tmp_dir("collect_fixture");
    let store_path = dir.join("ttc_passengers.json");
    let mut store = JsonStore::open(&store_path).expect("impossible to open store");
    let mut dom =
        SnapshotDom::from_file("fixtures/ttc_home.html").expect("impossible to read fixture");

    let outcome = Pipeline::new(quick_config())
        .run_at(&mut dom, &mut store, day(2025, 8, 11))
        .expect("collection failed");

    let observation = recorded(outcome);
    assert_eq!(day(2025, 8, 10), observation.date);
    assert_eq!("Sunday", observation.weekday);
    assert_eq!(Some(412_303), observation.bus);
    assert_eq!(Some(310_062), observation.metro);
    assert_eq!(Some(145_920), observation.minibus);
    assert_eq!(Some(9_841), observation.cable);

    let raw = fs::read_to_string(&store_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!("10.08.2025", parsed[0]["date"]);
    assert_eq!("Sunday", parsed[0]["weekday"]);
    assert_eq!(412_303, parsed[0]["bus"]);
    assert_eq!(9_841, parsed[0]["cable"]);
}

#[test]
fn second_run_for_same_date_writes_nothing() {
    let dir = tmp_dir("duplicate_run");
    let store_path = dir.join("ttc_passengers.json");
    let mut store = JsonStore::open(&store_path).expect("impossible to open store");
    let pipeline = Pipeline::new(quick_config());

    let mut dom = SnapshotDom::from_file("fixtures/ttc_home.html").unwrap();
    pipeline
        .run_at(&mut dom, &mut store, day(2025, 8, 11))
        .expect("first run failed");
    let after_first = fs::read_to_string(&store_path).unwrap();

    let mut dom = SnapshotDom::from_file("fixtures/ttc_home.html").unwrap();
    let outcome = pipeline
        .run_at(&mut dom, &mut store, day(2025, 8, 11))
        .expect("second run failed");

    assert_eq!(Outcome::SkippedDuplicate(day(2025, 8, 10)), outcome);
    assert_eq!(after_first, fs::read_to_string(&store_path).unwrap());
    assert_eq!(1, store.load_all().unwrap().len());
}

#[test]
fn partial_page_keeps_what_it_can() {
    let dir = tmp_dir("partial_page");
    let store_path = dir.join("ttc_passengers.json");
    let mut store = JsonStore::open(&store_path).expect("impossible to open store");
    let mut dom = SnapshotDom::from_file("fixtures/ttc_home_partial.html")
        .expect("impossible to read fixture");

    let outcome = Pipeline::new(quick_config())
        .run_at(&mut dom, &mut store, day(2025, 3, 1))
        .expect("collection failed");

    let observation = recorded(outcome);
    assert_eq!(day(2025, 2, 28), observation.date);
    assert_eq!("Friday", observation.weekday);
    assert_eq!(Some(398_117), observation.bus);
    // the metro item lost its readout, the cable counter rendered as 0
    assert_eq!(None, observation.metro);
    assert_eq!(Some(152_406), observation.minibus);
    assert_eq!(None, observation.cable);

    let raw = fs::read_to_string(&store_path).unwrap();
    assert!(raw.contains("\"metro\": null"));
    assert!(raw.contains("\"cable\": null"));
}

#[test]
fn unknown_markers_are_reported_not_stored() {
    let mut dom = SnapshotDom::from_file("fixtures/ttc_home_partial.html").unwrap();
    let reading = MetricExtractor::new(Selectors::default())
        .read_counters(&mut dom)
        .expect("impossible to read counters");

    assert_eq!(1, reading.unrecognized.len());
    assert_eq!("tram", reading.unrecognized[0].marker);
    assert_eq!(Some(4_815), reading.unrecognized[0].value);
}

#[test]
fn all_null_page_aborts_without_write() {
    let dir = tmp_dir("all_null");
    let store_path = dir.join("ttc_passengers.json");
    let mut store = JsonStore::open(&store_path).expect("impossible to open store");
    let items = [
        item("ttc-trafic-item bus", "0"),
        item("ttc-trafic-item metro", "loading"),
        item("ttc-trafic-item minibus", ""),
        item("ttc-trafic-item cable", "0"),
    ]
    .join("");
    let page = counters_page(
        "<span class=\"footer-title-date mrglovani\">10 აგვისტო 2025</span>",
        &items,
    );
    let mut dom = SnapshotDom::from_html(&page);

    let err = Pipeline::new(quick_config())
        .run_at(&mut dom, &mut store, day(2025, 8, 11))
        .unwrap_err();

    match err {
        Error::IncompleteRender { items } => assert_eq!(4, items),
        other => panic!("unexpected error: {}", other),
    }
    assert!(store.load_all().unwrap().is_empty());
}

#[test]
fn missing_date_label_falls_back_to_today() {
    let dir = tmp_dir("date_fallback");
    let mut store = JsonStore::open(dir.join("ttc_passengers.json")).unwrap();
    let page = counters_page("", &item("ttc-trafic-item bus", "400,000"));
    let mut dom = SnapshotDom::from_html(&page);

    let outcome = Pipeline::new(quick_config())
        .run_at(&mut dom, &mut store, day(2026, 1, 2))
        .expect("collection failed");

    let observation = recorded(outcome);
    assert_eq!(day(2026, 1, 2), observation.date);
    assert_eq!("Friday", observation.weekday);
}

#[test]
fn missing_date_label_without_fallback_fails() {
    let dir = tmp_dir("date_no_fallback");
    let mut store = JsonStore::open(dir.join("ttc_passengers.json")).unwrap();
    let config = PipelineConfig {
        fallback_to_today: false,
        settle_delay: Duration::ZERO,
        ..PipelineConfig::default()
    };
    let page = counters_page("", &item("ttc-trafic-item bus", "400,000"));
    let mut dom = SnapshotDom::from_html(&page);

    let err = Pipeline::new(config)
        .run_at(&mut dom, &mut store, day(2026, 1, 2))
        .unwrap_err();

    assert!(matches!(err, Error::DateNotFound { .. }));
    assert!(store.load_all().unwrap().is_empty());
}

#[test]
fn unparseable_date_label_is_fatal_even_with_fallback() {
    let dir = tmp_dir("date_unparseable");
    let mut store = JsonStore::open(dir.join("ttc_passengers.json")).unwrap();
    let page = counters_page(
        "<span class=\"footer-title-date\">განახლდება მალე</span>",
        &item("ttc-trafic-item bus", "400,000"),
    );
    let mut dom = SnapshotDom::from_html(&page);

    let err = Pipeline::new(quick_config())
        .run_at(&mut dom, &mut store, day(2026, 1, 2))
        .unwrap_err();

    match err {
        Error::DateParse { label } => assert_eq!("განახლდება მალე", label),
        other => panic!("unexpected error: {}", other),
    }
    assert!(store.load_all().unwrap().is_empty());
}

#[test]
fn date_selector_chain_tries_looser_match() {
    let page = counters_page(
        "<div class=\"widget\"><span class=\"footer-title-date\">11 აგვისტო 2025</span></div>",
        &item("ttc-trafic-item bus", "405,112"),
    );
    let mut dom = SnapshotDom::from_html(&page);
    let label = MetricExtractor::new(Selectors::default())
        .find_date_label(&mut dom)
        .expect("no label found");
    assert_eq!("11 აგვისტო 2025", label);
}

#[test]
fn empty_date_element_does_not_end_the_search() {
    let page = counters_page(
        "<h3 class=\"footer-title\"><span class=\"footer-title-date mrglovani\">   </span></h3>\
         <div><span class=\"footer-title-date\">12 აგვისტო 2025</span></div>",
        &item("ttc-trafic-item bus", "405,112"),
    );
    let mut dom = SnapshotDom::from_html(&page);
    let label = MetricExtractor::new(Selectors::default())
        .find_date_label(&mut dom)
        .expect("no label found");
    assert_eq!("12 აგვისტო 2025", label);
}

#[test]
fn page_without_counters_never_becomes_ready() {
    let dir = tmp_dir("not_ready");
    let mut store = JsonStore::open(dir.join("ttc_passengers.json")).unwrap();
    let mut dom = SnapshotDom::from_html("<html><body><p>maintenance</p></body></html>");

    let err = Pipeline::new(quick_config())
        .run_at(&mut dom, &mut store, day(2025, 8, 11))
        .unwrap_err();

    assert!(matches!(err, Error::RenderTimeout { .. }));
    assert!(store.load_all().unwrap().is_empty());
}

#[test]
fn duplicate_check_happens_before_counters_are_read() {
    let dir = tmp_dir("duplicate_before_read");
    let mut store = JsonStore::open(dir.join("ttc_passengers.json")).unwrap();
    store
        .append(&Observation::new(
            day(2025, 2, 28),
            ModeCounts {
                bus: Some(398_117),
                ..ModeCounts::default()
            },
        ))
        .unwrap();

    // counters on this page are all unusable, reading them would fail
    let page = counters_page(
        "<span class=\"footer-title-date\">28.02.2025</span>",
        &item("ttc-trafic-item bus", "0"),
    );
    let mut dom = SnapshotDom::from_html(&page);

    let outcome = Pipeline::new(quick_config())
        .run_at(&mut dom, &mut store, day(2025, 3, 1))
        .expect("collection failed");
    assert_eq!(Outcome::SkippedDuplicate(day(2025, 2, 28)), outcome);
}

#[test]
fn csv_store_appends_one_row_per_day() {
    let dir = tmp_dir("csv_store");
    let path = dir.join("ttc_passengers.csv");
    let mut store = CsvStore::open(&path).expect("impossible to open store");
    let first = Observation::new(
        day(2025, 8, 10),
        ModeCounts {
            bus: Some(412_303),
            metro: Some(310_062),
            minibus: Some(145_920),
            cable: Some(9_841),
        },
    );
    let second = Observation::new(
        day(2025, 8, 11),
        ModeCounts {
            bus: Some(405_112),
            metro: None,
            minibus: Some(151_000),
            cable: None,
        },
    );
    store.append(&first).unwrap();
    store.append(&second).unwrap();

    assert_eq!(vec![first.clone(), second.clone()], store.load_all().unwrap());
    assert!(store.exists(day(2025, 8, 10)).unwrap());
    assert!(!store.exists(day(2025, 8, 12)).unwrap());

    match store.append(&first).unwrap_err() {
        Error::DuplicateDate(key) => assert_eq!("10.08.2025", key),
        other => panic!("unexpected error: {}", other),
    }

    let raw = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(3, lines.len());
    assert_eq!(CSV_HEADER.join(","), lines[0]);
    assert_eq!("10.08.2025,Sunday,412303,310062,145920,9841", lines[1]);
    assert_eq!("11.08.2025,Monday,405112,,151000,", lines[2]);
}

#[test]
fn csv_store_reopen_keeps_single_header() {
    let dir = tmp_dir("csv_reopen");
    let path = dir.join("ttc_passengers.csv");
    {
        let mut store = CsvStore::open(&path).unwrap();
        store
            .append(&Observation::new(
                day(2025, 8, 10),
                ModeCounts {
                    bus: Some(412_303),
                    ..ModeCounts::default()
                },
            ))
            .unwrap();
    }
    let mut store = CsvStore::open(&path).unwrap();
    store
        .append(&Observation::new(
            day(2025, 8, 11),
            ModeCounts {
                bus: Some(405_112),
                ..ModeCounts::default()
            },
        ))
        .unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    assert_eq!(1, raw.lines().filter(|line| line.starts_with("date,")).count());
    assert_eq!(2, store.load_all().unwrap().len());
}

#[test]
fn json_store_is_pretty_and_insertion_ordered() {
    let dir = tmp_dir("json_shape");
    let path = dir.join("ttc_passengers.json");
    let mut store = JsonStore::open(&path).unwrap();
    let newer = Observation::new(
        day(2025, 8, 11),
        ModeCounts {
            bus: Some(2),
            ..ModeCounts::default()
        },
    );
    let older = Observation::new(
        day(2025, 8, 10),
        ModeCounts {
            bus: Some(1),
            ..ModeCounts::default()
        },
    );
    store.append(&newer).unwrap();
    store.append(&older).unwrap();

    // appends never reorder what is already stored
    assert_eq!(vec![newer, older], store.load_all().unwrap());

    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.starts_with("[\n  {\n    \"date\": \"11.08.2025\","));
    assert!(raw.contains("\"metro\": null"));
    assert!(!dir.join("ttc_passengers.json.tmp").exists());
}

#[test]
fn stores_bootstrap_their_files() {
    let dir = tmp_dir("bootstrap");
    let json_path = dir.join("nested/data/ttc_passengers.json");
    let store = JsonStore::open(&json_path).expect("impossible to bootstrap json store");
    assert!(store.load_all().unwrap().is_empty());
    assert_eq!("[]\n", fs::read_to_string(&json_path).unwrap());

    let csv_path = dir.join("nested/data/ttc_passengers.csv");
    let store = CsvStore::open(&csv_path).expect("impossible to bootstrap csv store");
    assert!(store.load_all().unwrap().is_empty());
    assert_eq!(
        "date,weekday,bus,metro,minibus,cable\n",
        fs::read_to_string(&csv_path).unwrap()
    );
}

#[test]
fn open_store_picks_backend_by_format() {
    let dir = tmp_dir("open_store");
    let mut store = open_store(StoreFormat::Csv, dir.join("data.csv")).unwrap();
    store
        .append(&Observation::new(
            day(2025, 8, 10),
            ModeCounts {
                bus: Some(1),
                ..ModeCounts::default()
            },
        ))
        .unwrap();
    assert!(store.exists(day(2025, 8, 10)).unwrap());
    assert!(fs::read_to_string(dir.join("data.csv"))
        .unwrap()
        .starts_with("date,weekday"));
}

struct RacingStore;

impl ObservationStore for RacingStore {
    fn exists(&self, _date: NaiveDate) -> Result<bool, Error> {
        Ok(false)
    }
    fn append(&mut self, observation: &Observation) -> Result<(), Error> {
        Err(Error::DuplicateDate(observation.date_key()))
    }
    fn load_all(&self) -> Result<Vec<Observation>, Error> {
        Ok(Vec::new())
    }
}

#[test]
fn append_level_duplicate_is_still_a_skip() {
    let page = counters_page(
        "<span class=\"footer-title-date\">10 აგვისტო 2025</span>",
        &item("ttc-trafic-item bus", "402,118"),
    );
    let mut dom = SnapshotDom::from_html(&page);
    let mut store = RacingStore;

    let outcome = Pipeline::new(quick_config())
        .run_at(&mut dom, &mut store, day(2025, 8, 11))
        .expect("collection failed");
    assert_eq!(Outcome::SkippedDuplicate(day(2025, 8, 10)), outcome);
}

struct BrokenStore;

impl ObservationStore for BrokenStore {
    fn exists(&self, _date: NaiveDate) -> Result<bool, Error> {
        Ok(false)
    }
    fn append(&mut self, _observation: &Observation) -> Result<(), Error> {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        )))
    }
    fn load_all(&self) -> Result<Vec<Observation>, Error> {
        Ok(Vec::new())
    }
}

#[test]
fn store_failures_carry_the_record() {
    let page = counters_page(
        "<span class=\"footer-title-date\">10 აგვისტო 2025</span>",
        &item("ttc-trafic-item bus", "402,118"),
    );
    let mut dom = SnapshotDom::from_html(&page);
    let mut store = BrokenStore;

    let err = Pipeline::new(quick_config())
        .run_at(&mut dom, &mut store, day(2025, 8, 11))
        .unwrap_err();

    match err {
        Error::StoreWrite { record, .. } => {
            assert_eq!(day(2025, 8, 10), record.date);
            assert_eq!(Some(402_118), record.bus);
        }
        other => panic!("unexpected error: {}", other),
    }
}
