//! The collection run, from page load to persisted observation.

use crate::dates;
use crate::dom::DomSession;
use crate::error::Error;
use crate::extract::{MetricExtractor, Selectors};
use crate::observations::Observation;
use crate::store::ObservationStore;
use chrono::NaiveDate;
use derivative::Derivative;
use std::thread;
use std::time::Duration;

/// The page the counters are published on.
pub const DEFAULT_URL: &str = "https://ttc.com.ge";
/// How long the page gets to render its counters.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(20);
/// Grace period after the counters appear, they animate up to their value.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(3);

/// Parameterizes a collection run.
#[derive(Derivative, Debug, Clone)]
#[derivative(Default)]
pub struct PipelineConfig {
    #[derivative(Default(value = "DEFAULT_URL.to_owned()"))]
    pub url: String,
    pub selectors: Selectors,
    #[derivative(Default(value = "DEFAULT_RENDER_TIMEOUT"))]
    pub render_timeout: Duration,
    #[derivative(Default(value = "DEFAULT_SETTLE_DELAY"))]
    pub settle_delay: Duration,
    /// Record under today's date when the page shows no date label at all.
    /// A label that is present but unparseable always fails the run.
    #[derivative(Default(value = "true"))]
    pub fallback_to_today: bool,
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A new observation was appended to the store.
    Recorded(Observation),
    /// The store already held this date, nothing was written.
    SkippedDuplicate(NaiveDate),
}

/// Runs collections: renders the page, resolves its date, reads the
/// counters and appends the observation.
///
/// The page can be live (a `WebDriver` session) or a saved snapshot:
///
/// ```no_run
/// use ttc_ridership::{JsonStore, Pipeline, PipelineConfig, SnapshotDom};
///
/// # fn main() -> Result<(), ttc_ridership::Error> {
/// let mut store = JsonStore::open("data/ttc_passengers.json")?;
/// let mut dom = SnapshotDom::from_file("debug_page.html")?;
/// let outcome = Pipeline::new(PipelineConfig::default()).run(&mut dom, &mut store)?;
/// println!("{:?}", outcome);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Pipeline { config }
    }

    /// Collects one observation, keying a missing date label to the current
    /// local date when the fallback is enabled.
    pub fn run(
        &self,
        dom: &mut dyn DomSession,
        store: &mut dyn ObservationStore,
    ) -> Result<Outcome, Error> {
        self.run_at(dom, store, chrono::Local::now().date_naive())
    }

    /// Same as [Pipeline::run] with an explicit "today" for the fallback.
    pub fn run_at(
        &self,
        dom: &mut dyn DomSession,
        store: &mut dyn ObservationStore,
        today: NaiveDate,
    ) -> Result<Outcome, Error> {
        let config = &self.config;
        let extractor = MetricExtractor::new(config.selectors.clone());

        dom.navigate(&config.url)?;
        log::info!(
            "waiting up to {:?} for `{}` to render",
            config.render_timeout,
            config.selectors.ready
        );
        dom.wait_for(&config.selectors.ready, config.render_timeout)?;
        if !config.settle_delay.is_zero() {
            // counters animate towards their value once visible
            thread::sleep(config.settle_delay);
        }

        let date = self.resolve_date(dom, &extractor, today)?;
        let key = dates::format_canonical(date);

        if store.exists(date)? {
            log::info!("an observation for {} already exists, nothing to do", key);
            return Ok(Outcome::SkippedDuplicate(date));
        }

        let reading = extractor.read_counters(dom)?;
        let observation = Observation::new(date, reading.counts);
        match store.append(&observation) {
            Ok(()) => {
                log::info!("recorded {}", observation);
                Ok(Outcome::Recorded(observation))
            }
            Err(Error::DuplicateDate(_)) => {
                log::warn!("{} appeared in the store mid-run, nothing written", key);
                Ok(Outcome::SkippedDuplicate(date))
            }
            Err(source) => Err(Error::StoreWrite {
                record: Box::new(observation),
                source: Box::new(source),
            }),
        }
    }

    fn resolve_date(
        &self,
        dom: &mut dyn DomSession,
        extractor: &MetricExtractor,
        today: NaiveDate,
    ) -> Result<NaiveDate, Error> {
        match extractor.find_date_label(dom) {
            Ok(label) => {
                let date = dates::parse_label(&label)?;
                log::info!(
                    "page date: {} -> {} ({})",
                    label,
                    dates::format_canonical(date),
                    dates::weekday_name(date)
                );
                Ok(date)
            }
            Err(Error::DateNotFound { tried }) => {
                if !self.config.fallback_to_today {
                    return Err(Error::DateNotFound { tried });
                }
                log::warn!(
                    "no date label on the page, falling back to today {}",
                    dates::format_canonical(today)
                );
                Ok(today)
            }
            Err(e) => Err(e),
        }
    }
}
