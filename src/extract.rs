//! Locating the date label and the per-mode counters on the page.

use crate::dom::{DomSession, ElementId};
use crate::error::Error;
use crate::observations::{ModeCounts, TransportMode};
use itertools::Itertools;

/// Element whose presence means the counters have rendered.
pub const READY_SELECTOR: &str = ".ttc-trafic-num";
/// Where the page prints its date, most specific location first.
pub const DATE_SELECTORS: [&str; 2] = [
    "h3.footer-title span.footer-title-date.mrglovani",
    ".footer-title-date",
];
/// One block per transport mode.
pub const TRAFFIC_ITEM_SELECTOR: &str = ".ttc-trafic-item";
/// The numeric readout nested inside a traffic item.
pub const COUNTER_SELECTOR: &str = ".ttc-trafic-num";

/// The CSS selectors the extractor works with.
///
/// Defaults target the TTC home page as it is published today; every entry
/// can be overridden when the page changes faster than a release.
#[derive(Debug, Clone)]
pub struct Selectors {
    pub ready: String,
    pub date_label: Vec<String>,
    pub traffic_item: String,
    pub counter_value: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Selectors {
            ready: READY_SELECTOR.to_owned(),
            date_label: DATE_SELECTORS.iter().map(|s| (*s).to_owned()).collect(),
            traffic_item: TRAFFIC_ITEM_SELECTOR.to_owned(),
            counter_value: COUNTER_SELECTOR.to_owned(),
        }
    }
}

/// A traffic item whose trailing class is not a known transport mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCounter {
    pub marker: String,
    pub value: Option<u32>,
}

/// Everything read from the counters section of one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterReading {
    pub counts: ModeCounts,
    /// Counters with unrecognized markers, reported but never stored.
    pub unrecognized: Vec<UnknownCounter>,
}

#[derive(Debug, Clone, Default)]
pub struct MetricExtractor {
    selectors: Selectors,
}

impl MetricExtractor {
    pub fn new(selectors: Selectors) -> Self {
        MetricExtractor { selectors }
    }

    /// Returns the raw text of the page's date label.
    ///
    /// Selectors are tried in order; within one selector, matches are
    /// scanned in document order and the first element with non-empty text
    /// wins. Elements that match but hold no text never end the search.
    pub fn find_date_label(&self, dom: &mut dyn DomSession) -> Result<String, Error> {
        for selector in &self.selectors.date_label {
            let matches = dom.find_all(selector)?;
            if matches.is_empty() {
                log::debug!("no date element for `{}`", selector);
                continue;
            }
            for element in &matches {
                let text = dom.text(element)?;
                let label = text.trim();
                if !label.is_empty() {
                    return Ok(label.to_owned());
                }
            }
            log::debug!("date elements for `{}` hold no text", selector);
        }
        Err(Error::DateNotFound {
            tried: self.selectors.date_label.iter().join(", "),
        })
    }

    /// Reads every traffic item on the page into a [CounterReading].
    ///
    /// A failure on one item is logged and leaves that mode missing; only a
    /// page where no mode yields a count is an [Error::IncompleteRender].
    pub fn read_counters(&self, dom: &mut dyn DomSession) -> Result<CounterReading, Error> {
        let items = dom.find_all(&self.selectors.traffic_item)?;
        log::info!("found {} traffic items", items.len());
        let mut reading = CounterReading::default();
        for (index, item) in items.iter().enumerate() {
            match self.read_counter_item(dom, item) {
                Ok((marker, value)) => {
                    log::info!("  {}: {:?}", marker, value);
                    match TransportMode::from_marker(&marker) {
                        Some(mode) => reading.counts.set(mode, value),
                        None => {
                            log::warn!(
                                "unrecognized transport marker `{}` on traffic item #{}",
                                marker,
                                index
                            );
                            reading.unrecognized.push(UnknownCounter { marker, value });
                        }
                    }
                }
                Err(e) => log::warn!("could not read traffic item #{}: {}", index, e),
            }
        }
        if reading.counts.all_missing() {
            return Err(Error::IncompleteRender { items: items.len() });
        }
        Ok(reading)
    }

    fn read_counter_item(
        &self,
        dom: &mut dyn DomSession,
        item: &ElementId,
    ) -> Result<(String, Option<u32>), Error> {
        let classes = dom.class_list(item)?;
        // the page encodes the mode as the last class of the item
        let marker = classes.last().cloned().ok_or_else(|| Error::ElementRead {
            element: item.to_string(),
            reason: "element has no class attribute".to_owned(),
        })?;
        let counter = dom.find_in(item, &self.selectors.counter_value)?;
        let text = dom.text(&counter)?;
        Ok((marker, parse_count(&text)))
    }
}

/// Parses a displayed counter into a count.
///
/// Thousands separators (commas and any whitespace) are stripped first.
/// Text that is not a plain decimal number reads as `None`, and so does an
/// explicit zero, which the page shows while a counter has not loaded.
pub fn parse_count(text: &str) -> Option<u32> {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match cleaned.parse::<u32>() {
        Ok(0) => None,
        Ok(count) => Some(count),
        Err(_) => None,
    }
}
