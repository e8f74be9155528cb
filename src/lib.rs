//! Collects the daily ridership counters published on the Tbilisi Transport
//! Company home page and appends them, one observation per calendar day, to
//! a durable local dataset.
//!
//! The page renders its counters with JavaScript, so live collection drives
//! a real browser through the [webdriver] module. Everything downstream of
//! the rendered DOM only depends on the [dom::DomSession] trait, which lets
//! the same extraction and persistence code run against saved HTML
//! snapshots, offline and in the test suite.
//!
//! A collection run is one pass of [pipeline::Pipeline]: wait for the page
//! to render, resolve the date it claims to describe, skip the run when the
//! dataset already has that date, otherwise read the four per-mode counters
//! and append the observation.

pub mod dates;
pub mod dom;
pub mod error;
pub mod extract;
pub mod observations;
pub mod pipeline;
pub mod store;
#[cfg(feature = "remote")]
pub mod webdriver;

#[cfg(test)]
mod tests;

pub use crate::dom::{DomSession, ElementId, SnapshotDom};
pub use crate::error::Error;
pub use crate::extract::{CounterReading, MetricExtractor, Selectors, UnknownCounter};
pub use crate::observations::{ModeCounts, Observation, TransportMode};
pub use crate::pipeline::{Outcome, Pipeline, PipelineConfig};
pub use crate::store::{open_store, CsvStore, JsonStore, ObservationStore, StoreFormat};
#[cfg(feature = "remote")]
pub use crate::webdriver::WebDriver;
