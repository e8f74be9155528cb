use crate::observations::Observation;
use std::time::Duration;
use thiserror::Error;

/// An error that can occur when collecting or storing ridership data.
#[derive(Error, Debug)]
pub enum Error {
    #[error("page never became ready: nothing matched `{selector}` within {waited:?}")]
    RenderTimeout { selector: String, waited: Duration },
    #[error("no element matched `{selector}`")]
    ElementNotFound { selector: String },
    #[error("could not locate the date label (selectors tried: {tried})")]
    DateNotFound { tried: String },
    #[error("unable to parse date: {label}")]
    DateParse { label: String },
    #[error("page rendered without usable counters ({items} traffic items found)")]
    IncompleteRender { items: usize },
    #[error("an observation for {0} already exists")]
    DuplicateDate(String),
    #[error("`{selector}` is not a valid selector: {reason}")]
    Selector { selector: String, reason: String },
    #[error("traffic element {element} could not be read: {reason}")]
    ElementRead { element: String, reason: String },
    #[error("webdriver request failed: {context}")]
    WebDriver { context: String },
    #[cfg(feature = "remote")]
    #[error("impossible to remotely access page")]
    Http(#[from] reqwest::Error),
    #[error("impossible to read or write file")]
    Io(#[from] std::io::Error),
    #[error("impossible to read or write csv file '{file_name}'")]
    Csv {
        file_name: String,
        #[source]
        source: csv::Error,
    },
    #[error("impossible to read or write json file '{file_name}'")]
    Json {
        file_name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to persist observation {record}")]
    StoreWrite {
        record: Box<Observation>,
        #[source]
        source: Box<Error>,
    },
}
