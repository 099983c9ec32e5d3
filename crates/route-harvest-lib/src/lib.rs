//! Route Harvest Library - Concurrent Coordinate Extraction from KML Routes
//!
//! This library reads a fixed set of KML route files, pulls the point and path
//! coordinate strings out of every placemark, and groups the resulting
//! latitude/longitude pairs by the file they came from. Every file is handled by
//! its own worker and all workers stream into one shared channel, so the result
//! is built by a single aggregator while the files are still being parsed.
//!
//! # Architecture
//!
//! - **[`Source`]**: Identity and byte content of one route file
//! - **[`extractor`]**: KML bytes to an ordered list of coordinate strings
//! - **[`coordinate`]**: Coordinate strings to validated [`Coordinate`] pairs
//! - **[`worker`]**: One file through extractor and parser onto the channel
//! - **[`scheduler`]**: One worker per source, first error wins
//! - **[`Aggregator`]**: Drains the channel into an [`AggregationResult`]
//! - **[`Pipeline`]**: Wires all of the above together for a [`Config`]
//!
//! # Usage Example
//!
//! ```rust
//! use route_harvest_lib::{Config, Pipeline, Source};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let kml = br#"<kml><Document><Placemark>
//!     <Point><coordinates>12.5,3.2</coordinates></Point>
//! </Placemark></Document></kml>"#;
//!
//! let sources = vec![Source::from_bytes("route-1.kml", kml.to_vec())];
//! let pipeline = Pipeline::new(Config::default(), sources)?;
//!
//! let runtime = tokio::runtime::Builder::new_current_thread().build()?;
//! let report = runtime.block_on(pipeline.run());
//!
//! assert!(report.is_success());
//! assert_eq!(report.result.get("route-1.kml").map(|c| c.len()), Some(1));
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! The aggregator is the only reader and writer of the per-source grouping, so
//! no lock guards it. The channel is bounded, which makes a slow aggregator
//! throttle the workers. There is no timeout: a worker that never finishes
//! keeps the channel open and the pipeline waits for it indefinitely.

mod aggregator;
pub mod coordinate;
pub mod extractor;
mod pipeline;
pub mod scheduler;
mod source;
pub mod utils;
pub mod worker;

// Public API exports
pub use aggregator::{AggregationResult, Aggregator, SourceSummary};
pub use coordinate::{Coordinate, ParseOptions, TaggedCoordinate};
pub use pipeline::{Config, Executor, Pipeline, PipelineReport, PipelineState};
pub use scheduler::{FailurePolicy, FirstError};
pub use source::{Source, SourceContent};

use std::num::ParseFloatError;

/// Failure to turn one coordinate string into coordinates
#[derive(Debug, thiserror::Error)]
pub enum CoordinateError {
    #[error("invalid latitude {value:?}: {error}")]
    InvalidLatitude {
        value: String,
        #[source]
        error: ParseFloatError,
    },

    #[error("invalid longitude {value:?}: {error}")]
    InvalidLongitude {
        value: String,
        #[source]
        error: ParseFloatError,
    },

    #[error("coordinate out of range: lat {latitude}, lon {longitude}")]
    OutOfRange { latitude: f64, longitude: f64 },
}

/// Failure to read coordinate strings out of a KML document
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("text is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("document has no root element")]
    EmptyDocument,

    #[error("expected <kml> root element, found <{0}>")]
    UnexpectedRoot(String),

    #[error("document ended inside <{0}>")]
    UnclosedElement(String),
}

/// Error types for the harvesting pipeline
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("error reading {key}: {error}")]
    Io {
        key: String,
        #[source]
        error: std::io::Error,
    },

    #[error("malformed document {key}: {error}")]
    Parse {
        key: String,
        #[source]
        error: ExtractError,
    },

    #[error("malformed coordinate in {key}: {error}")]
    MalformedCoordinate {
        key: String,
        #[source]
        error: CoordinateError,
    },

    #[error("output channel closed while {key} was still sending")]
    ChannelClosed { key: String },

    #[error("worker for {key} aborted")]
    WorkerAborted { key: String },

    #[error("duplicate source key: {0}")]
    DuplicateSource(String),
}

impl HarvestError {
    /// Key of the source this error belongs to
    pub fn source_key(&self) -> &str {
        match self {
            HarvestError::Io { key, .. }
            | HarvestError::Parse { key, .. }
            | HarvestError::MalformedCoordinate { key, .. }
            | HarvestError::ChannelClosed { key }
            | HarvestError::WorkerAborted { key } => key,
            HarvestError::DuplicateSource(key) => key,
        }
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
