//! File worker: one source through the extractor and parser onto the channel
//!
//! Coordinates are sent as soon as their token is parsed. A failure stops the
//! worker right away; whatever it already sent stays sent.

use crate::coordinate::{self, Coordinate, ParseOptions, TaggedCoordinate};
use crate::{HarvestError, Result, Source, extractor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use tokio::sync::mpsc::Sender;

/// Run one source, sending every coordinate on `output`.
///
/// Returns the number of coordinates sent. Sending waits while the channel is
/// full, so a slow receiver slows the worker down.
pub async fn run(
    source: &Source,
    output: &Sender<TaggedCoordinate>,
    options: &ParseOptions,
) -> Result<usize> {
    tracing::debug!(source = source.key(), "worker started");

    let bytes = source.read().await.map_err(|error| HarvestError::Io {
        key: source.key().to_string(),
        error,
    })?;
    let tokens = extract_tokens(source, &bytes)?;

    let mut sent = 0;
    for token in &tokens {
        for coordinate in parse(source, token, options)? {
            let tagged = TaggedCoordinate::new(source.shared_key().clone(), coordinate);
            output
                .send(tagged)
                .await
                .map_err(|_| HarvestError::ChannelClosed {
                    key: source.key().to_string(),
                })?;
            sent += 1;
        }
    }

    tracing::debug!(source = source.key(), coordinates = sent, "worker finished");
    Ok(sent)
}

/// Thread-blocking variant of [`run`] for the thread-pool executor.
///
/// `cancelled` is checked before every send; once set the worker returns
/// early with what it has sent so far.
pub fn run_blocking(
    source: &Source,
    output: &SyncSender<TaggedCoordinate>,
    options: &ParseOptions,
    cancelled: &AtomicBool,
) -> Result<usize> {
    tracing::debug!(source = source.key(), "worker started");

    let bytes = source.read_blocking().map_err(|error| HarvestError::Io {
        key: source.key().to_string(),
        error,
    })?;
    let tokens = extract_tokens(source, &bytes)?;

    let mut sent = 0;
    for token in &tokens {
        for coordinate in parse(source, token, options)? {
            if cancelled.load(Ordering::Relaxed) {
                tracing::debug!(source = source.key(), coordinates = sent, "worker cancelled");
                return Ok(sent);
            }
            let tagged = TaggedCoordinate::new(source.shared_key().clone(), coordinate);
            output
                .send(tagged)
                .map_err(|_| HarvestError::ChannelClosed {
                    key: source.key().to_string(),
                })?;
            sent += 1;
        }
    }

    tracing::debug!(source = source.key(), coordinates = sent, "worker finished");
    Ok(sent)
}

fn extract_tokens(source: &Source, bytes: &[u8]) -> Result<Vec<String>> {
    extractor::extract(bytes).map_err(|error| HarvestError::Parse {
        key: source.key().to_string(),
        error,
    })
}

fn parse(source: &Source, token: &str, options: &ParseOptions) -> Result<Vec<Coordinate>> {
    coordinate::parse_token(token, options).map_err(|error| HarvestError::MalformedCoordinate {
        key: source.key().to_string(),
        error,
    })
}
