//! Aggregator - groups tagged coordinates by source
//!
//! The aggregator is the single consumer of the shared channel. It owns the
//! grouping outright, so appends need no locking.

use crate::coordinate::{Coordinate, TaggedCoordinate};
use crate::utils;
use geo::Rect;
use std::collections::HashMap;

/// Coordinates collected per source, one entry per known source key
///
/// Entries keep the order the sources were configured in. Within an entry,
/// coordinates are in channel arrival order.
#[derive(Clone, Debug, Default)]
pub struct AggregationResult {
    entries: Vec<(String, Vec<Coordinate>)>,
    index: HashMap<String, usize>,
    discarded: usize,
}

/// Information about the coordinates collected for one source
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceSummary {
    pub key: String,
    pub coordinate_count: usize,
    /// Extent of the collected coordinates (x = longitude, y = latitude)
    pub bounding_box: Option<Rect<f64>>,
    /// Haversine length of the polyline through the coordinates, in meters
    pub total_distance_meters: f64,
}

impl AggregationResult {
    fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut result = Self::default();
        for key in keys {
            let key = key.into();
            if !result.index.contains_key(&key) {
                result.index.insert(key.clone(), result.entries.len());
                result.entries.push((key, Vec::new()));
            }
        }
        result
    }

    /// Coordinates collected for `key`, or `None` for an unknown key
    #[inline]
    pub fn get(&self, key: &str) -> Option<&[Coordinate]> {
        let &slot = self.index.get(key)?;
        Some(&self.entries[slot].1)
    }

    /// Entries in configuration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Coordinate])> {
        self.entries
            .iter()
            .map(|(key, coordinates)| (key.as_str(), coordinates.as_slice()))
    }

    /// Number of known sources
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_coordinates(&self) -> usize {
        self.entries.iter().map(|(_, coordinates)| coordinates.len()).sum()
    }

    /// Number of values dropped because their key was not a known source
    #[inline]
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Per-source counts, in configuration order
    pub fn counts(&self) -> Vec<(&str, usize)> {
        self.iter()
            .map(|(key, coordinates)| (key, coordinates.len()))
            .collect()
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn summaries(&self) -> Vec<SourceSummary> {
        self.iter()
            .map(|(key, coordinates)| SourceSummary {
                key: key.to_string(),
                coordinate_count: coordinates.len(),
                bounding_box: utils::bounding_box(coordinates),
                total_distance_meters: utils::path_length(coordinates),
            })
            .collect()
    }
}

/// Single consumer of the tagged coordinate channel
#[derive(Debug)]
pub struct Aggregator {
    result: AggregationResult,
}

impl Aggregator {
    /// Create an aggregator that accepts coordinates for `keys` only
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            result: AggregationResult::with_keys(keys),
        }
    }

    /// Append one coordinate to its source's entry.
    ///
    /// A coordinate tagged with an unknown key is logged and dropped; returns
    /// whether it was kept.
    pub fn accept(&mut self, tagged: TaggedCoordinate) -> bool {
        match self.result.index.get(&*tagged.source_key) {
            Some(&slot) => {
                self.result.entries[slot].1.push(tagged.coordinate);
                true
            }
            None => {
                tracing::warn!(
                    source = &*tagged.source_key,
                    "discarding coordinate from unknown source"
                );
                self.result.discarded += 1;
                false
            }
        }
    }

    /// Receive until the channel closes, showing each value to `observer`
    /// before it is grouped.
    pub async fn drain<F>(
        mut self,
        receiver: &mut tokio::sync::mpsc::Receiver<TaggedCoordinate>,
        mut observer: F,
    ) -> AggregationResult
    where
        F: FnMut(&TaggedCoordinate),
    {
        while let Some(tagged) = receiver.recv().await {
            observer(&tagged);
            self.accept(tagged);
        }
        self.finish()
    }

    /// Blocking variant of [`Aggregator::drain`] for `std` channels
    pub fn drain_blocking<F>(
        mut self,
        receiver: std::sync::mpsc::Receiver<TaggedCoordinate>,
        mut observer: F,
    ) -> AggregationResult
    where
        F: FnMut(&TaggedCoordinate),
    {
        for tagged in receiver {
            observer(&tagged);
            self.accept(tagged);
        }
        self.finish()
    }

    /// The grouping collected so far
    #[inline]
    pub fn result(&self) -> &AggregationResult {
        &self.result
    }

    pub fn finish(self) -> AggregationResult {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tagged(key: &str, latitude: f64, longitude: f64) -> TaggedCoordinate {
        TaggedCoordinate::new(Arc::from(key), Coordinate::new(latitude, longitude))
    }

    #[test]
    fn test_known_keys_start_empty() {
        let result = Aggregator::new(["a", "b"]).finish();
        assert_eq!(result.len(), 2);
        assert_eq!(result.get("a"), Some(&[][..]));
        assert_eq!(result.get("b"), Some(&[][..]));
        assert!(result.get("c").is_none());
        assert_eq!(result.total_coordinates(), 0);
    }

    #[test]
    fn test_groups_by_key_in_arrival_order() {
        let mut aggregator = Aggregator::new(["a", "b"]);
        assert!(aggregator.accept(tagged("a", 1.0, 1.0)));
        assert!(aggregator.accept(tagged("b", 2.0, 2.0)));
        assert!(aggregator.accept(tagged("a", 3.0, 3.0)));

        let result = aggregator.finish();
        assert_eq!(
            result.get("a").unwrap(),
            &[Coordinate::new(1.0, 1.0), Coordinate::new(3.0, 3.0)]
        );
        assert_eq!(result.get("b").unwrap(), &[Coordinate::new(2.0, 2.0)]);
        assert_eq!(result.counts(), vec![("a", 2), ("b", 1)]);
    }

    #[test]
    fn test_unknown_key_is_discarded() {
        let mut aggregator = Aggregator::new(["a"]);
        assert!(!aggregator.accept(tagged("stranger", 1.0, 1.0)));
        assert_eq!(aggregator.result().discarded(), 1);

        let result = aggregator.finish();
        assert_eq!(result.len(), 1);
        assert_eq!(result.total_coordinates(), 0);
    }

    #[test]
    fn test_duplicate_keys_collapse() {
        let result = Aggregator::new(["a", "a", "b"]).finish();
        assert_eq!(result.len(), 2);
        let keys: Vec<_> = result.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_summaries() {
        let mut aggregator = Aggregator::new(["a", "empty"]);
        aggregator.accept(tagged("a", 0.0, 0.0));
        aggregator.accept(tagged("a", 1.0, 0.0));

        let summaries = aggregator.finish().summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].key, "a");
        assert_eq!(summaries[0].coordinate_count, 2);
        assert!(summaries[0].bounding_box.is_some());
        assert!(summaries[0].total_distance_meters > 100_000.0);

        assert_eq!(summaries[1].coordinate_count, 0);
        assert!(summaries[1].bounding_box.is_none());
        assert_eq!(summaries[1].total_distance_meters, 0.0);
    }

    #[tokio::test]
    async fn test_drain_until_closed() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let producer = tokio::spawn(async move {
            for i in 0..10 {
                let key = if i % 2 == 0 { "even" } else { "odd" };
                tx.send(tagged(key, i as f64, 0.0)).await.unwrap();
            }
            tx.send(tagged("unknown", 0.0, 0.0)).await.unwrap();
        });

        let mut seen = 0;
        let result = Aggregator::new(["even", "odd"])
            .drain(&mut rx, |_| seen += 1)
            .await;
        producer.await.unwrap();

        assert_eq!(seen, 11);
        assert_eq!(result.get("even").unwrap().len(), 5);
        assert_eq!(result.get("odd").unwrap().len(), 5);
        assert_eq!(result.discarded(), 1);
    }

    #[test]
    fn test_drain_blocking_until_closed() {
        let (tx, rx) = std::sync::mpsc::sync_channel(0);
        let producer = std::thread::spawn(move || {
            for i in 0..4 {
                tx.send(tagged("a", i as f64, 0.0)).unwrap();
            }
        });

        let result = Aggregator::new(["a"]).drain_blocking(rx, |_| {});
        producer.join().unwrap();
        let latitudes: Vec<f64> = result.get("a").unwrap().iter().map(|c| c.latitude).collect();
        assert_eq!(latitudes, vec![0.0, 1.0, 2.0, 3.0]);
    }
}
