//! Latency distribution backed by an HDR histogram.
//!
//! Samples are recorded in microseconds between 1 µs and 60 s at three significant
//! digits, so memory stays constant however long a run lasts. Zero is clamped to 1 µs and
//! anything past the upper bound to 60 s.

use std::time::Duration;

use hdrhistogram::Histogram;
use hdrhistogram::serialization::{Deserializer as HistogramReader, Serializer as _, V2Serializer};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de, ser};

const LOWEST_US: u64 = 1;
const HIGHEST_US: u64 = 60_000_000;
const SIGNIFICANT_DIGITS: u8 = 3;

/// Mergeable latency distribution.
///
/// Empty until the first sample, so a default value costs nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencyHistogram(Option<Histogram<u64>>);

fn new_histogram() -> Result<Histogram<u64>, hdrhistogram::CreationError> {
    Histogram::new_with_bounds(LOWEST_US, HIGHEST_US, SIGNIFICANT_DIGITS)
}

impl LatencyHistogram {
    pub fn record(&mut self, latency: Duration) {
        if self.0.is_none() {
            match new_histogram() {
                Ok(h) => self.0 = Some(h),
                Err(e) => {
                    tracing::warn!(error = ?e, "Could not allocate latency histogram");
                    return;
                }
            }
        }
        if let Some(h) = self.0.as_mut() {
            let us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
            h.saturating_record(us.max(LOWEST_US));
        }
    }

    pub fn merge(&mut self, other: &LatencyHistogram) {
        let Some(theirs) = &other.0 else {
            return;
        };
        match self.0.as_mut() {
            Some(mine) => {
                // same bounds on both sides, so nothing can fall out of range
                if let Err(e) = mine.add(theirs) {
                    tracing::warn!(error = ?e, "Dropped latency samples while merging");
                }
            }
            None => self.0 = Some(theirs.clone()),
        }
    }

    /// Number of recorded samples.
    pub fn len(&self) -> u64 {
        self.0.as_ref().map_or(0, |h| h.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mean_ms(&self) -> f64 {
        match &self.0 {
            Some(h) if !h.is_empty() => h.mean() / 1000.0,
            _ => 0.0,
        }
    }

    /// Latency at `quantile` (0.0..=1.0), in milliseconds.
    pub fn quantile_ms(&self, quantile: f64) -> f64 {
        match &self.0 {
            Some(h) if !h.is_empty() => h.value_at_quantile(quantile) as f64 / 1000.0,
            _ => 0.0,
        }
    }
}

// Serialized as the histogram's V2 encoding, or `null` when empty.
impl Serialize for LatencyHistogram {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.0 {
            None => serializer.serialize_none(),
            Some(h) => {
                let mut encoded = Vec::new();
                V2Serializer::new()
                    .serialize(h, &mut encoded)
                    .map_err(|e| <S::Error as ser::Error>::custom(format!("{e:?}")))?;
                serializer.serialize_some(&encoded)
            }
        }
    }
}

impl<'de> Deserialize<'de> for LatencyHistogram {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = Option::<Vec<u8>>::deserialize(deserializer)?;
        encoded
            .map(|bytes| {
                HistogramReader::new()
                    .deserialize(&mut bytes.as_slice())
                    .map_err(|e| <D::Error as de::Error>::custom(format!("{e:?}")))
            })
            .transpose()
            .map(Self)
    }
}
