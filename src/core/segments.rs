//! Diarization segment source.
//!
//! The diarization pipeline writes one line per speaker turn in the form
//! `SPEAKER_00: 12.34 to 15.67`. This module fetches that text (from a local
//! file or over HTTP) and extracts the time ranges for a single speaker label,
//! in document order.

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while loading diarization segments.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// The diarization file could not be read
    #[error("Failed to read diarization file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The diarization resource could not be fetched over HTTP
    #[error("Failed to fetch diarization resource: {0}")]
    Fetch(String),

    /// The speaker label produced an unusable pattern
    #[error("Invalid speaker label pattern: {0}")]
    Pattern(String),
}

/// Result type for segment operations.
pub type SegmentResult<T> = Result<T, SegmentError>;

/// A single speech turn for one speaker, in seconds from the start of the audio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_time: f64,
    pub end_time: f64,
    /// Position in the speaker's sequence, contiguous and 0-based.
    pub index: usize,
}

impl TimeRange {
    /// Duration of the range in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Extract every `<label>: <start> to <end>` occurrence from `text`.
///
/// Ranges whose end precedes their start are dropped with a warning; the
/// remaining ranges are re-indexed so indices stay contiguous.
pub fn parse_segments(text: &str, speaker_label: &str) -> SegmentResult<Vec<TimeRange>> {
    let pattern = format!(
        r"{}:\s*(\d+\.?\d*|\.\d+)\s*to\s*(\d+\.?\d*|\.\d+)",
        regex::escape(speaker_label)
    );
    let regex = Regex::new(&pattern).map_err(|e| SegmentError::Pattern(e.to_string()))?;

    let mut ranges = Vec::new();
    for captures in regex.captures_iter(text) {
        let (Some(start), Some(end)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        let (Ok(start_time), Ok(end_time)) =
            (start.as_str().parse::<f64>(), end.as_str().parse::<f64>())
        else {
            continue;
        };

        if end_time < start_time {
            warn!(
                speaker = speaker_label,
                start_time, end_time, "Dropping diarization range that ends before it starts"
            );
            continue;
        }

        ranges.push(TimeRange {
            start_time,
            end_time,
            index: ranges.len(),
        });
    }

    debug!(
        speaker = speaker_label,
        count = ranges.len(),
        "Parsed diarization segments"
    );
    Ok(ranges)
}

/// Where the diarization text lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentSource {
    File(String),
    Http(String),
}

impl SegmentSource {
    /// Classify a configured location: anything with an http(s) scheme is fetched,
    /// everything else is treated as a file path.
    pub fn parse(location: &str) -> Self {
        let trimmed = location.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            SegmentSource::Http(trimmed.to_string())
        } else {
            SegmentSource::File(trimmed.to_string())
        }
    }

    /// Fetch the raw diarization text.
    pub async fn fetch_text(&self, http: &reqwest::Client) -> SegmentResult<String> {
        match self {
            SegmentSource::File(path) => tokio::fs::read_to_string(Path::new(path))
                .await
                .map_err(|source| SegmentError::Io {
                    path: path.clone(),
                    source,
                }),
            SegmentSource::Http(url) => {
                let response = http
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| SegmentError::Fetch(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(SegmentError::Fetch(format!(
                        "{url} returned {}",
                        response.status()
                    )));
                }
                response
                    .text()
                    .await
                    .map_err(|e| SegmentError::Fetch(e.to_string()))
            }
        }
    }

    /// Fetch the diarization text and return the ranges for `speaker_label`.
    pub async fn segments_for_speaker(
        &self,
        http: &reqwest::Client,
        speaker_label: &str,
    ) -> SegmentResult<Vec<TimeRange>> {
        let text = self.fetch_text(http).await?;
        parse_segments(&text, speaker_label)
    }
}
