use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::packer::PackedExample;

/// Token-level totals over a set of packed examples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExampleStats {
    /// Examples counted.
    pub examples: u64,
    /// Non-padding positions (CLS and SEP included).
    pub content_tokens: u64,
    /// Positions flagged as mask candidates.
    pub masked_tokens: u64,
    /// Trailing padding positions.
    pub padding_tokens: u64,
}

impl ExampleStats {
    /// Totals for `examples`.
    pub fn from_examples(examples: &[PackedExample]) -> Self {
        let mut stats = Self::default();
        for example in examples {
            stats.record(example);
        }
        stats
    }

    /// Add one example.
    pub fn record(&mut self, example: &PackedExample) {
        let content = example.content_len() as u64;
        self.examples += 1;
        self.content_tokens += content;
        self.masked_tokens += example.masked_count() as u64;
        self.padding_tokens += example.len() as u64 - content;
    }

    /// Fold another total into this one.
    pub fn merge(&mut self, other: ExampleStats) {
        self.examples += other.examples;
        self.content_tokens += other.content_tokens;
        self.masked_tokens += other.masked_tokens;
        self.padding_tokens += other.padding_tokens;
    }

    /// Share of window positions holding content.
    pub fn fill_ratio(&self) -> f64 {
        let total = self.content_tokens + self.padding_tokens;
        if total == 0 {
            0.0
        } else {
            self.content_tokens as f64 / total as f64
        }
    }

    /// Share of content positions flagged as mask candidates.
    pub fn mask_ratio(&self) -> f64 {
        if self.content_tokens == 0 {
            0.0
        } else {
            self.masked_tokens as f64 / self.content_tokens as f64
        }
    }
}

/// Summary of one pipeline run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunReport {
    /// Paragraphs pulled from the corpus, including dropped ones.
    pub paragraphs_seen: u64,
    /// Paragraphs skipped because of corpus, segmentation, or tokenization errors.
    pub paragraphs_dropped: u64,
    /// Totals over every example appended to the sink.
    pub stats: ExampleStats,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the sink was closed; equals `started_at` until the run finishes.
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub(crate) fn start() -> Self {
        let now = Utc::now();
        Self {
            paragraphs_seen: 0,
            paragraphs_dropped: 0,
            stats: ExampleStats::default(),
            started_at: now,
            finished_at: now,
        }
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    /// Examples written to the sink.
    pub fn examples(&self) -> u64 {
        self.stats.examples
    }

    /// Wall-clock run time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as f64 / 1000.0
    }
}
