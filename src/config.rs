use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::constants::defaults::{
    CAPACITY, MASK_RATE, MIN_CAPACITY, QUEUE_BOUND, SEED, SHUFFLE_BUFFER_FACTOR, WORKER_COUNT,
};
use crate::errors::MlmError;

/// Controls whole-word mask-candidate selection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskingConfig {
    /// Probability that a word is flagged as a mask candidate.
    pub mask_rate: f64,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            mask_rate: MASK_RATE,
        }
    }
}

/// What to do with the content left in the window after a paragraph's last unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailPolicy {
    /// Discard it; only overflow-closed windows are emitted.
    #[default]
    Drop,
    /// Close it with SEP, pad, and emit it when it holds any content.
    Flush,
}

/// Controls window construction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackingConfig {
    /// Window length including CLS, SEP, and padding.
    pub capacity: usize,
    /// Handling of the trailing, never-overflowed window.
    pub tail: TailPolicy,
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            capacity: CAPACITY,
            tail: TailPolicy::Drop,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Mask-candidate selection.
    pub masking: MaskingConfig,
    /// Window construction.
    pub packing: PackingConfig,
    /// Number of concurrent paragraph workers.
    pub worker_count: usize,
    /// Maximum paragraphs waiting in the work queue before the producer blocks.
    pub queue_bound: usize,
    /// RNG seed; each paragraph derives its own stream from this and its index.
    pub seed: u64,
    /// Append records in paragraph order instead of completion order.
    pub preserve_order: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            masking: MaskingConfig::default(),
            packing: PackingConfig::default(),
            worker_count: WORKER_COUNT,
            queue_bound: QUEUE_BOUND,
            seed: SEED,
            preserve_order: false,
        }
    }
}

impl MaskingConfig {
    /// Validate that the mask rate is a probability.
    pub fn validated(self) -> Result<Self, MlmError> {
        if !(0.0..=1.0).contains(&self.mask_rate) {
            return Err(MlmError::Configuration(format!(
                "mask_rate must be within [0, 1], got {}",
                self.mask_rate
            )));
        }
        Ok(self)
    }
}

impl PackingConfig {
    /// Validate that the window can hold CLS, content, and SEP.
    pub fn validated(self) -> Result<Self, MlmError> {
        if self.capacity < MIN_CAPACITY {
            return Err(MlmError::Configuration(format!(
                "capacity must be at least {MIN_CAPACITY}, got {}",
                self.capacity
            )));
        }
        Ok(self)
    }
}

impl PipelineConfig {
    /// Validate every nested section plus the worker settings.
    pub fn validate(&self) -> Result<(), MlmError> {
        self.masking.validated()?;
        self.packing.validated()?;
        if self.worker_count == 0 {
            return Err(MlmError::Configuration(
                "worker_count must be greater than zero".to_string(),
            ));
        }
        if self.queue_bound == 0 {
            return Err(MlmError::Configuration(
                "queue_bound must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a JSON config file; missing fields fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, MlmError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|err| {
            MlmError::Configuration(format!("invalid config file {}: {err}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }
}

/// Reader-side stream configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Examples per yielded batch.
    pub batch_size: usize,
    /// Records held in the shuffle buffer.
    pub shuffle_buffer: usize,
    /// Shuffle seed.
    pub seed: u64,
}

impl ReaderConfig {
    /// Config with the recommended `batch_size * 1000` shuffle buffer.
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size,
            shuffle_buffer: batch_size.saturating_mul(SHUFFLE_BUFFER_FACTOR),
            seed: SEED,
        }
    }

    /// Validate batch and buffer sizes.
    pub fn validated(self) -> Result<Self, MlmError> {
        if self.batch_size == 0 {
            return Err(MlmError::Configuration(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.shuffle_buffer == 0 {
            return Err(MlmError::Configuration(
                "shuffle_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }
}
