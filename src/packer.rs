//! Greedy multi-sentence packing into fixed-capacity windows.
//!
//! Window state per paragraph:
//! - the accumulator starts as `[CLS]` with mask flag `0`;
//! - each unit is truncated to `capacity - 2` tokens (room for CLS and SEP);
//! - when `acc + unit > capacity - 1`, the accumulator is closed with `[SEP]`,
//!   zero-padded to `capacity`, emitted, and reset before the unit is appended;
//! - whatever remains after the last unit is handled by [`TailPolicy`]
//!   (dropped by default, so a paragraph that never overflows emits nothing).

use rand::Rng;

use crate::config::{PackingConfig, TailPolicy};
use crate::constants::vocab::PAD_VALUE;
use crate::errors::MlmError;
use crate::masker::{UnitEncoding, WordMasker};
use crate::types::{MaskFlag, TokenId};

/// One fixed-length training window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedExample {
    token_ids: Vec<TokenId>,
    mask_ids: Vec<MaskFlag>,
}

impl PackedExample {
    /// Validate and wrap decoded sequences of exactly `capacity` entries.
    pub fn from_parts(
        token_ids: Vec<TokenId>,
        mask_ids: Vec<MaskFlag>,
        capacity: usize,
    ) -> Result<Self, MlmError> {
        if token_ids.len() != capacity {
            return Err(MlmError::SchemaViolation {
                field: "token_ids",
                expected: capacity,
                actual: token_ids.len(),
            });
        }
        if mask_ids.len() != capacity {
            return Err(MlmError::SchemaViolation {
                field: "mask_ids",
                expected: capacity,
                actual: mask_ids.len(),
            });
        }
        Ok(Self {
            token_ids,
            mask_ids,
        })
    }

    /// Token ids, `[CLS]`-prefixed and zero-padded.
    pub fn token_ids(&self) -> &[TokenId] {
        &self.token_ids
    }

    /// Mask flags aligned with `token_ids`.
    pub fn mask_ids(&self) -> &[MaskFlag] {
        &self.mask_ids
    }

    /// Window length (always the configured capacity).
    pub fn len(&self) -> usize {
        self.token_ids.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }

    /// Positions before trailing padding (CLS and SEP included).
    pub fn content_len(&self) -> usize {
        self.token_ids
            .iter()
            .rposition(|id| *id != PAD_VALUE)
            .map(|idx| idx + 1)
            .unwrap_or(0)
    }

    /// Number of positions flagged as mask candidates.
    pub fn masked_count(&self) -> usize {
        self.mask_ids.iter().filter(|flag| **flag != 0).count()
    }

    /// Split into `(token_ids, mask_ids)`.
    pub fn into_parts(self) -> (Vec<TokenId>, Vec<MaskFlag>) {
        (self.token_ids, self.mask_ids)
    }
}

/// Internal window accumulator.
struct Window {
    token_ids: Vec<TokenId>,
    mask_ids: Vec<MaskFlag>,
}

impl Window {
    fn open(cls_id: TokenId, capacity: usize) -> Self {
        let mut token_ids = Vec::with_capacity(capacity);
        let mut mask_ids = Vec::with_capacity(capacity);
        token_ids.push(cls_id);
        mask_ids.push(0);
        Self {
            token_ids,
            mask_ids,
        }
    }

    fn len(&self) -> usize {
        self.token_ids.len()
    }

    fn append(&mut self, unit: &UnitEncoding) {
        self.token_ids.extend_from_slice(&unit.token_ids);
        self.mask_ids.extend_from_slice(&unit.mask_ids);
    }

    fn close(mut self, sep_id: TokenId, capacity: usize) -> PackedExample {
        self.token_ids.push(sep_id);
        self.mask_ids.push(0);
        self.token_ids.resize(capacity, PAD_VALUE);
        self.mask_ids.resize(capacity, PAD_VALUE as MaskFlag);
        PackedExample {
            token_ids: self.token_ids,
            mask_ids: self.mask_ids,
        }
    }
}

/// Packs the units of one paragraph into fixed-capacity examples.
#[derive(Clone)]
pub struct Packer {
    masker: WordMasker,
    cls_id: TokenId,
    sep_id: TokenId,
    capacity: usize,
    tail: TailPolicy,
}

impl Packer {
    /// Build a packer; CLS/SEP ids come from the masker's tokenizer vocabulary.
    pub fn new(masker: WordMasker, config: PackingConfig) -> Result<Self, MlmError> {
        let config = config.validated()?;
        let vocab = masker.tokenizer().vocab();
        let (cls_id, sep_id) = (vocab.cls_id(), vocab.sep_id());
        Ok(Self {
            masker,
            cls_id,
            sep_id,
            capacity: config.capacity,
            tail: config.tail,
        })
    }

    /// Window length.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Underlying word masker.
    pub fn masker(&self) -> &WordMasker {
        &self.masker
    }

    /// Encode and pack `units` in order.
    ///
    /// Any unit failure aborts the whole paragraph; the partial window is
    /// discarded.
    pub fn pack<S, R>(&self, units: &[S], rng: &mut R) -> Result<Vec<PackedExample>, MlmError>
    where
        S: AsRef<str>,
        R: Rng,
    {
        let mut encodings = Vec::with_capacity(units.len());
        for unit in units {
            encodings.push(self.masker.encode_unit(unit.as_ref(), rng)?);
        }
        Ok(self.pack_encodings(encodings))
    }

    /// Pack precomputed unit encodings. Deterministic.
    pub fn pack_encodings<I>(&self, encodings: I) -> Vec<PackedExample>
    where
        I: IntoIterator<Item = UnitEncoding>,
    {
        pack_windows(
            encodings,
            self.cls_id,
            self.sep_id,
            self.capacity,
            self.tail,
        )
    }
}

/// Core packing policy over already-encoded units.
pub fn pack_windows<I>(
    encodings: I,
    cls_id: TokenId,
    sep_id: TokenId,
    capacity: usize,
    tail: TailPolicy,
) -> Vec<PackedExample>
where
    I: IntoIterator<Item = UnitEncoding>,
{
    let max_unit = capacity.saturating_sub(2);
    let mut examples = Vec::new();
    let mut window = Window::open(cls_id, capacity);
    for mut unit in encodings {
        unit.truncate(max_unit);
        if window.len() + unit.len() > capacity.saturating_sub(1) {
            let full = std::mem::replace(&mut window, Window::open(cls_id, capacity));
            examples.push(full.close(sep_id, capacity));
        }
        window.append(&unit);
    }
    if tail == TailPolicy::Flush && window.len() > 1 {
        examples.push(window.close(sep_id, capacity));
    }
    examples
}
