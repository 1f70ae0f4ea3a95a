use crate::constants::records::{BITCODE_PREFIX, RECORD_VERSION};
use crate::errors::MlmError;
use crate::packer::PackedExample;
use crate::types::{MaskFlag, RecordBytes, TokenId};

/// Wire form of one example: two fixed-length integer arrays.
#[derive(Clone, Debug, bitcode::Encode, bitcode::Decode)]
struct ExampleRecord {
    token_ids: Vec<TokenId>,
    mask_ids: Vec<MaskFlag>,
}

/// Converts packed examples to and from versioned record bytes.
///
/// Layout: `[RECORD_VERSION, BITCODE_PREFIX, bitcode(ExampleRecord)...]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordCodec {
    capacity: usize,
}

impl RecordCodec {
    /// Codec for windows of exactly `capacity` tokens.
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Fixed window length.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Serialize `example`.
    ///
    /// A length other than `capacity` is an internal invariant violation; the
    /// caller is expected to abort the run on `SchemaViolation`.
    pub fn encode(&self, example: &PackedExample) -> Result<RecordBytes, MlmError> {
        self.check_len("token_ids", example.token_ids().len())?;
        self.check_len("mask_ids", example.mask_ids().len())?;
        let record = ExampleRecord {
            token_ids: example.token_ids().to_vec(),
            mask_ids: example.mask_ids().to_vec(),
        };
        let payload = bitcode::encode(&record);
        let mut out = Vec::with_capacity(2 + payload.len());
        out.push(RECORD_VERSION);
        out.push(BITCODE_PREFIX);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Serialize every example of one paragraph, preserving order.
    pub fn encode_all(&self, examples: &[PackedExample]) -> Result<Vec<RecordBytes>, MlmError> {
        examples.iter().map(|example| self.encode(example)).collect()
    }

    /// Deserialize and validate a record against `capacity`.
    pub fn decode(&self, bytes: &[u8]) -> Result<PackedExample, MlmError> {
        let Some((&version, rest)) = bytes.split_first() else {
            return Err(MlmError::CorruptRecord("empty record".into()));
        };
        if version != RECORD_VERSION {
            return Err(MlmError::CorruptRecord(format!(
                "record version mismatch (expected {RECORD_VERSION}, found {version})"
            )));
        }
        let payload = decode_bitcode_payload(rest)?;
        let record: ExampleRecord = bitcode::decode(payload)
            .map_err(|err| MlmError::CorruptRecord(format!("corrupt example payload: {err}")))?;
        PackedExample::from_parts(record.token_ids, record.mask_ids, self.capacity)
    }

    fn check_len(&self, field: &'static str, actual: usize) -> Result<(), MlmError> {
        if actual != self.capacity {
            return Err(MlmError::SchemaViolation {
                field,
                expected: self.capacity,
                actual,
            });
        }
        Ok(())
    }
}

pub(crate) fn encode_bitcode_payload(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + bytes.len());
    out.push(BITCODE_PREFIX);
    out.extend_from_slice(bytes);
    out
}

pub(crate) fn decode_bitcode_payload(bytes: &[u8]) -> Result<&[u8], MlmError> {
    if bytes.first().copied() != Some(BITCODE_PREFIX) {
        return Err(MlmError::CorruptRecord(
            "bitcode payload missing expected prefix".into(),
        ));
    }
    Ok(&bytes[1..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TailPolicy;
    use crate::masker::UnitEncoding;
    use crate::packer::pack_windows;

    fn example(capacity: usize) -> PackedExample {
        let units = vec![
            UnitEncoding::new(vec![10, 11, 12], vec![0, 1, 0]).unwrap(),
            UnitEncoding::new(vec![20, 21], vec![1, 1]).unwrap(),
        ];
        pack_windows(units, 1, 2, capacity, TailPolicy::Flush).remove(0)
    }

    #[test]
    fn decode_inverts_encode() {
        let codec = RecordCodec::new(12);
        let original = example(12);
        let bytes = codec.encode(&original).unwrap();
        assert_eq!(bytes[0], RECORD_VERSION);
        assert_eq!(bytes[1], BITCODE_PREFIX);
        assert_eq!(codec.decode(&bytes).unwrap(), original);
    }

    #[test]
    fn encode_rejects_examples_of_another_capacity() {
        let codec = RecordCodec::new(16);
        let err = codec.encode(&example(12)).unwrap_err();
        assert!(matches!(
            err,
            MlmError::SchemaViolation {
                field: "token_ids",
                expected: 16,
                actual: 12
            }
        ));
    }

    #[test]
    fn decode_rejects_capacity_mismatch() {
        let bytes = RecordCodec::new(12).encode(&example(12)).unwrap();
        let err = RecordCodec::new(8).decode(&bytes).unwrap_err();
        assert!(matches!(err, MlmError::SchemaViolation { expected: 8, .. }));
    }

    #[test]
    fn decode_rejects_corrupt_framing() {
        let codec = RecordCodec::new(12);
        assert!(matches!(codec.decode(&[]), Err(MlmError::CorruptRecord(_))));
        assert!(matches!(
            codec.decode(&[RECORD_VERSION + 1, BITCODE_PREFIX]),
            Err(MlmError::CorruptRecord(msg)) if msg.contains("version")
        ));
        assert!(matches!(
            codec.decode(&[RECORD_VERSION, 0x00, 0x01]),
            Err(MlmError::CorruptRecord(msg)) if msg.contains("prefix")
        ));
        assert!(matches!(
            codec.decode(&[RECORD_VERSION, BITCODE_PREFIX, 0xFF]),
            Err(MlmError::CorruptRecord(_))
        ));
    }

    #[test]
    fn bitcode_payload_helpers_round_trip_prefix() {
        let framed = encode_bitcode_payload(&[7, 8]);
        assert_eq!(framed, vec![BITCODE_PREFIX, 7, 8]);
        assert_eq!(decode_bitcode_payload(&framed).unwrap(), &[7, 8]);
    }
}
