//! Embedding (de)serialisation.
//!
//! Each `f32` is stored as its 4 little-endian bytes, concatenated with no
//! header, length prefix or padding, so a 768-dimension vector occupies
//! exactly 3 072 bytes. Encoding is a bit-level reinterpretation: negative,
//! subnormal and signed-zero values round-trip exactly.

use thiserror::Error;

const F32_BYTES: usize = std::mem::size_of::<f32>();

/// Errors returned when a stored blob cannot be turned back into a vector.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("embedding blob of {len} bytes is not a whole number of f32 values")]
    Misaligned { len: usize },
}

/// Encode a vector into its flat little-endian byte form.
pub fn encode(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a flat little-endian byte buffer.
///
/// A buffer whose length is not a multiple of 4 is treated as corruption and
/// rejected rather than truncated.
pub fn decode(bytes: &[u8]) -> Result<Vec<f32>, CodecError> {
    if bytes.len() % F32_BYTES != 0 {
        return Err(CodecError::Misaligned { len: bytes.len() });
    }
    Ok(bytes
        .chunks_exact(F32_BYTES)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Column form of an optional embedding: absent or empty vectors become `NULL`.
pub fn encode_column(vector: Option<&[f32]>) -> Option<Vec<u8>> {
    vector.filter(|v| !v.is_empty()).map(encode)
}

/// Inverse of [`encode_column`].
pub fn decode_column(bytes: Option<&[u8]>) -> Result<Option<Vec<f32>>, CodecError> {
    match bytes {
        None | Some([]) => Ok(None),
        Some(b) => decode(b).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_bits() {
        let original = vec![1.5f32, -0.25, 0.0, -0.0, 42.0, f32::MIN_POSITIVE / 2.0, f32::MAX, f32::MIN];
        let recovered = decode(&encode(&original)).unwrap();
        assert_eq!(original.len(), recovered.len());
        for (a, b) in original.iter().zip(&recovered) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn empty_and_single_element_roundtrip() {
        assert!(encode(&[]).is_empty());
        assert_eq!(decode(&encode(&[])).unwrap(), Vec::<f32>::new());
        assert_eq!(decode(&encode(&[7.25])).unwrap(), vec![7.25]);
    }

    #[test]
    fn layout_is_little_endian_without_header() {
        let bytes = encode(&[1.0, -2.0]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..], &(-2.0f32).to_le_bytes());
    }

    #[test]
    fn reference_dimension_is_3072_bytes() {
        let v: Vec<f32> = (0..768).map(|i| i as f32 / 768.0).collect();
        let bytes = encode(&v);
        assert_eq!(bytes.len(), 3072);
        assert_eq!(decode(&bytes).unwrap(), v);
    }

    #[test]
    fn misaligned_buffer_is_rejected() {
        let mut bytes = encode(&[1.0, 2.0]);
        bytes.pop();
        assert_eq!(decode(&bytes), Err(CodecError::Misaligned { len: 7 }));
    }

    #[test]
    fn absent_column_roundtrip() {
        assert_eq!(encode_column(None), None);
        assert_eq!(encode_column(Some(&[])), None);
        assert_eq!(decode_column(None).unwrap(), None);
        assert_eq!(decode_column(Some(&[])).unwrap(), None);

        let blob = encode_column(Some(&[0.5, -0.5])).unwrap();
        assert_eq!(decode_column(Some(&blob)).unwrap(), Some(vec![0.5, -0.5]));
    }
}
