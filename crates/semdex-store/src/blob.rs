//! Embedding column codec: little-endian `f32` values, no header.

use semdex_core::{Result, SemdexError};

pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a stored embedding, checking it holds exactly `dim` values.
pub fn decode_embedding(bytes: &[u8], dim: usize) -> Result<Vec<f32>> {
    if bytes.len() != dim * 4 {
        return Err(SemdexError::Storage(format!(
            "Corrupt embedding blob: expected {} bytes, got {}",
            dim * 4,
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_preserves_values() {
        let v = vec![0.25, -1.5, 3.0e-7, f32::MAX];
        let bytes = encode_embedding(&v);
        assert_eq!(bytes.len(), 16);
        assert_eq!(decode_embedding(&bytes, 4).unwrap(), v);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let bytes = encode_embedding(&[1.0, 2.0, 3.0]);
        let err = decode_embedding(&bytes, 4).unwrap_err();
        assert!(matches!(err, SemdexError::Storage(_)));
        assert!(decode_embedding(&bytes[..11], 3).is_err());
    }
}
