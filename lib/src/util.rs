use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum HexFieldError {
    #[error("value is empty")]
    Empty,
    #[error("value is not valid hex: {0}")]
    Invalid(#[from] hex::FromHexError),
}

/// Decodes a byte field as shown by the dissector, either `00:1a:ff` or
/// plain `001aff`, optionally with a `0x` prefix.
pub fn decode_hex_field(value: &str) -> Result<Vec<u8>, HexFieldError> {
    let value = value.trim();
    let value = value.strip_prefix("0x").unwrap_or(value);
    let cleaned: String = value.chars().filter(|c| *c != ':' && *c != ' ').collect();
    if cleaned.is_empty() {
        return Err(HexFieldError::Empty);
    }
    Ok(hex::decode(cleaned)?)
}

/// XORs two byte slices up to the length of the shorter one.
pub fn xor_bytes(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b).map(|(x, y)| x ^ y).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_colon_separated() {
        assert_eq!(decode_hex_field("00:1a:FF").unwrap(), vec![0x00, 0x1a, 0xff]);
        assert_eq!(decode_hex_field("0x001aff").unwrap(), vec![0x00, 0x1a, 0xff]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode_hex_field(""), Err(HexFieldError::Empty));
        assert!(matches!(decode_hex_field("zz:01"), Err(HexFieldError::Invalid(_))));
        assert!(matches!(decode_hex_field("abc"), Err(HexFieldError::Invalid(_))));
    }

    #[test]
    fn test_xor_bytes_truncates() {
        assert_eq!(xor_bytes(&[0xff, 0x0f, 0x01], &[0x0f, 0x0f]), vec![0xf0, 0x00]);
    }
}
