//! Crockford-style base32 encoding for the 128-bit ids used throughout the
//! API (spec §6.2). Alphabet and no-padding choice match the source system
//! exactly so ids are stable across both implementations.

use uuid::Uuid;

use crate::error::AppError;

const ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";
const ENCODED_LEN: usize = 26; // ceil(128 / 5)

/// Encodes a UUID as lowercase, unpadded base32.
pub fn encode_id(id: Uuid) -> String {
    let bytes = id.into_bytes();
    let mut out = String::with_capacity(ENCODED_LEN);
    let mut buffer: u32 = 0;
    let mut bits_in_buffer: u32 = 0;

    for byte in bytes {
        buffer = (buffer << 8) | byte as u32;
        bits_in_buffer += 8;
        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let index = (buffer >> bits_in_buffer) & 0x1F;
            out.push(ALPHABET[index as usize] as char);
            buffer &= (1 << bits_in_buffer) - 1;
        }
    }

    if bits_in_buffer > 0 {
        let index = (buffer << (5 - bits_in_buffer)) & 0x1F;
        out.push(ALPHABET[index as usize] as char);
    }

    debug_assert_eq!(out.len(), ENCODED_LEN);
    out
}

/// Decodes a 26-character lowercase base32 string back to a UUID.
/// `decode_id(encode_id(u)) == u` for every `u` (spec §8 round-trip law).
pub fn decode_id(s: &str) -> Result<Uuid, AppError> {
    if s.len() != ENCODED_LEN {
        return Err(AppError::InvalidArgument("id".into()));
    }

    let mut buffer: u32 = 0;
    let mut bits_in_buffer: u32 = 0;
    let mut bytes = Vec::with_capacity(16);

    for c in s.chars() {
        let value = ALPHABET
            .iter()
            .position(|&a| a as char == c)
            .ok_or_else(|| AppError::InvalidArgument("id".into()))? as u32;
        buffer = (buffer << 5) | value;
        bits_in_buffer += 5;
        if bits_in_buffer >= 8 {
            bits_in_buffer -= 8;
            bytes.push(((buffer >> bits_in_buffer) & 0xFF) as u8);
            buffer &= (1 << bits_in_buffer) - 1;
        }
    }

    if bytes.len() != 16 {
        return Err(AppError::InvalidArgument("id".into()));
    }

    let mut arr = [0u8; 16];
    arr.copy_from_slice(&bytes);
    Ok(Uuid::from_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_random_uuids() {
        for _ in 0..256 {
            let id = Uuid::new_v4();
            let encoded = encode_id(id);
            assert_eq!(encoded.len(), ENCODED_LEN);
            assert_eq!(decode_id(&encoded).unwrap(), id);
        }
    }

    #[test]
    fn round_trips_nil_uuid() {
        let id = Uuid::nil();
        let encoded = encode_id(id);
        assert_eq!(decode_id(&encoded).unwrap(), id);
    }

    #[test]
    fn encoding_is_lowercase_and_alphabet_only() {
        let id = Uuid::new_v4();
        let encoded = encode_id(id);
        assert!(encoded
            .bytes()
            .all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn wrong_length_is_invalid_argument() {
        assert!(matches!(
            decode_id("tooshort"),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn invalid_characters_are_invalid_argument() {
        let bad = "!".repeat(ENCODED_LEN);
        assert!(matches!(
            decode_id(&bad),
            Err(AppError::InvalidArgument(_))
        ));
    }
}
