use sha2::{Digest, Sha256};

use crate::DomainError;

/// Lower-case hex SHA-256 of `data`. Cartridge ids and tape ids are both
/// derived this way.
pub fn content_id(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// True when `data` hashes to `id` (prefix and case insensitive).
pub fn matches_content_id(id: &str, data: &[u8]) -> bool {
    normalize_id(id) == content_id(data)
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Strips an optional `0x` prefix and lower-cases the id.
pub fn normalize_id(id: &str) -> String {
    strip_hex_prefix(id).to_ascii_lowercase()
}

pub fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Decodes a hex string with or without `0x`. The empty string (and a bare
/// `0x`) decode to no bytes.
pub fn decode_hex(value: &str) -> Result<Vec<u8>, DomainError> {
    hex::decode(strip_hex_prefix(value)).map_err(|_| DomainError::InvalidHex(value.to_string()))
}

pub fn encode_hex_prefixed(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

/// Shortens an address for display, e.g. `0xf39f...2266`.
pub fn short_address(address: &str) -> String {
    if address.len() <= 10 {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

/// Serde adapter for byte fields carried as `0x`-prefixed hex strings.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_hex_prefixed(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        super::decode_hex(&value).map_err(serde::de::Error::custom)
    }
}
