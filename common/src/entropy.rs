use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::DomainError;
use crate::util::{decode_hex, strip_hex_prefix};

/// Seed used when no player is connected.
pub const PLACEHOLDER_ENTROPY: &str = "entropy";

/// Per-session emulator seed.
///
/// Derived from the player address and rule id so that anyone holding the same
/// pair can reproduce the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entropy(String);

impl Entropy {
    pub fn placeholder() -> Self {
        Entropy(PLACEHOLDER_ENTROPY.to_string())
    }

    /// `sha256(address_bytes ++ rule_id_bytes)` as lower-case hex.
    ///
    /// The address must be a `0x`-prefixed 20-byte hex string; it is
    /// lower-cased before decoding. An empty rule id contributes no bytes.
    pub fn derive(address: &str, rule_id: &str) -> Result<Self, DomainError> {
        let address_bytes = parse_address(address)?;
        let rule_bytes = decode_hex(rule_id)?;

        let mut hasher = Sha256::new();
        hasher.update(address_bytes);
        hasher.update(&rule_bytes);
        Ok(Entropy(hex::encode(hasher.finalize())))
    }

    /// Placeholder without a player, derived seed otherwise.
    pub fn for_player(address: Option<&str>, rule_id: Option<&str>) -> Result<Self, DomainError> {
        match address {
            Some(address) => Self::derive(address, rule_id.unwrap_or("")),
            None => Ok(Self::placeholder()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_placeholder(&self) -> bool {
        self.0 == PLACEHOLDER_ENTROPY
    }
}

impl fmt::Display for Entropy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parses a `0x`-prefixed 40-digit hex address into its 20 bytes.
pub fn parse_address(address: &str) -> Result<[u8; 20], DomainError> {
    let lowered = address.to_ascii_lowercase();
    if lowered.len() != 42 || !lowered.starts_with("0x") {
        return Err(DomainError::InvalidAddress(address.to_string()));
    }
    let bytes = hex::decode(strip_hex_prefix(&lowered))
        .map_err(|_| DomainError::InvalidAddress(address.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| DomainError::InvalidAddress(address.to_string()))
}
