use serde::{Deserialize, Serialize};

use crate::util::strip_hex_prefix;
use crate::DomainError;

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// On-chain and wallet facts that decide whether a verified score can be
/// minted as an NFT. Addresses compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MintContext {
    /// Author of the verified score.
    pub user_address: String,
    /// The notice has an epoch proof and can be settled on chain.
    pub proof_ready: bool,
    pub wallet_connected: bool,
    pub already_minted: bool,
    /// Address that submits gameplays on behalf of unregistered players.
    pub operator: Option<String>,
    pub gamelog_owner: Option<String>,
    pub signer_address: Option<String>,
    /// Player signature registering an operator-submitted gameplay.
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MintStatus {
    NoProof,
    ConnectWallet,
    AlreadyMinted,
    RegisterFirst,
    Ready,
}

impl MintStatus {
    pub fn message(self) -> &'static str {
        match self {
            MintStatus::NoProof => "No proofs yet (come back later)",
            MintStatus::ConnectWallet => "connect wallet",
            MintStatus::AlreadyMinted => "Already Minted",
            MintStatus::RegisterFirst => "Operator generated (register first)",
            MintStatus::Ready => "Mint",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterStatus {
    ConnectWallet,
    AlreadyMinted,
    OperatorCannotRegister,
    AlreadyRegistered,
    NoSignature,
    InvalidSignature,
    Ready,
}

impl RegisterStatus {
    pub fn message(self) -> &'static str {
        match self {
            RegisterStatus::ConnectWallet => "connect wallet",
            RegisterStatus::AlreadyMinted => "Already Minted",
            RegisterStatus::OperatorCannotRegister => "Operator can't register",
            RegisterStatus::AlreadyRegistered => "Already registered",
            RegisterStatus::NoSignature => "No signature",
            RegisterStatus::InvalidSignature => "Invalid signature",
            RegisterStatus::Ready => "Register",
        }
    }
}

fn same_address(a: Option<&str>, b: &str) -> bool {
    a.is_some_and(|a| a.eq_ignore_ascii_case(b))
}

impl MintContext {
    fn submitted_by_operator(&self) -> bool {
        same_address(self.operator.as_deref(), &self.user_address)
    }

    fn owner_registered(&self) -> bool {
        self.gamelog_owner
            .as_deref()
            .is_some_and(|owner| !owner.eq_ignore_ascii_case(ZERO_ADDRESS))
    }

    pub fn mint_status(&self) -> MintStatus {
        if !self.proof_ready {
            MintStatus::NoProof
        } else if !self.wallet_connected {
            MintStatus::ConnectWallet
        } else if self.already_minted {
            MintStatus::AlreadyMinted
        } else if self.submitted_by_operator() && !self.owner_registered() {
            MintStatus::RegisterFirst
        } else {
            MintStatus::Ready
        }
    }

    /// `None` unless the gameplay was submitted by the operator, which is
    /// the only case where a player registers ownership.
    pub fn register_status(&self) -> Option<RegisterStatus> {
        if !self.wallet_connected {
            return Some(RegisterStatus::ConnectWallet);
        }
        if self.already_minted {
            return Some(RegisterStatus::AlreadyMinted);
        }
        if !self.submitted_by_operator() {
            return None;
        }
        let status = if self
            .operator
            .as_deref()
            .is_some_and(|operator| same_address(self.signer_address.as_deref(), operator))
        {
            RegisterStatus::OperatorCannotRegister
        } else if self.owner_registered() {
            RegisterStatus::AlreadyRegistered
        } else {
            match self.signature.as_deref() {
                None => RegisterStatus::NoSignature,
                Some(signature) if GameplaySignature::parse(signature).is_err() => {
                    RegisterStatus::InvalidSignature
                }
                Some(_) => RegisterStatus::Ready,
            }
        };
        Some(status)
    }
}

/// `r`, `s`, `v` split of a 65-byte `0x`-prefixed ECDSA signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameplaySignature {
    pub r: String,
    pub s: String,
    pub v: u8,
}

impl GameplaySignature {
    pub fn parse(signature: &str) -> Result<Self, DomainError> {
        let digits = strip_hex_prefix(signature);
        if signature.len() != 132 || digits.len() != 130 || hex::decode(digits).is_err() {
            return Err(DomainError::InvalidHex(signature.to_string()));
        }
        let v = u8::from_str_radix(&digits[128..130], 16)
            .map_err(|_| DomainError::InvalidHex(signature.to_string()))?;
        Ok(Self {
            r: format!("0x{}", &digits[..64]),
            s: format!("0x{}", &digits[64..128]),
            v,
        })
    }
}
