use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const USER_REJECTED_MESSAGE: &str = "User rejected tx";

/// Acknowledgement that an input was added to the rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputReceipt {
    pub input_index: u64,
    #[serde(default)]
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("{}", USER_REJECTED_MESSAGE)]
    UserRejected,

    #[error("{0}")]
    Failed(String),
}

impl SignerError {
    /// Classifies a raw wallet error message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_user_rejection(&message) {
            SignerError::UserRejected
        } else {
            SignerError::Failed(message)
        }
    }
}

pub fn is_user_rejection(message: &str) -> bool {
    message.to_lowercase().contains("user rejected")
}

/// Wallet boundary: the player's address and the ability to submit rollup inputs.
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> String;

    async fn add_input(&self, dapp: &str, payload: Vec<u8>) -> Result<InputReceipt, SignerError>;
}
