use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InviteError {
    #[error("Invalid invite code")]
    Unknown,

    #[error("Invite code already used")]
    AlreadyUsed,
}

/// Source of truth for invite codes.
#[async_trait]
pub trait InviteRegistry: Send + Sync {
    /// Fails when the code does not exist or was consumed by someone else.
    async fn validate(&self, code: &str, user_address: Option<&str>) -> Result<()>;

    /// Binds the code to `user_address`. Consuming again with the same
    /// address succeeds, so a player can log in twice with one code.
    async fn consume(&self, code: &str, user_address: &str) -> Result<()>;
}

/// Invite codes held in process memory, seeded from configuration.
#[derive(Debug, Default)]
pub struct MemoryInvites {
    codes: RwLock<HashMap<String, Option<String>>>,
}

impl MemoryInvites {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let codes = codes
            .into_iter()
            .map(|code| (code.into().to_uppercase(), None))
            .collect();
        Self {
            codes: RwLock::new(codes),
        }
    }

    pub async fn owner(&self, code: &str) -> Option<String> {
        self.codes.read().await.get(&code.to_uppercase()).cloned().flatten()
    }
}

fn check(bound: Option<&Option<String>>, user_address: Option<&str>) -> Result<(), InviteError> {
    match bound {
        None => Err(InviteError::Unknown),
        Some(None) => Ok(()),
        Some(Some(owner)) => match user_address {
            Some(address) if owner.eq_ignore_ascii_case(address) => Ok(()),
            _ => Err(InviteError::AlreadyUsed),
        },
    }
}

#[async_trait]
impl InviteRegistry for MemoryInvites {
    async fn validate(&self, code: &str, user_address: Option<&str>) -> Result<()> {
        let codes = self.codes.read().await;
        check(codes.get(&code.to_uppercase()), user_address)?;
        Ok(())
    }

    async fn consume(&self, code: &str, user_address: &str) -> Result<()> {
        let code = code.to_uppercase();
        let mut codes = self.codes.write().await;
        check(codes.get(&code), Some(user_address))?;
        codes.insert(code.clone(), Some(user_address.to_lowercase()));
        info!("invite code {} bound to {}", code, user_address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn codes_are_single_owner() {
        let invites = MemoryInvites::new(["ab12cd"]);
        invites.validate("AB12CD", None).await.unwrap();
        invites.consume("ab12cd", "0xABC").await.unwrap();
        assert_eq!(invites.owner("AB12CD").await.as_deref(), Some("0xabc"));

        invites.consume("AB12CD", "0xabc").await.unwrap();
        let err = invites.consume("AB12CD", "0xdef").await.unwrap_err();
        assert_eq!(err.downcast_ref::<InviteError>(), Some(&InviteError::AlreadyUsed));
        assert!(invites.validate("AB12CD", None).await.is_err());
        assert!(invites.validate("AB12CD", Some("0xabc")).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_codes_fail() {
        let invites = MemoryInvites::new(Vec::<String>::new());
        let err = invites.validate("NOPE", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid invite code");
    }
}
