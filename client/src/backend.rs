use async_trait::async_trait;
use thiserror::Error;

use common::{
    CartridgeInfo, CartridgesFilter, CartridgesOutput, DomainError, InsertCartridgePayload,
    OutputRecord, OutputsFilter, RejectedInput, RuleData, RulesFilter, RulesOutput,
    VerifyPayload,
};

use crate::signer::{InputReceipt, Signer, SignerError};

/// Per-call cache policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Reuse a memoised response when one exists. Used for content-addressed data.
    ForceCache,
    #[default]
    NoStore,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    pub cache: CachePolicy,
}

impl QueryOptions {
    pub fn force_cache() -> Self {
        Self { cache: CachePolicy::ForceCache }
    }

    pub fn no_store() -> Self {
        Self { cache: CachePolicy::NoStore }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("backend rejected query: {0}")]
    Rejected(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("input {0} was not processed in time")]
    SyncTimeout(u64),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Signer(#[from] SignerError),
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Typed operations against the rollup backend.
#[async_trait]
pub trait BackendApi: Send + Sync {
    // Cartridge queries
    async fn cartridges(
        &self,
        filter: &CartridgesFilter,
        opts: QueryOptions,
    ) -> BackendResult<CartridgesOutput>;
    async fn cartridge(&self, id: &str, opts: QueryOptions) -> BackendResult<Vec<u8>>;
    async fn cartridge_info(
        &self,
        id: &str,
        opts: QueryOptions,
    ) -> BackendResult<Option<CartridgeInfo>>;

    // Rule queries
    async fn rules(&self, filter: &RulesFilter, opts: QueryOptions) -> BackendResult<RulesOutput>;
    async fn rule_tags(&self, cartridge_id: &str, opts: QueryOptions)
        -> BackendResult<Vec<String>>;

    // Indexed outputs
    async fn get_outputs(
        &self,
        filter: &OutputsFilter,
        opts: QueryOptions,
    ) -> BackendResult<Vec<OutputRecord>>;
    /// Reverted inputs sent by `msg_sender`, with their error reports.
    async fn rejected_inputs(
        &self,
        msg_sender: &str,
        opts: QueryOptions,
    ) -> BackendResult<Vec<RejectedInput>>;

    // Mutations
    async fn verify(
        &self,
        signer: &dyn Signer,
        dapp: &str,
        payload: &VerifyPayload,
        sync: bool,
    ) -> BackendResult<InputReceipt>;
    async fn insert_cartridge(
        &self,
        signer: &dyn Signer,
        dapp: &str,
        payload: &InsertCartridgePayload,
        sync: bool,
    ) -> BackendResult<InputReceipt>;
    async fn create_rule(
        &self,
        signer: &dyn Signer,
        dapp: &str,
        payload: &RuleData,
        sync: bool,
    ) -> BackendResult<InputReceipt>;
}
