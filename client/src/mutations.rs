//! Cartridge and rule creation with client-side pre-flight checks.
//!
//! The checks only spare the player a doomed transaction; the backend still
//! decides.

use thiserror::Error;
use tracing::{info, warn};

use common::{model, util, InsertCartridgePayload, RuleData, RulesFilter};

use crate::backend::{BackendApi, BackendError, QueryOptions};
use crate::selection::SelectionStore;
use crate::signer::{InputReceipt, Signer, SignerError, USER_REJECTED_MESSAGE};

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("no cartridge data to upload")]
    NoCartridgeData,

    #[error("the selected cartridge is already stored")]
    StoredCartridgeSelected,

    #[error("Cartridge already inserted")]
    AlreadyInserted,

    #[error("cartridge {0} is not inserted")]
    CartridgeNotInserted(String),

    #[error("rule name is required")]
    EmptyName,

    #[error("a rule named {0} already exists for this cartridge")]
    DuplicateRule(String),

    #[error("connect a wallet to continue")]
    MissingWallet,

    #[error("{}", USER_REJECTED_MESSAGE)]
    UserRejected,

    #[error(transparent)]
    Backend(BackendError),
}

impl From<BackendError> for MutationError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Signer(SignerError::UserRejected) => MutationError::UserRejected,
            other => MutationError::Backend(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CartridgeInserted {
    pub cartridge_id: String,
    pub receipt: InputReceipt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleCreated {
    pub rule_id: String,
    pub receipt: InputReceipt,
}

/// Uploads a cartridge image and waits for the node to process it.
pub async fn insert_cartridge(
    backend: &dyn BackendApi,
    signer: Option<&dyn Signer>,
    dapp: &str,
    selection: &SelectionStore,
    data: &[u8],
) -> Result<CartridgeInserted, MutationError> {
    if data.is_empty() {
        return Err(MutationError::NoCartridgeData);
    }
    if selection.cartridge().is_some() {
        return Err(MutationError::StoredCartridgeSelected);
    }
    let cartridge_id = util::content_id(data);
    if backend
        .cartridge_info(&cartridge_id, QueryOptions::no_store())
        .await?
        .is_some()
    {
        warn!("cartridge {} already inserted", cartridge_id);
        return Err(MutationError::AlreadyInserted);
    }
    let signer = signer.ok_or(MutationError::MissingWallet)?;

    let payload = InsertCartridgePayload { data: data.to_vec() };
    let receipt = backend.insert_cartridge(signer, dapp, &payload, true).await?;
    info!("inserted cartridge {} in input {}", cartridge_id, receipt.input_index);
    Ok(CartridgeInserted {
        cartridge_id,
        receipt,
    })
}

/// Creates a rule for an inserted cartridge.
pub async fn create_rule(
    backend: &dyn BackendApi,
    signer: Option<&dyn Signer>,
    dapp: &str,
    rule: &RuleData,
) -> Result<RuleCreated, MutationError> {
    let cartridge_id = util::normalize_id(&rule.cartridge_id);
    if backend
        .cartridge_info(&cartridge_id, QueryOptions::no_store())
        .await?
        .is_none()
    {
        return Err(MutationError::CartridgeNotInserted(cartridge_id));
    }
    let name = rule.name.trim();
    if name.is_empty() {
        return Err(MutationError::EmptyName);
    }
    let existing = backend
        .rules(
            &RulesFilter {
                name: Some(name.to_string()),
                ..RulesFilter::for_cartridge(&cartridge_id)
            },
            QueryOptions::no_store(),
        )
        .await?;
    if existing.data.iter().any(|r| r.name == name) {
        return Err(MutationError::DuplicateRule(name.to_string()));
    }
    let signer = signer.ok_or(MutationError::MissingWallet)?;

    let payload = RuleData {
        cartridge_id: cartridge_id.clone(),
        name: name.to_string(),
        ..rule.clone()
    };
    let rule_id = model::rule_id(&cartridge_id, name).map_err(BackendError::from)?;
    let receipt = backend.create_rule(signer, dapp, &payload, true).await?;
    info!("created rule {} ({}) in input {}", name, rule_id, receipt.input_index);
    Ok(RuleCreated { rule_id, receipt })
}
