use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use client::backend::{BackendError, QueryOptions};
use client::submissions::{player_submissions, SubmissionLog};
use common::{
    parse_address, MintContext, MintStatus, OutputRecord, OutputType, OutputsFilter,
    RegisterStatus, VerificationOutput,
};

use super::auth::AppError;
use super::server::ApiState;

/// Chain and wallet state read by the browser from the NFT contract.
#[derive(Debug, Default, Deserialize)]
pub struct MintQuery {
    /// Connected wallet address; absent when no wallet is connected
    pub signer: Option<String>,
    pub operator: Option<String>,
    pub gamelog_owner: Option<String>,
    pub minted: Option<bool>,
    /// Whether the score notice has an epoch proof
    pub proof: Option<bool>,
    pub signature: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Action<S> {
    pub status: S,
    pub message: &'static str,
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct MintResponse {
    pub input_index: u64,
    pub nft_address: String,
    pub chain_id: u64,
    pub score: VerificationOutput,
    pub mint: Action<MintStatus>,
    pub register: Option<Action<RegisterStatus>>,
}

/// The verified score produced by `input_index` and what its viewer may do
/// with the score NFT.
pub async fn get_mint(
    State(state): State<ApiState>,
    Path(input_index): Path<u64>,
    Query(query): Query<MintQuery>,
) -> Result<Json<MintResponse>, AppError> {
    let filter = OutputsFilter {
        input_index: Some(input_index),
        ..OutputsFilter::tagged(["score"]).of_type(OutputType::Notice)
    };
    let score = state
        .backend
        .get_outputs(&filter, QueryOptions::no_store())
        .await?
        .into_iter()
        .find_map(|record| match record {
            OutputRecord::Verification(out) => Some(out),
            OutputRecord::Tape(_) => None,
        })
        .ok_or_else(|| BackendError::NotFound(format!("score for input {}", input_index)))?;

    let context = MintContext {
        user_address: score.user_address.to_lowercase(),
        proof_ready: query.proof.unwrap_or(false),
        wallet_connected: query.signer.is_some(),
        already_minted: query.minted.unwrap_or(false),
        operator: query.operator,
        gamelog_owner: query.gamelog_owner,
        signer_address: query.signer,
        signature: query.signature,
    };
    let mint = context.mint_status();
    let register = context.register_status();
    debug!("Mint status for input {}: {:?} / {:?}", input_index, mint, register);

    Ok(Json(MintResponse {
        input_index,
        nft_address: state.nft_address.as_ref().clone(),
        chain_id: state.chain_id,
        score,
        mint: Action {
            status: mint,
            message: mint.message(),
            enabled: mint == MintStatus::Ready,
        },
        register: register.map(|status| Action {
            status,
            message: status.message(),
            enabled: status == RegisterStatus::Ready,
        }),
    }))
}

pub async fn get_submissions(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<SubmissionLog>>, AppError> {
    parse_address(&address)?;
    let logs = player_submissions(state.backend.as_ref(), &address).await?;
    info!("Listing {} submissions for {}", logs.len(), address);
    Ok(Json(logs))
}
