use thiserror::Error;
use tracing::info;

use common::{
    util, OutputRecord, OutputType, OutputsFilter, RuleInfo, RulesFilter, VerificationOutput,
    VerifyPayloadInput,
};

use crate::backend::{BackendApi, BackendError, QueryOptions};
use crate::selection::PlayParams;

#[derive(Debug, Error)]
pub enum TapeError {
    #[error("Verification output not found for tape")]
    VerificationNotFound,

    #[error("rule {0} not found")]
    RuleNotFound(String),

    #[error("tape input not found")]
    TapeNotFound,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Everything needed to replay a submitted tape.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTape {
    pub verification: VerificationOutput,
    pub cartridge: Vec<u8>,
    pub rule: RuleInfo,
    pub input: VerifyPayloadInput,
}

impl ResolvedTape {
    pub fn author(&self) -> &str {
        &self.input.msg_sender
    }

    pub fn play_params(&self) -> PlayParams {
        PlayParams {
            cartridge_id: util::normalize_id(&self.rule.cartridge_id),
            cartridge: self.cartridge.clone(),
            rule_id: util::normalize_id(&self.rule.id),
            args: self.rule.args.clone(),
            in_card: self.rule.in_card.clone(),
            score_function: Some(self.rule.score_function.clone()).filter(|f| !f.trim().is_empty()),
        }
    }
}

/// Resolves a tape id to its verification, cartridge, rule and input log.
pub async fn resolve_tape(backend: &dyn BackendApi, tape_id: &str) -> Result<ResolvedTape, TapeError> {
    let tape_id = util::normalize_id(tape_id);

    let scores = backend
        .get_outputs(
            &OutputsFilter::tagged(["score".to_string(), tape_id.clone()]).of_type(OutputType::Notice),
            QueryOptions::no_store(),
        )
        .await?;
    let verification = scores
        .into_iter()
        .find_map(|record| match record {
            OutputRecord::Verification(out) => Some(out),
            OutputRecord::Tape(_) => None,
        })
        .ok_or(TapeError::VerificationNotFound)?;

    let cartridge = backend
        .cartridge(&verification.cartridge_id, QueryOptions::force_cache())
        .await?;

    let rule = backend
        .rules(&RulesFilter::by_id(&verification.rule_id), QueryOptions::no_store())
        .await?
        .data
        .into_iter()
        .next()
        .ok_or_else(|| TapeError::RuleNotFound(verification.rule_id.clone()))?;

    let inputs = backend
        .get_outputs(
            &OutputsFilter::tagged(["tape".to_string(), tape_id.clone()]).of_type(OutputType::Input),
            QueryOptions::force_cache(),
        )
        .await?;
    let input = inputs
        .into_iter()
        .find_map(|record| match record {
            OutputRecord::Tape(input) => Some(input),
            OutputRecord::Verification(_) => None,
        })
        .ok_or(TapeError::TapeNotFound)?;

    info!("resolved tape {} for rule {}", tape_id, rule.id);
    Ok(ResolvedTape {
        verification,
        cartridge,
        rule,
        input,
    })
}
