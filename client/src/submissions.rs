use serde::Serialize;
use tracing::debug;

use common::{util, OutputRecord, OutputType, OutputsFilter};

use crate::backend::{BackendApi, BackendResult, QueryOptions};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Replayed and scored inside the rollup.
    Verified {
        cartridge_id: String,
        rule_id: String,
        score: i64,
    },
    /// Accepted as input, not verified yet.
    Pending { rule_id: String, claimed_score: i64 },
    Rejected { error: String },
}

/// One gameplay input a player sent, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionLog {
    pub input_index: u64,
    pub timestamp: u64,
    pub tape_id: Option<String>,
    #[serde(flatten)]
    pub status: SubmissionStatus,
}

/// Every gameplay `player` submitted: verified ones with their score, pending
/// ones with the claimed score, and rejected inputs with their error report.
pub async fn player_submissions(backend: &dyn BackendApi, player: &str) -> BackendResult<Vec<SubmissionLog>> {
    let player = player.to_lowercase();
    let by_player = |tag: &str, output_type: OutputType| OutputsFilter {
        msg_sender: Some(player.clone()),
        ..OutputsFilter::tagged([tag]).of_type(output_type)
    };

    let tapes = backend
        .get_outputs(&by_player("tape", OutputType::Input), QueryOptions::no_store())
        .await?;
    let scores: Vec<_> = backend
        .get_outputs(&by_player("score", OutputType::Notice), QueryOptions::no_store())
        .await?
        .into_iter()
        .filter_map(|record| match record {
            OutputRecord::Verification(out) => Some(out),
            OutputRecord::Tape(_) => None,
        })
        .collect();

    let mut logs: Vec<SubmissionLog> = tapes
        .into_iter()
        .filter_map(|record| match record {
            OutputRecord::Tape(input) => Some(input),
            OutputRecord::Verification(_) => None,
        })
        .map(|input| {
            let tape_id = input.tape_id();
            let verified = scores
                .iter()
                .find(|out| util::normalize_id(&out.tape_hash) == tape_id)
                .or_else(|| scores.iter().find(|out| out.tape_input_index == input.input_index as i64));
            let status = match verified {
                Some(out) => SubmissionStatus::Verified {
                    cartridge_id: util::normalize_id(&out.cartridge_id),
                    rule_id: util::normalize_id(&out.rule_id),
                    score: out.score,
                },
                None => SubmissionStatus::Pending {
                    rule_id: util::normalize_id(&input.rule_id),
                    claimed_score: input.claimed_score,
                },
            };
            SubmissionLog {
                input_index: input.input_index,
                timestamp: input.timestamp,
                tape_id: Some(tape_id),
                status,
            }
        })
        .collect();

    let rejected = backend.rejected_inputs(&player, QueryOptions::no_store()).await?;
    for input in rejected {
        if logs.iter().any(|log| log.input_index == input.input_index) {
            continue;
        }
        logs.push(SubmissionLog {
            input_index: input.input_index,
            timestamp: input.timestamp,
            tape_id: None,
            status: SubmissionStatus::Rejected { error: input.error },
        });
    }

    logs.sort_by_key(|log| log.input_index);
    debug!("{} submissions for {}", logs.len(), player);
    Ok(logs)
}
