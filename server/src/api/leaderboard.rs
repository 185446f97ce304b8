use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use client::leaderboard::{fetch_page, LeaderboardEntry, LeaderboardKind};
use common::{model, util, DEFAULT_PAGE_SIZE, DEFAULT_RULE_NAME};

use super::auth::AppError;
use super::server::ApiState;

const MAX_PAGE_SIZE: usize = 100;

/// Query parameters for the leaderboard endpoint
#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub cartridge_id: String,
    /// Defaults to the cartridge's `default` rule
    pub rule_id: Option<String>,
    /// 1-based page (default: 1)
    pub page: Option<u32>,
    /// Verified scores when true (default), submitted tapes otherwise
    pub verified: Option<bool>,
    /// Entries per page (default: 10, max: 100)
    pub page_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RankedEntry {
    pub rank: usize,
    pub sender: String,
    #[serde(rename = "senderShort")]
    pub sender_short: String,
    pub timestamp: u64,
    pub score: Option<i64>,
    #[serde(rename = "tapeId")]
    pub tape_id: String,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub entries: Vec<RankedEntry>,
    #[serde(rename = "cartridgeId")]
    pub cartridge_id: String,
    #[serde(rename = "ruleId")]
    pub rule_id: String,
    pub page: u32,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

pub async fn get_leaderboard(
    State(state): State<ApiState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let cartridge_id = util::normalize_id(&query.cartridge_id);
    let rule_id = match &query.rule_id {
        Some(rule_id) => util::normalize_id(rule_id),
        None => model::rule_id(&cartridge_id, DEFAULT_RULE_NAME)?,
    };
    let kind = if query.verified.unwrap_or(true) {
        LeaderboardKind::Scores
    } else {
        LeaderboardKind::Tapes
    };
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let entries = fetch_page(state.backend.as_ref(), kind, &cartridge_id, &rule_id, page, page_size).await?;
    debug!(
        "Leaderboard {:?} for rule {} page {}: {} entries",
        kind,
        rule_id,
        page,
        entries.len()
    );

    // A full page may have a successor; a short one is the last.
    let has_more = entries.len() == page_size;
    let offset = (page as usize - 1) * page_size;
    let entries = entries
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| rank(offset + idx + 1, entry))
        .collect();

    Ok(Json(LeaderboardResponse {
        entries,
        cartridge_id,
        rule_id,
        page,
        has_more,
    }))
}

fn rank(rank: usize, entry: LeaderboardEntry) -> RankedEntry {
    RankedEntry {
        rank,
        sender_short: util::short_address(&entry.sender),
        sender: entry.sender,
        timestamp: entry.timestamp,
        score: entry.score,
        tape_id: entry.tape_id,
    }
}
