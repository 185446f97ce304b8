use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use client::backend::{BackendError, QueryOptions};
use common::{unix_now, util, Contest, ContestStatus, RuleInfo, RulesFilter};

use super::auth::AppError;
use super::server::ApiState;

#[derive(Debug, Default, Deserialize)]
pub struct ContestsQuery {
    /// Only rules whose window contains the current time
    pub active: Option<bool>,
}

/// A configured contest merged with its rule.
#[derive(Debug, Serialize)]
pub struct ContestResponse {
    #[serde(flatten)]
    pub rule: RuleInfo,
    #[serde(flatten)]
    pub contest: Contest,
    pub status: ContestStatus,
    pub status_message: &'static str,
    pub cartridge_name: Option<String>,
}

async fn describe(
    state: &ApiState,
    rules: Vec<RuleInfo>,
    now: u64,
) -> Result<Vec<ContestResponse>, AppError> {
    let mut cartridge_names: HashMap<String, Option<String>> = HashMap::new();
    let mut contests = Vec::new();

    for rule in rules {
        let Some(contest) = state.contests.get(&util::normalize_id(&rule.id)).cloned() else {
            continue;
        };
        let cartridge_id = util::normalize_id(&rule.cartridge_id);
        if !cartridge_names.contains_key(&cartridge_id) {
            let info = state
                .backend
                .cartridge_info(&cartridge_id, QueryOptions::force_cache())
                .await?;
            if info.is_none() {
                warn!("Contest rule {} points at unknown cartridge {}", rule.id, cartridge_id);
            }
            cartridge_names.insert(cartridge_id.clone(), info.map(|c| c.name));
        }

        let status = rule.contest_status(now);
        contests.push(ContestResponse {
            cartridge_name: cartridge_names.get(&cartridge_id).cloned().flatten(),
            rule,
            contest,
            status,
            status_message: status.message(),
        });
    }
    Ok(contests)
}

pub async fn list_contests(
    State(state): State<ApiState>,
    Query(query): Query<ContestsQuery>,
) -> Result<Json<Vec<ContestResponse>>, AppError> {
    if state.contests.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let now = unix_now();
    let filter = RulesFilter {
        ids: state.contests.keys().cloned().collect(),
        active_ts: query.active.unwrap_or(false).then_some(now),
        ..Default::default()
    };
    let rules = state.backend.rules(&filter, QueryOptions::no_store()).await?.data;
    let contests = describe(&state, rules, now).await?;
    info!("Listing {} contests", contests.len());
    Ok(Json(contests))
}

pub async fn get_contest(
    State(state): State<ApiState>,
    Path(rule_id): Path<String>,
) -> Result<Json<ContestResponse>, AppError> {
    let rule_id = util::normalize_id(&rule_id);
    if !state.contests.contains_key(&rule_id) {
        return Err(BackendError::NotFound(format!("contest {}", rule_id)).into());
    }
    let rules = state
        .backend
        .rules(&RulesFilter::by_id(&rule_id), QueryOptions::no_store())
        .await?
        .data;
    describe(&state, rules, unix_now())
        .await?
        .into_iter()
        .next()
        .map(Json)
        .ok_or_else(|| BackendError::NotFound(format!("rule {}", rule_id)).into())
}
