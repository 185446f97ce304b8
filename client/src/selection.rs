use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::{info, warn};

use common::{util, CartridgeInfo, RuleInfo, RulesFilter, DEFAULT_RULE_NAME};

use crate::backend::{BackendApi, BackendError, QueryOptions};

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("a cartridge download is already in progress")]
    DownloadInProgress,

    #[error("rule {0} is not available for the selected cartridge")]
    UnknownRule(String),

    #[error("no cartridge selected")]
    NoCartridge,

    #[error("cartridge bytes hash to {actual}, expected {expected}")]
    ContentMismatch { expected: String, actual: String },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Inputs for one emulator session, derived from cartridge and rule.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayParams {
    pub cartridge_id: String,
    pub cartridge: Vec<u8>,
    pub rule_id: String,
    pub args: String,
    pub in_card: Vec<u8>,
    pub score_function: Option<String>,
}

/// Who recorded the tape being replayed, and under which rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayInfo {
    pub author: String,
    pub rule_id: String,
}

#[derive(Debug, Default)]
struct SelectionState {
    cartridge: Option<CartridgeInfo>,
    cartridge_data: Option<Vec<u8>>,
    rules: Vec<RuleInfo>,
    rule: Option<RuleInfo>,
    replay: Option<ReplayInfo>,
}

/// Selected cartridge and rule, shared by the pages that play them.
#[derive(Debug, Default)]
pub struct SelectionStore {
    state: RwLock<SelectionState>,
    downloading: AtomicBool,
}

struct DownloadGuard<'a>(&'a AtomicBool);

impl Drop for DownloadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock only means a panic elsewhere; the state itself is plain data.
    fn read(&self) -> RwLockReadGuard<'_, SelectionState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SelectionState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_downloading(&self) -> bool {
        self.downloading.load(Ordering::SeqCst)
    }

    pub fn cartridge(&self) -> Option<CartridgeInfo> {
        self.read().cartridge.clone()
    }

    pub fn cartridge_data(&self) -> Option<Vec<u8>> {
        self.read().cartridge_data.clone()
    }

    pub fn rules(&self) -> Vec<RuleInfo> {
        self.read().rules.clone()
    }

    pub fn rule(&self) -> Option<RuleInfo> {
        self.read().rule.clone()
    }

    pub fn replay(&self) -> Option<ReplayInfo> {
        self.read().replay.clone()
    }

    /// Selects a cartridge, downloads its bytes and loads its rules.
    ///
    /// Refused while another download is in flight.
    pub async fn change_cartridge(
        &self,
        backend: &dyn BackendApi,
        info: CartridgeInfo,
    ) -> Result<(), SelectionError> {
        if self.downloading.swap(true, Ordering::SeqCst) {
            warn!("refusing to select {} while a download is in flight", info.id);
            return Err(SelectionError::DownloadInProgress);
        }
        let _guard = DownloadGuard(&self.downloading);

        let id = util::normalize_id(&info.id);
        {
            let mut state = self.write();
            *state = SelectionState {
                cartridge: Some(info),
                ..Default::default()
            };
        }

        let data = backend.cartridge(&id, QueryOptions::force_cache()).await?;
        if !util::matches_content_id(&id, &data) {
            return Err(SelectionError::ContentMismatch {
                expected: id,
                actual: util::content_id(&data),
            });
        }
        info!("downloaded cartridge {} ({} bytes)", id, data.len());
        self.write().cartridge_data = Some(data);

        self.load_rules(backend).await
    }

    /// Re-fetches the rule list of the selected cartridge, keeping the selected
    /// rule when it still exists and falling back to `default`.
    pub async fn load_rules(&self, backend: &dyn BackendApi) -> Result<(), SelectionError> {
        let id = self
            .read()
            .cartridge
            .as_ref()
            .map(|c| util::normalize_id(&c.id))
            .ok_or(SelectionError::NoCartridge)?;

        let rules = backend
            .rules(&RulesFilter::for_cartridge(&id), QueryOptions::no_store())
            .await?
            .data;

        let mut state = self.write();
        let still_selected = state
            .rule
            .as_ref()
            .and_then(|selected| rules.iter().find(|r| r.id == selected.id).cloned());
        state.rule = still_selected.or_else(|| rules.iter().find(|r| r.name == DEFAULT_RULE_NAME).cloned());
        state.rules = rules;
        Ok(())
    }

    pub fn select_rule(&self, rule_id: &str) -> Result<RuleInfo, SelectionError> {
        let rule_id = util::normalize_id(rule_id);
        let mut state = self.write();
        let rule = state
            .rules
            .iter()
            .find(|r| util::normalize_id(&r.id) == rule_id)
            .cloned()
            .ok_or(SelectionError::UnknownRule(rule_id))?;
        state.rule = Some(rule.clone());
        Ok(rule)
    }

    pub fn set_replay(&self, author: &str, rule_id: &str) {
        self.write().replay = Some(ReplayInfo {
            author: author.to_lowercase(),
            rule_id: util::normalize_id(rule_id),
        });
    }

    pub fn clear_replay(&self) {
        self.write().replay = None;
    }

    pub fn can_play(&self) -> bool {
        let state = self.read();
        state.cartridge_data.is_some() && state.rule.is_some()
    }

    /// Play parameters for the current selection, once it is playable.
    pub fn play_params(&self) -> Option<PlayParams> {
        let state = self.read();
        let cartridge = state.cartridge.as_ref()?;
        let data = state.cartridge_data.as_ref()?;
        let rule = state.rule.as_ref()?;
        Some(PlayParams {
            cartridge_id: util::normalize_id(&cartridge.id),
            cartridge: data.clone(),
            rule_id: util::normalize_id(&rule.id),
            args: rule.args.clone(),
            in_card: rule.in_card.clone(),
            score_function: Some(rule.score_function.clone()).filter(|f| !f.trim().is_empty()),
        })
    }
}
