use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{
    util, OrderDir, OutputRecord, OutputType, OutputsFilter, PageOutcome, Pager, DEFAULT_PAGE_SIZE,
};

use crate::backend::{BackendApi, BackendResult, QueryOptions};

/// Which backend outputs a leaderboard lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardKind {
    /// Verified scores, best first.
    Scores,
    /// Submitted tapes, newest first.
    Tapes,
}

impl LeaderboardKind {
    fn tag(self) -> &'static str {
        match self {
            LeaderboardKind::Scores => "score",
            LeaderboardKind::Tapes => "tape",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub sender: String,
    pub timestamp: u64,
    /// None for tapes that have not been verified yet.
    pub score: Option<i64>,
    pub tape_id: String,
}

impl LeaderboardEntry {
    fn from_record(record: OutputRecord) -> Self {
        match record {
            OutputRecord::Verification(out) => LeaderboardEntry {
                sender: out.user_address,
                timestamp: out.timestamp,
                score: Some(out.score),
                tape_id: util::normalize_id(&out.tape_hash),
            },
            OutputRecord::Tape(input) => LeaderboardEntry {
                tape_id: input.tape_id(),
                sender: input.msg_sender,
                timestamp: input.timestamp,
                score: None,
            },
        }
    }
}

pub fn leaderboard_filter(
    kind: LeaderboardKind,
    cartridge_id: &str,
    rule_id: &str,
    page: u32,
    page_size: usize,
) -> OutputsFilter {
    let tags = [kind.tag().to_string(), util::normalize_id(cartridge_id), util::normalize_id(rule_id)];
    let (output_type, order_by) = match kind {
        LeaderboardKind::Scores => (OutputType::Notice, "value"),
        LeaderboardKind::Tapes => (OutputType::Input, "timestamp"),
    };
    OutputsFilter {
        page: Some(page.max(1)),
        page_size: Some(page_size as u32),
        order_by: Some(order_by.to_string()),
        order_dir: Some(OrderDir::Desc),
        ..OutputsFilter::tagged(tags).of_type(output_type)
    }
}

/// One page of a rule's leaderboard.
pub async fn fetch_page(
    backend: &dyn BackendApi,
    kind: LeaderboardKind,
    cartridge_id: &str,
    rule_id: &str,
    page: u32,
    page_size: usize,
) -> BackendResult<Vec<LeaderboardEntry>> {
    let filter = leaderboard_filter(kind, cartridge_id, rule_id, page, page_size);
    let records = backend.get_outputs(&filter, QueryOptions::no_store()).await?;
    Ok(records.into_iter().map(LeaderboardEntry::from_record).collect())
}

/// Paged leaderboard of one rule, tracking navigation across loads.
#[derive(Debug, Clone)]
pub struct RuleLeaderboard {
    kind: LeaderboardKind,
    pager: Pager,
    entries: Vec<LeaderboardEntry>,
}

impl RuleLeaderboard {
    pub fn new(kind: LeaderboardKind) -> Self {
        Self {
            kind,
            pager: Pager::new(DEFAULT_PAGE_SIZE),
            entries: Vec::new(),
        }
    }

    pub fn kind(&self) -> LeaderboardKind {
        self.kind
    }

    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    /// Loads `page` for the given rule. Switching rules restarts at page 1.
    pub async fn load(
        &mut self,
        backend: &dyn BackendApi,
        cartridge_id: &str,
        rule_id: &str,
        page: u32,
    ) -> BackendResult<&[LeaderboardEntry]> {
        let key = format!("{}:{}", util::normalize_id(cartridge_id), util::normalize_id(rule_id));
        let page = if self.pager.reset_for(&key) {
            self.entries.clear();
            1
        } else {
            page.max(1)
        };

        let entries = fetch_page(
            backend,
            self.kind,
            cartridge_id,
            rule_id,
            page,
            self.pager.page_size(),
        )
        .await?;
        match self.pager.apply(page, entries.len()) {
            PageOutcome::Show => self.entries = entries,
            PageOutcome::KeepPrevious => debug!("page {} of {} is empty", page, key),
        }
        Ok(&self.entries)
    }

    pub async fn next(
        &mut self,
        backend: &dyn BackendApi,
        cartridge_id: &str,
        rule_id: &str,
    ) -> BackendResult<&[LeaderboardEntry]> {
        let page = self.pager.next_page();
        self.load(backend, cartridge_id, rule_id, page).await
    }

    pub async fn previous(
        &mut self,
        backend: &dyn BackendApi,
        cartridge_id: &str,
        rule_id: &str,
    ) -> BackendResult<&[LeaderboardEntry]> {
        let page = self.pager.previous_page();
        self.load(backend, cartridge_id, rule_id, page).await
    }
}
