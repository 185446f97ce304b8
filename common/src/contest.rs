use serde::{Deserialize, Serialize};

/// Display metadata attached to a contest rule by configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contest {
    pub prize: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContestStatus {
    Invalid,
    NotInitiated,
    InProgress,
    Finished,
    Validated,
}

impl ContestStatus {
    pub fn of(start: Option<u64>, end: Option<u64>, n_tapes: u64, n_verified: u64, now: u64) -> Self {
        let (Some(start), Some(end)) = (start, end) else {
            return ContestStatus::Invalid;
        };
        if now < start {
            ContestStatus::NotInitiated
        } else if now < end {
            ContestStatus::InProgress
        } else if n_tapes == n_verified {
            ContestStatus::Validated
        } else {
            ContestStatus::Finished
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ContestStatus::Invalid => "Invalid contest",
            ContestStatus::NotInitiated => "Upcoming",
            ContestStatus::InProgress => "Open",
            ContestStatus::Finished => "Finished (validating tapes)",
            ContestStatus::Validated => "Finished",
        }
    }
}
