pub mod abi;
pub mod backend;
pub mod emulator;
pub mod gameplay;
pub mod leaderboard;
pub mod mutations;
pub mod node;
pub mod preview;
pub mod selection;
pub mod signer;
pub mod submissions;
pub mod tapes;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use backend::{BackendApi, BackendError, BackendResult, CachePolicy, QueryOptions};
pub use emulator::{Emulator, EmulatorError, EmulatorEvent, EmulatorRuntime, EventSink, LaunchParams, Session, SessionMode};
pub use gameplay::{Gameplay, GameplayConfig, GameplayError, GameplayState, PreviewSink, Submission, SubmitError};
pub use leaderboard::{LeaderboardEntry, LeaderboardKind, RuleLeaderboard};
pub use node::{NodeBackend, NodeConfig};
pub use selection::{PlayParams, SelectionError, SelectionStore};
pub use signer::{InputReceipt, Signer, SignerError};
pub use submissions::{player_submissions, SubmissionLog, SubmissionStatus};
pub use tapes::{resolve_tape, ResolvedTape, TapeError};
