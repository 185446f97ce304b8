use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use common::{
    compute_score, util, DomainError, Entropy, FrameBuffer, Outcard, ScoreFunction, Tape,
    VerifyPayload,
};

use crate::backend::{BackendApi, BackendError};
use crate::emulator::{
    Emulator, EmulatorError, EmulatorEvent, EmulatorRuntime, LaunchParams, Session, SessionMode,
};
use crate::selection::PlayParams;
use crate::signer::{InputReceipt, Signer, SignerError, USER_REJECTED_MESSAGE};

pub const SCORE_PARSE_ERROR: &str = "error parsing score";
pub const SPEEDS: [f64; 5] = [0.5, 1.0, 1.5, 2.0, 4.0];
pub const DEFAULT_SPEED: f64 = 1.0;
pub const DEFAULT_SEEK_MULTIPLIER: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameplayState {
    Idle,
    Recording,
    Replaying,
    Finished,
    Submitting,
    Submitted,
}

#[derive(Debug, Error)]
pub enum GameplayError {
    #[error("no emulator session is running")]
    NoSession,

    #[error("seeking is only possible while replaying")]
    NotReplaying,

    #[error(transparent)]
    Emulator(#[from] EmulatorError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("no finished gameplay to submit")]
    NotReady,

    #[error("connect a wallet to submit gameplay")]
    MissingWallet,

    #[error("the finished gameplay has no score to claim")]
    NoScore,

    #[error("{}", USER_REJECTED_MESSAGE)]
    UserRejected,

    #[error("submission failed: {0}")]
    Failed(String),
}

/// Receives the captured preview frames of an accepted submission.
#[async_trait]
pub trait PreviewSink: Send + Sync {
    async fn submit(&self, tape_id: &str, frames: Vec<Vec<u8>>) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct GameplayConfig {
    /// Public base URL used in share links.
    pub base_url: String,
    pub dapp_address: String,
    pub seek_multiplier: f64,
}

impl GameplayConfig {
    pub fn new(base_url: impl Into<String>, dapp_address: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            dapp_address: dapp_address.into(),
            seek_multiplier: DEFAULT_SEEK_MULTIPLIER,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Progress {
    pub frame: u64,
    pub total_frames: u64,
}

impl Progress {
    /// Fraction of the tape replayed so far, in `[0, 1]`.
    pub fn ratio(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        (self.frame as f64 / self.total_frames as f64).min(1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub receipt: InputReceipt,
    pub tape_id: String,
    pub share_url: String,
}

/// Drives one player's sessions: recording, replaying and submitting tapes.
pub struct Gameplay<R: EmulatorRuntime> {
    emulator: Option<Emulator<R>>,
    session: Option<Session<R>>,
    config: GameplayConfig,
    preview: Option<Arc<dyn PreviewSink>>,
    state: GameplayState,
    rule_id: Option<String>,
    entropy: Entropy,
    score_function: Option<ScoreFunction>,
    score: Option<i64>,
    frames: FrameBuffer,
    tape: Option<Tape>,
    progress: Progress,
    speed: f64,
    paused: bool,
    error: Option<String>,
    share_url: Option<String>,
}

impl<R: EmulatorRuntime> Gameplay<R> {
    pub fn new(emulator: Emulator<R>, config: GameplayConfig) -> Self {
        Self {
            emulator: Some(emulator),
            session: None,
            config,
            preview: None,
            state: GameplayState::Idle,
            rule_id: None,
            entropy: Entropy::placeholder(),
            score_function: None,
            score: None,
            frames: FrameBuffer::default(),
            tape: None,
            progress: Progress::default(),
            speed: DEFAULT_SPEED,
            paused: false,
            error: None,
            share_url: None,
        }
    }

    pub fn with_preview_sink(mut self, sink: Arc<dyn PreviewSink>) -> Self {
        self.preview = Some(sink);
        self
    }

    pub fn state(&self) -> GameplayState {
        self.state
    }

    pub fn score(&self) -> Option<i64> {
        self.score
    }

    pub fn entropy(&self) -> &Entropy {
        &self.entropy
    }

    pub fn tape(&self) -> Option<&Tape> {
        self.tape.as_ref()
    }

    pub fn frames(&self) -> &FrameBuffer {
        &self.frames
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn share_url(&self) -> Option<&str> {
        self.share_url.as_deref()
    }

    /// Last dismissible error shown to the player.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    fn mode(&self) -> Option<SessionMode> {
        self.session.as_ref().map(Session::mode)
    }

    /// Gets the emulator back, releasing the current session if any.
    async fn reclaim(&mut self) -> Result<Emulator<R>, EmulatorError> {
        if let Some(session) = self.session.take() {
            return session.release().await;
        }
        self.emulator.take().ok_or(EmulatorError::Unavailable)
    }

    async fn park(&mut self) -> Result<(), EmulatorError> {
        let emulator = self.reclaim().await?;
        self.emulator = Some(emulator);
        Ok(())
    }

    fn reset_session_state(&mut self) {
        self.tape = None;
        self.score = None;
        self.frames.clear();
        self.progress = Progress::default();
        self.share_url = None;
        self.error = None;
        self.paused = false;
    }

    fn launch_params(&self, play: &PlayParams) -> LaunchParams {
        LaunchParams {
            cartridge: play.cartridge.clone(),
            in_card: play.in_card.clone(),
            args: play.args.clone(),
            entropy: self.entropy.clone(),
        }
    }

    /// Starts a fresh recording for `player` under the selected rule.
    pub async fn record(&mut self, play: &PlayParams, player: Option<&str>) -> Result<(), GameplayError> {
        self.start(play, player, None).await
    }

    /// Replays `tape`. The entropy is derived from the tape's author so the
    /// run reproduces the recorded one.
    pub async fn replay(
        &mut self,
        play: &PlayParams,
        author: Option<&str>,
        tape: Vec<u8>,
    ) -> Result<(), GameplayError> {
        self.start(play, author, Some(tape)).await
    }

    async fn start(
        &mut self,
        play: &PlayParams,
        player: Option<&str>,
        tape: Option<Vec<u8>>,
    ) -> Result<(), GameplayError> {
        let score_function = ScoreFunction::parse_optional(play.score_function.as_deref())?;
        let entropy = Entropy::for_player(player, Some(play.rule_id.as_str()))?;

        self.reset_session_state();
        self.score_function = score_function;
        self.entropy = entropy;
        self.rule_id = Some(play.rule_id.clone());

        let emulator = self.reclaim().await?;
        let params = self.launch_params(play);
        let acquired = match tape {
            Some(tape) => emulator.acquire_replay(params, tape).await,
            None => emulator.acquire_record(params).await,
        };
        let mut session = match acquired {
            Ok(session) => session,
            Err(failed) => {
                self.emulator = Some(failed.emulator);
                self.state = GameplayState::Idle;
                return Err(failed.error.into());
            }
        };
        session.set_speed(self.speed);
        self.state = match session.mode() {
            SessionMode::Record => GameplayState::Recording,
            SessionMode::Replay => GameplayState::Replaying,
        };
        info!(
            "started {:?} session for rule {} with entropy {}",
            session.mode(),
            play.rule_id,
            self.entropy
        );
        self.session = Some(session);
        Ok(())
    }

    fn frame_score(&self, outcard: &[u8]) -> Result<Option<i64>, DomainError> {
        let outcard = Outcard::parse(outcard)?;
        compute_score(self.score_function.as_ref(), &outcard)
    }

    async fn fail_score(&mut self, err: DomainError) -> Result<(), GameplayError> {
        error!("{}: {}", SCORE_PARSE_ERROR, err);
        self.error = Some(SCORE_PARSE_ERROR.to_string());
        self.state = GameplayState::Idle;
        self.park().await?;
        Ok(())
    }

    /// Pumps one emulator event through the state machine and returns it.
    /// `None` once the session has ended.
    pub async fn next_event(&mut self) -> Result<Option<EmulatorEvent>, GameplayError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        let mode = session.mode();
        let Some(event) = session.next_event().await else {
            if matches!(self.state, GameplayState::Recording | GameplayState::Replaying) {
                debug!("session ended without finishing");
                self.state = GameplayState::Idle;
            }
            return Ok(None);
        };

        let outcome = match &event {
            EmulatorEvent::Begin { total_frames, .. } => {
                self.score = None;
                self.progress = Progress {
                    frame: 0,
                    total_frames: *total_frames,
                };
                Ok(())
            }
            EmulatorEvent::Frame {
                outcard,
                frame,
                screen,
                ..
            } => match self.frame_score(outcard) {
                Ok(score) => {
                    self.score = score;
                    match mode {
                        SessionMode::Record => {
                            if let Some(screen) = screen {
                                self.frames.push(screen.clone());
                            }
                        }
                        SessionMode::Replay => self.progress.frame = *frame,
                    }
                    Ok(())
                }
                Err(err) => Err(err),
            },
            EmulatorEvent::Finish { log, outcard, outhash } => match self.frame_score(outcard) {
                Ok(score) => {
                    self.score = score;
                    if mode == SessionMode::Record {
                        self.tape = Some(Tape {
                            log: log.clone(),
                            outcard: outcard.clone(),
                            outhash: hex::encode(outhash),
                        });
                    } else {
                        self.progress.frame = self.progress.total_frames.max(self.progress.frame);
                    }
                    info!("session finished with score {:?}", self.score);
                    self.state = GameplayState::Finished;
                    Ok(())
                }
                Err(err) => Err(err),
            },
            EmulatorEvent::Shutdown => Ok(()),
        };
        if let Err(err) = outcome {
            self.fail_score(err).await?;
        }
        Ok(Some(event))
    }

    /// Pumps events until the session ends.
    pub async fn run_to_end(&mut self) -> Result<(), GameplayError> {
        while self.next_event().await?.is_some() {}
        Ok(())
    }

    /// Submits the finished recording for verification.
    ///
    /// Rejections leave the tape and score in place so the player can retry.
    pub async fn submit(
        &mut self,
        backend: &dyn BackendApi,
        signer: Option<&dyn Signer>,
    ) -> Result<Submission, SubmitError> {
        if self.state != GameplayState::Finished {
            return Err(SubmitError::NotReady);
        }
        let (Some(tape), Some(rule_id)) = (self.tape.clone(), self.rule_id.clone()) else {
            return Err(SubmitError::NotReady);
        };
        let Some(claimed_score) = self.score else {
            warn!("submission attempted for a tape without a score");
            return Err(SubmitError::NoScore);
        };
        let Some(signer) = signer else {
            warn!("submission attempted without a wallet");
            return Err(SubmitError::MissingWallet);
        };

        self.state = GameplayState::Submitting;
        let payload = VerifyPayload {
            rule_id,
            outcard_hash: tape.outhash.clone(),
            tape: tape.log.clone(),
            claimed_score,
        };
        let receipt = match backend
            .verify(signer, &self.config.dapp_address, &payload, false)
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                self.state = GameplayState::Finished;
                return Err(match err {
                    BackendError::Signer(SignerError::UserRejected) => {
                        warn!("player rejected the submission");
                        SubmitError::UserRejected
                    }
                    other => {
                        error!("gameplay submission failed: {}", other);
                        SubmitError::Failed(other.to_string())
                    }
                });
            }
        };

        let tape_id = tape.id();
        let share_url = tape_share_url(&self.config.base_url, &tape.log);
        if let Some(preview) = &self.preview {
            let frames = self.frames.take_all();
            if let Err(err) = preview.submit(&tape_id, frames).await {
                warn!("preview upload for {} failed: {:#}", tape_id, err);
            }
        }
        info!("submitted tape {} as input {}", tape_id, receipt.input_index);
        self.share_url = Some(share_url.clone());
        self.state = GameplayState::Submitted;
        Ok(Submission {
            receipt,
            tape_id,
            share_url,
        })
    }

    pub fn pause(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.set_speed(0.0);
        }
        self.paused = true;
    }

    pub fn resume(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.set_speed(self.speed);
        }
        self.paused = false;
    }

    /// Advances to the next playback speed, wrapping around.
    pub fn cycle_speed(&mut self) -> f64 {
        let next = SPEEDS
            .iter()
            .position(|s| *s == self.speed)
            .map(|i| SPEEDS[(i + 1) % SPEEDS.len()])
            .unwrap_or(DEFAULT_SPEED);
        self.speed = next;
        if !self.paused {
            if let Some(session) = self.session.as_mut() {
                session.set_speed(next);
            }
        }
        next
    }

    pub fn fullscreen(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.fullscreen();
        }
    }

    /// Page visibility changed to hidden.
    pub fn on_hidden(&mut self) {
        if self.session.is_some() {
            self.pause();
        }
    }

    /// Stops the running session, processing whatever events it still emits.
    pub async fn stop(&mut self) -> Result<(), GameplayError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        session.stop();
        self.run_to_end().await?;
        self.park().await?;
        Ok(())
    }

    /// Fast-forwards the replay to `target` frame. Returns the frame reached.
    pub async fn seek(&mut self, target: u64) -> Result<u64, GameplayError> {
        if self.mode() != Some(SessionMode::Replay) {
            return Err(GameplayError::NotReplaying);
        }
        let behind = target < self.progress.frame;
        let session = self.session.as_mut().ok_or(GameplayError::NoSession)?;
        if behind || session.is_finished() {
            debug!("restarting replay to seek back to frame {}", target);
            session.restart().await?;
            self.progress.frame = 0;
            self.score = None;
            self.state = GameplayState::Replaying;
        }

        let multiplier = self.config.seek_multiplier;
        if let Some(session) = self.session.as_mut() {
            session.set_speed(multiplier);
        }
        while self.progress.frame < target && self.state == GameplayState::Replaying {
            if self.next_event().await?.is_none() {
                break;
            }
        }
        let restore = if self.paused { 0.0 } else { self.speed };
        if let Some(session) = self.session.as_mut() {
            session.set_speed(restore);
        }
        Ok(self.progress.frame)
    }

    /// Releases any session and hands the emulator back.
    pub async fn into_emulator(mut self) -> Result<Emulator<R>, EmulatorError> {
        self.reclaim().await
    }
}

/// Share link for a submitted tape.
pub fn tape_share_url(base_url: &str, log: &[u8]) -> String {
    format!("{}/tapes/{}", base_url.trim_end_matches('/'), util::content_id(log))
}
