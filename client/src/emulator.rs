//! Owned handle over the native emulator core.
//!
//! An [`Emulator`] is consumed to start a [`Session`] and handed back by
//! [`Session::release`], so at most one session can drive the runtime at a
//! time. Runtime events flow through a channel registered once at
//! construction.

use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use common::Entropy;

#[derive(Debug, Clone, PartialEq)]
pub enum EmulatorEvent {
    Begin {
        width: u32,
        height: u32,
        target_fps: u32,
        total_frames: u64,
    },
    Frame {
        outcard: Vec<u8>,
        frame: u64,
        cycles: u64,
        fps: f64,
        mips: f64,
        cpu_usage: f64,
        /// Captured preview image, when the runtime was asked for one.
        screen: Option<Vec<u8>>,
    },
    Finish {
        log: Vec<u8>,
        outcard: Vec<u8>,
        outhash: Vec<u8>,
    },
    /// The runtime has fully stopped.
    Shutdown,
}

#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("emulator failed to start: {0}")]
    Start(String),

    #[error("emulator event channel closed")]
    Disconnected,

    #[error("emulator is not available")]
    Unavailable,
}

/// Sending half handed to the runtime by [`EmulatorRuntime::attach`].
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<EmulatorEvent>,
}

impl EventSink {
    /// Returns false once the emulator handle is gone.
    pub fn send(&self, event: EmulatorEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Everything the core needs to boot a cartridge.
#[derive(Debug, Clone)]
pub struct LaunchParams {
    pub cartridge: Vec<u8>,
    pub in_card: Vec<u8>,
    pub args: String,
    pub entropy: Entropy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Record,
    Replay,
}

/// Native interface of the emulator core.
pub trait EmulatorRuntime: Send {
    fn attach(&mut self, sink: EventSink);
    fn start_record(&mut self, params: &LaunchParams) -> Result<(), EmulatorError>;
    fn start_replay(&mut self, params: &LaunchParams, tape: &[u8]) -> Result<(), EmulatorError>;
    /// Returns true when a session was running, in which case a
    /// [`EmulatorEvent::Shutdown`] follows.
    fn stop(&mut self) -> bool;
    fn set_speed(&mut self, speed: f64);
    fn fullscreen(&mut self);
}

pub struct Emulator<R: EmulatorRuntime> {
    runtime: R,
    events: mpsc::UnboundedReceiver<EmulatorEvent>,
}

/// Failed acquisition. The emulator is handed back untouched.
pub struct AcquireError<R: EmulatorRuntime> {
    pub emulator: Emulator<R>,
    pub error: EmulatorError,
}

impl<R: EmulatorRuntime> fmt::Debug for AcquireError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquireError").field("error", &self.error).finish()
    }
}

impl<R: EmulatorRuntime> fmt::Display for AcquireError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl<R: EmulatorRuntime> Emulator<R> {
    pub fn new(mut runtime: R) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        runtime.attach(EventSink { tx });
        Self { runtime, events }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub async fn acquire_record(self, params: LaunchParams) -> Result<Session<R>, AcquireError<R>> {
        self.acquire(SessionMode::Record, params, None).await
    }

    pub async fn acquire_replay(
        self,
        params: LaunchParams,
        tape: Vec<u8>,
    ) -> Result<Session<R>, AcquireError<R>> {
        self.acquire(SessionMode::Replay, params, Some(tape)).await
    }

    async fn acquire(
        mut self,
        mode: SessionMode,
        params: LaunchParams,
        tape: Option<Vec<u8>>,
    ) -> Result<Session<R>, AcquireError<R>> {
        if let Err(error) = self.quiesce().await {
            return Err(AcquireError { emulator: self, error });
        }
        let started = match &tape {
            Some(tape) => self.runtime.start_replay(&params, tape),
            None => self.runtime.start_record(&params),
        };
        if let Err(error) = started {
            warn!("emulator start failed: {}", error);
            return Err(AcquireError { emulator: self, error });
        }
        debug!("emulator session started in {:?} mode", mode);
        Ok(Session {
            emulator: Some(self),
            mode,
            params,
            tape,
            finished: false,
            shut_down: false,
        })
    }

    /// Stops a still-running core, waits for it to shut down and discards
    /// events left over from the previous session.
    async fn quiesce(&mut self) -> Result<(), EmulatorError> {
        if self.runtime.stop() {
            self.wait_shutdown().await?;
        }
        while self.events.try_recv().is_ok() {}
        Ok(())
    }

    async fn wait_shutdown(&mut self) -> Result<(), EmulatorError> {
        loop {
            match self.events.recv().await {
                Some(EmulatorEvent::Shutdown) => return Ok(()),
                Some(_) => continue,
                None => return Err(EmulatorError::Disconnected),
            }
        }
    }
}

/// A running emulator session. Dropping it without [`Session::release`]
/// stops the core.
pub struct Session<R: EmulatorRuntime> {
    emulator: Option<Emulator<R>>,
    mode: SessionMode,
    params: LaunchParams,
    tape: Option<Vec<u8>>,
    finished: bool,
    shut_down: bool,
}

impl<R: EmulatorRuntime> Session<R> {
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn params(&self) -> &LaunchParams {
        &self.params
    }

    /// True once the event sequence has ended.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn emulator_mut(&mut self) -> Result<&mut Emulator<R>, EmulatorError> {
        self.emulator.as_mut().ok_or(EmulatorError::Unavailable)
    }

    /// Next runtime event. The sequence ends after `Finish`, or when the
    /// runtime shuts down first.
    pub async fn next_event(&mut self) -> Option<EmulatorEvent> {
        if self.finished {
            return None;
        }
        let emulator = self.emulator.as_mut()?;
        let event = if self.shut_down {
            emulator.events.try_recv().ok()
        } else {
            emulator.events.recv().await
        };
        match event {
            Some(EmulatorEvent::Shutdown) | None => {
                self.finished = true;
                self.shut_down = true;
                None
            }
            Some(event @ EmulatorEvent::Finish { .. }) => {
                self.finished = true;
                Some(event)
            }
            Some(event) => Some(event),
        }
    }

    pub fn set_speed(&mut self, speed: f64) {
        if let Some(emulator) = self.emulator.as_mut() {
            emulator.runtime.set_speed(speed);
        }
    }

    pub fn fullscreen(&mut self) {
        if let Some(emulator) = self.emulator.as_mut() {
            emulator.runtime.fullscreen();
        }
    }

    /// Asks the core to stop. Pending events, then the end of the sequence,
    /// are still delivered through [`Session::next_event`].
    pub fn stop(&mut self) {
        if let Some(emulator) = self.emulator.as_mut() {
            if !emulator.runtime.stop() {
                self.shut_down = true;
            }
        }
    }

    /// Stops and starts the same session again from the first frame.
    pub async fn restart(&mut self) -> Result<(), EmulatorError> {
        let mode = self.mode;
        let params = self.params.clone();
        let tape = self.tape.clone();
        let shut_down = self.shut_down;
        let emulator = self.emulator_mut()?;
        if !shut_down {
            emulator.quiesce().await?;
        } else {
            while emulator.events.try_recv().is_ok() {}
        }
        match (mode, &tape) {
            (SessionMode::Replay, Some(tape)) => emulator.runtime.start_replay(&params, tape)?,
            _ => emulator.runtime.start_record(&params)?,
        }
        debug!("emulator session restarted");
        self.finished = false;
        self.shut_down = false;
        Ok(())
    }

    /// Stops the core, waits for shutdown and returns the emulator.
    pub async fn release(mut self) -> Result<Emulator<R>, EmulatorError> {
        let shut_down = self.shut_down;
        let mut emulator = self.emulator.take().ok_or(EmulatorError::Unavailable)?;
        if shut_down {
            while emulator.events.try_recv().is_ok() {}
        } else {
            emulator.quiesce().await?;
        }
        debug!("emulator session released");
        Ok(emulator)
    }
}

impl<R: EmulatorRuntime> Drop for Session<R> {
    fn drop(&mut self) {
        if let Some(emulator) = self.emulator.as_mut() {
            emulator.runtime.stop();
        }
    }
}
