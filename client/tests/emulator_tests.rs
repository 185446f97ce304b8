mod common;

use anyhow::Result;
use ::common::Entropy;
use client::emulator::{Emulator, EmulatorEvent, LaunchParams, SessionMode};
use client::testing::{begin_event, coin_script, RuntimeCall, ScriptedRuntime};
use tokio::time::Duration;

use self::common::ROM;

fn params() -> LaunchParams {
    LaunchParams {
        cartridge: ROM.to_vec(),
        in_card: Vec::new(),
        args: String::new(),
        entropy: Entropy::placeholder(),
    }
}

fn assert_never_started_while_running(calls: &[RuntimeCall]) {
    for call in calls {
        match call {
            RuntimeCall::StartRecord { while_running } | RuntimeCall::StartReplay { while_running } => {
                assert!(!while_running, "session started on a running core: {:?}", calls)
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_session_events_end_after_finish() -> Result<()> {
    let runtime = ScriptedRuntime::new().with_record_script(coin_script(3, 3, b"log"));
    let emulator = Emulator::new(runtime);

    let mut session = emulator.acquire_record(params()).await.map_err(|e| e.error)?;
    assert_eq!(session.mode(), SessionMode::Record);

    let mut seen = Vec::new();
    timeout_test!(Duration::from_secs(5), async {
        while let Some(event) = session.next_event().await {
            seen.push(event);
        }
    });

    assert_eq!(seen.len(), 5);
    assert!(matches!(seen[0], EmulatorEvent::Begin { total_frames: 3, .. }));
    assert!(matches!(seen.last(), Some(EmulatorEvent::Finish { .. })));
    assert!(session.is_finished());
    assert!(session.next_event().await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_release_stops_and_waits_for_shutdown() -> Result<()> {
    let runtime = ScriptedRuntime::new()
        .with_record_script(coin_script(2, 2, b"log"))
        .with_replay_script(vec![begin_event(7)]);
    let log = runtime.log();
    let emulator = Emulator::new(runtime);

    let session = emulator.acquire_record(params()).await.map_err(|e| e.error)?;
    let emulator = timeout_test!(Duration::from_secs(5), session.release())?;

    let calls = log.calls();
    assert_eq!(calls.last(), Some(&RuntimeCall::Stop { was_running: true }));

    // The next session starts from a clean channel: only its own events arrive.
    let mut session = emulator.acquire_replay(params(), b"tape".to_vec()).await.map_err(|e| e.error)?;
    let first = timeout_test!(Duration::from_secs(5), session.next_event());
    assert_eq!(first, Some(begin_event(7)));
    Ok(())
}

#[tokio::test]
async fn test_never_two_sessions_running() -> Result<()> {
    let runtime = ScriptedRuntime::new()
        .with_record_script(coin_script(4, 1, b"one"))
        .with_replay_script(coin_script(4, 1, b"one"));
    let log = runtime.log();
    let mut emulator = Emulator::new(runtime);

    for round in 0..3 {
        let mut session = if round % 2 == 0 {
            emulator.acquire_record(params()).await.map_err(|e| e.error)?
        } else {
            emulator
                .acquire_replay(params(), b"one".to_vec())
                .await
                .map_err(|e| e.error)?
        };
        // Leave events unread so the release has to skip them.
        session.next_event().await;
        emulator = session.release().await?;
    }

    assert_eq!(log.starts(), 3);
    assert_never_started_while_running(&log.calls());
    Ok(())
}

#[tokio::test]
async fn test_dropped_session_stops_runtime() -> Result<()> {
    let runtime = ScriptedRuntime::new().with_record_script(vec![begin_event(10)]);
    let log = runtime.log();
    let emulator = Emulator::new(runtime);

    let session = emulator.acquire_record(params()).await.map_err(|e| e.error)?;
    drop(session);

    assert_eq!(log.calls().last(), Some(&RuntimeCall::Stop { was_running: true }));
    Ok(())
}

#[tokio::test]
async fn test_failed_start_returns_emulator() -> Result<()> {
    let runtime = ScriptedRuntime::new().failing_start("no cartridge");
    let emulator = Emulator::new(runtime);

    let failed = match emulator.acquire_record(params()).await {
        Ok(_) => anyhow::bail!("start should have failed"),
        Err(failed) => failed,
    };
    assert_eq!(failed.error.to_string(), "emulator failed to start: no cartridge");
    assert_eq!(failed.emulator.runtime().log().starts(), 1);
    Ok(())
}

#[tokio::test]
async fn test_stop_ends_sequence() -> Result<()> {
    let runtime = ScriptedRuntime::new().with_record_script(vec![begin_event(100)]);
    let emulator = Emulator::new(runtime);

    let mut session = emulator.acquire_record(params()).await.map_err(|e| e.error)?;
    assert!(matches!(session.next_event().await, Some(EmulatorEvent::Begin { .. })));
    session.stop();
    let next = timeout_test!(Duration::from_secs(5), session.next_event());
    assert!(next.is_none());
    assert!(session.is_finished());

    let _emulator = session.release().await?;
    Ok(())
}
