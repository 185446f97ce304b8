mod common;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use ::common::{util, Entropy, PREVIEW_FRAME_CAPACITY};
use client::gameplay::{GameplayState, PreviewSink, SubmitError, SCORE_PARSE_ERROR};
use client::testing::{
    begin_event, coin_script, finish_event, frame_event, json_outcard, MockSigner, RuntimeCall,
    ScriptedRuntime, SignerBehavior,
};
use client::Signer;
use tokio::time::Duration;

use self::common::{backend_with_cartridge, gameplay, init_tracing, play_params, recorder, PLAYER};

#[derive(Default)]
struct CapturingSink {
    uploads: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl PreviewSink for CapturingSink {
    async fn submit(&self, tape_id: &str, frames: Vec<Vec<u8>>) -> anyhow::Result<()> {
        self.uploads.lock().unwrap().push((tape_id.to_string(), frames.len()));
        Ok(())
    }
}

#[tokio::test]
async fn test_record_scores_with_rule_function() -> Result<()> {
    init_tracing();
    let (_backend, cartridge, rule) = backend_with_cartridge("coins*10");
    let (mut game, _log) = recorder(coin_script(3, 3, b"coin log"));

    game.record(&play_params(&cartridge, &rule), Some(PLAYER)).await?;
    assert_eq!(game.state(), GameplayState::Recording);
    timeout_test!(Duration::from_secs(5), game.run_to_end())?;

    assert_eq!(game.state(), GameplayState::Finished);
    assert_eq!(game.score(), Some(30));
    let tape = game.tape().expect("finished recording keeps its tape");
    assert_eq!(tape.log, b"coin log".to_vec());
    assert_eq!(tape.outhash, util::content_id(&json_outcard(r#"{"coins":3}"#)));
    Ok(())
}

#[tokio::test]
async fn test_outcard_score_used_without_function() -> Result<()> {
    let (_backend, cartridge, rule) = backend_with_cartridge("");
    let script = vec![
        begin_event(1),
        frame_event(1, json_outcard(r#"{"score":12.9}"#), None),
        finish_event(b"log", json_outcard(r#"{"score":-4.5}"#)),
    ];
    let (mut game, _log) = recorder(script);

    game.record(&play_params(&cartridge, &rule), Some(PLAYER)).await?;
    game.next_event().await?;
    game.next_event().await?;
    assert_eq!(game.score(), Some(12));
    game.run_to_end().await?;
    assert_eq!(game.score(), Some(-4));
    Ok(())
}

#[tokio::test]
async fn test_frame_buffer_keeps_latest_twenty() -> Result<()> {
    let (_backend, cartridge, rule) = backend_with_cartridge("coins");
    let (mut game, _log) = recorder(coin_script(25, 25, b"long"));

    game.record(&play_params(&cartridge, &rule), None).await?;
    game.run_to_end().await?;

    let frames: Vec<&Vec<u8>> = game.frames().iter().collect();
    assert_eq!(frames.len(), PREVIEW_FRAME_CAPACITY);
    assert_eq!(frames[0], &vec![6u8]);
    assert_eq!(frames[19], &vec![25u8]);
    Ok(())
}

#[tokio::test]
async fn test_bad_outcard_stops_with_score_error() -> Result<()> {
    let (_backend, cartridge, rule) = backend_with_cartridge("coins");
    let script = vec![
        begin_event(2),
        frame_event(1, b"JS".to_vec(), None),
        finish_event(b"log", json_outcard(r#"{"coins":1}"#)),
    ];
    let (mut game, log) = recorder(script);

    game.record(&play_params(&cartridge, &rule), Some(PLAYER)).await?;
    timeout_test!(Duration::from_secs(5), game.run_to_end())?;

    assert_eq!(game.state(), GameplayState::Idle);
    assert_eq!(game.error(), Some(SCORE_PARSE_ERROR));
    assert!(game.tape().is_none());
    assert!(log.calls().contains(&RuntimeCall::Stop { was_running: true }));

    game.dismiss_error();
    assert!(game.error().is_none());
    Ok(())
}

#[tokio::test]
async fn test_unknown_score_field_is_score_error() -> Result<()> {
    let (_backend, cartridge, rule) = backend_with_cartridge("lives * 2");
    let (mut game, _log) = recorder(coin_script(2, 2, b"log"));

    game.record(&play_params(&cartridge, &rule), Some(PLAYER)).await?;
    game.run_to_end().await?;

    assert_eq!(game.state(), GameplayState::Idle);
    assert_eq!(game.error(), Some(SCORE_PARSE_ERROR));
    Ok(())
}

#[tokio::test]
async fn test_entropy_follows_player_and_rule() -> Result<()> {
    let (_backend, cartridge, rule) = backend_with_cartridge("coins");
    let (mut game, log) = recorder(coin_script(1, 1, b"log"));
    let params = play_params(&cartridge, &rule);

    game.record(&params, Some(PLAYER)).await?;
    assert_eq!(game.entropy(), &Entropy::derive(PLAYER, &rule.id)?);
    game.record(&params, None).await?;
    assert!(game.entropy().is_placeholder());

    let launches = log.launches();
    assert_eq!(launches.len(), 2);
    assert_eq!(launches[0].entropy, Entropy::derive(PLAYER, &rule.id)?);
    assert_eq!(launches[1].entropy, Entropy::placeholder());
    Ok(())
}

#[tokio::test]
async fn test_rerecord_stops_previous_session_first() -> Result<()> {
    let (_backend, cartridge, rule) = backend_with_cartridge("coins");
    let (mut game, log) = recorder(coin_script(5, 5, b"log"));
    let params = play_params(&cartridge, &rule);

    game.record(&params, Some(PLAYER)).await?;
    game.next_event().await?;
    game.record(&params, Some(PLAYER)).await?;
    game.run_to_end().await?;
    game.record(&params, Some(PLAYER)).await?;

    for call in log.calls() {
        if let RuntimeCall::StartRecord { while_running } = call {
            assert!(!while_running);
        }
    }
    assert_eq!(log.starts(), 3);
    Ok(())
}

#[tokio::test]
async fn test_submit_shares_tape_and_uploads_preview() -> Result<()> {
    let (backend, cartridge, rule) = backend_with_cartridge("coins*10");
    let (game, _log) = recorder(coin_script(3, 3, b"coin log"));
    let sink = Arc::new(CapturingSink::default());
    let mut game = game.with_preview_sink(sink.clone());
    let signer = MockSigner::new(PLAYER);

    game.record(&play_params(&cartridge, &rule), Some(signer.address().as_str())).await?;
    game.run_to_end().await?;
    let submission = game.submit(&*backend, Some(&signer)).await?;

    let tape_id = util::content_id(b"coin log");
    assert_eq!(game.state(), GameplayState::Submitted);
    assert_eq!(submission.tape_id, tape_id);
    assert_eq!(submission.share_url, format!("https://rives.test/tapes/{}", tape_id));
    assert_eq!(game.share_url(), Some(submission.share_url.as_str()));

    let submissions = backend.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].0, PLAYER);
    assert_eq!(submissions[0].1.claimed_score, 30);
    assert_eq!(submissions[0].1.rule_id, rule.id);
    assert_eq!(submissions[0].1.tape, b"coin log".to_vec());

    assert_eq!(*sink.uploads.lock().unwrap(), vec![(tape_id, 3)]);
    Ok(())
}

#[tokio::test]
async fn test_rejected_submission_can_be_retried() -> Result<()> {
    let (backend, cartridge, rule) = backend_with_cartridge("coins*10");
    let (mut game, _log) = recorder(coin_script(3, 3, b"coin log"));
    let signer = MockSigner::new(PLAYER);
    signer.set_behavior(SignerBehavior::Reject);

    game.record(&play_params(&cartridge, &rule), Some(PLAYER)).await?;
    game.run_to_end().await?;

    let err = game.submit(&*backend, Some(&signer)).await.unwrap_err();
    assert!(matches!(err, SubmitError::UserRejected));
    assert_eq!(err.to_string(), "User rejected tx");
    assert_eq!(game.state(), GameplayState::Finished);
    assert_eq!(game.score(), Some(30));
    assert!(game.tape().is_some());
    assert!(backend.submissions().is_empty());

    signer.set_behavior(SignerBehavior::Fail("nonce too low".into()));
    let err = game.submit(&*backend, Some(&signer)).await.unwrap_err();
    assert!(matches!(err, SubmitError::Failed(ref msg) if msg.contains("nonce too low")));
    assert_eq!(game.state(), GameplayState::Finished);

    signer.set_behavior(SignerBehavior::Accept);
    game.submit(&*backend, Some(&signer)).await?;
    assert_eq!(game.state(), GameplayState::Submitted);
    assert_eq!(backend.submissions().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_submit_requires_wallet_and_finished_tape() -> Result<()> {
    let (backend, cartridge, rule) = backend_with_cartridge("coins");
    let (mut game, _log) = recorder(coin_script(2, 2, b"log"));

    assert!(matches!(
        game.submit(&*backend, None).await,
        Err(SubmitError::NotReady)
    ));

    game.record(&play_params(&cartridge, &rule), None).await?;
    game.run_to_end().await?;
    assert!(matches!(
        game.submit(&*backend, None).await,
        Err(SubmitError::MissingWallet)
    ));
    assert_eq!(game.state(), GameplayState::Finished);
    Ok(())
}

#[tokio::test]
async fn test_unscored_tape_is_not_submitted() -> Result<()> {
    let (backend, cartridge, rule) = backend_with_cartridge("");
    let script = vec![
        begin_event(1),
        finish_event(b"log", json_outcard(r#"{"coins":1}"#)),
    ];
    let (mut game, _log) = recorder(script);
    let signer = MockSigner::new(PLAYER);

    game.record(&play_params(&cartridge, &rule), Some(PLAYER)).await?;
    game.run_to_end().await?;
    assert_eq!(game.state(), GameplayState::Finished);
    assert_eq!(game.score(), None);

    assert!(matches!(
        game.submit(&*backend, Some(&signer)).await,
        Err(SubmitError::NoScore)
    ));
    assert_eq!(game.state(), GameplayState::Finished);
    assert!(game.tape().is_some());
    assert!(backend.submissions().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_invalid_start_keeps_previous_session() -> Result<()> {
    let (_backend, cartridge, rule) = backend_with_cartridge("coins*10");
    let (mut game, log) = recorder(coin_script(3, 3, b"coin log"));

    game.record(&play_params(&cartridge, &rule), Some(PLAYER)).await?;
    game.run_to_end().await?;
    let entropy = game.entropy().clone();
    let calls = log.calls().len();

    let mut broken = play_params(&cartridge, &rule);
    broken.score_function = Some("coins *".to_string());
    assert!(game.record(&broken, Some(PLAYER)).await.is_err());
    assert!(game.record(&play_params(&cartridge, &rule), Some("not-an-address")).await.is_err());

    assert_eq!(game.state(), GameplayState::Finished);
    assert_eq!(game.score(), Some(30));
    assert_eq!(game.tape().map(|t| t.log.clone()), Some(b"coin log".to_vec()));
    assert_eq!(game.frames().len(), 3);
    assert_eq!(game.entropy(), &entropy);
    assert_eq!(log.calls().len(), calls);
    assert_eq!(log.starts(), 1);
    Ok(())
}

#[tokio::test]
async fn test_replay_finishes_without_tape() -> Result<()> {
    let (backend, cartridge, rule) = backend_with_cartridge("coins");
    let runtime = ScriptedRuntime::new().with_replay_script(coin_script(4, 4, b"log"));
    let (mut game, log) = gameplay(runtime);

    game.replay(&play_params(&cartridge, &rule), Some(PLAYER), b"log".to_vec()).await?;
    assert_eq!(game.state(), GameplayState::Replaying);
    game.next_event().await?;
    game.next_event().await?;
    game.next_event().await?;
    assert_eq!(game.progress().frame, 2);
    assert_eq!(game.progress().ratio(), 0.5);

    game.run_to_end().await?;
    assert_eq!(game.state(), GameplayState::Finished);
    assert!(game.tape().is_none());
    assert!(game.frames().is_empty());
    assert_eq!(game.score(), Some(4));
    assert!(matches!(log.calls()[1], RuntimeCall::StartReplay { while_running: false }));

    let signer = MockSigner::new(PLAYER);
    assert!(matches!(
        game.submit(&*backend, Some(&signer)).await,
        Err(SubmitError::NotReady)
    ));
    Ok(())
}

#[tokio::test]
async fn test_speed_controls() -> Result<()> {
    let (_backend, cartridge, rule) = backend_with_cartridge("coins");
    let (mut game, log) = recorder(vec![begin_event(100)]);
    game.record(&play_params(&cartridge, &rule), None).await?;

    let speeds: Vec<f64> = (0..5).map(|_| game.cycle_speed()).collect();
    assert_eq!(speeds, vec![1.5, 2.0, 4.0, 0.5, 1.0]);
    assert_eq!(log.last_speed(), Some(1.0));

    game.pause();
    assert_eq!(log.last_speed(), Some(0.0));
    assert_eq!(game.cycle_speed(), 1.5);
    assert_eq!(log.last_speed(), Some(0.0));

    game.resume();
    assert_eq!(log.last_speed(), Some(1.5));

    game.on_hidden();
    assert!(game.is_paused());
    assert_eq!(log.last_speed(), Some(0.0));

    game.fullscreen();
    assert_eq!(log.calls().last(), Some(&RuntimeCall::Fullscreen));
    Ok(())
}

#[tokio::test]
async fn test_seek_fast_forwards_and_restores_speed() -> Result<()> {
    let (_backend, cartridge, rule) = backend_with_cartridge("coins");
    let runtime = ScriptedRuntime::new().with_replay_script(coin_script(50, 50, b"log"));
    let (mut game, log) = gameplay(runtime);
    game.replay(&play_params(&cartridge, &rule), Some(PLAYER), b"log".to_vec()).await?;

    let reached = timeout_test!(Duration::from_secs(5), game.seek(30))?;
    assert_eq!(reached, 30);
    assert!(log.calls().contains(&RuntimeCall::SetSpeed(100.0)));
    assert_eq!(log.last_speed(), Some(1.0));

    let reached = timeout_test!(Duration::from_secs(5), game.seek(10))?;
    assert_eq!(reached, 10);
    assert_eq!(log.starts(), 2);
    assert_eq!(game.state(), GameplayState::Replaying);

    game.pause();
    let reached = timeout_test!(Duration::from_secs(5), game.seek(1_000))?;
    assert_eq!(reached, 50);
    assert_eq!(game.state(), GameplayState::Finished);
    assert_eq!(log.last_speed(), Some(0.0));
    Ok(())
}

#[tokio::test]
async fn test_seek_requires_replay() -> Result<()> {
    let (_backend, cartridge, rule) = backend_with_cartridge("coins");
    let (mut game, _log) = recorder(vec![begin_event(10)]);
    game.record(&play_params(&cartridge, &rule), None).await?;
    assert!(game.seek(5).await.is_err());
    Ok(())
}
