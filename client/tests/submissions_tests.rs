mod common;

use anyhow::Result;
use ::common::{util, RejectedInput};
use client::submissions::{player_submissions, SubmissionStatus};

use self::common::{backend_with_cartridge, tape_input, verification, OTHER_PLAYER, PLAYER};

#[tokio::test]
async fn test_submissions_merge_scores_pending_and_rejections() -> Result<()> {
    let (backend, cartridge, rule) = backend_with_cartridge("score");
    backend.add_tape_input(&cartridge.id, tape_input(&rule, PLAYER, b"first", 10));
    backend.add_tape_input(&cartridge.id, tape_input(&rule, PLAYER, b"second", 30));
    backend.add_tape_input(&cartridge.id, tape_input(&rule, OTHER_PLAYER, b"theirs", 40));
    backend.add_verification(verification(&cartridge, &rule, PLAYER, 700, b"first"));
    backend.add_rejected_input(RejectedInput {
        input_index: 20,
        msg_sender: PLAYER.to_uppercase().replacen("0X", "0x", 1),
        timestamp: 20,
        error: "Invalid outcard hash".to_string(),
    });
    backend.add_rejected_input(RejectedInput {
        input_index: 50,
        msg_sender: OTHER_PLAYER.to_string(),
        timestamp: 50,
        error: "not mine".to_string(),
    });

    let logs = player_submissions(&*backend, PLAYER).await?;
    let indexes: Vec<u64> = logs.iter().map(|log| log.input_index).collect();
    assert_eq!(indexes, vec![10, 20, 30]);

    assert_eq!(logs[0].tape_id, Some(util::content_id(b"first")));
    assert_eq!(
        logs[0].status,
        SubmissionStatus::Verified {
            cartridge_id: cartridge.id.clone(),
            rule_id: rule.id.clone(),
            score: 700,
        }
    );
    assert_eq!(
        logs[1].status,
        SubmissionStatus::Rejected {
            error: "Invalid outcard hash".to_string()
        }
    );
    assert!(logs[1].tape_id.is_none());
    assert_eq!(
        logs[2].status,
        SubmissionStatus::Pending {
            rule_id: rule.id.clone(),
            claimed_score: 0,
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_player_without_submissions() -> Result<()> {
    let (backend, cartridge, rule) = backend_with_cartridge("score");
    backend.add_tape_input(&cartridge.id, tape_input(&rule, OTHER_PLAYER, b"theirs", 1));

    assert!(player_submissions(&*backend, PLAYER).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_submission_log_serializes_status_inline() -> Result<()> {
    let (backend, _cartridge, _rule) = backend_with_cartridge("score");
    backend.add_rejected_input(RejectedInput {
        input_index: 3,
        msg_sender: PLAYER.to_string(),
        timestamp: 99,
        error: "boom".to_string(),
    });

    let logs = player_submissions(&*backend, PLAYER).await?;
    let json = serde_json::to_value(&logs[0])?;
    assert_eq!(json["status"], "rejected");
    assert_eq!(json["error"], "boom");
    assert_eq!(json["input_index"], 3);
    Ok(())
}
