#![allow(dead_code)]

use std::sync::Arc;

use ::common::{util, CartridgeInfo, RuleInfo, VerificationOutput, VerifyPayloadInput};
use client::emulator::{Emulator, EmulatorEvent};
use client::gameplay::{Gameplay, GameplayConfig};
use client::selection::PlayParams;
use client::testing::{MemoryBackend, RuntimeLog, ScriptedRuntime};

pub const PLAYER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
pub const OTHER_PLAYER: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";
pub const DAPP: &str = "0xab7528bb862fb57e8a2bcd567a2e929a0be56a5e";
pub const BASE_URL: &str = "https://rives.test";
pub const ROM: &[u8] = b"RIVCART rom image";

/// Macro to wrap test bodies with a timeout so a stuck event pump fails fast
#[macro_export]
macro_rules! timeout_test {
    ($duration:expr, $body:expr) => {
        tokio::time::timeout($duration, $body)
            .await
            .map_err(|_| anyhow::anyhow!("Test timed out after {:?}", $duration))?
    };
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Backend holding one cartridge with a `default` rule scored by `score_function`.
pub fn backend_with_cartridge(score_function: &str) -> (Arc<MemoryBackend>, CartridgeInfo, RuleInfo) {
    let backend = Arc::new(MemoryBackend::new());
    let cartridge = backend.add_cartridge("Antcopter", ROM);
    let rule = backend.add_rule(&cartridge.id, "default", score_function);
    (backend, cartridge, rule)
}

pub fn play_params(cartridge: &CartridgeInfo, rule: &RuleInfo) -> PlayParams {
    PlayParams {
        cartridge_id: cartridge.id.clone(),
        cartridge: ROM.to_vec(),
        rule_id: rule.id.clone(),
        args: rule.args.clone(),
        in_card: rule.in_card.clone(),
        score_function: Some(rule.score_function.clone()).filter(|f| !f.is_empty()),
    }
}

pub fn gameplay(runtime: ScriptedRuntime) -> (Gameplay<ScriptedRuntime>, RuntimeLog) {
    let log = runtime.log();
    let gameplay = Gameplay::new(Emulator::new(runtime), GameplayConfig::new(BASE_URL, DAPP));
    (gameplay, log)
}

pub fn recorder(script: Vec<EmulatorEvent>) -> (Gameplay<ScriptedRuntime>, RuntimeLog) {
    gameplay(ScriptedRuntime::new().with_record_script(script))
}

pub fn verification(
    cartridge: &CartridgeInfo,
    rule: &RuleInfo,
    player: &str,
    score: i64,
    log: &[u8],
) -> VerificationOutput {
    VerificationOutput {
        version: util::content_id(b"version"),
        cartridge_id: cartridge.id.clone(),
        cartridge_input_index: 0,
        user_address: player.to_string(),
        timestamp: 1_700_000_000 + score as u64,
        score,
        rule_id: rule.id.clone(),
        rule_input_index: -1,
        tape_hash: util::content_id(log),
        tape_input_index: 1,
        error_code: 0,
    }
}

pub fn tape_input(rule: &RuleInfo, player: &str, log: &[u8], timestamp: u64) -> VerifyPayloadInput {
    VerifyPayloadInput {
        rule_id: rule.id.clone(),
        outcard_hash: util::content_id(b"outcard"),
        tape: log.to_vec(),
        claimed_score: 0,
        msg_sender: player.to_string(),
        timestamp,
        input_index: timestamp,
    }
}
