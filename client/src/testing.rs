//! In-memory fakes for the backend, the emulator runtime and the wallet.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use common::{
    model, util, CartridgeInfo, CartridgesFilter, CartridgesOutput, InsertCartridgePayload,
    OrderDir, OutputRecord, OutputType, OutputsFilter, RejectedInput, RuleData, RuleInfo,
    RulesFilter, RulesOutput, VerificationOutput, VerifyPayload, VerifyPayloadInput,
};

use crate::backend::{BackendApi, BackendError, BackendResult, QueryOptions};
use crate::emulator::{EmulatorError, EmulatorEvent, EmulatorRuntime, EventSink, LaunchParams};
use crate::signer::{InputReceipt, Signer, SignerError};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// `JSON` outcard bytes for `body`.
pub fn json_outcard(body: &str) -> Vec<u8> {
    let mut out = b"JSON".to_vec();
    out.extend_from_slice(body.as_bytes());
    out
}

pub fn begin_event(total_frames: u64) -> EmulatorEvent {
    EmulatorEvent::Begin {
        width: 256,
        height: 256,
        target_fps: 60,
        total_frames,
    }
}

pub fn frame_event(frame: u64, outcard: Vec<u8>, screen: Option<Vec<u8>>) -> EmulatorEvent {
    EmulatorEvent::Frame {
        outcard,
        frame,
        cycles: frame * 1000,
        fps: 60.0,
        mips: 10.0,
        cpu_usage: 0.5,
        screen,
    }
}

pub fn finish_event(log: &[u8], outcard: Vec<u8>) -> EmulatorEvent {
    EmulatorEvent::Finish {
        log: log.to_vec(),
        outhash: util::sha256(&outcard).to_vec(),
        outcard,
    }
}

/// Begin, `frames` frames scoring `i` coins each, then a finish with `final_coins`.
pub fn coin_script(frames: u64, final_coins: u64, log: &[u8]) -> Vec<EmulatorEvent> {
    let mut events = vec![begin_event(frames)];
    for i in 1..=frames {
        events.push(frame_event(
            i,
            json_outcard(&format!(r#"{{"coins":{}}}"#, i.min(final_coins))),
            Some(vec![i as u8]),
        ));
    }
    events.push(finish_event(log, json_outcard(&format!(r#"{{"coins":{}}}"#, final_coins))));
    events
}

// Emulator runtime

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeCall {
    StartRecord { while_running: bool },
    StartReplay { while_running: bool },
    Stop { was_running: bool },
    SetSpeed(f64),
    Fullscreen,
}

/// Shared view of what a [`ScriptedRuntime`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct RuntimeLog {
    calls: Arc<Mutex<Vec<RuntimeCall>>>,
    launches: Arc<Mutex<Vec<LaunchParams>>>,
}

impl RuntimeLog {
    pub fn calls(&self) -> Vec<RuntimeCall> {
        lock(&self.calls).clone()
    }

    pub fn launches(&self) -> Vec<LaunchParams> {
        lock(&self.launches).clone()
    }

    pub fn starts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RuntimeCall::StartRecord { .. } | RuntimeCall::StartReplay { .. }))
            .count()
    }

    pub fn last_speed(&self) -> Option<f64> {
        self.calls().iter().rev().find_map(|c| match c {
            RuntimeCall::SetSpeed(speed) => Some(*speed),
            _ => None,
        })
    }

    fn push(&self, call: RuntimeCall) {
        lock(&self.calls).push(call);
    }
}

/// Runtime that replays canned event scripts on every start. The core stays
/// running after `Finish` until stopped.
pub struct ScriptedRuntime {
    sink: Option<EventSink>,
    record_script: Vec<EmulatorEvent>,
    replay_script: Vec<EmulatorEvent>,
    running: bool,
    fail_start: Option<String>,
    log: RuntimeLog,
}

impl Default for ScriptedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self {
            sink: None,
            record_script: Vec::new(),
            replay_script: Vec::new(),
            running: false,
            fail_start: None,
            log: RuntimeLog::default(),
        }
    }

    pub fn with_record_script(mut self, events: Vec<EmulatorEvent>) -> Self {
        self.record_script = events;
        self
    }

    pub fn with_replay_script(mut self, events: Vec<EmulatorEvent>) -> Self {
        self.replay_script = events;
        self
    }

    pub fn failing_start(mut self, message: &str) -> Self {
        self.fail_start = Some(message.to_string());
        self
    }

    pub fn log(&self) -> RuntimeLog {
        self.log.clone()
    }

    fn play(&mut self, params: &LaunchParams, replay: bool) -> Result<(), EmulatorError> {
        let while_running = self.running;
        self.log.push(if replay {
            RuntimeCall::StartReplay { while_running }
        } else {
            RuntimeCall::StartRecord { while_running }
        });
        if let Some(message) = &self.fail_start {
            return Err(EmulatorError::Start(message.clone()));
        }
        lock(&self.log.launches).push(params.clone());
        self.running = true;
        let script = if replay { &self.replay_script } else { &self.record_script };
        if let Some(sink) = &self.sink {
            for event in script {
                sink.send(event.clone());
            }
        }
        Ok(())
    }
}

impl EmulatorRuntime for ScriptedRuntime {
    fn attach(&mut self, sink: EventSink) {
        self.sink = Some(sink);
    }

    fn start_record(&mut self, params: &LaunchParams) -> Result<(), EmulatorError> {
        self.play(params, false)
    }

    fn start_replay(&mut self, params: &LaunchParams, _tape: &[u8]) -> Result<(), EmulatorError> {
        self.play(params, true)
    }

    fn stop(&mut self) -> bool {
        let was_running = self.running;
        self.log.push(RuntimeCall::Stop { was_running });
        if was_running {
            self.running = false;
            if let Some(sink) = &self.sink {
                sink.send(EmulatorEvent::Shutdown);
            }
        }
        was_running
    }

    fn set_speed(&mut self, speed: f64) {
        self.log.push(RuntimeCall::SetSpeed(speed));
    }

    fn fullscreen(&mut self) {
        self.log.push(RuntimeCall::Fullscreen);
    }
}

// Wallet

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerBehavior {
    Accept,
    Reject,
    Fail(String),
}

pub struct MockSigner {
    address: String,
    behavior: Mutex<SignerBehavior>,
    next_index: AtomicU64,
    inputs: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockSigner {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_lowercase(),
            behavior: Mutex::new(SignerBehavior::Accept),
            next_index: AtomicU64::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn set_behavior(&self, behavior: SignerBehavior) {
        *lock(&self.behavior) = behavior;
    }

    /// `(dapp, payload)` of every accepted input.
    pub fn inputs(&self) -> Vec<(String, Vec<u8>)> {
        lock(&self.inputs).clone()
    }
}

#[async_trait]
impl Signer for MockSigner {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn add_input(&self, dapp: &str, payload: Vec<u8>) -> Result<InputReceipt, SignerError> {
        let behavior = lock(&self.behavior).clone();
        match behavior {
            SignerBehavior::Accept => {
                lock(&self.inputs).push((dapp.to_string(), payload));
                Ok(InputReceipt {
                    input_index: self.next_index.fetch_add(1, Ordering::SeqCst),
                    tx_hash: None,
                })
            }
            SignerBehavior::Reject => Err(SignerError::from_message("User rejected the request.")),
            SignerBehavior::Fail(message) => Err(SignerError::from_message(message)),
        }
    }
}

// Backend

struct StoredOutput {
    tags: Vec<String>,
    output_type: OutputType,
    record: OutputRecord,
}

impl StoredOutput {
    fn sort_key(&self) -> i64 {
        match &self.record {
            OutputRecord::Verification(out) => out.score,
            OutputRecord::Tape(input) => input.timestamp as i64,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    cartridges: Vec<(CartridgeInfo, Vec<u8>)>,
    rules: Vec<RuleInfo>,
    outputs: Vec<StoredOutput>,
    rejected: Vec<RejectedInput>,
    verified: Vec<(String, VerifyPayload)>,
    cartridge_fetches: HashMap<String, usize>,
}

/// [`BackendApi`] over in-process collections. Mutations go through the
/// signer like the real backend.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    cartridge_delay: Mutex<Option<Duration>>,
    clock: AtomicU64,
}

fn page<T>(items: Vec<T>, page: Option<u32>, page_size: Option<u32>) -> Vec<T> {
    match page_size {
        Some(size) if size > 0 => {
            let page = page.unwrap_or(1).max(1) as usize;
            items
                .into_iter()
                .skip((page - 1) * size as usize)
                .take(size as usize)
                .collect()
        }
        _ => items,
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every cartridge download, to observe in-flight state.
    pub fn set_cartridge_delay(&self, delay: Duration) {
        *lock(&self.cartridge_delay) = Some(delay);
    }

    pub fn add_cartridge(&self, name: &str, data: &[u8]) -> CartridgeInfo {
        let info = CartridgeInfo {
            id: util::content_id(data),
            name: name.to_string(),
            user_address: String::new(),
            info: None,
            created_at: self.tick(),
            input_index: None,
            cover: None,
        };
        lock(&self.state).cartridges.push((info.clone(), data.to_vec()));
        info
    }

    pub fn add_rule(&self, cartridge_id: &str, name: &str, score_function: &str) -> RuleInfo {
        let cartridge_id = util::normalize_id(cartridge_id);
        let rule = RuleInfo {
            id: model::rule_id(&cartridge_id, name).unwrap_or_default(),
            name: name.to_string(),
            description: String::new(),
            cartridge_id,
            created_by: String::new(),
            created_at: self.tick(),
            args: String::new(),
            in_card: Vec::new(),
            score_function: score_function.to_string(),
            n_tapes: 0,
            n_verified: 0,
            start: None,
            end: None,
            tags: Vec::new(),
        };
        lock(&self.state).rules.push(rule.clone());
        rule
    }

    pub fn upsert_rule(&self, rule: RuleInfo) {
        let mut state = lock(&self.state);
        state.rules.retain(|r| r.id != rule.id);
        state.rules.push(rule);
    }

    /// Publishes a verification notice, tagged the way the indexer tags it.
    pub fn add_verification(&self, output: VerificationOutput) {
        let tags = vec![
            "score".to_string(),
            util::normalize_id(&output.cartridge_id),
            util::normalize_id(&output.rule_id),
            util::normalize_id(&output.tape_hash),
        ];
        lock(&self.state).outputs.push(StoredOutput {
            tags,
            output_type: OutputType::Notice,
            record: OutputRecord::Verification(output),
        });
    }

    /// Records a submitted tape input.
    pub fn add_tape_input(&self, cartridge_id: &str, input: VerifyPayloadInput) {
        let tags = vec![
            "tape".to_string(),
            util::normalize_id(cartridge_id),
            util::normalize_id(&input.rule_id),
            input.tape_id(),
        ];
        lock(&self.state).outputs.push(StoredOutput {
            tags,
            output_type: OutputType::Input,
            record: OutputRecord::Tape(input),
        });
    }

    pub fn add_rejected_input(&self, input: RejectedInput) {
        lock(&self.state).rejected.push(input);
    }

    /// `(sender, payload)` of every verify call.
    pub fn submissions(&self) -> Vec<(String, VerifyPayload)> {
        lock(&self.state).verified.clone()
    }

    pub fn cartridge_fetches(&self, id: &str) -> usize {
        lock(&self.state)
            .cartridge_fetches
            .get(&util::normalize_id(id))
            .copied()
            .unwrap_or_default()
    }

    fn tick(&self) -> u64 {
        1_700_000_000 + self.clock.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendApi for MemoryBackend {
    async fn cartridges(
        &self,
        filter: &CartridgesFilter,
        _opts: QueryOptions,
    ) -> BackendResult<CartridgesOutput> {
        let matching: Vec<CartridgeInfo> = lock(&self.state)
            .cartridges
            .iter()
            .map(|(info, _)| info.clone())
            .filter(|info| filter.name.as_ref().is_none_or(|n| info.name.contains(n.as_str())))
            .collect();
        let total = matching.len() as u64;
        Ok(CartridgesOutput {
            data: page(matching, filter.page, filter.page_size),
            total,
            page: filter.page.unwrap_or(1),
        })
    }

    async fn cartridge(&self, id: &str, _opts: QueryOptions) -> BackendResult<Vec<u8>> {
        let delay = *lock(&self.cartridge_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let id = util::normalize_id(id);
        let mut state = lock(&self.state);
        *state.cartridge_fetches.entry(id.clone()).or_default() += 1;
        state
            .cartridges
            .iter()
            .find(|(info, _)| info.id == id)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| BackendError::NotFound(format!("cartridge {}", id)))
    }

    async fn cartridge_info(&self, id: &str, _opts: QueryOptions) -> BackendResult<Option<CartridgeInfo>> {
        let id = util::normalize_id(id);
        Ok(lock(&self.state)
            .cartridges
            .iter()
            .find(|(info, _)| info.id == id)
            .map(|(info, _)| info.clone()))
    }

    async fn rules(&self, filter: &RulesFilter, _opts: QueryOptions) -> BackendResult<RulesOutput> {
        let matching: Vec<RuleInfo> = lock(&self.state)
            .rules
            .iter()
            .filter(|r| filter.cartridge_id.as_ref().is_none_or(|c| &r.cartridge_id == c))
            .filter(|r| filter.id.as_ref().is_none_or(|id| &r.id == id))
            .filter(|r| filter.ids.is_empty() || filter.ids.contains(&r.id))
            .filter(|r| filter.name.as_ref().is_none_or(|n| &r.name == n))
            .filter(|r| {
                filter.active_ts.is_none_or(|ts| match r.window() {
                    (Some(start), Some(end)) => start <= ts && ts < end,
                    _ => false,
                })
            })
            .cloned()
            .collect();
        let total = matching.len() as u64;
        Ok(RulesOutput {
            data: page(matching, filter.page, filter.page_size),
            total,
            page: filter.page.unwrap_or(1),
        })
    }

    async fn rule_tags(&self, cartridge_id: &str, _opts: QueryOptions) -> BackendResult<Vec<String>> {
        let cartridge_id = util::normalize_id(cartridge_id);
        let mut tags: Vec<String> = lock(&self.state)
            .rules
            .iter()
            .filter(|r| r.cartridge_id == cartridge_id)
            .flat_map(|r| r.tags.clone())
            .collect();
        tags.sort();
        tags.dedup();
        Ok(tags)
    }

    async fn get_outputs(&self, filter: &OutputsFilter, _opts: QueryOptions) -> BackendResult<Vec<OutputRecord>> {
        let state = lock(&self.state);
        let mut matching: Vec<&StoredOutput> = state
            .outputs
            .iter()
            .filter(|o| filter.tags.iter().all(|t| o.tags.contains(t)))
            .filter(|o| filter.output_type.is_none_or(|t| t == o.output_type))
            .filter(|o| {
                filter
                    .msg_sender
                    .as_ref()
                    .is_none_or(|s| o.record.sender().eq_ignore_ascii_case(s))
            })
            .filter(|o| filter.input_index.is_none_or(|i| o.record.input_index() == i))
            .collect();
        if filter.order_by.is_some() {
            matching.sort_by_key(|o| o.sort_key());
            if filter.order_dir == Some(OrderDir::Desc) {
                matching.reverse();
            }
        }
        let records = matching.into_iter().map(|o| o.record.clone()).collect();
        Ok(page(records, filter.page, filter.page_size))
    }

    async fn rejected_inputs(&self, msg_sender: &str, _opts: QueryOptions) -> BackendResult<Vec<RejectedInput>> {
        Ok(lock(&self.state)
            .rejected
            .iter()
            .filter(|r| r.msg_sender.eq_ignore_ascii_case(msg_sender))
            .cloned()
            .collect())
    }

    async fn verify(
        &self,
        signer: &dyn Signer,
        dapp: &str,
        payload: &VerifyPayload,
        _sync: bool,
    ) -> BackendResult<InputReceipt> {
        let receipt = signer.add_input(dapp, crate::abi::encode_verify(payload)?).await?;
        lock(&self.state).verified.push((signer.address(), payload.clone()));
        Ok(receipt)
    }

    async fn insert_cartridge(
        &self,
        signer: &dyn Signer,
        dapp: &str,
        payload: &InsertCartridgePayload,
        _sync: bool,
    ) -> BackendResult<InputReceipt> {
        let receipt = signer
            .add_input(dapp, crate::abi::encode_insert_cartridge(payload))
            .await?;
        let mut info = self.add_cartridge("", &payload.data);
        info.user_address = signer.address();
        lock(&self.state)
            .cartridges
            .iter_mut()
            .filter(|(stored, _)| stored.id == info.id)
            .for_each(|(stored, _)| *stored = info.clone());
        Ok(receipt)
    }

    async fn create_rule(
        &self,
        signer: &dyn Signer,
        dapp: &str,
        payload: &RuleData,
        _sync: bool,
    ) -> BackendResult<InputReceipt> {
        let receipt = signer
            .add_input(dapp, crate::abi::encode_create_rule(payload)?)
            .await?;
        let mut rule = self.add_rule(&payload.cartridge_id, &payload.name, &payload.score_function);
        rule.description = payload.description.clone();
        rule.args = payload.args.clone();
        rule.in_card = payload.in_card.clone();
        rule.created_by = signer.address();
        self.upsert_rule(rule);
        Ok(receipt)
    }
}
