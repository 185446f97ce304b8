use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use common::{
    util, CartridgeInfo, CartridgesFilter, CartridgesOutput, InsertCartridgePayload,
    OutputRecord, OutputsFilter, RejectedInput, RuleData, RuleTagsOutput, RulesFilter,
    RulesOutput, ToQuery, VerifyPayload, VerifyPayloadInput,
};

use crate::abi;
use crate::backend::{BackendApi, BackendError, BackendResult, CachePolicy, QueryOptions};
use crate::signer::{InputReceipt, Signer};

const CORE_MODULE: &str = "core";
const INDEXER_MODULE: &str = "indexer";

const NOTICE_QUERY: &str = "query notice($outputIndex: Int!, $inputIndex: Int!) { notice(noticeIndex: $outputIndex, inputIndex: $inputIndex) { payload } }";
const INPUT_QUERY: &str =
    "query input($inputIndex: Int!) { input(index: $inputIndex) { index payload msgSender timestamp } }";

const REJECTED_INPUTS_QUERY: &str = "query inputs { inputs { edges { node { index status msgSender timestamp reports { edges { node { payload } } } } } } }";
const REJECTED_STATUS: &str = "REJECTED";

#[derive(Debug, Deserialize)]
struct InspectReport {
    payload: String,
}

#[derive(Debug, Deserialize)]
struct InspectResponse {
    status: String,
    #[serde(default)]
    exception_payload: Option<String>,
    #[serde(default)]
    reports: Vec<InspectReport>,
    #[serde(default)]
    processed_input_count: u64,
}

#[derive(Debug, Deserialize)]
struct IndexerEntry {
    input_index: u64,
    output_index: u64,
    #[serde(alias = "output_type")]
    r#type: String,
}

#[derive(Debug, Deserialize)]
struct IndexerOutput {
    data: Vec<IndexerEntry>,
    #[serde(default)]
    #[allow(dead_code)]
    total: u64,
}

/// Rollup node settings for [`NodeBackend`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_url: Url,
    pub sync_poll_interval: Duration,
    pub sync_max_polls: u32,
}

impl NodeConfig {
    pub fn new(node_url: Url) -> Self {
        Self {
            node_url,
            sync_poll_interval: Duration::from_secs(1),
            sync_max_polls: 300,
        }
    }
}

/// Entries kept by the force-cache memo before the oldest is evicted.
pub const CACHE_MAX_ENTRIES: usize = 64;
/// Total payload bytes kept by the force-cache memo.
pub const CACHE_MAX_BYTES: usize = 64 * 1024 * 1024;

/// Insertion-ordered memo of force-cached responses, bounded in entries and bytes.
#[derive(Debug, Default)]
struct ResponseCache {
    entries: HashMap<String, Vec<u8>>,
    order: VecDeque<String>,
    bytes: usize,
}

impl ResponseCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: String, data: Vec<u8>) {
        if data.len() > CACHE_MAX_BYTES {
            debug!("not caching {} ({} bytes)", key, data.len());
            return;
        }
        if let Some(old) = self.entries.remove(&key) {
            self.bytes -= old.len();
            self.order.retain(|k| k != &key);
        }
        while self.order.len() >= CACHE_MAX_ENTRIES || self.bytes + data.len() > CACHE_MAX_BYTES {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.bytes -= evicted.len();
            }
        }
        self.bytes += data.len();
        self.order.push_back(key.clone());
        self.entries.insert(key, data);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// [`BackendApi`] over a rollup node's inspect and GraphQL endpoints.
pub struct NodeBackend {
    http: reqwest::Client,
    config: NodeConfig,
    cache: Mutex<ResponseCache>,
}

impl NodeBackend {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            cache: Mutex::new(ResponseCache::default()),
        }
    }

    pub fn node_url(&self) -> &Url {
        &self.config.node_url
    }

    fn inspect_url(&self, module: &str, query: &str, pairs: &[(&'static str, String)]) -> BackendResult<Url> {
        let base = self.config.node_url.as_str().trim_end_matches('/');
        let url = Url::parse_with_params(&format!("{}/inspect/{}/{}", base, module, query), pairs)?;
        Ok(url)
    }

    fn graphql_url(&self) -> BackendResult<Url> {
        let base = self.config.node_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}/graphql", base))?)
    }

    async fn cached(&self, key: &str, opts: QueryOptions) -> Option<Vec<u8>> {
        if opts.cache != CachePolicy::ForceCache {
            return None;
        }
        self.cache.lock().await.get(key)
    }

    async fn remember(&self, key: String, data: &[u8], opts: QueryOptions) {
        if opts.cache == CachePolicy::ForceCache {
            self.cache.lock().await.insert(key, data.to_vec());
        }
    }

    async fn inspect_raw(&self, url: &Url) -> BackendResult<InspectResponse> {
        debug!("inspect {}", url);
        let response = self.http.get(url.clone()).send().await?.error_for_status()?;
        let body: InspectResponse = response.json().await?;
        if body.status != "Accepted" {
            let message = body
                .exception_payload
                .as_deref()
                .and_then(|p| util::decode_hex(p).ok())
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .unwrap_or_else(|| body.status.clone());
            warn!("inspect {} returned {}: {}", url, body.status, message);
            return Err(BackendError::Rejected(message));
        }
        Ok(body)
    }

    /// Runs an inspect query and concatenates the report payloads.
    async fn inspect(
        &self,
        module: &str,
        query: &str,
        pairs: &[(&'static str, String)],
        opts: QueryOptions,
    ) -> BackendResult<Vec<u8>> {
        let url = self.inspect_url(module, query, pairs)?;
        if let Some(hit) = self.cached(url.as_str(), opts).await {
            debug!("cache hit {}", url);
            return Ok(hit);
        }
        let body = self.inspect_raw(&url).await?;
        let mut data = Vec::new();
        for report in &body.reports {
            data.extend(util::decode_hex(&report.payload)?);
        }
        self.remember(url.to_string(), &data, opts).await;
        Ok(data)
    }

    async fn inspect_json<T: DeserializeOwned>(
        &self,
        module: &str,
        query: &str,
        pairs: &[(&'static str, String)],
        opts: QueryOptions,
    ) -> BackendResult<T> {
        let data = self.inspect(module, query, pairs, opts).await?;
        let text = std::str::from_utf8(&data)
            .map_err(|_| BackendError::Decode(format!("{} report is not utf-8", query)))?;
        Ok(serde_json::from_str(text)?)
    }

    async fn graphql(&self, query: &str, variables: Value, opts: QueryOptions) -> BackendResult<Value> {
        let key = format!("graphql:{}:{}", query, variables);
        if let Some(hit) = self.cached(&key, opts).await {
            return Ok(serde_json::from_slice(&hit)?);
        }
        let response = self
            .http
            .post(self.graphql_url()?)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;
        if let Some(errors) = body.get("errors") {
            return Err(BackendError::Rejected(errors.to_string()));
        }
        let data = body
            .get("data")
            .cloned()
            .ok_or_else(|| BackendError::Decode("graphql response without data".into()))?;
        self.remember(key, data.to_string().as_bytes(), opts).await;
        Ok(data)
    }

    async fn fetch_output(&self, entry: &IndexerEntry, opts: QueryOptions) -> BackendResult<Option<OutputRecord>> {
        match entry.r#type.as_str() {
            "notice" => {
                let data = self
                    .graphql(
                        NOTICE_QUERY,
                        json!({ "outputIndex": entry.output_index, "inputIndex": entry.input_index }),
                        opts,
                    )
                    .await?;
                let payload = string_field(&data["notice"], "payload")?;
                let output = abi::decode_verification_output(&util::decode_hex(&payload)?)?;
                Ok(Some(OutputRecord::Verification(output)))
            }
            "input" => {
                let data = self
                    .graphql(INPUT_QUERY, json!({ "inputIndex": entry.input_index }), opts)
                    .await?;
                let input = &data["input"];
                let payload = abi::decode_verify_input(&util::decode_hex(&string_field(input, "payload")?)?)?;
                Ok(Some(OutputRecord::Tape(VerifyPayloadInput {
                    rule_id: payload.rule_id,
                    outcard_hash: payload.outcard_hash,
                    tape: payload.tape,
                    claimed_score: payload.claimed_score,
                    msg_sender: string_field(input, "msgSender")?.to_lowercase(),
                    timestamp: number_field(input, "timestamp")?,
                    input_index: entry.input_index,
                })))
            }
            other => {
                warn!("skipping indexed output of type {}", other);
                Ok(None)
            }
        }
    }

    async fn send_input(
        &self,
        signer: &dyn Signer,
        dapp: &str,
        payload: Vec<u8>,
        sync: bool,
    ) -> BackendResult<InputReceipt> {
        let receipt = signer.add_input(dapp, payload).await?;
        info!("input {} added to {}", receipt.input_index, dapp);
        if sync {
            self.wait_processed(receipt.input_index).await?;
        }
        Ok(receipt)
    }

    /// Polls inspect until the node has processed `input_index`.
    async fn wait_processed(&self, input_index: u64) -> BackendResult<()> {
        let url = self.inspect_url(CORE_MODULE, "rule_tags", &[])?;
        for _ in 0..self.config.sync_max_polls {
            let body = self.inspect_raw(&url).await?;
            if body.processed_input_count > input_index {
                debug!("input {} processed", input_index);
                return Ok(());
            }
            tokio::time::sleep(self.config.sync_poll_interval).await;
        }
        Err(BackendError::SyncTimeout(input_index))
    }
}

fn string_field(value: &Value, field: &str) -> BackendResult<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BackendError::Decode(format!("missing {}", field)))
}

// BigInt fields arrive as either JSON numbers or decimal strings.
fn number_field(value: &Value, field: &str) -> BackendResult<u64> {
    let parsed = match value.get(field) {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| BackendError::Decode(format!("missing {}", field)))
}

/// First report payload of an input, decoded as utf-8.
fn report_message(reports: &Value) -> BackendResult<String> {
    let Some(payload) = reports["edges"]
        .as_array()
        .and_then(|edges| edges.first())
        .and_then(|edge| edge["node"]["payload"].as_str())
    else {
        return Ok(String::new());
    };
    let bytes = util::decode_hex(payload)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[async_trait]
impl BackendApi for NodeBackend {
    async fn cartridges(
        &self,
        filter: &CartridgesFilter,
        opts: QueryOptions,
    ) -> BackendResult<CartridgesOutput> {
        self.inspect_json(CORE_MODULE, "cartridges", &filter.to_query(), opts).await
    }

    async fn cartridge(&self, id: &str, opts: QueryOptions) -> BackendResult<Vec<u8>> {
        let id = util::normalize_id(id);
        let data = self
            .inspect(CORE_MODULE, "cartridge", &[("id", id.clone())], opts)
            .await?;
        if data.is_empty() {
            return Err(BackendError::NotFound(format!("cartridge {}", id)));
        }
        Ok(data)
    }

    async fn cartridge_info(
        &self,
        id: &str,
        opts: QueryOptions,
    ) -> BackendResult<Option<CartridgeInfo>> {
        let id = util::normalize_id(id);
        self.inspect_json(CORE_MODULE, "cartridge_info", &[("id", id)], opts).await
    }

    async fn rules(&self, filter: &RulesFilter, opts: QueryOptions) -> BackendResult<RulesOutput> {
        self.inspect_json(CORE_MODULE, "rules", &filter.to_query(), opts).await
    }

    async fn rule_tags(&self, cartridge_id: &str, opts: QueryOptions) -> BackendResult<Vec<String>> {
        let pairs = [("cartridge_id", util::normalize_id(cartridge_id))];
        let out: RuleTagsOutput = self.inspect_json(CORE_MODULE, "rule_tags", &pairs, opts).await?;
        Ok(out.tags)
    }

    async fn get_outputs(
        &self,
        filter: &OutputsFilter,
        opts: QueryOptions,
    ) -> BackendResult<Vec<OutputRecord>> {
        let index: IndexerOutput = self
            .inspect_json(INDEXER_MODULE, "indexer_query", &filter.to_query(), opts)
            .await?;
        let mut records = Vec::with_capacity(index.data.len());
        for entry in &index.data {
            if let Some(record) = self.fetch_output(entry, opts).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn rejected_inputs(&self, msg_sender: &str, opts: QueryOptions) -> BackendResult<Vec<RejectedInput>> {
        let data = self.graphql(REJECTED_INPUTS_QUERY, json!({}), opts).await?;
        let edges = data["inputs"]["edges"].as_array().cloned().unwrap_or_default();
        let mut rejected = Vec::new();
        for edge in &edges {
            let node = &edge["node"];
            if string_field(node, "status")? != REJECTED_STATUS {
                continue;
            }
            let sender = string_field(node, "msgSender")?.to_lowercase();
            if !sender.eq_ignore_ascii_case(msg_sender) {
                continue;
            }
            rejected.push(RejectedInput {
                input_index: number_field(node, "index")?,
                msg_sender: sender,
                timestamp: number_field(node, "timestamp")?,
                error: report_message(&node["reports"])?,
            });
        }
        debug!("{} rejected inputs from {}", rejected.len(), msg_sender);
        Ok(rejected)
    }

    async fn verify(
        &self,
        signer: &dyn Signer,
        dapp: &str,
        payload: &VerifyPayload,
        sync: bool,
    ) -> BackendResult<InputReceipt> {
        self.send_input(signer, dapp, abi::encode_verify(payload)?, sync).await
    }

    async fn insert_cartridge(
        &self,
        signer: &dyn Signer,
        dapp: &str,
        payload: &InsertCartridgePayload,
        sync: bool,
    ) -> BackendResult<InputReceipt> {
        self.send_input(signer, dapp, abi::encode_insert_cartridge(payload), sync).await
    }

    async fn create_rule(
        &self,
        signer: &dyn Signer,
        dapp: &str,
        payload: &RuleData,
        sync: bool,
    ) -> BackendResult<InputReceipt> {
        self.send_input(signer, dapp, abi::encode_create_rule(payload)?, sync).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> NodeBackend {
        NodeBackend::new(NodeConfig::new(Url::parse("http://localhost:8080/").unwrap()))
    }

    #[test]
    fn inspect_url_encodes_filters() {
        let filter = OutputsFilter::tagged(["score", "ab"]).of_type(common::OutputType::Notice);
        let url = backend()
            .inspect_url(INDEXER_MODULE, "indexer_query", &filter.to_query())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/inspect/indexer/indexer_query?tags=score&tags=ab&type=notice"
        );
    }

    #[test]
    fn bigint_fields_accept_strings() {
        let value = json!({ "a": "1700000000", "b": 5 });
        assert_eq!(number_field(&value, "a").unwrap(), 1_700_000_000);
        assert_eq!(number_field(&value, "b").unwrap(), 5);
        assert!(number_field(&value, "c").is_err());
    }

    #[tokio::test]
    async fn no_store_bypasses_cache() {
        let node = backend();
        node.remember("k".into(), b"v", QueryOptions::no_store()).await;
        assert!(node.cached("k", QueryOptions::force_cache()).await.is_none());
        node.remember("k".into(), b"v", QueryOptions::force_cache()).await;
        assert_eq!(node.cached("k", QueryOptions::force_cache()).await, Some(b"v".to_vec()));
        assert!(node.cached("k", QueryOptions::no_store()).await.is_none());
    }

    #[test]
    fn report_payload_is_text() {
        let reports = json!({ "edges": [{ "node": { "payload": util::encode_hex_prefixed(b"Invalid tape") } }] });
        assert_eq!(report_message(&reports).unwrap(), "Invalid tape");
        assert_eq!(report_message(&json!({ "edges": [] })).unwrap(), "");
        assert!(report_message(&json!({ "edges": [{ "node": { "payload": "0xzz" } }] })).is_err());
    }

    #[test]
    fn cache_evicts_oldest_entries() {
        let mut cache = ResponseCache::default();
        for i in 0..CACHE_MAX_ENTRIES + 5 {
            cache.insert(format!("k{}", i), vec![i as u8]);
        }
        assert_eq!(cache.len(), CACHE_MAX_ENTRIES);
        assert!(cache.get("k0").is_none());
        assert!(cache.get("k4").is_none());
        assert_eq!(cache.get("k5"), Some(vec![5]));

        cache.insert("k5".into(), vec![9, 9]);
        assert_eq!(cache.len(), CACHE_MAX_ENTRIES);
        assert_eq!(cache.get("k5"), Some(vec![9, 9]));
    }

    #[test]
    fn cache_is_bounded_in_bytes() {
        let mut cache = ResponseCache::default();
        let half = CACHE_MAX_BYTES / 2;
        cache.insert("a".into(), vec![0; half]);
        cache.insert("b".into(), vec![0; half]);
        cache.insert("c".into(), vec![0; 1]);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.bytes <= CACHE_MAX_BYTES);

        cache.insert("huge".into(), vec![0; CACHE_MAX_BYTES + 1]);
        assert!(cache.get("huge").is_none());
        assert!(cache.get("b").is_some());
    }
}
