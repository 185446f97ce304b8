use serde::{Deserialize, Serialize};

use crate::contest::ContestStatus;
use crate::util::{self, hex_bytes};

/// Name of the canonical rule every cartridge gets on insertion.
pub const DEFAULT_RULE_NAME: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default)]
    pub link: String,
}

/// Descriptive metadata embedded in the cartridge image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfoCartridge {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub authors: Option<Vec<Author>>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartridgeInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub user_address: String,
    #[serde(default)]
    pub info: Option<InfoCartridge>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub input_index: Option<i64>,
    #[serde(default)]
    pub cover: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartridgesOutput {
    pub data: Vec<CartridgeInfo>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
}

/// A play configuration for a cartridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub cartridge_id: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub args: String,
    #[serde(default, with = "hex_bytes")]
    pub in_card: Vec<u8>,
    #[serde(default)]
    pub score_function: String,
    #[serde(default)]
    pub n_tapes: u64,
    #[serde(default)]
    pub n_verified: u64,
    #[serde(default)]
    pub start: Option<u64>,
    #[serde(default)]
    pub end: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RuleInfo {
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_RULE_NAME
    }

    /// Start/end of zero mean "unbounded" on the wire.
    pub fn window(&self) -> (Option<u64>, Option<u64>) {
        (
            self.start.filter(|ts| *ts > 0),
            self.end.filter(|ts| *ts > 0),
        )
    }

    pub fn contest_status(&self, now: u64) -> ContestStatus {
        let (start, end) = self.window();
        ContestStatus::of(start, end, self.n_tapes, self.n_verified, now)
    }
}

/// Rule ids are `sha256(cartridge_id_bytes ++ utf8(name))`.
pub fn rule_id(cartridge_id: &str, name: &str) -> Result<String, crate::DomainError> {
    let mut bytes = util::decode_hex(cartridge_id)?;
    bytes.extend_from_slice(name.as_bytes());
    Ok(util::content_id(&bytes))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesOutput {
    pub data: Vec<RuleInfo>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleTagsOutput {
    pub tags: Vec<String>,
}

/// Backend event emitted once a tape has been verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutput {
    pub version: String,
    pub cartridge_id: String,
    pub cartridge_input_index: i64,
    pub user_address: String,
    pub timestamp: u64,
    pub score: i64,
    pub rule_id: String,
    pub rule_input_index: i64,
    pub tape_hash: String,
    pub tape_input_index: i64,
    pub error_code: u64,
}

/// A submitted tape as recorded in the rollup's input log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyPayloadInput {
    pub rule_id: String,
    pub outcard_hash: String,
    #[serde(with = "hex_bytes")]
    pub tape: Vec<u8>,
    pub claimed_score: i64,
    pub msg_sender: String,
    pub timestamp: u64,
    pub input_index: u64,
}

impl VerifyPayloadInput {
    pub fn tape_id(&self) -> String {
        util::content_id(&self.tape)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputRecord {
    Verification(VerificationOutput),
    Tape(VerifyPayloadInput),
}

impl OutputRecord {
    /// Index of the input whose processing produced the record.
    pub fn input_index(&self) -> u64 {
        match self {
            OutputRecord::Verification(out) => out.tape_input_index.max(0) as u64,
            OutputRecord::Tape(input) => input.input_index,
        }
    }

    pub fn sender(&self) -> &str {
        match self {
            OutputRecord::Verification(out) => &out.user_address,
            OutputRecord::Tape(input) => &input.msg_sender,
        }
    }
}

/// An input the rollup reverted, with the report it left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedInput {
    pub input_index: u64,
    pub msg_sender: String,
    pub timestamp: u64,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    Notice,
    Input,
    Report,
}

impl OutputType {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputType::Notice => "notice",
            OutputType::Input => "input",
            OutputType::Report => "report",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDir {
    Asc,
    Desc,
}

impl OrderDir {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderDir::Asc => "asc",
            OrderDir::Desc => "desc",
        }
    }
}

/// Filters that become inspect query strings. Vectors repeat their key.
pub trait ToQuery {
    fn to_query(&self) -> Vec<(&'static str, String)>;
}

fn push_opt<T: ToString>(out: &mut Vec<(&'static str, String)>, key: &'static str, value: &Option<T>) {
    if let Some(value) = value {
        out.push((key, value.to_string()));
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CartridgesFilter {
    pub name: Option<String>,
    pub tags: Vec<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ToQuery for CartridgesFilter {
    fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        push_opt(&mut out, "name", &self.name);
        out.extend(self.tags.iter().map(|t| ("tags", t.clone())));
        push_opt(&mut out, "page", &self.page);
        push_opt(&mut out, "page_size", &self.page_size);
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RulesFilter {
    pub cartridge_id: Option<String>,
    pub id: Option<String>,
    pub ids: Vec<String>,
    pub active_ts: Option<u64>,
    pub name: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl RulesFilter {
    pub fn for_cartridge(cartridge_id: &str) -> Self {
        Self {
            cartridge_id: Some(util::normalize_id(cartridge_id)),
            ..Default::default()
        }
    }

    pub fn by_id(rule_id: &str) -> Self {
        Self {
            id: Some(util::normalize_id(rule_id)),
            ..Default::default()
        }
    }
}

impl ToQuery for RulesFilter {
    fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        push_opt(&mut out, "cartridge_id", &self.cartridge_id);
        push_opt(&mut out, "id", &self.id);
        out.extend(self.ids.iter().map(|id| ("ids", id.clone())));
        push_opt(&mut out, "active_ts", &self.active_ts);
        push_opt(&mut out, "name", &self.name);
        push_opt(&mut out, "page", &self.page);
        push_opt(&mut out, "page_size", &self.page_size);
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputsFilter {
    pub tags: Vec<String>,
    pub output_type: Option<OutputType>,
    pub msg_sender: Option<String>,
    /// Outputs produced while processing this input.
    pub input_index: Option<u64>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub order_by: Option<String>,
    pub order_dir: Option<OrderDir>,
}

impl OutputsFilter {
    pub fn tagged<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn of_type(mut self, output_type: OutputType) -> Self {
        self.output_type = Some(output_type);
        self
    }
}

impl ToQuery for OutputsFilter {
    fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut out: Vec<(&'static str, String)> =
            self.tags.iter().map(|t| ("tags", t.clone())).collect();
        if let Some(output_type) = self.output_type {
            out.push(("type", output_type.as_str().to_string()));
        }
        push_opt(&mut out, "msg_sender", &self.msg_sender);
        push_opt(&mut out, "input_index", &self.input_index);
        push_opt(&mut out, "page", &self.page);
        push_opt(&mut out, "page_size", &self.page_size);
        push_opt(&mut out, "order_by", &self.order_by);
        if let Some(dir) = self.order_dir {
            out.push(("order_dir", dir.as_str().to_string()));
        }
        out
    }
}

/// Gameplay submission for verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyPayload {
    pub rule_id: String,
    pub outcard_hash: String,
    #[serde(with = "hex_bytes")]
    pub tape: Vec<u8>,
    pub claimed_score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertCartridgePayload {
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleData {
    pub cartridge_id: String,
    pub name: String,
    pub description: String,
    pub args: String,
    pub score_function: String,
    #[serde(with = "hex_bytes")]
    pub in_card: Vec<u8>,
}

/// Recorded input log plus the outcard it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tape {
    #[serde(with = "hex_bytes")]
    pub log: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub outcard: Vec<u8>,
    pub outhash: String,
}

impl Tape {
    /// Content hash of the raw log; the tape's public id.
    pub fn id(&self) -> String {
        util::content_id(&self.log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_info_decodes_backend_json() {
        let json = r#"{
            "id": "aa", "name": "default", "description": "", "cartridge_id": "bb",
            "created_by": "0xf39f", "created_at": 0, "args": "", "in_card": "0x0102",
            "score_function": "score", "n_tapes": 3, "n_verified": 1,
            "start": null, "end": null, "tags": ["season"]
        }"#;
        let rule: RuleInfo = serde_json::from_str(json).unwrap();
        assert!(rule.is_default());
        assert_eq!(rule.in_card, vec![1, 2]);
        assert_eq!(rule.contest_status(100), ContestStatus::Invalid);
    }

    #[test]
    fn zero_window_is_unbounded() {
        let rule: RuleInfo = serde_json::from_str(
            r#"{"id":"a","name":"r","cartridge_id":"c","start":0,"end":50}"#,
        )
        .unwrap();
        assert_eq!(rule.window(), (None, Some(50)));
    }

    #[test]
    fn rule_id_hashes_cartridge_and_name() {
        let cartridge = "907ab088197625939b2137998b0efd59f30b3683093733c1ca4e0a62d638e09f";
        let mut bytes = hex::decode(cartridge).unwrap();
        bytes.extend_from_slice(b"default");
        assert_eq!(rule_id(cartridge, "default").unwrap(), util::content_id(&bytes));
        assert_eq!(
            rule_id(&format!("0x{}", cartridge), "default").unwrap(),
            rule_id(cartridge, "default").unwrap()
        );
    }

    #[test]
    fn outputs_filter_query_passes_through() {
        let filter = OutputsFilter {
            tags: vec!["score".into(), "cart".into()],
            output_type: Some(OutputType::Notice),
            page: Some(2),
            page_size: Some(10),
            order_by: Some("value".into()),
            order_dir: Some(OrderDir::Desc),
            ..Default::default()
        };
        assert_eq!(
            filter.to_query(),
            vec![
                ("tags", "score".to_string()),
                ("tags", "cart".to_string()),
                ("type", "notice".to_string()),
                ("page", "2".to_string()),
                ("page_size", "10".to_string()),
                ("order_by", "value".to_string()),
                ("order_dir", "desc".to_string()),
            ]
        );
    }

    #[test]
    fn outputs_filter_selects_sender_and_input() {
        let filter = OutputsFilter {
            msg_sender: Some("0xabc".into()),
            input_index: Some(7),
            ..OutputsFilter::tagged(["score"])
        };
        assert_eq!(
            filter.to_query(),
            vec![
                ("tags", "score".to_string()),
                ("msg_sender", "0xabc".to_string()),
                ("input_index", "7".to_string()),
            ]
        );
    }

    #[test]
    fn tape_id_is_log_hash() {
        let tape = Tape {
            log: b"log bytes".to_vec(),
            outcard: b"JSON{}".to_vec(),
            outhash: "00".into(),
        };
        assert_eq!(tape.id(), util::content_id(b"log bytes"));
    }
}
