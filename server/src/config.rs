use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use common::{parse_address, util, Contest};

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
pub const DEFAULT_PROTECTED_PATHS: &[&str] = &["/play", "/cartridges"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in environment or .env file")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.to_string(),
    }
}

/// Server settings, read once at start-up.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub node_url: Url,
    pub dapp_address: String,
    pub nft_address: String,
    pub chain_id: u64,
    pub invite_code_key: String,
    /// Contest metadata keyed by normalised rule id.
    pub contests: HashMap<String, Contest>,
    pub gif_server_url: Option<Url>,
    pub listen_addr: SocketAddr,
    pub invite_codes: Vec<String>,
    pub protected_paths: Vec<String>,
    pub session_ttl: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &'static str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));

        let node_url = Url::parse(&required("CARTESI_NODE_URL")?).map_err(|e| invalid("CARTESI_NODE_URL", e))?;
        let dapp_address = address(&required("DAPP_ADDR")?, "DAPP_ADDR")?;
        let nft_address = address(&required("NFT_ADDR")?, "NFT_ADDR")?;
        let chain_id = parse_chain_id(&required("CHAIN_ID")?)?;
        let invite_code_key = required("INVITE_CODE_KEY")?;
        let contests = parse_contests(&required("CONTESTS")?)?;

        let gif_server_url = var("GIF_SERVER_URL")
            .map(|raw| Url::parse(&raw).map_err(|e| invalid("GIF_SERVER_URL", e)))
            .transpose()?;
        let listen_addr: SocketAddr = var("RIVES_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse()
            .map_err(|e| invalid("RIVES_LISTEN_ADDR", e))?;
        let invite_codes = var("RIVES_INVITE_CODES").map(|raw| split_list(&raw)).unwrap_or_default();
        let protected_paths = match var("RIVES_PROTECTED_PATHS") {
            Some(raw) => split_list(&raw),
            None => DEFAULT_PROTECTED_PATHS.iter().map(|p| p.to_string()).collect(),
        };
        if let Some(bad) = protected_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(invalid("RIVES_PROTECTED_PATHS", format!("{} does not start with /", bad)));
        }
        let session_ttl = match var("RIVES_SESSION_TTL_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|e| invalid("RIVES_SESSION_TTL_SECS", e))?;
                if secs == 0 {
                    return Err(invalid("RIVES_SESSION_TTL_SECS", "must be positive"));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        };

        Ok(Self {
            node_url,
            dapp_address,
            nft_address,
            chain_id,
            invite_code_key,
            contests,
            gif_server_url,
            listen_addr,
            invite_codes,
            protected_paths,
            session_ttl,
        })
    }
}

fn address(raw: &str, name: &'static str) -> Result<String, ConfigError> {
    parse_address(raw).map_err(|e| invalid(name, e))?;
    Ok(raw.to_lowercase())
}

// Accepts decimal or 0x-prefixed hex.
fn parse_chain_id(raw: &str) -> Result<u64, ConfigError> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|e| invalid("CHAIN_ID", e))
}

fn parse_contests(raw: &str) -> Result<HashMap<String, Contest>, ConfigError> {
    let contests: HashMap<String, Contest> = serde_json::from_str(raw).map_err(|e| invalid("CONTESTS", e))?;
    Ok(contests
        .into_iter()
        .map(|(rule_id, contest)| (util::normalize_id(&rule_id), contest))
        .collect())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
