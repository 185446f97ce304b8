use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use url::Url;

use client::leaderboard::{fetch_page, LeaderboardEntry, LeaderboardKind};
use client::{resolve_tape, BackendApi, NodeBackend, NodeConfig, QueryOptions};
use common::{
    compute_score, model, util, CartridgesFilter, Entropy, Outcard, RulesFilter, ScoreFunction,
    DEFAULT_PAGE_SIZE, DEFAULT_RULE_NAME,
};

#[derive(Parser, Debug)]
#[command(name = "rives", about = "Browse RIVES cartridges, rules and leaderboards from the terminal")]
struct Cli {
    /// Rollup node serving the inspect and graphql endpoints
    #[arg(long, env = "CARTESI_NODE_URL", default_value = "http://localhost:8080")]
    node_url: String,

    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List cartridges
    Cartridges {
        /// Substring of the cartridge name
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE as u32)]
        page_size: u32,
    },
    /// List the rules of a cartridge
    Rules {
        cartridge_id: String,
        /// Only rules whose contest window is open now
        #[arg(long)]
        active: bool,
    },
    /// Download cartridge bytes and check them against the id
    Download {
        cartridge_id: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show a page of a rule's leaderboard
    Leaderboard {
        cartridge_id: String,
        /// Rule id (defaults to the cartridge's default rule)
        #[arg(long)]
        rule: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Submitted tapes instead of verified scores
        #[arg(long)]
        tapes: bool,
    },
    /// Resolve a tape to its verification, rule and author
    Tape { tape_id: String },
    /// Compute the id of a tape log file
    TapeId { file: PathBuf },
    /// Derive the emulator entropy seed for a player and rule
    Entropy {
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        rule: Option<String>,
    },
    /// Score an outcard, optionally with a rule score function
    Score {
        /// Outcard file (4-byte tag followed by the payload)
        #[arg(long, conflicts_with = "json_outcard")]
        outcard: Option<PathBuf>,
        /// JSON outcard body, without the tag
        #[arg(long)]
        json_outcard: Option<String>,
        #[arg(long)]
        function: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    run(cli).await
}

fn backend(node_url: &str) -> Result<NodeBackend> {
    let url = Url::parse(node_url).with_context(|| format!("Invalid node url {}", node_url))?;
    Ok(NodeBackend::new(NodeConfig::new(url)))
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Cartridges {
            name,
            tags,
            page,
            page_size,
        } => {
            let backend = backend(&cli.node_url)?;
            let filter = CartridgesFilter {
                name,
                tags,
                page: Some(page),
                page_size: Some(page_size),
            };
            let out = backend.cartridges(&filter, QueryOptions::no_store()).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }
            println!("{} cartridges (page {})", out.total, out.page.max(1));
            for cartridge in out.data {
                println!(
                    "{}  {:<24} {}  {}",
                    cartridge.id,
                    cartridge.name,
                    util::short_address(&cartridge.user_address),
                    format_time(cartridge.created_at)
                );
            }
        }
        Command::Rules { cartridge_id, active } => {
            let backend = backend(&cli.node_url)?;
            let filter = RulesFilter {
                active_ts: active.then(common::unix_now),
                ..RulesFilter::for_cartridge(&cartridge_id)
            };
            let out = backend.rules(&filter, QueryOptions::no_store()).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }
            let now = common::unix_now();
            for rule in out.data {
                let marker = if rule.is_default() { "*" } else { " " };
                println!(
                    "{}{}  {:<20} tapes {:>4} verified {:>4}  {}",
                    marker,
                    rule.id,
                    rule.name,
                    rule.n_tapes,
                    rule.n_verified,
                    rule.contest_status(now).message()
                );
            }
        }
        Command::Download { cartridge_id, output } => {
            let backend = backend(&cli.node_url)?;
            let id = util::normalize_id(&cartridge_id);
            let data = backend.cartridge(&id, QueryOptions::force_cache()).await?;
            if !util::matches_content_id(&id, &data) {
                bail!("Downloaded bytes hash to {}, expected {}", util::content_id(&data), id);
            }
            let path = output.unwrap_or_else(|| PathBuf::from(format!("{}.rivlet", id)));
            tokio::fs::write(&path, &data)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {} bytes to {}", data.len(), path.display());
            println!("{}", path.display());
        }
        Command::Leaderboard {
            cartridge_id,
            rule,
            page,
            tapes,
        } => {
            let backend = backend(&cli.node_url)?;
            let rule_id = match rule {
                Some(rule) => util::normalize_id(&rule),
                None => model::rule_id(&cartridge_id, DEFAULT_RULE_NAME)?,
            };
            let kind = if tapes { LeaderboardKind::Tapes } else { LeaderboardKind::Scores };
            debug!("Fetching {:?} page {} of rule {}", kind, page, rule_id);
            let entries = fetch_page(&backend, kind, &cartridge_id, &rule_id, page.max(1), DEFAULT_PAGE_SIZE).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            for line in leaderboard_lines(&entries, page.max(1), DEFAULT_PAGE_SIZE) {
                println!("{}", line);
            }
            if entries.len() < DEFAULT_PAGE_SIZE {
                println!("(end of leaderboard)");
            }
        }
        Command::Tape { tape_id } => {
            let backend = backend(&cli.node_url)?;
            let resolved = resolve_tape(&backend, &tape_id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&resolved.verification)?);
                return Ok(());
            }
            println!("tape      {}", util::normalize_id(&tape_id));
            println!("author    {}", resolved.author());
            println!("rule      {} ({})", resolved.rule.name, resolved.rule.id);
            println!("cartridge {}", resolved.rule.cartridge_id);
            println!("score     {}", resolved.verification.score);
            println!("verified  {}", format_time(resolved.verification.timestamp));
        }
        Command::TapeId { file } => {
            let log = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            println!("{}", util::content_id(&log));
        }
        Command::Entropy { address, rule } => {
            let entropy = Entropy::for_player(address.as_deref(), rule.as_deref())?;
            println!("{}", entropy);
        }
        Command::Score {
            outcard,
            json_outcard,
            function,
        } => {
            let raw = match (outcard, json_outcard) {
                (Some(path), _) => tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, Some(body)) => [b"JSON".as_slice(), body.as_bytes()].concat(),
                (None, None) => bail!("Pass --outcard or --json-outcard"),
            };
            println!("{}", score_outcard(&raw, function.as_deref())?);
        }
    }
    Ok(())
}

fn format_time(timestamp: u64) -> String {
    DateTime::from_timestamp(timestamp as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn leaderboard_lines(entries: &[LeaderboardEntry], page: u32, page_size: usize) -> Vec<String> {
    let offset = (page.max(1) as usize - 1) * page_size;
    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let score = entry
                .score
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            format!(
                "{:>3}. {:<13} {:>10}  {}  {}",
                offset + idx + 1,
                util::short_address(&entry.sender),
                score,
                format_time(entry.timestamp),
                entry.tape_id
            )
        })
        .collect()
}

fn score_outcard(raw: &[u8], function: Option<&str>) -> Result<String> {
    let outcard = Outcard::parse(raw)?;
    let function = ScoreFunction::parse_optional(function)?;
    let score = compute_score(function.as_ref(), &outcard)?;
    Ok(score.map(|s| s.to_string()).unwrap_or_else(|| "no score".to_string()))
}
