use anyhow::Result;
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::validation::is_safe_url;

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub gateway_url: String,
    pub network_id: String,
    pub facilitator_endpoints: Vec<String>,
    pub chain_id: u64,
    pub request_timeout: Duration,
    pub probe_interval: Duration,
    pub confirmations: u32,
    pub ledger_path: Option<PathBuf>,
    pub persist_outcomes: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        let rpc_url = checked_url(&env::var("WALLET_RPC_URL")?)?;
        let gateway_url = checked_url(
            &env::var("X402_GATEWAY_URL").unwrap_or_else(|_| "https://gateway.x402.org".to_string()),
        )?;

        Ok(Config {
            rpc_url,
            gateway_url,
            network_id: env::var("X402_NETWORK_ID").unwrap_or_else(|_| "x402-mainnet".to_string()),
            facilitator_endpoints: parse_endpoints(
                &env::var("X402_FACILITATOR_NODES").unwrap_or_default(),
            )?,
            chain_id: env::var("WALLET_CHAIN_ID")
                .unwrap_or_else(|_| "1".to_string())
                .parse()?,
            request_timeout: Duration::from_millis(
                env::var("REQUEST_TIMEOUT_MS")
                    .unwrap_or_else(|_| "30000".to_string())
                    .parse()?,
            ),
            probe_interval: Duration::from_secs(
                env::var("PROBE_INTERVAL_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()?,
            ),
            confirmations: env::var("CONFIRMATIONS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()?,
            ledger_path: env::var("WALLET_LEDGER_PATH").ok().map(PathBuf::from),
            persist_outcomes: env::var("PERSIST_OUTCOMES")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }
}

fn checked_url(raw: &str) -> Result<String> {
    Url::parse(raw)?;
    if !is_safe_url(raw) {
        anyhow::bail!("URL must use http or https: {raw}");
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn parse_endpoints(raw: &str) -> Result<Vec<String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(checked_url)
        .collect()
}
