//! `whitelist` checker: admits callers whose IP is on a remote list.
//!
//! The list lives at `ProviderURL` as YAML:
//!
//! ```yaml
//! whitelist:
//! - 10.0.0.0/8
//! - 192.168.1.7
//! ```
//!
//! It is refetched every five seconds and swapped in atomically. Until the
//! first successful fetch the list is empty and every caller is blocked.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tokio::task::JoinHandle;
use url::Url;

use crate::adapter::{AdapterError, Checker, CheckerBuilder};
use crate::config::decode::{ConfigSchema, FieldKind, TypedParams};
use crate::control::labels::CALLER_IP;
use crate::control::{CheckError, CheckErrorCode, CheckRequest};

pub const NAME: &str = "whitelist";
pub const IP_BLOCKED_MESSAGE: &str = "IP address is not on the whitelist";

const REFRESH_INTERVAL: Duration = Duration::from_secs(5);
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// An IP network in CIDR form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNet {
    addr: IpAddr,
    prefix: u8,
}

impl IpNet {
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = prefix_mask(self.prefix, 32) as u32;
                u32::from(net) & mask == u32::from(*ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = prefix_mask(self.prefix, 128);
                u128::from(net) & mask == u128::from(*ip) & mask
            }
            _ => false,
        }
    }
}

fn prefix_mask(prefix: u8, bits: u8) -> u128 {
    if prefix == 0 {
        return 0;
    }
    let all = if bits == 128 { u128::MAX } else { (1u128 << bits) - 1 };
    all & !((1u128 << (bits - prefix)) - 1)
}

impl FromStr for IpNet {
    type Err = String;

    /// A bare address is a single-host network (/32 or /128).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let addr: IpAddr = addr.trim().parse().map_err(|e| format!("{s}: {e}"))?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.trim().parse::<u8>().map_err(|e| format!("{s}: {e}"))?,
            None => max,
        };
        if prefix > max {
            return Err(format!("{s}: prefix length {prefix} out of range"));
        }
        Ok(Self { addr, prefix })
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListFile {
    #[serde(default)]
    whitelist: Vec<String>,
}

/// Parses a list document. Unparseable entries are logged and dropped.
pub fn parse_list(data: &[u8]) -> Result<Vec<IpNet>, serde_yaml::Error> {
    let file: ListFile = serde_yaml::from_slice(data)?;
    Ok(file
        .whitelist
        .iter()
        .filter_map(|entry| match entry.parse::<IpNet>() {
            Ok(net) => Some(net),
            Err(e) => {
                tracing::warn!(entry = %entry, error = %e, "Unable to parse whitelist entry");
                None
            }
        })
        .collect())
}

pub struct WhitelistChecker {
    list: Arc<ArcSwap<Vec<IpNet>>>,
    refresh: Mutex<Option<JoinHandle<()>>>,
}

impl WhitelistChecker {
    /// A checker over a fixed list, with no background refresh.
    pub fn with_list(list: Vec<IpNet>) -> Self {
        Self {
            list: Arc::new(ArcSwap::from_pointee(list)),
            refresh: Mutex::new(None),
        }
    }

    fn is_listed(&self, ip: &str) -> bool {
        let Ok(ip) = ip.parse::<IpAddr>() else {
            return false;
        };
        self.list.load().iter().any(|net| net.contains(&ip))
    }
}

impl Checker for WhitelistChecker {
    fn name(&self) -> &str {
        NAME
    }

    fn check(&self, request: &CheckRequest) -> Result<Option<CheckError>, AdapterError> {
        let Some(ip) = request.caller_ip() else {
            return Err(AdapterError::Check(format!("{CALLER_IP} Label not found")));
        };
        if self.is_listed(ip) {
            return Ok(None);
        }
        tracing::debug!(ip, "Caller not on whitelist");
        Ok(Some(CheckError::new(CheckErrorCode::IpAddressBlocked, IP_BLOCKED_MESSAGE)))
    }

    fn unload(&self) {
        if let Some(task) = self.refresh.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
            tracing::debug!("Whitelist refresh stopped");
        }
    }
}

impl Drop for WhitelistChecker {
    fn drop(&mut self) {
        self.unload();
    }
}

/// Background list refresh. Only this task writes the list.
async fn refresh_loop(provider_url: String, list: Arc<ArcSwap<Vec<IpNet>>>) {
    let client = match reqwest::Client::builder().timeout(FETCH_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Could not build whitelist HTTP client");
            return;
        }
    };

    let mut fetched_sha: Option<Vec<u8>> = None;
    let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
    loop {
        ticker.tick().await;
        if let Err(e) = refresh_once(&client, &provider_url, &list, &mut fetched_sha).await {
            tracing::warn!(provider = %provider_url, error = %e, "Whitelist refresh failed");
        }
    }
}

async fn refresh_once(
    client: &reqwest::Client,
    provider_url: &str,
    list: &ArcSwap<Vec<IpNet>>,
    fetched_sha: &mut Option<Vec<u8>>,
) -> Result<(), String> {
    let resp = client.get(provider_url).send().await.map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        return Err(format!("unexpected status {}", resp.status()));
    }
    let body = resp.bytes().await.map_err(|e| e.to_string())?;

    let sha = Sha1::digest(&body).to_vec();
    if fetched_sha.as_deref() == Some(sha.as_slice()) {
        return Ok(());
    }

    let nets = parse_list(&body).map_err(|e| e.to_string())?;
    if nets.is_empty() {
        return Err("fetched whitelist is empty".into());
    }
    tracing::info!(provider = %provider_url, entries = nets.len(), "Fetched new whitelist");
    list.store(Arc::new(nets));
    *fetched_sha = Some(sha);
    Ok(())
}

pub struct WhitelistBuilder;

impl CheckerBuilder for WhitelistBuilder {
    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new().required("ProviderURL", FieldKind::String)
    }

    fn validate_config(&self, params: &TypedParams) -> Result<(), AdapterError> {
        let url = params.get_str("ProviderURL").unwrap_or_default();
        Url::parse(url)
            .map(|_| ())
            .map_err(|e| AdapterError::InvalidConfig(format!("ProviderURL '{url}': {e}")))
    }

    fn build_checker(&self, params: &TypedParams) -> Result<Arc<dyn Checker>, AdapterError> {
        let provider_url = params
            .get_str("ProviderURL")
            .ok_or_else(|| AdapterError::InvalidConfig("ProviderURL is required".into()))?
            .to_string();
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AdapterError::Build(format!("whitelist refresh needs a tokio runtime: {e}")))?;

        let checker = WhitelistChecker::with_list(Vec::new());
        let task = runtime.spawn(refresh_loop(provider_url, checker.list.clone()));
        *checker.refresh.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        Ok(Arc::new(checker))
    }
}
