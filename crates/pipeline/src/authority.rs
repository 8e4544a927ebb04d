//! Authority registry: the current recipient list and its refresh/cache policy.
//!
//! The list lives in a `watch` channel so [`AuthorityRegistry::current`]
//! never blocks and always returns the last known good value. Only the
//! registry writes it:
//!
//! - a successful remote refresh replaces it and persists the cache file,
//! - a failed refresh (network error, malformed or empty reply) leaves it
//!   untouched,
//! - an operator save replaces it, persists it, and pushes it upstream on a
//!   best-effort basis.
//!
//! At startup the cache file wins over the manually configured seed list.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use damwatch_core::recipients::{normalize_recipients, parse_recipient_list};
use damwatch_core::types::Timestamp;
use damwatch_events::{NoticeBus, NoticeKind, OperatorNotice};

/// HTTP request timeout for the remote authority endpoint.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Path of the authority endpoint relative to the service base URL.
const AUTHORITIES_PATH: &str = "/api/authorities";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("No remote authority source is configured")]
    NotConfigured,

    #[error("Authority source unreachable: {0}")]
    Unreachable(String),

    #[error("Malformed authority response: {0}")]
    Malformed(String),

    #[error("Authority list is empty")]
    Empty,

    #[error("Authority cache error: {0}")]
    Cache(String),
}

// ---------------------------------------------------------------------------
// AuthorityList
// ---------------------------------------------------------------------------

/// Where the current list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOrigin {
    Empty,
    Seed,
    Cache,
    Remote,
    Override,
}

/// Ordered set of recipient addresses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorityList {
    pub addresses: Vec<String>,
    pub origin: ListOrigin,
    pub updated_at: Option<Timestamp>,
}

impl AuthorityList {
    fn empty() -> Self {
        Self {
            addresses: Vec::new(),
            origin: ListOrigin::Empty,
            updated_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// On-disk cache format.
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    authorities: Vec<String>,
    updated_at: Timestamp,
}

// ---------------------------------------------------------------------------
// AuthoritySource
// ---------------------------------------------------------------------------

/// Remote recipient source.
#[async_trait]
pub trait AuthoritySource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<String>, RegistryError>;

    async fn push(&self, addresses: &[String]) -> Result<(), RegistryError>;
}

/// Parse a remote authority reply.
///
/// Accepts `{"authorities": [..]}`, `{"data": [{"email": ..}]}`, a bare JSON
/// array of strings, a JSON string, or a plain-text comma list. The result is
/// normalised; an empty list is reported as [`RegistryError::Empty`].
pub fn parse_authority_payload(body: &str) -> Result<Vec<String>, RegistryError> {
    let addresses = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => addresses_from_json(&value)?,
        Err(_) => {
            if body.trim_start().starts_with(['{', '[']) {
                return Err(RegistryError::Malformed("invalid JSON".into()));
            }
            plain_text_list(body)?
        }
    };
    if addresses.is_empty() {
        return Err(RegistryError::Empty);
    }
    Ok(addresses)
}

/// Parse a comma list, rejecting anything that is not shaped like an
/// address (an HTML error page served with a 200, for instance).
fn plain_text_list(raw: &str) -> Result<Vec<String>, RegistryError> {
    let addresses = parse_recipient_list(raw);
    match addresses.iter().find(|a| !looks_like_address(a)) {
        Some(bad) => {
            let preview: String = bad.chars().take(40).collect();
            Err(RegistryError::Malformed(format!(
                "not a recipient address: {preview:?}"
            )))
        }
        None => Ok(addresses),
    }
}

fn looks_like_address(entry: &str) -> bool {
    entry.contains('@') && !entry.contains(|c: char| c.is_whitespace() || c == '<' || c == '>')
}

fn addresses_from_json(value: &serde_json::Value) -> Result<Vec<String>, RegistryError> {
    use serde_json::Value;

    let strings = |items: &[Value]| -> Result<Vec<String>, RegistryError> {
        items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Object(obj) => obj
                    .get("email")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| RegistryError::Malformed("entry without email".into())),
                _ => Err(RegistryError::Malformed("unexpected entry type".into())),
            })
            .collect()
    };

    let raw = match value {
        Value::Array(items) => strings(items)?,
        Value::String(s) => return plain_text_list(s),
        Value::Object(obj) => match obj.get("authorities").or_else(|| obj.get("data")) {
            Some(Value::Array(items)) => strings(items)?,
            Some(Value::String(s)) => return plain_text_list(s),
            _ => {
                return Err(RegistryError::Malformed(
                    "expected an \"authorities\" or \"data\" list".into(),
                ))
            }
        },
        _ => return Err(RegistryError::Malformed("unexpected JSON type".into())),
    };
    Ok(normalize_recipients(raw))
}

/// Remote authority list served over HTTP at `{base_url}/api/authorities`.
pub struct HttpAuthoritySource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAuthoritySource {
    pub fn new(base_url: &str) -> Result<Self, RegistryError> {
        let base = base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(RegistryError::NotConfigured);
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{base}{AUTHORITIES_PATH}"),
        })
    }
}

#[async_trait]
impl AuthoritySource for HttpAuthoritySource {
    async fn fetch(&self) -> Result<Vec<String>, RegistryError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Unreachable(format!("HTTP {}", status.as_u16())));
        }
        let body = response
            .text()
            .await
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;
        parse_authority_payload(&body)
    }

    async fn push(&self, addresses: &[String]) -> Result<(), RegistryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "authorities": addresses }))
            .send()
            .await
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RegistryError::Unreachable(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AuthorityRegistry
// ---------------------------------------------------------------------------

pub struct AuthorityRegistry {
    source: Option<Arc<dyn AuthoritySource>>,
    cache_path: PathBuf,
    list: watch::Sender<AuthorityList>,
    /// Serialises refresh and save.
    write_lock: Mutex<()>,
    notices: Arc<NoticeBus>,
}

impl AuthorityRegistry {
    /// Build the registry from the cache file, falling back to `seed`.
    /// An unreadable cache is logged and ignored.
    pub async fn open(
        source: Option<Arc<dyn AuthoritySource>>,
        cache_path: impl Into<PathBuf>,
        seed: Vec<String>,
        notices: Arc<NoticeBus>,
    ) -> Self {
        let cache_path = cache_path.into();
        let seed = normalize_recipients(seed);

        let initial = match read_cache(&cache_path).await {
            Ok(Some(cache)) if !cache.authorities.is_empty() => AuthorityList {
                addresses: normalize_recipients(cache.authorities),
                origin: ListOrigin::Cache,
                updated_at: Some(cache.updated_at),
            },
            Ok(_) if !seed.is_empty() => AuthorityList {
                addresses: seed,
                origin: ListOrigin::Seed,
                updated_at: None,
            },
            Ok(_) => AuthorityList::empty(),
            Err(e) => {
                tracing::warn!(path = %cache_path.display(), error = %e, "Ignoring unreadable authority cache");
                if seed.is_empty() {
                    AuthorityList::empty()
                } else {
                    AuthorityList {
                        addresses: seed,
                        origin: ListOrigin::Seed,
                        updated_at: None,
                    }
                }
            }
        };

        tracing::info!(
            origin = ?initial.origin,
            count = initial.addresses.len(),
            "Authority registry loaded"
        );

        let (list, _) = watch::channel(initial);
        Self {
            source,
            cache_path,
            list,
            write_lock: Mutex::new(()),
            notices,
        }
    }

    pub fn has_remote(&self) -> bool {
        self.source.is_some()
    }

    /// Best available list. Never blocks.
    pub fn current(&self) -> AuthorityList {
        self.list.borrow().clone()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.list.borrow().addresses.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthorityList> {
        self.list.subscribe()
    }

    /// Fetch the remote list. On failure the current list is kept and a
    /// stale notice is published.
    pub async fn refresh(&self) -> Result<AuthorityList, RegistryError> {
        let source = self.source.as_ref().ok_or(RegistryError::NotConfigured)?;
        let _guard = self.write_lock.lock().await;

        match source.fetch().await {
            Ok(addresses) => {
                let addresses = normalize_recipients(addresses);
                if addresses.is_empty() {
                    return Err(self.stale(RegistryError::Empty));
                }
                let next = AuthorityList {
                    addresses,
                    origin: ListOrigin::Remote,
                    updated_at: Some(Utc::now()),
                };
                if self.list.borrow().addresses != next.addresses {
                    self.notices.publish(OperatorNotice::new(
                        NoticeKind::AuthoritiesRefreshed,
                        format!("Authority list refreshed: {} recipients", next.addresses.len()),
                    ));
                }
                self.persist(&next).await;
                self.list.send_replace(next.clone());
                Ok(next)
            }
            Err(e) => Err(self.stale(e)),
        }
    }

    /// Replace the list with an operator override.
    pub async fn save(&self, addresses: Vec<String>) -> Result<AuthorityList, RegistryError> {
        let addresses = normalize_recipients(addresses);
        if addresses.is_empty() {
            return Err(RegistryError::Empty);
        }
        let _guard = self.write_lock.lock().await;

        let next = AuthorityList {
            addresses,
            origin: ListOrigin::Override,
            updated_at: Some(Utc::now()),
        };
        self.list.send_replace(next.clone());
        self.persist(&next).await;

        self.notices.publish(OperatorNotice::new(
            NoticeKind::AuthoritiesSaved,
            format!("Authority list saved: {} recipients", next.addresses.len()),
        ));

        if let Some(source) = &self.source {
            if let Err(e) = source.push(&next.addresses).await {
                self.notices.publish(OperatorNotice::new(
                    NoticeKind::AuthoritiesStale,
                    format!("Saved locally, remote authority list not updated: {e}"),
                ));
            }
        }
        Ok(next)
    }

    /// Refresh on a fixed interval until cancelled. The first tick fires
    /// immediately.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        if self.source.is_none() {
            tracing::info!("No remote authority source, refresh loop not started");
            return;
        }
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Authority refresh loop cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        tracing::debug!(error = %e, "Scheduled authority refresh failed");
                    }
                }
            }
        }
    }

    fn stale(&self, error: RegistryError) -> RegistryError {
        let count = self.list.borrow().addresses.len();
        self.notices.publish(OperatorNotice::new(
            NoticeKind::AuthoritiesStale,
            format!("Authority refresh failed ({error}); keeping {count} known recipients"),
        ));
        error
    }

    /// Write the cache atomically. Failure is logged; the in-memory list stays.
    async fn persist(&self, list: &AuthorityList) {
        if let Err(e) = write_cache(&self.cache_path, list).await {
            tracing::error!(path = %self.cache_path.display(), error = %e, "Failed to persist authority cache");
        }
    }
}

async fn read_cache(path: &Path) -> Result<Option<CacheFile>, RegistryError> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| RegistryError::Cache(e.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RegistryError::Cache(e.to_string())),
    }
}

async fn write_cache(path: &Path, list: &AuthorityList) -> Result<(), RegistryError> {
    let cache = CacheFile {
        authorities: list.addresses.clone(),
        updated_at: list.updated_at.unwrap_or_else(Utc::now),
    };
    let json = serde_json::to_vec_pretty(&cache).map_err(|e| RegistryError::Cache(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RegistryError::Cache(e.to_string()))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| RegistryError::Cache(e.to_string()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| RegistryError::Cache(e.to_string()))
}
