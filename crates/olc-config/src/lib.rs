//! olc-config
//!
//! Layered YAML configuration for the order-lifecycle coordinator.
//!
//! - YAML documents are merged in order (later documents override earlier
//!   ones) and converted to JSON.
//! - Literal secrets are refused (`CONFIG_SECRET_DETECTED`); the config only
//!   ever names the environment variables that hold them (see [`secrets`]).
//! - The merged document is canonicalised and hashed (SHA-256, hex) so a run
//!   can log exactly which configuration it used.
//! - [`ClientConfig`] is the typed view the coordinator consumes.

use std::collections::BTreeSet;
use std::fs;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub mod secrets;

use secrets::{resolve_secrets_for_mode, ResolvedSecrets};

/// Prefixes of well-known credential formats. A leaf string starting with
/// one of these aborts loading.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",
    "sk_live",
    "sk_test",
    "AKIA",
    "-----BEGIN",
    "ghp_",
    "gho_",
    "glpat-",
    "xoxb-",
    "xoxp-",
];

/// Default wait window for the blocking place/cancel workflows.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 120_000;

/// Default number of threads that may run subscriber callbacks at once.
pub const DEFAULT_DISPATCH_WORKERS: usize = 4;

pub const DEFAULT_API_KEY_ENV: &str = "OLC_VENUE_API_KEY";
pub const DEFAULT_API_SECRET_ENV: &str = "OLC_VENUE_API_SECRET";

// ---------------------------------------------------------------------------
// Run mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    /// In-memory paper venue; no credentials needed.
    Paper,
    /// Real venue connection.
    Live,
}

impl ConfigMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigMode::Paper => "PAPER",
            ConfigMode::Live => "LIVE",
        }
    }

    /// Case-insensitive parse of `"PAPER"` / `"LIVE"`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PAPER" => Some(ConfigMode::Paper),
            "LIVE" => Some(ConfigMode::Live),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Typed view
// ---------------------------------------------------------------------------

/// Settings for the wait coordinator and its dispatch pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Ceiling for place-and-wait / cancel-and-wait, milliseconds.
    pub wait_timeout_ms: u64,
    /// Maximum number of subscriber callbacks running concurrently.
    pub dispatch_workers: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            dispatch_workers: DEFAULT_DISPATCH_WORKERS,
        }
    }
}

impl CoordinatorConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    /// Same settings with a different wait window.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_dispatch_workers(mut self, workers: usize) -> Self {
        self.dispatch_workers = workers;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.wait_timeout_ms == 0 {
            bail!("CONFIG_INVALID: coordinator.wait_timeout_ms must be > 0");
        }
        if self.dispatch_workers == 0 {
            bail!("CONFIG_INVALID: coordinator.dispatch_workers must be >= 1");
        }
        Ok(())
    }
}

/// Names of the environment variables holding venue credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysEnv {
    pub api_key: String,
    pub api_secret: String,
}

impl Default for KeysEnv {
    fn default() -> Self {
        Self {
            api_key: DEFAULT_API_KEY_ENV.to_string(),
            api_secret: DEFAULT_API_SECRET_ENV.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueConfig {
    pub name: String,
    pub keys_env: KeysEnv,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            name: "bitfinex".to_string(),
            keys_env: KeysEnv::default(),
        }
    }
}

/// Everything the coordinator reads from config. Missing sections take their
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub coordinator: CoordinatorConfig,
    pub venue: VenueConfig,
}

impl ClientConfig {
    /// Build from the merged config JSON. Unrelated sections are ignored here;
    /// use [`report_unused_keys`] to police them.
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let coordinator: CoordinatorConfig = match cfg.get("coordinator") {
            Some(v) => serde_json::from_value(v.clone())
                .context("CONFIG_INVALID: coordinator section")?,
            None => CoordinatorConfig::default(),
        };
        let venue: VenueConfig = match cfg.get("venue") {
            Some(v) => serde_json::from_value(v.clone()).context("CONFIG_INVALID: venue section")?,
            None => VenueConfig::default(),
        };
        coordinator.validate()?;
        Ok(Self { coordinator, venue })
    }

    /// Run mode at `/runtime/mode`; defaults to `PAPER` when absent.
    pub fn mode_from_config_json(cfg: &Value) -> Result<ConfigMode> {
        match cfg.pointer("/runtime/mode").and_then(Value::as_str) {
            None => Ok(ConfigMode::Paper),
            Some(raw) => ConfigMode::parse(raw).with_context(|| {
                format!("CONFIG_INVALID: runtime.mode '{raw}' (expected PAPER | LIVE)")
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub mode: String,
    /// Consumed JSON-pointer prefixes (sorted, unique).
    pub consumed_prefixes: Vec<String>,
    /// Leaf pointers no consumer reads (sorted).
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// JSON-pointer prefixes the coordinator actually reads in each mode.
pub fn consumed_pointers_for_mode(mode: ConfigMode) -> &'static [&'static str] {
    match mode {
        // The paper venue may sign with a configured key; it never needs the secret.
        ConfigMode::Paper => &[
            "/runtime/mode",
            "/coordinator",
            "/venue/name",
            "/venue/keys_env/api_key",
        ],
        ConfigMode::Live => &["/runtime/mode", "/coordinator", "/venue"],
    }
}

/// Report leaves not covered by [`consumed_pointers_for_mode`].
/// `Fail` turns a non-empty report into an error; `Warn` never errors.
pub fn report_unused_keys(
    mode: ConfigMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let consumed: BTreeSet<String> = consumed_pointers_for_mode(mode)
        .iter()
        .map(|p| normalize_pointer(p))
        .collect();
    let consumed_prefixes: Vec<String> = consumed.into_iter().collect();

    let mut leaves = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|leaf| !consumed_prefixes.iter().any(|cp| is_prefix_pointer(cp, leaf)))
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        mode: mode.as_str().to_string(),
        consumed_prefixes,
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS (mode={}): {} unused config leaf key(s) detected. First few: {}",
            report.mode,
            report.unused_leaf_pointers.len(),
            preview_list(&report.unused_leaf_pointers, 12)
        );
    }

    Ok(report)
}

fn normalize_pointer(p: &str) -> String {
    let mut s = p.trim().to_string();
    if s.is_empty() {
        return "/".to_string();
    }
    if !s.starts_with('/') {
        s.insert(0, '/');
    }
    while s.ends_with('/') && s.len() > 1 {
        s.pop();
    }
    s
}

/// "/a/b" covers "/a/b" and "/a/b/c" but not "/a/bc". "/" covers everything.
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if prefix == "/" || leaf == prefix {
        return true;
    }
    leaf.strip_prefix(prefix)
        .map(|rest| rest.starts_with('/'))
        .unwrap_or(false)
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{prefix}/{i}");
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => out.push(if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        }),
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn preview_list(items: &[String], n: usize) -> String {
    format!("{:?}", items.iter().take(n).collect::<Vec<_>>())
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view of this config.
    pub fn client_config(&self) -> Result<ClientConfig> {
        ClientConfig::from_config_json(&self.config_json)
    }

    pub fn mode(&self) -> Result<ConfigMode> {
        ClientConfig::mode_from_config_json(&self.config_json)
    }

    /// Resolve everything a process needs at startup, in order: run mode,
    /// typed view, unused-key guard, then secrets for that mode.
    ///
    /// # Errors
    /// `CONFIG_INVALID`, `CONFIG_UNUSED_KEYS` (under `Fail`) or
    /// `SECRETS_MISSING`.
    pub fn resolve_startup(&self, policy: UnusedKeyPolicy) -> Result<StartupConfig> {
        let mode = self.mode()?;
        let client = self.client_config()?;
        let unused_keys = report_unused_keys(mode, &self.config_json, policy)?;
        let secrets = resolve_secrets_for_mode(&self.config_json, mode)?;
        Ok(StartupConfig {
            mode,
            config_hash: self.config_hash.clone(),
            client,
            secrets,
            unused_keys,
        })
    }
}

/// Output of [`LoadedConfig::resolve_startup`]. Hand `client.coordinator` to
/// the coordinator and `secrets` to the venue connection.
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub mode: ConfigMode,
    pub config_hash: String,
    pub client: ClientConfig,
    pub secrets: ResolvedSecrets,
    /// Always clean under `UnusedKeyPolicy::Fail`.
    pub unused_keys: UnusedKeyReport,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::with_capacity(paths.len());
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }
    let doc_refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    // serde_json's default map is key-ordered, so this is canonical.
    let canonical_json =
        serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        let Some(s) = v.pointer(&ptr).and_then(Value::as_str) else {
            continue;
        };
        if looks_like_secret(s) {
            bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    t.len() >= 8 && SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_pointer_respects_segment_boundary() {
        assert!(is_prefix_pointer("/venue", "/venue/name"));
        assert!(is_prefix_pointer("/venue", "/venue"));
        assert!(!is_prefix_pointer("/venue", "/venues/name"));
        assert!(is_prefix_pointer("/", "/anything"));
    }

    #[test]
    fn normalize_pointer_adds_leading_and_strips_trailing_slash() {
        assert_eq!(normalize_pointer("coordinator/"), "/coordinator");
        assert_eq!(normalize_pointer(""), "/");
        assert_eq!(normalize_pointer("/"), "/");
    }

    #[test]
    fn deep_merge_overrides_leaves_and_keeps_siblings() {
        let a = serde_json::json!({"coordinator": {"wait_timeout_ms": 1, "dispatch_workers": 2}});
        let b = serde_json::json!({"coordinator": {"wait_timeout_ms": 5}});
        let m = deep_merge(a, b);
        assert_eq!(m.pointer("/coordinator/wait_timeout_ms"), Some(&Value::from(5)));
        assert_eq!(m.pointer("/coordinator/dispatch_workers"), Some(&Value::from(2)));
    }

    #[test]
    fn short_strings_are_never_secrets() {
        assert!(!looks_like_secret("sk-1"));
        assert!(looks_like_secret("sk-abcdefgh"));
    }

    #[test]
    fn empty_document_yields_defaults() {
        let loaded = load_layered_yaml_from_strings(&["{}"]).unwrap();
        let cfg = loaded.client_config().unwrap();
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.coordinator.wait_timeout(), Duration::from_secs(120));
        assert_eq!(loaded.mode().unwrap(), ConfigMode::Paper);
    }

    #[test]
    fn zero_workers_is_invalid() {
        let loaded =
            load_layered_yaml_from_strings(&["coordinator:\n  dispatch_workers: 0\n"]).unwrap();
        let err = loaded.client_config().unwrap_err().to_string();
        assert!(err.contains("CONFIG_INVALID"), "got: {err}");
    }

    #[test]
    fn unknown_mode_is_invalid() {
        let loaded = load_layered_yaml_from_strings(&["runtime:\n  mode: backtest\n"]).unwrap();
        assert!(loaded.mode().is_err());
    }
}
