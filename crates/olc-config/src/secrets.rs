//! Runtime secret resolution.
//!
//! Config YAML stores only environment variable NAMES
//! (`venue.keys_env.api_key: "OLC_VENUE_API_KEY"`). Callers resolve them once
//! at startup with [`resolve_secrets_for_mode`] and hand the result to
//! constructors; nothing else reads the environment.
//!
//! Values are redacted in `Debug`, and errors name the variable, never its
//! value.
//!
//! | Mode  | Required                       |
//! |-------|--------------------------------|
//! | LIVE  | venue api_key, venue api_secret |
//! | PAPER | nothing                        |

use anyhow::{bail, Result};
use serde_json::Value;

use crate::{ConfigMode, DEFAULT_API_KEY_ENV, DEFAULT_API_SECRET_ENV};

/// Venue credentials resolved from the environment.
#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    /// `None` if the named variable was unset or blank.
    pub venue_api_key: Option<String>,
    pub venue_api_secret: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "venue_api_key",
                &self.venue_api_key.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "venue_api_secret",
                &self.venue_api_secret.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

struct SecretEnvNames {
    api_key_var: String,
    api_secret_var: String,
}

/// Non-blank string at `pointer`, trimmed.
fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// `None` if unset or blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn parse_env_names(config_json: &Value) -> SecretEnvNames {
    SecretEnvNames {
        api_key_var: read_str_at(config_json, "/venue/keys_env/api_key")
            .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
        api_secret_var: read_str_at(config_json, "/venue/keys_env/api_secret")
            .unwrap_or_else(|| DEFAULT_API_SECRET_ENV.to_string()),
    }
}

/// Resolve venue credentials for `mode`.
///
/// # Errors
/// `SECRETS_MISSING` naming the first required variable that is unset.
pub fn resolve_secrets_for_mode(config_json: &Value, mode: ConfigMode) -> Result<ResolvedSecrets> {
    let names = parse_env_names(config_json);

    let venue_api_key = resolve_env(&names.api_key_var);
    let venue_api_secret = resolve_env(&names.api_secret_var);

    if mode == ConfigMode::Live {
        if venue_api_key.is_none() {
            bail!(
                "SECRETS_MISSING mode=LIVE: required env var '{}' (venue api_key) is not set or empty",
                names.api_key_var,
            );
        }
        if venue_api_secret.is_none() {
            bail!(
                "SECRETS_MISSING mode=LIVE: required env var '{}' (venue api_secret) is not set or empty",
                names.api_secret_var,
            );
        }
    }

    Ok(ResolvedSecrets {
        venue_api_key,
        venue_api_secret,
    })
}
