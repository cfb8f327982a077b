use std::env;
use std::str::FromStr;

use crate::error::CoreError;

/// Prefix shared by every collectify environment override.
pub const ENV_PREFIX: &str = "COLLECTIFY";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Name of the override variable for `section.key`,
/// e.g. `("poll", "interval_secs")` -> `COLLECTIFY_POLL_INTERVAL_SECS`.
pub fn override_key(section: &str, key: &str) -> String {
    format!(
        "{}_{}_{}",
        ENV_PREFIX,
        section.to_ascii_uppercase(),
        key.to_ascii_uppercase()
    )
}

/// Overwrite `target` with `COLLECTIFY_<SECTION>_<KEY>` when it is set.
///
/// Values that fail to parse are rejected rather than silently ignored.
pub fn apply_override<T: FromStr>(
    target: &mut T,
    section: &str,
    key: &str,
) -> Result<(), CoreError> {
    let name = override_key(section, key);
    if let Some(raw) = env_opt(&name) {
        *target = raw.parse().map_err(|_| CoreError::InvalidEnv {
            key: name,
            value: raw,
        })?;
    }
    Ok(())
}

/// Like [`apply_override`] for optional settings.
pub fn apply_override_opt<T: FromStr>(
    target: &mut Option<T>,
    section: &str,
    key: &str,
) -> Result<(), CoreError> {
    let name = override_key(section, key);
    if let Some(raw) = env_opt(&name) {
        let value = raw.parse().map_err(|_| CoreError::InvalidEnv {
            key: name,
            value: raw,
        })?;
        *target = Some(value);
    }
    Ok(())
}

/// Comma-separated list override, e.g. `COLLECTIFY_ENRICH_NETWORKS=facebook,twitter`.
pub fn apply_override_list<T: FromStr>(
    target: &mut Vec<T>,
    section: &str,
    key: &str,
) -> Result<(), CoreError> {
    let name = override_key(section, key);
    if let Some(raw) = env_opt(&name) {
        let mut out = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            out.push(part.parse().map_err(|_| CoreError::InvalidEnv {
                key: name.clone(),
                value: part.to_string(),
            })?);
        }
        *target = out;
    }
    Ok(())
}
