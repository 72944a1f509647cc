//! Shared configuration for fleetbus hosts.
//!
//! TOML profiles, login resolution (env + plaintext), and translation to
//! `fleetbus_core::BusConfig`. Nothing here ever writes credentials or
//! tokens back to disk: a session lives exactly as long as the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use fleetbus_core::{BusConfig, Tenant};

/// Prefix for every environment override, e.g. `FLEETBUS_DEFAULTS__TIMEOUT`.
pub const ENV_PREFIX: &str = "FLEETBUS_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Name of the profile to use, preferring an explicit choice.
    pub fn profile_name<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .or(self.default_profile.as_deref())
            .unwrap_or("default")
    }

    /// Look up a profile. The implicit `default` profile may be absent, in
    /// which case an empty one is returned.
    pub fn profile(&self, name: &str) -> Result<Profile, ConfigError> {
        match self.profiles.get(name) {
            Some(profile) => Ok(profile.clone()),
            None if name == "default" => Ok(Profile::default()),
            None => Err(ConfigError::UnknownProfile { name: name.into() }),
        }
    }

    /// Effective configuration as TOML. Plaintext passwords are omitted.
    pub fn render(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    /// Request timeout in seconds. 0 disables the deadline.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Maximum live workers across all tenants. 0 = unlimited.
    #[serde(default)]
    pub max_workers: usize,

    #[serde(default = "default_publish_ttl")]
    pub publish_ttl: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
            max_workers: 0,
            publish_ttl: default_publish_ttl(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_publish_ttl() -> u32 {
    fleetbus_core::DEFAULT_PUBLISH_TTL
}

/// A named account profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Account username for credential login.
    pub username: Option<String>,

    /// Password in plaintext. Prefer `password_env`.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    /// Environment variable holding a ready access token.
    pub token_env: Option<String>,

    /// Product the token belongs to. Absent = the account's own devices.
    pub product: Option<u32>,

    /// Override the default request timeout (seconds).
    pub timeout: Option<u64>,

    /// Override the command worker mailbox capacity.
    pub command_channel_size: Option<usize>,
}

impl Profile {
    pub fn tenant(&self) -> Tenant {
        self.product.into()
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "fleetbus", "fleetbus").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("fleetbus");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from `path` + environment. A missing file is not
/// an error; defaults and environment still apply.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load the full Config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Login resolution ────────────────────────────────────────────────

/// What a host needs to open a session.
#[derive(Debug)]
pub enum LoginMaterial {
    Credentials {
        username: String,
        password: SecretString,
    },
    Token {
        token: SecretString,
        tenant: Tenant,
    },
}

/// Resolve login material for a profile from the process environment.
pub fn resolve_login(profile: &Profile, profile_name: &str) -> Result<LoginMaterial, ConfigError> {
    resolve_login_with(profile, profile_name, |name| std::env::var(name).ok())
}

/// Resolve login material with an explicit environment lookup.
///
/// Order: the profile's `token_env`, then username (profile, then
/// `FLEETBUS_USERNAME`) with a password from `password_env`,
/// `FLEETBUS_PASSWORD`, or the profile's plaintext field.
pub fn resolve_login_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<LoginMaterial, ConfigError> {
    if let Some(token) = profile.token_env.as_deref().and_then(&env) {
        return Ok(LoginMaterial::Token {
            token: SecretString::from(token),
            tenant: profile.tenant(),
        });
    }

    let no_credentials = || ConfigError::NoCredentials {
        profile: profile_name.into(),
    };

    let username = profile
        .username
        .clone()
        .or_else(|| env("FLEETBUS_USERNAME"))
        .ok_or_else(no_credentials)?;

    let password = profile
        .password_env
        .as_deref()
        .and_then(&env)
        .or_else(|| env("FLEETBUS_PASSWORD"))
        .or_else(|| profile.password.clone())
        .ok_or_else(no_credentials)?;

    Ok(LoginMaterial::Credentials {
        username,
        password: SecretString::from(password),
    })
}

// ── Bus tuning ──────────────────────────────────────────────────────

/// Build a `BusConfig` from a profile over the global defaults.
pub fn profile_to_bus_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<BusConfig, ConfigError> {
    if profile.command_channel_size == Some(0) {
        return Err(ConfigError::Validation {
            field: "command_channel_size".into(),
            reason: "must be at least 1".into(),
        });
    }

    let base = BusConfig::default();
    Ok(BusConfig {
        request_timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        command_channel_size: profile
            .command_channel_size
            .unwrap_or(base.command_channel_size),
        max_workers: defaults.max_workers,
        default_publish_ttl: defaults.publish_ttl,
    })
}
