//! CLI-side configuration: profile selection and flag overrides layered
//! on top of `fleetbus_config`.

use std::io::{self, IsTerminal};
use std::time::Duration;

use clap::ValueEnum;
use secrecy::SecretString;

use fleetbus_config::{Config, ConfigError, LoginMaterial, Profile};
use fleetbus_core::{BusConfig, Tenant};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

/// Everything a command needs after config + flags are merged.
#[derive(Debug)]
pub struct Resolved {
    pub profile_name: String,
    pub profile: Profile,
    pub bus: BusConfig,
    pub tenant: Tenant,
    pub output: OutputFormat,
}

/// Merge the loaded config with global flags.
pub fn resolve(global: &GlobalOpts, cfg: &Config) -> Result<Resolved, CliError> {
    let profile_name = cfg.profile_name(global.profile.as_deref()).to_owned();
    let profile = cfg.profile(&profile_name).map_err(|err| match err {
        ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
            name,
            available: available_profiles(cfg),
        },
        other => other.into(),
    })?;

    let mut bus = fleetbus_config::profile_to_bus_config(&profile, &cfg.defaults)?;
    if let Some(secs) = global.timeout {
        bus.request_timeout = Duration::from_secs(secs);
    }

    let output = match global.output {
        Some(format) => format,
        None => OutputFormat::from_str(&cfg.defaults.output, true).map_err(|_| {
            CliError::Validation {
                field: "defaults.output".into(),
                reason: format!("unknown output format '{}'", cfg.defaults.output),
            }
        })?,
    };

    let tenant = global.product.or(profile.product).into();

    Ok(Resolved {
        profile_name,
        profile,
        bus,
        tenant,
        output,
    })
}

fn available_profiles(cfg: &Config) -> String {
    let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort_unstable();
    names.join(", ")
}

/// Work out how to open the session: flags first, then the profile chain,
/// then an interactive password prompt when a username is known.
pub fn resolve_login(global: &GlobalOpts, resolved: &Resolved) -> Result<LoginMaterial, CliError> {
    if let Some(ref token) = global.token {
        return Ok(LoginMaterial::Token {
            token: SecretString::from(token.clone()),
            tenant: resolved.tenant,
        });
    }

    let mut profile = resolved.profile.clone();
    if global.username.is_some() {
        profile.username.clone_from(&global.username);
    }
    if let (Some(username), Some(password)) = (&profile.username, &global.password) {
        return Ok(LoginMaterial::Credentials {
            username: username.clone(),
            password: SecretString::from(password.clone()),
        });
    }

    let chained = fleetbus_config::resolve_login(&profile, &resolved.profile_name);
    match (chained, profile.username) {
        (Err(ConfigError::NoCredentials { .. }), Some(username)) if io::stdin().is_terminal() => {
            let password = rpassword::prompt_password(format!("Password for {username}: "))?;
            Ok(LoginMaterial::Credentials {
                username,
                password: SecretString::from(password),
            })
        }
        (result, _) => Ok(result?),
    }
}
