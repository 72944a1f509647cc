//! Config command handlers. These never open a bus session.

use serde::Serialize;
use tabled::Tabled;

use fleetbus_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileEntry {
    name: String,
    username: Option<String>,
    product: Option<u32>,
    uses_token: bool,
    is_default: bool,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Username")]
    username: String,
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "Login")]
    login: String,
    #[tabled(rename = "Default")]
    default: String,
}

impl From<&ProfileEntry> for ProfileRow {
    fn from(p: &ProfileEntry) -> Self {
        Self {
            name: p.name.clone(),
            username: p.username.clone().unwrap_or_default(),
            product: p.product.map(|id| id.to_string()).unwrap_or_default(),
            login: if p.uses_token { "token" } else { "password" }.into(),
            default: if p.is_default { "*" } else { "" }.into(),
        }
    }
}

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&fleetbus_config::config_path().display().to_string(), global.quiet);
            Ok(())
        }
        ConfigCommand::Show => {
            let cfg = fleetbus_config::load_config()?;
            output::print_output(cfg.render()?.trim_end(), global.quiet);
            Ok(())
        }
        ConfigCommand::Profiles => {
            let cfg = fleetbus_config::load_config()?;
            let entries = profile_entries(&cfg);
            let out = output::render_list(
                global.output.unwrap_or(OutputFormat::Table),
                &entries,
                |p| ProfileRow::from(p),
                |p| p.name.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

fn profile_entries(cfg: &Config) -> Vec<ProfileEntry> {
    let default = cfg.profile_name(None);
    let mut entries: Vec<ProfileEntry> = cfg
        .profiles
        .iter()
        .map(|(name, profile)| ProfileEntry {
            name: name.clone(),
            username: profile.username.clone(),
            product: profile.product,
            uses_token: profile.token_env.is_some(),
            is_default: name == default,
        })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}
