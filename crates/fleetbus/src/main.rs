mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::sync::Arc;

use clap::Parser;
use secrecy::ExposeSecret;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use fleetbus_config::LoginMaterial;
use fleetbus_core::{CloudProvider, Fleet, LoginOptions, SimulatedCloud};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::commands::Session;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need a session
        Command::Config(args) => commands::config_cmd::handle(&args, &cli.global),

        cmd => {
            let session = open_session(&cli.global).await?;
            debug!(command = ?cmd, tenant = %session.tenant, "dispatching command");
            let result = commands::dispatch(cmd, &session, &cli.global).await;
            session.fleet.logout();
            result
        }
    }
}

/// Load config, resolve login material, and sign in to the demo cloud.
async fn open_session(global: &GlobalOpts) -> Result<Session, CliError> {
    let cfg = fleetbus_config::load_config()?;
    let resolved = config::resolve(global, &cfg)?;
    let login = config::resolve_login(global, &resolved)?;

    let cloud = Arc::new(SimulatedCloud::demo());
    let provider: Arc<dyn CloudProvider> = cloud.clone();
    let fleet = Fleet::new(provider, resolved.bus.clone());

    match login {
        LoginMaterial::Credentials { username, password } => {
            fleet
                .login(LoginOptions::new(username, password.expose_secret()))
                .await?;
        }
        LoginMaterial::Token { token, tenant } => {
            info!(tenant = %tenant, "using access token");
            fleet.login_with_token(token, tenant);
        }
    }

    Ok(Session {
        fleet,
        cloud,
        tenant: resolved.tenant,
        output: resolved.output,
    })
}
