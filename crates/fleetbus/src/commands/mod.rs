//! Command dispatch: bridges CLI args -> bus operations -> output formatting.

pub mod config_cmd;
pub mod devices;
pub mod events;
pub mod util;

use std::sync::Arc;

use fleetbus_core::{Fleet, SimulatedCloud, Tenant};

use crate::cli::{Command, GlobalOpts, OutputFormat};
use crate::error::CliError;

/// An open bus session against the demo cloud.
pub struct Session {
    pub fleet: Fleet,
    pub cloud: Arc<SimulatedCloud>,
    pub tenant: Tenant,
    pub output: OutputFormat,
}

/// Dispatch a session-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Devices => devices::list(session, global).await,
        Command::Call(args) => devices::call(session, args, global).await,
        Command::Get(args) => devices::get(session, &args, global).await,
        Command::Rename(args) => devices::rename(session, &args, global).await,
        Command::Unclaim(args) => devices::unclaim(session, &args.device, global).await,
        Command::Publish(args) => events::publish(session, args, global).await,
        Command::Watch(args) => events::watch(session, &args, global).await,
        // Config is handled before a session is opened
        Command::Config(args) => config_cmd::handle(&args, global),
    }
}
