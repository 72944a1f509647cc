//! Device command handlers.

use serde::Serialize;
use tabled::Tabled;
use tracing::debug;

use fleetbus_core::{DeviceRecord, VariableValue};

use crate::cli::{CallArgs, GetArgs, GlobalOpts, RenameArgs};
use crate::error::CliError;
use crate::output::{self, Tone};

use super::{Session, util};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    dtype: String,
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "Online")]
    online: String,
    #[tabled(rename = "Functions")]
    functions: String,
    #[tabled(rename = "Variables")]
    variables: String,
}

impl From<&DeviceRecord> for DeviceRow {
    fn from(d: &DeviceRecord) -> Self {
        Self {
            id: d.id.clone(),
            name: d.name.clone().unwrap_or_default(),
            dtype: d.device_type.to_string(),
            product: d.product_id.map(|p| p.to_string()).unwrap_or_default(),
            online: if d.connected { "yes" } else { "no" }.into(),
            functions: d.functions.iter().cloned().collect::<Vec<_>>().join(", "),
            variables: d
                .variables
                .iter()
                .map(|(name, kind)| format!("{name}:{kind}"))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

// ── Result shapes ───────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CallResult {
    device_id: String,
    function: String,
    return_value: i32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VariableResult {
    device_id: String,
    name: String,
    value: VariableValue,
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let devices = session.fleet.list_devices(session.tenant).await?;
    debug!(tenant = %session.tenant, count = devices.len(), "devices listed");
    let records: Vec<DeviceRecord> = devices.into_iter().map(|d| d.into_record()).collect();

    let out = output::render_list(
        session.output,
        &records,
        |d| DeviceRow::from(d),
        |d| d.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn call(session: &Session, args: CallArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let device = util::find_device(session, &args.device).await?;
    if !device.has_function(&args.function) {
        debug!(device = %device.id, function = %args.function, "function not advertised by device");
    }

    let return_value = device.call_function(&args.function, args.args).await?;
    let result = CallResult {
        device_id: device.id.clone(),
        function: args.function,
        return_value,
    };

    let out = output::render_single(
        session.output,
        &result,
        |r| r.return_value.to_string(),
        |r| r.return_value.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn get(session: &Session, args: &GetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let device = util::find_device(session, &args.device).await?;
    let value = device.get_variable(&args.variable).await?;
    let result = VariableResult {
        device_id: device.id.clone(),
        name: args.variable.clone(),
        value,
    };

    let out = output::render_single(
        session.output,
        &result,
        |r| r.value.to_string(),
        |r| r.value.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn rename(
    session: &Session,
    args: &RenameArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut device = util::find_device(session, &args.device).await?;
    let previous = device.display_name().to_owned();
    device.rename(&args.name).await?;

    let color = output::should_color(global.color);
    let out = output::render_single(
        session.output,
        device.record(),
        |d| {
            format!(
                "Renamed {} to {}",
                output::paint(&previous, Tone::Muted, color),
                output::paint(d.display_name(), Tone::Accent, color)
            )
        },
        |d| d.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn unclaim(session: &Session, identifier: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let device = util::find_device(session, identifier).await?;
    device.unclaim().await?;

    let color = output::should_color(global.color);
    let out = output::render_single(
        session.output,
        device.record(),
        |d| format!("Unclaimed {}", output::paint(d.display_name(), Tone::Bad, color)),
        |d| d.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
