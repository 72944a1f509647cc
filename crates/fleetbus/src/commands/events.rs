//! Event command handlers: publish and watch.
//!
//! The demo cloud is passive, so `watch` runs a ticker that emits events
//! from every listed device while the subscription is open.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use fleetbus_core::{CloudEvent, DeviceEvent, PublishOptions, SimulatedCloud};

use crate::cli::{GlobalOpts, OutputFormat, PublishArgs, WatchArgs};
use crate::error::CliError;
use crate::output::{self, Tone};

use super::{Session, util};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Published {
    name: String,
    data: Option<String>,
    is_private: bool,
    ttl: Option<u32>,
}

pub async fn publish(session: &Session, args: PublishArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut options = PublishOptions::new(&args.name);
    if let Some(ref data) = args.data {
        options = options.with_data(data);
    }
    if args.private {
        options = options.private();
    }
    if let Some(ttl) = args.ttl {
        options = options.with_ttl(ttl);
    }
    session.fleet.publish(options, session.tenant).await?;

    let published = Published {
        name: args.name,
        data: args.data,
        is_private: args.private,
        ttl: args.ttl,
    };
    let color = output::should_color(global.color);
    let out = output::render_single(
        session.output,
        &published,
        |p| format!("Queued {}", output::paint(&p.name, Tone::Accent, color)),
        |p| p.name.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn watch(session: &Session, args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if args.interval_ms == 0 {
        return Err(CliError::Validation {
            field: "interval-ms".into(),
            reason: "must be greater than zero".into(),
        });
    }

    let devices = session.fleet.list_devices(session.tenant).await?;
    let sources: Vec<String> = devices.iter().map(|d| d.id.clone()).collect();

    let (tx, mut rx) = mpsc::unbounded_channel::<DeviceEvent>();
    let handler = move |event: DeviceEvent| {
        let _ = tx.send(event);
    };

    let scoped = match args.device {
        Some(ref identifier) => {
            let device = util::find_device(session, identifier).await?;
            device.subscribe(&args.prefix, handler)?;
            Some(device)
        }
        None => {
            session
                .fleet
                .subscribe(&args.prefix, handler, session.tenant)?;
            None
        }
    };

    let ticker = tokio::spawn(demo_ticker(
        Arc::clone(&session.cloud),
        args.prefix.clone(),
        sources,
        Duration::from_millis(args.interval_ms),
    ));

    let color = output::should_color(global.color);
    let mut seen = 0usize;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                let line = render_event(&event, session.output, color)?;
                output::print_output(&line, global.quiet);
                seen += 1;
                if args.count.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
        }
    }

    ticker.abort();
    match scoped {
        Some(device) => device.unsubscribe(&args.prefix)?,
        None => session.fleet.unsubscribe(&args.prefix, session.tenant)?,
    }
    debug!(prefix = %args.prefix, events = seen, "watch finished");
    Ok(())
}

fn render_event(event: &DeviceEvent, format: OutputFormat, color: bool) -> Result<String, CliError> {
    // One record per line for structured formats, so output can be streamed.
    let format = match format {
        OutputFormat::Json => OutputFormat::JsonCompact,
        other => other,
    };
    output::render_single(
        format,
        event,
        |e| {
            format!(
                "{} {} {} {}",
                output::paint(&e.published_at.format("%H:%M:%S").to_string(), Tone::Muted, color),
                output::paint(e.device_id.as_deref().unwrap_or("-"), Tone::Accent, color),
                e.event_name,
                output::paint(e.data.as_deref().unwrap_or(""), Tone::Good, color),
            )
        },
        |e| e.data.clone().unwrap_or_default(),
    )
}

async fn demo_ticker(
    cloud: Arc<SimulatedCloud>,
    prefix: String,
    sources: Vec<String>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut sequence: u64 = 0;
    loop {
        ticker.tick().await;
        for source in &sources {
            sequence += 1;
            let event = CloudEvent::new(format!("{prefix}/tick"), Some(sequence.to_string()))
                .from_device(source.as_str());
            cloud.emit(&event);
        }
    }
}
