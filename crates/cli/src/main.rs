//! `pushgate` command-line tool.

mod args;

use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::Parser;

use pushgate_client::{CidKind, Payload, PushClient, PushError, PushResult, RequestContext};
use pushgate_observability::LogFormat;

use args::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.pretty {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    };
    pushgate_observability::init_with(cli.log.as_deref(), format);

    let config = cli.connection.to_config();
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Send {
            payload,
            validate,
            deadline_secs,
        } => send(
            PushClient::new(config)?,
            &payload,
            validate,
            deadline_secs.map(Duration::from_secs),
        ),
        Commands::Cid { class, count } => cids(PushClient::new(config)?, class.into(), count),
    }
}

fn read_payload(path: &Path) -> anyhow::Result<Payload> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read payload from stdin")?;
        buf
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("failed to read payload from {}", path.display()))?
    };

    let value: serde_json::Value = serde_json::from_str(&raw).context("payload is not JSON")?;
    match Payload::from_value(value) {
        Some(payload) => Ok(payload),
        None => bail!("payload must be a JSON object"),
    }
}

fn send(
    client: PushClient,
    path: &Path,
    validate: bool,
    deadline: Option<Duration>,
) -> anyhow::Result<()> {
    let payload = read_payload(path)?;

    let mut ctx = RequestContext::background();
    if let Some(deadline) = deadline {
        ctx = ctx.with_deadline(Instant::now() + deadline);
    }

    let (tx, rx) = mpsc::channel();
    let callback = move |result: Result<PushResult, PushError>| {
        let _ = tx.send(result);
    };
    if validate {
        client.push_validate(ctx, payload, callback)?;
    } else {
        client.push(ctx, payload, callback)?;
    }

    // Waits for every queued push, including retries.
    client.terminate();

    let result = rx.recv().context("push finished without reporting")??;
    println!("{result}");
    Ok(())
}

fn cids(client: PushClient, kind: CidKind, count: usize) -> anyhow::Result<()> {
    let ctx = RequestContext::background();
    for _ in 0..count {
        let cid = match kind {
            CidKind::Immediate => client.push_id(&ctx)?,
            CidKind::Scheduled => client.schedule_id(&ctx)?,
        };
        println!("{cid}");
    }
    client.terminate();
    Ok(())
}
