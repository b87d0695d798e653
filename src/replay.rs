//! Feeds recorded or synthetic location events through a session and prints
//! the resulting presenter commands as JSON lines.

use std::path::Path;

use anyhow::{Context as _, anyhow};
use log::{debug, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _, BufReader};
use tokio::sync::mpsc;

use crate::beacon::BeaconIdentity;
use crate::manager::Manager;
use crate::messages::{LocationEvent, PresenterCommand};

/// `None` for blank lines and `#` comments.
pub fn parse_line(line: &str) -> Option<Result<LocationEvent, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Returns how many events were forwarded.
pub async fn read_events<R>(
    mut reader: R,
    tx: mpsc::Sender<LocationEvent>,
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut line_number = 0;
    let mut sent = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        line_number += 1;

        // Raw bytes, so a line that isn't UTF-8 is skipped like any other bad line.
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(err) => {
                warn!("Skipping line {}: {}", line_number, err);
                continue;
            }
        };

        match parse_line(line) {
            None => {}
            Some(Err(err)) => warn!("Skipping line {}: {}", line_number, err),
            Some(Ok(event)) => {
                if tx.send(event).await.is_err() {
                    debug!("Session closed before input was exhausted");
                    break;
                }
                sent += 1;
            }
        }
    }

    Ok(sent)
}

pub async fn write_commands<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<PresenterCommand>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = rx.recv().await {
        let mut line = serde_json::to_vec(&command)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}

pub async fn replay<R, W>(identity: BeaconIdentity, reader: R, writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (event_tx, event_rx) = mpsc::channel(16);
    let (command_tx, command_rx) = mpsc::channel(16);
    let manager = Manager::new(identity, event_rx, command_tx);

    let (read, session, written) = futures::join!(
        read_events(reader, event_tx),
        manager.run_loop(),
        write_commands(writer, command_rx),
    );

    written.context("writing presenter commands")?;
    session.map_err(|err| anyhow!(err))?;
    let sent = read.context("reading location events")?;
    debug!("Replayed {} location events", sent);
    Ok(())
}

/// Reads from `input`, or stdin when it is absent or `-`.
pub async fn run(identity: BeaconIdentity, input: Option<&Path>) -> anyhow::Result<()> {
    match input.filter(|path| *path != Path::new("-")) {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            replay(identity, BufReader::new(file), tokio::io::stdout()).await
        }
        None => replay(identity, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await,
    }
}
