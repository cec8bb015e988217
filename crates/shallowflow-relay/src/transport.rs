//! Newline-delimited JSON transport for a relay.
//!
//! Each inbound line is one [`Command`]; each outbound line is one [`Event`].
//! Pushed patches and command-driven events share the outbound stream in the
//! order the relay emitted them.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use shallowflow_core::Result;
use shallowflow_core::protocol::{Command, Event};

use crate::relay::RelayHandle;

/// Pump commands from `reader` into the relay and events from the relay into
/// `writer` until the relay's event stream ends.
///
/// End of input closes the command channel; events still in flight are
/// written before returning.
pub async fn serve<R, W>(handle: RelayHandle, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let RelayHandle {
        commands,
        mut events,
    } = handle;
    let mut commands = Some(commands);
    let mut lines = reader.lines();

    loop {
        tokio::select! {
            line = lines.next_line(), if commands.is_some() => {
                match line? {
                    Some(line) => {
                        if let Some(command) = parse_command(&line) {
                            let delivered = commands
                                .as_ref()
                                .is_some_and(|tx| tx.send(command).is_ok());
                            if !delivered {
                                debug!("Relay stopped accepting commands");
                                commands = None;
                            }
                        }
                    }
                    None => {
                        debug!("Transport input closed");
                        commands = None;
                    }
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                write_event(&mut writer, &event).await?;
            }
        }
    }

    writer.flush().await?;
    Ok(())
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(command) => Some(command),
        Err(e) => {
            warn!(error = %e, "Skipping malformed command");
            None
        }
    }
}

async fn write_event<W: AsyncWrite + Unpin>(writer: &mut W, event: &Event) -> Result<()> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
