//! JSON-lines host channel: one `{state, data, error}` envelope per line,
//! incoming on stdin and outgoing on stdout.

use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

use crate::main_lib::AppState;
use ledgersync_core::messaging::MessageEnvelope;

/// Parses one incoming line and hands it to the message manager. Malformed
/// lines are logged and dropped.
pub async fn handle_line(state: &AppState, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<MessageEnvelope>(line) {
        Ok(envelope) => {
            debug!("Host message {}", envelope.state);
            state.process_messages.process(envelope).await;
        }
        Err(e) => warn!("Dropping malformed host message: {}", e),
    }
}

async fn write_envelope<W>(writer: &mut W, envelope: &MessageEnvelope) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(envelope)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Pumps both directions until `reader` reaches EOF, then flushes what is
/// still queued for the host.
pub async fn serve<R, W>(
    state: Arc<AppState>,
    reader: R,
    mut writer: W,
    mut outgoing: UnboundedReceiver<MessageEnvelope>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => handle_line(&state, &line).await,
                None => break,
            },
            Some(envelope) = outgoing.recv() => write_envelope(&mut writer, &envelope).await?,
        }
    }

    while let Ok(envelope) = outgoing.try_recv() {
        write_envelope(&mut writer, &envelope).await?;
    }
    Ok(())
}

pub async fn serve_stdio(
    state: Arc<AppState>,
    outgoing: UnboundedReceiver<MessageEnvelope>,
) -> anyhow::Result<()> {
    serve(
        state,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        outgoing,
    )
    .await
}
