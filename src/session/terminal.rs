//! Terminal front end: stdin lines and Ctrl+C in, rendered transcript out

use super::controller::SessionController;
use super::event::{SessionInput, SessionOutput};
use crate::runtime::{LlmClient, StreamEvent};
use std::io::BufRead;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

const INPUT_CAPACITY: usize = 64;

/// Run `controller` against the process's stdin, stdout and Ctrl+C until the
/// session shuts down.
pub async fn run_terminal<L: LlmClient + ?Sized + 'static>(
    controller: SessionController<L>,
) -> std::io::Result<()> {
    let (tx, rx) = mpsc::channel(INPUT_CAPACITY);
    spawn_stdin_reader(tx.clone())?;
    tokio::spawn(forward_interrupts(tx));
    let renderer = tokio::spawn(render_outputs(controller.subscribe()));

    let store = controller.run(rx).await;
    tracing::debug!(messages = store.len(), "Conversation closed");

    renderer.await.map_err(std::io::Error::other)?
}

/// Stdin is read on a plain thread: a blocked read must not keep the
/// runtime alive at exit.
fn spawn_stdin_reader(tx: mpsc::Sender<SessionInput>) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read stdin, closing input");
                        break;
                    }
                };
                if tx.blocking_send(SessionInput::Line(line)).is_err() {
                    return;
                }
            }
            let _ = tx.blocking_send(SessionInput::Eof);
        })?;
    Ok(())
}

async fn forward_interrupts(tx: mpsc::Sender<SessionInput>) {
    loop {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for Ctrl+C");
            return;
        }
        if tx.send(SessionInput::Interrupt).await.is_err() {
            return;
        }
    }
}

async fn render_outputs(mut outputs: broadcast::Receiver<SessionOutput>) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut renderer = Renderer::default();

    loop {
        match outputs.recv().await {
            Ok(SessionOutput::Shutdown) | Err(RecvError::Closed) => break,
            Ok(output) => {
                if let Some(text) = renderer.render(&output) {
                    stdout.write_all(text.as_bytes()).await?;
                    stdout.flush().await?;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Renderer fell behind, outputs dropped");
            }
        }
    }
    stdout.flush().await
}

/// Turns session outputs into transcript text
#[derive(Debug, Default)]
struct Renderer {
    /// Text deltas were printed since the last full text
    mid_text: bool,
}

impl Renderer {
    fn render(&mut self, output: &SessionOutput) -> Option<String> {
        match output {
            SessionOutput::Stream(event) => self.render_event(event),
            SessionOutput::TurnStarted { .. } | SessionOutput::TurnCompleted => {
                self.mid_text = false;
                None
            }
            SessionOutput::Interrupted => {
                let prefix = if std::mem::take(&mut self.mid_text) { "\n" } else { "" };
                Some(format!(
                    "{prefix}Interrupted. Press Ctrl+C twice more quickly to quit.\n"
                ))
            }
            SessionOutput::Notice(text) => Some(format!("{text}\n")),
            SessionOutput::Error(message) => Some(format!("Error: {message}\n")),
            SessionOutput::Shutdown => None,
        }
    }

    fn render_event(&mut self, event: &StreamEvent) -> Option<String> {
        match event {
            StreamEvent::TextDelta { content } => {
                self.mid_text = true;
                Some(content.clone())
            }
            // Without deltas (streaming off) the full text is all there is
            StreamEvent::Text { content } => {
                if std::mem::take(&mut self.mid_text) {
                    Some("\n".to_string())
                } else {
                    Some(format!("{content}\n"))
                }
            }
            StreamEvent::ToolStart { .. } | StreamEvent::ToolInputDelta { .. } => None,
            StreamEvent::ToolCall { tool } => {
                let args = serde_json::to_string(&tool.args).unwrap_or_default();
                Some(format!("[{}] {args}\n", tool.name))
            }
        }
    }
}
