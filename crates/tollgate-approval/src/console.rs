//! Terminal decision channel.
//!
//! A background task reads operator input line by line. Lines typed while
//! no prompt is showing are discarded before the next prompt so that stray
//! input can never answer a question that has not been asked yet.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tracing::warn;

use crate::channel::{Decision, DecisionChannel, parse_decision};
use crate::error::ChannelError;
use crate::prompt::ConfirmationPrompt;

/// Prompts on a writer and reads answers from a line-oriented reader.
pub struct ConsoleChannel<W> {
    lines: Mutex<mpsc::Receiver<String>>,
    writer: Mutex<W>,
}

impl ConsoleChannel<tokio::io::Stdout> {
    /// Channel over the process's stdin and stdout.
    ///
    /// Stdin is read on a dedicated thread rather than the runtime's blocking
    /// pool, so a read that never completes cannot hold up runtime shutdown.
    #[must_use]
    pub fn stdio() -> Self {
        let (tx, rx) = mpsc::channel(16);
        let spawned = std::thread::Builder::new()
            .name("tollgate-stdin".to_owned())
            .spawn(move || {
                for line in std::io::stdin().lines() {
                    let Ok(line) = line else { break };
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "failed to start stdin reader; confirmations will fail");
        }
        Self::from_lines(rx, tokio::io::stdout())
    }
}

impl<W> ConsoleChannel<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Channel over arbitrary streams. Spawns the reader task.
    pub fn new<R>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
        });
        Self::from_lines(rx, writer)
    }

    fn from_lines(lines: mpsc::Receiver<String>, writer: W) -> Self {
        Self {
            lines: Mutex::new(lines),
            writer: Mutex::new(writer),
        }
    }

    async fn write(&self, text: &str) -> Result<(), ChannelError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(text.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<W> DecisionChannel for ConsoleChannel<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn present(&self, prompt: &ConfirmationPrompt) -> Result<Decision, ChannelError> {
        let mut lines = self.lines.lock().await;
        while lines.try_recv().is_ok() {}

        self.write(&format!("\n{}", prompt.render())).await?;
        let line = lines.recv().await.ok_or(ChannelError::Closed)?;
        let decision = parse_decision(&line);

        let verdict = match decision {
            Decision::Approved => "[APPROVED]\n",
            Decision::Rejected => "[REJECTED]\n",
        };
        self.write(verdict).await?;
        Ok(decision)
    }

    async fn expired(&self, _prompt: &ConfirmationPrompt) {
        let _ = self.write("\n[TIMEOUT] Confirmation timed out\n").await;
    }
}
