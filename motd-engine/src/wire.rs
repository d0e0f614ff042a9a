//! Line-oriented JSON adapter between the engine and a platform gateway.
//!
//! Inbound, one JSON object per line:
//!
//! ```text
//! {"kind":"event","event":{"type":"reaction_added","id":1,"channel":2,"voter":3,"emoji":"⭐"}}
//! {"kind":"admin","command":{"type":"delete","id":1}}
//! ```
//!
//! Outbound lines carry `"kind"` set to `publish`, `remove_reaction`,
//! `add_reaction`, `admin_reply` or `log`. The gateway performs them on the
//! platform. Published attachment paths point into the outbox; the gateway
//! removes them once uploaded. Blank lines are skipped; malformed lines are
//! logged and skipped.

use crate::admin::{AdminCommand, AdminConsole, AdminReply};
use crate::candidate::{CandidateId, ChannelId, UserId};
use crate::engine::MotdEngine;
use crate::events::PlatformEvent;
use crate::platform::{PlatformError, PublishRequest, Publisher, ReactionControl};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Wire errors.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Malformed line: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Outbound channel closed")]
    Closed,
}

/// A line read from the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inbound {
    Event { event: PlatformEvent },
    Admin { command: AdminCommand },
}

/// A line written to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outbound {
    /// Post content impersonating `author`.
    Publish {
        author: UserId,
        content: String,
        attachments: Vec<PathBuf>,
        channel: ChannelId,
    },
    /// Remove `user`'s `emoji` reaction from a candidate.
    RemoveReaction {
        candidate: CandidateId,
        channel: ChannelId,
        user: UserId,
        emoji: String,
    },
    /// React to a candidate with `emoji` ourselves.
    AddReaction {
        candidate: CandidateId,
        channel: ChannelId,
        emoji: String,
    },
    /// Answer to an admin command.
    AdminReply { reply: AdminReply },
    /// Post an operator-facing log record.
    Log {
        channel: ChannelId,
        level: String,
        message: String,
    },
}

impl From<PublishRequest> for Outbound {
    fn from(request: PublishRequest) -> Self {
        Self::Publish {
            author: request.author,
            content: request.content,
            attachments: request.attachments,
            channel: request.channel,
        }
    }
}

/// Parse one inbound line. Blank lines yield `None`.
///
/// # Errors
///
/// Returns `Json` if the line is not a valid inbound object.
pub fn parse_line(line: &str) -> Result<Option<Inbound>, WireError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

/// Platform collaborator that turns every action into an [`Outbound`] line.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    tx: mpsc::Sender<Outbound>,
}

impl JsonLinesSink {
    /// Create a sink and the receiver a writer task drains.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue one outbound line.
    ///
    /// # Errors
    ///
    /// Returns `Closed` once the writer is gone.
    pub async fn send(&self, line: Outbound) -> Result<(), WireError> {
        self.tx.send(line).await.map_err(|_| WireError::Closed)
    }

    pub(crate) fn downgrade(&self) -> mpsc::WeakSender<Outbound> {
        self.tx.downgrade()
    }
}

#[async_trait]
impl Publisher for JsonLinesSink {
    async fn publish(&self, request: PublishRequest) -> Result<(), PlatformError> {
        self.send(request.into())
            .await
            .map_err(|_| PlatformError::Closed)
    }
}

#[async_trait]
impl ReactionControl for JsonLinesSink {
    async fn remove_reaction(
        &self,
        candidate: CandidateId,
        channel: ChannelId,
        user: UserId,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        self.send(Outbound::RemoveReaction {
            candidate,
            channel,
            user,
            emoji: emoji.to_string(),
        })
        .await
        .map_err(|_| PlatformError::Closed)
    }

    async fn add_reaction(
        &self,
        candidate: CandidateId,
        channel: ChannelId,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        self.send(Outbound::AddReaction {
            candidate,
            channel,
            emoji: emoji.to_string(),
        })
        .await
        .map_err(|_| PlatformError::Closed)
    }
}

/// Write every queued outbound line to `writer` until all senders are gone.
///
/// # Errors
///
/// Returns an error if a line cannot be encoded or written.
pub async fn write_lines<W: AsyncWrite + Unpin>(
    mut rx: mpsc::Receiver<Outbound>,
    mut writer: W,
) -> Result<(), WireError> {
    while let Some(line) = rx.recv().await {
        let mut buf = serde_json::to_vec(&line)?;
        buf.push(b'\n');
        writer.write_all(&buf).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Read inbound lines from `reader` into `tx` until EOF or shutdown.
///
/// # Errors
///
/// Returns an error if reading fails. Malformed lines are skipped.
pub async fn read_lines<R: AsyncBufRead + Unpin>(
    reader: R,
    tx: mpsc::Sender<Inbound>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), WireError> {
    let mut lines = reader.lines();
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("Input reader stopped by shutdown");
                    return Ok(());
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed");
                    return Ok(());
                };
                match parse_line(&line) {
                    Ok(Some(inbound)) => {
                        if tx.send(inbound).await.is_err() {
                            return Ok(());
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Skipping input line: {e}"),
                }
            }
        }
    }
}

/// Process inbound items one at a time, in arrival order.
///
/// Event failures are logged and processing continues. Admin replies are
/// written back through `sink`.
pub async fn serve(
    mut rx: mpsc::Receiver<Inbound>,
    engine: MotdEngine,
    console: Arc<AdminConsole>,
    sink: JsonLinesSink,
) {
    while let Some(inbound) = rx.recv().await {
        match inbound {
            Inbound::Event { event } => {
                let kind = event.kind();
                let candidate = event.candidate();
                if let Err(e) = engine.handle_event(event).await {
                    error!("Failed to apply {kind} for candidate {candidate}: {e}");
                }
            }
            Inbound::Admin { command } => {
                let reply = console.execute(command).await;
                if let Err(e) = sink.send(Outbound::AdminReply { reply }).await {
                    warn!("Dropping admin reply: {e}");
                }
            }
        }
    }
    debug!("Inbound queue drained");
}
