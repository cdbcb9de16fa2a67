//! Native-messaging bridge to the browser extension.
//!
//! Frames are a 32-bit native-endian length followed by UTF-8 JSON. The
//! extension forwards UI requests and navigation events, and runs the tab,
//! badge and notification commands the host sends, answering each with a
//! reply carrying the command id.

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::browser::{Badge, Notification, StatusPort, TabHost, TabId, TabInfo};
use crate::error::{FocusError, Result};
use crate::protocol::Response;

/// Largest message the browser accepts from a host
pub const MAX_OUTBOUND_FRAME: usize = 1024 * 1024;
/// Largest message the browser may send to a host
pub const MAX_INBOUND_FRAME: usize = 64 * 1024 * 1024;

/// Read one frame. `Ok(None)` on a clean end of stream.
///
/// # Errors
///
/// Returns an error on I/O failure, an oversized frame or invalid JSON
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Value>> {
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = usize::try_from(u32::from_ne_bytes(header)).unwrap_or(usize::MAX);
    if len > MAX_INBOUND_FRAME {
        return Err(FocusError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}

/// Write one frame and flush.
///
/// # Errors
///
/// Returns an error if the message exceeds [`MAX_OUTBOUND_FRAME`] or the
/// write fails
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_OUTBOUND_FRAME {
        return Err(FocusError::FrameTooLarge(body.len()));
    }
    let len = u32::try_from(body.len()).map_err(|_| FocusError::FrameTooLarge(body.len()))?;
    writer.write_all(&len.to_ne_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Message from the extension
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Request {
        id: u64,
        payload: Value,
    },
    Navigation {
        #[serde(rename = "tabId")]
        tab_id: TabId,
        url: String,
    },
    Reply {
        id: u64,
        #[serde(default)]
        ok: bool,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<String>,
    },
}

/// Message to the extension
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Response { id: u64, payload: Response },
    Command { id: u64, command: Command },
}

/// Browser operation the extension runs on the host's behalf
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    QueryTabs,
    RemoveTab {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
    CreateTab {
        url: String,
        active: bool,
    },
    UpdateTabUrl {
        #[serde(rename = "tabId")]
        tab_id: TabId,
        url: String,
    },
    ActiveTab,
    SetBadge {
        text: String,
        color: Option<String>,
    },
    Notify {
        title: String,
        message: String,
    },
}

impl Command {
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            Self::QueryTabs => "query_tabs",
            Self::RemoveTab { .. } => "remove_tab",
            Self::CreateTab { .. } => "create_tab",
            Self::UpdateTabUrl { .. } => "update_tab_url",
            Self::ActiveTab => "active_tab",
            Self::SetBadge { .. } => "set_badge",
            Self::Notify { .. } => "notify",
        }
    }
}

type Reply = std::result::Result<Value, String>;

/// [`TabHost`] and [`StatusPort`] over the native-messaging channel.
///
/// Each command gets an id and a pending slot; the read loop hands replies
/// to [`BridgeBrowser::resolve`]. A command without a reply within the
/// timeout fails with [`FocusError::Timeout`].
pub struct BridgeBrowser {
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl BridgeBrowser {
    #[must_use]
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>, timeout: Duration) -> Self {
        Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            timeout,
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Reply>>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn call(&self, command: Command) -> Result<Value> {
        let op = command.op();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending().insert(id, tx);

        if self.outbound.send(Outbound::Command { id, command }).is_err() {
            self.pending().remove(&id);
            return Err(FocusError::BridgeClosed);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(FocusError::Rejected { op, message }),
            Ok(Err(_)) => Err(FocusError::BridgeClosed),
            Err(_) => {
                self.pending().remove(&id);
                Err(FocusError::Timeout {
                    op,
                    secs: self.timeout.as_secs(),
                })
            }
        }
    }

    /// Complete the command `id`. Returns `false` for an unknown or
    /// already timed-out id.
    pub fn resolve(&self, id: u64, ok: bool, result: Value, error: Option<String>) -> bool {
        let Some(tx) = self.pending().remove(&id) else {
            log::debug!("Reply for unknown command {id}");
            return false;
        };
        let reply = if ok {
            Ok(result)
        } else {
            Err(error.unwrap_or_else(|| "unspecified error".to_string()))
        };
        tx.send(reply).is_ok()
    }

    /// Fail every outstanding command; used when the channel closes
    pub fn fail_all(&self) {
        let dropped = self.pending().drain().count();
        if dropped > 0 {
            log::warn!("Dropped {dropped} browser commands awaiting replies");
        }
    }
}

#[async_trait]
impl TabHost for BridgeBrowser {
    async fn query_tabs(&self) -> anyhow::Result<Vec<TabInfo>> {
        let value = self.call(Command::QueryTabs).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn remove_tab(&self, id: TabId) -> anyhow::Result<()> {
        self.call(Command::RemoveTab { tab_id: id }).await?;
        Ok(())
    }

    async fn create_tab(&self, url: &str, active: bool) -> anyhow::Result<TabId> {
        let value = self
            .call(Command::CreateTab {
                url: url.to_string(),
                active,
            })
            .await?;
        match value {
            Value::Number(n) => n.as_i64().ok_or_else(|| anyhow!("invalid tab id {n}")),
            other => Ok(serde_json::from_value::<TabInfo>(other)?.id),
        }
    }

    async fn update_tab_url(&self, id: TabId, url: &str) -> anyhow::Result<()> {
        self.call(Command::UpdateTabUrl {
            tab_id: id,
            url: url.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn active_tab(&self) -> anyhow::Result<Option<TabInfo>> {
        let value = self.call(Command::ActiveTab).await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl StatusPort for BridgeBrowser {
    async fn set_badge(&self, badge: &Badge) -> anyhow::Result<()> {
        self.call(Command::SetBadge {
            text: badge.text.clone(),
            color: badge.color.clone(),
        })
        .await?;
        Ok(())
    }

    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.call(Command::Notify {
            title: notification.title.clone(),
            message: notification.message.clone(),
        })
        .await?;
        Ok(())
    }
}
