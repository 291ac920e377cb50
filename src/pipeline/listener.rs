//! Notification listener.
//!
//! Owns one upstream connection subscribed to the keyevent channel and feeds
//! every changed key into the ingest queue. Transport faults move it to
//! `Reconnecting`, where it retries with linear backoff until it is subscribed
//! again or asked to stop.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::PipelineStats;
use crate::constants::NOTIFY_CONFIG_KEY;
use crate::constants::PUSH_MESSAGE_KIND;
use crate::record::ChangeKey;
use crate::upstream::Reply;
use crate::upstream::UpstreamClient;
use crate::utils::Backoff;
use crate::utils::BackoffWait;
use crate::BackoffPolicy;
use crate::Error;
use crate::Result;
use crate::SystemError;
use crate::UpstreamConfig;
use crate::UpstreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    Disconnected,
    Connecting,
    Subscribed,
    Reconnecting,
    Stopped,
}

impl fmt::Display for ListenerState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            ListenerState::Disconnected => "disconnected",
            ListenerState::Connecting => "connecting",
            ListenerState::Subscribed => "subscribed",
            ListenerState::Reconnecting => "reconnecting",
            ListenerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Why a pushed frame was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedNotification {
    /// Not a `[message, channel, key]` frame
    Shape,
    /// Key bytes are not UTF-8 and cannot be stored under their exact name
    NonUtf8Key,
}

/// Extracts the changed key from a pushed frame.
///
/// Only `[kind, channel, key]` frames whose kind is the pub/sub message
/// literal carry a notification. Keys are never decoded lossily.
pub fn parse_notification(frame: &[Vec<u8>]) -> std::result::Result<&str, MalformedNotification> {
    match frame {
        [kind, _channel, key] if kind.as_slice() == PUSH_MESSAGE_KIND.as_bytes() => {
            std::str::from_utf8(key).map_err(|_| MalformedNotification::NonUtf8Key)
        }
        _ => Err(MalformedNotification::Shape),
    }
}

fn escaped(frame: &[Vec<u8>]) -> Vec<String> {
    frame.iter().map(|part| part.escape_ascii().to_string()).collect()
}

pub struct Listener<C: UpstreamClient> {
    client: C,
    notification_config: String,
    channel: String,
    retry: BackoffPolicy,
    ingest_tx: mpsc::Sender<ChangeKey>,
    stats: Arc<PipelineStats>,
}

impl<C: UpstreamClient> fmt::Debug for Listener<C> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Listener")
            .field("channel", &self.channel)
            .field("state", &self.stats.listener_state())
            .finish()
    }
}

impl<C: UpstreamClient> Listener<C> {
    pub fn new(
        client: C,
        config: &UpstreamConfig,
        retry: BackoffPolicy,
        ingest_tx: mpsc::Sender<ChangeKey>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            client,
            notification_config: config.notification_config.clone(),
            channel: config.event_channel(),
            retry,
            ingest_tx,
            stats,
        }
    }

    /// Connects, enables notifications and subscribes.
    ///
    /// Failures are returned to the caller and abort startup.
    pub async fn start(&mut self) -> Result<()> {
        self.set_state(ListenerState::Connecting);
        let result = match self.client.connect().await {
            Ok(()) => self.subscribe().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                self.set_state(ListenerState::Subscribed);
                info!(channel = %self.channel, "listener subscribed");
                Ok(())
            }
            Err(e) => {
                self.set_state(ListenerState::Disconnected);
                error!("listener start failed: {:?}", e);
                Err(SystemError::StartFailed(format!("listener: {e}")).into())
            }
        }
    }

    /// Spawns the receive loop and returns its stop handle
    pub fn spawn(self) -> ListenerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let handle = tokio::spawn(self.run(shutdown_rx));
        ListenerHandle { shutdown_tx, handle }
    }

    /// Receive loop; returns once stopped. Dropping `self` closes the ingest queue.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("listener stop requested");
                    break;
                }
                msg = self.client.read_pushed_message() => match msg {
                    Ok(frame) => match parse_notification(&frame) {
                        Ok(key) => self.forward(key.to_string()).await?,
                        Err(reason) => {
                            error!(?reason, frame = ?escaped(&frame), "discard malformed notification");
                        }
                    },
                    Err(e) => {
                        warn!("listener read failed: {:?}", e);
                        if !self.reconnect(&mut shutdown).await {
                            break;
                        }
                    }
                }
            }
        }

        self.client.close().await;
        self.set_state(ListenerState::Stopped);
        info!("listener stopped, closing ingest queue");
        Ok(())
    }

    async fn subscribe(&mut self) -> Result<()> {
        let args = vec![
            "SET".to_string(),
            NOTIFY_CONFIG_KEY.to_string(),
            self.notification_config.clone(),
        ];
        self.client.execute("CONFIG", &args).await?;

        let reply = self.client.execute("SUBSCRIBE", &[self.channel.clone()]).await?;
        match reply {
            Reply::Array(_) => Ok(()),
            other => Err(UpstreamError::UnexpectedReply {
                command: "SUBSCRIBE".into(),
                reply: format!("{:?}", other),
            }
            .into()),
        }
    }

    async fn forward(
        &mut self,
        key: ChangeKey,
    ) -> Result<()> {
        debug!(%key, "forward notification");
        self.ingest_tx
            .send(key)
            .await
            .map_err(|e| Error::Fatal(format!("ingest queue closed, dropping {}", e.0)))?;

        let depth = self.ingest_tx.max_capacity() - self.ingest_tx.capacity();
        if self.stats.record_queue_depth(depth) {
            error!(depth, "queue grow");
        }
        Ok(())
    }

    /// Returns false when stopped (or out of attempts) before resubscribing
    async fn reconnect(
        &mut self,
        shutdown: &mut watch::Receiver<()>,
    ) -> bool {
        self.set_state(ListenerState::Reconnecting);
        let mut backoff = Backoff::new("listener", self.retry);
        loop {
            match backoff.wait(Some(&mut *shutdown)).await {
                BackoffWait::Ready { .. } => {}
                BackoffWait::Stopped => return false,
                BackoffWait::Exhausted => {
                    error!(attempts = backoff.attempt(), "listener gave up reconnecting");
                    return false;
                }
            }

            let result = match self.client.reconnect().await {
                Ok(()) => self.subscribe().await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    self.set_state(ListenerState::Subscribed);
                    info!(attempts = backoff.attempt(), "listener resubscribed");
                    return true;
                }
                Err(e) => warn!("listener reconnect failed: {:?}", e),
            }
        }
    }

    fn set_state(
        &self,
        state: ListenerState,
    ) {
        self.stats.set_listener_state(state);
    }
}

/// Running listener task
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<Result<()>>,
}

impl ListenerHandle {
    /// Requests a stop and waits until the receive loop has exited
    pub async fn stop(self) -> Result<()> {
        // receiver may already be gone when the loop ended on its own
        let _ = self.shutdown_tx.send(());
        self.handle.await?
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
