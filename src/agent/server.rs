use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::codec::LengthDelimitedCodec;
use tokio_util::codec::LengthDelimitedCodecError;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::handle_request;
use super::RawRequest;
use crate::storage::LocalStore;
use crate::AgentConfig;
use crate::Error;
use crate::NetworkError;
use crate::Result;

/// Length-framed JSON query endpoint over the local store
///
/// Frames are a 4-byte big-endian length followed by a JSON body. Requests
/// of one connection are served concurrently, so responses may come back out
/// of order; clients match them by `id`.
pub struct AgentServer<S: LocalStore> {
    listener: TcpListener,
    store: Arc<S>,
    max_frame_bytes: usize,
    max_inflight_requests: usize,
}

impl<S: LocalStore> std::fmt::Debug for AgentServer<S> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("AgentServer")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("max_frame_bytes", &self.max_frame_bytes)
            .finish()
    }
}

impl<S: LocalStore> AgentServer<S> {
    pub async fn bind(
        config: &AgentConfig,
        store: Arc<S>,
    ) -> Result<Self> {
        let addr = config.listen_address;
        let listener = TcpListener::bind(addr).await.map_err(|source| NetworkError::BindFailed {
            addr: addr.to_string(),
            source,
        })?;
        info!("start agent succeed: {}", addr);
        Ok(Self {
            listener,
            store,
            max_frame_bytes: config.max_frame_bytes,
            max_inflight_requests: config.max_inflight_requests,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr().map_err(NetworkError::Io)?)
    }

    /// Accepts connections until shutdown, then waits for open connections
    /// to flush their in-flight responses.
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("agent stop requested");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!(%peer, "new agent connection");
                        let conn = Connection {
                            store: self.store.clone(),
                            max_frame_bytes: self.max_frame_bytes,
                            max_inflight_requests: self.max_inflight_requests,
                        };
                        let shutdown = shutdown.clone();
                        connections.spawn(async move {
                            if let Err(e) = conn.serve(stream, shutdown).await {
                                error!(%peer, "agent connection failed: {:?}", e);
                            }
                            debug!(%peer, "agent connection closed");
                        });
                    }
                    Err(e) => error!("accept failed: {:?}", e),
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!("agent connection task panicked: {:?}", e);
                    }
                }
            }
        }

        drop(self.listener);
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                error!("agent connection task panicked: {:?}", e);
            }
        }
        info!("agent stopped");
        Ok(())
    }
}

struct Connection<S: LocalStore> {
    store: Arc<S>,
    max_frame_bytes: usize,
    max_inflight_requests: usize,
}

impl<S: LocalStore> Connection<S> {
    async fn serve(
        self,
        stream: TcpStream,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        let mut builder = LengthDelimitedCodec::builder();
        builder
            .big_endian()
            .length_field_length(4)
            .max_frame_length(self.max_frame_bytes);

        let (read_half, write_half) = stream.into_split();
        let mut reader = builder.new_read(read_half);
        let mut writer = builder.new_write(write_half);

        // single writer: request tasks hand finished frames over
        let (resp_tx, mut resp_rx) = mpsc::channel::<Bytes>(self.max_inflight_requests);
        let writer_task = tokio::spawn(async move {
            while let Some(frame) = resp_rx.recv().await {
                writer.send(frame).await.map_err(NetworkError::Io)?;
            }
            Ok::<(), Error>(())
        });

        let inflight = Arc::new(Semaphore::new(self.max_inflight_requests));
        let read_result = loop {
            let frame = tokio::select! {
                _ = shutdown.changed() => break Ok(()),
                frame = reader.next() => frame,
            };
            let body = match frame {
                Some(Ok(body)) => body,
                Some(Err(e)) => break Err(self.frame_error(e)),
                None => break Ok(()),
            };

            let request: RawRequest = match serde_json::from_slice(&body) {
                Ok(request) => request,
                Err(e) => {
                    warn!("parse request failed, frame skipped: {:?}", e);
                    continue;
                }
            };

            let Ok(permit) = inflight.clone().acquire_owned().await else {
                break Ok(());
            };
            let store = self.store.clone();
            let resp_tx = resp_tx.clone();
            tokio::spawn(async move {
                let response = handle_request(store.as_ref(), request);
                match serde_json::to_vec(&response) {
                    Ok(body) => {
                        if resp_tx.send(Bytes::from(body)).await.is_err() {
                            debug!(id = response.id, "connection writer gone, response dropped");
                        }
                    }
                    Err(e) => error!(id = response.id, "encode response failed: {:?}", e),
                }
                drop(permit);
            });
        };

        // writer ends once every request task has released its sender
        drop(resp_tx);
        let write_result = writer_task.await?;
        read_result.and(write_result)
    }

    fn frame_error(
        &self,
        e: std::io::Error,
    ) -> Error {
        let too_large = e
            .get_ref()
            .map(|inner| inner.is::<LengthDelimitedCodecError>())
            .unwrap_or(false);
        if too_large {
            NetworkError::FrameTooLarge {
                limit: self.max_frame_bytes,
            }
            .into()
        } else {
            NetworkError::Io(e).into()
        }
    }
}
