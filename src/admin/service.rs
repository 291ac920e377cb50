use std::net::SocketAddr;
use std::sync::Arc;

use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tokio_util::codec::LinesCodec;
use tokio_util::codec::LinesCodecError;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::CommandRegistry;
use crate::NetworkError;
use crate::Result;

/// Longest accepted request line
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Line-protocol admin endpoint
#[derive(Debug)]
pub struct CommandService {
    listener: TcpListener,
    registry: Arc<CommandRegistry>,
}

impl CommandService {
    pub async fn bind(
        addr: SocketAddr,
        registry: Arc<CommandRegistry>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|source| NetworkError::BindFailed {
            addr: addr.to_string(),
            source,
        })?;
        info!("start manager succeed: {}", addr);
        Ok(Self { listener, registry })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr().map_err(NetworkError::Io)?)
    }

    pub fn registry(&self) -> Arc<CommandRegistry> {
        self.registry.clone()
    }

    /// Accepts connections until shutdown, then waits for every open
    /// connection to finish.
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("command service stop requested");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "handle admin connection");
                        let registry = self.registry.clone();
                        let shutdown = shutdown.clone();
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, registry, shutdown).await {
                                error!(%peer, "admin connection failed: {:?}", e);
                            }
                            debug!(%peer, "end admin connection");
                        });
                    }
                    Err(e) => error!("accept failed: {:?}", e),
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!("admin connection task panicked: {:?}", e);
                    }
                }
            }
        }

        drop(self.listener);
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                error!("admin connection task panicked: {:?}", e);
            }
        }
        info!("command service stopped");
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    registry: Arc<CommandRegistry>,
    mut shutdown: watch::Receiver<()>,
) -> Result<()> {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    loop {
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            line = framed.next() => match line {
                Some(Ok(line)) => {
                    let Some(response) = registry.execute(line.trim()) else {
                        continue;
                    };
                    framed.send(response).await.map_err(lines_error)?;
                }
                Some(Err(e)) => return Err(lines_error(e).into()),
                None => return Ok(()),
            }
        }
    }
}

fn lines_error(e: LinesCodecError) -> NetworkError {
    match e {
        LinesCodecError::Io(e) => NetworkError::Io(e),
        LinesCodecError::MaxLineLengthExceeded => NetworkError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "admin request line too long",
        )),
    }
}
