use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::debug;
use tracing::info;

use super::resp::Command;
use super::resp::RespCodec;
use super::resp::Reply;
use super::UpstreamClient;
use crate::Result;
use crate::UpstreamConfig;
use crate::UpstreamError;

/// RESP2 client over a single TCP connection
pub struct RespClient {
    config: UpstreamConfig,
    conn: Option<Framed<TcpStream, RespCodec>>,
}

impl std::fmt::Debug for RespClient {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RespClient")
            .field("address", &self.config.address())
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

impl RespClient {
    pub fn new(config: UpstreamConfig) -> Self {
        Self { config, conn: None }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Sends one command and waits for its reply
    pub async fn request(
        &mut self,
        command: Command,
    ) -> Result<Reply> {
        let conn = self.conn.as_mut().ok_or(UpstreamError::NotConnected)?;
        conn.send(command).await?;
        Self::next_reply(conn).await
    }

    async fn next_reply(conn: &mut Framed<TcpStream, RespCodec>) -> Result<Reply> {
        match conn.next().await {
            Some(Ok(Reply::Error(e))) => Err(UpstreamError::Server(e).into()),
            Some(Ok(reply)) => Ok(reply),
            Some(Err(e)) => Err(e.into()),
            None => Err(UpstreamError::ConnectionClosed.into()),
        }
    }

    async fn expect_ok(
        &mut self,
        command: Command,
    ) -> Result<()> {
        let name = command.name();
        match self.request(command).await? {
            Reply::Status(_) => Ok(()),
            other => Err(UpstreamError::UnexpectedReply {
                command: name,
                reply: format!("{:?}", other),
            }
            .into()),
        }
    }
}

#[async_trait]
impl UpstreamClient for RespClient {
    async fn connect(&mut self) -> Result<()> {
        let addr = self.config.address();
        let duration = self.config.connect_timeout();
        let stream = match timeout(duration, TcpStream::connect(&addr)).await {
            Ok(stream) => stream.map_err(UpstreamError::Io)?,
            Err(_) => return Err(UpstreamError::ConnectTimeout { addr, duration }.into()),
        };
        stream.set_nodelay(true).map_err(UpstreamError::Io)?;
        self.conn = Some(Framed::new(stream, RespCodec));

        if !self.config.password.is_empty() {
            let auth = Command::new("AUTH").arg(&self.config.password);
            if let Err(e) = self.expect_ok(auth).await {
                self.conn = None;
                return Err(e);
            }
        }
        if self.config.db != 0 {
            let select = Command::new("SELECT").arg(self.config.db.to_string());
            if let Err(e) = self.expect_ok(select).await {
                self.conn = None;
                return Err(e);
            }
        }

        info!(%addr, db = self.config.db, "connected to upstream");
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.close().await;
        self.connect().await
    }

    async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                debug!("close upstream connection: {:?}", e);
            }
        }
    }

    async fn execute(
        &mut self,
        command: &str,
        args: &[String],
    ) -> Result<Reply> {
        self.request(Command::new(command).args(args)).await
    }

    async fn read_pushed_message(&mut self) -> Result<Vec<Vec<u8>>> {
        let conn = self.conn.as_mut().ok_or(UpstreamError::NotConnected)?;
        Ok(Self::next_reply(conn).await?.into_parts())
    }

    async fn type_of(
        &mut self,
        key: &str,
    ) -> Result<String> {
        let reply = self.request(Command::new("TYPE").arg(key)).await?;
        match reply {
            Reply::Status(t) => Ok(t),
            other => Err(UpstreamError::UnexpectedReply {
                command: "TYPE".into(),
                reply: format!("{:?}", other),
            }
            .into()),
        }
    }

    async fn read_hash_fields(
        &mut self,
        key: &str,
    ) -> Result<BTreeMap<String, String>> {
        let reply = self.request(Command::new("HGETALL").arg(key)).await?;
        let items = match reply {
            Reply::Array(items) if items.len() % 2 == 0 => items,
            // a key deleted between TYPE and HGETALL reads as empty
            Reply::Nil => Vec::new(),
            other => {
                return Err(UpstreamError::UnexpectedReply {
                    command: "HGETALL".into(),
                    reply: format!("{:?}", other),
                }
                .into())
            }
        };

        let mut fields = BTreeMap::new();
        let mut iter = items.into_iter();
        while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
            match (field.into_string(), value.into_string()) {
                (Some(f), Some(v)) => {
                    fields.insert(f, v);
                }
                _ => {
                    return Err(UpstreamError::UnexpectedReply {
                        command: "HGETALL".into(),
                        reply: "non-string field or value".into(),
                    }
                    .into())
                }
            }
        }
        Ok(fields)
    }
}
