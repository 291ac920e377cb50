//! Shared harness: an in-process upstream speaking through [`UpstreamClient`]
//! and helpers to run a full [`Syncer`] against a sled store in a temp dir.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keyspace_syncer::storage::init_sled_db;
use keyspace_syncer::storage::LocalStore;
use keyspace_syncer::storage::SledStore;
use keyspace_syncer::upstream::Reply;
use keyspace_syncer::upstream::UpstreamClient;
use keyspace_syncer::BackoffPolicy;
use keyspace_syncer::Result;
use keyspace_syncer::Syncer;
use keyspace_syncer::SyncerConfig;
use keyspace_syncer::UpstreamError;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const EVENT_CHANNEL: &str = "__keyevent@0__:hset";
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

enum Value {
    Hash(BTreeMap<String, String>),
    Text(String),
}

struct SourceState {
    values: Mutex<HashMap<String, Value>>,
    expires: Mutex<Vec<(String, u64)>>,
    // pending transport faults per key, consumed by HGETALL
    read_faults: Mutex<HashMap<String, usize>>,
    delivered: AtomicUsize,
    events_tx: mpsc::UnboundedSender<Vec<Vec<u8>>>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<Vec<u8>>>>,
}

/// Scripted source store shared by every client it hands out
#[derive(Clone)]
pub struct FakeUpstream {
    state: Arc<SourceState>,
}

impl FakeUpstream {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(SourceState {
                values: Mutex::new(HashMap::new()),
                expires: Mutex::new(Vec::new()),
                read_faults: Mutex::new(HashMap::new()),
                delivered: AtomicUsize::new(0),
                events_tx,
                events_rx: tokio::sync::Mutex::new(events_rx),
            }),
        }
    }

    pub fn client(&self) -> FakeClient {
        FakeClient {
            upstream: self.clone(),
            connected: false,
        }
    }

    /// Writes hash fields and publishes the keyevent notification
    pub fn hset(
        &self,
        key: &str,
        fields: &[(&str, &str)],
    ) {
        {
            let mut values = self.state.values.lock();
            let entry = values
                .entry(key.to_string())
                .or_insert_with(|| Value::Hash(BTreeMap::new()));
            if let Value::Text(_) = entry {
                *entry = Value::Hash(BTreeMap::new());
            }
            if let Value::Hash(hash) = entry {
                for (f, v) in fields {
                    hash.insert(f.to_string(), v.to_string());
                }
            }
        }
        self.notify(key);
    }

    pub fn set_text(
        &self,
        key: &str,
        value: &str,
    ) {
        self.state
            .values
            .lock()
            .insert(key.to_string(), Value::Text(value.to_string()));
    }

    pub fn delete(
        &self,
        key: &str,
    ) {
        self.state.values.lock().remove(key);
    }

    pub fn notify(
        &self,
        key: &str,
    ) {
        self.publish(vec!["message", EVENT_CHANNEL, key]);
    }

    pub fn publish(
        &self,
        frame: Vec<&str>,
    ) {
        self.publish_raw(frame.into_iter().map(|s| s.as_bytes().to_vec()).collect());
    }

    pub fn publish_raw(
        &self,
        frame: Vec<Vec<u8>>,
    ) {
        // receiver lives as long as the state
        let _ = self.state.events_tx.send(frame);
    }

    pub fn fail_reads(
        &self,
        key: &str,
        times: usize,
    ) {
        self.state.read_faults.lock().insert(key.to_string(), times);
    }

    pub fn expires(&self) -> Vec<(String, u64)> {
        self.state.expires.lock().clone()
    }

    /// Notifications handed to the listener so far
    pub fn delivered(&self) -> usize {
        self.state.delivered.load(Ordering::SeqCst)
    }
}

pub struct FakeClient {
    upstream: FakeUpstream,
    connected: bool,
}

impl FakeClient {
    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(UpstreamError::NotConnected.into())
        }
    }
}

#[async_trait]
impl UpstreamClient for FakeClient {
    async fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn close(&mut self) {
        self.connected = false;
    }

    async fn execute(
        &mut self,
        command: &str,
        args: &[String],
    ) -> Result<Reply> {
        self.ensure_connected()?;
        match command.to_ascii_uppercase().as_str() {
            "SUBSCRIBE" => Ok(Reply::Array(vec![
                Reply::Bulk(b"subscribe".to_vec()),
                Reply::Bulk(EVENT_CHANNEL.as_bytes().to_vec()),
                Reply::Integer(1),
            ])),
            "EXPIRE" => {
                let seconds = args
                    .get(1)
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| UpstreamError::Server("ERR value is not an integer".into()))?;
                self.upstream.state.expires.lock().push((args[0].clone(), seconds));
                Ok(Reply::Integer(1))
            }
            _ => Ok(Reply::Status("OK".into())),
        }
    }

    async fn read_pushed_message(&mut self) -> Result<Vec<Vec<u8>>> {
        self.ensure_connected()?;
        let mut rx = self.upstream.state.events_rx.lock().await;
        match rx.recv().await {
            Some(frame) => {
                self.upstream.state.delivered.fetch_add(1, Ordering::SeqCst);
                Ok(frame)
            }
            None => Err(UpstreamError::ConnectionClosed.into()),
        }
    }

    async fn type_of(
        &mut self,
        key: &str,
    ) -> Result<String> {
        self.ensure_connected()?;
        let kind = match self.upstream.state.values.lock().get(key) {
            Some(Value::Hash(_)) => "hash",
            Some(Value::Text(_)) => "string",
            None => "none",
        };
        Ok(kind.to_string())
    }

    async fn read_hash_fields(
        &mut self,
        key: &str,
    ) -> Result<BTreeMap<String, String>> {
        self.ensure_connected()?;
        if let Some(left) = self.upstream.state.read_faults.lock().get_mut(key) {
            if *left > 0 {
                *left -= 1;
                self.connected = false;
                return Err(UpstreamError::ConnectionClosed.into());
            }
        }
        match self.upstream.state.values.lock().get(key) {
            Some(Value::Hash(hash)) => Ok(hash.clone()),
            Some(Value::Text(_)) => Err(UpstreamError::Server("WRONGTYPE".into()).into()),
            None => Ok(BTreeMap::new()),
        }
    }
}

/// Short waits so reconnect paths finish quickly
pub fn test_config(db_dir: &TempDir) -> SyncerConfig {
    let mut config = SyncerConfig::default();
    config.pipeline.shard_count = 3;
    config.storage.db_path = db_dir.path().join("replica");
    config.admin.listen_address = "127.0.0.1:0".parse().unwrap();
    config.agent.listen_address = "127.0.0.1:0".parse().unwrap();
    let fast = BackoffPolicy {
        max_retries: 0,
        step_ms: 10,
        max_delay_ms: 50,
    };
    config.retry.listener = fast;
    config.retry.storer = fast;
    config
}

pub struct TestContext {
    pub upstream: FakeUpstream,
    pub store: Arc<SledStore>,
    pub syncer: Syncer<SledStore>,
    _db_dir: TempDir,
}

impl TestContext {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(adjust: impl FnOnce(&mut SyncerConfig)) -> Self {
        let db_dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&db_dir);
        adjust(&mut config);

        let store = Arc::new(SledStore::new(init_sled_db(&config.storage).unwrap()).unwrap());
        let upstream = FakeUpstream::new();
        let factory = upstream.clone();
        let syncer = Syncer::start(&config, store.clone(), move |_| factory.client())
            .await
            .unwrap();

        Self {
            upstream,
            store,
            syncer,
            _db_dir: db_dir,
        }
    }

    pub fn stored(
        &self,
        key: &str,
    ) -> Option<String> {
        self.store
            .get(key.as_bytes())
            .unwrap()
            .map(|v| String::from_utf8(v).unwrap())
    }

    pub async fn wait_until(
        &self,
        mut cond: impl FnMut(&Self) -> bool,
    ) {
        tokio::time::timeout(WAIT_TIMEOUT, async {
            while !cond(self) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    pub async fn wait_for_version(
        &self,
        key: &str,
        version: &str,
    ) {
        let index = keyspace_syncer::record::index_key(key);
        self.wait_until(|ctx| ctx.stored(&index).as_deref() == Some(version)).await;
    }
}
