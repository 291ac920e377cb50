use std::collections::BTreeMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::Syncer;
use crate::pipeline::ListenerState;
use crate::storage::LocalStore;
use crate::storage::MemStore;
use crate::upstream::MockUpstreamClient;
use crate::upstream::Reply;
use crate::SyncerConfig;
use crate::UpstreamError;

const SHARDS: usize = 2;

fn test_config() -> SyncerConfig {
    let mut config = SyncerConfig::default();
    config.pipeline.shard_count = SHARDS;
    config.admin.listen_address = "127.0.0.1:0".parse().unwrap();
    config.agent.listen_address = "127.0.0.1:0".parse().unwrap();
    config
}

/// Storer side of a healthy upstream holding a single `user:42` hash
fn storer_client() -> MockUpstreamClient {
    let mut client = MockUpstreamClient::new();
    client.expect_connect().returning(|| Ok(()));
    client.expect_close().returning(|| ());
    client.expect_type_of().returning(|_| Ok("hash".to_string()));
    client.expect_read_hash_fields().returning(|_| {
        Ok(BTreeMap::from([
            ("version".to_string(), "7".to_string()),
            ("name".to_string(), "a".to_string()),
        ]))
    });
    client
}

/// Listener side: one notification for `user:42`, then a dead connection
fn listener_client() -> MockUpstreamClient {
    let mut client = MockUpstreamClient::new();
    client.expect_connect().returning(|| Ok(()));
    client.expect_close().returning(|| ());
    client.expect_execute().returning(|cmd, _| {
        if cmd == "SUBSCRIBE" {
            Ok(Reply::Array(vec![Reply::Bulk(b"subscribe".to_vec())]))
        } else {
            Ok(Reply::Status("OK".into()))
        }
    });
    let mut delivered = false;
    client.expect_read_pushed_message().returning(move || {
        if delivered {
            return Err(UpstreamError::ConnectionClosed.into());
        }
        delivered = true;
        Ok(vec![b"message".to_vec(), b"__keyevent@0__:hset".to_vec(), b"user:42".to_vec()])
    });
    client.expect_reconnect().returning(|| Err(UpstreamError::ConnectionClosed.into()));
    client
}

/// Storers are built first, the listener last
fn client_factory() -> impl Fn(&crate::UpstreamConfig) -> MockUpstreamClient {
    let calls = AtomicUsize::new(0);
    move |_| {
        if calls.fetch_add(1, Ordering::SeqCst) < SHARDS {
            storer_client()
        } else {
            listener_client()
        }
    }
}

async fn wait_for_key(
    store: &MemStore,
    key: &str,
) {
    timeout(Duration::from_secs(5), async {
        while store.get(key.as_bytes()).unwrap().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_start_replicates_and_serves_queries() {
    let store = Arc::new(MemStore::new());
    let syncer = Syncer::start(&test_config(), store.clone(), client_factory())
        .await
        .unwrap();

    wait_for_key(&store, "user:42").await;
    assert_eq!(store.get(b"__version__:user:42").unwrap(), Some(b"7".to_vec()));

    // admin
    let admin = TcpStream::connect(syncer.admin_addr().unwrap()).await.unwrap();
    let (read_half, mut write_half) = admin.into_split();
    let mut lines = BufReader::new(read_half).lines();
    write_half.write_all(b"version user:42\n").await.unwrap();
    assert_eq!(lines.next_line().await.unwrap().unwrap(), "+ 7");

    // agent
    let mut agent = TcpStream::connect(syncer.agent_addr().unwrap()).await.unwrap();
    let body = br#"{"id":1,"method":"Get","params":"user:42"}"#;
    agent.write_all(&(body.len() as u32).to_be_bytes()).await.unwrap();
    agent.write_all(body).await.unwrap();
    let len = agent.read_u32().await.unwrap();
    let mut response = vec![0u8; len as usize];
    agent.read_exact(&mut response).await.unwrap();
    let response: serde_json::Value = serde_json::from_slice(&response).unwrap();
    assert_eq!(response["result"]["name"], "a");

    let stats = syncer.stats();
    timeout(Duration::from_secs(5), syncer.stop()).await.unwrap().unwrap();
    assert_eq!(stats.listener_state(), ListenerState::Stopped);
    assert_eq!(stats.shard(0).unwrap().snapshot().processed + stats.shard(1).unwrap().snapshot().processed, 1);
}

#[tokio::test]
async fn test_disabled_frontends_are_not_bound() {
    let mut config = test_config();
    config.admin.enabled = false;
    config.agent.enabled = false;

    let syncer = Syncer::start(&config, Arc::new(MemStore::new()), client_factory())
        .await
        .unwrap();
    assert!(syncer.admin_addr().is_none());
    assert!(syncer.agent_addr().is_none());
    timeout(Duration::from_secs(5), syncer.stop()).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_storer_connect_failure_aborts_start() {
    let result = Syncer::start(&test_config(), Arc::new(MemStore::new()), |_| {
        let mut client = MockUpstreamClient::new();
        client
            .expect_connect()
            .returning(|| Err(UpstreamError::ConnectionClosed.into()));
        client
    })
    .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("storer 0"));
}

#[tokio::test]
async fn test_listener_connect_failure_aborts_start() {
    let calls = AtomicUsize::new(0);
    let result = Syncer::start(&test_config(), Arc::new(MemStore::new()), move |_| {
        let mut client = MockUpstreamClient::new();
        if calls.fetch_add(1, Ordering::SeqCst) < SHARDS {
            client.expect_connect().returning(|| Ok(()));
        } else {
            client
                .expect_connect()
                .returning(|| Err(UpstreamError::ConnectionClosed.into()));
        }
        client
    })
    .await;

    assert!(result.unwrap_err().to_string().contains("listener"));
}

#[tokio::test]
async fn test_admin_bind_conflict_stops_pipeline() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = test_config();
    config.admin.listen_address = taken.local_addr().unwrap();

    let result = timeout(
        Duration::from_secs(5),
        Syncer::start(&config, Arc::new(MemStore::new()), client_factory()),
    )
    .await
    .unwrap();
    assert!(result.is_err());
}
