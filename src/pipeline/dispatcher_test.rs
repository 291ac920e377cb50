use std::collections::HashMap;

use tokio::sync::mpsc;

use super::shard_index;
use super::Dispatcher;

#[test]
fn test_shard_index_is_stable() {
    for key in ["user:42", "k1", "", "a somewhat longer key with spaces"] {
        let first = shard_index(key, 5);
        for _ in 0..10 {
            assert_eq!(shard_index(key, 5), first);
        }
        assert!(first < 5);
    }
}

#[test]
fn test_single_shard_takes_everything() {
    assert_eq!(shard_index("x", 1), 0);
    assert_eq!(shard_index("y", 1), 0);
}

#[test]
fn test_keys_spread_over_shards() {
    let mut counts = HashMap::new();
    for i in 0..1000 {
        *counts.entry(shard_index(&format!("key:{i}"), 5)).or_insert(0) += 1;
    }
    assert_eq!(counts.len(), 5);
}

#[tokio::test]
async fn test_routes_keys_in_arrival_order() {
    let (ingest_tx, ingest_rx) = mpsc::channel(16);
    let mut shard_txs = Vec::new();
    let mut shard_rxs = Vec::new();
    for _ in 0..3 {
        let (tx, rx) = mpsc::channel(16);
        shard_txs.push(tx);
        shard_rxs.push(rx);
    }

    let handle = tokio::spawn(Dispatcher::new(ingest_rx, shard_txs).run());

    let sent = vec!["a", "b", "a", "c", "a", "b"];
    for key in &sent {
        ingest_tx.send(key.to_string()).await.unwrap();
    }
    drop(ingest_tx);
    handle.await.unwrap().unwrap();

    for (index, rx) in shard_rxs.iter_mut().enumerate() {
        let mut seen = Vec::new();
        while let Ok(k) = rx.try_recv() {
            seen.push(k);
        }
        let expected: Vec<String> = sent
            .iter()
            .filter(|k| shard_index(k, 3) == index)
            .map(|k| k.to_string())
            .collect();
        assert_eq!(seen, expected);
    }
}

#[tokio::test]
async fn test_closing_ingest_closes_shard_queues() {
    let (ingest_tx, ingest_rx) = mpsc::channel(1);
    let (shard_tx, mut shard_rx) = mpsc::channel(1);

    let handle = tokio::spawn(Dispatcher::new(ingest_rx, vec![shard_tx]).run());
    drop(ingest_tx);
    handle.await.unwrap().unwrap();

    assert_eq!(shard_rx.recv().await, None);
}

#[tokio::test]
async fn test_closed_shard_does_not_stop_dispatch() {
    let (ingest_tx, ingest_rx) = mpsc::channel(4);
    let (shard_tx, shard_rx) = mpsc::channel(1);
    drop(shard_rx);

    let handle = tokio::spawn(Dispatcher::new(ingest_rx, vec![shard_tx]).run());
    ingest_tx.send("k".to_string()).await.unwrap();
    ingest_tx.send("k".to_string()).await.unwrap();
    drop(ingest_tx);

    assert!(handle.await.unwrap().is_ok());
}
