use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use super::backoff::Backoff;
use super::backoff::BackoffWait;
use crate::BackoffPolicy;

fn policy(
    max_retries: usize,
    step_ms: u64,
    max_delay_ms: u64,
) -> BackoffPolicy {
    BackoffPolicy {
        max_retries,
        step_ms,
        max_delay_ms,
    }
}

#[test]
fn test_delay_grows_linearly_and_caps_at_max() {
    let p = BackoffPolicy::reconnect();

    assert_eq!(Backoff::delay_for(&p, 1), Duration::from_secs(1));
    assert_eq!(Backoff::delay_for(&p, 2), Duration::from_secs(2));
    assert_eq!(Backoff::delay_for(&p, 29), Duration::from_secs(29));
    assert_eq!(Backoff::delay_for(&p, 30), Duration::from_secs(30));
    assert_eq!(Backoff::delay_for(&p, 31), Duration::from_secs(30));
    assert_eq!(Backoff::delay_for(&p, 10_000), Duration::from_secs(30));
}

#[test]
fn test_delay_does_not_overflow_on_huge_attempts() {
    let p = policy(0, u64::MAX / 2, u64::MAX);
    assert_eq!(Backoff::delay_for(&p, usize::MAX), Duration::from_millis(u64::MAX));
}

#[tokio::test(start_paused = true)]
async fn test_wait_sleeps_before_every_attempt_including_the_first() {
    let mut backoff = Backoff::new("test", BackoffPolicy::reconnect());

    let start = Instant::now();
    let first = backoff.wait(None).await;
    assert_eq!(
        first,
        BackoffWait::Ready {
            attempt: 1,
            waited: Duration::from_secs(1)
        }
    );
    assert!(start.elapsed() >= Duration::from_secs(1));

    let second = backoff.wait(None).await;
    assert_eq!(
        second,
        BackoffWait::Ready {
            attempt: 2,
            waited: Duration::from_secs(2)
        }
    );
    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_unlimited_policy_never_exhausts() {
    let mut backoff = Backoff::new("test", policy(0, 1, 5));
    for i in 1..=100 {
        match backoff.wait(None).await {
            BackoffWait::Ready { attempt, .. } => assert_eq!(attempt, i),
            other => panic!("unexpected {:?}", other),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_bounded_policy_exhausts_after_max_retries() {
    let mut backoff = Backoff::new("test", policy(3, 10, 100));

    for _ in 0..3 {
        assert!(matches!(backoff.wait(None).await, BackoffWait::Ready { .. }));
    }
    assert_eq!(backoff.wait(None).await, BackoffWait::Exhausted);

    backoff.reset();
    assert!(matches!(backoff.wait(None).await, BackoffWait::Ready { attempt: 1, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_pending_shutdown_stops_before_sleeping() {
    let (tx, mut rx) = watch::channel(());
    tx.send(()).unwrap();

    let mut backoff = Backoff::new("test", BackoffPolicy::reconnect());
    let start = Instant::now();
    assert_eq!(backoff.wait(Some(&mut rx)).await, BackoffWait::Stopped);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(backoff.attempt(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_a_long_wait() {
    let (tx, mut rx) = watch::channel(());
    let mut backoff = Backoff::new("test", policy(0, 30_000, 30_000));

    let start = Instant::now();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        // keep the sender alive until the wait observed the change
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    assert_eq!(backoff.wait(Some(&mut rx)).await, BackoffWait::Stopped);
    assert!(start.elapsed() < Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_shutdown_sender_counts_as_stop() {
    let (tx, mut rx) = watch::channel(());
    drop(tx);

    let mut backoff = Backoff::new("test", BackoffPolicy::reconnect());
    assert_eq!(backoff.wait(Some(&mut rx)).await, BackoffWait::Stopped);
}
