//! Bounded buffer tests
//!
//! Covers backpressure, capacity conservation across checkpoints, batch
//! accumulation, visibility-timeout redelivery, and shutdown semantics.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use sluice_event::{Event, Record};

use crate::{BlockingBuffer, BufferError};

fn record(n: i64) -> Record {
    Record::new(Event::builder("test").with_field("n", n).build())
}

#[tokio::test(start_paused = true)]
async fn write_blocks_then_fails_when_full() {
    // capacity 4, no readers: the fifth write times out
    let buffer = BlockingBuffer::new(4, 4);
    let write_timeout = Duration::from_millis(100);

    for i in 0..4 {
        buffer.write(record(i), write_timeout).await.unwrap();
    }
    assert!(buffer.is_full().await);

    let start = Instant::now();
    let err = buffer.write(record(4), write_timeout).await.unwrap_err();
    assert_eq!(err, BufferError::Full(write_timeout));
    assert!(start.elapsed() >= write_timeout);
}

#[tokio::test]
async fn capacity_released_only_at_checkpoint() {
    let buffer = BlockingBuffer::new(2, 2);
    buffer.write(record(0), Duration::from_millis(10)).await.unwrap();
    buffer.write(record(1), Duration::from_millis(10)).await.unwrap();

    let (batch, token) = buffer.read(2, Duration::from_millis(10)).await;
    assert_eq!(batch.len(), 2);

    // records are in flight, buffer is still full
    assert!(buffer.is_full().await);
    assert!(matches!(
        buffer.write(record(2), Duration::from_millis(10)).await,
        Err(BufferError::Full(_))
    ));

    buffer.checkpoint(token).await;
    assert!(buffer.is_empty().await);
    buffer.write(record(2), Duration::from_millis(10)).await.unwrap();
}

#[tokio::test]
async fn read_returns_early_at_batch_size() {
    let buffer = Arc::new(BlockingBuffer::new(16, 4));
    for i in 0..4 {
        buffer.write(record(i), Duration::from_millis(10)).await.unwrap();
    }
    // long timeout, but the batch size is already met
    let start = Instant::now();
    let (batch, _) = buffer.read(8, Duration::from_secs(30)).await;
    assert_eq!(batch.len(), 4);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn read_caps_at_max_batch() {
    let buffer = BlockingBuffer::new(16, 4);
    for i in 0..6 {
        buffer.write(record(i), Duration::from_millis(10)).await.unwrap();
    }
    let (batch, token) = buffer.read(3, Duration::from_millis(10)).await;
    assert_eq!(batch.len(), 3);
    buffer.checkpoint(token).await;
}

#[tokio::test]
async fn read_times_out_with_partial_batch() {
    let buffer = BlockingBuffer::new(16, 4);
    buffer.write(record(0), Duration::from_millis(10)).await.unwrap();

    let (batch, _) = buffer.read(8, Duration::from_millis(50)).await;
    assert_eq!(batch.len(), 1);

    // nothing queued at all: empty batch, no-op token
    let (batch, token) = buffer.read(8, Duration::from_millis(20)).await;
    assert!(batch.is_empty());
    assert!(token.is_empty());
    buffer.checkpoint(token).await;
}

#[tokio::test]
async fn unblocked_writer_proceeds_after_checkpoint() {
    let buffer = Arc::new(BlockingBuffer::new(1, 1));
    buffer.write(record(0), Duration::from_millis(10)).await.unwrap();

    let writer = {
        let buffer = Arc::clone(&buffer);
        tokio::spawn(async move { buffer.write(record(1), Duration::from_secs(5)).await })
    };

    let (batch, token) = buffer.read(1, Duration::from_millis(50)).await;
    assert_eq!(batch.len(), 1);
    buffer.checkpoint(token).await;

    writer.await.unwrap().unwrap();
    assert!(!buffer.is_empty().await);
}

#[tokio::test]
async fn write_all_is_all_or_nothing() {
    let buffer = BlockingBuffer::new(4, 4);
    buffer
        .write_all(vec![record(0), record(1), record(2)], Duration::from_millis(10))
        .await
        .unwrap();

    // 2 more cannot fit next to the 3 queued
    let err = buffer
        .write_all(vec![record(3), record(4)], Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, BufferError::Full(_)));

    // nothing was partially admitted
    let (batch, token) = buffer.read(8, Duration::from_millis(10)).await;
    assert_eq!(batch.len(), 3);
    buffer.checkpoint(token).await;

    // a batch that can never fit fails immediately
    let records: Vec<Record> = (0..5).map(record).collect();
    assert_eq!(
        buffer.write_all(records, Duration::from_millis(10)).await,
        Err(BufferError::BatchTooLarge {
            batch: 5,
            capacity: 4
        })
    );
}

#[tokio::test]
async fn expired_batch_is_redelivered_in_order() {
    let buffer = BlockingBuffer::new(8, 4).with_visibility_timeout(Duration::from_millis(50));
    for i in 0..3 {
        buffer.write(record(i), Duration::from_millis(10)).await.unwrap();
    }

    let (first, token) = buffer.read(8, Duration::from_millis(10)).await;
    assert_eq!(first.len(), 3);

    tokio::time::sleep(Duration::from_millis(80)).await;

    // never checkpointed: the same records come back, original order
    let (again, token2) = buffer.read(8, Duration::from_millis(10)).await;
    assert_eq!(again, first);

    buffer.checkpoint(token2).await;
    // the stale token is ignored
    buffer.checkpoint(token).await;
    assert!(buffer.is_empty().await);
}

#[tokio::test]
async fn conservation_under_concurrent_writers() {
    // writes minus checkpoints never exceed capacity
    let buffer = Arc::new(BlockingBuffer::new(8, 4));

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut accepted = 0u64;
                for i in 0..50 {
                    if buffer
                        .write(record(w * 100 + i), Duration::from_millis(5))
                        .await
                        .is_ok()
                    {
                        accepted += 1;
                    }
                }
                accepted
            })
        })
        .collect();

    let reader = {
        let buffer = Arc::clone(&buffer);
        tokio::spawn(async move {
            let mut drained = 0u64;
            loop {
                let (batch, token) = buffer.read(4, Duration::from_millis(20)).await;
                if batch.is_empty() {
                    break;
                }
                drained += batch.len() as u64;
                buffer.checkpoint(token).await;
            }
            drained
        })
    };

    let mut accepted = 0u64;
    for writer in writers {
        accepted += writer.await.unwrap();
    }
    // drain the rest after writers stop
    let mut drained = reader.await.unwrap();
    loop {
        let (batch, token) = buffer.read(8, Duration::from_millis(10)).await;
        if batch.is_empty() {
            break;
        }
        drained += batch.len() as u64;
        buffer.checkpoint(token).await;
    }

    assert_eq!(accepted, drained);
    assert!(buffer.is_empty().await);
}

#[tokio::test]
async fn shutdown_fails_writers_and_drains_readers() {
    let buffer = Arc::new(BlockingBuffer::new(4, 4));
    buffer.write(record(0), Duration::from_millis(10)).await.unwrap();

    buffer.shutdown().await;

    assert_eq!(
        buffer.write(record(1), Duration::from_secs(10)).await,
        Err(BufferError::Shutdown)
    );

    // readers still drain queued records and can checkpoint
    let (batch, token) = buffer.read(4, Duration::from_millis(10)).await;
    assert_eq!(batch.len(), 1);
    buffer.checkpoint(token).await;

    // further reads return immediately with nothing
    let start = Instant::now();
    let (batch, _) = buffer.read(4, Duration::from_secs(10)).await;
    assert!(batch.is_empty());
    assert!(start.elapsed() < Duration::from_secs(1));
}
