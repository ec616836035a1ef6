// tests/stream_frames.rs

mod common;
use crate::common::with_timeout;

use std::error::Error;

use proptest::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tradewatch::errors::WatchError;
use tradewatch::stream::{Frame, StreamTransport, decode_frame};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn decodes_auth_and_listing_frames() -> TestResult {
    assert_eq!(decode_frame(r#"{"auth": true}"#)?, Frame::Auth(true));
    assert_eq!(decode_frame(r#"{"auth": false}"#)?, Frame::Auth(false));
    assert_eq!(
        decode_frame(r#"{"new": ["g1", "g2"]}"#)?,
        Frame::Listings(vec!["g1".into(), "g2".into()])
    );
    Ok(())
}

#[test]
fn auth_wins_and_blank_ids_are_dropped() -> TestResult {
    assert_eq!(
        decode_frame(r#"{"auth": false, "new": ["g1"]}"#)?,
        Frame::Auth(false)
    );
    assert_eq!(
        decode_frame(r#"{"new": ["", "  ", "g3"]}"#)?,
        Frame::Listings(vec!["g3".into()])
    );
    assert_eq!(decode_frame(r#"{"new": []}"#)?, Frame::Ignored);
    assert_eq!(decode_frame(r#"{"ping": 1}"#)?, Frame::Ignored);
    assert!(decode_frame("not json").is_err());
    Ok(())
}

proptest! {
    #[test]
    fn listing_batches_keep_their_order(ids in proptest::collection::vec("[a-zA-Z0-9]{1,16}", 1..20)) {
        let text = serde_json::json!({ "new": ids }).to_string();
        prop_assert_eq!(decode_frame(&text).unwrap(), Frame::Listings(ids));
    }
}

/// Transport fed from an in-memory queue, with a reader task that just
/// waits for cancellation.
fn channel_transport(capacity: usize) -> (mpsc::Sender<String>, StreamTransport) {
    let (tx, rx) = mpsc::channel(capacity);
    let cancel = CancellationToken::new();
    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(async move { reader_cancel.cancelled().await });
    (tx, StreamTransport::new("test", rx, reader, cancel))
}

#[tokio::test]
async fn batch_ids_become_ordered_events() -> TestResult {
    let (tx, mut transport) = channel_transport(10);
    tx.send(r#"{"auth": true}"#.into()).await?;
    tx.send(r#"{"new": ["g1", "g2"]}"#.into()).await?;
    tx.send("garbage".into()).await?;
    tx.send(r#"{"new": ["g3"]}"#.into()).await?;

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(with_timeout(transport.next_event()).await?.listing_id);
    }
    assert_eq!(seen, vec!["g1", "g2", "g3"]);
    assert!(transport.is_authenticated());

    transport.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn rejected_auth_is_terminal() -> TestResult {
    let (tx, mut transport) = channel_transport(10);
    tx.send(r#"{"auth": false}"#.into()).await?;
    tx.send(r#"{"new": ["g1"]}"#.into()).await?;

    let first = with_timeout(transport.next_event()).await;
    assert!(matches!(first, Err(WatchError::AuthFailed)));
    let again = with_timeout(transport.next_event()).await;
    assert!(matches!(again, Err(WatchError::AuthFailed)));
    assert!(!transport.is_authenticated());
    Ok(())
}

#[tokio::test]
async fn closed_queue_ends_the_stream() -> TestResult {
    let (tx, mut transport) = channel_transport(10);
    tx.send(r#"{"new": ["g1"]}"#.into()).await?;
    drop(tx);

    assert_eq!(with_timeout(transport.next_event()).await?.listing_id, "g1");
    let end = with_timeout(transport.next_event()).await;
    assert!(matches!(end, Err(WatchError::StreamClosed(_))));
    Ok(())
}

#[tokio::test]
async fn shutdown_discards_buffered_frames() -> TestResult {
    let (tx, mut transport) = channel_transport(10);
    tx.send(r#"{"new": ["g1", "g2"]}"#.into()).await?;
    tx.send(r#"{"new": ["g3"]}"#.into()).await?;

    assert_eq!(with_timeout(transport.next_event()).await?.listing_id, "g1");
    with_timeout(transport.shutdown()).await;

    // The queue is closed once the transport is gone.
    assert!(tx.send(r#"{"new": ["late"]}"#.into()).await.is_err());
    Ok(())
}
