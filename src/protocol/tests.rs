#![cfg(test)]

use super::{
    BlockingRequestClient, RecordCursor, ReplyServer, RequestClient, ServeOutcome, ServerState,
};
use crate::collector::Collector;
use crate::config::{ClientConfig, ServerConfig};
use crate::error::ChartError;
use crate::record::{Record, Reply, Request};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn loopback() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
    }
}

/// Serves `count` records with `i = index`, then the terminator.
fn finite_handler(
    count: u64,
    calls: Arc<AtomicU64>,
) -> impl FnMut(Request) -> std::future::Ready<Result<Reply, String>> + Send {
    move |request: Request| {
        calls.fetch_add(1, Ordering::SeqCst);
        let reply = if request.index < count {
            Reply::Record(Record::from([("i", request.index as f64)]))
        } else {
            Reply::End
        };
        std::future::ready(Ok(reply))
    }
}

#[tokio::test]
async fn collector_session_serves_in_order_then_terminates() {
    let mut next = 0u32;
    let producer = move || {
        let record = Record::from([("x", f64::from(next))]);
        next += 1;
        Ok::<_, String>(record)
    };
    let mut collector = Collector::new(producer, Duration::from_millis(50));
    collector.start().unwrap();

    let finish = CancellationToken::new();
    let server = ReplyServer::bind(&loopback(), collector.reader().handler(finish.clone()))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let serving = tokio::spawn(server.serve(CancellationToken::new()));

    let mut cursor = RecordCursor::new(RequestClient::connect_to(addr).await.unwrap());
    for expected in 0..3u32 {
        let record = timeout(Duration::from_secs(5), cursor.next_record())
            .await
            .expect("reply did not arrive in time")
            .unwrap();
        assert_eq!(record, Some(Record::from([("x", f64::from(expected))])));
    }

    finish.cancel();
    assert_eq!(cursor.next_record().await.unwrap(), None);
    assert!(cursor.is_done());
    assert_eq!(cursor.next_index(), 3);
    assert_eq!(cursor.next_record().await.unwrap(), None);

    let outcome = timeout(Duration::from_secs(5), serving).await.unwrap().unwrap();
    assert_eq!(outcome.unwrap(), ServeOutcome::Terminated);
    collector.stop().await.unwrap();
}

#[tokio::test]
async fn nothing_is_read_after_the_terminator() {
    let calls = Arc::new(AtomicU64::new(0));
    let server = ReplyServer::bind(&loopback(), finite_handler(2, Arc::clone(&calls)))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let mut state = server.watch_state();
    let serving = tokio::spawn(server.serve(CancellationToken::new()));

    let mut client = RequestClient::connect_to(addr).await.unwrap();
    assert!(!client.request(&Request::at(0)).await.unwrap().is_end());
    assert!(!client.request(&Request::at(1)).await.unwrap().is_end());
    assert_eq!(client.request(&Request::at(2)).await.unwrap(), Reply::End);

    let outcome = timeout(Duration::from_secs(5), serving).await.unwrap().unwrap();
    assert_eq!(outcome.unwrap(), ServeOutcome::Terminated);
    state
        .wait_for(|s| *s == ServerState::Terminated)
        .await
        .unwrap();

    // The session is over; a further request gets no reply at all.
    assert!(client.request(&Request::at(3)).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn cancel_while_awaiting_request_sends_nothing() {
    let calls = Arc::new(AtomicU64::new(0));
    let server = ReplyServer::bind(&loopback(), finite_handler(10, Arc::clone(&calls)))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let mut state = server.watch_state();
    assert_eq!(server.state(), ServerState::Idle);
    let cancel = CancellationToken::new();
    let serving = tokio::spawn(server.serve(cancel.clone()));

    let mut client = RequestClient::connect_to(addr).await.unwrap();
    state
        .wait_for(|s| *s == ServerState::AwaitingRequest)
        .await
        .unwrap();
    cancel.cancel();

    let outcome = timeout(Duration::from_secs(5), serving).await.unwrap().unwrap();
    assert_eq!(outcome.unwrap(), ServeOutcome::Cancelled);
    assert!(client.request(&Request::at(0)).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_before_any_client_returns_cleanly() {
    let server = ReplyServer::bind(&loopback(), finite_handler(1, Arc::default()))
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = server.serve(cancel).await.unwrap();
    assert_eq!(outcome, ServeOutcome::Cancelled);
}

#[tokio::test]
async fn handler_failure_ends_the_session() {
    let handler = |_request: Request| async { Err::<Reply, _>("source unavailable") };
    let server = ReplyServer::bind(&loopback(), handler).await.unwrap();
    let addr = server.local_addr().unwrap();
    let serving = tokio::spawn(server.serve(CancellationToken::new()));

    let mut client = RequestClient::connect_to(addr).await.unwrap();
    assert!(client.request(&Request::at(0)).await.is_err());

    let outcome = timeout(Duration::from_secs(5), serving).await.unwrap().unwrap();
    match outcome {
        Err(ChartError::Handler(msg)) => assert_eq!(msg, "source unavailable"),
        other => panic!("expected handler failure, got {:?}", other),
    }
}

#[tokio::test]
async fn cursor_keeps_failing_after_a_broken_session() {
    let handler = |_request: Request| async { Err::<Reply, _>("source unavailable") };
    let server = ReplyServer::bind(&loopback(), handler).await.unwrap();
    let addr = server.local_addr().unwrap();
    let serving = tokio::spawn(server.serve(CancellationToken::new()));

    let mut cursor = RecordCursor::new(RequestClient::connect_to(addr).await.unwrap());
    assert!(cursor.next_record().await.is_err());
    assert!(cursor.has_failed());
    assert!(!cursor.is_done());
    assert!(matches!(
        cursor.next_record().await,
        Err(ChartError::ConnectionClosed)
    ));
    assert_eq!(cursor.next_index(), 0);

    let outcome = timeout(Duration::from_secs(5), serving).await.unwrap().unwrap();
    assert!(matches!(outcome, Err(ChartError::Handler(_))));
}

#[tokio::test]
async fn non_finite_record_never_reaches_the_client() {
    let mut calls = 0u32;
    let producer = move || {
        calls += 1;
        let value = if calls == 2 { f64::INFINITY } else { 1.0 };
        Ok::<_, String>(Record::from([("v", value)]))
    };
    let mut collector = Collector::new(producer, Duration::from_millis(1));
    collector.start().unwrap();

    let finish = CancellationToken::new();
    let server = ReplyServer::bind(&loopback(), collector.reader().handler(finish.clone()))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let serving = tokio::spawn(server.serve(CancellationToken::new()));

    let mut cursor = RecordCursor::new(RequestClient::connect_to(addr).await.unwrap());
    let first = timeout(Duration::from_secs(5), cursor.next_record())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, Some(Record::from([("v", 1.0)])));

    let report = collector.stop().await.unwrap();
    assert_eq!(report.ticks, 1);
    assert!(report.failure.is_some());

    finish.cancel();
    assert_eq!(cursor.next_record().await.unwrap(), None);
    let outcome = timeout(Duration::from_secs(5), serving).await.unwrap().unwrap();
    assert_eq!(outcome.unwrap(), ServeOutcome::Terminated);
}

#[tokio::test]
async fn malformed_request_is_a_transport_failure() {
    let server = ReplyServer::bind(&loopback(), finite_handler(1, Arc::default()))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let serving = tokio::spawn(server.serve(CancellationToken::new()));

    let mut raw = TcpStream::connect(addr).await.unwrap();
    raw.write_all(b"{\"index\":\"zero\"}\n").await.unwrap();

    let outcome = timeout(Duration::from_secs(5), serving).await.unwrap().unwrap();
    assert!(matches!(outcome, Err(ChartError::Json(_))));
}

#[tokio::test]
async fn client_hangup_is_reported() {
    let server = ReplyServer::bind(&loopback(), finite_handler(1, Arc::default()))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let serving = tokio::spawn(server.serve(CancellationToken::new()));

    let client = RequestClient::connect_to(addr).await.unwrap();
    drop(client);

    let outcome = timeout(Duration::from_secs(5), serving).await.unwrap().unwrap();
    assert!(matches!(outcome, Err(ChartError::ConnectionClosed)));
}

#[test]
fn blocking_client_reads_until_terminator() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let server = runtime
        .block_on(ReplyServer::bind(&loopback(), finite_handler(3, Arc::default())))
        .unwrap();
    let addr = server.local_addr().unwrap();
    let serving = runtime.spawn(server.serve(CancellationToken::new()));

    let config = ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
    };
    let mut records = BlockingRequestClient::connect(&config).unwrap().into_records();
    let received: Vec<Record> = records.by_ref().map(Result::unwrap).collect();

    assert_eq!(
        received,
        (0..3)
            .map(|i| Record::from([("i", i as f64)]))
            .collect::<Vec<_>>()
    );
    assert_eq!(records.next_index(), 3);
    assert!(records.next().is_none());

    let outcome = runtime.block_on(serving).unwrap().unwrap();
    assert_eq!(outcome, ServeOutcome::Terminated);
}

#[test]
fn blocking_records_stop_after_a_failure() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let handler = |_request: Request| async { Err::<Reply, _>("source unavailable") };
    let server = runtime
        .block_on(ReplyServer::bind(&loopback(), handler))
        .unwrap();
    let addr = server.local_addr().unwrap();
    let serving = runtime.spawn(server.serve(CancellationToken::new()));

    let config = ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
    };
    let mut records = BlockingRequestClient::connect(&config).unwrap().into_records();
    assert!(matches!(records.next(), Some(Err(_))));
    assert!(records.next().is_none());

    assert!(runtime.block_on(serving).unwrap().is_err());
}
