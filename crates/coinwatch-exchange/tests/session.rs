//! Integration tests for the subscription session against a local feed server.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

use coinwatch_core::{MarketTick, Symbol};
use coinwatch_exchange::{
    FeedError, FeedResult, SessionConfig, SessionState, SubscriptionSession, TickSink,
};

/// Recording sink that captures everything the session publishes.
#[derive(Default)]
struct RecordingSink {
    ticks: Mutex<Vec<MarketTick>>,
    baseline_resets: AtomicUsize,
    resets: AtomicUsize,
    fail_next_publish: AtomicBool,
}

#[async_trait]
impl TickSink for RecordingSink {
    async fn publish(&self, tick: &MarketTick) -> FeedResult<()> {
        if self.fail_next_publish.swap(false, Ordering::SeqCst) {
            return Err(FeedError::Presentation("simulated edit failure".to_string()));
        }
        self.ticks.lock().await.push(tick.clone());
        Ok(())
    }

    async fn reset_baseline(&self) {
        self.baseline_resets.fetch_add(1, Ordering::SeqCst);
    }

    async fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

fn fast_config(ws_url: String) -> SessionConfig {
    SessionConfig {
        ws_url,
        publish_spacing: Duration::from_millis(10),
        reconnect_delay: Duration::from_millis(50),
        edit_retry_delay: Duration::from_millis(10),
    }
}

fn tick_frame(pair: &str, close: &str) -> String {
    format!(
        r#"{{"id":null,"method":"market_update","params":["{pair}",{{"open":"100","close":"{close}","high":"101","low":"94","volume":"10","last":"{close}"}}]}}"#
    )
}

async fn recv_frame(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("server frame channel closed")
}

async fn wait_for_state(
    rx: &mut tokio::sync::watch::Receiver<SessionState>,
    want: SessionState,
) {
    tokio::time::timeout(Duration::from_secs(3), rx.wait_for(|s| *s == want))
        .await
        .expect("timed out waiting for session state")
        .expect("state channel closed");
}

async fn wait_until<F, Fut>(mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if cond().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

/// Checks that `expected` appears in `states` as an ordered subsequence.
fn contains_in_order(states: &[SessionState], expected: &[SessionState]) -> bool {
    let mut it = states.iter();
    expected.iter().all(|want| it.any(|s| s == want))
}

/// Ticks reach the sink, and close() sends an unsubscribe frame.
#[tokio::test]
async fn test_ticks_flow_and_close_unsubscribes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");

        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let _ = frames_tx.send(text);
        }

        // Subscribe ack (not a tick) followed by two ticks
        let ack = r#"{"id":1,"result":{"status":"success"},"error":null}"#.to_string();
        let _ = ws.send(Message::Text(ack)).await;
        let _ = ws.send(Message::Text(tick_frame("BTC_USDT", "95"))).await;
        let _ = ws.send(Message::Text(tick_frame("BTC_USDT", "96"))).await;

        // Forward whatever the client sends on its way out
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let _ = frames_tx.send(text);
            }
        }
    });

    let sink = Arc::new(RecordingSink::default());
    let session = SubscriptionSession::new(fast_config(format!("ws://{}", addr)), sink.clone());
    let mut state = session.watch_state();

    session.select(Symbol::new("BTC_USDT")).await;
    wait_for_state(&mut state, SessionState::Subscribed).await;

    let subscribe = recv_frame(&mut frames_rx).await;
    assert!(subscribe.contains("market_subscribe"));
    assert!(subscribe.contains("BTC_USDT"));

    wait_until(|| async { sink.ticks.lock().await.len() >= 2 }).await;

    session.close().await;
    assert_eq!(session.state(), SessionState::Disconnected);

    let unsubscribe = recv_frame(&mut frames_rx).await;
    assert!(unsubscribe.contains("market_unsubscribe"));
    assert!(unsubscribe.contains("BTC_USDT"));

    let ticks = sink.ticks.lock().await;
    assert_eq!(ticks[0].close, "95".parse().unwrap());
    assert_eq!(ticks[1].close, "96".parse().unwrap());
    // close() wipes sink state exactly once on top of the select() reset
    assert_eq!(sink.resets.load(Ordering::SeqCst), 2);
}

/// A remote close leads to a reconnect for the same symbol, passing through
/// Connecting, with the direction baseline reset in between.
#[tokio::test]
async fn test_remote_close_reconnects_same_symbol() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        // First connection: one tick, then the server closes
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let _ = frames_tx.send(text);
        }
        let _ = ws.send(Message::Text(tick_frame("BTC_USDT", "95"))).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = ws.close(None).await;

        // Second connection: the session must re-subscribe on its own
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let _ = frames_tx.send(text);
        }
        let _ = ws.send(Message::Text(tick_frame("BTC_USDT", "96"))).await;
        while ws.next().await.is_some() {}
    });

    let sink = Arc::new(RecordingSink::default());
    let session = SubscriptionSession::new(fast_config(format!("ws://{}", addr)), sink.clone());

    let mut state_rx = session.watch_state();
    let transitions = Arc::new(Mutex::new(vec![*state_rx.borrow()]));
    let collector = transitions.clone();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let current = *state_rx.borrow_and_update();
            collector.lock().await.push(current);
        }
    });

    session.select(Symbol::new("BTC_USDT")).await;

    let first = recv_frame(&mut frames_rx).await;
    assert!(first.contains("market_subscribe"));
    let second = recv_frame(&mut frames_rx).await;
    assert!(second.contains("market_subscribe"));
    assert!(second.contains("BTC_USDT"));

    wait_until(|| async { sink.ticks.lock().await.len() >= 2 }).await;

    assert!(sink.baseline_resets.load(Ordering::SeqCst) >= 1);
    assert_eq!(session.state(), SessionState::Subscribed);

    let seen = transitions.lock().await.clone();
    assert!(
        contains_in_order(
            &seen,
            &[
                SessionState::Subscribed,
                SessionState::Connecting,
                SessionState::Subscribed,
            ]
        ),
        "expected a reconnect cycle, saw {:?}",
        seen
    );

    session.close().await;
}

/// A TCP drop with no close handshake counts as a remote close: the session
/// redials the same symbol instead of going dark.
#[tokio::test]
async fn test_dirty_drop_reconnects_same_symbol() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        // First connection: one tick, then the socket is dropped outright,
        // no close frame
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let _ = frames_tx.send(text);
        }
        let _ = ws.send(Message::Text(tick_frame("BTC_USDT", "95"))).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(ws);

        // Second connection: the session must re-subscribe on its own
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let _ = frames_tx.send(text);
        }
        let _ = ws.send(Message::Text(tick_frame("BTC_USDT", "96"))).await;
        while ws.next().await.is_some() {}
    });

    let sink = Arc::new(RecordingSink::default());
    let session = SubscriptionSession::new(fast_config(format!("ws://{}", addr)), sink.clone());

    let mut state_rx = session.watch_state();
    let transitions = Arc::new(Mutex::new(vec![*state_rx.borrow()]));
    let collector = transitions.clone();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let current = *state_rx.borrow_and_update();
            collector.lock().await.push(current);
        }
    });

    session.select(Symbol::new("BTC_USDT")).await;

    let first = recv_frame(&mut frames_rx).await;
    assert!(first.contains("market_subscribe"));
    let second = recv_frame(&mut frames_rx).await;
    assert!(second.contains("market_subscribe"));
    assert!(second.contains("BTC_USDT"));

    wait_until(|| async { sink.ticks.lock().await.len() >= 2 }).await;

    assert!(sink.baseline_resets.load(Ordering::SeqCst) >= 1);
    assert_eq!(session.state(), SessionState::Subscribed);

    let seen = transitions.lock().await.clone();
    assert!(
        contains_in_order(
            &seen,
            &[
                SessionState::Subscribed,
                SessionState::Connecting,
                SessionState::Subscribed,
            ]
        ),
        "expected a redial after the dirty drop, saw {:?}",
        seen
    );

    session.close().await;
}

/// select(B) right after select(A) never renders an A tick after B is active.
#[tokio::test]
async fn test_switching_symbols_leaks_no_stale_ticks() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        // First connection streams A ticks until the client goes away
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        let _ = ws.next().await;
        loop {
            if ws
                .send(Message::Text(tick_frame("AAA_USDT", "1")))
                .await
                .is_err()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Second connection streams B ticks
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        let _ = ws.next().await;
        for _ in 0..5 {
            if ws
                .send(Message::Text(tick_frame("BBB_USDT", "2")))
                .await
                .is_err()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        while ws.next().await.is_some() {}
    });

    let sink = Arc::new(RecordingSink::default());
    let session = SubscriptionSession::new(fast_config(format!("ws://{}", addr)), sink.clone());

    session.select(Symbol::new("AAA_USDT")).await;
    wait_until(|| async { !sink.ticks.lock().await.is_empty() }).await;

    session.select(Symbol::new("BBB_USDT")).await;
    wait_until(|| async {
        sink.ticks
            .lock()
            .await
            .iter()
            .any(|t| t.symbol == Symbol::new("BBB_USDT"))
    })
    .await;

    session.close().await;

    let ticks = sink.ticks.lock().await;
    let first_b = ticks
        .iter()
        .position(|t| t.symbol == Symbol::new("BBB_USDT"))
        .expect("no B tick recorded");
    assert!(
        ticks[first_b..]
            .iter()
            .all(|t| t.symbol == Symbol::new("BBB_USDT")),
        "stale A tick rendered after B became active"
    );
}

/// Concurrent select() calls against a running loop serialize: the losing
/// call's loop is torn down, never left orphaned with a live connection.
#[tokio::test]
async fn test_concurrent_selects_leave_single_loop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let live = Arc::new(AtomicUsize::new(0));

    tokio::spawn({
        let live = live.clone();
        async move {
            loop {
                let (stream, _) = listener.accept().await.expect("accept");
                let live = live.clone();
                tokio::spawn(async move {
                    let mut ws = accept_async(stream).await.expect("handshake");
                    live.fetch_add(1, Ordering::SeqCst);
                    while let Some(Ok(msg)) = ws.next().await {
                        if matches!(msg, Message::Close(_)) {
                            break;
                        }
                    }
                    live.fetch_sub(1, Ordering::SeqCst);
                });
            }
        }
    });

    let sink = Arc::new(RecordingSink::default());
    let session = SubscriptionSession::new(fast_config(format!("ws://{}", addr)), sink.clone());
    let mut state = session.watch_state();

    // A running loop first, so both racers have something to replace
    session.select(Symbol::new("AAA_USDT")).await;
    wait_for_state(&mut state, SessionState::Subscribed).await;

    tokio::join!(
        session.select(Symbol::new("BBB_USDT")),
        session.select(Symbol::new("CCC_USDT"))
    );
    wait_for_state(&mut state, SessionState::Subscribed).await;

    // Whichever call won, exactly one loop and one connection survive
    wait_until(|| async { live.load(Ordering::SeqCst) == 1 }).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(live.load(Ordering::SeqCst), 1);

    let current = session
        .current_symbol()
        .await
        .expect("no active subscription");
    assert!(current == Symbol::new("BBB_USDT") || current == Symbol::new("CCC_USDT"));

    session.close().await;
    wait_until(|| async { live.load(Ordering::SeqCst) == 0 }).await;
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.current_symbol().await.is_none());
}

/// A malformed tick is fatal: the session disconnects and does not reconnect.
#[tokio::test]
async fn test_decode_error_is_fatal_no_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let accepts = Arc::new(AtomicUsize::new(0));

    tokio::spawn({
        let accepts = accepts.clone();
        async move {
            loop {
                let (stream, _) = listener.accept().await.expect("accept");
                accepts.fetch_add(1, Ordering::SeqCst);
                let mut ws = accept_async(stream).await.expect("handshake");
                let _ = ws.next().await;

                let bad = r#"{"params":["BTC_USDT",{"open":"100","close":"abc","high":"101","low":"94","volume":"10","last":"95"}]}"#.to_string();
                let _ = ws.send(Message::Text(bad)).await;
                while ws.next().await.is_some() {}
            }
        }
    });

    let sink = Arc::new(RecordingSink::default());
    let session = SubscriptionSession::new(fast_config(format!("ws://{}", addr)), sink.clone());

    session.select(Symbol::new("BTC_USDT")).await;

    // Once the server has accepted, the session is past its initial
    // Disconnected state, so reaching Disconnected again means loop exit
    wait_until(|| async { accepts.load(Ordering::SeqCst) >= 1 }).await;
    wait_until(|| async { session.state() == SessionState::Disconnected }).await;

    // Longer than the reconnect delay: a transient error would have redialed
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(accepts.load(Ordering::SeqCst), 1);
    assert!(sink.ticks.lock().await.is_empty());
}

/// A failed publish drops that tick and keeps the subscription alive.
#[tokio::test]
async fn test_publish_failure_drops_tick_and_continues() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        let _ = ws.next().await;
        let _ = ws.send(Message::Text(tick_frame("BTC_USDT", "95"))).await;
        let _ = ws.send(Message::Text(tick_frame("BTC_USDT", "96"))).await;
        while ws.next().await.is_some() {}
    });

    let sink = Arc::new(RecordingSink::default());
    sink.fail_next_publish.store(true, Ordering::SeqCst);

    let session = SubscriptionSession::new(fast_config(format!("ws://{}", addr)), sink.clone());
    let mut state = session.watch_state();

    session.select(Symbol::new("BTC_USDT")).await;
    wait_for_state(&mut state, SessionState::Subscribed).await;

    wait_until(|| async { sink.ticks.lock().await.len() >= 1 }).await;

    // The failed tick (close 95) was dropped, not queued
    let ticks = sink.ticks.lock().await.clone();
    assert_eq!(ticks.len(), 1);
    assert_eq!(ticks[0].close, "96".parse().unwrap());
    assert_eq!(session.state(), SessionState::Subscribed);

    session.close().await;
}
