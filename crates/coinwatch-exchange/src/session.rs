//! 구독 세션 관리자.
//!
//! 프로세스 전체에서 WebSocket 연결을 단 하나만 소유하는 컴포넌트입니다.
//! `select`로 심볼을 전환하면 기존 수신 루프를 취소하고 끝날 때까지
//! 기다린 뒤에야 새 연결을 열기 때문에, 두 루프가 같은 라이브 메시지를
//! 두고 경쟁하는 일이 없습니다.
//!
//! 실패 정책:
//! - 원격 종료: 고정 대기 후 같은 심볼로 무한 재연결 (유일한 재시도 대상)
//! - 그 외 프로토콜/디코딩 에러: 세션 중단, 사용자가 다시 선택해야 함
//! - 싱크 편집 실패: 고정 대기 후 계속, 해당 틱은 버림

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use coinwatch_core::{ExchangeSettings, MarketTick, SessionSettings, Symbol};

use crate::codec::{decode_frame, ControlFrame, DecodedFrame};
use crate::error::{FeedError, FeedResult};

/// 디코딩된 틱을 소비하는 프레젠테이션 싱크.
///
/// 세션은 싱크가 무엇을 그리는지 모릅니다. 편집 실패는
/// `FeedError::Presentation`으로 돌려주면 세션이 고정 대기 후 계속합니다.
#[async_trait]
pub trait TickSink: Send + Sync {
    /// 틱 한 건을 표시합니다. 실패한 틱은 버려집니다.
    async fn publish(&self, tick: &MarketTick) -> FeedResult<()>;

    /// 방향 기준선(직전 종가)만 초기화합니다. 재연결 직전에 호출됩니다.
    async fn reset_baseline(&self);

    /// 라이브 메시지 추적 상태 전체를 초기화합니다.
    /// 새 세션 시작과 세션 종료 시 호출됩니다.
    async fn reset(&self);
}

/// 세션 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 활성 구독 없음
    Disconnected,
    /// 연결/구독 진행 중
    Connecting,
    /// 구독 완료, 수신 루프 동작 중
    Subscribed,
    /// 종료 진행 중
    Closing,
}

/// 세션 설정.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// 시세 피드 WebSocket URL
    pub ws_url: String,
    /// 싱크로 보내는 틱 사이의 최소 간격
    pub publish_spacing: Duration,
    /// 원격 종료 후 재연결 대기 시간
    pub reconnect_delay: Duration,
    /// 싱크 편집 실패 후 대기 시간
    pub edit_retry_delay: Duration,
}

impl SessionConfig {
    /// 애플리케이션 설정에서 세션 설정을 만듭니다.
    pub fn from_settings(exchange: &ExchangeSettings, session: &SessionSettings) -> Self {
        Self {
            ws_url: exchange.ws_url.clone(),
            publish_spacing: session.publish_spacing(),
            reconnect_delay: session.reconnect_delay(),
            edit_retry_delay: session.edit_retry_delay(),
        }
    }
}

/// 실행 중인 수신 루프 핸들.
struct ActiveLoop {
    symbol: Symbol,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// 구독 세션.
///
/// 값 하나가 세션 전체의 단일 소유자입니다. 모든 변경은 `select`와
/// `close`를 통해서만 일어납니다.
pub struct SubscriptionSession {
    config: SessionConfig,
    sink: Arc<dyn TickSink>,
    state_tx: Arc<watch::Sender<SessionState>>,
    state_rx: watch::Receiver<SessionState>,
    active: Mutex<Option<ActiveLoop>>,
}

impl SubscriptionSession {
    /// 새 세션을 생성합니다. 초기 상태는 `Disconnected`입니다.
    pub fn new(config: SessionConfig, sink: Arc<dyn TickSink>) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        Self {
            config,
            sink,
            state_tx: Arc::new(state_tx),
            state_rx,
            active: Mutex::new(None),
        }
    }

    /// 현재 세션 상태.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// 상태 변화를 구독할 수 있는 watch 채널.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// 현재 구독 중인 심볼.
    pub async fn current_symbol(&self) -> Option<Symbol> {
        self.active.lock().await.as_ref().map(|a| a.symbol.clone())
    }

    /// 새 심볼 구독으로 전환합니다.
    ///
    /// 기존 수신 루프가 있으면 취소하고 완전히 끝난 뒤에 새 루프를
    /// 시작합니다. 싱크 상태(직전 종가, 라이브 메시지)도 초기화됩니다.
    pub async fn select(&self, symbol: Symbol) {
        info!(%symbol, "Switching subscription");
        let mut active = self.active.lock().await;
        self.teardown(active.take()).await;
        self.sink.reset().await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(receive_loop(
            self.config.clone(),
            symbol.clone(),
            Arc::clone(&self.sink),
            Arc::clone(&self.state_tx),
            cancel.clone(),
        ));

        *active = Some(ActiveLoop {
            symbol,
            cancel,
            handle,
        });
    }

    /// 구독을 종료합니다.
    ///
    /// 수신 루프가 종료 경로에서 구독 해제 프레임을 보내고 소켓을 닫은 뒤,
    /// 싱크 상태가 초기화됩니다. 활성 구독이 없으면 아무 일도 하지 않습니다.
    pub async fn close(&self) {
        info!("Closing subscription");
        let mut active = self.active.lock().await;
        self.teardown(active.take()).await;
        self.sink.reset().await;
    }

    /// 수신 루프를 취소하고 끝날 때까지 기다립니다.
    ///
    /// 호출자가 `active` 잠금을 쥔 채로 슬롯에서 꺼낸 값을 넘깁니다.
    /// 꺼내기부터 새 루프 저장까지 같은 잠금 아래에서 일어나야 동시
    /// `select`가 상대의 루프를 고아로 남기지 못합니다.
    async fn teardown(&self, active: Option<ActiveLoop>) {
        if let Some(active) = active {
            let _ = self.state_tx.send(SessionState::Closing);
            active.cancel.cancel();
            if active.handle.await.is_err() {
                error!("Receive loop task panicked during teardown");
            }
            let _ = self.state_tx.send(SessionState::Disconnected);
        }
    }
}

/// 한 구독의 수신 루프.
///
/// 원격 종료는 재연결하고, 그 외 에러는 세션을 끝냅니다.
async fn receive_loop(
    config: SessionConfig,
    symbol: Symbol,
    sink: Arc<dyn TickSink>,
    state: Arc<watch::Sender<SessionState>>,
    cancel: CancellationToken,
) {
    loop {
        match run_connection(&config, &symbol, sink.as_ref(), &state, &cancel).await {
            Ok(()) => {
                info!(%symbol, "Subscription closed");
                break;
            }
            Err(e) if e.is_transient() => {
                warn!(
                    %symbol,
                    error = %e,
                    delay_secs = config.reconnect_delay.as_secs(),
                    "Feed closed by remote, reconnecting"
                );
                let _ = state.send(SessionState::Connecting);
                // 재연결 후 첫 틱은 방향 없이 표시된다
                sink.reset_baseline().await;

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(config.reconnect_delay) => {}
                }
            }
            Err(e) => {
                error!(%symbol, error = %e, "Feed error, abandoning subscription");
                break;
            }
        }
    }

    let _ = state.send(SessionState::Disconnected);
}

/// 연결 한 번의 수명: 연결, 구독, 수신, 종료.
///
/// `Ok(())`는 취소로 인한 정상 종료, `Err`는 원인을 담은 종료입니다.
async fn run_connection(
    config: &SessionConfig,
    symbol: &Symbol,
    sink: &dyn TickSink,
    state: &watch::Sender<SessionState>,
    cancel: &CancellationToken,
) -> FeedResult<()> {
    let _ = state.send(SessionState::Connecting);
    info!(%symbol, url = %config.ws_url, "Connecting to market feed");

    let (ws_stream, _) = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        conn = connect_async(config.ws_url.as_str()) => {
            conn.map_err(|e| FeedError::WebSocket(format!("연결 실패: {}", e)))?
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let mut frame_id: u64 = 1;
    let subscribe = ControlFrame::subscribe(frame_id, symbol).to_json()?;
    write
        .send(Message::Text(subscribe))
        .await
        .map_err(|e| FeedError::Subscribe(format!("구독 프레임 전송 실패: {}", e)))?;

    let _ = state.send(SessionState::Subscribed);
    info!(%symbol, "Subscribed to market channel");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // 종료 경로: 구독 해제 후 소켓 닫기, 둘 다 best-effort
                frame_id += 1;
                if let Ok(frame) = ControlFrame::unsubscribe(frame_id, symbol).to_json() {
                    let _ = write.send(Message::Text(frame)).await;
                }
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match decode_frame(&text)? {
                            DecodedFrame::Tick(tick) => {
                                publish_tick(config, sink, cancel, &tick).await;
                            }
                            DecodedFrame::NotATick => {
                                debug!("Skipping non-tick frame");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        return Err(FeedError::ConnectionClosed(
                            "서버가 연결을 종료함".to_string(),
                        ));
                    }
                    Some(Err(e)) => {
                        return Err(classify_transport_error(e));
                    }
                    None => {
                        return Err(FeedError::ConnectionClosed("스트림 종료".to_string()));
                    }
                    _ => {}
                }
            }
        }
    }
}

/// 틱 한 건을 싱크로 보내고 다음 틱까지의 간격을 지킵니다.
///
/// 편집 실패는 경고만 남기고 고정 대기 후 계속합니다. 대기 중 취소되면
/// 다음 루프 반복에서 종료 경로를 탑니다.
async fn publish_tick(
    config: &SessionConfig,
    sink: &dyn TickSink,
    cancel: &CancellationToken,
    tick: &MarketTick,
) {
    let delay = match sink.publish(tick).await {
        Ok(()) => config.publish_spacing,
        Err(e) => {
            warn!(error = %e, "Live message update failed, backing off");
            config.edit_retry_delay
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(delay) => {}
    }
}

/// WebSocket 전송 에러를 피드 에러로 분류합니다.
///
/// 종료/IO 계열과 클로즈 핸드셰이크 없는 TCP 끊김은 원격 종료(재시도
/// 대상)로, 그 외 프로토콜 위반은 치명적 에러로 분류합니다. 서버 재시작이나
/// LB 전환은 보통 close 프레임 없이 스트림만 끊기므로
/// `ResetWithoutClosingHandshake`로 도착합니다.
fn classify_transport_error(err: tungstenite::Error) -> FeedError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            FeedError::ConnectionClosed("연결 종료됨".to_string())
        }
        tungstenite::Error::Io(e) => FeedError::ConnectionClosed(format!("io error: {}", e)),
        tungstenite::Error::Protocol(
            tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
        ) => FeedError::ConnectionClosed("클로즈 핸드셰이크 없이 끊김".to_string()),
        other => FeedError::WebSocket(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_close_as_transient() {
        let err = classify_transport_error(tungstenite::Error::ConnectionClosed);
        assert!(err.is_transient());

        let io = classify_transport_error(tungstenite::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        )));
        assert!(io.is_transient());
    }

    #[test]
    fn test_classify_dirty_drop_as_transient() {
        // TCP ended without a close frame, the usual server-restart shape
        let err = classify_transport_error(tungstenite::Error::Protocol(
            tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
        ));
        assert!(err.is_transient());
        assert!(matches!(err, FeedError::ConnectionClosed(_)));
    }

    #[test]
    fn test_classify_protocol_error_as_fatal() {
        let err = classify_transport_error(tungstenite::Error::Utf8);
        assert!(!err.is_transient());
        assert!(matches!(err, FeedError::WebSocket(_)));

        let err = classify_transport_error(tungstenite::Error::Protocol(
            tungstenite::error::ProtocolError::ReceivedAfterClosing,
        ));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_session_config_from_settings() {
        let exchange = ExchangeSettings::default();
        let session = SessionSettings::default();
        let config = SessionConfig::from_settings(&exchange, &session);

        assert_eq!(config.ws_url, "wss://api.whitebit.com/ws");
        assert_eq!(config.publish_spacing, Duration::from_secs(2));
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.edit_retry_delay, Duration::from_secs(30));
    }
}
