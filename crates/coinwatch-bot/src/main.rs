//! WhiteBit 시세 텔레그램 봇.
//!
//! 설정을 로드하고 텔레그램 클라이언트, 거래소 클라이언트, 라이브 패널,
//! 구독 세션을 묶어 폴링 루프를 시작합니다.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use coinwatch_bot::panel::LivePanel;
use coinwatch_bot::router::BotRouter;
use coinwatch_bot::telegram::TelegramApi;
use coinwatch_core::config::AppConfig;
use coinwatch_core::logging::{init_logging, LogConfig};
use coinwatch_exchange::{SessionConfig, SubscriptionSession, WhitebitClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    let config = AppConfig::load().context("설정을 불러오지 못했습니다")?;

    init_logging(LogConfig::from_settings(&config.logging))
        .map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {e}"))?;

    info!(chat_id = config.telegram.chat_id, "coinwatch 시작");

    let api = TelegramApi::new(&config.telegram).context("텔레그램 클라이언트 생성 실패")?;
    let exchange = WhitebitClient::new(&config.exchange).context("거래소 클라이언트 생성 실패")?;

    let panel = Arc::new(LivePanel::new(api.clone(), config.telegram.chat_id));
    let session = SubscriptionSession::new(
        SessionConfig::from_settings(&config.exchange, &config.session),
        panel.clone(),
    );
    let router = BotRouter::new(api, exchange, panel, session, config.telegram.chat_id);

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    router.run(shutdown).await;

    info!("coinwatch 종료");
    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM 시그널을 수신하면 종료 토큰을 취소합니다.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Ctrl+C 수신, 종료를 시작합니다");
        }
        _ = terminate => {
            warn!("SIGTERM 수신, 종료를 시작합니다");
        }
    }

    shutdown.cancel();
}
