//! 명령어/콜백 라우터.
//!
//! long polling으로 업데이트를 받아 세션과 패널 작업으로 변환합니다.
//! - `/start` - 인사
//! - `/coins` - 코인 선택기 표시
//! - 콜백: 페이지 이동, 코인 선택, 차트 첨부/갱신, 구독 종료

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use coinwatch_core::Symbol;
use coinwatch_exchange::{SubscriptionSession, WhitebitClient};

use crate::error::BotResult;
use crate::panel::LivePanel;
use crate::picker;
use crate::telegram::{CallbackQuery, Message, TelegramApi, Update};

/// 선택기 메시지 본문.
const PICKER_PROMPT: &str = "Choose a coin:";

/// 폴링 실패 후 재시도 대기 시간.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// 봇 명령어.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 인사말
    Start,
    /// 코인 선택기 표시
    Coins,
    /// 알 수 없는 입력
    Unknown(String),
}

impl Command {
    /// 메시지 텍스트에서 명령어를 파싱합니다.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if !text.starts_with('/') {
            return Command::Unknown(text.to_string());
        }

        // "/coins@botname" 형태도 허용
        let command = text[1..]
            .split_whitespace()
            .next()
            .and_then(|token| token.split('@').next())
            .map(|s| s.to_lowercase());

        match command.as_deref() {
            Some("start") => Command::Start,
            Some("coins") => Command::Coins,
            _ => Command::Unknown(text.to_string()),
        }
    }
}

/// 인라인 키보드 콜백 동작.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// 선택기 다음 페이지
    NextPage,
    /// 선택기 이전 페이지
    PreviousPage,
    /// 라이브 메시지 삭제 후 구독 종료
    CloseSocket,
    /// 차트 첨부 (아직 없을 때만)
    ShowChart,
    /// 차트 갱신
    RefreshChart,
    /// 심볼 구독 시작
    Select(Symbol),
}

impl CallbackAction {
    /// 콜백 데이터에서 동작을 파싱합니다.
    ///
    /// 예약어가 아닌 데이터는 전부 심볼 선택으로 봅니다.
    pub fn parse(data: &str) -> Self {
        match data {
            "Next" => CallbackAction::NextPage,
            "Previous" => CallbackAction::PreviousPage,
            "CloseSocket" => CallbackAction::CloseSocket,
            "GraphImage" => CallbackAction::ShowChart,
            "UpdateGraph" => CallbackAction::RefreshChart,
            symbol => CallbackAction::Select(Symbol::new(symbol)),
        }
    }
}

/// 업데이트 디스패처.
///
/// 설정된 채팅 하나만 상대합니다. 다른 채팅의 업데이트는 무시합니다.
pub struct BotRouter {
    api: TelegramApi,
    exchange: WhitebitClient,
    panel: Arc<LivePanel>,
    session: SubscriptionSession,
    chat_id: i64,
    last_update_id: RwLock<i64>,
    cursor: RwLock<usize>,
}

impl BotRouter {
    /// 새 라우터를 생성합니다.
    pub fn new(
        api: TelegramApi,
        exchange: WhitebitClient,
        panel: Arc<LivePanel>,
        session: SubscriptionSession,
        chat_id: i64,
    ) -> Self {
        Self {
            api,
            exchange,
            panel,
            session,
            chat_id,
            last_update_id: RwLock::new(0),
            cursor: RwLock::new(0),
        }
    }

    /// 종료 신호가 올 때까지 업데이트를 처리합니다.
    ///
    /// 종료 시 활성 구독도 함께 닫습니다.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("텔레그램 봇 폴링 시작");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = self.poll_updates() => match polled {
                    Ok(updates) => {
                        for update in updates {
                            if let Err(e) = self.dispatch(update).await {
                                error!(error = %e, "업데이트 처리 실패");
                            }
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "업데이트 폴링 실패");
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                        }
                    }
                }
            }
        }

        info!("폴링 종료, 구독 정리 중");
        self.session.close().await;
    }

    /// 업데이트를 폴링하고 오프셋을 갱신합니다.
    async fn poll_updates(&self) -> BotResult<Vec<Update>> {
        let last_id = *self.last_update_id.read().await;
        let updates = self.api.get_updates(last_id + 1).await?;

        if let Some(last) = updates.last() {
            *self.last_update_id.write().await = last.update_id;
        }

        Ok(updates)
    }

    async fn dispatch(&self, update: Update) -> BotResult<()> {
        if let Some(message) = update.message {
            self.handle_message(message).await?;
        } else if let Some(callback) = update.callback_query {
            self.handle_callback(callback).await?;
        }
        Ok(())
    }

    async fn handle_message(&self, message: Message) -> BotResult<()> {
        if message.chat.id != self.chat_id {
            warn!(chat_id = message.chat.id, "허용되지 않은 채팅에서 메시지 수신");
            return Ok(());
        }
        let Some(text) = message.text else {
            return Ok(());
        };

        match Command::parse(&text) {
            Command::Start => {
                let name = message
                    .from
                    .map(|user| user.first_name)
                    .unwrap_or_else(|| "there".to_string());
                self.api
                    .send_message(self.chat_id, &format!("Hello {name}!"), None)
                    .await?;
            }
            Command::Coins => {
                // 선택기는 항상 첫 페이지부터 시작한다
                *self.cursor.write().await = 0;
                let symbols = self.load_catalog().await;
                let keyboard = picker::keyboard(&symbols, 0);
                self.api
                    .send_message(self.chat_id, PICKER_PROMPT, Some(&keyboard))
                    .await?;
            }
            Command::Unknown(text) => {
                debug!(text = %text, "알 수 없는 명령어 무시");
            }
        }
        Ok(())
    }

    async fn handle_callback(&self, callback: CallbackQuery) -> BotResult<()> {
        // 어떤 경로로 끝나든 클라이언트의 로딩 표시는 멈춘다
        if let Err(e) = self.api.answer_callback_query(&callback.id).await {
            debug!(error = %e, "콜백 확인 응답 실패");
        }

        let Some(message) = callback.message else {
            return Ok(());
        };
        if message.chat.id != self.chat_id {
            warn!(chat_id = message.chat.id, "허용되지 않은 채팅에서 콜백 수신");
            return Ok(());
        }
        let Some(data) = callback.data else {
            return Ok(());
        };

        match CallbackAction::parse(&data) {
            CallbackAction::NextPage => self.turn_page(message.message_id, true).await?,
            CallbackAction::PreviousPage => self.turn_page(message.message_id, false).await?,
            CallbackAction::CloseSocket => {
                if let Err(e) = self.api.delete_message(self.chat_id, message.message_id).await {
                    warn!(error = %e, "라이브 메시지 삭제 실패");
                }
                self.session.close().await;
            }
            CallbackAction::ShowChart => {
                if !self.panel.chart_attached().await {
                    self.show_chart().await;
                }
            }
            CallbackAction::RefreshChart => self.show_chart().await,
            CallbackAction::Select(symbol) => self.select_symbol(symbol).await,
        }
        Ok(())
    }

    /// 선택기 페이지를 한 장 넘기고 같은 메시지를 편집합니다.
    async fn turn_page(&self, message_id: i64, forward: bool) -> BotResult<()> {
        let symbols = self.load_catalog().await;

        let mut cursor = self.cursor.write().await;
        let current = picker::clamp(*cursor, symbols.len());
        *cursor = if forward {
            picker::advance(current, symbols.len())
        } else {
            picker::retreat(current)
        };

        let keyboard = picker::keyboard(&symbols, *cursor);
        self.api
            .edit_message_text(self.chat_id, message_id, PICKER_PROMPT, Some(&keyboard))
            .await?;
        Ok(())
    }

    /// 현재 심볼의 차트를 받아 라이브 메시지에 붙입니다.
    ///
    /// 어느 단계가 실패하든 메시지는 그대로 두고 경고만 남깁니다.
    async fn show_chart(&self) {
        let Some(symbol) = self.session.current_symbol().await else {
            debug!("활성 구독이 없어 차트 요청 무시");
            return;
        };

        match self.exchange.chart_snapshot(&symbol).await {
            Ok(png) => {
                if let Err(e) = self.panel.attach_chart(png).await {
                    warn!(%symbol, error = %e, "차트 첨부 실패");
                }
            }
            Err(e) => warn!(%symbol, error = %e, "차트 조회 실패"),
        }
    }

    /// 카탈로그에 있는 심볼이면 구독을 전환합니다.
    async fn select_symbol(&self, symbol: Symbol) {
        match self.exchange.fetch_symbols().await {
            Ok(symbols) if !symbols.contains(&symbol) => {
                debug!(%symbol, "카탈로그에 없는 콜백 데이터 무시");
                return;
            }
            Ok(_) => {}
            // 카탈로그를 확인할 수 없으면 구독 시도는 막지 않는다
            Err(e) => warn!(error = %e, "심볼 검증 실패"),
        }

        info!(%symbol, "코인 선택");
        self.session.select(symbol).await;
    }

    /// 카탈로그를 가져옵니다. 실패하면 빈 선택기를 보여줍니다.
    async fn load_catalog(&self) -> Vec<Symbol> {
        match self.exchange.fetch_symbols().await {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!(error = %e, "코인 목록 조회 실패");
                Vec::new()
            }
        }
    }
}
