//! 라이브 시세 패널.
//!
//! 구독 하나당 텔레그램 메시지 하나를 유지하면서 틱이 올 때마다 그 자리에서
//! 편집합니다. 첫 틱이 메시지를 만들고, 이후 틱은 같은 message_id를
//! 편집합니다. 차트가 붙은 뒤에는 본문 대신 캡션을 편집합니다.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::debug;

use coinwatch_core::{MarketTick, PriceDirection};
use coinwatch_exchange::{FeedError, FeedResult, TickSink};

use crate::error::{BotError, BotResult};
use crate::telegram::{InlineKeyboardButton, InlineKeyboardMarkup, TelegramApi};

/// 틱 하나를 패널 본문으로 그립니다.
///
/// 방향은 직전 종가와의 비교로 정해지고, 직전 종가가 없는 세션 첫 틱은
/// 중립으로 표시됩니다.
pub fn render(tick: &MarketTick, previous_close: Option<Decimal>) -> (String, PriceDirection) {
    let direction = PriceDirection::from_closes(previous_close, tick.close);
    let text = format!(
        "{}  ({})\n\
         ---------------------------------\n\
         Open : {}\n\
         Close : {}\n\
         High : {}\n\
         Low : {}\n\
         Volume : {}\n\
         Last : {}\n",
        tick.symbol, direction.glyph(), tick.open, tick.close, tick.high, tick.low, tick.volume,
        tick.last
    );
    (text, direction)
}

/// 라이브 메시지 추적 상태.
#[derive(Debug, Default)]
struct PanelState {
    /// 현재 구독의 라이브 메시지. 첫 틱이 채웁니다.
    message_id: Option<i64>,
    /// 차트가 메시지에 붙어 있는지 여부
    chart_attached: bool,
    /// 방향 계산용 직전 종가
    previous_close: Option<Decimal>,
    /// 마지막으로 성공적으로 그린 본문. 차트 첨부 시 캡션으로 옮깁니다.
    last_text: Option<String>,
}

/// 편집 제자리 표시 싱크.
pub struct LivePanel {
    api: TelegramApi,
    chat_id: i64,
    state: Mutex<PanelState>,
}

impl LivePanel {
    /// 새 패널을 생성합니다.
    pub fn new(api: TelegramApi, chat_id: i64) -> Self {
        Self {
            api,
            chat_id,
            state: Mutex::new(PanelState::default()),
        }
    }

    /// 차트가 이미 붙어 있는지 확인합니다.
    pub async fn chart_attached(&self) -> bool {
        self.state.lock().await.chart_attached
    }

    /// 라이브 메시지에 차트 사진을 붙이거나 교체합니다.
    ///
    /// 마지막 본문이 캡션으로 유지되고, 이후 키보드는 `Update`/`Close`로
    /// 바뀝니다. 라이브 메시지가 아직 없으면 실패합니다.
    pub async fn attach_chart(&self, png: Vec<u8>) -> BotResult<()> {
        let mut state = self.state.lock().await;
        let Some(message_id) = state.message_id else {
            return Err(BotError::Api("차트를 붙일 라이브 메시지가 없습니다".to_string()));
        };

        let keyboard = action_keyboard(true);
        let caption = state.last_text.clone().unwrap_or_default();
        self.api
            .edit_message_media_photo(self.chat_id, message_id, png, &caption, &keyboard)
            .await?;

        state.chart_attached = true;
        Ok(())
    }
}

#[async_trait]
impl TickSink for LivePanel {
    async fn publish(&self, tick: &MarketTick) -> FeedResult<()> {
        let mut state = self.state.lock().await;
        let (text, _direction) = render(tick, state.previous_close);
        let keyboard = action_keyboard(state.chart_attached);

        let outcome = match state.message_id {
            Some(message_id) if state.chart_attached => {
                self.api
                    .edit_message_caption(self.chat_id, message_id, &text, Some(&keyboard))
                    .await
            }
            Some(message_id) => {
                self.api
                    .edit_message_text(self.chat_id, message_id, &text, Some(&keyboard))
                    .await
            }
            None => match self
                .api
                .send_message(self.chat_id, &text, Some(&keyboard))
                .await
            {
                Ok(message_id) => {
                    debug!(message_id, symbol = %tick.symbol, "라이브 메시지 생성");
                    state.message_id = Some(message_id);
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };

        // 기준선은 마지막으로 본 종가를 따라간다. 표시에 실패한 틱도 본 것이다
        state.previous_close = Some(tick.close);

        match outcome {
            Ok(()) => {
                state.last_text = Some(text);
                Ok(())
            }
            Err(e) => Err(FeedError::Presentation(e.to_string())),
        }
    }

    async fn reset_baseline(&self) {
        self.state.lock().await.previous_close = None;
    }

    async fn reset(&self) {
        let mut state = self.state.lock().await;
        *state = PanelState::default();
    }
}

/// 라이브 메시지 하단의 액션 키보드.
///
/// 차트가 붙기 전에는 `Image`, 붙은 뒤에는 `Update`가 첫 버튼입니다.
/// `Close`는 항상 있습니다.
fn action_keyboard(chart_attached: bool) -> InlineKeyboardMarkup {
    let first = if chart_attached {
        InlineKeyboardButton::new("Update", "UpdateGraph")
    } else {
        InlineKeyboardButton::new("Image", "GraphImage")
    };

    InlineKeyboardMarkup {
        inline_keyboard: vec![vec![first, InlineKeyboardButton::new("Close", "CloseSocket")]],
    }
}
