//! 텔레그램 Bot API 클라이언트.
//!
//! 라이브 패널과 코인 선택기에 필요한 만큼의 API 표면을 raw HTTP로
//! 감쌉니다. 응답은 전부 타입이 있는 envelope으로 해석합니다.

use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use coinwatch_core::TelegramSettings;

use crate::error::{BotError, BotResult};

/// getUpdates long polling 대기 시간 (초).
const LONG_POLL_TIMEOUT_SECS: u64 = 30;

/// long polling을 제외한 요청의 타임아웃.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 차트 업로드 시 multipart 파트 이름.
const CHART_PART_NAME: &str = "chart";

// ============================================================================
// 응답 envelope
// ============================================================================

/// Bot API 공통 응답 틀.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// 업데이트 하나.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// 수신 메시지 및 send/edit 계열 응답의 메시지.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

/// 채팅 정보.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// 사용자 정보.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
}

/// 인라인 키보드 버튼 콜백.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

// ============================================================================
// 인라인 키보드
// ============================================================================

/// 인라인 키보드 마크업.
#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

/// 콜백 데이터를 가진 인라인 버튼.
#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboardButton {
    /// 버튼을 생성합니다.
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

// ============================================================================
// 클라이언트
// ============================================================================

/// Bot API 클라이언트.
#[derive(Clone)]
pub struct TelegramApi {
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl fmt::Debug for TelegramApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramApi")
            .field("token", &"***")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl TelegramApi {
    /// 설정에서 클라이언트를 생성합니다.
    pub fn new(settings: &TelegramSettings) -> BotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            token: settings.bot_token.clone(),
            base_url: settings.api_base_url.clone(),
            client,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// 업데이트를 long polling으로 가져옵니다.
    ///
    /// `offset`은 마지막으로 처리한 update_id + 1을 넘겨야 같은 업데이트가
    /// 두 번 배달되지 않습니다.
    pub async fn get_updates(&self, offset: i64) -> BotResult<Vec<Update>> {
        let params = serde_json::json!({
            "offset": offset,
            "timeout": LONG_POLL_TIMEOUT_SECS,
            "allowed_updates": ["message", "callback_query"],
        });

        // 서버측 long poll보다 약간 길게 기다린다
        let response = self
            .client
            .post(self.method_url("getUpdates"))
            .json(&params)
            .timeout(Duration::from_secs(LONG_POLL_TIMEOUT_SECS + 5))
            .send()
            .await?;

        self.read_response("getUpdates", response).await
    }

    /// 메시지를 보내고 message_id를 반환합니다.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> BotResult<i64> {
        let mut params = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(keyboard) = reply_markup {
            params["reply_markup"] = serde_json::to_value(keyboard)?;
        }

        let message: Message = self.call("sendMessage", &params).await?;
        Ok(message.message_id)
    }

    /// 기존 메시지의 본문과 키보드를 교체합니다.
    ///
    /// 같은 내용으로의 편집은 성공으로 취급합니다.
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> BotResult<()> {
        let mut params = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        if let Some(keyboard) = reply_markup {
            params["reply_markup"] = serde_json::to_value(keyboard)?;
        }

        self.tolerate_not_modified("editMessageText", message_id, &params)
            .await
    }

    /// 미디어 메시지의 캡션을 교체합니다. 차트가 붙은 뒤의 틱 갱신 경로입니다.
    pub async fn edit_message_caption(
        &self,
        chat_id: i64,
        message_id: i64,
        caption: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> BotResult<()> {
        let mut params = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "caption": caption,
        });
        if let Some(keyboard) = reply_markup {
            params["reply_markup"] = serde_json::to_value(keyboard)?;
        }

        self.tolerate_not_modified("editMessageCaption", message_id, &params)
            .await
    }

    /// 라이브 메시지에 차트 사진을 붙이거나 교체합니다.
    ///
    /// 사진 바이트는 multipart로 올리고, 기존 본문은 캡션으로 옮깁니다.
    pub async fn edit_message_media_photo(
        &self,
        chat_id: i64,
        message_id: i64,
        photo: Vec<u8>,
        caption: &str,
        reply_markup: &InlineKeyboardMarkup,
    ) -> BotResult<()> {
        let media = serde_json::json!({
            "type": "photo",
            "media": format!("attach://{}", CHART_PART_NAME),
            "caption": caption,
        });

        let part = reqwest::multipart::Part::bytes(photo)
            .file_name("chart.png")
            .mime_str("image/png")?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("message_id", message_id.to_string())
            .text("media", media.to_string())
            .text("reply_markup", serde_json::to_string(reply_markup)?)
            .part(CHART_PART_NAME, part);

        let response = self
            .client
            .post(self.method_url("editMessageMedia"))
            .multipart(form)
            .send()
            .await?;

        let _: Message = self.read_response("editMessageMedia", response).await?;
        Ok(())
    }

    /// 메시지를 삭제합니다.
    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> BotResult<()> {
        let params = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
        });

        let _: bool = self.call("deleteMessage", &params).await?;
        Ok(())
    }

    /// 콜백 쿼리를 확인 처리해 클라이언트의 로딩 표시를 멈춥니다.
    pub async fn answer_callback_query(&self, callback_query_id: &str) -> BotResult<()> {
        let params = serde_json::json!({
            "callback_query_id": callback_query_id,
        });

        let _: bool = self.call("answerCallbackQuery", &params).await?;
        Ok(())
    }

    async fn tolerate_not_modified(
        &self,
        method: &str,
        message_id: i64,
        params: &serde_json::Value,
    ) -> BotResult<()> {
        let result: BotResult<Message> = self.call(method, params).await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_modified() => {
                debug!(message_id, "편집 내용이 동일하여 건너뜀");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &serde_json::Value,
    ) -> BotResult<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(params)
            .send()
            .await?;

        self.read_response(method, response).await
    }

    async fn read_response<T: DeserializeOwned>(
        &self,
        method: &str,
        response: reqwest::Response,
    ) -> BotResult<T> {
        let status = response.status();
        if status.as_u16() == 429 {
            warn!(method, "텔레그램 요청 한도 초과");
            return Err(BotError::RateLimited);
        }

        let body = response.text().await?;
        let envelope: ApiResponse<T> = serde_json::from_str(&body).map_err(|_| {
            BotError::Api(format!("{method}: HTTP {status} 응답을 해석할 수 없습니다"))
        })?;

        if !envelope.ok {
            let description = envelope
                .description
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(BotError::Api(format!("{method}: {description}")));
        }

        envelope
            .result
            .ok_or_else(|| BotError::Api(format!("{method}: 응답에 result가 없습니다")))
    }
}
