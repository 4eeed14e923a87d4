//! 봇 에러 타입.

use thiserror::Error;

/// 봇 작업용 Result 타입.
pub type BotResult<T> = Result<T, BotError>;

/// 텔레그램 표면에서 발생하는 에러.
#[derive(Debug, Error)]
pub enum BotError {
    /// Bot API가 ok=false 응답을 반환함
    #[error("텔레그램 API 실패: {0}")]
    Api(String),

    /// HTTP 429
    #[error("텔레그램 요청 한도 초과")]
    RateLimited,

    #[error("네트워크 에러: {0}")]
    Network(#[from] reqwest::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BotError {
    /// 동일한 내용으로 메시지를 편집하려다 받은 실패인지 확인합니다.
    /// 틱 내용이 반복될 수 있으므로 이 경우는 에러로 취급하지 않습니다.
    pub fn is_not_modified(&self) -> bool {
        matches!(self, BotError::Api(description)
            if description.contains("message is not modified"))
    }
}
