//! 피드 에러 타입.

use thiserror::Error;

/// 피드 및 프레젠테이션 관련 에러.
#[derive(Debug, Error)]
pub enum FeedError {
    /// 원격에서 연결 종료 (유일한 재시도 대상)
    #[error("Feed connection closed: {0}")]
    ConnectionClosed(String),

    /// WebSocket 전송/프로토콜 에러
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// 프레임 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    Parse(String),

    /// 구독 제어 프레임 전송 실패
    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    /// 심볼 카탈로그 요청 실패
    #[error("Catalog unavailable: status {status}")]
    Catalog { status: u16 },

    /// 차트 스냅샷 요청 실패
    #[error("Chart fetch failed: {0}")]
    ChartFetch(String),

    /// 라이브 메시지 편집 실패
    #[error("Presentation edit failed: {0}")]
    Presentation(String),

    /// 네트워크 에러
    #[error("Network error: {0}")]
    Network(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),
}

/// 피드 작업을 위한 Result 타입.
pub type FeedResult<T> = Result<T, FeedError>;

impl FeedError {
    /// 같은 심볼로 재연결을 시도할 수 있는 에러인지 확인.
    ///
    /// 원격 종료만 해당합니다. 그 외의 피드 에러는 세션을 중단시키고
    /// 사용자가 심볼을 다시 선택해야 합니다.
    pub fn is_transient(&self) -> bool {
        matches!(self, FeedError::ConnectionClosed(_))
    }

    /// 세션을 중단시키지 않는 프레젠테이션 계층 에러인지 확인.
    pub fn is_presentation(&self) -> bool {
        matches!(self, FeedError::Presentation(_))
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout(err.to_string())
        } else {
            FeedError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Parse(err.to_string())
    }
}
