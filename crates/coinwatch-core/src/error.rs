//! 코인 시세 봇의 에러 타입.
//!
//! 이 모듈은 부팅 및 설정 단계에서 사용되는 에러 타입을 정의합니다.
//! 피드/프레젠테이션 단계의 에러는 `coinwatch-exchange`의 `FeedError`가 담당합니다.

use thiserror::Error;

/// 핵심 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 필수 환경 변수 누락
    #[error("환경 변수 누락: {0}")]
    MissingEnv(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),
}

/// 핵심 작업을 위한 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// 프로세스를 시작할 수 없는 에러인지 확인합니다.
    ///
    /// 설정/환경 변수 에러는 전부 부팅 실패로 처리됩니다.
    pub fn is_startup_fatal(&self) -> bool {
        matches!(self, CoreError::Config(_) | CoreError::MissingEnv(_))
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}
