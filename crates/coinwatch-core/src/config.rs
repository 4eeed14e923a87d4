//! 설정 관리.
//!
//! 기본값 → 설정 파일(선택) → `COINWATCH__` 환경 변수 순서로 로드합니다.
//! 텔레그램 토큰과 채팅 ID는 원본 배포 방식 그대로 평문 환경 변수
//! (`TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`)에서 읽으며, 누락 시 부팅에 실패합니다.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 텔레그램 설정
    #[serde(default)]
    pub telegram: TelegramSettings,
    /// 거래소 엔드포인트 설정
    #[serde(default)]
    pub exchange: ExchangeSettings,
    /// 구독 세션 타이밍 설정
    #[serde(default)]
    pub session: SessionSettings,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// 텔레그램 설정.
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct TelegramSettings {
    /// 봇 토큰
    #[serde(default)]
    pub bot_token: String,
    /// 시세 메시지를 보낼 채팅 ID
    #[serde(default)]
    pub chat_id: i64,
    /// Bot API 기본 URL (테스트에서만 변경)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

impl fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("bot_token", &"***")
            .field("chat_id", &self.chat_id)
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

impl TelegramSettings {
    /// 필수 값이 채워졌는지 검증합니다.
    pub fn validate(&self) -> CoreResult<()> {
        if self.bot_token.is_empty() {
            return Err(CoreError::MissingEnv("TELEGRAM_BOT_TOKEN".to_string()));
        }
        if self.chat_id == 0 {
            return Err(CoreError::MissingEnv("TELEGRAM_CHAT_ID".to_string()));
        }
        Ok(())
    }
}

/// 거래소 엔드포인트 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeSettings {
    /// REST API 기본 URL (심볼 목록, 서버 시간)
    pub rest_base_url: String,
    /// 차트 이미지 BFF 기본 URL
    pub bff_base_url: String,
    /// 시세 피드 WebSocket URL
    pub ws_url: String,
    /// HTTP 요청 타임아웃 (초)
    pub http_timeout_secs: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            rest_base_url: "https://whitebit.com".to_string(),
            bff_base_url: "https://bff.whitebit.com".to_string(),
            ws_url: "wss://api.whitebit.com/ws".to_string(),
            http_timeout_secs: 10,
        }
    }
}

impl ExchangeSettings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// 구독 세션 타이밍 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionSettings {
    /// 싱크로 보내는 틱 사이의 최소 간격 (초)
    pub publish_spacing_secs: u64,
    /// 원격 종료 후 재연결 대기 시간 (초)
    pub reconnect_delay_secs: u64,
    /// 메시지 편집 실패 후 대기 시간 (초)
    pub edit_retry_delay_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            publish_spacing_secs: 2,
            reconnect_delay_secs: 5,
            edit_retry_delay_secs: 30,
        }
    }
}

impl SessionSettings {
    pub fn publish_spacing(&self) -> Duration {
        Duration::from_secs(self.publish_spacing_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn edit_retry_delay(&self) -> Duration {
        Duration::from_secs(self.edit_retry_delay_secs)
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// 기본값, 설정 파일(있는 경우), 환경 변수에서 설정을 로드합니다.
    ///
    /// `RUN_MODE` 환경 변수가 설정되면 `config/{RUN_MODE}.toml`을 찾고,
    /// 없으면 `config/default.toml`을 찾습니다. 파일이 없어도 에러가 아닙니다.
    pub fn load() -> CoreResult<Self> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "default".to_string());

        let builder = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                config::Environment::with_prefix("COINWATCH")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut cfg: AppConfig = builder.build()?.try_deserialize()?;

        // 원본 배포 방식과 동일한 평문 환경 변수가 섹션 값을 덮어쓴다
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            cfg.telegram.bot_token = token;
        }
        if let Ok(chat) = std::env::var("TELEGRAM_CHAT_ID") {
            cfg.telegram.chat_id = chat
                .parse()
                .map_err(|_| CoreError::Config(format!("TELEGRAM_CHAT_ID must be numeric: {}", chat)))?;
        }

        cfg.telegram.validate()?;
        Ok(cfg)
    }
}
