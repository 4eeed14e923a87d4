//! 거래 페어 심볼.
//!
//! 거래소가 쓰는 `BTC_USDT` 형식의 페어 문자열을 그대로 감싸는 타입입니다.
//! 카탈로그 응답과 피드 프레임, 콜백 데이터 모두 이 형식을 사용합니다.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 거래 가능한 페어를 나타내는 심볼.
///
/// 내부 표현은 거래소 형식(`BASE_QUOTE`, 대문자) 그대로입니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// 새 심볼을 생성합니다. 입력은 대문자로 정규화됩니다.
    pub fn new(pair: impl Into<String>) -> Self {
        Self(pair.into().to_uppercase())
    }

    /// 거래소 형식 문자열을 반환합니다.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 기준 자산 (예: `BTC_USDT`의 `BTC`).
    pub fn base(&self) -> Option<&str> {
        self.0.split_once('_').map(|(base, _)| base)
    }

    /// 호가 자산 (예: `BTC_USDT`의 `USDT`).
    pub fn quote(&self) -> Option<&str> {
        self.0.split_once('_').map(|(_, quote)| quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(pair: &str) -> Self {
        Self::new(pair)
    }
}

impl From<String> for Symbol {
    fn from(pair: String) -> Self {
        Self::new(pair)
    }
}
