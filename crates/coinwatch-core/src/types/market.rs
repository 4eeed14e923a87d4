//! 시세 틱과 가격 방향 지표.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Symbol;

/// 피드에서 받은 한 건의 시세 틱.
///
/// 생성된 뒤에는 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketTick {
    /// 거래 페어
    pub symbol: Symbol,
    /// 시가
    pub open: Decimal,
    /// 종가 (현재가)
    pub close: Decimal,
    /// 고가
    pub high: Decimal,
    /// 저가
    pub low: Decimal,
    /// 거래량
    pub volume: Decimal,
    /// 최근 체결가
    pub last: Decimal,
}

/// 직전 종가 대비 가격 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceDirection {
    /// 상승 (직전 종가 이상)
    Up,
    /// 하락 (직전 종가 미만)
    Down,
    /// 방향 없음 (세션의 첫 틱)
    Neutral,
}

impl PriceDirection {
    /// 직전 종가와 현재 종가로 방향을 계산합니다.
    ///
    /// 직전 종가가 없으면 `Neutral`, 현재 종가가 더 낮으면 `Down`,
    /// 그 외에는 (같은 값 포함) `Up`입니다.
    pub fn from_closes(previous: Option<Decimal>, close: Decimal) -> Self {
        match previous {
            Some(prev) if close < prev => Self::Down,
            Some(_) => Self::Up,
            None => Self::Neutral,
        }
    }

    /// 메시지에 표시할 글리프.
    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Up => "🟢",
            Self::Down => "🔴",
            Self::Neutral => "⚪",
        }
    }
}
