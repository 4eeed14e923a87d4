//! 시세 피드 프레임 코덱.
//!
//! 피드로 내보내는 제어 프레임(구독/구독 해제)과 피드에서 들어오는
//! 프레임의 디코딩을 담당합니다. 네트워크와 무관한 순수 로직입니다.
//!
//! 틱 프레임의 형태는 `{"params": [pair, marketData]}`이며, `params`가
//! 정확히 두 개가 아닌 프레임(구독 확인, 에러 응답 등)은 틱이 아닙니다.

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use coinwatch_core::{MarketTick, Symbol};

use crate::error::{FeedError, FeedResult};

/// 구독 등록 메서드 이름.
const METHOD_SUBSCRIBE: &str = "market_subscribe";

/// 구독 해제 메서드 이름.
const METHOD_UNSUBSCRIBE: &str = "market_unsubscribe";

/// 피드로 보내는 제어 프레임.
#[derive(Debug, Clone, Serialize)]
pub struct ControlFrame {
    pub id: u64,
    pub method: String,
    pub params: Vec<String>,
}

impl ControlFrame {
    /// 구독 등록 프레임을 생성합니다.
    pub fn subscribe(id: u64, symbol: &Symbol) -> Self {
        Self {
            id,
            method: METHOD_SUBSCRIBE.to_string(),
            params: vec![symbol.as_str().to_string()],
        }
    }

    /// 구독 해제 프레임을 생성합니다.
    pub fn unsubscribe(id: u64, symbol: &Symbol) -> Self {
        Self {
            id,
            method: METHOD_UNSUBSCRIBE.to_string(),
            params: vec![symbol.as_str().to_string()],
        }
    }

    /// 전송용 JSON 문자열로 직렬화합니다.
    pub fn to_json(&self) -> FeedResult<String> {
        serde_json::to_string(self).map_err(Into::into)
    }
}

/// 수신 프레임 디코딩 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    /// 시세 틱
    Tick(MarketTick),
    /// 틱이 아닌 프레임 (호출자가 조용히 무시)
    NotATick,
}

/// 수신 프레임 한 건을 디코딩합니다.
///
/// `params`가 `[pair, marketData]` 두 개로 이루어진 프레임만 틱입니다.
/// 틱 형태를 갖추었지만 숫자 필드가 빠졌거나 숫자로 파싱되지 않으면
/// `FeedError::Parse`를 반환하며, 세션은 이를 치명적 에러로 다룹니다.
pub fn decode_frame(raw: &str) -> FeedResult<DecodedFrame> {
    let value: Value = serde_json::from_str(raw)?;

    let Some(params) = value.get("params").and_then(Value::as_array) else {
        return Ok(DecodedFrame::NotATick);
    };
    if params.len() != 2 {
        return Ok(DecodedFrame::NotATick);
    }
    let (Some(pair), Some(payload)) = (params[0].as_str(), params[1].as_object()) else {
        return Ok(DecodedFrame::NotATick);
    };

    let tick = MarketTick {
        symbol: Symbol::new(pair),
        open: require_decimal(payload, "open")?,
        close: require_decimal(payload, "close")?,
        high: require_decimal(payload, "high")?,
        low: require_decimal(payload, "low")?,
        volume: require_decimal(payload, "volume")?,
        last: require_decimal(payload, "last")?,
    };

    Ok(DecodedFrame::Tick(tick))
}

/// 페이로드에서 숫자 필드를 꺼냅니다.
///
/// 피드는 값을 JSON 문자열로 보내지만, 숫자로 와도 허용합니다.
fn require_decimal(
    payload: &serde_json::Map<String, Value>,
    field: &str,
) -> FeedResult<Decimal> {
    let value = payload
        .get(field)
        .ok_or_else(|| FeedError::Parse(format!("missing field: {}", field)))?;

    let parsed = match value {
        Value::String(s) => s.parse::<Decimal>().ok(),
        Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| FeedError::Parse(format!("non-numeric field: {}", field)))
}
