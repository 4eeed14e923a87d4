//! WhiteBit 공개 REST API 클라이언트.
//!
//! 심볼 카탈로그, 서버 시간, 차트 스냅샷 이미지를 조회합니다.
//! 전부 인증이 필요 없는 단발성 요청이며 상태를 갖지 않습니다.

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use coinwatch_core::{ExchangeSettings, Symbol};

use crate::error::{FeedError, FeedResult};

// ============================================================================
// API 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
struct SymbolsResponse {
    result: Vec<Symbol>,
}

#[derive(Debug, Deserialize)]
struct ServerTimeResponse {
    time: u64,
}

// ============================================================================
// 클라이언트
// ============================================================================

/// WhiteBit 공개 API 클라이언트.
#[derive(Debug, Clone)]
pub struct WhitebitClient {
    client: Client,
    rest_base_url: String,
    bff_base_url: String,
}

impl WhitebitClient {
    /// 새 클라이언트 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `FeedError::Network`를 반환합니다.
    pub fn new(settings: &ExchangeSettings) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(settings.http_timeout())
            .build()
            .map_err(|e| FeedError::Network(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            client,
            rest_base_url: settings.rest_base_url.clone(),
            bff_base_url: settings.bff_base_url.clone(),
        })
    }

    /// 거래 가능한 심볼 목록 조회.
    ///
    /// 200이 아닌 응답은 `FeedError::Catalog`이며, 라우터는 이를 빈 선택
    /// 목록으로 표시합니다.
    pub async fn fetch_symbols(&self) -> FeedResult<Vec<Symbol>> {
        let url = format!("{}/api/v1/public/symbols", self.rest_base_url);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Catalog {
                status: status.as_u16(),
            });
        }

        let body: SymbolsResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Parse(format!("잘못된 카탈로그 응답: {}", e)))?;
        Ok(body.result)
    }

    /// 거래소 서버 시간 조회 (초 단위 타임스탬프).
    ///
    /// 차트 스냅샷 URL의 캐시버스터로만 사용됩니다.
    pub async fn server_time(&self) -> FeedResult<u64> {
        let url = format!("{}/api/v4/public/time", self.rest_base_url);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::ChartFetch(format!(
                "time endpoint returned {}",
                status
            )));
        }

        let body: ServerTimeResponse = response
            .json()
            .await
            .map_err(|e| FeedError::ChartFetch(format!("잘못된 time 응답: {}", e)))?;
        Ok(body.time)
    }

    /// 지정한 타임스탬프가 박힌 차트 스냅샷 PNG 조회.
    pub async fn chart_png(&self, symbol: &Symbol, timestamp: u64) -> FeedResult<Vec<u8>> {
        let url = format!(
            "{}/v1/canvas/ogImage/trade/{}.png?t={}",
            self.bff_base_url, symbol, timestamp
        );
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::ChartFetch(format!(
                "chart endpoint returned {}",
                status
            )));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }

    /// 현재 서버 시간 기준 차트 스냅샷 조회.
    ///
    /// 시간 조회와 이미지 조회 중 하나라도 실패하면 `FeedError::ChartFetch`
    /// 계열 에러를 반환하고, 호출자는 메시지를 그대로 둡니다.
    pub async fn chart_snapshot(&self, symbol: &Symbol) -> FeedResult<Vec<u8>> {
        let timestamp = self.server_time().await?;
        self.chart_png(symbol, timestamp).await
    }
}
