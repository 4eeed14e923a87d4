//! WhiteBit 거래소 연동.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 심볼 카탈로그 및 차트 스냅샷 REST 클라이언트
//! - 시세 피드 프레임 코덱 (제어 프레임 생성, 틱 디코딩)
//! - 구독 세션: 연결/구독/수신 루프/재연결의 단일 소유자
//! - TickSink trait: 디코딩된 틱을 소비하는 프레젠테이션 경계

pub mod catalog;
pub mod codec;
pub mod error;
pub mod session;

pub use catalog::WhitebitClient;
pub use codec::{decode_frame, ControlFrame, DecodedFrame};
pub use error::*;
pub use session::{SessionConfig, SessionState, SubscriptionSession, TickSink};
