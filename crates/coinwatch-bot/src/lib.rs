//! 텔레그램 봇 프런트엔드.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 텔레그램 Bot API 클라이언트 (long polling, 메시지/미디어 편집)
//! - 라이브 패널: 틱을 한 메시지 편집으로 표시하는 TickSink 구현
//! - 코인 선택기 키보드와 페이지 이동
//! - 명령어/콜백 라우터

pub mod error;
pub mod panel;
pub mod picker;
pub mod router;
pub mod telegram;

pub use error::{BotError, BotResult};
pub use panel::{render, LivePanel};
pub use router::{BotRouter, CallbackAction, Command};
pub use telegram::TelegramApi;
