//! 시세 봇 전반에서 사용되는 공통 타입.

mod market;
mod symbol;

pub use market::*;
pub use symbol::*;
