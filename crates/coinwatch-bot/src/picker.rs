//! 코인 선택기 페이지네이션.
//!
//! 커서는 카탈로그 안의 오프셋이고 페이지 크기는 10으로 고정입니다.
//! `Next`는 다음 페이지가 존재할 때만, `Previous`는 첫 페이지가 아닐 때만
//! 나타납니다.

use coinwatch_core::Symbol;

use crate::telegram::{InlineKeyboardButton, InlineKeyboardMarkup};

/// 페이지당 심볼 수.
pub const PAGE_SIZE: usize = 10;

/// 커서를 유효한 범위 `[0, catalog_len)`으로 되돌립니다.
///
/// 페이지를 넘기는 사이에 카탈로그가 줄었을 때를 대비합니다.
pub fn clamp(cursor: usize, catalog_len: usize) -> usize {
    if catalog_len == 0 {
        0
    } else {
        cursor.min(catalog_len - 1)
    }
}

/// 다음 페이지 시작 커서. 다음 페이지가 없으면 제자리입니다.
pub fn advance(cursor: usize, catalog_len: usize) -> usize {
    let next = cursor + PAGE_SIZE;
    if next < catalog_len {
        next
    } else {
        cursor
    }
}

/// 이전 페이지 시작 커서. 0 아래로는 내려가지 않습니다.
pub fn retreat(cursor: usize) -> usize {
    cursor.saturating_sub(PAGE_SIZE)
}

/// 커서가 가리키는 페이지 조각.
pub fn page(catalog: &[Symbol], cursor: usize) -> &[Symbol] {
    let start = cursor.min(catalog.len());
    let end = (start + PAGE_SIZE).min(catalog.len());
    &catalog[start..end]
}

/// 선택기 키보드: 심볼 한 줄씩, 마지막 줄에 탐색 버튼.
pub fn keyboard(catalog: &[Symbol], cursor: usize) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = page(catalog, cursor)
        .iter()
        .map(|symbol| vec![InlineKeyboardButton::new(symbol.as_str(), symbol.as_str())])
        .collect();

    let mut nav = Vec::new();
    if cursor > 0 {
        nav.push(InlineKeyboardButton::new("Previous", "Previous"));
    }
    if cursor + PAGE_SIZE < catalog.len() {
        nav.push(InlineKeyboardButton::new("Next", "Next"));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }

    InlineKeyboardMarkup {
        inline_keyboard: rows,
    }
}
