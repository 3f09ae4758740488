//! Cursor-based pagination utilities for list endpoints.

use presence_crypto::{decode_base64url, encode_base64url};
use serde::{Deserialize, Serialize};

/// Default page size when `count` is not specified.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Maximum allowed page size.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Common pagination parameters accepted by list endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationParams {
    /// Opaque cursor from a previous response.
    pub cursor: Option<String>,
    /// Number of items per page (default 100, max 1000).
    pub count: Option<u32>,
}

impl PaginationParams {
    /// Resolve effective page size, clamped to [1, MAX_PAGE_SIZE].
    pub fn effective_count(&self) -> u32 {
        self.count.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    /// Decode the cursor to a numeric offset. Absent or invalid cursors start at 0.
    pub fn decode_offset(&self) -> u64 {
        self.cursor.as_deref().and_then(decode_cursor).unwrap_or(0)
    }

    /// Slice one page out of `items` and compute the next cursor.
    pub fn page<T: Clone>(&self, items: &[T]) -> (Vec<T>, PaginationMeta) {
        let offset = usize::try_from(self.decode_offset()).unwrap_or(usize::MAX);
        let count = self.effective_count();
        let page: Vec<T> = items.iter().skip(offset).take(count as usize).cloned().collect();
        let cursor = next_cursor(offset as u64, page.len(), count);
        (page, PaginationMeta { cursor })
    }
}

/// Pagination metadata included in list responses.
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    /// Cursor to pass for the next page, or `None` if this is the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Encode a numeric offset into an opaque cursor string.
pub fn encode_cursor(offset: u64) -> String {
    encode_base64url(offset.to_string().as_bytes())
}

/// Decode a cursor string back to a numeric offset.
pub fn decode_cursor(cursor: &str) -> Option<u64> {
    let bytes = decode_base64url(cursor).ok()?;
    std::str::from_utf8(&bytes).ok()?.parse::<u64>().ok()
}

/// Next-page cursor, or `None` when fewer than `page_size` items came back.
pub fn next_cursor(current_offset: u64, returned: usize, page_size: u32) -> Option<String> {
    if (returned as u64) < u64::from(page_size) {
        None
    } else {
        Some(encode_cursor(current_offset + returned as u64))
    }
}
